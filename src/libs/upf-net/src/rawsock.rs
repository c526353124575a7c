//! Raw-socket packet sources and sinks (Linux)
//!
//! `EthRawSocket` binds an `AF_PACKET` socket to an interface and moves
//! whole Ethernet frames; `Ipv4RawSink` sends finished IPv4 packets through
//! an `IPPROTO_RAW` socket with `IP_HDRINCL` semantics.

use std::io;
use std::mem;
use std::net::SocketAddrV4;
use std::os::fd::AsRawFd;

use socket2::{Domain, Protocol, Socket, Type};
use upf_core::{BufferView, BufferWritableView};

use crate::error::{NetError, NetResult};
use crate::interfaces::{EthPacketSink, EthPacketSource, Ipv4PacketSink, UserData};
use crate::ipv4::Ipv4Decoder;

const ETH_P_ALL: u16 = 0x0003;

fn interface_index(name: &str) -> NetResult<u32> {
    let cname = std::ffi::CString::new(name)
        .map_err(|_| NetError::Unsupported("interface name with NUL byte"))?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if index == 0 {
        return Err(NetError::Io(io::Error::last_os_error()));
    }
    Ok(index)
}

/// An `AF_PACKET` socket moving raw Ethernet frames on one interface.
pub struct EthRawSocket {
    socket: Socket,
}

impl EthRawSocket {
    /// Open and bind to the named interface. Requires `CAP_NET_RAW`.
    pub fn open(interface: &str) -> NetResult<Self> {
        let socket = Socket::new(
            Domain::PACKET,
            Type::RAW,
            Some(Protocol::from(i32::from(u16::to_be(ETH_P_ALL)))),
        )?;

        let index = interface_index(interface)?;
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = u16::to_be(ETH_P_ALL);
        addr.sll_ifindex = index as i32;

        let rc = unsafe {
            libc::bind(
                socket.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(NetError::Io(io::Error::last_os_error()));
        }

        log::info!("bound raw Ethernet socket to {interface}");
        Ok(EthRawSocket { socket })
    }

    fn poll_readable(&self) -> bool {
        let mut fds = libc::pollfd {
            fd: self.socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut fds, 1, 0) };
        rc > 0 && fds.revents & libc::POLLIN != 0
    }
}

impl EthPacketSource for EthRawSocket {
    fn packet_available(&mut self) -> bool {
        self.poll_readable()
    }

    fn get_eth(&mut self, buffer: &BufferWritableView) -> NetResult<BufferWritableView> {
        let received = buffer.with_bytes_mut(|bytes| {
            let rc = unsafe {
                libc::recv(
                    self.socket.as_raw_fd(),
                    bytes.as_mut_ptr() as *mut libc::c_void,
                    bytes.len(),
                    0,
                )
            };
            if rc < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(rc as usize)
            }
        })?;
        Ok(buffer.sub(0, received)?)
    }
}

impl EthPacketSink for EthRawSocket {
    fn consume_eth(&mut self, eth_data: &BufferView, _user_data: &mut UserData) {
        if eth_data.is_empty() {
            return;
        }
        let result = eth_data.with_bytes(|bytes| self.socket.send(bytes));
        if let Err(e) = result {
            log::warn!("raw Ethernet send failed: {e}");
        }
    }
}

/// An `IPPROTO_RAW` socket sending finished IPv4 packets. The destination
/// address is taken from each packet's header.
pub struct Ipv4RawSink {
    socket: Socket,
}

impl Ipv4RawSink {
    pub fn open() -> NetResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(libc::IPPROTO_RAW)))?;
        socket.set_header_included_v4(true)?;
        Ok(Ipv4RawSink { socket })
    }
}

impl Ipv4PacketSink for Ipv4RawSink {
    fn consume_ipv4(&mut self, ipv4_data: &BufferView, _user_data: &mut UserData) {
        if ipv4_data.is_empty() {
            return;
        }
        let dst = match Ipv4Decoder::new(ipv4_data.clone()) {
            Ok(dec) => dec.dst_addr(),
            Err(e) => {
                log::warn!("dropping undecodable IPv4 packet: {e}");
                return;
            }
        };
        let addr = SocketAddrV4::new(dst, 0);
        let result = ipv4_data.with_bytes(|bytes| self.socket.send_to(bytes, &addr.into()));
        if let Err(e) = result {
            log::warn!("raw IPv4 send to {dst} failed: {e}");
        }
    }
}
