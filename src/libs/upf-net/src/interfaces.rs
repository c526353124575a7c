//! Packet source/sink interfaces
//!
//! The boundary between the core and its collaborators: anything producing
//! packets implements a source trait, anything accepting them a sink trait.
//! An empty view is a legitimate packet for sinks (used e.g. as a hole
//! marker by the encapsulating sink); for sources it means "packet filtered
//! out, try again".

use upf_core::{BufferView, BufferWritableView};

use crate::error::NetResult;

/// Caller-opaque data carried alongside a packet through the pipeline and
/// into sinks.
#[derive(Clone, Copy, Debug)]
pub struct UserData {
    pub int: i32,
    pub ptr: *mut std::ffi::c_void,
}

impl Default for UserData {
    fn default() -> Self {
        UserData {
            int: 0,
            ptr: std::ptr::null_mut(),
        }
    }
}

/// Consumer of IPv4 packets.
pub trait Ipv4PacketSink {
    fn consume_ipv4(&mut self, ipv4_data: &BufferView, user_data: &mut UserData);
}

/// Consumer of Ethernet frames.
pub trait EthPacketSink {
    fn consume_eth(&mut self, eth_data: &BufferView, user_data: &mut UserData);
}

/// Producer of IPv4 packets.
pub trait Ipv4PacketSource {
    /// True while another packet can be read.
    fn packet_available(&mut self) -> bool;

    /// Read a packet using `buffer` as backing storage. The returned view
    /// aliases the buffer's storage but may have a different offset and
    /// length; an empty view means the packet was filtered out, try again.
    fn get_ipv4(&mut self, buffer: &BufferWritableView) -> NetResult<BufferWritableView>;
}

/// Producer of Ethernet frames.
pub trait EthPacketSource {
    /// True while another frame can be read.
    fn packet_available(&mut self) -> bool;

    /// Read a frame using `buffer` as backing storage; see
    /// [`Ipv4PacketSource::get_ipv4`].
    fn get_eth(&mut self, buffer: &BufferWritableView) -> NetResult<BufferWritableView>;
}

impl<S: Ipv4PacketSink> Ipv4PacketSink for std::rc::Rc<std::cell::RefCell<S>> {
    fn consume_ipv4(&mut self, ipv4_data: &BufferView, user_data: &mut UserData) {
        self.borrow_mut().consume_ipv4(ipv4_data, user_data);
    }
}

impl<S: EthPacketSink> EthPacketSink for std::rc::Rc<std::cell::RefCell<S>> {
    fn consume_eth(&mut self, eth_data: &BufferView, user_data: &mut UserData) {
        self.borrow_mut().consume_eth(eth_data, user_data);
    }
}

/// An [`Ipv4PacketSink`] keeping the last consumed packet, for taps and
/// tests. Consuming an empty view is legitimate.
#[derive(Default)]
pub struct Ipv4PacketTap {
    last: BufferView,
    user_data: UserData,
    count: usize,
}

impl Ipv4PacketTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_ipv4(&self) -> &BufferView {
        &self.last
    }

    pub fn last_user_data(&self) -> UserData {
        self.user_data
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl Ipv4PacketSink for Ipv4PacketTap {
    fn consume_ipv4(&mut self, ipv4_data: &BufferView, user_data: &mut UserData) {
        self.last = ipv4_data.clone();
        self.user_data = *user_data;
        self.count += 1;
    }
}

/// An [`EthPacketSink`] keeping the last consumed frame.
#[derive(Default)]
pub struct EthPacketTap {
    last: BufferView,
    user_data: UserData,
    count: usize,
}

impl EthPacketTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_eth(&self) -> &BufferView {
        &self.last
    }

    pub fn last_user_data(&self) -> UserData {
        self.user_data
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl EthPacketSink for EthPacketTap {
    fn consume_eth(&mut self, eth_data: &BufferView, user_data: &mut UserData) {
        self.last = eth_data.clone();
        self.user_data = *user_data;
        self.count += 1;
    }
}
