//! UPF network library
//!
//! Zero-copy decoders for the protocol stack seen between an eNodeB and the
//! EPC (Ethernet, IPv4, UDP, TCP, SCTP, GTPv1-U), GTPv1-U encapsulators, the
//! layered packet-processing pipeline, and capture I/O (pcap files, raw
//! sockets).

pub mod encap;
pub mod error;
pub mod ethernet;
pub mod gtp;
pub mod interfaces;
pub mod ipv4;
pub mod pcap;
pub mod processor;
#[cfg(target_os = "linux")]
pub mod rawsock;
pub mod sctp;
pub mod tcp;
pub mod types;
pub mod udp;


pub use error::{NetError, NetResult};
pub use interfaces::{EthPacketSink, EthPacketSource, Ipv4PacketSink, Ipv4PacketSource, UserData};
pub use processor::{Context, PacketObserver};
pub use types::{Gtpv1uEndPoint, Gtpv1uTunnelInfo, Ipv4Cidr, Ipv4IdSource, MacAddr};

/// Standard GTPv1-U UDP port.
pub const GTPV1_U_UDP_PORT: u16 = 2152;

/// S1AP destination SCTP port (3GPP TS 36.412 sect. 7).
pub const S1AP_SCTP_PORT: u16 = 36412;
