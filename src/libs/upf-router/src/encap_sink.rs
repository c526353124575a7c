//! GTPv1-U encapsulating sink
//!
//! An [`Ipv4PacketSink`] that looks each incoming packet up in the router's
//! UE map and re-emits it encapsulated in the right direction:
//!
//! * traffic **to** a known UE leaves as `EPC -> eNodeB` with the eNodeB
//!   TEID (`user_data.int` = 1);
//! * traffic **from** a known UE leaves as `eNodeB -> EPC` with the EPC
//!   TEID (`user_data.int` = 0);
//! * traffic of an unknown UE is dropped, unless the `on_unknown_ue`
//!   callback asks for a hole marker, in which case an empty view goes
//!   downstream with `user_data.int` = 3.
//!
//! The destination map is checked first: most traffic flows towards UEs.

use std::cell::RefCell;
use std::rc::Rc;

use upf_core::{BufferView, BufferWritableView};
use upf_net::encap::Gtpv1uIpv4Encap;
use upf_net::ipv4::Ipv4Decoder;
use upf_net::types::Ipv4IdSource;
use upf_net::{Ipv4PacketSink, NetResult, UserData};

use crate::router::Router;

type UnknownUeCallback = Box<dyn FnMut(&BufferView) -> bool>;

/// Encapsulates plain IPv4 traffic into the tunnels the router learned.
pub struct Gtpv1uEncapSink<D: Ipv4PacketSink> {
    destination: D,
    router: Rc<RefCell<Router>>,
    id_source: Ipv4IdSource,
    encapper: Gtpv1uIpv4Encap,
    on_unknown_ue: Option<UnknownUeCallback>,
}

impl<D: Ipv4PacketSink> Gtpv1uEncapSink<D> {
    /// `buffer` is the composition buffer for outgoing packets; it bounds
    /// the largest packet that can be encapsulated.
    pub fn new(
        destination: D,
        buffer: BufferWritableView,
        router: Rc<RefCell<Router>>,
        id_source: Ipv4IdSource,
    ) -> NetResult<Self> {
        Ok(Gtpv1uEncapSink {
            destination,
            router,
            id_source,
            encapper: Gtpv1uIpv4Encap::new(buffer)?,
            on_unknown_ue: None,
        })
    }

    /// See [`Gtpv1uIpv4Encap::enable_udp_checksum`].
    pub fn enable_udp_checksum(&mut self, enable: bool) {
        self.encapper.enable_udp_checksum(enable);
    }

    /// Called with traffic of an unknown UE; returning true sends an empty
    /// hole-marker view downstream instead of dropping silently.
    pub fn on_unknown_ue(&mut self, f: impl FnMut(&BufferView) -> bool + 'static) {
        self.on_unknown_ue = Some(Box::new(f));
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn destination_mut(&mut self) -> &mut D {
        &mut self.destination
    }
}

impl<D: Ipv4PacketSink> Ipv4PacketSink for Gtpv1uEncapSink<D> {
    fn consume_ipv4(&mut self, ipv4_data: &BufferView, user_data: &mut UserData) {
        let decoder = match Ipv4Decoder::new(ipv4_data.clone()) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("encap sink dropping undecodable packet: {e}");
                return;
            }
        };

        {
            let router = self.router.borrow();
            let ue_map = router.ue_map();

            if let Some(tunnel) = ue_map.get(&decoder.dst_addr()) {
                // Towards the UE: the packet travels EPC -> eNodeB.
                self.encapper
                    .init()
                    .set_src_address(tunnel.epc.ipv4)
                    .set_dst_address(tunnel.enb.ipv4)
                    .set_teid(tunnel.enb.teid);
                user_data.int = 1;
            } else if let Some(tunnel) = ue_map.get(&decoder.src_addr()) {
                // From the UE: the packet travels eNodeB -> EPC.
                self.encapper
                    .init()
                    .set_src_address(tunnel.enb.ipv4)
                    .set_dst_address(tunnel.epc.ipv4)
                    .set_teid(tunnel.epc.teid);
                user_data.int = 0;
            } else {
                drop(router);
                if let Some(cbk) = &mut self.on_unknown_ue {
                    if cbk(ipv4_data) {
                        user_data.int = 3;
                        self.destination
                            .consume_ipv4(&BufferView::empty(), user_data);
                    }
                }
                return;
            }
        }

        let identification = self.id_source.get();
        self.encapper.set_identification(identification);
        if let Err(e) = self.encapper.set_payload(ipv4_data) {
            log::warn!("encap sink dropping oversized packet: {e}");
            return;
        }
        self.encapper.compute_and_set_checksums();

        match self.encapper.ipv4_packet() {
            Ok(packet) => self.destination.consume_ipv4(&packet, user_data),
            Err(e) => log::warn!("encapsulation failed: {e}"),
        }
    }
}
