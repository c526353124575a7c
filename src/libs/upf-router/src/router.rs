//! Session learning and the UE map
//!
//! The router is a [`PacketObserver`] fed with the traffic between eNodeBs
//! and the EPC. It correlates S1AP `InitialContextSetupRequest` and
//! `InitialContextSetupResponse` messages into per-UE GTPv1-U tunnel
//! bindings:
//!
//! * a request opens a pending entry in the setup map, keyed by
//!   `(MME-UE-S1AP-ID, eNB-UE-S1AP-ID, E-RAB-ID)`, holding the EPC side of
//!   the tunnel and the UE address from the NAS PDN Address;
//! * the matching response completes the eNodeB side and promotes the
//!   entry into the UE map (last writer wins); a response without a
//!   pending request is dropped.
//!
//! IPv4 post-processing is disabled for all SCTP traffic, so signalling
//! between eNodeBs and EPCs is never mistaken for user traffic, whether or
//! not it is S1AP.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use upf_core::BufferView;
use upf_net::processor::{self, Context, PacketObserver};
use upf_net::types::Gtpv1uTunnelInfo;
use upf_net::{EthPacketSink, Ipv4PacketSink, NetResult, UserData};
use upf_s1ap::{InitialContextSetupRequest, InitialContextSetupResponse, S1apPdu};

/// Correlation key matching a response to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetupKey {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub e_rab_id: u8,
}

/// Pending correlation state: the tunnel as far as the request told us,
/// plus the UE address to key the final entry with.
#[derive(Debug, Clone, Copy)]
struct SetupData {
    tunnel: Gtpv1uTunnelInfo,
    ue_ipv4: Ipv4Addr,
}

/// The UE map: UE IPv4 address -> both tunnel endpoints.
pub type UeMap = HashMap<Ipv4Addr, Gtpv1uTunnelInfo>;

type UpsertCallback = Box<dyn FnMut(&mut (Ipv4Addr, Gtpv1uTunnelInfo)) -> bool>;
type HookCallback = Box<dyn FnMut(&mut Context) -> bool>;
type FinalCallback = Box<dyn FnMut(&mut Context)>;

/// Pipeline observer learning sessions from S1AP and exposing the UE map.
#[derive(Default)]
pub struct Router {
    setup_map: HashMap<SetupKey, SetupData>,
    ue_map: UeMap,

    on_s1ap_relevant_traffic: Option<Box<dyn FnMut()>>,
    before_ue_map_upsert: Option<UpsertCallback>,
    on_gtpv1u_ipv4: Option<HookCallback>,
    on_ipv4_post_process: Option<HookCallback>,
    on_non_ipv4: Option<HookCallback>,
    on_final_process: Option<FinalCallback>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one Ethernet frame. A failed dissection leaves all state
    /// untouched; the caller proceeds with the next packet.
    pub fn process_eth_packet(&mut self, eth_data: &BufferView, user_data: UserData) -> NetResult<()> {
        processor::process_eth_packet(self, eth_data, user_data)
    }

    /// Feed one IPv4 packet (no Ethernet framing).
    pub fn process_ipv4_packet(
        &mut self,
        ipv4_data: &BufferView,
        user_data: UserData,
    ) -> NetResult<()> {
        processor::process_ipv4_packet(self, ipv4_data, user_data)
    }

    /// Read access to the UE map.
    pub fn ue_map(&self) -> &UeMap {
        &self.ue_map
    }

    /// Write access to the UE map (manual entries, eviction).
    pub fn ue_map_mut(&mut self) -> &mut UeMap {
        &mut self.ue_map
    }

    /// Number of request entries still waiting for their response.
    pub fn pending_setups(&self) -> usize {
        self.setup_map.len()
    }

    pub fn is_from_known_ue(&self, src: Ipv4Addr) -> bool {
        self.ue_map.contains_key(&src)
    }

    pub fn is_to_known_ue(&self, dst: Ipv4Addr) -> bool {
        self.ue_map.contains_key(&dst)
    }

    /// True when either address belongs to a known UE.
    pub fn is_of_known_ue(&self, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        self.is_from_known_ue(src) || self.is_to_known_ue(dst)
    }

    /// Called whenever an InitialContextSetup message is observed.
    pub fn on_s1ap_relevant_traffic(&mut self, f: impl FnMut() + 'static) {
        self.on_s1ap_relevant_traffic = Some(Box::new(f));
    }

    /// Called right before a UE map upsert with the candidate entry. The
    /// callback may edit the entry; returning false vetoes the upsert.
    pub fn before_ue_map_upsert(
        &mut self,
        f: impl FnMut(&mut (Ipv4Addr, Gtpv1uTunnelInfo)) -> bool + 'static,
    ) {
        self.before_ue_map_upsert = Some(Box::new(f));
    }

    /// Called on GTPv1-U packets carrying IPv4, before the inner descent.
    pub fn on_gtpv1u_ipv4(&mut self, f: impl FnMut(&mut Context) -> bool + 'static) {
        self.on_gtpv1u_ipv4 = Some(Box::new(f));
    }

    /// Called in the IPv4 post-processing phase (plain user traffic that
    /// should be encapsulated or dropped).
    pub fn on_ipv4_post_process(&mut self, f: impl FnMut(&mut Context) -> bool + 'static) {
        self.on_ipv4_post_process = Some(Box::new(f));
    }

    /// Called on non-IPv4 traffic.
    pub fn on_non_ipv4(&mut self, f: impl FnMut(&mut Context) -> bool + 'static) {
        self.on_non_ipv4 = Some(Box::new(f));
    }

    /// Called at the end of processing for packets nothing dropped.
    pub fn on_final_process(&mut self, f: impl FnMut(&mut Context) + 'static) {
        self.on_final_process = Some(Box::new(f));
    }

    fn handle_request(&mut self, request: &InitialContextSetupRequest) {
        if let Some(cbk) = &mut self.on_s1ap_relevant_traffic {
            cbk();
        }

        // In practice there is exactly one E-RAB item per message, but every
        // item is correlated independently.
        for item in &request.e_rabs {
            let Some(ue_ipv4) = item.ue_ipv4 else {
                log::debug!(
                    "InitialContextSetupRequest E-RAB {} without a UE IPv4 address, skipped",
                    item.e_rab_id
                );
                continue;
            };

            let key = SetupKey {
                mme_ue_s1ap_id: request.mme_ue_s1ap_id,
                enb_ue_s1ap_id: request.enb_ue_s1ap_id,
                e_rab_id: item.e_rab_id,
            };

            // Requests go from the EPC towards the eNodeB.
            let entry = self.setup_map.entry(key).or_insert(SetupData {
                tunnel: Gtpv1uTunnelInfo::default(),
                ue_ipv4,
            });
            entry.tunnel.epc.ipv4 = item.transport_layer_address;
            entry.tunnel.epc.teid = item.gtp_teid;
            entry.ue_ipv4 = ue_ipv4;

            log::debug!(
                "pending session for UE {ue_ipv4}: EPC {}:{:#x}",
                item.transport_layer_address,
                item.gtp_teid
            );
        }
    }

    fn handle_response(&mut self, response: &InitialContextSetupResponse) {
        if let Some(cbk) = &mut self.on_s1ap_relevant_traffic {
            cbk();
        }

        for item in &response.e_rabs {
            let key = SetupKey {
                mme_ue_s1ap_id: response.mme_ue_s1ap_id,
                enb_ue_s1ap_id: response.enb_ue_s1ap_id,
                e_rab_id: item.e_rab_id,
            };

            let Some(mut setup) = self.setup_map.remove(&key) else {
                // A response without its request is dropped silently.
                log::debug!(
                    "orphan InitialContextSetupResponse (mme {}, enb {}, rab {})",
                    key.mme_ue_s1ap_id,
                    key.enb_ue_s1ap_id,
                    key.e_rab_id
                );
                continue;
            };

            // Responses go from the eNodeB towards the EPC.
            setup.tunnel.enb.ipv4 = item.transport_layer_address;
            setup.tunnel.enb.teid = item.gtp_teid;

            let mut entry = (setup.ue_ipv4, setup.tunnel);
            let accepted = match &mut self.before_ue_map_upsert {
                Some(cbk) => cbk(&mut entry),
                None => true,
            };
            if accepted {
                log::info!(
                    "UE {} mapped: eNB {}, EPC {}",
                    entry.0,
                    entry.1.enb,
                    entry.1.epc
                );
                self.ue_map.insert(entry.0, entry.1);
            }
        }
    }

    fn handle_s1ap(&mut self, ctx: &mut Context, pdu: &S1apPdu) {
        // Decoding problems inside an otherwise well-formed SCTP frame are
        // reported and leave all state untouched.
        match pdu.initial_context_setup_request() {
            Ok(Some(request)) => {
                self.handle_request(&request);
                ctx.post_process_ipv4 = false;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("undecodable InitialContextSetupRequest: {e}");
                return;
            }
        }
        match pdu.initial_context_setup_response() {
            Ok(Some(response)) => {
                self.handle_response(&response);
                ctx.post_process_ipv4 = false;
            }
            Ok(None) => {
                // Other S1AP procedures are observed but not dissected.
            }
            Err(e) => {
                log::warn!("undecodable InitialContextSetupResponse: {e}");
            }
        }
    }
}

impl PacketObserver for Router {
    fn on_sctp(&mut self, ctx: &mut Context) -> bool {
        // Never post-process SCTP as user traffic, S1AP or not; the
        // signalling between eNodeBs and EPCs is forwarded as-is.
        ctx.post_process_ipv4 = false;
        true
    }

    fn on_sctp_data(&mut self, ctx: &mut Context) -> bool {
        let Some(chunk) = ctx.sctp_data.clone() else {
            return true;
        };
        if chunk.is_fragment() {
            // SCTP reassembly of fragmented user messages is unsupported.
            return true;
        }
        if !chunk.is_s1ap() {
            return true;
        }

        let payload = match chunk.data() {
            Ok(p) => p,
            Err(e) => {
                log::warn!("bad SCTP DATA chunk: {e}");
                return true;
            }
        };
        match payload.with_bytes(S1apPdu::decode) {
            Ok(pdu) => self.handle_s1ap(ctx, &pdu),
            Err(e) => log::warn!("undecodable S1AP PDU: {e}"),
        }
        true
    }

    fn on_gtpv1u_ipv4(&mut self, ctx: &mut Context) -> bool {
        match &mut self.on_gtpv1u_ipv4 {
            Some(cbk) => cbk(ctx),
            None => true,
        }
    }

    fn on_post_ipv4(&mut self, ctx: &mut Context) -> bool {
        match &mut self.on_ipv4_post_process {
            Some(cbk) => cbk(ctx),
            None => true,
        }
    }

    fn on_non_ipv4(&mut self, ctx: &mut Context) -> bool {
        match &mut self.on_non_ipv4 {
            Some(cbk) => cbk(ctx),
            None => true,
        }
    }

    fn on_final(&mut self, ctx: &mut Context) {
        if let Some(cbk) = &mut self.on_final_process {
            cbk(ctx);
        }
    }

    fn final_on_ipv4(&self) -> bool {
        true
    }
}

/// Feeding the router through the sink interfaces must not abort a stream
/// on one bad packet, so dissection errors are logged and swallowed here.
impl EthPacketSink for Router {
    fn consume_eth(&mut self, eth_data: &BufferView, user_data: &mut UserData) {
        if let Err(e) = self.process_eth_packet(eth_data, *user_data) {
            log::debug!("dropping undecodable frame: {e}");
        }
    }
}

impl Ipv4PacketSink for Router {
    fn consume_ipv4(&mut self, ipv4_data: &BufferView, user_data: &mut UserData) {
        if let Err(e) = self.process_ipv4_packet(ipv4_data, *user_data) {
            log::debug!("dropping undecodable packet: {e}");
        }
    }
}
