//! Layered packet-processing pipeline
//!
//! The pipeline walks the protocol stack
//! `Ethernet -> IPv4 -> {UDP, TCP, SCTP} -> {GTPv1-U, SCTP chunks} -> inner`
//! and invokes the hooks of a single [`PacketObserver`] at each observation
//! point. Hooks return a "continue" flag: returning false stops the descent
//! for that subtree, and final processing only runs when every traversed
//! hook agreed to continue.
//!
//! Decoders live in the [`Context`] only for the duration of their layer's
//! scope; the slots are cleared again on the way out, so a hook never sees
//! a decoder from a sibling subtree. A decode failure surfaces as an error
//! at the entry point and no hooks below the failing layer run; the caller
//! is expected to carry on with the next packet.

use upf_core::BufferView;

use crate::error::NetResult;
use crate::ethernet::EthFrameDecoder;
use crate::gtp::Gtpv1uDecoder;
use crate::interfaces::UserData;
use crate::ipv4::Ipv4Decoder;
use crate::sctp::{SctpChunkDecoder, SctpDataChunkDecoder, SctpDecoder};
use crate::tcp::TcpDecoder;
use crate::types::ipv4_protocol;
use crate::udp::UdpDecoder;

/// Per-packet scratch state handed to every observer hook. Decoder slots
/// are populated layer by layer during the descent.
pub struct Context {
    pub eth: Option<EthFrameDecoder>,
    pub ipv4: Option<Ipv4Decoder>,
    pub udp: Option<UdpDecoder>,
    pub tcp: Option<TcpDecoder>,
    pub sctp: Option<SctpDecoder>,
    pub sctp_chunk: Option<SctpChunkDecoder>,
    pub sctp_data: Option<SctpDataChunkDecoder>,
    pub gtpv1u: Option<Gtpv1uDecoder>,

    /// When still true after an IPv4 subtree completes, `on_post_ipv4` is
    /// invoked. Hooks clear this to exempt a packet from post-processing.
    pub post_process_ipv4: bool,

    /// Caller-opaque data, shared with recursive descents.
    pub user_data: UserData,
}

impl Context {
    pub fn new(user_data: UserData) -> Self {
        Context {
            eth: None,
            ipv4: None,
            udp: None,
            tcp: None,
            sctp: None,
            sctp_chunk: None,
            sctp_data: None,
            gtpv1u: None,
            post_process_ipv4: true,
            user_data,
        }
    }
}

/// Observation points offered by the pipeline. Every hook defaults to
/// "continue"; implementors override only what they care about.
pub trait PacketObserver {
    fn on_eth(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    fn on_ipv4(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    fn on_udp(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    fn on_tcp(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    fn on_sctp(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    /// Called once per SCTP chunk of any type.
    fn on_sctp_chunk(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    /// Called once per SCTP DATA chunk.
    fn on_sctp_data(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    fn on_gtpv1u(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    /// Called on GTPv1-U packets whose payload is IPv4, before the inner
    /// packet is re-entered into the IPv4 pipeline.
    fn on_gtpv1u_ipv4(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    /// Called on all non-IPv4 traffic.
    fn on_non_ipv4(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    /// Called after an IPv4 subtree completed with continue, unless
    /// `Context::post_process_ipv4` was cleared.
    fn on_post_ipv4(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    /// Called once at the end when nothing stopped processing.
    fn on_final(&mut self, _ctx: &mut Context) {}

    /// Whether `on_final` fires for packets entering at the IPv4 level
    /// (true) or only for Ethernet-level entries (false, the default).
    fn final_on_ipv4(&self) -> bool {
        false
    }
}

/// Feed one Ethernet frame through the pipeline.
pub fn process_eth_packet(
    observer: &mut dyn PacketObserver,
    eth_data: &BufferView,
    user_data: UserData,
) -> NetResult<()> {
    let mut ctx = Context::new(user_data);
    let decoder = EthFrameDecoder::new(eth_data.clone())?;
    let is_ipv4 = decoder.is_ipv4();
    let payload = decoder.data();
    ctx.eth = Some(decoder);

    if observer.on_eth(&mut ctx) {
        if is_ipv4 {
            if process_ipv4_level(observer, &payload, &mut ctx)? {
                observer.on_final(&mut ctx);
            }
        } else if observer.on_non_ipv4(&mut ctx) {
            observer.on_final(&mut ctx);
        }
    }
    Ok(())
}

/// Feed one IPv4 packet through the pipeline (no Ethernet framing).
pub fn process_ipv4_packet(
    observer: &mut dyn PacketObserver,
    ipv4_data: &BufferView,
    user_data: UserData,
) -> NetResult<()> {
    let mut ctx = Context::new(user_data);
    let do_continue = process_ipv4_level(observer, ipv4_data, &mut ctx)?;
    if do_continue && observer.final_on_ipv4() {
        observer.on_final(&mut ctx);
    }
    Ok(())
}

fn process_ipv4_level(
    observer: &mut dyn PacketObserver,
    ipv4_data: &BufferView,
    ctx: &mut Context,
) -> NetResult<bool> {
    let decoder = Ipv4Decoder::new(ipv4_data.clone())?;
    let protocol = decoder.protocol();
    let payload = decoder.data();
    ctx.ipv4 = Some(decoder);

    let mut do_continue = false;
    if observer.on_ipv4(ctx) {
        do_continue = match protocol {
            ipv4_protocol::UDP => process_udp_level(observer, &payload?, ctx)?,
            ipv4_protocol::SCTP => process_sctp_level(observer, &payload?, ctx)?,
            ipv4_protocol::TCP => process_tcp_level(observer, &payload?, ctx)?,
            _ => true,
        };
        if do_continue && ctx.post_process_ipv4 {
            do_continue = observer.on_post_ipv4(ctx);
        }
    }

    ctx.ipv4 = None;
    Ok(do_continue)
}

fn process_udp_level(
    observer: &mut dyn PacketObserver,
    udp_data: &BufferView,
    ctx: &mut Context,
) -> NetResult<bool> {
    let decoder = UdpDecoder::new(udp_data.clone())?;
    let is_gtpv1u = decoder.is_gtpv1u();
    let payload = decoder.data();
    ctx.udp = Some(decoder);

    let mut do_continue = false;
    if observer.on_udp(ctx) {
        if is_gtpv1u {
            do_continue = process_gtpv1u_level(observer, &payload?, ctx)?;
        } else {
            do_continue = true;
        }
    }

    ctx.udp = None;
    Ok(do_continue)
}

fn process_gtpv1u_level(
    observer: &mut dyn PacketObserver,
    gtp_data: &BufferView,
    ctx: &mut Context,
) -> NetResult<bool> {
    let decoder = Gtpv1uDecoder::new(gtp_data.clone())?;
    let is_ipv4_pdu = decoder.is_ipv4_pdu();
    let inner = decoder.data();
    ctx.gtpv1u = Some(decoder);

    let mut do_continue = false;
    if observer.on_gtpv1u(ctx) {
        if is_ipv4_pdu {
            if observer.on_gtpv1u_ipv4(ctx) {
                // Re-enter the IPv4 pipeline over the inner packet with a
                // fresh context sharing only the user data. The outer
                // context is preserved by stack discipline.
                let mut inner_ctx = Context::new(ctx.user_data);
                do_continue = process_ipv4_level(observer, &inner, &mut inner_ctx)?;
            }
        } else {
            do_continue = true;
        }
    }

    ctx.gtpv1u = None;
    Ok(do_continue)
}

fn process_sctp_level(
    observer: &mut dyn PacketObserver,
    sctp_data: &BufferView,
    ctx: &mut Context,
) -> NetResult<bool> {
    let decoder = SctpDecoder::new(sctp_data.clone())?;
    let chunks = decoder.chunks().to_vec();
    ctx.sctp = Some(decoder);

    let mut do_continue = false;
    if observer.on_sctp(ctx) {
        for chunk in chunks {
            let is_data = chunk.is_data();
            let chunk_bytes = chunk.data();
            ctx.sctp_chunk = Some(chunk);

            if observer.on_sctp_chunk(ctx) {
                if is_data {
                    let data_decoder = SctpDataChunkDecoder::new(chunk_bytes)?;
                    ctx.sctp_data = Some(data_decoder);
                    if observer.on_sctp_data(ctx) {
                        do_continue = true;
                    }
                    ctx.sctp_data = None;
                } else {
                    do_continue = true;
                }
            }
            ctx.sctp_chunk = None;
        }
    }

    ctx.sctp = None;
    Ok(do_continue)
}

fn process_tcp_level(
    observer: &mut dyn PacketObserver,
    tcp_data: &BufferView,
    ctx: &mut Context,
) -> NetResult<bool> {
    let decoder = TcpDecoder::new(tcp_data.clone())?;
    ctx.tcp = Some(decoder);
    let do_continue = observer.on_tcp(ctx);
    ctx.tcp = None;
    Ok(do_continue)
}
