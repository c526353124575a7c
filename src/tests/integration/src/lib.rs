//! Shared builders for the end-to-end tests
//!
//! Frames are built the way they appear on the S1 interfaces: S1AP
//! signalling as Ethernet/IPv4/SCTP-DATA, user traffic as plain IPv4.

use std::net::Ipv4Addr;

use upf_core::{BufferView, BufferWritableView};
use upf_s1ap::{
    nas, ErabSetupRequestItem, ErabSetupResponseItem, InitialContextSetupRequest,
    InitialContextSetupResponse,
};

/// A minimal IPv4 packet with the given protocol and payload.
pub fn ipv4_packet(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Vec<u8> {
    let total = 20 + payload.len();
    let mut b = vec![0u8; total];
    b[0] = 0x45;
    b[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    b[8] = 64;
    b[9] = protocol;
    b[12..16].copy_from_slice(&src.octets());
    b[16..20].copy_from_slice(&dst.octets());
    b[20..].copy_from_slice(payload);
    b
}

/// A UDP datagram.
pub fn udp_datagram(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut b = vec![0u8; 8 + payload.len()];
    b[0..2].copy_from_slice(&src_port.to_be_bytes());
    b[2..4].copy_from_slice(&dst_port.to_be_bytes());
    b[4..6].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    b[8..].copy_from_slice(payload);
    b
}

/// An Ethernet frame around `payload` with the given EtherType.
pub fn eth_frame(dst: [u8; 6], src: [u8; 6], ether_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut b = Vec::with_capacity(14 + payload.len());
    b.extend_from_slice(&dst);
    b.extend_from_slice(&src);
    b.extend_from_slice(&ether_type.to_be_bytes());
    b.extend_from_slice(payload);
    b
}

/// An S1AP payload wrapped as one unfragmented SCTP DATA chunk inside
/// Ethernet/IPv4 framing, as captured on the S1-MME interface.
pub fn s1ap_eth_frame(s1ap: &[u8]) -> Vec<u8> {
    let mut chunk = vec![0u8; 16];
    chunk[0] = 0; // DATA
    chunk[1] = 0x03; // B | E: a complete user message
    chunk[2..4].copy_from_slice(&((16 + s1ap.len()) as u16).to_be_bytes());
    chunk[4..8].copy_from_slice(&1u32.to_be_bytes());
    chunk[12..16].copy_from_slice(&0x12u32.to_be_bytes()); // S1AP PPID
    chunk.extend_from_slice(s1ap);

    let mut sctp = vec![0u8; 12];
    sctp[0..2].copy_from_slice(&36412u16.to_be_bytes());
    sctp[2..4].copy_from_slice(&36412u16.to_be_bytes());
    sctp.extend_from_slice(&chunk);
    while sctp.len() % 4 != 0 {
        sctp.push(0);
    }

    let ip = ipv4_packet(
        Ipv4Addr::new(10, 0, 0, 100),
        Ipv4Addr::new(10, 0, 0, 200),
        132,
        &sctp,
    );
    eth_frame([0xff; 6], [0x02, 0, 0, 0, 0, 1], 0x0800, &ip)
}

/// The S1AP bytes of an InitialContextSetupRequest for one default bearer.
pub fn setup_request(
    mme: u32,
    enb: u32,
    rab: u8,
    epc_tla: Ipv4Addr,
    epc_teid: u32,
    ue: Ipv4Addr,
) -> Vec<u8> {
    InitialContextSetupRequest {
        mme_ue_s1ap_id: mme,
        enb_ue_s1ap_id: enb,
        e_rabs: vec![ErabSetupRequestItem {
            e_rab_id: rab,
            transport_layer_address: epc_tla,
            gtp_teid: epc_teid,
            nas_pdu: Some(nas::build_attach_accept(ue)),
            ue_ipv4: Some(ue),
        }],
    }
    .encode()
    .expect("request builds")
    .to_vec()
}

/// The S1AP bytes of the matching InitialContextSetupResponse.
pub fn setup_response(mme: u32, enb: u32, rab: u8, enb_tla: Ipv4Addr, enb_teid: u32) -> Vec<u8> {
    InitialContextSetupResponse {
        mme_ue_s1ap_id: mme,
        enb_ue_s1ap_id: enb,
        e_rabs: vec![ErabSetupResponseItem {
            e_rab_id: rab,
            transport_layer_address: enb_tla,
            gtp_teid: enb_teid,
        }],
    }
    .encode()
    .expect("response builds")
    .to_vec()
}

/// Wrap raw bytes in a read-only view.
pub fn view(bytes: Vec<u8>) -> BufferView {
    BufferWritableView::from_vec(bytes).as_view()
}
