//! Encapsulation end to end: learned tunnels drive the direction, TEID and
//! headers of the encapsulating sink's output.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use upf_core::BufferWritableView;
use upf_integration_tests::{ipv4_packet, s1ap_eth_frame, setup_request, setup_response, view};
use upf_net::gtp::Gtpv1uDecoder;
use upf_net::interfaces::Ipv4PacketTap;
use upf_net::ipv4::Ipv4Decoder;
use upf_net::types::Ipv4IdSource;
use upf_net::udp::UdpDecoder;
use upf_net::{Ipv4PacketSink, UserData};
use upf_router::{Gtpv1uEncapSink, Router};

const UE: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);
const EPC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const ENB: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const REMOTE: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

fn learned_router() -> Rc<RefCell<Router>> {
    let mut router = Router::new();
    router
        .process_eth_packet(
            &view(s1ap_eth_frame(&setup_request(7, 9, 5, EPC, 0x100, UE))),
            UserData::default(),
        )
        .unwrap();
    router
        .process_eth_packet(
            &view(s1ap_eth_frame(&setup_response(7, 9, 5, ENB, 0x200))),
            UserData::default(),
        )
        .unwrap();
    Rc::new(RefCell::new(router))
}

fn fold16(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

#[test]
fn downlink_traffic_is_tunnelled_to_the_enb() {
    let _ = env_logger::try_init();

    let tap = Rc::new(RefCell::new(Ipv4PacketTap::new()));
    let mut sink = Gtpv1uEncapSink::new(
        tap.clone(),
        BufferWritableView::alloc(4096),
        learned_router(),
        Ipv4IdSource::new(),
    )
    .unwrap();

    let inner = ipv4_packet(REMOTE, UE, 17, &[1, 2, 3, 4]);
    let mut user_data = UserData::default();
    sink.consume_ipv4(&view(inner.clone()), &mut user_data);

    assert_eq!(user_data.int, 1);
    let tap = tap.borrow();
    let outer = Ipv4Decoder::new(tap.last_ipv4().clone()).unwrap();
    assert_eq!(outer.src_addr(), EPC);
    assert_eq!(outer.dst_addr(), ENB);
    assert!(outer.is_udp());

    let udp = UdpDecoder::new(outer.data().unwrap()).unwrap();
    assert_eq!(udp.dst_port(), 2152);
    assert!(udp.is_gtpv1u());

    let gtp = Gtpv1uDecoder::new(udp.data().unwrap()).unwrap();
    assert_eq!(gtp.teid(), 0x200);
    assert_eq!(gtp.data().to_vec(), inner);

    // The emitted IPv4 header checksum verifies.
    let header = tap.last_ipv4().sub(0, 20).unwrap();
    assert_eq!(fold16(header.sum16()), 0xffff);
}

#[test]
fn uplink_traffic_is_tunnelled_to_the_epc() {
    let _ = env_logger::try_init();

    let tap = Rc::new(RefCell::new(Ipv4PacketTap::new()));
    let mut sink = Gtpv1uEncapSink::new(
        tap.clone(),
        BufferWritableView::alloc(4096),
        learned_router(),
        Ipv4IdSource::new(),
    )
    .unwrap();

    let inner = ipv4_packet(UE, REMOTE, 6, &[0u8; 20]);
    let mut user_data = UserData::default();
    sink.consume_ipv4(&view(inner.clone()), &mut user_data);

    assert_eq!(user_data.int, 0);
    let tap = tap.borrow();
    let outer = Ipv4Decoder::new(tap.last_ipv4().clone()).unwrap();
    assert_eq!(outer.src_addr(), ENB);
    assert_eq!(outer.dst_addr(), EPC);

    let udp = UdpDecoder::new(outer.data().unwrap()).unwrap();
    let gtp = Gtpv1uDecoder::new(udp.data().unwrap()).unwrap();
    assert_eq!(gtp.teid(), 0x100);
    assert_eq!(gtp.data().to_vec(), inner);
}

#[test]
fn encapsulated_output_reenters_the_pipeline_cleanly() {
    // The sink's output, fed back into a router, descends through
    // UDP/GTPv1-U into the inner packet.
    let _ = env_logger::try_init();

    let tap = Rc::new(RefCell::new(Ipv4PacketTap::new()));
    let router = learned_router();
    let mut sink = Gtpv1uEncapSink::new(
        tap.clone(),
        BufferWritableView::alloc(4096),
        router.clone(),
        Ipv4IdSource::new(),
    )
    .unwrap();

    let inner = ipv4_packet(REMOTE, UE, 17, &udp_payload());
    let mut user_data = UserData::default();
    sink.consume_ipv4(&view(inner), &mut user_data);

    let seen = Rc::new(RefCell::new(None));
    let seen2 = seen.clone();
    {
        let mut router = router.borrow_mut();
        router.on_gtpv1u_ipv4(move |ctx| {
            if let Some(gtp) = &ctx.gtpv1u {
                *seen2.borrow_mut() = Some(gtp.teid());
            }
            true
        });
    }
    let outer = tap.borrow().last_ipv4().clone();
    router
        .borrow_mut()
        .process_ipv4_packet(&outer, UserData::default())
        .unwrap();

    assert_eq!(*seen.borrow(), Some(0x200));
}

fn udp_payload() -> Vec<u8> {
    upf_integration_tests::udp_datagram(1000, 53, &[0xaa; 12])
}

#[test]
fn unknown_destination_produces_hole_marker_when_asked() {
    let _ = env_logger::try_init();

    let tap = Rc::new(RefCell::new(Ipv4PacketTap::new()));
    let mut sink = Gtpv1uEncapSink::new(
        tap.clone(),
        BufferWritableView::alloc(4096),
        learned_router(),
        Ipv4IdSource::new(),
    )
    .unwrap();
    sink.on_unknown_ue(|_| true);

    let stranger = ipv4_packet(REMOTE, Ipv4Addr::new(203, 0, 113, 77), 17, &[]);
    let mut user_data = UserData::default();
    sink.consume_ipv4(&view(stranger), &mut user_data);

    assert_eq!(user_data.int, 3);
    assert!(tap.borrow().last_ipv4().is_empty());
}
