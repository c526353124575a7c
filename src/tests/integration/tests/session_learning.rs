//! Session learning end to end: S1AP signalling read from a pcap capture
//! populates the UE map.

use std::io::Cursor;
use std::net::Ipv4Addr;

use upf_core::{BufferPool, BufferWritableView};
use upf_integration_tests::{s1ap_eth_frame, setup_request, setup_response, view};
use upf_net::pcap::{PcapReader, PcapWriter};
use upf_net::{EthPacketSource, UserData};
use upf_router::Router;

const UE: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);
const EPC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const ENB: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

fn capture_with(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut writer = PcapWriter::new_ethernet(Vec::new()).unwrap();
    for (i, frame) in frames.iter().enumerate() {
        writer
            .write_record(i as u32, 0, &view(frame.clone()))
            .unwrap();
    }
    writer.into_inner()
}

#[test]
fn request_and_response_from_pcap_build_the_ue_map() {
    let _ = env_logger::try_init();

    let capture = capture_with(&[
        s1ap_eth_frame(&setup_request(7, 9, 5, EPC, 0x100, UE)),
        s1ap_eth_frame(&setup_response(7, 9, 5, ENB, 0x200)),
    ]);

    let pool = BufferPool::new(4, 4096);
    let mut reader = PcapReader::new(Cursor::new(capture), 1).unwrap();
    let mut router = Router::new();

    while EthPacketSource::packet_available(&mut reader) {
        let buffer = pool.acquire().unwrap();
        let frame = reader.get_eth(&buffer).unwrap();
        router
            .process_eth_packet(&frame.as_view(), UserData::default())
            .unwrap();
    }

    let tunnel = router.ue_map().get(&UE).expect("UE learned");
    assert_eq!(tunnel.enb.ipv4, ENB);
    assert_eq!(tunnel.enb.port, 2152);
    assert_eq!(tunnel.enb.teid, 0x200);
    assert_eq!(tunnel.epc.ipv4, EPC);
    assert_eq!(tunnel.epc.port, 2152);
    assert_eq!(tunnel.epc.teid, 0x100);

    // All pool buffers returned once their views are gone.
    assert_eq!(pool.free_count(), 4);
}

#[test]
fn response_without_request_leaves_the_map_empty() {
    let _ = env_logger::try_init();

    let mut router = Router::new();
    router
        .process_eth_packet(
            &view(s1ap_eth_frame(&setup_response(7, 9, 5, ENB, 0x200))),
            UserData::default(),
        )
        .unwrap();

    assert!(router.ue_map().is_empty());
    assert_eq!(router.pending_setups(), 0);
}

#[test]
fn a_second_setup_overwrites_the_ue_entry() {
    let _ = env_logger::try_init();

    let mut router = Router::new();
    for (epc_teid, enb_teid) in [(0x100u32, 0x200u32), (0x111, 0x222)] {
        router
            .process_eth_packet(
                &view(s1ap_eth_frame(&setup_request(7, 9, 5, EPC, epc_teid, UE))),
                UserData::default(),
            )
            .unwrap();
        router
            .process_eth_packet(
                &view(s1ap_eth_frame(&setup_response(7, 9, 5, ENB, enb_teid))),
                UserData::default(),
            )
            .unwrap();
    }

    let tunnel = router.ue_map().get(&UE).unwrap();
    assert_eq!(tunnel.epc.teid, 0x111);
    assert_eq!(tunnel.enb.teid, 0x222);
}

#[test]
fn undecodable_frames_do_not_stop_the_stream() {
    let _ = env_logger::try_init();

    let mut router = Router::new();
    // A frame that dissects down to a bogus IPv4 header.
    let garbage = upf_integration_tests::eth_frame(
        [0xff; 6],
        [0x02, 0, 0, 0, 0, 1],
        0x0800,
        &[0x60, 0, 0, 0],
    );
    assert!(router
        .process_eth_packet(&view(garbage), UserData::default())
        .is_err());

    // The next packets proceed with a fresh context.
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
    assert!(router.ue_map().contains_key(&UE));
}

#[test]
fn buffer_pool_exhaustion_is_reported_not_fatal() {
    let pool = BufferPool::new(1, 512);
    let held: BufferWritableView = pool.acquire().unwrap();
    assert!(pool.acquire().is_err());
    drop(held);
    assert!(pool.acquire().is_ok());
}
