//! Pipeline traversal scenarios across real frame layouts.

use std::net::Ipv4Addr;

use upf_integration_tests::{eth_frame, ipv4_packet, udp_datagram, view};
use upf_net::processor::{self, Context, PacketObserver};
use upf_net::UserData;

#[derive(Default)]
struct Trace {
    calls: Vec<String>,
}

impl PacketObserver for Trace {
    fn on_eth(&mut self, ctx: &mut Context) -> bool {
        let eth = ctx.eth.as_ref().expect("eth decoder installed");
        self.calls.push(format!("eth:{:#06x}", eth.ether_type()));
        true
    }

    fn on_ipv4(&mut self, ctx: &mut Context) -> bool {
        let ipv4 = ctx.ipv4.as_ref().expect("ipv4 decoder installed");
        self.calls
            .push(format!("ipv4:{}->{}", ipv4.src_addr(), ipv4.dst_addr()));
        true
    }

    fn on_udp(&mut self, ctx: &mut Context) -> bool {
        let udp = ctx.udp.as_ref().expect("udp decoder installed");
        self.calls.push(format!(
            "udp:{}->{}:{}",
            udp.src_port(),
            udp.dst_port(),
            udp.data_len_bytes().unwrap_or(0)
        ));
        true
    }

    fn on_final(&mut self, _ctx: &mut Context) {
        self.calls.push("final".into());
    }
}

#[test]
fn udp_frame_walks_eth_ipv4_udp_in_order() {
    let _ = env_logger::try_init();

    // Broadcast frame carrying a 28-byte IPv4/UDP packet with no payload.
    let udp = udp_datagram(1, 2, &[]);
    let ip = ipv4_packet(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        17,
        &udp,
    );
    let frame = eth_frame([0xff; 6], [0x00, 0x11, 0x22, 0x33, 0x44, 0x55], 0x0800, &ip);

    let mut trace = Trace::default();
    processor::process_eth_packet(&mut trace, &view(frame), UserData::default()).unwrap();

    assert_eq!(
        trace.calls,
        [
            "eth:0x0800",
            "ipv4:10.0.0.1->10.0.0.2",
            "udp:1->2:0",
            "final"
        ]
    );
}

#[test]
fn decoders_are_gone_after_their_subtree() {
    struct CheckScopes;
    impl PacketObserver for CheckScopes {
        fn on_post_ipv4(&mut self, ctx: &mut Context) -> bool {
            // The transport decoders are installed below IPv4 and must be
            // cleared again before post-processing runs.
            assert!(ctx.ipv4.is_some());
            assert!(ctx.udp.is_none());
            assert!(ctx.tcp.is_none());
            true
        }
        fn on_final(&mut self, ctx: &mut Context) {
            assert!(ctx.ipv4.is_none());
        }
    }

    let udp = udp_datagram(5, 6, &[9]);
    let ip = ipv4_packet(
        Ipv4Addr::new(1, 1, 1, 1),
        Ipv4Addr::new(2, 2, 2, 2),
        17,
        &udp,
    );
    let frame = eth_frame([0xff; 6], [2; 6], 0x0800, &ip);
    processor::process_eth_packet(&mut CheckScopes, &view(frame), UserData::default()).unwrap();
}

#[test]
fn user_data_is_shared_with_recursive_descent() {
    struct CollectUserData {
        inner_seen: bool,
    }
    impl PacketObserver for CollectUserData {
        fn on_ipv4(&mut self, ctx: &mut Context) -> bool {
            if ctx.gtpv1u.is_none() && ctx.udp.is_none() {
                // Either the outer packet or the re-entered inner one;
                // both must carry the caller's marker.
                assert_eq!(ctx.user_data.int, 42);
            }
            self.inner_seen |= ctx.eth.is_none();
            true
        }
    }

    // Outer IPv4/UDP/GTP around an inner IPv4 packet.
    let inner = ipv4_packet(
        Ipv4Addr::new(192, 0, 2, 7),
        Ipv4Addr::new(8, 8, 8, 8),
        17,
        &udp_datagram(7, 8, &[]),
    );
    let mut gtp = vec![0x30, 0xff, 0, 0, 0, 0, 0, 9];
    gtp[2..4].copy_from_slice(&(inner.len() as u16).to_be_bytes());
    gtp.extend_from_slice(&inner);
    let outer = ipv4_packet(
        Ipv4Addr::new(10, 0, 0, 2),
        Ipv4Addr::new(10, 0, 0, 1),
        17,
        &udp_datagram(2152, 2152, &gtp),
    );
    let frame = eth_frame([0xff; 6], [2; 6], 0x0800, &outer);

    let mut observer = CollectUserData { inner_seen: false };
    let user_data = UserData {
        int: 42,
        ..Default::default()
    };
    processor::process_eth_packet(&mut observer, &view(frame), user_data).unwrap();
    assert!(observer.inner_seen);
}

#[test]
fn vlan_tagged_signalling_still_reaches_ipv4() {
    let udp = udp_datagram(1, 2, &[]);
    let ip = ipv4_packet(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        17,
        &udp,
    );
    // 802.1ad + 802.1Q stacked tags before the IPv4 EtherType.
    let mut frame = Vec::new();
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 1]);
    frame.extend_from_slice(&[0x88, 0xa8, 0x00, 0x64]);
    frame.extend_from_slice(&[0x81, 0x00, 0x00, 0x0a]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend_from_slice(&ip);

    let mut trace = Trace::default();
    processor::process_eth_packet(&mut trace, &view(frame), UserData::default()).unwrap();
    assert!(trace.calls.iter().any(|c| c.starts_with("ipv4:")));
}
