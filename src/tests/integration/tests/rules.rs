//! Rule grammar and matching scenarios.

use std::net::Ipv4Addr;

use upf_integration_tests::{ipv4_packet, udp_datagram, view};
use upf_net::ipv4::Ipv4Decoder;
use upf_router::{MatchingRule, RuleMatcher};

fn udp_to(dst: Ipv4Addr, dst_port: u16) -> Ipv4Decoder {
    let packet = ipv4_packet(
        Ipv4Addr::new(172, 16, 0, 1),
        dst,
        17,
        &udp_datagram(5555, dst_port, &[]),
    );
    Ipv4Decoder::new(view(packet)).unwrap()
}

#[test]
fn gtp_rule_matches_only_its_subnet_and_port() {
    let rule: MatchingRule = "17-10.0.0.0/8-2152".parse().unwrap();
    assert_eq!(rule.protocol, 17);
    assert_eq!(rule.dst_cidr.addr(), Ipv4Addr::new(10, 0, 0, 0));
    assert_eq!(rule.dst_cidr.prefix(), 8);
    assert_eq!(rule.dst_port, 2152);

    let mut matcher = RuleMatcher::new();
    matcher.add_rule(rule, 0);

    assert!(matcher.matches(&udp_to(Ipv4Addr::new(10, 1, 2, 3), 2152)));
    assert!(!matcher.matches(&udp_to(Ipv4Addr::new(11, 0, 0, 1), 2152)));
    assert!(!matcher.matches(&udp_to(Ipv4Addr::new(10, 1, 2, 3), 2153)));
}

#[test]
fn catch_all_rule_matches_everything() {
    let mut matcher = RuleMatcher::new();
    matcher.add_rule("*-0.0.0.0/0-*".parse().unwrap(), 0);
    assert!(matcher.matches(&udp_to(Ipv4Addr::new(203, 0, 113, 200), 1)));
    assert!(matcher.matches(&udp_to(Ipv4Addr::new(0, 0, 0, 1), 65535)));
}

#[test]
fn first_match_over_ordered_rules() {
    let mut matcher = RuleMatcher::new();
    matcher.add_rule("17-10.0.0.0/8-*".parse().unwrap(), RuleMatcher::END_POSITION);
    matcher.add_rule("*-0.0.0.0/0-*".parse().unwrap(), RuleMatcher::END_POSITION);
    // Whatever the order of evaluation lands on, a match is a match;
    // removing the catch-all narrows it back down.
    assert!(matcher.matches(&udp_to(Ipv4Addr::new(203, 0, 113, 1), 80)));
    matcher.del_rule(1);
    assert!(!matcher.matches(&udp_to(Ipv4Addr::new(203, 0, 113, 1), 80)));
    assert!(matcher.matches(&udp_to(Ipv4Addr::new(10, 9, 9, 9), 80)));
}

#[test]
fn rule_list_positions_are_stable() {
    let a: MatchingRule = "1-1.0.0.0/8-*".parse().unwrap();
    let b: MatchingRule = "2-2.0.0.0/8-*".parse().unwrap();

    let mut matcher = RuleMatcher::new();
    matcher.add_rule(a, 100); // clamped to the end
    matcher.add_rule(b, 0);
    assert_eq!(matcher.rules(), [b, a]);
    matcher.del_rule(0);
    assert_eq!(matcher.rules(), [a]);
}

#[test]
fn malformed_rules_are_rejected() {
    for bad in ["", "x", "*-*-*", "17-1.2.3.4-80", "17-1.2.3.4/40-80"] {
        assert!(bad.parse::<MatchingRule>().is_err(), "{bad:?} parsed");
    }
}
