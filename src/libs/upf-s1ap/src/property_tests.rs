//! Property-based tests over the PER codec and the message builders

use std::net::Ipv4Addr;

use proptest::prelude::*;

use crate::pdu::{
    ErabSetupRequestItem, ErabSetupResponseItem, InitialContextSetupRequest,
    InitialContextSetupResponse, S1apPdu,
};
use crate::per::{AperDecoder, AperEncoder, Constraint};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Constrained whole numbers round-trip for every range class the
    /// codec distinguishes.
    #[test]
    fn prop_constrained_integer_roundtrip(
        value in 0u32..=4294967295,
    ) {
        for c in [
            Constraint::new(0, 15),
            Constraint::new(0, 255),
            Constraint::new(0, 65535),
            Constraint::new(0, 16777215),
            Constraint::new(0, 4294967295),
        ] {
            let clamped = i64::from(value).min(c.max);
            let mut e = AperEncoder::new();
            e.constrained_whole_number(clamped, &c).unwrap();
            e.align();
            let bytes = e.into_bytes();
            let mut d = AperDecoder::new(&bytes);
            prop_assert_eq!(d.constrained_whole_number(&c).unwrap(), clamped);
        }
    }

    /// Octet strings of any content round-trip.
    #[test]
    fn prop_octet_string_roundtrip(data in prop::collection::vec(any::<u8>(), 0..300)) {
        let mut e = AperEncoder::new();
        e.octet_string(&data).unwrap();
        let bytes = e.into_bytes();
        let mut d = AperDecoder::new(&bytes);
        prop_assert_eq!(d.octet_string().unwrap(), data);
    }

    /// Building a request and decoding it back preserves the identifiers,
    /// the transport address and the TEID of every E-RAB item.
    #[test]
    fn prop_request_build_decode_roundtrip(
        mme in any::<u32>(),
        enb in 0u32..16777216,
        rab in 0u8..16,
        tla in any::<[u8; 4]>(),
        teid in any::<u32>(),
        ue in any::<[u8; 4]>(),
    ) {
        let ue = Ipv4Addr::from(ue);
        let bytes = InitialContextSetupRequest {
            mme_ue_s1ap_id: mme,
            enb_ue_s1ap_id: enb,
            e_rabs: vec![ErabSetupRequestItem {
                e_rab_id: rab,
                transport_layer_address: Ipv4Addr::from(tla),
                gtp_teid: teid,
                nas_pdu: Some(crate::nas::build_attach_accept(ue)),
                ue_ipv4: Some(ue),
            }],
        }.encode().unwrap();

        let decoded = S1apPdu::decode(&bytes).unwrap()
            .initial_context_setup_request().unwrap().unwrap();
        prop_assert_eq!(decoded.mme_ue_s1ap_id, mme);
        prop_assert_eq!(decoded.enb_ue_s1ap_id, enb);
        prop_assert_eq!(decoded.e_rabs[0].e_rab_id, rab);
        prop_assert_eq!(decoded.e_rabs[0].transport_layer_address, Ipv4Addr::from(tla));
        prop_assert_eq!(decoded.e_rabs[0].gtp_teid, teid);
        prop_assert_eq!(decoded.e_rabs[0].ue_ipv4, Some(ue));
    }

    /// Same for responses.
    #[test]
    fn prop_response_build_decode_roundtrip(
        mme in any::<u32>(),
        enb in 0u32..16777216,
        rab in 0u8..16,
        tla in any::<[u8; 4]>(),
        teid in any::<u32>(),
    ) {
        let bytes = InitialContextSetupResponse {
            mme_ue_s1ap_id: mme,
            enb_ue_s1ap_id: enb,
            e_rabs: vec![ErabSetupResponseItem {
                e_rab_id: rab,
                transport_layer_address: Ipv4Addr::from(tla),
                gtp_teid: teid,
            }],
        }.encode().unwrap();

        let decoded = S1apPdu::decode(&bytes).unwrap()
            .initial_context_setup_response().unwrap().unwrap();
        prop_assert_eq!(decoded.mme_ue_s1ap_id, mme);
        prop_assert_eq!(decoded.enb_ue_s1ap_id, enb);
        prop_assert_eq!(decoded.e_rabs[0].gtp_teid, teid);
    }

    /// The PDU decoder never panics on arbitrary input.
    #[test]
    fn prop_pdu_decode_is_total(bytes in prop::collection::vec(any::<u8>(), 0..200)) {
        let _ = S1apPdu::decode(&bytes);
    }
}
