//! S1AP PDU fuzzer
//!
//! Decodes arbitrary bytes as an S1AP-PDU and, where the envelope opens,
//! attempts the typed InitialContextSetup extractions, including the NAS
//! walk behind the request.
//!
//! Run with: cargo +nightly fuzz run fuzz_s1ap_pdu

#![no_main]

use libfuzzer_sys::fuzz_target;
use upf_s1ap::{nas, S1apPdu};

fuzz_target!(|data: &[u8]| {
    if let Ok(pdu) = S1apPdu::decode(data) {
        let _ = pdu.initial_context_setup_request();
        let _ = pdu.initial_context_setup_response();
    }
    let _ = nas::ue_ipv4_from_nas(data);
});
