//! S1AP session-setup decoding
//!
//! A deliberately narrow S1AP implementation: enough aligned-PER (X.691)
//! to open an S1AP-PDU envelope, plus typed extraction and building of the
//! two messages the user plane learns sessions from,
//! `InitialContextSetupRequest` and `InitialContextSetupResponse`. The UE
//! address is recovered from the NAS PDN Address information element
//! embedded in the request's NAS-PDU.

pub mod error;
pub mod nas;
pub mod pdu;
pub mod per;
pub mod types;

#[cfg(test)]
mod property_tests;

pub use error::{S1apError, S1apResult};
pub use nas::ue_ipv4_from_nas;
pub use pdu::{
    ErabSetupRequestItem, ErabSetupResponseItem, InitialContextSetupRequest,
    InitialContextSetupResponse, S1apPdu,
};
