//! S1AP-PDU envelope and the InitialContextSetup messages
//!
//! The envelope (`S1AP-PDU ::= CHOICE { initiatingMessage,
//! successfulOutcome, unsuccessfulOutcome }`) is decoded for every PDU;
//! typed extraction is provided only for `InitialContextSetupRequest` and
//! `InitialContextSetupResponse`, the two messages session learning needs.
//! Builders for the same two messages are provided for the tests and for
//! traffic generation; they emit a default QoS profile (QCI 9, lowest
//! priority, no pre-emption), which the user plane never inspects.

use std::net::Ipv4Addr;

use bytes::Bytes;

use crate::error::{S1apError, S1apResult};
use crate::nas;
use crate::per::{AperDecoder, AperEncoder, Constraint};
use crate::types::{Criticality, ProcedureCode, ProtocolIeContainer, ProtocolIeField, ProtocolIeId};

const MME_UE_S1AP_ID: Constraint = Constraint::new(0, 4294967295);
const ENB_UE_S1AP_ID: Constraint = Constraint::new(0, 16777215);
const E_RAB_ID: Constraint = Constraint::extensible(0, 15);
const QCI: Constraint = Constraint::new(0, 255);
const PRIORITY_LEVEL: Constraint = Constraint::new(0, 15);
const PRE_EMPTION: Constraint = Constraint::new(0, 1);
const BIT_RATE: Constraint = Constraint::new(0, 10_000_000_000);

const E_RAB_LIST_MIN: usize = 1;
const E_RAB_LIST_MAX: usize = 256;

const TLA_MIN_BITS: usize = 1;
const TLA_MAX_BITS: usize = 160;

/// Common part of all three S1AP-PDU alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub procedure_code: ProcedureCode,
    pub criticality: Criticality,
    pub ies: ProtocolIeContainer,
}

/// A decoded S1AP-PDU envelope. IE values stay as raw open-type bytes
/// until one of the typed extractors is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S1apPdu {
    InitiatingMessage(MessageEnvelope),
    SuccessfulOutcome(MessageEnvelope),
    UnsuccessfulOutcome(MessageEnvelope),
}

impl S1apPdu {
    const ALTERNATIVES: usize = 3;

    pub fn decode(data: &[u8]) -> S1apResult<Self> {
        let mut decoder = AperDecoder::new(data);
        let index = decoder.choice_index(Self::ALTERNATIVES, true)?;

        let procedure_code = ProcedureCode::decode(&mut decoder)?;
        let criticality = Criticality::decode(&mut decoder)?;
        let value = decoder.open_type()?;

        let mut value_decoder = AperDecoder::new(&value);
        // Every message of interest is `SEQUENCE { protocolIEs ... , ... }`:
        // one extension bit, then the IE container.
        let _extended = value_decoder.read_bit()?;
        let ies = ProtocolIeContainer::decode(&mut value_decoder)?;

        let envelope = MessageEnvelope {
            procedure_code,
            criticality,
            ies,
        };
        match index {
            0 => Ok(S1apPdu::InitiatingMessage(envelope)),
            1 => Ok(S1apPdu::SuccessfulOutcome(envelope)),
            2 => Ok(S1apPdu::UnsuccessfulOutcome(envelope)),
            _ => Err(S1apError::InvalidChoiceIndex {
                index,
                max: Self::ALTERNATIVES - 1,
            }),
        }
    }

    pub fn envelope(&self) -> &MessageEnvelope {
        match self {
            S1apPdu::InitiatingMessage(e)
            | S1apPdu::SuccessfulOutcome(e)
            | S1apPdu::UnsuccessfulOutcome(e) => e,
        }
    }

    /// Typed view when this PDU is an InitialContextSetupRequest.
    pub fn initial_context_setup_request(
        &self,
    ) -> S1apResult<Option<InitialContextSetupRequest>> {
        match self {
            S1apPdu::InitiatingMessage(env)
                if env.procedure_code == ProcedureCode::INITIAL_CONTEXT_SETUP =>
            {
                InitialContextSetupRequest::from_ies(&env.ies).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Typed view when this PDU is an InitialContextSetupResponse.
    pub fn initial_context_setup_response(
        &self,
    ) -> S1apResult<Option<InitialContextSetupResponse>> {
        match self {
            S1apPdu::SuccessfulOutcome(env)
                if env.procedure_code == ProcedureCode::INITIAL_CONTEXT_SETUP =>
            {
                InitialContextSetupResponse::from_ies(&env.ies).map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// One E-RABToBeSetupItemCtxtSUReq, reduced to the fields session learning
/// uses. `ue_ipv4` is recovered from the NAS-PDU when one is present and
/// carries an IPv4 PDN address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErabSetupRequestItem {
    pub e_rab_id: u8,
    /// EPC-side transport address
    pub transport_layer_address: Ipv4Addr,
    /// UE -> EPC tunnel TEID
    pub gtp_teid: u32,
    pub nas_pdu: Option<Vec<u8>>,
    pub ue_ipv4: Option<Ipv4Addr>,
}

/// InitialContextSetupRequest, reduced to the session-learning fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialContextSetupRequest {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub e_rabs: Vec<ErabSetupRequestItem>,
}

impl InitialContextSetupRequest {
    fn from_ies(ies: &ProtocolIeContainer) -> S1apResult<Self> {
        let mme_ue_s1ap_id = decode_integer_ie(
            ies,
            ProtocolIeId::MME_UE_S1AP_ID,
            &MME_UE_S1AP_ID,
            "MME-UE-S1AP-ID",
        )? as u32;
        let enb_ue_s1ap_id = decode_integer_ie(
            ies,
            ProtocolIeId::ENB_UE_S1AP_ID,
            &ENB_UE_S1AP_ID,
            "eNB-UE-S1AP-ID",
        )? as u32;

        let list = ies
            .find(ProtocolIeId::E_RAB_TO_BE_SETUP_LIST_CTXT_SU_REQ)
            .ok_or(S1apError::MissingIe("E-RABToBeSetupListCtxtSUReq"))?;

        let mut decoder = AperDecoder::new(&list.value);
        let count = decoder.constrained_length(E_RAB_LIST_MIN, E_RAB_LIST_MAX)?;
        let mut e_rabs = Vec::with_capacity(count);
        for _ in 0..count {
            let field = ProtocolIeField::decode(&mut decoder)?;
            if field.id != ProtocolIeId::E_RAB_TO_BE_SETUP_ITEM_CTXT_SU_REQ {
                return Err(S1apError::Malformed("unexpected IE in E-RAB setup list"));
            }
            let mut item_decoder = AperDecoder::new(&field.value);
            e_rabs.push(decode_request_item(&mut item_decoder)?);
        }

        Ok(InitialContextSetupRequest {
            mme_ue_s1ap_id,
            enb_ue_s1ap_id,
            e_rabs,
        })
    }

    /// Build the APER encoding of this request (see module docs for the
    /// QoS fields emitted).
    pub fn encode(&self) -> S1apResult<Bytes> {
        let mut list = AperEncoder::new();
        list.constrained_length(self.e_rabs.len(), E_RAB_LIST_MIN, E_RAB_LIST_MAX)?;
        for item in &self.e_rabs {
            let mut enc = AperEncoder::new();
            encode_request_item(&mut enc, item)?;
            enc.align();
            ProtocolIeField {
                id: ProtocolIeId::E_RAB_TO_BE_SETUP_ITEM_CTXT_SU_REQ,
                criticality: Criticality::Reject,
                value: enc.into_bytes().to_vec(),
            }
            .encode(&mut list)?;
        }
        list.align();

        let ies = vec![
            integer_ie(ProtocolIeId::MME_UE_S1AP_ID, self.mme_ue_s1ap_id, &MME_UE_S1AP_ID)?,
            integer_ie(
                ProtocolIeId::ENB_UE_S1AP_ID,
                self.enb_ue_s1ap_id,
                &ENB_UE_S1AP_ID,
            )?,
            ProtocolIeField {
                id: ProtocolIeId::E_RAB_TO_BE_SETUP_LIST_CTXT_SU_REQ,
                criticality: Criticality::Reject,
                value: list.into_bytes().to_vec(),
            },
        ];
        encode_envelope(0, ies)
    }
}

/// One E-RABSetupItemCtxtSURes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErabSetupResponseItem {
    pub e_rab_id: u8,
    /// eNodeB-side transport address
    pub transport_layer_address: Ipv4Addr,
    /// EPC -> UE tunnel TEID
    pub gtp_teid: u32,
}

/// InitialContextSetupResponse, reduced to the session-learning fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialContextSetupResponse {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub e_rabs: Vec<ErabSetupResponseItem>,
}

impl InitialContextSetupResponse {
    fn from_ies(ies: &ProtocolIeContainer) -> S1apResult<Self> {
        let mme_ue_s1ap_id = decode_integer_ie(
            ies,
            ProtocolIeId::MME_UE_S1AP_ID,
            &MME_UE_S1AP_ID,
            "MME-UE-S1AP-ID",
        )? as u32;
        let enb_ue_s1ap_id = decode_integer_ie(
            ies,
            ProtocolIeId::ENB_UE_S1AP_ID,
            &ENB_UE_S1AP_ID,
            "eNB-UE-S1AP-ID",
        )? as u32;

        let list = ies
            .find(ProtocolIeId::E_RAB_SETUP_LIST_CTXT_SU_RES)
            .ok_or(S1apError::MissingIe("E-RABSetupListCtxtSURes"))?;

        let mut decoder = AperDecoder::new(&list.value);
        let count = decoder.constrained_length(E_RAB_LIST_MIN, E_RAB_LIST_MAX)?;
        let mut e_rabs = Vec::with_capacity(count);
        for _ in 0..count {
            let field = ProtocolIeField::decode(&mut decoder)?;
            if field.id != ProtocolIeId::E_RAB_SETUP_ITEM_CTXT_SU_RES {
                return Err(S1apError::Malformed("unexpected IE in E-RAB setup list"));
            }
            let mut item_decoder = AperDecoder::new(&field.value);
            e_rabs.push(decode_response_item(&mut item_decoder)?);
        }

        Ok(InitialContextSetupResponse {
            mme_ue_s1ap_id,
            enb_ue_s1ap_id,
            e_rabs,
        })
    }

    /// Build the APER encoding of this response.
    pub fn encode(&self) -> S1apResult<Bytes> {
        let mut list = AperEncoder::new();
        list.constrained_length(self.e_rabs.len(), E_RAB_LIST_MIN, E_RAB_LIST_MAX)?;
        for item in &self.e_rabs {
            let mut enc = AperEncoder::new();
            // ext bit + iE-Extensions absent
            enc.write_bit(false);
            enc.write_bit(false);
            encode_extensible_small(&mut enc, i64::from(item.e_rab_id), &E_RAB_ID)?;
            encode_transport_address(&mut enc, item.transport_layer_address)?;
            enc.fixed_octet_string(&item.gtp_teid.to_be_bytes());
            enc.align();
            ProtocolIeField {
                id: ProtocolIeId::E_RAB_SETUP_ITEM_CTXT_SU_RES,
                criticality: Criticality::Ignore,
                value: enc.into_bytes().to_vec(),
            }
            .encode(&mut list)?;
        }
        list.align();

        let ies = vec![
            integer_ie(ProtocolIeId::MME_UE_S1AP_ID, self.mme_ue_s1ap_id, &MME_UE_S1AP_ID)?,
            integer_ie(
                ProtocolIeId::ENB_UE_S1AP_ID,
                self.enb_ue_s1ap_id,
                &ENB_UE_S1AP_ID,
            )?,
            ProtocolIeField {
                id: ProtocolIeId::E_RAB_SETUP_LIST_CTXT_SU_RES,
                criticality: Criticality::Ignore,
                value: list.into_bytes().to_vec(),
            },
        ];
        encode_envelope(1, ies)
    }
}

fn decode_integer_ie(
    ies: &ProtocolIeContainer,
    id: ProtocolIeId,
    constraint: &Constraint,
    name: &'static str,
) -> S1apResult<i64> {
    let ie = ies.find(id).ok_or(S1apError::MissingIe(name))?;
    let mut decoder = AperDecoder::new(&ie.value);
    decoder.constrained_whole_number(constraint)
}

fn integer_ie(id: ProtocolIeId, value: u32, constraint: &Constraint) -> S1apResult<ProtocolIeField> {
    let mut enc = AperEncoder::new();
    enc.constrained_whole_number(i64::from(value), constraint)?;
    enc.align();
    Ok(ProtocolIeField {
        id,
        criticality: Criticality::Reject,
        value: enc.into_bytes().to_vec(),
    })
}

/// Extensible constrained integer in its root range: one extension bit,
/// then the constrained encoding. Extension values are not supported.
fn decode_extensible_small(decoder: &mut AperDecoder, c: &Constraint) -> S1apResult<i64> {
    if decoder.read_bit()? {
        return Err(S1apError::Unsupported("extended integer value"));
    }
    decoder.constrained_whole_number(c)
}

fn encode_extensible_small(
    encoder: &mut AperEncoder,
    value: i64,
    c: &Constraint,
) -> S1apResult<()> {
    encoder.write_bit(false);
    encoder.constrained_whole_number(value, c)
}

/// TransportLayerAddress ::= BIT STRING (SIZE(1..160, ...)).
/// A 32-bit string is an IPv4 address; the 128-bit (IPv6) form is valid but
/// not covered.
fn decode_transport_address(decoder: &mut AperDecoder) -> S1apResult<Ipv4Addr> {
    if decoder.read_bit()? {
        return Err(S1apError::Unsupported("extended transport address size"));
    }
    let bits = decoder.constrained_length(TLA_MIN_BITS, TLA_MAX_BITS)?;
    decoder.align();
    match bits {
        32 => Ok(Ipv4Addr::from(decoder.read_bits(32)? as u32)),
        128 => Err(S1apError::Unsupported("IPv6 transport address")),
        _ => Err(S1apError::Unsupported("transport address size")),
    }
}

fn encode_transport_address(encoder: &mut AperEncoder, addr: Ipv4Addr) -> S1apResult<()> {
    encoder.write_bit(false);
    encoder.constrained_length(32, TLA_MIN_BITS, TLA_MAX_BITS)?;
    encoder.align();
    encoder.write_bits(u64::from(u32::from(addr)), 32);
    Ok(())
}

/// E-RABLevelQoSParameters. Everything is decoded for wire correctness and
/// then dropped; the user plane does not act on QoS.
fn skip_qos_parameters(decoder: &mut AperDecoder) -> S1apResult<()> {
    if decoder.read_bit()? {
        return Err(S1apError::Unsupported("extended QoS parameters"));
    }
    let has_gbr = decoder.read_bit()?;
    let has_ext = decoder.read_bit()?;

    decoder.constrained_whole_number(&QCI)?;

    // AllocationAndRetentionPriority
    if decoder.read_bit()? {
        return Err(S1apError::Unsupported("extended ARP"));
    }
    let arp_has_ext = decoder.read_bit()?;
    decoder.constrained_whole_number(&PRIORITY_LEVEL)?;
    decoder.constrained_whole_number(&PRE_EMPTION)?;
    decoder.constrained_whole_number(&PRE_EMPTION)?;
    if arp_has_ext {
        ProtocolIeContainer::decode(decoder)?;
    }

    if has_gbr {
        if decoder.read_bit()? {
            return Err(S1apError::Unsupported("extended GBR information"));
        }
        let gbr_has_ext = decoder.read_bit()?;
        for _ in 0..4 {
            decoder.constrained_whole_number(&BIT_RATE)?;
        }
        if gbr_has_ext {
            ProtocolIeContainer::decode(decoder)?;
        }
    }
    if has_ext {
        ProtocolIeContainer::decode(decoder)?;
    }
    Ok(())
}

/// Default QoS profile for built messages: QCI 9, priority level 15,
/// pre-emption neither triggered nor vulnerable, no GBR.
fn encode_default_qos(encoder: &mut AperEncoder) -> S1apResult<()> {
    encoder.write_bit(false);
    encoder.write_bit(false); // no gbrQosInformation
    encoder.write_bit(false); // no iE-Extensions
    encoder.constrained_whole_number(9, &QCI)?;
    encoder.write_bit(false);
    encoder.write_bit(false); // no ARP iE-Extensions
    encoder.constrained_whole_number(15, &PRIORITY_LEVEL)?;
    encoder.constrained_whole_number(0, &PRE_EMPTION)?;
    encoder.constrained_whole_number(0, &PRE_EMPTION)?;
    Ok(())
}

fn decode_request_item(decoder: &mut AperDecoder) -> S1apResult<ErabSetupRequestItem> {
    if decoder.read_bit()? {
        return Err(S1apError::Unsupported("extended E-RAB setup item"));
    }
    let has_nas = decoder.read_bit()?;
    let has_ext = decoder.read_bit()?;

    let e_rab_id = decode_extensible_small(decoder, &E_RAB_ID)? as u8;
    skip_qos_parameters(decoder)?;
    let transport_layer_address = decode_transport_address(decoder)?;
    let teid_octets = decoder.fixed_octet_string(4)?;
    let gtp_teid = u32::from_be_bytes([
        teid_octets[0],
        teid_octets[1],
        teid_octets[2],
        teid_octets[3],
    ]);

    let nas_pdu = if has_nas {
        Some(decoder.octet_string()?)
    } else {
        None
    };
    if has_ext {
        ProtocolIeContainer::decode(decoder)?;
    }

    let ue_ipv4 = match &nas_pdu {
        Some(pdu) => match nas::ue_ipv4_from_nas(pdu) {
            Ok(addr) => addr,
            Err(e) => {
                log::debug!("no UE address from NAS-PDU: {e}");
                None
            }
        },
        None => None,
    };

    Ok(ErabSetupRequestItem {
        e_rab_id,
        transport_layer_address,
        gtp_teid,
        nas_pdu,
        ue_ipv4,
    })
}

fn encode_request_item(encoder: &mut AperEncoder, item: &ErabSetupRequestItem) -> S1apResult<()> {
    encoder.write_bit(false);
    encoder.write_bit(item.nas_pdu.is_some());
    encoder.write_bit(false); // no iE-Extensions
    encode_extensible_small(encoder, i64::from(item.e_rab_id), &E_RAB_ID)?;
    encode_default_qos(encoder)?;
    encode_transport_address(encoder, item.transport_layer_address)?;
    encoder.fixed_octet_string(&item.gtp_teid.to_be_bytes());
    if let Some(nas) = &item.nas_pdu {
        encoder.octet_string(nas)?;
    }
    Ok(())
}

fn decode_response_item(decoder: &mut AperDecoder) -> S1apResult<ErabSetupResponseItem> {
    if decoder.read_bit()? {
        return Err(S1apError::Unsupported("extended E-RAB setup item"));
    }
    let has_ext = decoder.read_bit()?;

    let e_rab_id = decode_extensible_small(decoder, &E_RAB_ID)? as u8;
    let transport_layer_address = decode_transport_address(decoder)?;
    let teid_octets = decoder.fixed_octet_string(4)?;
    let gtp_teid = u32::from_be_bytes([
        teid_octets[0],
        teid_octets[1],
        teid_octets[2],
        teid_octets[3],
    ]);
    if has_ext {
        ProtocolIeContainer::decode(decoder)?;
    }

    Ok(ErabSetupResponseItem {
        e_rab_id,
        transport_layer_address,
        gtp_teid,
    })
}

fn encode_envelope(choice: usize, ies: Vec<ProtocolIeField>) -> S1apResult<Bytes> {
    let mut value = AperEncoder::new();
    value.write_bit(false); // SEQUENCE extension bit
    let container = ProtocolIeContainer { ies };
    container.encode(&mut value)?;
    value.align();

    let mut pdu = AperEncoder::new();
    pdu.choice_index(choice, S1apPdu::ALTERNATIVES, true)?;
    ProcedureCode::INITIAL_CONTEXT_SETUP.encode(&mut pdu)?;
    Criticality::Reject.encode(&mut pdu)?;
    pdu.open_type(&value.into_bytes())?;
    pdu.align();
    Ok(pdu.into_bytes())
}
