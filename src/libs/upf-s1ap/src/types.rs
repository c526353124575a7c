//! S1AP common data types (3GPP TS 36.413)

use crate::error::{S1apError, S1apResult};
use crate::per::{AperDecoder, AperEncoder, Constraint};

/// Criticality ::= ENUMERATED { reject, ignore, notify }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Criticality {
    Reject = 0,
    Ignore = 1,
    Notify = 2,
}

impl Criticality {
    pub const CONSTRAINT: Constraint = Constraint::new(0, 2);

    pub fn decode(decoder: &mut AperDecoder) -> S1apResult<Self> {
        match decoder.enumerated(&Self::CONSTRAINT)? {
            0 => Ok(Criticality::Reject),
            1 => Ok(Criticality::Ignore),
            2 => Ok(Criticality::Notify),
            _ => Err(S1apError::Malformed("criticality value")),
        }
    }

    pub fn encode(self, encoder: &mut AperEncoder) -> S1apResult<()> {
        encoder.enumerated(self as i64, &Self::CONSTRAINT)
    }
}

/// ProcedureCode ::= INTEGER (0..255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcedureCode(pub u8);

impl ProcedureCode {
    pub const CONSTRAINT: Constraint = Constraint::new(0, 255);

    pub const INITIAL_CONTEXT_SETUP: Self = Self(9);

    pub fn decode(decoder: &mut AperDecoder) -> S1apResult<Self> {
        Ok(ProcedureCode(
            decoder.constrained_whole_number(&Self::CONSTRAINT)? as u8,
        ))
    }

    pub fn encode(self, encoder: &mut AperEncoder) -> S1apResult<()> {
        encoder.constrained_whole_number(i64::from(self.0), &Self::CONSTRAINT)
    }
}

/// ProtocolIE-ID ::= INTEGER (0..65535)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolIeId(pub u16);

impl ProtocolIeId {
    pub const CONSTRAINT: Constraint = Constraint::new(0, 65535);

    pub const MME_UE_S1AP_ID: Self = Self(0);
    pub const ENB_UE_S1AP_ID: Self = Self(8);
    pub const E_RAB_TO_BE_SETUP_LIST_CTXT_SU_REQ: Self = Self(24);
    pub const E_RAB_SETUP_ITEM_CTXT_SU_RES: Self = Self(50);
    pub const E_RAB_SETUP_LIST_CTXT_SU_RES: Self = Self(51);
    pub const E_RAB_TO_BE_SETUP_ITEM_CTXT_SU_REQ: Self = Self(52);

    pub fn decode(decoder: &mut AperDecoder) -> S1apResult<Self> {
        Ok(ProtocolIeId(
            decoder.constrained_whole_number(&Self::CONSTRAINT)? as u16,
        ))
    }

    pub fn encode(self, encoder: &mut AperEncoder) -> S1apResult<()> {
        encoder.constrained_whole_number(i64::from(self.0), &Self::CONSTRAINT)
    }
}

/// ProtocolIE-Field ::= SEQUENCE { id, criticality, value (open type) }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolIeField {
    pub id: ProtocolIeId,
    pub criticality: Criticality,
    /// Raw APER-encoded value
    pub value: Vec<u8>,
}

impl ProtocolIeField {
    pub fn decode(decoder: &mut AperDecoder) -> S1apResult<Self> {
        let id = ProtocolIeId::decode(decoder)?;
        let criticality = Criticality::decode(decoder)?;
        let value = decoder.open_type()?;
        Ok(ProtocolIeField {
            id,
            criticality,
            value,
        })
    }

    pub fn encode(&self, encoder: &mut AperEncoder) -> S1apResult<()> {
        self.id.encode(encoder)?;
        self.criticality.encode(encoder)?;
        encoder.open_type(&self.value)
    }
}

/// ProtocolIE-Container ::= SEQUENCE (SIZE (0..65535)) OF ProtocolIE-Field
///
/// ProtocolExtensionContainer shares the wire shape, so this type also
/// serves to skip extension containers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProtocolIeContainer {
    pub ies: Vec<ProtocolIeField>,
}

impl ProtocolIeContainer {
    pub const MAX_PROTOCOL_IES: usize = 65535;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ie: ProtocolIeField) {
        self.ies.push(ie);
    }

    pub fn find(&self, id: ProtocolIeId) -> Option<&ProtocolIeField> {
        self.ies.iter().find(|ie| ie.id == id)
    }

    pub fn decode(decoder: &mut AperDecoder) -> S1apResult<Self> {
        let count = decoder.constrained_length(0, Self::MAX_PROTOCOL_IES)?;
        let mut ies = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            ies.push(ProtocolIeField::decode(decoder)?);
        }
        Ok(ProtocolIeContainer { ies })
    }

    pub fn encode(&self, encoder: &mut AperEncoder) -> S1apResult<()> {
        encoder.constrained_length(self.ies.len(), 0, Self::MAX_PROTOCOL_IES)?;
        for ie in &self.ies {
            ie.encode(encoder)?;
        }
        Ok(())
    }
}
