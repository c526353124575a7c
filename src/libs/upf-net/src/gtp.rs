//! GTPv1-U packet decoding (3GPP TS 29.060, 29.281)

use upf_core::BufferView;

use crate::error::{NetError, NetResult};

const MIN_HEADER_LEN: usize = 8;

const MESSAGE_TYPE_OFFSET: usize = 1;
const MESSAGE_LENGTH_OFFSET: usize = 2;
const TEID_OFFSET: usize = 4;

const SEQUENCE_NUMBER_OFFSET: usize = 8;
const NPDU_NUMBER_OFFSET: usize = 10;
const NEXT_EXTENSION_TYPE_OFFSET: usize = 11;

const END_OF_COMMON_HEADER: usize = 8;

const FLAG_E: u8 = 0x04;
const FLAG_S: u8 = 0x02;
const FLAG_PN: u8 = 0x01;

/// G-PDU message type (an encapsulated T-PDU, normally an IPv4 packet).
pub const MSG_TYPE_GPDU: u8 = 0xff;

/// Decoder for a GTPv1-U packet.
///
/// Extension headers are walked and bounds-checked at construction, so the
/// payload accessors are total. Extension headers are exposed in TLV form:
/// each view starts at the previous header's next-extension-type byte,
/// followed by the length byte (in units of 4) and the contents.
#[derive(Clone, Debug)]
pub struct Gtpv1uDecoder {
    view: BufferView,
    ext_headers: Vec<BufferView>,
    data: BufferView,
}

impl Gtpv1uDecoder {
    pub fn new(view: BufferView) -> NetResult<Self> {
        if view.len() < MIN_HEADER_LEN {
            return Err(NetError::TooShort {
                layer: "GTPv1-U",
                needed: MIN_HEADER_LEN,
                available: view.len(),
            });
        }
        if (view.u8_at_unchecked(0) >> 4) != 0x03 {
            return Err(NetError::Malformed {
                layer: "GTPv1-U",
                reason: "protocol+version nibble is not 0x3",
            });
        }

        let flags = view.u8_at_unchecked(0);
        let mut ext_headers = Vec::new();
        let mut offset = END_OF_COMMON_HEADER;

        if flags & (FLAG_E | FLAG_S | FLAG_PN) != 0 {
            // The 4-byte optional block is present as a whole as soon as any
            // of the three flags is set.
            if flags & FLAG_E != 0 {
                // Walk extension headers in TLV form, starting from the
                // next-extension-type byte of the optional block. A type of
                // zero terminates the chain.
                offset = NEXT_EXTENSION_TYPE_OFFSET;
                while view.u8_at(offset)? != 0 {
                    let ext_len = 4 * usize::from(view.u8_at(offset + 1)?);
                    if ext_len == 0 {
                        return Err(NetError::Malformed {
                            layer: "GTPv1-U",
                            reason: "extension header with zero length",
                        });
                    }
                    ext_headers.push(view.sub(offset, ext_len)?);
                    offset += ext_len;
                }
                // Skip the terminating next-extension-type byte.
                offset += 1;
            } else {
                offset = END_OF_COMMON_HEADER + 4;
            }
        }

        // The message length covers everything after the common header,
        // optional block and extension headers included.
        let message_length = usize::from(view.u16_at_unchecked(MESSAGE_LENGTH_OFFSET));
        let data_len = (message_length + END_OF_COMMON_HEADER)
            .checked_sub(offset)
            .ok_or(NetError::Malformed {
                layer: "GTPv1-U",
                reason: "message length smaller than optional headers",
            })?;
        let data = view.sub(offset, data_len)?;

        Ok(Gtpv1uDecoder {
            view,
            ext_headers,
            data,
        })
    }

    pub fn version(&self) -> u8 {
        (self.view.u8_at_unchecked(0) >> 5) & 0x07
    }

    pub fn protocol_type(&self) -> u8 {
        u8::from(self.view.u8_at_unchecked(0) & 0x10 != 0)
    }

    pub fn has_next_extension_field(&self) -> bool {
        self.view.u8_at_unchecked(0) & FLAG_E != 0
    }

    pub fn has_sequence_number_field(&self) -> bool {
        self.view.u8_at_unchecked(0) & FLAG_S != 0
    }

    pub fn has_npdu_field(&self) -> bool {
        self.view.u8_at_unchecked(0) & FLAG_PN != 0
    }

    /// True when the 4-byte optional block follows the common header.
    pub fn has_optional_fields(&self) -> bool {
        self.view.u8_at_unchecked(0) & (FLAG_E | FLAG_S | FLAG_PN) != 0
    }

    pub fn message_type(&self) -> u8 {
        self.view.u8_at_unchecked(MESSAGE_TYPE_OFFSET)
    }

    pub fn message_length(&self) -> u16 {
        self.view.u16_at_unchecked(MESSAGE_LENGTH_OFFSET)
    }

    pub fn teid(&self) -> u32 {
        self.view.u32_at_unchecked(TEID_OFFSET)
    }

    /// Sequence number, zero unless flagged significant.
    pub fn sequence_number(&self) -> NetResult<u16> {
        if self.has_sequence_number_field() {
            Ok(self.view.u16_at(SEQUENCE_NUMBER_OFFSET)?)
        } else {
            Ok(0)
        }
    }

    /// N-PDU number, zero unless flagged significant.
    pub fn npdu_number(&self) -> NetResult<u8> {
        if self.has_npdu_field() {
            Ok(self.view.u8_at(NPDU_NUMBER_OFFSET)?)
        } else {
            Ok(0)
        }
    }

    /// First extension header type, zero unless flagged significant.
    pub fn first_next_extension_type(&self) -> NetResult<u8> {
        if self.has_next_extension_field() {
            Ok(self.view.u8_at(NEXT_EXTENSION_TYPE_OFFSET)?)
        } else {
            Ok(0)
        }
    }

    /// The extension headers, in wire order (TLV views, see type docs).
    pub fn extension_headers(&self) -> &[BufferView] {
        &self.ext_headers
    }

    pub fn data_len_bytes(&self) -> usize {
        self.data.len()
    }

    /// View over the payload.
    pub fn data(&self) -> BufferView {
        self.data.clone()
    }

    /// True when the payload is an encapsulated IPv4 packet (G-PDU).
    pub fn is_ipv4_pdu(&self) -> bool {
        self.message_type() == MSG_TYPE_GPDU
    }
}
