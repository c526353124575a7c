//! UDP datagram decoding

use upf_core::BufferView;

use crate::error::{NetError, NetResult};

const MIN_HEADER_LEN: usize = 8;

const SRC_PORT_OFFSET: usize = 0;
const DST_PORT_OFFSET: usize = 2;
const TOTAL_LENGTH_OFFSET: usize = 4;
const CHECKSUM_OFFSET: usize = 6;
const DATA_OFFSET: usize = 8;

/// Decoder for a UDP datagram.
#[derive(Clone, Debug)]
pub struct UdpDecoder {
    view: BufferView,
}

impl UdpDecoder {
    pub fn new(view: BufferView) -> NetResult<Self> {
        if view.len() < MIN_HEADER_LEN {
            return Err(NetError::TooShort {
                layer: "UDP",
                needed: MIN_HEADER_LEN,
                available: view.len(),
            });
        }
        Ok(UdpDecoder { view })
    }

    pub fn src_port(&self) -> u16 {
        self.view.u16_at_unchecked(SRC_PORT_OFFSET)
    }

    pub fn dst_port(&self) -> u16 {
        self.view.u16_at_unchecked(DST_PORT_OFFSET)
    }

    /// Datagram length claimed by the header, including the 8 header bytes.
    pub fn total_len_bytes(&self) -> usize {
        usize::from(self.view.u16_at_unchecked(TOTAL_LENGTH_OFFSET))
    }

    pub fn checksum(&self) -> u16 {
        self.view.u16_at_unchecked(CHECKSUM_OFFSET)
    }

    pub fn data_len_bytes(&self) -> NetResult<usize> {
        self.total_len_bytes()
            .checked_sub(DATA_OFFSET)
            .ok_or(NetError::Malformed {
                layer: "UDP",
                reason: "length field smaller than header",
            })
    }

    /// View over the payload, `[8 .. length)`.
    pub fn data(&self) -> NetResult<BufferView> {
        Ok(self.view.sub(DATA_OFFSET, self.data_len_bytes()?)?)
    }

    /// Heuristic GTPv1-U detection:
    ///
    /// * the payload must be longer than the 8-byte GTPv1-U header;
    /// * the first payload byte must carry version 1, protocol type 1
    ///   (upper nibble 0x3);
    /// * the GTP message length plus the 8 header bytes must equal the UDP
    ///   payload length.
    ///
    /// The destination port and the message type are deliberately not
    /// checked; non-standard ports and non-T-PDU messages both occur.
    pub fn is_gtpv1u(&self) -> bool {
        let udp_data_len = match self.total_len_bytes().checked_sub(DATA_OFFSET) {
            Some(len) => len,
            None => return false,
        };
        udp_data_len > 8
            && self
                .view
                .u8_at(DATA_OFFSET)
                .map_or(false, |b| b & 0xf0 == 0x30)
            && self
                .view
                .u16_at(DATA_OFFSET + 2)
                .map_or(false, |l| usize::from(l) + 8 == udp_data_len)
    }
}
