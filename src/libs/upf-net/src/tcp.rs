//! TCP segment decoding

use upf_core::BufferView;

use crate::error::{NetError, NetResult};

const MIN_HEADER_LEN: usize = 20;

const SRC_PORT_OFFSET: usize = 0;
const DST_PORT_OFFSET: usize = 2;
const SEQ_OFFSET: usize = 4;
const ACK_OFFSET: usize = 8;
const DATA_OFFSET_OFFSET: usize = 12;
const FLAGS_OFFSET: usize = 13;
const WINDOW_OFFSET: usize = 14;
const CHECKSUM_OFFSET: usize = 16;
const URGENT_POINTER_OFFSET: usize = 18;

/// Decoder for a TCP segment.
#[derive(Clone, Debug)]
pub struct TcpDecoder {
    view: BufferView,
}

impl TcpDecoder {
    pub fn new(view: BufferView) -> NetResult<Self> {
        if view.len() < MIN_HEADER_LEN {
            return Err(NetError::TooShort {
                layer: "TCP",
                needed: MIN_HEADER_LEN,
                available: view.len(),
            });
        }
        Ok(TcpDecoder { view })
    }

    pub fn src_port(&self) -> u16 {
        self.view.u16_at_unchecked(SRC_PORT_OFFSET)
    }

    pub fn dst_port(&self) -> u16 {
        self.view.u16_at_unchecked(DST_PORT_OFFSET)
    }

    pub fn sequence_number(&self) -> u32 {
        self.view.u32_at_unchecked(SEQ_OFFSET)
    }

    pub fn ack_number(&self) -> u32 {
        self.view.u32_at_unchecked(ACK_OFFSET)
    }

    /// Header length in bytes (data offset x 4).
    pub fn data_offset_bytes(&self) -> usize {
        usize::from(self.view.u8_at_unchecked(DATA_OFFSET_OFFSET) >> 4) * 4
    }

    pub fn flag_ns(&self) -> bool {
        self.view.u8_at_unchecked(DATA_OFFSET_OFFSET) & 1 != 0
    }

    pub fn flag_cwr(&self) -> bool {
        self.flag_bit(7)
    }

    pub fn flag_ece(&self) -> bool {
        self.flag_bit(6)
    }

    pub fn flag_urg(&self) -> bool {
        self.flag_bit(5)
    }

    pub fn flag_ack(&self) -> bool {
        self.flag_bit(4)
    }

    pub fn flag_psh(&self) -> bool {
        self.flag_bit(3)
    }

    pub fn flag_rst(&self) -> bool {
        self.flag_bit(2)
    }

    pub fn flag_syn(&self) -> bool {
        self.flag_bit(1)
    }

    pub fn flag_fin(&self) -> bool {
        self.flag_bit(0)
    }

    pub fn window(&self) -> u16 {
        self.view.u16_at_unchecked(WINDOW_OFFSET)
    }

    pub fn checksum(&self) -> u16 {
        self.view.u16_at_unchecked(CHECKSUM_OFFSET)
    }

    pub fn urgent_pointer(&self) -> u16 {
        self.view.u16_at_unchecked(URGENT_POINTER_OFFSET)
    }

    /// View over the payload, past the options.
    pub fn data(&self) -> NetResult<BufferView> {
        Ok(self.view.sub_to_end(self.data_offset_bytes())?)
    }

    fn flag_bit(&self, bit: u8) -> bool {
        (self.view.u8_at_unchecked(FLAGS_OFFSET) >> bit) & 1 != 0
    }
}
