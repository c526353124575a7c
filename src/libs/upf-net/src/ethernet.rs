//! Ethernet frame decoding

use upf_core::BufferView;

use crate::error::{NetError, NetResult};
use crate::types::{ether_type, MacAddr};

const MIN_FRAME_LEN: usize = 14;
const DST_MAC_OFFSET: usize = 0;
const SRC_MAC_OFFSET: usize = 6;
const DYNAMIC_HEADERS_OFFSET: usize = 12;

/// Decoder for an Ethernet frame, including stacked 802.1Q/802.1ad tags.
///
/// The effective EtherType and payload offset are resolved at construction
/// by walking past any VLAN tags.
#[derive(Clone, Debug)]
pub struct EthFrameDecoder {
    view: BufferView,
    ether_type: u16,
    data_offset: usize,
}

impl EthFrameDecoder {
    pub fn new(view: BufferView) -> NetResult<Self> {
        if view.len() < MIN_FRAME_LEN {
            return Err(NetError::TooShort {
                layer: "Ethernet",
                needed: MIN_FRAME_LEN,
                available: view.len(),
            });
        }

        // Walk 802.1ad/802.1Q tags until the first value that is an actual
        // EtherType.
        let max_offset = view.len() - 2;
        let mut offset = DYNAMIC_HEADERS_OFFSET;
        while offset <= max_offset {
            let raw = view.u16_at_unchecked(offset);
            if raw == 0x88a8 || raw == 0x8100 {
                offset += 4;
            } else {
                return Ok(EthFrameDecoder {
                    view,
                    ether_type: raw,
                    data_offset: offset + 2,
                });
            }
        }

        Err(NetError::Malformed {
            layer: "Ethernet",
            reason: "no EtherType before end of frame",
        })
    }

    pub fn dst_mac(&self) -> MacAddr {
        MacAddr(self.view.mac_at_unchecked(DST_MAC_OFFSET))
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr(self.view.mac_at_unchecked(SRC_MAC_OFFSET))
    }

    /// The effective EtherType, after any 802.1Q/802.1ad tags.
    pub fn ether_type(&self) -> u16 {
        self.ether_type
    }

    pub fn is_ipv4(&self) -> bool {
        self.ether_type == ether_type::IPV4
    }

    /// Offset of the payload within the frame.
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    pub fn data_len_bytes(&self) -> usize {
        self.view.len() - self.data_offset
    }

    /// View over the payload.
    pub fn data(&self) -> BufferView {
        // data_offset <= view.len() holds by construction
        self.view
            .sub(self.data_offset, self.data_len_bytes())
            .unwrap_or_default()
    }

    /// The whole frame this decoder is attached to.
    pub fn frame(&self) -> &BufferView {
        &self.view
    }
}
