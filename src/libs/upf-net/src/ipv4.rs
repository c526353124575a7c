//! IPv4 packet decoding and fragment bookkeeping

use std::net::Ipv4Addr;

use upf_core::{BufferView, BufferWritableView};

use crate::error::{NetError, NetResult};
use crate::types::ipv4_protocol;

const MIN_HEADER_LEN: usize = 20;

const TOTAL_LENGTH_OFFSET: usize = 2;
const IDENTIFICATION_OFFSET: usize = 4;
const FRAGMENT_OFFSET_OFFSET: usize = 6;
const TTL_OFFSET: usize = 8;
const PROTOCOL_OFFSET: usize = 9;
const SRC_ADDRESS_OFFSET: usize = 12;
const DST_ADDRESS_OFFSET: usize = 16;

/// The tuple identifying fragments of the same original packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4FragmentKey {
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub identification: u16,
}

impl Ipv4FragmentKey {
    pub fn new(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, identification: u16) -> Self {
        Ipv4FragmentKey {
            protocol,
            src,
            dst,
            identification,
        }
    }
}

/// Decoder for an IPv4 packet or fragment.
#[derive(Clone, Debug)]
pub struct Ipv4Decoder {
    view: BufferView,
}

impl Ipv4Decoder {
    pub fn new(view: BufferView) -> NetResult<Self> {
        if view.len() < MIN_HEADER_LEN {
            return Err(NetError::TooShort {
                layer: "IPv4",
                needed: MIN_HEADER_LEN,
                available: view.len(),
            });
        }
        if (view.u8_at_unchecked(0) >> 4) != 4 {
            return Err(NetError::Malformed {
                layer: "IPv4",
                reason: "version nibble is not 4",
            });
        }
        Ok(Ipv4Decoder { view })
    }

    pub fn version(&self) -> u8 {
        (self.view.u8_at_unchecked(0) >> 4) & 0x0f
    }

    /// Header length in bytes (IHL x 4).
    pub fn header_len_bytes(&self) -> usize {
        usize::from(self.view.u8_at_unchecked(0) & 0x0f) * 4
    }

    pub fn total_len_bytes(&self) -> usize {
        usize::from(self.view.u16_at_unchecked(TOTAL_LENGTH_OFFSET))
    }

    pub fn identification(&self) -> u16 {
        self.view.u16_at_unchecked(IDENTIFICATION_OFFSET)
    }

    /// Fragment offset in bytes (13-bit field x 8).
    pub fn fragment_offset_bytes(&self) -> usize {
        usize::from(self.view.u16_at_unchecked(FRAGMENT_OFFSET_OFFSET) & 0x1fff) * 8
    }

    pub fn more_fragments(&self) -> bool {
        (self.view.u16_at_unchecked(FRAGMENT_OFFSET_OFFSET) >> 13) & 1 != 0
    }

    pub fn dont_fragment(&self) -> bool {
        (self.view.u16_at_unchecked(FRAGMENT_OFFSET_OFFSET) >> 14) & 1 != 0
    }

    pub fn ttl(&self) -> u8 {
        self.view.u8_at_unchecked(TTL_OFFSET)
    }

    pub fn protocol(&self) -> u8 {
        self.view.u8_at_unchecked(PROTOCOL_OFFSET)
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        self.view.ipv4_at_unchecked(SRC_ADDRESS_OFFSET)
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        self.view.ipv4_at_unchecked(DST_ADDRESS_OFFSET)
    }

    pub fn is_udp(&self) -> bool {
        self.protocol() == ipv4_protocol::UDP
    }

    pub fn is_tcp(&self) -> bool {
        self.protocol() == ipv4_protocol::TCP
    }

    pub fn is_sctp(&self) -> bool {
        self.protocol() == ipv4_protocol::SCTP
    }

    /// Payload length claimed by the header.
    pub fn data_len_bytes(&self) -> NetResult<usize> {
        self.total_len_bytes()
            .checked_sub(self.header_len_bytes())
            .ok_or(NetError::Malformed {
                layer: "IPv4",
                reason: "total length smaller than header length",
            })
    }

    /// View over the payload, `[IHL*4 .. total_length)`.
    pub fn data(&self) -> NetResult<BufferView> {
        Ok(self.view.sub(self.header_len_bytes(), self.data_len_bytes()?)?)
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset_bytes() > 0 || self.more_fragments()
    }

    pub fn is_last_fragment(&self) -> bool {
        self.fragment_offset_bytes() > 0 && !self.more_fragments()
    }

    pub fn fragment_key(&self) -> Ipv4FragmentKey {
        Ipv4FragmentKey::new(
            self.protocol(),
            self.src_addr(),
            self.dst_addr(),
            self.identification(),
        )
    }

    /// Byte range covered by this fragment's data within the original packet.
    pub fn fragment_range(&self) -> NetResult<FragmentRange> {
        let first = self.fragment_offset_bytes();
        Ok(FragmentRange {
            first,
            last: first + self.data_len_bytes()?,
        })
    }

    /// The whole packet this decoder is attached to.
    pub fn packet(&self) -> &BufferView {
        &self.view
    }
}

/// A byte range used by the hole-list reassembly algorithm. `last` may be
/// [`FragmentRange::INFINITY`] for the trailing hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRange {
    pub first: usize,
    pub last: usize,
}

impl FragmentRange {
    /// Anything at or past 2^16 works as infinity for IPv4 sizes.
    pub const INFINITY: usize = 0x0f0000;
}

impl Default for FragmentRange {
    fn default() -> Self {
        FragmentRange {
            first: 0,
            last: Self::INFINITY,
        }
    }
}

/// Reassembler of IPv4 fragments following the RFC 815 hole-list algorithm.
///
/// TODO: the reassembled buffer still lacks a rewritten IPv4 header (length
/// and fragment fields); only payload range accounting is implemented, so
/// this type is not wired into the pipeline yet.
pub struct Ipv4ReassemblyBuffer {
    buffer: BufferWritableView,
    key: Ipv4FragmentKey,
    holes: Vec<FragmentRange>,
}

impl Ipv4ReassemblyBuffer {
    pub fn new(buffer: BufferWritableView, key: Ipv4FragmentKey) -> Self {
        Ipv4ReassemblyBuffer {
            buffer,
            key,
            holes: vec![FragmentRange::default()],
        }
    }

    /// Reset for reassembling a different packet.
    pub fn clear(&mut self, key: Ipv4FragmentKey) {
        self.key = key;
        self.holes.clear();
        self.holes.push(FragmentRange::default());
    }

    /// Reassembly is complete when the hole list is empty.
    pub fn is_complete(&self) -> bool {
        self.holes.is_empty()
    }

    /// Feed one fragment. Returns true when the fragment was accepted.
    pub fn push_fragment(&mut self, ipv4: &BufferView) -> NetResult<bool> {
        let dec = Ipv4Decoder::new(ipv4.clone())?;
        if dec.fragment_key() != self.key {
            return Err(NetError::Malformed {
                layer: "IPv4",
                reason: "fragment key does not match reassembly buffer",
            });
        }

        let range = dec.fragment_range()?;
        let frag_last = if dec.more_fragments() {
            range.last
        } else {
            // Final fragment pins the end of the packet.
            range.last.min(FragmentRange::INFINITY)
        };

        let mut accepted = false;
        let mut next_holes = Vec::with_capacity(self.holes.len() + 1);
        for hole in self.holes.drain(..) {
            if range.first >= hole.last || frag_last <= hole.first {
                next_holes.push(hole);
                continue;
            }
            accepted = true;
            if range.first > hole.first {
                next_holes.push(FragmentRange {
                    first: hole.first,
                    last: range.first,
                });
            }
            if frag_last < hole.last && dec.more_fragments() {
                next_holes.push(FragmentRange {
                    first: frag_last,
                    last: hole.last,
                });
            }
        }
        self.holes = next_holes;

        if accepted {
            let data = dec.data()?;
            self.buffer.copy_from_view(range.first, &data)?;
        }
        Ok(accepted)
    }
}
