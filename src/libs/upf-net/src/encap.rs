//! GTPv1-U encapsulation
//!
//! [`Gtpv1uIpv4Encap`] composes `IPv4 + UDP + GTPv1-U + payload` inside a
//! writable view; [`Gtpv1uEthEncap`] additionally frames the result in
//! Ethernet. Two composition strategies are supported:
//!
//! * copy: `set_payload(view)` copies the inner packet behind the headers;
//! * in place: `set_payload_in_place()` assumes the caller already put the
//!   inner packet at the fixed payload offset and only fixes up lengths.
//!
//! After the builder setters and `set_payload*`, call
//! `compute_and_set_checksums()` and take the finished view.

use std::net::Ipv4Addr;

use upf_core::{BufferView, BufferWritableView};

use crate::error::{NetError, NetResult};
use crate::types::MacAddr;

const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const GTP_HEADER_LEN: usize = 8;

/// Largest inner packet that still fits the outer IPv4 total length field.
pub const MAX_PAYLOAD_LEN: usize = 65535 - (IPV4_HEADER_LEN + UDP_HEADER_LEN + GTP_HEADER_LEN);

/// Boilerplate for the 36 bytes of IPv4 + UDP + GTPv1-U headers: version 4 /
/// IHL 5, TTL 64, protocol UDP, both ports 2152, GTP version 1 / PT 1,
/// message type T-PDU.
const L3_HEADER_TEMPLATE: [u8; 36] = [
    // IPv4
    0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, //
    // UDP (src port 2152, dst port 2152)
    0x08, 0x68, 0x08, 0x68, 0x00, 0x00, 0x00, 0x00, //
    // GTPv1-U (flags 0x30, message type 0xff)
    0x30, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Ethernet preamble for the Ethernet-framed variant (EtherType IPv4).
const ETH_HEADER_TEMPLATE: [u8; 14] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00,
];

/// Header composition shared by the IPv4 and Ethernet variants; `l3` is the
/// offset of the outer IPv4 header within the composition buffer.
struct EncapInner {
    buf: BufferWritableView,
    l3: usize,
    payload_len: usize,
    udp_checksum: bool,
}

impl EncapInner {
    fn new(buf: BufferWritableView, l3: usize) -> NetResult<Self> {
        let header_len = l3 + L3_HEADER_TEMPLATE.len();
        if buf.len() < header_len {
            return Err(NetError::TooShort {
                layer: "GTPv1-U encapsulation buffer",
                needed: header_len,
                available: buf.len(),
            });
        }
        Ok(EncapInner {
            buf,
            l3,
            payload_len: 0,
            udp_checksum: true,
        })
    }

    fn header_len(&self) -> usize {
        self.l3 + L3_HEADER_TEMPLATE.len()
    }

    fn payload_offset(&self) -> usize {
        self.header_len()
    }

    // Field offsets within the composition buffer.
    fn ipv4_total_length(&self) -> usize {
        self.l3 + 2
    }
    fn ipv4_identification(&self) -> usize {
        self.l3 + 4
    }
    fn ipv4_checksum(&self) -> usize {
        self.l3 + 10
    }
    fn ipv4_src(&self) -> usize {
        self.l3 + 12
    }
    fn ipv4_dst(&self) -> usize {
        self.l3 + 16
    }
    fn udp_src_port(&self) -> usize {
        self.l3 + 20
    }
    fn udp_dst_port(&self) -> usize {
        self.l3 + 22
    }
    fn udp_total_length(&self) -> usize {
        self.l3 + 24
    }
    fn udp_checksum_offset(&self) -> usize {
        self.l3 + 26
    }
    fn gtp_start(&self) -> usize {
        self.l3 + 28
    }
    fn gtp_message_length(&self) -> usize {
        self.l3 + 30
    }
    fn gtp_teid(&self) -> usize {
        self.l3 + 32
    }

    fn init_l3(&self) {
        // The buffer is at least header_len() long by construction.
        self.buf
            .set_bytes_at(self.l3, &L3_HEADER_TEMPLATE)
            .unwrap_or(());
    }

    fn set_payload_copied(&mut self, ipv4_data: &BufferView) -> NetResult<()> {
        if ipv4_data.len() > MAX_PAYLOAD_LEN {
            return Err(NetError::TooLarge {
                len: ipv4_data.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        let room = self.buf.len() - self.payload_offset();
        if ipv4_data.len() > room {
            return Err(NetError::TooLarge {
                len: ipv4_data.len(),
                max: room,
            });
        }
        self.buf.copy_from_view(self.payload_offset(), ipv4_data)?;
        self.payload_len = ipv4_data.len();
        self.update_lengths();
        Ok(())
    }

    fn set_payload_in_place(&mut self) -> NetResult<()> {
        // The payload must already sit at the payload offset and look like
        // IPv4; the composition buffer length defines the payload length.
        if self.buf.len() > self.payload_offset()
            && (self.buf.u8_at(self.payload_offset())? >> 4) != 4
        {
            return Err(NetError::Malformed {
                layer: "GTPv1-U encapsulation",
                reason: "in-place payload is not IPv4",
            });
        }
        let payload_len = self.buf.len() - self.header_len();
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(NetError::TooLarge {
                len: payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        self.payload_len = payload_len;
        self.update_lengths();
        Ok(())
    }

    fn update_lengths(&self) {
        let gtp_len = self.payload_len as u16;
        let udp_len = gtp_len + (GTP_HEADER_LEN + UDP_HEADER_LEN) as u16;
        self.buf
            .set_u16_at_unchecked(self.gtp_message_length(), gtp_len);
        self.buf.set_u16_at_unchecked(self.udp_total_length(), udp_len);
        self.buf
            .set_u16_at_unchecked(self.ipv4_total_length(), udp_len + IPV4_HEADER_LEN as u16);
    }

    fn compute_and_set_checksums(&self) {
        let udp_total_len = u32::from(self.buf.as_view().u16_at_unchecked(self.udp_total_length()));

        let udp_hdr_sum = u32::from(self.buf.as_view().u16_at_unchecked(self.udp_src_port()))
            + u32::from(self.buf.as_view().u16_at_unchecked(self.udp_dst_port()))
            + udp_total_len;

        // Partial pseudo-header sum reused for the IPv4 header checksum:
        // source and destination address words plus the protocol number.
        let view = self.buf.as_view();
        let pseudo_sum_no_length = u32::from(view.u16_at_unchecked(self.ipv4_src()))
            + u32::from(view.u16_at_unchecked(self.ipv4_src() + 2))
            + u32::from(view.u16_at_unchecked(self.ipv4_dst()))
            + u32::from(view.u16_at_unchecked(self.ipv4_dst() + 2))
            + 0x11;

        if self.udp_checksum {
            let udp_payload_sum = view
                .sub(self.gtp_start(), self.payload_len + GTP_HEADER_LEN)
                .map(|v| v.sum16())
                .unwrap_or(0);

            let sum = fold16(pseudo_sum_no_length + udp_total_len + udp_hdr_sum + udp_payload_sum);
            // Per RFC 768 a computed zero is transmitted as all ones.
            let checksum = if sum == 0xffff { sum } else { !sum };
            self.buf
                .set_u16_at_unchecked(self.udp_checksum_offset(), checksum);
        }
        // When disabled the checksum field stays zero, meaning "none".

        let ipv4_sum = u32::from(view.u16_at_unchecked(self.l3))
            + u32::from(view.u16_at_unchecked(self.l3 + 2))
            + u32::from(view.u16_at_unchecked(self.l3 + 4))
            + u32::from(view.u16_at_unchecked(self.l3 + 6))
            + (u32::from(view.u8_at_unchecked(self.l3 + 8)) << 8)
            // The protocol byte and both addresses are already in the
            // pseudo-header partial sum; the checksum field is skipped.
            + pseudo_sum_no_length;

        let sum = fold16(ipv4_sum);
        let checksum = if sum == 0xffff { sum } else { !sum };
        self.buf.set_u16_at_unchecked(self.ipv4_checksum(), checksum);
    }

    fn framed_len(&self) -> usize {
        self.header_len() + self.payload_len
    }
}

fn fold16(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

/// Encapsulates an IPv4 payload into an outer `IPv4/UDP/GTPv1-U` packet.
pub struct Gtpv1uIpv4Encap {
    inner: EncapInner,
}

impl Gtpv1uIpv4Encap {
    /// Offset where an in-place payload must start.
    pub const PAYLOAD_OFFSET: usize = 36;

    pub fn new(buf: BufferWritableView) -> NetResult<Self> {
        Ok(Gtpv1uIpv4Encap {
            inner: EncapInner::new(buf, 0)?,
        })
    }

    /// Enable or disable the UDP checksum (enabled by default). The inner
    /// IPv4 packet carries its own checksums, so the outer UDP checksum is
    /// optional on IPv4.
    pub fn enable_udp_checksum(&mut self, enable: bool) -> &mut Self {
        self.inner.udp_checksum = enable;
        self
    }

    /// Reset the header area to the boilerplate template.
    pub fn init(&mut self) -> &mut Self {
        self.inner.init_l3();
        self
    }

    pub fn set_src_address(&mut self, src: Ipv4Addr) -> &mut Self {
        self.inner.buf.set_ipv4_at_unchecked(self.inner.ipv4_src(), src);
        self
    }

    pub fn set_dst_address(&mut self, dst: Ipv4Addr) -> &mut Self {
        self.inner.buf.set_ipv4_at_unchecked(self.inner.ipv4_dst(), dst);
        self
    }

    pub fn set_identification(&mut self, id: u16) -> &mut Self {
        self.inner
            .buf
            .set_u16_at_unchecked(self.inner.ipv4_identification(), id);
        self
    }

    pub fn set_src_port(&mut self, port: u16) -> &mut Self {
        self.inner
            .buf
            .set_u16_at_unchecked(self.inner.udp_src_port(), port);
        self
    }

    pub fn set_dst_port(&mut self, port: u16) -> &mut Self {
        self.inner
            .buf
            .set_u16_at_unchecked(self.inner.udp_dst_port(), port);
        self
    }

    pub fn set_teid(&mut self, teid: u32) -> &mut Self {
        self.inner.buf.set_u32_at_unchecked(self.inner.gtp_teid(), teid);
        self
    }

    /// Copy `ipv4_data` behind the headers and fix up the length fields.
    pub fn set_payload(&mut self, ipv4_data: &BufferView) -> NetResult<&mut Self> {
        self.inner.set_payload_copied(ipv4_data)?;
        Ok(self)
    }

    /// The payload is already in the buffer at [`Self::PAYLOAD_OFFSET`];
    /// only fix up the length fields.
    pub fn set_payload_in_place(&mut self) -> NetResult<&mut Self> {
        self.inner.set_payload_in_place()?;
        Ok(self)
    }

    pub fn compute_and_set_checksums(&mut self) -> &mut Self {
        self.inner.compute_and_set_checksums();
        self
    }

    /// The finished outer IPv4 packet.
    pub fn ipv4_packet(&self) -> NetResult<BufferView> {
        Ok(self
            .inner
            .buf
            .as_view()
            .sub(0, self.inner.framed_len())?)
    }
}

/// Encapsulates an IPv4 payload into an outer
/// `Ethernet/IPv4/UDP/GTPv1-U` frame.
pub struct Gtpv1uEthEncap {
    inner: EncapInner,
}

impl Gtpv1uEthEncap {
    /// Offset where an in-place payload must start.
    pub const PAYLOAD_OFFSET: usize = 50;

    const ETH_DST_OFFSET: usize = 0;
    const ETH_SRC_OFFSET: usize = 6;

    pub fn new(buf: BufferWritableView) -> NetResult<Self> {
        Ok(Gtpv1uEthEncap {
            inner: EncapInner::new(buf, ETH_HEADER_TEMPLATE.len())?,
        })
    }

    /// See [`Gtpv1uIpv4Encap::enable_udp_checksum`].
    pub fn enable_udp_checksum(&mut self, enable: bool) -> &mut Self {
        self.inner.udp_checksum = enable;
        self
    }

    /// Reset the header area to the boilerplate template.
    pub fn init(&mut self) -> &mut Self {
        self.inner.buf.set_bytes_at(0, &ETH_HEADER_TEMPLATE).unwrap_or(());
        self.inner.init_l3();
        self
    }

    pub fn set_src_mac(&mut self, src: MacAddr) -> &mut Self {
        self.inner
            .buf
            .set_mac_at_unchecked(Self::ETH_SRC_OFFSET, src.octets());
        self
    }

    pub fn set_dst_mac(&mut self, dst: MacAddr) -> &mut Self {
        self.inner
            .buf
            .set_mac_at_unchecked(Self::ETH_DST_OFFSET, dst.octets());
        self
    }

    pub fn set_src_address(&mut self, src: Ipv4Addr) -> &mut Self {
        self.inner.buf.set_ipv4_at_unchecked(self.inner.ipv4_src(), src);
        self
    }

    pub fn set_dst_address(&mut self, dst: Ipv4Addr) -> &mut Self {
        self.inner.buf.set_ipv4_at_unchecked(self.inner.ipv4_dst(), dst);
        self
    }

    pub fn set_identification(&mut self, id: u16) -> &mut Self {
        self.inner
            .buf
            .set_u16_at_unchecked(self.inner.ipv4_identification(), id);
        self
    }

    pub fn set_src_port(&mut self, port: u16) -> &mut Self {
        self.inner
            .buf
            .set_u16_at_unchecked(self.inner.udp_src_port(), port);
        self
    }

    pub fn set_dst_port(&mut self, port: u16) -> &mut Self {
        self.inner
            .buf
            .set_u16_at_unchecked(self.inner.udp_dst_port(), port);
        self
    }

    pub fn set_teid(&mut self, teid: u32) -> &mut Self {
        self.inner.buf.set_u32_at_unchecked(self.inner.gtp_teid(), teid);
        self
    }

    pub fn set_payload(&mut self, ipv4_data: &BufferView) -> NetResult<&mut Self> {
        self.inner.set_payload_copied(ipv4_data)?;
        Ok(self)
    }

    pub fn set_payload_in_place(&mut self) -> NetResult<&mut Self> {
        self.inner.set_payload_in_place()?;
        Ok(self)
    }

    pub fn compute_and_set_checksums(&mut self) -> &mut Self {
        self.inner.compute_and_set_checksums();
        self
    }

    /// The finished Ethernet frame.
    pub fn eth_frame(&self) -> NetResult<BufferView> {
        Ok(self
            .inner
            .buf
            .as_view()
            .sub(0, self.inner.framed_len())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtp::Gtpv1uDecoder;
    use crate::ipv4::Ipv4Decoder;
    use crate::udp::UdpDecoder;

    fn inner_packet() -> Vec<u8> {
        crate::ipv4::tests::build_ipv4([8, 8, 8, 8], [192, 0, 2, 7], 17, &[1, 2, 3, 4, 5])
    }

    fn encap(payload: &[u8]) -> BufferView {
        let buf = BufferWritableView::alloc(2048);
        let mut e = Gtpv1uIpv4Encap::new(buf).unwrap();
        e.init()
            .set_src_address(Ipv4Addr::new(10, 0, 0, 1))
            .set_dst_address(Ipv4Addr::new(10, 0, 0, 2))
            .set_identification(0x4242)
            .set_teid(0x200);
        e.set_payload(&BufferWritableView::from_vec(payload.to_vec()).as_view())
            .unwrap();
        e.compute_and_set_checksums();
        e.ipv4_packet().unwrap()
    }

    #[test]
    fn test_roundtrip_through_decoders() {
        let inner = inner_packet();
        let packet = encap(&inner);

        let ip = Ipv4Decoder::new(packet).unwrap();
        assert_eq!(ip.src_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(ip.dst_addr(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(ip.identification(), 0x4242);
        assert!(ip.is_udp());
        assert_eq!(ip.total_len_bytes(), 36 + inner.len());

        let udp = UdpDecoder::new(ip.data().unwrap()).unwrap();
        assert_eq!(udp.src_port(), 2152);
        assert_eq!(udp.dst_port(), 2152);
        assert!(udp.is_gtpv1u());

        let gtp = Gtpv1uDecoder::new(udp.data().unwrap()).unwrap();
        assert_eq!(gtp.teid(), 0x200);
        assert!(gtp.is_ipv4_pdu());
        assert_eq!(gtp.data().to_vec(), inner);
    }

    #[test]
    fn test_ipv4_header_checksum_verifies() {
        let packet = encap(&inner_packet());
        let header = packet.sub(0, 20).unwrap();
        // Sum of all header words including the checksum folds to 0xffff.
        assert_eq!(fold16(header.sum16()), 0xffff);
    }

    #[test]
    fn test_udp_checksum_verifies() {
        let packet = encap(&inner_packet());
        let ip = Ipv4Decoder::new(packet.clone()).unwrap();
        let udp_len = ip.total_len_bytes() - 20;
        // Pseudo-header plus the whole UDP datagram, checksum included.
        let pseudo = packet.sub(12, 8).unwrap().sum16() + 0x11 + udp_len as u32;
        let datagram = packet.sub(20, udp_len).unwrap().sum16();
        assert_eq!(fold16(pseudo + datagram), 0xffff);
    }

    #[test]
    fn test_udp_checksum_disabled_stays_zero() {
        let buf = BufferWritableView::alloc(512);
        let mut e = Gtpv1uIpv4Encap::new(buf).unwrap();
        e.enable_udp_checksum(false);
        e.init().set_teid(1);
        e.set_payload(&BufferWritableView::from_vec(inner_packet()).as_view())
            .unwrap();
        e.compute_and_set_checksums();
        let packet = e.ipv4_packet().unwrap();
        assert_eq!(packet.u16_at(26).unwrap(), 0);
    }

    #[test]
    fn test_payload_too_large() {
        let buf = BufferWritableView::alloc(128);
        let mut e = Gtpv1uIpv4Encap::new(buf).unwrap();
        e.init();
        let big = BufferWritableView::alloc(256).as_view();
        assert!(matches!(
            e.set_payload(&big),
            Err(NetError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_in_place_payload() {
        let inner = inner_packet();
        let buf = BufferWritableView::alloc(Gtpv1uIpv4Encap::PAYLOAD_OFFSET + inner.len());
        buf.set_bytes_at(Gtpv1uIpv4Encap::PAYLOAD_OFFSET, &inner).unwrap();
        let mut e = Gtpv1uIpv4Encap::new(buf).unwrap();
        e.init().set_teid(9);
        e.set_payload_in_place().unwrap();
        e.compute_and_set_checksums();

        let packet = e.ipv4_packet().unwrap();
        let ip = Ipv4Decoder::new(packet).unwrap();
        let udp = UdpDecoder::new(ip.data().unwrap()).unwrap();
        let gtp = Gtpv1uDecoder::new(udp.data().unwrap()).unwrap();
        assert_eq!(gtp.teid(), 9);
        assert_eq!(gtp.data().to_vec(), inner);
    }

    #[test]
    fn test_in_place_rejects_non_ipv4() {
        let buf = BufferWritableView::alloc(Gtpv1uIpv4Encap::PAYLOAD_OFFSET + 4);
        buf.set_u8_at(Gtpv1uIpv4Encap::PAYLOAD_OFFSET, 0x60).unwrap();
        let mut e = Gtpv1uIpv4Encap::new(buf).unwrap();
        e.init();
        assert!(matches!(
            e.set_payload_in_place(),
            Err(NetError::Malformed { .. })
        ));
    }

    #[test]
    fn test_eth_variant_frames_payload() {
        let inner = inner_packet();
        let buf = BufferWritableView::alloc(2048);
        let mut e = Gtpv1uEthEncap::new(buf).unwrap();
        e.init()
            .set_dst_mac(MacAddr([0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe]))
            .set_src_mac(MacAddr([2, 2, 2, 2, 2, 2]))
            .set_src_address(Ipv4Addr::new(10, 0, 0, 2))
            .set_dst_address(Ipv4Addr::new(10, 0, 0, 1))
            .set_teid(0x100);
        e.set_payload(&BufferWritableView::from_vec(inner.clone()).as_view())
            .unwrap();
        e.compute_and_set_checksums();

        let frame = e.eth_frame().unwrap();
        assert_eq!(frame.len(), 50 + inner.len());

        let eth = crate::ethernet::EthFrameDecoder::new(frame).unwrap();
        assert_eq!(eth.dst_mac(), MacAddr([0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe]));
        assert!(eth.is_ipv4());

        let ip = Ipv4Decoder::new(eth.data()).unwrap();
        let udp = UdpDecoder::new(ip.data().unwrap()).unwrap();
        let gtp = Gtpv1uDecoder::new(udp.data().unwrap()).unwrap();
        assert_eq!(gtp.teid(), 0x100);
        assert_eq!(gtp.data().to_vec(), inner);

        // The IPv4 header checksum also verifies through the Ethernet shift.
        let header = eth.data().sub(0, 20).unwrap();
        assert_eq!(fold16(header.sum16()), 0xffff);
    }
}
