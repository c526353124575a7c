//! pcap file reading and writing, without libpcap
//!
//! The reader handles all four magic variants (little/big endian,
//! micro/nanosecond timestamps) and the Ethernet (1) and Linux cooked
//! capture (113) link types. The writer always produces little-endian,
//! microsecond files, version 2.4, snaplen 262144.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use upf_core::{BufferView, BufferWritableView};

use crate::error::{NetError, NetResult};
use crate::ethernet::EthFrameDecoder;
use crate::interfaces::{EthPacketSink, EthPacketSource, Ipv4PacketSink, Ipv4PacketSource, UserData};
use crate::types::ether_type;

const MAGIC_MICROS: u32 = 0xa1b2c3d4;
const MAGIC_MICROS_SWAPPED: u32 = 0xd4c3b2a1;
const MAGIC_NANOS: u32 = 0xa1b23c4d;
const MAGIC_NANOS_SWAPPED: u32 = 0x4d3cb2a1;

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;
const LINUX_COOKED_HEADER_LEN: usize = 16;

const WRITER_SNAPLEN: u32 = 262144;

/// Link types supported by the reader.
pub mod network {
    /// Raw Ethernet frames
    pub const ETHERNET: u32 = 1;
    /// L3 packets behind a 16-byte pseudo-L2 header
    pub const LINUX_COOKED: u32 = 113;
}

/// The pcap global header.
#[derive(Debug, Clone, Copy)]
pub struct PcapHeader {
    pub magic_number: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub network: u32,
}

/// The Linux cooked capture pseudo-L2 header. On file it is always in
/// network byte order, regardless of the global header's endianness.
#[derive(Debug, Clone, Copy)]
pub struct LinuxCookedHeader {
    /// 0 = to us, 1 = broadcast, 2 = multicast, 3 = to someone else,
    /// 4 = from us
    pub packet_type: u16,
    /// ARPHRD_ link type (1 = Ethernet)
    pub arphrd_type: u16,
    pub address_length: u16,
    pub address: [u8; 8],
    pub protocol_type: u16,
}

/// One captured record.
pub struct PcapRecord {
    pub ts_sec: u32,
    /// Micro- or nanoseconds, according to the file's magic.
    pub ts_subsec: u32,
    pub orig_len: u32,
    /// Present for Linux cooked captures.
    pub linux_cooked: Option<LinuxCookedHeader>,
    /// The captured packet (L2 for Ethernet captures, L3 for cooked ones),
    /// aliasing the buffer given to `read_record`.
    pub data: BufferWritableView,
}

/// Reader over a pcap stream. The same capture can be replayed a fixed
/// number of times, or forever.
pub struct PcapReader<R: Read + Seek> {
    reader: R,
    header: PcapHeader,
    swapped: bool,
    nanos: bool,
    data_start: u64,
    stream_end: u64,
    /// Number of passes over the file; 0 means infinite.
    repeats: usize,
    passes_done: usize,
}

impl PcapReader<BufReader<File>> {
    /// Open a pcap file, to be read `repeats` times (0 = forever).
    pub fn open<P: AsRef<Path>>(path: P, repeats: usize) -> NetResult<Self> {
        Self::new(BufReader::new(File::open(path)?), repeats)
    }
}

impl<R: Read + Seek> PcapReader<R> {
    pub fn new(mut reader: R, repeats: usize) -> NetResult<Self> {
        let mut raw = [0u8; GLOBAL_HEADER_LEN];
        reader.read_exact(&mut raw)?;

        let magic = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let (swapped, nanos) = match magic {
            MAGIC_MICROS => (false, false),
            MAGIC_MICROS_SWAPPED => (true, false),
            MAGIC_NANOS => (false, true),
            MAGIC_NANOS_SWAPPED => (true, true),
            _ => {
                return Err(NetError::Malformed {
                    layer: "pcap",
                    reason: "unknown magic number",
                })
            }
        };

        let u16_at = |off: usize| -> u16 {
            let b = [raw[off], raw[off + 1]];
            if swapped {
                u16::from_be_bytes(b)
            } else {
                u16::from_le_bytes(b)
            }
        };
        let u32_at = |off: usize| -> u32 {
            let b = [raw[off], raw[off + 1], raw[off + 2], raw[off + 3]];
            if swapped {
                u32::from_be_bytes(b)
            } else {
                u32::from_le_bytes(b)
            }
        };

        let header = PcapHeader {
            magic_number: magic,
            version_major: u16_at(4),
            version_minor: u16_at(6),
            thiszone: u32_at(8) as i32,
            sigfigs: u32_at(12),
            snaplen: u32_at(16),
            network: u32_at(20),
        };

        if header.network != network::ETHERNET && header.network != network::LINUX_COOKED {
            return Err(NetError::Unsupported("pcap link type"));
        }

        let data_start = reader.stream_position()?;
        let stream_end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(data_start))?;

        Ok(PcapReader {
            reader,
            header,
            swapped,
            nanos,
            data_start,
            stream_end,
            repeats,
            passes_done: 0,
        })
    }

    pub fn header(&self) -> &PcapHeader {
        &self.header
    }

    /// True when the timestamps carry nanoseconds instead of microseconds.
    pub fn nanosecond_timestamps(&self) -> bool {
        self.nanos
    }

    fn at_end(&mut self) -> bool {
        self.reader
            .stream_position()
            .map(|pos| pos >= self.stream_end)
            .unwrap_or(true)
    }

    /// True while another record can be read, rewinding for the next pass
    /// when the configured repeat count allows it.
    pub fn more_records(&mut self) -> bool {
        if !self.at_end() {
            return true;
        }
        if self.repeats == 0 || self.passes_done + 1 < self.repeats {
            if self.reader.seek(SeekFrom::Start(self.data_start)).is_err() {
                return false;
            }
            self.passes_done += 1;
            return !self.at_end();
        }
        false
    }

    /// Read the next record into `buffer`. The record's data view aliases
    /// the buffer's storage.
    pub fn read_record(&mut self, buffer: &BufferWritableView) -> NetResult<PcapRecord> {
        let mut raw = [0u8; RECORD_HEADER_LEN];
        self.reader.read_exact(&mut raw)?;

        let swapped = self.swapped;
        let u32_at = move |off: usize| -> u32 {
            let b = [raw[off], raw[off + 1], raw[off + 2], raw[off + 3]];
            if swapped {
                u32::from_be_bytes(b)
            } else {
                u32::from_le_bytes(b)
            }
        };

        let ts_sec = u32_at(0);
        let ts_subsec = u32_at(4);
        let mut incl_len = u32_at(8) as usize;
        let orig_len = u32_at(12);

        let linux_cooked = if self.header.network == network::LINUX_COOKED {
            if incl_len < LINUX_COOKED_HEADER_LEN {
                return Err(NetError::Malformed {
                    layer: "pcap",
                    reason: "cooked record shorter than its pseudo header",
                });
            }
            let mut cooked = [0u8; LINUX_COOKED_HEADER_LEN];
            self.reader.read_exact(&mut cooked)?;
            incl_len -= LINUX_COOKED_HEADER_LEN;

            let mut address = [0u8; 8];
            address.copy_from_slice(&cooked[6..14]);
            Some(LinuxCookedHeader {
                packet_type: u16::from_be_bytes([cooked[0], cooked[1]]),
                arphrd_type: u16::from_be_bytes([cooked[2], cooked[3]]),
                address_length: u16::from_be_bytes([cooked[4], cooked[5]]),
                address,
                protocol_type: u16::from_be_bytes([cooked[14], cooked[15]]),
            })
        } else {
            None
        };

        if incl_len > buffer.len() {
            return Err(NetError::TooLarge {
                len: incl_len,
                max: buffer.len(),
            });
        }
        let mut payload = vec![0u8; incl_len];
        self.reader.read_exact(&mut payload)?;
        buffer.set_bytes_at(0, &payload)?;

        Ok(PcapRecord {
            ts_sec,
            ts_subsec,
            orig_len,
            linux_cooked,
            data: buffer.sub(0, incl_len)?,
        })
    }
}

impl<R: Read + Seek> EthPacketSource for PcapReader<R> {
    fn packet_available(&mut self) -> bool {
        self.more_records()
    }

    fn get_eth(&mut self, buffer: &BufferWritableView) -> NetResult<BufferWritableView> {
        if self.header.network != network::ETHERNET {
            return Err(NetError::Unsupported(
                "reading Ethernet frames from a non-Ethernet capture",
            ));
        }
        Ok(self.read_record(buffer)?.data)
    }
}

impl<R: Read + Seek> Ipv4PacketSource for PcapReader<R> {
    fn packet_available(&mut self) -> bool {
        self.more_records()
    }

    fn get_ipv4(&mut self, buffer: &BufferWritableView) -> NetResult<BufferWritableView> {
        let record = self.read_record(buffer)?;
        match self.header.network {
            network::LINUX_COOKED => {
                let cooked = record.linux_cooked.ok_or(NetError::Malformed {
                    layer: "pcap",
                    reason: "cooked capture without pseudo header",
                })?;
                if cooked.protocol_type == ether_type::IPV4 {
                    Ok(record.data)
                } else {
                    // Filtered out; the caller retries.
                    Ok(record.data.sub(0, 0)?)
                }
            }
            _ => {
                let frame = EthFrameDecoder::new(record.data.as_view())?;
                if frame.is_ipv4() {
                    Ok(record
                        .data
                        .sub(frame.data_offset(), frame.data_len_bytes())?)
                } else {
                    Ok(record.data.sub(0, 0)?)
                }
            }
        }
    }
}

/// L2 address placed in cooked records produced by [`PcapWriter`].
const WRITER_COOKED_ADDRESS: [u8; 8] = [0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe, 0x00, 0x00];

/// Writer producing little-endian, microsecond pcap files.
pub struct PcapWriter<W: Write> {
    writer: W,
    network: u32,
}

impl<W: Write> PcapWriter<W> {
    /// Writer for raw Ethernet captures.
    pub fn new_ethernet(writer: W) -> NetResult<Self> {
        Self::new(writer, network::ETHERNET)
    }

    /// Writer for Linux cooked captures (L3 records).
    pub fn new_linux_cooked(writer: W) -> NetResult<Self> {
        Self::new(writer, network::LINUX_COOKED)
    }

    fn new(mut writer: W, net: u32) -> NetResult<Self> {
        let mut header = BytesMut::with_capacity(GLOBAL_HEADER_LEN);
        header.put_u32_le(MAGIC_MICROS);
        header.put_u16_le(2);
        header.put_u16_le(4);
        header.put_i32_le(0);
        header.put_u32_le(0);
        header.put_u32_le(WRITER_SNAPLEN);
        header.put_u32_le(net);
        writer.write_all(&header)?;
        Ok(PcapWriter {
            writer,
            network: net,
        })
    }

    /// Append one record with the given timestamp.
    pub fn write_record(
        &mut self,
        ts_sec: u32,
        ts_usec: u32,
        data: &BufferView,
    ) -> NetResult<()> {
        let cooked_len = if self.network == network::LINUX_COOKED {
            LINUX_COOKED_HEADER_LEN
        } else {
            0
        };
        let incl_len = (data.len() + cooked_len) as u32;

        let mut out = BytesMut::with_capacity(RECORD_HEADER_LEN + cooked_len + data.len());
        out.put_u32_le(ts_sec);
        out.put_u32_le(ts_usec);
        out.put_u32_le(incl_len);
        out.put_u32_le(incl_len);

        if self.network == network::LINUX_COOKED {
            out.put_u16(4); // outbound
            out.put_u16(1); // ARPHRD_ETHER
            out.put_u16(6);
            out.put_slice(&WRITER_COOKED_ADDRESS);
            out.put_u16(ether_type::IPV4);
        }

        data.with_bytes(|b| out.put_slice(b));
        self.writer.write_all(&out)?;
        Ok(())
    }

    pub fn flush(&mut self) -> NetResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_now(&mut self, data: &BufferView) {
        // A hole marker (empty view) produces no record.
        if data.is_empty() {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        if let Err(e) = self.write_record(now.as_secs() as u32, now.subsec_micros(), data) {
            log::warn!("pcap write failed: {e}");
        }
    }
}

impl<W: Write> EthPacketSink for PcapWriter<W> {
    fn consume_eth(&mut self, eth_data: &BufferView, _user_data: &mut UserData) {
        if self.network != network::ETHERNET {
            log::warn!("dropping Ethernet frame on a cooked-capture writer");
            return;
        }
        self.write_now(eth_data);
    }
}

impl<W: Write> Ipv4PacketSink for PcapWriter<W> {
    fn consume_ipv4(&mut self, ipv4_data: &BufferView, _user_data: &mut UserData) {
        if self.network != network::LINUX_COOKED {
            log::warn!("dropping IPv4 packet on an Ethernet-capture writer");
            return;
        }
        self.write_now(ipv4_data);
    }
}
