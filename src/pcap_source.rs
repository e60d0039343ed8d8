// SPDX-License-Identifier: Apache-2.0

//! PCAP file packet source for offline replay.
//!
//! Reads UDP payloads from PCAP/PCAPNG captures together with their recorded
//! capture timestamps, so replayed streams reproduce the original point
//! timing. Supports filtering by UDP port to isolate the sensor's data
//! stream from other traffic in the capture.

use crate::common::Error;
use crate::packet::{PACKET_SIZE, PacketView};
use crate::scan::ScanTick;
use crate::source::{PacketSource, SourceHandle};
use pcap_parser::traits::PcapReaderIterator;
use std::path::Path;

/// Extracted UDP packet with its capture timestamp.
#[derive(Clone)]
struct ExtractedPacket {
    payload: Vec<u8>,
    /// Capture time in nanoseconds
    timestamp: u64,
}

/// PCAP file packet source.
///
/// Loads the entire capture into memory and replays packets through the
/// [`PacketSource`] trait. Supports both legacy PCAP and PCAPNG formats.
pub struct PcapSource {
    packets: Vec<ExtractedPacket>,
    index: usize,
    timestamp: u64,
    handle: SourceHandle,
    tick: ScanTick,
}

impl PcapSource {
    /// Load a PCAP file from disk, optionally filtering by UDP port
    /// (matches source or destination).
    pub fn from_file<P: AsRef<Path>>(path: P, port: Option<u16>) -> Result<Self, Error> {
        let data = std::fs::read(path.as_ref()).map_err(Error::Io)?;
        Self::from_bytes(&data, port)
    }

    /// Load a PCAP capture from bytes, optionally filtering by UDP port.
    pub fn from_bytes(data: &[u8], port: Option<u16>) -> Result<Self, Error> {
        let mut packets = Vec::new();

        // PCAPNG starts with the Section Header Block magic.
        if data.len() >= 4 && data[0..4] == [0x0a, 0x0d, 0x0d, 0x0a] {
            Self::extract_pcapng(data, port, &mut packets)?;
        } else {
            Self::extract_legacy_pcap(data, port, &mut packets)?;
        }

        Ok(Self {
            packets,
            index: 0,
            timestamp: 0,
            handle: SourceHandle::new(),
            tick: ScanTick::new(),
        })
    }

    fn extract_legacy_pcap(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<ExtractedPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        // Buffer size must cover the whole input to avoid Incomplete errors.
        let mut reader = LegacyPcapReader::new(data.len(), data)
            .map_err(|e| Error::InvalidPacket(format!("failed to create PCAP reader: {:?}", e)))?;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    if let PcapBlockOwned::Legacy(packet) = block {
                        let timestamp =
                            packet.ts_sec as u64 * 1_000_000_000 + packet.ts_usec as u64 * 1_000;
                        if let Some(payload) = Self::extract_udp_payload(packet.data, port) {
                            packets.push(ExtractedPacket { payload, timestamp });
                        }
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => break,
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAP parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    fn extract_pcapng(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<ExtractedPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        let mut reader = PcapNGReader::new(data.len(), data)
            .map_err(|e| Error::InvalidPacket(format!("failed to create PCAPNG reader: {:?}", e)))?;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            // Default interface resolution is microseconds.
                            let timestamp =
                                (((epb.ts_high as u64) << 32) | epb.ts_low as u64) * 1_000;
                            if let Some(payload) = Self::extract_udp_payload(epb.data, port) {
                                packets.push(ExtractedPacket { payload, timestamp });
                            }
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                            if let Some(payload) = Self::extract_udp_payload(spb.data, port) {
                                packets.push(ExtractedPacket {
                                    payload,
                                    timestamp: 0,
                                });
                            }
                        }
                        _ => {
                            // Skip other block types (SHB, IDB, etc.)
                        }
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => break,
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAPNG parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    /// Extract the UDP payload from raw link-layer packet data.
    fn extract_udp_payload(data: &[u8], port: Option<u16>) -> Option<Vec<u8>> {
        use etherparse::SlicedPacket;

        let packet = SlicedPacket::from_ethernet(data).ok()?;
        let udp = match packet.transport {
            Some(etherparse::TransportSlice::Udp(udp)) => udp,
            _ => return None,
        };

        if let Some(filter_port) = port {
            if udp.source_port() != filter_port && udp.destination_port() != filter_port {
                return None;
            }
        }

        let payload = udp.payload().to_vec();
        if payload.is_empty() {
            return None;
        }
        Some(payload)
    }

    /// Rewind to the beginning for a second replay pass.
    pub fn reset(&mut self) {
        self.index = 0;
        self.tick = ScanTick::new();
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn handle(&self) -> SourceHandle {
        self.handle.clone()
    }
}

impl PacketSource for PcapSource {
    fn read_packet(&mut self, buf: &mut [u8; PACKET_SIZE]) -> Result<Option<usize>, Error> {
        if self.handle.is_closed() || self.index >= self.packets.len() {
            return Ok(None);
        }

        let packet = &self.packets[self.index];
        let len = packet.payload.len().min(buf.len());
        buf[..len].copy_from_slice(&packet.payload[..len]);
        self.timestamp = packet.timestamp;
        self.index += 1;
        Ok(Some(len))
    }

    fn packet_timestamp(&self) -> u64 {
        self.timestamp
    }

    fn is_new_scan(&mut self, packet: &PacketView) -> bool {
        self.tick.is_new_scan(packet)
    }

    fn close(&mut self) {
        self.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketBuilder;

    // Minimal valid legacy PCAP header (little-endian)
    const PCAP_HEADER: [u8; 24] = [
        0xd4, 0xc3, 0xb2, 0xa1, // Magic number (little-endian)
        0x02, 0x00, // Major version
        0x04, 0x00, // Minor version
        0x00, 0x00, 0x00, 0x00, // Timezone
        0x00, 0x00, 0x00, 0x00, // Timestamp accuracy
        0xff, 0xff, 0x00, 0x00, // Snap length
        0x01, 0x00, 0x00, 0x00, // Network type (Ethernet)
    ];

    // Create a minimal UDP packet with Ethernet + IP + UDP headers
    fn make_udp_packet(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let udp_len = 8 + payload.len();
        let ip_len = 20 + udp_len;

        let mut packet = Vec::with_capacity(14 + ip_len);

        // Ethernet header (14 bytes)
        packet.extend_from_slice(&[0x00; 6]); // Dst MAC
        packet.extend_from_slice(&[0x00; 6]); // Src MAC
        packet.extend_from_slice(&[0x08, 0x00]); // EtherType: IPv4

        // IPv4 header (20 bytes, no options)
        packet.push(0x45); // Version + IHL
        packet.push(0x00); // DSCP + ECN
        packet.extend_from_slice(&(ip_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]); // Identification
        packet.extend_from_slice(&[0x00, 0x00]); // Flags + Fragment offset
        packet.push(0x40); // TTL
        packet.push(0x11); // Protocol: UDP
        packet.extend_from_slice(&[0x00, 0x00]); // Checksum (0 for test)
        packet.extend_from_slice(&[192, 168, 1, 1]); // Src IP
        packet.extend_from_slice(&[192, 168, 1, 2]); // Dst IP

        // UDP header (8 bytes)
        packet.extend_from_slice(&src_port.to_be_bytes());
        packet.extend_from_slice(&dst_port.to_be_bytes());
        packet.extend_from_slice(&(udp_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]); // Checksum (0 for test)

        packet.extend_from_slice(payload);
        packet
    }

    // Create a PCAP packet record with a capture time
    fn make_pcap_record(data: &[u8], ts_sec: u32, ts_usec: u32) -> Vec<u8> {
        let len = data.len() as u32;
        let mut record = Vec::with_capacity(16 + data.len());

        record.extend_from_slice(&ts_sec.to_le_bytes());
        record.extend_from_slice(&ts_usec.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes()); // Captured length
        record.extend_from_slice(&len.to_le_bytes()); // Original length
        record.extend_from_slice(data);
        record
    }

    fn capture_with(packets: &[(Vec<u8>, u32, u32)]) -> Vec<u8> {
        let mut pcap_data = PCAP_HEADER.to_vec();
        for (data, sec, usec) in packets {
            pcap_data.extend_from_slice(&make_pcap_record(data, *sec, *usec));
        }
        pcap_data
    }

    #[test]
    fn test_extract_udp_payload_port_filter() {
        let payload = b"test payload";
        let packet = make_udp_packet(2368, 12345, payload);

        assert_eq!(
            PcapSource::extract_udp_payload(&packet, None).unwrap(),
            payload
        );
        assert!(PcapSource::extract_udp_payload(&packet, Some(2368)).is_some());
        assert!(PcapSource::extract_udp_payload(&packet, Some(12345)).is_some());
        assert!(PcapSource::extract_udp_payload(&packet, Some(9999)).is_none());
    }

    #[test]
    fn test_replay_preserves_capture_timestamps() {
        let sensor_packet = PacketBuilder::new().rotation(0, 100).build();
        let udp = make_udp_packet(2368, 12345, &sensor_packet);
        let pcap_data = capture_with(&[(udp.clone(), 10, 500), (udp, 10, 600)]);

        let mut source = PcapSource::from_bytes(&pcap_data, None).unwrap();
        assert_eq!(source.len(), 2);

        let mut buf = [0u8; PACKET_SIZE];
        source.read_packet(&mut buf).unwrap().unwrap();
        assert_eq!(source.packet_timestamp(), 10_000_000_000 + 500_000);
        source.read_packet(&mut buf).unwrap().unwrap();
        assert_eq!(source.packet_timestamp(), 10_000_000_000 + 600_000);
        assert!(source.read_packet(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_port_filter_drops_other_traffic() {
        let sensor_packet = PacketBuilder::new().build();
        let sensor = make_udp_packet(2368, 12345, &sensor_packet);
        let other = make_udp_packet(7000, 12345, b"not lidar");
        let pcap_data = capture_with(&[(sensor, 0, 0), (other, 0, 1)]);

        let source = PcapSource::from_bytes(&pcap_data, Some(2368)).unwrap();
        assert_eq!(source.len(), 1);

        let source = PcapSource::from_bytes(&pcap_data, None).unwrap();
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn test_reset_allows_second_pass() {
        let sensor_packet = PacketBuilder::new().build();
        let udp = make_udp_packet(2368, 12345, &sensor_packet);
        let pcap_data = capture_with(&[(udp, 0, 0)]);

        let mut source = PcapSource::from_bytes(&pcap_data, None).unwrap();
        let mut buf = [0u8; PACKET_SIZE];
        source.read_packet(&mut buf).unwrap().unwrap();
        assert!(source.read_packet(&mut buf).unwrap().is_none());

        source.reset();
        assert!(source.read_packet(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_empty_capture() {
        let source = PcapSource::from_bytes(&PCAP_HEADER, None).unwrap();
        assert!(source.is_empty());
    }
}
