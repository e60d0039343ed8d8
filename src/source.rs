// SPDX-License-Identifier: Apache-2.0

//! Packet source abstraction for the point stream.
//!
//! A [`PacketSource`] supplies fixed-size packets with a timestamp and a
//! revolution boundary signal. Implementations cover live operation
//! ([`UdpSource`]), testing ([`TestSource`]) and recorded replay
//! ([`crate::pcap_source::PcapSource`] with the `pcap` feature).
//!
//! Sources hand out a cloneable [`SourceHandle`] so a blocked read can be
//! interrupted from another thread (e.g. a signal handler); after
//! `handle.close()` an in-flight `read_packet` returns end-of-stream within
//! a bounded interval instead of hanging.

use crate::common::{Error, timestamp};
use crate::packet::{PACKET_SIZE, PacketView};
use crate::scan::ScanTick;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

/// Trait for packet sources.
///
/// `read_packet` blocks until a packet arrives, the source is exhausted or
/// it is closed; the latter two report `Ok(None)`. `packet_timestamp` is
/// valid immediately after a successful read. `is_new_scan` is the
/// transport's boundary detector for the packet just read; sources without
/// richer metadata delegate to a [`ScanTick`].
pub trait PacketSource: Send {
    /// Blocking read of the next packet into `buf`.
    ///
    /// Returns `Ok(Some(len))` with the datagram length, or `Ok(None)` at
    /// end of stream or after close.
    fn read_packet(&mut self, buf: &mut [u8; PACKET_SIZE]) -> Result<Option<usize>, Error>;

    /// Timestamp in nanoseconds of the most recently read packet.
    fn packet_timestamp(&self) -> u64;

    /// Revolution boundary test for the packet just read.
    fn is_new_scan(&mut self, packet: &PacketView) -> bool;

    /// Release the source; unblocks an in-flight read.
    fn close(&mut self);
}

impl PacketSource for Box<dyn PacketSource> {
    fn read_packet(&mut self, buf: &mut [u8; PACKET_SIZE]) -> Result<Option<usize>, Error> {
        (**self).read_packet(buf)
    }

    fn packet_timestamp(&self) -> u64 {
        (**self).packet_timestamp()
    }

    fn is_new_scan(&mut self, packet: &PacketView) -> bool {
        (**self).is_new_scan(packet)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Cloneable handle that closes a source from any thread.
#[derive(Clone, Debug)]
pub struct SourceHandle {
    closed: Arc<AtomicBool>,
}

impl SourceHandle {
    pub(crate) fn new() -> Self {
        Self {
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Poll interval for the closed flag while a socket read blocks
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Receive scratch size, larger than any sensor datagram so oversize
/// datagrams keep their true length instead of being truncated by recv
const RECV_BUFFER_SIZE: usize = 2048;

/// UDP socket packet source for live sensor operation.
///
/// Wrong-size datagrams are dropped with a warning; the sensor emits a fixed
/// datagram size and anything else is line noise.
pub struct UdpSource {
    socket: UdpSocket,
    recv_buf: [u8; RECV_BUFFER_SIZE],
    handle: SourceHandle,
    timestamp: u64,
    tick: ScanTick,
}

impl UdpSource {
    /// Bind to an address and create a UDP source.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        Ok(Self {
            socket,
            recv_buf: [0u8; RECV_BUFFER_SIZE],
            handle: SourceHandle::new(),
            timestamp: 0,
            tick: ScanTick::new(),
        })
    }

    /// Handle for closing this source from another thread.
    pub fn handle(&self) -> SourceHandle {
        self.handle.clone()
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

impl PacketSource for UdpSource {
    fn read_packet(&mut self, buf: &mut [u8; PACKET_SIZE]) -> Result<Option<usize>, Error> {
        loop {
            if self.handle.is_closed() {
                return Ok(None);
            }
            // Receive into the oversized scratch so a too-long datagram
            // reports its real length rather than being cut to fit.
            match self.socket.recv(&mut self.recv_buf) {
                Ok(len) if len == PACKET_SIZE => {
                    buf.copy_from_slice(&self.recv_buf[..PACKET_SIZE]);
                    self.timestamp = timestamp()?;
                    return Ok(Some(len));
                }
                Ok(len) => {
                    warn!(len, "dropping wrong-size datagram");
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    // Timed out; re-check the closed flag.
                }
                Err(e) => return Err(e.into()),
            }
        }
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

/// Scripted packet source for unit testing.
///
/// Replays a fixed sequence of packets with optional per-packet timestamps
/// and boundary flags; without scripted boundaries it falls back to the
/// azimuth-wraparound watch like a live source.
pub struct TestSource {
    packets: Vec<Vec<u8>>,
    timestamps: Option<Vec<u64>>,
    boundaries: Option<Vec<bool>>,
    index: usize,
    timestamp: u64,
    handle: SourceHandle,
    tick: ScanTick,
}

impl TestSource {
    /// Packets replayed 100 us apart starting at t = 1 ms.
    pub fn new(packets: Vec<Vec<u8>>) -> Self {
        Self {
            packets,
            timestamps: None,
            boundaries: None,
            index: 0,
            timestamp: 0,
            handle: SourceHandle::new(),
            tick: ScanTick::new(),
        }
    }

    /// Use explicit per-packet timestamps (nanoseconds).
    pub fn with_timestamps(mut self, timestamps: Vec<u64>) -> Self {
        assert_eq!(timestamps.len(), self.packets.len());
        self.timestamps = Some(timestamps);
        self
    }

    /// Script the boundary signal instead of the azimuth watch, modelling a
    /// transport with its own scan markers.
    pub fn with_boundaries(mut self, boundaries: Vec<bool>) -> Self {
        assert_eq!(boundaries.len(), self.packets.len());
        self.boundaries = Some(boundaries);
        self
    }

    pub fn handle(&self) -> SourceHandle {
        self.handle.clone()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl PacketSource for TestSource {
    fn read_packet(&mut self, buf: &mut [u8; PACKET_SIZE]) -> Result<Option<usize>, Error> {
        if self.handle.is_closed() || self.index >= self.packets.len() {
            return Ok(None);
        }

        let packet = &self.packets[self.index];
        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        self.timestamp = match &self.timestamps {
            Some(stamps) => stamps[self.index],
            None => 1_000_000 + self.index as u64 * 100_000,
        };
        self.index += 1;
        Ok(Some(len))
    }

    fn packet_timestamp(&self) -> u64 {
        self.timestamp
    }

    fn is_new_scan(&mut self, packet: &PacketView) -> bool {
        match &self.boundaries {
            // index already advanced past the packet under test
            Some(flags) => flags[self.index - 1],
            None => self.tick.is_new_scan(packet),
        }
    }

    fn close(&mut self) {
        self.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketBuilder;

    #[test]
    fn test_test_source_replays_in_order() {
        let packets = vec![
            PacketBuilder::new().rotation(0, 100).build().to_vec(),
            PacketBuilder::new().rotation(0, 200).build().to_vec(),
        ];
        let mut source = TestSource::new(packets);
        let mut buf = [0u8; PACKET_SIZE];

        let len = source.read_packet(&mut buf).unwrap().unwrap();
        assert_eq!(len, PACKET_SIZE);
        assert_eq!(PacketView::from_slice(&buf).unwrap().rotation(0), 100);
        let t0 = source.packet_timestamp();

        source.read_packet(&mut buf).unwrap().unwrap();
        assert_eq!(PacketView::from_slice(&buf).unwrap().rotation(0), 200);
        assert!(source.packet_timestamp() > t0);

        assert!(source.read_packet(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_test_source_close_ends_stream() {
        let packets = vec![PacketBuilder::new().build().to_vec(); 3];
        let mut source = TestSource::new(packets);
        let mut buf = [0u8; PACKET_SIZE];

        source.read_packet(&mut buf).unwrap().unwrap();
        source.handle().close();
        assert!(source.read_packet(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_scripted_boundaries() {
        let packets = vec![PacketBuilder::new().build().to_vec(); 3];
        let mut source =
            TestSource::new(packets).with_boundaries(vec![false, true, false]);
        let mut buf = [0u8; PACKET_SIZE];

        let mut flags = Vec::new();
        while source.read_packet(&mut buf).unwrap().is_some() {
            let packet = PacketView::from_slice(&buf).unwrap();
            flags.push(source.is_new_scan(&packet));
        }
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn test_udp_source_drops_oversized_datagrams() {
        let mut source = UdpSource::bind("127.0.0.1:0").unwrap();
        let addr = source.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        // An oversized datagram whose first 1206 bytes look like a valid
        // packet must not pass as one.
        let mut oversized = vec![0u8; PACKET_SIZE + 100];
        oversized[..PACKET_SIZE]
            .copy_from_slice(&PacketBuilder::new().rotation(0, 111).build());
        sender.send_to(&oversized, addr).unwrap();

        let valid = PacketBuilder::new().rotation(0, 222).build();
        sender.send_to(&valid, addr).unwrap();

        let mut buf = [0u8; PACKET_SIZE];
        let len = source.read_packet(&mut buf).unwrap().unwrap();
        assert_eq!(len, PACKET_SIZE);
        assert_eq!(PacketView::from_slice(&buf).unwrap().rotation(0), 222);
    }

    #[test]
    fn test_udp_source_close_unblocks_read() {
        use std::time::Instant;

        let mut source = UdpSource::bind("127.0.0.1:0").unwrap();
        let handle = source.handle();

        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.close();
        });

        let start = Instant::now();
        let mut buf = [0u8; PACKET_SIZE];
        let result = source.read_packet(&mut buf).unwrap();
        closer.join().unwrap();

        assert!(result.is_none());
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
