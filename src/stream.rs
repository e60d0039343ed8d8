// SPDX-License-Identifier: Apache-2.0

//! Pull-based point stream over a packet source.
//!
//! [`PointStream`] owns one buffered packet at a time and walks its firing
//! slots in hardware order, emitting one [`LaserReturn`] per `read`. When
//! the slots of the buffered packet are exhausted it pulls the next packet,
//! updates the scan counter from the source's boundary detector and, in
//! self-estimating mode, recomputes the angular velocity.
//!
//! Single-owner model: one consumer thread drives `read`/`skip_scan`
//! synchronously. `read` blocks only inside the source's packet fetch; to
//! interrupt it from another thread, close the source through its
//! [`crate::source::SourceHandle`], which makes `read` return end-of-stream
//! within a bounded interval.

use crate::calibration::Calibration;
use crate::common::Error;
use crate::firing::FiringSequence;
use crate::packet::{PACKET_SIZE, PacketLayout, PacketView};
use crate::point::{LaserReturn, build_return};
use crate::source::PacketSource;
use crate::timing::AngularVelocity;
use tracing::{debug, warn};

/// Stream construction options.
#[derive(Clone, Debug, Default)]
pub struct StreamOptions {
    /// Configured spin rate; `None` selects per-packet self-estimation.
    pub rpm: Option<u32>,
    /// Emit no-echo returns, flagged invalid, instead of skipping them.
    pub output_invalid: bool,
    /// Firmware packet layout variant.
    pub layout: PacketLayout,
}

/// Decodes a packet source into a stream of calibrated laser returns.
pub struct PointStream<S: PacketSource> {
    source: S,
    calibration: Calibration,
    layout: PacketLayout,
    velocity: AngularVelocity,
    output_invalid: bool,
    buf: [u8; PACKET_SIZE],
    have_packet: bool,
    sequence: FiringSequence,
    packet_timestamp: u64,
    scan: u32,
    closed: bool,
}

impl<S: PacketSource> PointStream<S> {
    pub fn new(source: S, calibration: Calibration, options: StreamOptions) -> Self {
        let velocity = match options.rpm {
            Some(rpm) => AngularVelocity::fixed(rpm),
            None => AngularVelocity::auto(),
        };
        Self {
            source,
            calibration,
            layout: options.layout,
            velocity,
            output_invalid: options.output_invalid,
            buf: [0u8; PACKET_SIZE],
            have_packet: false,
            sequence: FiringSequence::exhausted(options.layout),
            packet_timestamp: 0,
            scan: 0,
            closed: false,
        }
    }

    /// Read the next laser return.
    ///
    /// Returns `Ok(None)` at end of stream: source exhaustion, source
    /// failure already reported, or after [`PointStream::close`]. Invalid
    /// returns are skipped unless the stream was configured to emit them,
    /// looping across packets until a value is produced or the stream ends.
    pub fn read(&mut self) -> Result<Option<LaserReturn>, Error> {
        loop {
            if self.closed {
                return Ok(None);
            }
            if !self.have_packet || self.sequence.is_exhausted() {
                if self.next_packet()?.is_none() {
                    return Ok(None);
                }
            }

            let slot = match self.sequence.next() {
                Some(slot) => slot,
                None => {
                    self.have_packet = false;
                    continue;
                }
            };

            // Length was validated when the packet was buffered.
            let packet = PacketView::from_slice(&self.buf)?;
            let ret = build_return(
                &packet,
                slot,
                self.layout,
                &self.calibration,
                self.velocity.degrees_per_second(),
                self.packet_timestamp,
            );
            if ret.valid || self.output_invalid {
                return Ok(Some(ret));
            }
        }
    }

    /// Discard packets until a new-scan boundary, without emitting points.
    ///
    /// The boundary packet stays buffered, so the next `read` starts at the
    /// beginning of the new revolution. Used to resynchronize a consumer
    /// that has fallen behind.
    pub fn skip_scan(&mut self) -> Result<(), Error> {
        while !self.closed {
            match self.next_packet()? {
                Some(true) | None => return Ok(()),
                Some(false) => {}
            }
        }
        Ok(())
    }

    /// Current scan number: incremented once per detected revolution
    /// boundary, starting at 0.
    pub fn scan(&self) -> u32 {
        self.scan
    }

    /// Interrupt reading. Idempotent; propagates to the source, and all
    /// subsequent reads return end-of-stream.
    pub fn close(&mut self) {
        if !self.closed {
            debug!(scan = self.scan, "closing point stream");
            self.closed = true;
            self.source.close();
        }
    }

    /// Fetch and buffer the next well-formed packet.
    ///
    /// Returns whether the packet started a new scan, or `None` at end of
    /// stream. Wrong-size packets are discarded without touching the scan
    /// counter.
    fn next_packet(&mut self) -> Result<Option<bool>, Error> {
        loop {
            let len = match self.source.read_packet(&mut self.buf) {
                Ok(Some(len)) => len,
                Ok(None) => {
                    self.have_packet = false;
                    return Ok(None);
                }
                // A read failure ends the stream: no retries against a
                // broken source, and later reads return end-of-stream.
                Err(e) => {
                    self.closed = true;
                    self.source.close();
                    return Err(e);
                }
            };
            if len != PACKET_SIZE {
                warn!(len, "discarding malformed packet");
                continue;
            }

            let packet = PacketView::from_slice(&self.buf)?;
            let new_scan = self.source.is_new_scan(&packet);
            if new_scan {
                self.scan += 1;
            }
            self.velocity.update(&packet, self.layout);
            self.packet_timestamp = self.source.packet_timestamp();
            self.sequence.restart();
            self.have_packet = true;
            return Ok(Some(new_scan));
        }
    }
}
