// SPDX-License-Identifier: Apache-2.0

//! HDL-64 data packet layout and bounds-checked field access.
//!
//! Each 1206-byte datagram carries 12 firing blocks. A block holds a 2-byte
//! bank marker, a 2-byte rotation in hundredths of a degree and 32 firings
//! of 3 bytes each (2-byte distance in sensor counts, 1-byte intensity).
//! The packet ends with a 4-byte GPS timestamp (microseconds into the hour)
//! and 2 status bytes.
//!
//! All multi-byte fields are little-endian. The layout is a hardware
//! contract and must stay bit-exact to remain compatible with existing
//! sensor recordings.

use crate::common::Error;

/// Total datagram size in bytes
pub const PACKET_SIZE: usize = 1206;

/// Number of firing blocks per packet
pub const BLOCKS_PER_PACKET: usize = 12;

/// Number of laser firings per block
pub const LASERS_PER_BLOCK: usize = 32;

/// Firing slots per packet (12 blocks x 32 lasers)
pub const SLOTS_PER_PACKET: usize = BLOCKS_PER_PACKET * LASERS_PER_BLOCK;

/// Size of one block in bytes: marker + rotation + 32 firings
pub const BLOCK_SIZE: usize = 4 + LASERS_PER_BLOCK * FIRING_SIZE;

/// Size of one firing record in bytes
pub const FIRING_SIZE: usize = 3;

/// Block marker for the upper laser bank (lasers 0-31)
pub const UPPER_BANK: u16 = 0xeeff;

/// Block marker for the lower laser bank (lasers 32-63)
pub const LOWER_BANK: u16 = 0xddff;

/// Rotation field wraps at 36000 hundredths of a degree
pub const ROTATION_MAX: u16 = 36000;

/// Reserved distance value meaning "no echo received"
pub const NO_ECHO: u16 = 0;

/// Packet layout variant, selected once at stream construction.
///
/// Older firmware fires banks sequentially and reports distance in finer
/// counts; newer firmware interleaves block pairs. The variant selects both
/// the firing traversal order and the distance decoding scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PacketLayout {
    /// Paired-bank interleave, 2.0 mm distance counts
    #[default]
    Modern,
    /// Sequential block traversal, 1.0 mm distance counts
    Legacy,
}

impl PacketLayout {
    /// Meters per raw distance count for this firmware generation.
    pub fn distance_resolution(&self) -> f64 {
        match self {
            PacketLayout::Modern => 0.002,
            PacketLayout::Legacy => 0.001,
        }
    }
}

/// Bounds-checked view over one raw packet.
///
/// Construction validates the length once; accessors then index at fixed
/// offsets derived from the block/laser indices.
#[derive(Copy, Clone, Debug)]
pub struct PacketView<'a> {
    slice: &'a [u8],
}

impl<'a> PacketView<'a> {
    pub fn from_slice(slice: &'a [u8]) -> Result<PacketView<'a>, Error> {
        if slice.len() != PACKET_SIZE {
            return Err(Error::InvalidPacket(format!(
                "wrong packet size: {} bytes, expected {}",
                slice.len(),
                PACKET_SIZE
            )));
        }
        Ok(PacketView { slice })
    }

    fn block_offset(block: usize) -> usize {
        debug_assert!(block < BLOCKS_PER_PACKET);
        block * BLOCK_SIZE
    }

    fn firing_offset(block: usize, laser: usize) -> usize {
        debug_assert!(laser < LASERS_PER_BLOCK);
        Self::block_offset(block) + 4 + laser * FIRING_SIZE
    }

    /// Bank marker of a block ([`UPPER_BANK`] or [`LOWER_BANK`]).
    pub fn block_marker(&self, block: usize) -> u16 {
        let off = Self::block_offset(block);
        u16::from_le_bytes([self.slice[off], self.slice[off + 1]])
    }

    /// Rotation of a block in hundredths of a degree, 0-35999.
    pub fn rotation(&self, block: usize) -> u16 {
        let off = Self::block_offset(block) + 2;
        u16::from_le_bytes([self.slice[off], self.slice[off + 1]])
    }

    /// Raw distance counts for one firing. Zero means no echo.
    pub fn distance_raw(&self, block: usize, laser: usize) -> u16 {
        let off = Self::firing_offset(block, laser);
        u16::from_le_bytes([self.slice[off], self.slice[off + 1]])
    }

    /// Intensity/reflectivity byte for one firing.
    pub fn intensity(&self, block: usize, laser: usize) -> u8 {
        self.slice[Self::firing_offset(block, laser) + 2]
    }

    /// GPS timestamp: microseconds past the hour.
    pub fn gps_timestamp_us(&self) -> u32 {
        let off = BLOCKS_PER_PACKET * BLOCK_SIZE;
        u32::from_le_bytes([
            self.slice[off],
            self.slice[off + 1],
            self.slice[off + 2],
            self.slice[off + 3],
        ])
    }

    /// Trailing status bytes (firmware value and type).
    pub fn status(&self) -> [u8; 2] {
        [self.slice[PACKET_SIZE - 2], self.slice[PACKET_SIZE - 1]]
    }
}

/// Builder for synthetic packets, used by tests and benchmarks.
///
/// Produces byte-exact packets with alternating upper/lower bank markers
/// and caller-supplied rotation and firing fields.
#[derive(Clone)]
pub struct PacketBuilder {
    buf: [u8; PACKET_SIZE],
}

impl PacketBuilder {
    pub fn new() -> Self {
        let mut buf = [0u8; PACKET_SIZE];
        for block in 0..BLOCKS_PER_PACKET {
            let marker = if block % 2 == 0 { UPPER_BANK } else { LOWER_BANK };
            let off = block * BLOCK_SIZE;
            buf[off..off + 2].copy_from_slice(&marker.to_le_bytes());
        }
        Self { buf }
    }

    /// Set the rotation field of one block, in hundredths of a degree.
    pub fn rotation(mut self, block: usize, centideg: u16) -> Self {
        let off = block * BLOCK_SIZE + 2;
        self.buf[off..off + 2].copy_from_slice(&centideg.to_le_bytes());
        self
    }

    /// Set all 12 block rotations from a starting angle and per-block step,
    /// wrapping at 36000.
    pub fn rotation_sweep(mut self, start_centideg: u16, step_centideg: u16) -> Self {
        for block in 0..BLOCKS_PER_PACKET {
            let rot = (start_centideg as u32 + block as u32 * step_centideg as u32)
                % ROTATION_MAX as u32;
            self = self.rotation(block, rot as u16);
        }
        self
    }

    /// Set distance and intensity of a single firing.
    pub fn firing(mut self, block: usize, laser: usize, distance: u16, intensity: u8) -> Self {
        let off = block * BLOCK_SIZE + 4 + laser * FIRING_SIZE;
        self.buf[off..off + 2].copy_from_slice(&distance.to_le_bytes());
        self.buf[off + 2] = intensity;
        self
    }

    /// Set every firing in the packet to the same distance and intensity.
    pub fn fill(mut self, distance: u16, intensity: u8) -> Self {
        for block in 0..BLOCKS_PER_PACKET {
            for laser in 0..LASERS_PER_BLOCK {
                self = self.firing(block, laser, distance, intensity);
            }
        }
        self
    }

    /// Set the trailing GPS timestamp field.
    pub fn gps_timestamp(mut self, microseconds: u32) -> Self {
        let off = BLOCKS_PER_PACKET * BLOCK_SIZE;
        self.buf[off..off + 4].copy_from_slice(&microseconds.to_le_bytes());
        self
    }

    pub fn build(self) -> [u8; PACKET_SIZE] {
        self.buf
    }
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}
