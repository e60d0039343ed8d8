// SPDX-License-Identifier: Apache-2.0

//! Revolution boundary detection from azimuth wraparound.

use crate::packet::PacketView;

/// Watches the rotation field across consecutive packets and reports a new
/// scan when the azimuth wraps past zero.
///
/// This is the default boundary strategy; sources with richer transport
/// metadata (e.g. recorded frame markers) may substitute their own in
/// [`crate::source::PacketSource::is_new_scan`].
#[derive(Clone, Debug, Default)]
pub struct ScanTick {
    last_rotation: Option<u16>,
}

impl ScanTick {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when this packet starts a new revolution.
    ///
    /// Compares block 0 rotations of consecutive packets; the head spins in
    /// one direction, so a decrease means the azimuth wrapped past zero. The
    /// first packet does not count as a boundary.
    pub fn is_new_scan(&mut self, packet: &PacketView) -> bool {
        let rotation = packet.rotation(0);
        let boundary = match self.last_rotation {
            None => false,
            Some(previous) => rotation < previous,
        };
        self.last_rotation = Some(rotation);
        boundary
    }
}
