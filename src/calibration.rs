// SPDX-License-Identifier: Apache-2.0

//! Per-laser calibration database.
//!
//! Each of the 64 lasers carries factory corrections applied when turning a
//! raw (distance, laser id) pair into a corrected 3D offset: vertical angle,
//! rotational correction, distance scale/offset and mounting offsets. A
//! remap table translates the firing slot's logical laser id into the
//! physical laser, which differs between legacy and modern firmware.

use crate::common::Error;
use crate::packet::PacketLayout;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of physical lasers
pub const NUM_LASERS: usize = 64;

/// Vertical field of view of the upper bank, degrees
const UPPER_FOV: (f64, f64) = (2.0, -8.33);

/// Vertical field of view of the lower bank, degrees
const LOWER_FOV: (f64, f64) = (-8.83, -24.33);

/// Factory corrections for one laser.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LaserCalibration {
    /// Elevation angle of the beam, degrees
    pub vertical_angle: f64,
    /// Horizontal angle correction added to the interpolated azimuth, degrees
    pub rotational_correction: f64,
    /// Additive distance correction, meters
    pub distance_correction: f64,
    /// Multiplicative distance correction
    pub distance_scale: f64,
    /// Beam origin offset along the spin axis, meters
    pub vertical_offset: f64,
    /// Beam origin offset perpendicular to the beam, meters
    pub horizontal_offset: f64,
}

impl Default for LaserCalibration {
    fn default() -> Self {
        Self {
            vertical_angle: 0.0,
            rotational_correction: 0.0,
            distance_correction: 0.0,
            distance_scale: 1.0,
            vertical_offset: 0.0,
            horizontal_offset: 0.0,
        }
    }
}

/// Calibration database for the full laser array.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Calibration {
    lasers: Vec<LaserCalibration>,
    /// Logical (slot-derived) laser id to physical laser id, used when the
    /// legacy firing interleave orders lasers differently.
    #[serde(default = "identity_remap")]
    legacy_remap: Vec<usize>,
}

fn identity_remap() -> Vec<usize> {
    (0..NUM_LASERS).collect()
}

impl Calibration {
    /// Nominal calibration: beams spread linearly over each bank's vertical
    /// field of view, no distance or azimuth corrections, identity remap.
    pub fn nominal() -> Self {
        let mut lasers = Vec::with_capacity(NUM_LASERS);
        for id in 0..NUM_LASERS {
            let (bank_top, bank_bottom, step) = if id < 32 {
                (UPPER_FOV.0, UPPER_FOV.1, id as f64)
            } else {
                (LOWER_FOV.0, LOWER_FOV.1, (id - 32) as f64)
            };
            let vertical_angle = bank_top + step * (bank_bottom - bank_top) / 31.0;
            lasers.push(LaserCalibration {
                vertical_angle,
                ..Default::default()
            });
        }
        Self {
            lasers,
            legacy_remap: identity_remap(),
        }
    }

    /// Load a calibration database from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let calibration: Calibration = serde_json::from_str(&data)
            .map_err(|e| Error::Calibration(format!("failed to parse calibration: {}", e)))?;
        calibration.validate()?;
        Ok(calibration)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.lasers.len() != NUM_LASERS {
            return Err(Error::Calibration(format!(
                "expected {} laser entries, got {}",
                NUM_LASERS,
                self.lasers.len()
            )));
        }
        if self.legacy_remap.len() != NUM_LASERS
            || self.legacy_remap.iter().any(|&id| id >= NUM_LASERS)
        {
            return Err(Error::Calibration("invalid legacy remap table".to_string()));
        }
        Ok(())
    }

    /// Physical laser id for a firing slot.
    ///
    /// The logical id follows block parity: even (upper bank) blocks carry
    /// lasers 0-31, odd (lower bank) blocks 32-63. Legacy firmware routes
    /// through the remap table.
    pub fn physical_laser(&self, layout: PacketLayout, block: usize, laser: usize) -> usize {
        let logical = laser + (block % 2) * 32;
        match layout {
            PacketLayout::Modern => logical,
            PacketLayout::Legacy => self.legacy_remap[logical],
        }
    }

    /// Corrections for one physical laser.
    pub fn laser(&self, id: usize) -> &LaserCalibration {
        &self.lasers[id]
    }

    /// Mutable corrections for one physical laser.
    pub fn laser_mut(&mut self, id: usize) -> &mut LaserCalibration {
        &mut self.lasers[id]
    }

    /// Replace the legacy remap table.
    ///
    /// A rejected table leaves the current one in place, so later slot
    /// lookups never index out of range.
    pub fn set_legacy_remap(&mut self, remap: Vec<usize>) -> Result<(), Error> {
        if remap.len() != NUM_LASERS || remap.iter().any(|&id| id >= NUM_LASERS) {
            return Err(Error::Calibration("invalid legacy remap table".to_string()));
        }
        self.legacy_remap = remap;
        Ok(())
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::nominal()
    }
}
