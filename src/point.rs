// SPDX-License-Identifier: Apache-2.0

//! Calibrated laser return record and its construction from a firing slot.

use crate::calibration::Calibration;
use crate::firing::Slot;
use crate::packet::{NO_ECHO, PacketLayout, PacketView};
use crate::timing::{interpolate_azimuth, slot_timestamp, wrap_degrees};

/// One calibrated, timestamped laser measurement.
///
/// A value type independent of the packet buffer it was decoded from, so it
/// may be retained across subsequent reads. Range 0 with `valid == false`
/// means the laser received no echo.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LaserReturn {
    /// Physical laser id, 0-63
    pub id: u8,
    /// Reflectivity, 0-255
    pub intensity: u8,
    /// False when the firing produced no echo
    pub valid: bool,
    /// Corrected range in meters, 0 when invalid
    pub range: f64,
    /// Azimuth in degrees, sensor frame, [0, 360)
    pub azimuth: f64,
    /// Beam elevation in degrees, from calibration
    pub elevation: f64,
    /// Absolute firing time, nanoseconds
    pub timestamp: u64,
    /// Cartesian position in the sensor frame, meters
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LaserReturn {
    pub fn csv_header() -> &'static str {
        "id,intensity,range,azimuth,elevation,timestamp,x,y,z"
    }

    pub fn to_csv_string(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{}",
            self.id,
            self.intensity,
            self.range,
            self.azimuth,
            self.elevation,
            self.timestamp,
            self.x,
            self.y,
            self.z
        )
    }
}

/// Build the laser return for one firing slot.
///
/// Combines the raw distance and intensity with the slot's interpolated
/// azimuth and timestamp and the per-laser calibration. Invalid firings
/// (reserved no-echo distance) still produce a record, flagged invalid,
/// so the filtering policy stays with the caller.
pub fn build_return(
    packet: &PacketView,
    slot: Slot,
    layout: PacketLayout,
    calibration: &Calibration,
    angular_speed_dps: f64,
    packet_timestamp_ns: u64,
) -> LaserReturn {
    let raw_distance = packet.distance_raw(slot.block, slot.laser);
    let intensity = packet.intensity(slot.block, slot.laser);
    let id = calibration.physical_laser(layout, slot.block, slot.laser);
    let laser = calibration.laser(id);

    let azimuth = wrap_degrees(
        interpolate_azimuth(packet.rotation(slot.block), slot.laser, angular_speed_dps)
            + laser.rotational_correction,
    );
    let timestamp = slot_timestamp(packet_timestamp_ns, layout, slot.block, slot.laser);
    let elevation = laser.vertical_angle;

    let valid = raw_distance != NO_ECHO;
    let range = if valid {
        raw_distance as f64 * layout.distance_resolution() * laser.distance_scale
            + laser.distance_correction
    } else {
        0.0
    };

    let azimuth_rad = azimuth.to_radians();
    let elevation_rad = elevation.to_radians();
    let planar = range * elevation_rad.cos();
    let x = planar * azimuth_rad.sin() - laser.horizontal_offset * azimuth_rad.cos();
    let y = planar * azimuth_rad.cos() + laser.horizontal_offset * azimuth_rad.sin();
    let z = range * elevation_rad.sin() + laser.vertical_offset;

    LaserReturn {
        id: id as u8,
        intensity,
        valid,
        range,
        azimuth,
        elevation,
        timestamp,
        x,
        y,
        z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketBuilder;

    fn slot(block: usize, laser: usize) -> Slot {
        Slot { block, laser }
    }

    #[test]
    fn test_valid_return_geometry() {
        // 1000 counts at 2 mm = 2 m, laser 0 at +2 degrees elevation,
        // azimuth 90 degrees.
        let raw = PacketBuilder::new()
            .rotation(0, 9000)
            .firing(0, 0, 1000, 200)
            .build();
        let packet = PacketView::from_slice(&raw).unwrap();
        let cal = Calibration::nominal();

        let ret = build_return(&packet, slot(0, 0), PacketLayout::Modern, &cal, 0.0, 5_000);

        assert!(ret.valid);
        assert_eq!(ret.id, 0);
        assert_eq!(ret.intensity, 200);
        assert!((ret.range - 2.0).abs() < 1e-9);
        assert!((ret.azimuth - 90.0).abs() < 1e-9);
        assert!((ret.elevation - 2.0).abs() < 1e-9);
        assert_eq!(ret.timestamp, 5_000);

        // At azimuth 90 the beam points along +x.
        let planar = 2.0 * 2.0f64.to_radians().cos();
        assert!((ret.x - planar).abs() < 1e-9);
        assert!(ret.y.abs() < 1e-9);
        assert!((ret.z - 2.0 * 2.0f64.to_radians().sin()).abs() < 1e-9);
    }

    #[test]
    fn test_no_echo_marked_invalid() {
        let raw = PacketBuilder::new().build();
        let packet = PacketView::from_slice(&raw).unwrap();
        let cal = Calibration::nominal();

        let ret = build_return(&packet, slot(2, 7), PacketLayout::Modern, &cal, 1800.0, 0);
        assert!(!ret.valid);
        assert_eq!(ret.range, 0.0);
        assert_eq!(ret.x, 0.0);
        assert_eq!(ret.z, cal.laser(7).vertical_offset);
    }

    #[test]
    fn test_lower_bank_laser_id() {
        let raw = PacketBuilder::new().firing(1, 3, 500, 10).build();
        let packet = PacketView::from_slice(&raw).unwrap();
        let cal = Calibration::nominal();

        let ret = build_return(&packet, slot(1, 3), PacketLayout::Modern, &cal, 0.0, 0);
        assert_eq!(ret.id, 35);
        assert_eq!(ret.elevation, cal.laser(35).vertical_angle);
    }

    #[test]
    fn test_legacy_distance_resolution() {
        let raw = PacketBuilder::new().firing(0, 0, 1000, 1).build();
        let packet = PacketView::from_slice(&raw).unwrap();
        let cal = Calibration::nominal();

        let modern = build_return(&packet, slot(0, 0), PacketLayout::Modern, &cal, 0.0, 0);
        let legacy = build_return(&packet, slot(0, 0), PacketLayout::Legacy, &cal, 0.0, 0);
        assert!((modern.range - 2.0).abs() < 1e-9);
        assert!((legacy.range - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_corrections_applied() {
        let mut cal = Calibration::nominal();
        let raw = PacketBuilder::new().firing(0, 0, 1000, 1).build();
        let packet = PacketView::from_slice(&raw).unwrap();

        // Tweak laser 0: scale 1.1, +0.3 m offset.
        cal.laser_mut(0).distance_scale = 1.1;
        cal.laser_mut(0).distance_correction = 0.3;

        let ret = build_return(&packet, slot(0, 0), PacketLayout::Modern, &cal, 0.0, 0);
        assert!((ret.range - (2.0 * 1.1 + 0.3)).abs() < 1e-9);
    }
}
