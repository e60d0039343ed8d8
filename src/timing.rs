// SPDX-License-Identifier: Apache-2.0

//! Per-firing timestamp interpolation and angular velocity estimation.
//!
//! All 32 lasers of a block share one reported rotation value even though
//! they fire at slightly different instants while the head keeps spinning.
//! Each slot therefore gets a fixed intra-packet time offset from the firing
//! schedule, and its azimuth is corrected by the elapsed time multiplied by
//! the angular velocity.
//!
//! The firing schedule is layout-dependent. Modern firmware fires both
//! blocks of a pair in one shared window of 32 firings at 1.152 us each
//! followed by a 9.216 us recharge, 46.08 us per pair and 276.48 us per
//! packet. Legacy firmware fires banks sequentially, one 46.08 us window
//! per block, so offsets grow with the sequential traversal.

use crate::packet::{PacketLayout, PacketView, ROTATION_MAX};
use tracing::warn;

/// Time between consecutive laser firings within a firing window (us)
pub const FIRING_INTERVAL_US: f64 = 1.152;

/// Idle time after the 32 firings of a window (us)
pub const RECHARGE_US: f64 = 9.216;

/// Duration of one firing window (us)
pub const WINDOW_DURATION_US: f64 = 32.0 * FIRING_INTERVAL_US + RECHARGE_US;

/// Nominal time between block 0 and block 11 firing starts for modern
/// firmware (us); legacy spacing comes from [`block_span_us`].
pub const BLOCK_SPAN_US: f64 = 5.0 * WINDOW_DURATION_US;

/// Default spin rate assumed before the first packet in auto mode
const DEFAULT_RPM: f64 = 600.0;

/// Intra-packet time offset of a firing slot, microseconds from packet start.
///
/// Static lookup determined by the firing schedule. With the modern layout
/// paired blocks share a window, so they yield equal offsets per laser; with
/// the legacy layout each block owns its own window.
pub fn time_offset_us(layout: PacketLayout, block: usize, laser: usize) -> f64 {
    let window = match layout {
        PacketLayout::Modern => block / 2,
        PacketLayout::Legacy => block,
    };
    window as f64 * WINDOW_DURATION_US + laser as f64 * FIRING_INTERVAL_US
}

/// Nominal time between block 0 and block 11 firing starts (us).
pub fn block_span_us(layout: PacketLayout) -> f64 {
    time_offset_us(layout, 11, 0) - time_offset_us(layout, 0, 0)
}

/// Absolute timestamp of a firing slot in nanoseconds.
pub fn slot_timestamp(
    packet_timestamp_ns: u64,
    layout: PacketLayout,
    block: usize,
    laser: usize,
) -> u64 {
    packet_timestamp_ns + (time_offset_us(layout, block, laser) * 1_000.0) as u64
}

/// Azimuth of a firing slot in degrees, wrapped into [0, 360).
///
/// The block rotation is corrected by the rotation accumulated since the
/// start of the block's firing window.
pub fn interpolate_azimuth(rotation_centideg: u16, laser: usize, angular_speed_dps: f64) -> f64 {
    let elapsed_s = laser as f64 * FIRING_INTERVAL_US * 1e-6;
    wrap_degrees(rotation_centideg as f64 / 100.0 + angular_speed_dps * elapsed_s)
}

pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg % 360.0;
    if wrapped < 0.0 { wrapped + 360.0 } else { wrapped }
}

/// Rotational speed of the sensor head in degrees per second.
///
/// Either fixed from a configured RPM, or re-estimated per packet from the
/// rotation delta between the first and last block over their fixed nominal
/// firing gap.
#[derive(Clone, Debug)]
pub enum AngularVelocity {
    Fixed(f64),
    Auto { last: f64 },
}

impl AngularVelocity {
    /// Constant speed from a configured spin rate.
    pub fn fixed(rpm: u32) -> Self {
        AngularVelocity::Fixed(rpm as f64 * 6.0)
    }

    /// Self-estimating mode; assumes 600 rpm until the first packet.
    pub fn auto() -> Self {
        AngularVelocity::Auto {
            last: DEFAULT_RPM * 6.0,
        }
    }

    pub fn degrees_per_second(&self) -> f64 {
        match self {
            AngularVelocity::Fixed(dps) => *dps,
            AngularVelocity::Auto { last } => *last,
        }
    }

    /// Re-estimate from a new packet. No-op in fixed mode.
    ///
    /// Rotation delta is block 0 minus block 11 with +36000 wraparound
    /// correction when non-positive; the time base is the layout's fixed
    /// block 0 to block 11 nominal gap, so no divide-by-zero can occur. A
    /// non-finite estimate keeps the previous value rather than poisoning
    /// azimuths.
    pub fn update(&mut self, packet: &PacketView, layout: PacketLayout) {
        let last = match self {
            AngularVelocity::Fixed(_) => return,
            AngularVelocity::Auto { last } => last,
        };

        let mut delta = packet.rotation(0) as i32 - packet.rotation(11) as i32;
        if delta <= 0 {
            delta += ROTATION_MAX as i32;
        }
        let degrees = delta as f64 / 100.0;
        let estimate = degrees / (block_span_us(layout) * 1e-6);
        if estimate.is_finite() && estimate > 0.0 {
            *last = estimate;
        } else {
            warn!(estimate, "degenerate angular velocity estimate, keeping previous");
        }
    }
}
