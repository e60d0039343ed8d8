// SPDX-License-Identifier: Apache-2.0

//! Velodyne HDL-64 point stream decoder.
//!
//! This library decodes the raw UDP byte stream of a spinning multi-laser
//! rangefinder into calibrated, timestamped 3D laser returns.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐     ┌──────────────────────────────┐
//! │  PacketSource  │ ──► │  PointStream                 │
//! │ (UDP/pcap/test)│     │   FiringSequence (slot order)│
//! └────────────────┘     │   AngularVelocity (deg/s)    │
//!          │             │   azimuth/time interpolation │
//!     is_new_scan ──────►│   scan counter               │
//!                        └──────────────┬───────────────┘
//!                                       ▼
//!                        Calibration ─► LaserReturn
//! ```
//!
//! The stream buffers one packet at a time and walks its 384 firing slots in
//! hardware order. Each firing's timestamp and azimuth are reconstructed by
//! interpolation from the packet timestamp, the block rotation field and the
//! sensor's angular velocity, then corrected through the per-laser
//! calibration database.
//!
//! # Modules
//!
//! - [`packet`]: binary packet layout and bounds-checked field access
//! - [`firing`]: firing slot traversal order (modern paired / legacy)
//! - [`timing`]: timestamp interpolation and angular velocity estimation
//! - [`scan`]: revolution boundary detection
//! - [`calibration`]: per-laser correction database
//! - [`point`]: calibrated laser return records
//! - [`stream`]: the pull-based [`PointStream`] state machine
//! - [`source`]: packet source abstraction (UDP, test)
//! - [`pcap_source`]: pcap capture replay (with the `pcap` feature)
//!
//! # Example
//!
//! ```ignore
//! use velostream::{Calibration, PointStream, StreamOptions, UdpSource};
//!
//! let source = UdpSource::bind("0.0.0.0:2368")?;
//! let mut stream = PointStream::new(source, Calibration::nominal(), StreamOptions::default());
//!
//! while let Some(point) = stream.read()? {
//!     if stream.scan() > 10 { break; }
//!     println!("{} {} {}", point.x, point.y, point.z);
//! }
//! ```

pub mod calibration;
pub mod common;
pub mod firing;
pub mod packet;
#[cfg(feature = "pcap")]
pub mod pcap_source;
pub mod point;
pub mod scan;
pub mod source;
pub mod stream;
pub mod timing;

// Re-exports for convenience
pub use calibration::Calibration;
pub use common::Error;
pub use packet::{PACKET_SIZE, PacketLayout};
#[cfg(feature = "pcap")]
pub use pcap_source::PcapSource;
pub use point::LaserReturn;
pub use source::{PacketSource, SourceHandle, TestSource, UdpSource};
pub use stream::{PointStream, StreamOptions};
