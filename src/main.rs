// SPDX-License-Identifier: Apache-2.0

//! Decode a lidar packet stream to CSV.
//!
//! The target is either a pcap capture file (replayed with its recorded
//! timestamps) or a UDP listen address for live operation. Decoded returns
//! are written to stdout, one CSV row per point.

use clap::Parser;
use std::io::Write as _;
use std::path::Path;
use tracing::{debug, info, level_filters::LevelFilter};
use velostream::{
    Calibration, Error, PacketLayout, PacketSource, PointStream, StreamOptions, UdpSource,
    point::LaserReturn,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pcap capture file to replay, or a UDP listen address
    /// (e.g. 0.0.0.0:2368) for live capture.
    #[arg(env)]
    target: String,

    /// Sensor spin rate in revolutions per minute. When omitted, angular
    /// velocity is estimated per packet from the rotation fields.
    #[arg(long, env)]
    rpm: Option<u32>,

    /// Decode with the legacy firmware firing order and distance scale.
    #[arg(long, env)]
    legacy: bool,

    /// Emit no-echo returns (range 0), flagged invalid, instead of
    /// filtering them out.
    #[arg(long, env)]
    output_invalid: bool,

    /// Per-laser calibration database (JSON). Nominal angles when omitted.
    #[arg(long, env)]
    calibration: Option<String>,

    /// UDP port filter applied to pcap captures.
    #[arg(long, env, default_value = "2368")]
    port: u16,

    /// Stop after this many complete scans.
    #[arg(long, env)]
    scans: Option<u32>,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    rust_log: LevelFilter,
}

fn open_source(args: &Args) -> Result<Box<dyn PacketSource>, Error> {
    if Path::new(&args.target).is_file() {
        #[cfg(feature = "pcap")]
        {
            info!(path = %args.target, "replaying pcap capture");
            let source = velostream::PcapSource::from_file(&args.target, Some(args.port))?;
            debug!(packets = source.len(), "capture loaded");
            return Ok(Box::new(source));
        }
        #[cfg(not(feature = "pcap"))]
        return Err(Error::Config(
            "pcap replay requires the `pcap` feature".to_string(),
        ));
    }

    info!(addr = %args.target, "listening for live packets");
    Ok(Box::new(UdpSource::bind(&*args.target)?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.rust_log)
        .with_writer(std::io::stderr)
        .init();

    let calibration = match &args.calibration {
        Some(path) => Calibration::from_json_file(path)?,
        None => Calibration::nominal(),
    };

    let options = StreamOptions {
        rpm: args.rpm,
        output_invalid: args.output_invalid,
        layout: if args.legacy {
            PacketLayout::Legacy
        } else {
            PacketLayout::Modern
        },
    };

    let source = open_source(&args)?;
    let mut stream = PointStream::new(source, calibration, options);

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    writeln!(out, "{}", LaserReturn::csv_header())?;

    let mut points = 0u64;
    while let Some(point) = stream.read()? {
        if let Some(limit) = args.scans {
            if stream.scan() >= limit {
                break;
            }
        }
        writeln!(out, "{}", point.to_csv_string())?;
        points += 1;
    }
    out.flush()?;

    info!(points, scans = stream.scan(), "stream finished");
    Ok(())
}
