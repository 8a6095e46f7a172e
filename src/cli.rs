//! Command-line interface.
//!
//! A replay input (`-i`) switches the whole run to replay mode; otherwise the positional
//! address (or `auto`) selects the live sonar.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::net::SonarConfiguration;
use crate::session::SessionConfig;
use crate::types::{FrameLimit, PingRate, SonarAddress};
use crate::{Result, SonarError};

/// Default statistics reporting interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Acquire, display, record and replay imaging sonar pings.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "sonarlink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Sonar IP address, ip:port, or "auto" to listen for status broadcasts.
    #[arg(default_value = "auto")]
    pub ip: SonarAddress,

    /// Write the raw bytes of every valid ping to this file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replay pings from a capture file instead of a live sonar.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Stop after this many valid pings (zero or negative: run until interrupted).
    #[arg(short = 'n', long = "frames", default_value_t = -1, allow_negative_numbers = true)]
    pub frames: i64,

    /// Ping rate: normal, high, highest, low, lowest or standby.
    #[arg(long, default_value_t = PingRate::Normal)]
    pub ping_rate: PingRate,

    /// Range in metres.
    #[arg(long, default_value_t = 20.0)]
    pub range: f64,

    /// Gain in percent.
    #[arg(long, default_value_t = 50.0)]
    pub gain: f64,

    /// Ping rate reporting interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Do not open a window; pings are still rendered for --snapshot.
    #[arg(long)]
    pub no_window: bool,

    /// Save the last rendered frame to this file (binary PPM) on exit.
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,
}

impl Cli {
    /// Build the session configuration these arguments describe.
    pub fn session_config(&self) -> Result<SessionConfig> {
        if self.interval_ms == 0 {
            return Err(SonarError::invalid_config("--interval-ms must be at least 1"));
        }

        let mut config = match &self.input {
            Some(path) => SessionConfig::replay(path.clone()),
            None => {
                let sonar = SonarConfiguration::default()
                    .with_ping_rate(self.ping_rate)
                    .with_range(self.range)
                    .with_gain(self.gain);
                SessionConfig::live(self.ip, sonar)
            }
        }
        .with_frame_limit(FrameLimit::from_count(self.frames))
        .with_report_interval(Duration::from_millis(self.interval_ms));

        if let Some(output) = &self.output {
            config = config.with_capture(output.clone());
        }

        config.validate()?;
        Ok(config)
    }
}
