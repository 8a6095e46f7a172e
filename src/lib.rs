//! Acquisition and visualization session controller for streaming imaging sonars.
//!
//! sonarlink pulls pings either from a live sonar over the network or from a capture
//! file, renders each valid ping as a fan image, optionally mirrors the raw bytes to a
//! capture file, and stops on a frame limit, an interrupt, or the end of the file.
//!
//! # Features
//!
//! - **Live acquisition**: background thread with auto-discovery, keep-alive and reconnect
//! - **Replay**: synchronous, caller-driven reading of capture files
//! - **Capture**: byte-exact recording of valid pings, replayable as-is
//! - **Display**: a window showing the latest fan image (`gui` feature), or a PPM snapshot
//! - **Controlled shutdown**: frame limits and interrupts tear the session down cleanly
//!
//! ## Example (replay)
//!
//! ```rust,no_run
//! use sonarlink::{FanRenderer, Sonar};
//!
//! fn main() -> sonarlink::Result<()> {
//!     let mut session = Sonar::open("dive.oculus", FanRenderer::default())?;
//!     session.drive_replay()?;
//!     let summary = session.stop()?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

mod error;
pub mod types;

pub mod capture;
pub mod net;
pub mod protocol;
pub mod render;

pub mod pipeline;
pub mod session;
pub mod source;
pub mod sources;

pub mod cli;
pub mod lifecycle;
pub mod logging;
pub mod signal;
pub mod sleeper;
#[cfg(feature = "gui")]
pub mod viewer;

pub use error::*;
pub use types::*;

pub use capture::{CaptureReader, CaptureSink};
pub use net::SonarConfiguration;
pub use pipeline::{FrameCounter, PingPipeline, PipelineStats};
pub use render::{FanRenderer, LatestFrame, PublishingRenderer, Renderer, SonarImage};
pub use session::{
    Session, SessionConfig, SessionMode, SessionState, SessionSummary, SourceConfig, StopReason,
};
pub use signal::ProcessControl;
pub use source::{PingHandler, PingSource, StopHandle};
pub use sources::{LiveSource, ReplaySource};

use std::path::Path;

/// Shortcut for starting sessions with their own [`ProcessControl`].
///
/// # Examples
///
/// ## Live sonar
/// ```rust,no_run
/// use sonarlink::{FanRenderer, Sonar, SonarAddress, SonarConfiguration};
///
/// fn main() -> sonarlink::Result<()> {
///     let sonar = SonarConfiguration::default();
///     let mut session = Sonar::connect(SonarAddress::Auto, sonar, FanRenderer::default())?;
///     std::thread::sleep(std::time::Duration::from_secs(5));
///     println!("{}", session.stop()?);
///     Ok(())
/// }
/// ```
pub struct Sonar;

impl Sonar {
    /// Start a live session.
    ///
    /// Succeeds even if no sonar is reachable yet; the session simply sees no pings until one is.
    pub fn connect<R: Renderer>(
        address: SonarAddress,
        config: SonarConfiguration,
        renderer: R,
    ) -> Result<Session<R>> {
        let config = SessionConfig::live(address, config);
        let mut session = Session::new(config, renderer, ProcessControl::new());
        session.start()?;
        Ok(session)
    }

    /// Start a replay session over a capture file.
    pub fn open<R: Renderer, P: AsRef<Path>>(path: P, renderer: R) -> Result<Session<R>> {
        let config = SessionConfig::replay(path.as_ref().to_path_buf());
        let mut session = Session::new(config, renderer, ProcessControl::new());
        session.start()?;
        Ok(session)
    }
}
