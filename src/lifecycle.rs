//! Running a session from start to teardown
//!
//! Live sessions are watched from the calling thread, which wakes once per report
//! interval, logs the ping rate, and checks whether the session should stop. Replay
//! sessions are driven directly by the calling thread until the file or the frame
//! limit runs out.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::pipeline::FrameCounter;
use crate::render::Renderer;
use crate::session::{Session, SessionMode, SessionSummary, StopReason};
use crate::sleeper::Sleeper;
use crate::{Result, SonarError};

/// Ping rate over one reporting interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    /// Frame counter at the end of the interval
    pub total: u64,
    /// Frames processed during the interval
    pub delta: u64,
    pub hz: f64,
}

/// Turns successive frame counter reads into rates.
#[derive(Debug, Clone)]
pub struct RateReporter {
    last_total: u64,
}

impl RateReporter {
    pub fn new(start: u64) -> Self {
        Self { last_total: start }
    }

    pub fn sample(&mut self, total: u64, elapsed: Duration) -> RateSample {
        let delta = total.saturating_sub(self.last_total);
        self.last_total = total;
        let secs = elapsed.as_secs_f64();
        let hz = if secs > 0.0 { delta as f64 / secs } else { 0.0 };
        RateSample { total, delta, hz }
    }
}

/// Start `session`, run it to completion, and tear it down.
///
/// Teardown happens even when driving fails; the drive error is reported in preference
/// to a teardown error.
pub fn run<R: Renderer>(session: &mut Session<R>, sleeper: &dyn Sleeper) -> Result<SessionSummary> {
    session.start()?;

    let driven = match session.mode() {
        SessionMode::Live => watch_live(session, sleeper),
        SessionMode::Replay => session.drive_replay(),
    };
    let stopped = session.stop();

    let summary = match (driven, stopped) {
        (Err(e), _) => return Err(e),
        (Ok(_), Err(e)) => return Err(e),
        (Ok(_), Ok(summary)) => summary,
    };

    info!("{}", summary);
    Ok(summary)
}

/// Report the ping rate every interval until the session should stop.
fn watch_live<R: Renderer>(session: &Session<R>, sleeper: &dyn Sleeper) -> Result<StopReason> {
    let interval = session.config().report_interval;
    if interval.is_zero() {
        return Err(SonarError::invalid_config("report interval must be positive"));
    }

    let counter: &FrameCounter = session.counter();
    let mut reporter = RateReporter::new(counter.get());
    let mut last = Instant::now();

    loop {
        if let Some(reason) = session.stop_reason() {
            debug!(%reason, "Live session stopping");
            return Ok(reason);
        }

        sleeper.sleep(interval);

        let now = Instant::now();
        let sample = reporter.sample(counter.get(), now.duration_since(last));
        last = now;
        info!(frames = sample.total, new = sample.delta, rate_hz = sample.hz, "Ping rate");
    }
}
