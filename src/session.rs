//! Session controller
//!
//! A [`Session`] owns one acquisition from start to teardown:
//!
//! ```text
//! Idle ─start()─▶ Starting ──▶ Running ─stop()─▶ Stopping ──▶ Stopped
//!                    │                                          ▲
//!                    └─────────────── start failed ─────────────┘
//! ```
//!
//! `Stopped` is terminal; a new run needs a new session. Teardown (stop the source, join
//! its thread, close the capture sink) happens on every path out of `Running`, including
//! errors and drop.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::capture::CaptureSink;
use crate::net::SonarConfiguration;
use crate::pipeline::{FrameCounter, PingPipeline, PipelineStats};
use crate::render::Renderer;
use crate::signal::ProcessControl;
use crate::source::{PingSource, StopHandle};
use crate::sources::{LiveSource, ReplaySource};
use crate::types::{FrameLimit, SonarAddress};
use crate::{Result, SonarError};

/// Statistics reporting interval used unless configured otherwise.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Starting)
                | (Idle, Stopped)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMode {
    Live,
    Replay,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Live => f.write_str("live"),
            SessionMode::Replay => f.write_str("replay"),
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The configured number of frames was processed
    FrameLimit,
    /// An interrupt or programmatic shutdown was requested
    Interrupted,
    /// The replay file was exhausted
    EndOfStream,
    /// Writing to the capture file failed
    CaptureFailed,
    /// The acquisition thread exited on its own
    SourceExited,
    /// `stop()` was called with no other trigger
    Requested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::FrameLimit => "frame limit reached",
            StopReason::Interrupted => "interrupted",
            StopReason::EndOfStream => "end of stream",
            StopReason::CaptureFailed => "capture failed",
            StopReason::SourceExited => "source exited",
            StopReason::Requested => "stop requested",
        };
        f.write_str(s)
    }
}

/// Where pings come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    Live { address: SonarAddress, sonar: SonarConfiguration },
    Replay { path: PathBuf },
}

/// Everything needed to build a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub source: SourceConfig,
    /// Raw capture of every valid ping
    pub capture: Option<PathBuf>,
    pub frame_limit: FrameLimit,
    /// Live statistics reporting period
    pub report_interval: Duration,
}

impl SessionConfig {
    pub fn live(address: SonarAddress, sonar: SonarConfiguration) -> Self {
        Self::new(SourceConfig::Live { address, sonar })
    }

    pub fn replay(path: impl Into<PathBuf>) -> Self {
        Self::new(SourceConfig::Replay { path: path.into() })
    }

    fn new(source: SourceConfig) -> Self {
        Self {
            source,
            capture: None,
            frame_limit: FrameLimit::UNLIMITED,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    pub fn with_capture(mut self, path: impl Into<PathBuf>) -> Self {
        self.capture = Some(path.into());
        self
    }

    pub fn with_frame_limit(mut self, limit: FrameLimit) -> Self {
        self.frame_limit = limit;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn mode(&self) -> SessionMode {
        match self.source {
            SourceConfig::Live { .. } => SessionMode::Live,
            SourceConfig::Replay { .. } => SessionMode::Replay,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.report_interval.is_zero() {
            return Err(SonarError::invalid_config("report interval must be positive"));
        }

        match &self.source {
            SourceConfig::Live { sonar, .. } => sonar.validate()?,
            SourceConfig::Replay { path } => {
                if path.as_os_str().is_empty() {
                    return Err(SonarError::invalid_config("replay path is empty"));
                }
                if self.capture.as_ref() == Some(path) {
                    return Err(SonarError::invalid_config(format!(
                        "capture file {} is also the replay input",
                        path.display()
                    )));
                }
            }
        }

        if self.capture.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(SonarError::invalid_config("capture path is empty"));
        }
        Ok(())
    }
}

/// Final counters of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub mode: SessionMode,
    /// Valid pings processed
    pub frames: u64,
    pub stats: PipelineStats,
    pub reason: Option<StopReason>,
    pub elapsed: Duration,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sonar packets decoded", self.frames)
    }
}

/// One acquisition run.
pub struct Session<R: Renderer> {
    config: SessionConfig,
    control: ProcessControl,
    counter: FrameCounter,
    state: SessionState,
    renderer: Option<R>,
    source: Option<PingSource<PingPipeline<R>>>,
    /// Replay keeps the pipeline here while running; both modes keep it here after teardown.
    pipeline: Option<PingPipeline<R>>,
    reason: Option<StopReason>,
    started_at: Option<Instant>,
    summary: Option<SessionSummary>,
}

impl<R: Renderer> fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.config.mode())
            .field("state", &self.state)
            .field("frames", &self.counter.get())
            .field("reason", &self.reason)
            .finish()
    }
}

impl<R: Renderer> Session<R> {
    pub fn new(config: SessionConfig, renderer: R, control: ProcessControl) -> Self {
        Self {
            config,
            control,
            counter: FrameCounter::new(),
            state: SessionState::Idle,
            renderer: Some(renderer),
            source: None,
            pipeline: None,
            reason: None,
            started_at: None,
            summary: None,
        }
    }

    fn transition(&mut self, to: SessionState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(SonarError::InvalidState { from: self.state, to });
        }
        debug!("Session {:?} -> {:?}", self.state, to);
        self.state = to;
        Ok(())
    }

    /// Validate, open the capture sink, build the source and begin acquisition.
    ///
    /// On failure everything acquired so far is released and the session ends up `Stopped`.
    pub fn start(&mut self) -> Result<()> {
        self.transition(SessionState::Starting)?;

        match self.try_start() {
            Ok(()) => {
                self.started_at = Some(Instant::now());
                self.transition(SessionState::Running)?;
                info!(
                    mode = %self.config.mode(),
                    limit = %self.config.frame_limit,
                    "Session running"
                );
                Ok(())
            }
            Err(e) => {
                warn!("Session failed to start: {}", e);
                self.control.active.clear();
                if let Some(source) = self.source.take() {
                    source.stop();
                }
                if let Some(mut pipeline) = self.pipeline.take() {
                    pipeline.close().ok();
                }
                self.transition(SessionState::Stopped)?;
                Err(e)
            }
        }
    }

    fn try_start(&mut self) -> Result<()> {
        self.config.validate()?;

        let sink = self.config.capture.as_ref().map(CaptureSink::open).transpose()?;
        if let Some(sink) = &sink {
            info!("Capturing to {}", sink.path().display());
        }

        let renderer = self
            .renderer
            .take()
            .ok_or_else(|| SonarError::Thread { reason: "renderer already consumed".to_string() })?;
        let mut pipeline = PingPipeline::new(
            sink,
            renderer,
            self.counter.clone(),
            self.config.frame_limit,
            self.control.shutdown.clone(),
        );

        match &self.config.source {
            SourceConfig::Live { address, sonar } => {
                let mut live = LiveSource::new(*address, *sonar, pipeline);
                self.control.active.set(live.stop_handle());
                live.start()?;
                self.source = Some(PingSource::Live(live));
            }
            SourceConfig::Replay { path } => {
                let replay = match ReplaySource::open(path) {
                    Ok(replay) => replay,
                    Err(e) => {
                        pipeline.close().ok();
                        return Err(e);
                    }
                };
                self.control.active.set(replay.stop_handle());
                self.source = Some(PingSource::Replay(replay));
                self.pipeline = Some(pipeline);
            }
        }
        Ok(())
    }

    /// Pull and process pings until end of stream or a stop trigger.
    ///
    /// Only valid for a running replay session. The session stays `Running`; call
    /// [`stop`](Self::stop) afterwards.
    pub fn drive_replay(&mut self) -> Result<StopReason> {
        if self.state != SessionState::Running {
            return Err(SonarError::InvalidState { from: self.state, to: SessionState::Running });
        }
        let (Some(PingSource::Replay(replay)), Some(pipeline)) =
            (self.source.as_mut(), self.pipeline.as_mut())
        else {
            return Err(SonarError::invalid_config("drive_replay called on a live session"));
        };

        let reason = loop {
            if self.control.is_interrupted() {
                break StopReason::Interrupted;
            }
            let Some(ping) = replay.next()? else {
                break if self.control.is_interrupted() {
                    StopReason::Interrupted
                } else if replay.stop_handle().is_stopped() {
                    StopReason::Requested
                } else {
                    StopReason::EndOfStream
                };
            };
            if let std::ops::ControlFlow::Break(reason) = pipeline.process(&ping)? {
                break reason;
            }
        };

        debug!(%reason, frames = self.counter.get(), "Replay finished");
        self.reason = Some(reason);
        Ok(reason)
    }

    /// Whether the session should be torn down now, and why.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if let Some(reason) = self.reason {
            return Some(reason);
        }
        if self.control.is_interrupted() {
            return Some(StopReason::Interrupted);
        }
        if self.config.frame_limit.reached(self.counter.get()) {
            return Some(StopReason::FrameLimit);
        }
        match &self.source {
            Some(PingSource::Replay(replay)) if replay.is_finished() => {
                Some(StopReason::EndOfStream)
            }
            Some(PingSource::Live(live)) if live.is_started() && live.is_finished() => {
                Some(StopReason::SourceExited)
            }
            _ => None,
        }
    }

    pub fn should_stop(&self) -> bool {
        self.stop_reason().is_some()
    }

    /// Stop the source, join it, close the capture sink, and report.
    ///
    /// Idempotent: once stopped, further calls return the same summary.
    pub fn stop(&mut self) -> Result<SessionSummary> {
        match self.state {
            SessionState::Stopped => {
                if let Some(summary) = &self.summary {
                    return Ok(summary.clone());
                }
                let summary = self.make_summary();
                self.summary = Some(summary.clone());
                return Ok(summary);
            }
            SessionState::Idle => {
                self.transition(SessionState::Stopped)?;
                let summary = self.make_summary();
                self.summary = Some(summary.clone());
                return Ok(summary);
            }
            _ => {}
        }

        let trigger = self.stop_reason();
        self.transition(SessionState::Stopping)?;
        self.control.active.clear();

        let mut first_error: Option<SonarError> = None;
        match self.source.take() {
            Some(PingSource::Live(mut live)) => {
                live.stop();
                match live.join() {
                    Ok(pipeline) => self.pipeline = Some(pipeline),
                    Err(e) => first_error = Some(e),
                }
            }
            Some(PingSource::Replay(replay)) => replay.stop_handle().stop(),
            None => {}
        }

        if let Some(pipeline) = self.pipeline.as_mut() {
            if let Some(e) = pipeline.take_error() {
                first_error.get_or_insert(e);
            }
            if let Err(e) = pipeline.close() {
                first_error.get_or_insert(e);
            }
            if self.reason.is_none() {
                self.reason = pipeline.stop_reason();
            }
        }
        self.reason = self.reason.or(trigger).or(Some(StopReason::Requested));

        self.transition(SessionState::Stopped)?;
        let summary = self.make_summary();
        info!(
            frames = summary.frames,
            invalid = summary.stats.invalid,
            bytes_captured = summary.stats.bytes_captured,
            reason = ?summary.reason,
            "Session stopped after {:.1}s",
            summary.elapsed.as_secs_f64()
        );
        self.summary = Some(summary.clone());

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    fn make_summary(&self) -> SessionSummary {
        SessionSummary {
            mode: self.config.mode(),
            frames: self.counter.get(),
            stats: self.pipeline.as_ref().map(PingPipeline::stats).unwrap_or_default(),
            reason: self.reason,
            elapsed: self.started_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }

    /// Valid pings processed so far.
    pub fn frames(&self) -> u64 {
        self.counter.get()
    }

    pub fn counter(&self) -> &FrameCounter {
        &self.counter
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> SessionMode {
        self.config.mode()
    }

    pub fn control(&self) -> &ProcessControl {
        &self.control
    }

    /// Handle that stops the running source, if there is one.
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.source.as_ref().map(PingSource::stop_handle)
    }

    /// Renderer, available before start and after teardown.
    pub fn renderer(&self) -> Option<&R> {
        self.renderer.as_ref().or_else(|| self.pipeline.as_ref().map(PingPipeline::renderer))
    }
}

impl<R: Renderer> Drop for Session<R> {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Running) {
            if let Err(e) = self.stop() {
                warn!("Error stopping session on drop: {}", e);
            }
        }
    }
}
