//! Per-ping processing: capture, render, count, and check whether to stop

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace};

use crate::capture::CaptureSink;
use crate::render::Renderer;
use crate::session::StopReason;
use crate::signal::ShutdownFlag;
use crate::source::PingHandler;
use crate::types::FrameLimit;
use crate::{Ping, Result, SonarError};

/// Count of valid pings fully processed by a session.
///
/// Only the pipeline increments it; any thread may read it.
#[derive(Debug, Clone, Default)]
pub struct FrameCounter(Arc<AtomicU64>);

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Messages handed to the pipeline
    pub received: u64,
    pub valid: u64,
    pub invalid: u64,
    pub bytes_captured: u64,
}

/// Turns decoded pings into captured bytes, rendered frames, and a frame count.
#[derive(Debug)]
pub struct PingPipeline<R: Renderer> {
    sink: Option<CaptureSink>,
    renderer: R,
    counter: FrameCounter,
    limit: FrameLimit,
    shutdown: ShutdownFlag,
    stats: PipelineStats,
    stop_reason: Option<StopReason>,
    error: Option<SonarError>,
}

impl<R: Renderer> PingPipeline<R> {
    pub fn new(
        sink: Option<CaptureSink>,
        renderer: R,
        counter: FrameCounter,
        limit: FrameLimit,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            sink,
            renderer,
            counter,
            limit,
            shutdown,
            stats: PipelineStats::default(),
            stop_reason: None,
            error: None,
        }
    }

    /// Process one ping.
    ///
    /// Invalid pings are dropped. A valid ping is captured, rendered and counted, in that
    /// order. `Break` means the session should stop.
    pub fn process(&mut self, ping: &Ping) -> Result<ControlFlow<StopReason>> {
        self.stats.received += 1;
        ping.log_summary();

        let Some(geometry) = ping.geometry() else {
            self.stats.invalid += 1;
            if let Some(reason) = ping.invalid_reason() {
                debug!(bytes = ping.size(), "Skipping invalid ping: {}", reason);
            }
            return Ok(self.stop_condition());
        };

        if let Some(sink) = self.sink.as_mut() {
            sink.write(ping.raw())?;
            self.stats.bytes_captured += ping.size() as u64;
        }

        self.renderer.render(geometry);

        self.stats.valid += 1;
        let frames = self.counter.increment();
        trace!(frames, ping_id = geometry.ping_id, "Processed ping");

        Ok(self.stop_condition())
    }

    fn stop_condition(&mut self) -> ControlFlow<StopReason> {
        let reason = if self.shutdown.is_triggered() {
            StopReason::Interrupted
        } else if self.limit.reached(self.counter.get()) {
            StopReason::FrameLimit
        } else {
            return ControlFlow::Continue(());
        };
        self.stop_reason.get_or_insert(reason);
        ControlFlow::Break(reason)
    }

    /// Close the capture sink, if any. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.close(),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn counter(&self) -> &FrameCounter {
        &self.counter
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn has_capture(&self) -> bool {
        self.sink.is_some()
    }

    /// Why the pipeline last asked to stop.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Error that made the live hook stop the source, if any.
    pub fn take_error(&mut self) -> Option<SonarError> {
        self.error.take()
    }
}

impl<R: Renderer> PingHandler for PingPipeline<R> {
    fn on_ping(&mut self, ping: &Ping) -> ControlFlow<StopReason> {
        match self.process(ping) {
            Ok(flow) => flow,
            Err(e) => {
                error!("Capture failed, stopping acquisition: {}", e);
                self.error = Some(e);
                self.stop_reason = Some(StopReason::CaptureFailed);
                ControlFlow::Break(StopReason::CaptureFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::format::MessageId;
    use crate::protocol::{SimplePingBuilder, build_message};
    use crate::render::SonarImage;
    use anyhow::Result;
    use proptest::collection::vec;
    use proptest::prelude::*;

    #[derive(Debug, Default)]
    struct CountingRenderer(u64);

    impl Renderer for CountingRenderer {
        fn render(&mut self, image: &dyn SonarImage) {
            assert!(image.n_bearings() > 0);
            self.0 += 1;
        }
    }

    fn valid_ping(id: u32) -> Ping {
        Ping::decode(SimplePingBuilder::new().ping_id(id).build())
    }

    fn invalid_ping() -> Ping {
        Ping::decode(build_message(MessageId::Dummy, &[1, 2, 3]))
    }

    fn pipeline(sink: Option<CaptureSink>, limit: FrameLimit) -> PingPipeline<CountingRenderer> {
        PingPipeline::new(
            sink,
            CountingRenderer::default(),
            FrameCounter::new(),
            limit,
            ShutdownFlag::new(),
        )
    }

    #[test]
    fn invalid_pings_are_not_counted_or_rendered() -> Result<()> {
        let mut pipeline = pipeline(None, FrameLimit::UNLIMITED);
        assert_eq!(pipeline.process(&invalid_ping())?, ControlFlow::Continue(()));
        assert_eq!(pipeline.process(&valid_ping(1))?, ControlFlow::Continue(()));

        assert_eq!(pipeline.counter().get(), 1);
        assert_eq!(pipeline.renderer().0, 1);
        assert_eq!(
            pipeline.stats(),
            PipelineStats { received: 2, valid: 1, invalid: 1, bytes_captured: 0 }
        );
        Ok(())
    }

    #[test]
    fn breaks_exactly_at_frame_limit() -> Result<()> {
        let mut pipeline = pipeline(None, FrameLimit::from_count(3));
        assert!(pipeline.process(&valid_ping(1))?.is_continue());
        assert!(pipeline.process(&invalid_ping())?.is_continue());
        assert!(pipeline.process(&valid_ping(2))?.is_continue());
        assert_eq!(pipeline.process(&valid_ping(3))?, ControlFlow::Break(StopReason::FrameLimit));
        assert_eq!(pipeline.counter().get(), 3);
        assert_eq!(pipeline.stop_reason(), Some(StopReason::FrameLimit));
        Ok(())
    }

    #[test]
    fn shutdown_flag_breaks_after_current_ping() -> Result<()> {
        let shutdown = ShutdownFlag::new();
        let mut pipeline = PingPipeline::new(
            None,
            CountingRenderer::default(),
            FrameCounter::new(),
            FrameLimit::UNLIMITED,
            shutdown.clone(),
        );

        shutdown.trigger();
        assert_eq!(pipeline.process(&valid_ping(1))?, ControlFlow::Break(StopReason::Interrupted));
        assert_eq!(pipeline.counter().get(), 1);
        Ok(())
    }

    #[test]
    fn capture_failure_stops_handler_and_keeps_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = CaptureSink::open(dir.path().join("out.oculus"))?;
        sink.close()?;

        let mut pipeline = pipeline(Some(sink), FrameLimit::UNLIMITED);
        assert_eq!(pipeline.on_ping(&valid_ping(1)), ControlFlow::Break(StopReason::CaptureFailed));
        assert_eq!(pipeline.counter().get(), 0);
        assert!(matches!(pipeline.take_error(), Some(SonarError::Capture { .. })));
        assert!(pipeline.take_error().is_none());
        Ok(())
    }

    #[test]
    fn deepest_ping_renders_within_frame_cap() -> Result<()> {
        use crate::render::{DEFAULT_MAX_SIZE, FanRenderer};

        let deep = Ping::decode(
            SimplePingBuilder::new().dimensions(u16::MAX, 2).aperture_deg(180.0).build(),
        );
        assert!(deep.valid());

        let mut pipeline = PingPipeline::new(
            None,
            FanRenderer::default(),
            FrameCounter::new(),
            FrameLimit::UNLIMITED,
            ShutdownFlag::new(),
        );
        assert!(pipeline.process(&deep)?.is_continue());

        let size = pipeline.renderer().latest().map(|f| f.size()).unwrap();
        assert!(size.width <= DEFAULT_MAX_SIZE.width);
        assert!(size.height <= DEFAULT_MAX_SIZE.height);
        assert_eq!(pipeline.counter().get(), 1);
        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = CaptureSink::open(dir.path().join("out.oculus"))?;
        let mut pipeline = pipeline(Some(sink), FrameLimit::UNLIMITED);
        assert!(pipeline.has_capture());
        pipeline.close()?;
        pipeline.close()?;
        Ok(())
    }

    proptest! {
        #[test]
        fn counter_counts_only_valid_pings(pattern in vec(any::<bool>(), 0..40)) {
            let mut pipeline = pipeline(None, FrameLimit::UNLIMITED);
            for (i, valid) in pattern.iter().enumerate() {
                let ping = if *valid { valid_ping(i as u32) } else { invalid_ping() };
                pipeline.process(&ping).unwrap();
            }
            let expected = pattern.iter().filter(|v| **v).count() as u64;
            prop_assert_eq!(pipeline.counter().get(), expected);
            prop_assert_eq!(pipeline.stats().invalid, pattern.len() as u64 - expected);
        }

        #[test]
        fn capture_is_concatenation_of_valid_pings(pattern in vec(any::<bool>(), 1..20)) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("capture.oculus");
            let sink = CaptureSink::open(&path).unwrap();
            let mut pipeline = pipeline(Some(sink), FrameLimit::UNLIMITED);

            let mut expected = Vec::new();
            for (i, valid) in pattern.iter().enumerate() {
                let ping = if *valid { valid_ping(i as u32) } else { invalid_ping() };
                if ping.valid() {
                    expected.extend_from_slice(ping.raw());
                }
                pipeline.process(&ping).unwrap();
            }
            pipeline.close().unwrap();

            prop_assert_eq!(std::fs::read(&path).unwrap(), expected.clone());
            prop_assert_eq!(pipeline.stats().bytes_captured, expected.len() as u64);
        }

        #[test]
        fn breaks_only_on_the_limit_reaching_ping(limit in 1u64..10, invalid_between in 0usize..3) {
            let mut pipeline = pipeline(None, FrameLimit::from_count(limit as i64));
            for i in 0..limit {
                let flow = pipeline.process(&valid_ping(i as u32)).unwrap();
                prop_assert_eq!(flow.is_break(), i + 1 == limit);
                if flow.is_continue() {
                    for _ in 0..invalid_between {
                        prop_assert!(pipeline.process(&invalid_ping()).unwrap().is_continue());
                    }
                }
            }
            prop_assert_eq!(pipeline.counter().get(), limit);
        }
    }
}
