//! Ping source abstraction shared by the live and replay variants
//!
//! A live source pushes pings into a [`PingHandler`] from its own thread; a replay
//! source is pulled by the caller. Both can be told to stop through a [`StopHandle`].

use std::ops::ControlFlow;
use tokio_util::sync::CancellationToken;

use crate::Ping;
use crate::session::{SessionMode, StopReason};
use crate::sources::{LiveSource, ReplaySource};

/// Per-ping callback invoked by a live source on its acquisition thread.
///
/// Calls never overlap: the acquisition thread waits for each one to return before
/// reading the next message.
pub trait PingHandler: Send + 'static {
    /// Handle one decoded message, valid or not.
    ///
    /// Returning `Break` asks the source to stop after this ping.
    fn on_ping(&mut self, ping: &Ping) -> ControlFlow<StopReason>;
}

impl<F> PingHandler for F
where
    F: FnMut(&Ping) -> ControlFlow<StopReason> + Send + 'static,
{
    fn on_ping(&mut self, ping: &Ping) -> ControlFlow<StopReason> {
        self(ping)
    }
}

/// Cloneable request to stop a source. Safe to use from any thread, any number of times.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// The source a session is driving.
#[derive(Debug)]
pub enum PingSource<H: PingHandler> {
    Live(LiveSource<H>),
    Replay(ReplaySource),
}

impl<H: PingHandler> PingSource<H> {
    pub fn mode(&self) -> SessionMode {
        match self {
            PingSource::Live(_) => SessionMode::Live,
            PingSource::Replay(_) => SessionMode::Replay,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        match self {
            PingSource::Live(source) => source.stop_handle(),
            PingSource::Replay(source) => source.stop_handle(),
        }
    }

    /// Live: the acquisition thread has exited. Replay: end of file reached or stopped.
    pub fn is_finished(&self) -> bool {
        match self {
            PingSource::Live(source) => source.is_finished(),
            PingSource::Replay(source) => source.is_finished(),
        }
    }

    pub fn stop(&self) {
        self.stop_handle().stop();
    }
}
