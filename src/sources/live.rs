//! Live source: network acquisition on a background thread

use std::ops::ControlFlow;
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::net::{RECONNECT_DELAY, SonarClient, SonarConfiguration};
use crate::source::{PingHandler, StopHandle};
use crate::types::SonarAddress;
use crate::{Ping, Result, SonarError};

const THREAD_NAME: &str = "sonar-acquisition";

/// Network-backed source that calls a [`PingHandler`] for every decoded message.
///
/// Construction does no I/O. [`start`](Self::start) spawns the acquisition thread, which
/// keeps (re)connecting until stopped. Being unable to reach the sonar is not an error
/// here; the source just delivers nothing.
pub struct LiveSource<H: PingHandler> {
    client: SonarClient,
    stop: StopHandle,
    state: LiveState<H>,
}

enum LiveState<H> {
    Ready(H),
    Running(JoinHandle<H>),
    Joined,
}

impl<H: PingHandler> std::fmt::Debug for LiveSource<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            LiveState::Ready(_) => "ready",
            LiveState::Running(_) => "running",
            LiveState::Joined => "joined",
        };
        f.debug_struct("LiveSource")
            .field("address", &self.client.address())
            .field("state", &state)
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}

impl<H: PingHandler> LiveSource<H> {
    pub fn new(address: SonarAddress, config: SonarConfiguration, handler: H) -> Self {
        Self {
            client: SonarClient::new(address, config),
            stop: StopHandle::new(),
            state: LiveState::Ready(handler),
        }
    }

    /// Spawn the acquisition thread.
    pub fn start(&mut self) -> Result<()> {
        let handler = match std::mem::replace(&mut self.state, LiveState::Joined) {
            LiveState::Ready(handler) => handler,
            other => {
                self.state = other;
                return Err(SonarError::Thread {
                    reason: "live source already started".to_string(),
                });
            }
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SonarError::Thread {
                reason: format!("cannot build acquisition runtime: {}", e),
            })?;

        let client = self.client.clone();
        let cancel = self.stop.token().clone();

        let handle = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(acquisition_loop(client, handler, cancel)))
            .map_err(|e| SonarError::Thread {
                reason: format!("cannot spawn acquisition thread: {}", e),
            })?;

        info!("Live source started for {}", self.client.address());
        self.state = LiveState::Running(handle);
        Ok(())
    }

    /// Ask the acquisition thread to stop. Idempotent and callable from any thread.
    pub fn stop(&self) {
        if !self.stop.is_stopped() {
            debug!("Stopping live source");
        }
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_started(&self) -> bool {
        !matches!(self.state, LiveState::Ready(_))
    }

    /// True once the acquisition thread has exited (or was never started).
    pub fn is_finished(&self) -> bool {
        match &self.state {
            LiveState::Running(handle) => handle.is_finished(),
            LiveState::Ready(_) | LiveState::Joined => true,
        }
    }

    /// Block until the acquisition thread exits and hand the handler back.
    ///
    /// Call [`stop`](Self::stop) first; this does not stop the source by itself. Joining a
    /// source that was never started returns its handler immediately.
    pub fn join(&mut self) -> Result<H> {
        match std::mem::replace(&mut self.state, LiveState::Joined) {
            LiveState::Ready(handler) => Ok(handler),
            LiveState::Running(handle) => {
                let handler = handle.join().map_err(|_| SonarError::Thread {
                    reason: "acquisition thread panicked".to_string(),
                })?;
                debug!("Live source joined");
                Ok(handler)
            }
            LiveState::Joined => {
                Err(SonarError::Thread { reason: "live source already joined".to_string() })
            }
        }
    }
}

impl<H: PingHandler> Drop for LiveSource<H> {
    fn drop(&mut self) {
        if let LiveState::Running(_) = self.state {
            self.stop.stop();
            if let Err(e) = self.join() {
                warn!("Error joining live source on drop: {}", e);
            }
        }
    }
}

/// Connect, read, and hand pings to `handler` until cancelled.
async fn acquisition_loop<H: PingHandler>(
    client: SonarClient,
    mut handler: H,
    cancel: CancellationToken,
) -> H {
    info!("Acquisition loop started");
    let mut messages = 0u64;

    'session: loop {
        if cancel.is_cancelled() {
            break;
        }

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = client.connect() => result,
        };

        let mut connection = match connected {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Sonar not reachable: {}", e);
                if reconnect_delay(&cancel).await {
                    break;
                }
                continue;
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'session,
                next = connection.next_message() => next,
            };

            match next {
                Some(Ok(raw)) => {
                    // No handler call may begin once a stop has been requested.
                    if cancel.is_cancelled() {
                        break 'session;
                    }
                    messages += 1;
                    let ping = Ping::decode(raw);
                    trace!(messages, valid = ping.valid(), "Received message");

                    if let ControlFlow::Break(reason) = handler.on_ping(&ping) {
                        debug!(?reason, "Handler requested stop");
                        cancel.cancel();
                        break 'session;
                    }
                }
                Some(Err(e)) => {
                    warn!("Error reading from sonar at {}: {}", connection.peer(), e);
                    break;
                }
                None => {
                    warn!("Sonar at {} closed the connection", connection.peer());
                    break;
                }
            }
        }

        if reconnect_delay(&cancel).await {
            break;
        }
    }

    info!("Acquisition loop ended ({} messages)", messages);
    handler
}

/// Wait before the next connection attempt. Returns true if cancelled meanwhile.
async fn reconnect_delay(cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(RECONNECT_DELAY) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SimplePingBuilder;
    use crate::session::StopReason;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    fn idle(_: &Ping) -> ControlFlow<StopReason> {
        ControlFlow::Continue(())
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    #[test]
    fn delivers_pings_and_stops_on_break() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let server = std::thread::spawn(move || -> std::io::Result<()> {
            let (mut socket, _) = listener.accept()?;
            for id in 0..10 {
                socket.write_all(&SimplePingBuilder::new().ping_id(id).build())?;
            }
            // Hold the connection open until the client goes away.
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        });

        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let handler = move |_ping: &Ping| {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                ControlFlow::Break(StopReason::FrameLimit)
            } else {
                ControlFlow::Continue(())
            }
        };

        let sonar = SonarConfiguration::default();
        let mut source = LiveSource::new(SonarAddress::Explicit(addr), sonar, handler);
        source.start()?;
        assert!(wait_until(Duration::from_secs(5), || source.is_finished()));
        source.join()?;

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(source.stop_handle().is_stopped());
        server.join().ok();
        Ok(())
    }

    #[test]
    fn stop_without_sonar_is_clean_and_idempotent() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let sonar = SonarConfiguration::default();
        let mut source = LiveSource::new(SonarAddress::Explicit(addr), sonar, idle);
        source.start()?;
        std::thread::sleep(Duration::from_millis(50));

        source.stop();
        source.stop();
        source.join()?;
        assert!(source.is_finished());
        source.stop();
        assert!(source.join().is_err());
        Ok(())
    }

    #[test]
    fn start_twice_is_rejected() -> anyhow::Result<()> {
        let addr = "127.0.0.1:9".parse()?;
        let sonar = SonarConfiguration::default();
        let mut source = LiveSource::new(SonarAddress::Explicit(addr), sonar, idle);
        source.start()?;
        assert!(matches!(source.start(), Err(SonarError::Thread { .. })));
        source.stop();
        source.join()?;
        Ok(())
    }

    #[test]
    fn join_before_start_returns_handler() -> anyhow::Result<()> {
        struct Counting(u32);
        impl PingHandler for Counting {
            fn on_ping(&mut self, _ping: &Ping) -> ControlFlow<StopReason> {
                self.0 += 1;
                ControlFlow::Continue(())
            }
        }

        let addr = "127.0.0.1:9".parse()?;
        let sonar = SonarConfiguration::default();
        let mut source = LiveSource::new(SonarAddress::Explicit(addr), sonar, Counting(5));
        assert!(!source.is_started());
        assert!(source.is_finished());
        assert_eq!(source.join()?.0, 5);
        Ok(())
    }
}
