//! TCP client for the sonar data port.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, info, trace};

use super::config::SonarConfiguration;
use super::discovery::{DISCOVERY_TIMEOUT, discover};
use crate::protocol::{MessageCodec, SimpleFire};
use crate::types::SonarAddress;
use crate::{Result, SonarError};

/// Wait between connection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// The fire message is re-sent this often so the sonar keeps pinging.
pub const FIRE_INTERVAL: Duration = Duration::from_secs(1);
/// Limit for a single TCP connect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Knows where the sonar is and how to configure it.
#[derive(Debug, Clone)]
pub struct SonarClient {
    address: SonarAddress,
    config: SonarConfiguration,
}

impl SonarClient {
    pub fn new(address: SonarAddress, config: SonarConfiguration) -> Self {
        Self { address, config }
    }

    pub fn address(&self) -> SonarAddress {
        self.address
    }

    pub fn config(&self) -> &SonarConfiguration {
        &self.config
    }

    /// Resolve the endpoint (discovering it if needed), connect, and send the fire message.
    pub async fn connect(&self) -> Result<SonarConnection> {
        let peer = match self.address {
            SonarAddress::Explicit(addr) => addr,
            SonarAddress::Auto => discover(DISCOVERY_TIMEOUT).await?,
        };

        debug!("Connecting to sonar at {}", peer);
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(peer))
            .await
            .map_err(|_| {
                SonarError::connection_failed(format!("timed out connecting to {}", peer))
            })?
            .map_err(|e| {
                let reason = format!("cannot connect to {}", peer);
                SonarError::connection_failed_with_source(reason, Box::new(e))
            })?;
        stream.set_nodelay(true)?;

        let fire = self.config.simple_fire();
        let mut framed = Framed::new(stream, MessageCodec::new());
        framed.send(fire).await?;
        info!(
            ping_rate = %self.config.ping_rate,
            range = self.config.range_m,
            "Connected to sonar at {}",
            peer
        );

        let mut keepalive = tokio::time::interval_at(Instant::now() + FIRE_INTERVAL, FIRE_INTERVAL);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(SonarConnection { framed, peer, fire, keepalive, messages: 0 })
    }
}

/// An open data connection delivering framed messages.
pub struct SonarConnection {
    framed: Framed<TcpStream, MessageCodec>,
    peer: SocketAddr,
    fire: SimpleFire,
    keepalive: Interval,
    messages: u64,
}

impl std::fmt::Debug for SonarConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonarConnection")
            .field("peer", &self.peer)
            .field("messages", &self.messages)
            .finish()
    }
}

impl SonarConnection {
    /// Next complete message.
    ///
    /// `None` means the sonar closed the connection. Keep-alive fire messages are sent
    /// while waiting.
    pub async fn next_message(&mut self) -> Option<Result<Bytes>> {
        loop {
            tokio::select! {
                message = self.framed.next() => {
                    if matches!(message, Some(Ok(_))) {
                        self.messages += 1;
                    }
                    return message;
                }
                _ = self.keepalive.tick() => {}
            }

            trace!("Re-sending fire message to {}", self.peer);
            if let Err(e) = self.framed.send(self.fire).await {
                return Some(Err(e));
            }
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn messages_received(&self) -> u64 {
        self.messages
    }
}
