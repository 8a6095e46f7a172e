//! Sonar auto-discovery from UDP status broadcasts.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use crate::protocol::StatusMessage;
use crate::protocol::format::{DATA_PORT, STATUS_PORT};
use crate::{Result, SonarError};

/// How long one discovery attempt listens before giving up.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Listen on the status port for the first sonar that announces itself.
///
/// Returns the data endpoint of that sonar.
pub async fn discover(timeout: Duration) -> Result<SocketAddr> {
    discover_on(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), STATUS_PORT), timeout).await
}

/// Discovery on an explicit local address.
pub async fn discover_on(bind: SocketAddr, timeout: Duration) -> Result<SocketAddr> {
    let socket = UdpSocket::bind(bind).await.map_err(|e| {
        let reason = format!("cannot listen on {}", bind);
        SonarError::connection_failed_with_source(reason, Box::new(e))
    })?;
    socket.set_broadcast(true)?;
    debug!("Listening for sonar status broadcasts on {}", bind);

    tokio::time::timeout(timeout, listen(&socket))
        .await
        .map_err(|_| {
            let reason = format!("no sonar status broadcast within {:?}", timeout);
            SonarError::connection_failed(reason)
        })?
}

async fn listen(socket: &UdpSocket) -> Result<SocketAddr> {
    let mut buf = [0u8; 1024];
    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        match StatusMessage::parse(&buf[..len]) {
            Ok(status) => {
                let ip = if status.ip_addr.is_unspecified() {
                    from.ip()
                } else {
                    IpAddr::V4(status.ip_addr)
                };
                info!(
                    device_id = status.device_id,
                    part_number = status.part_number,
                    "Discovered sonar at {}",
                    ip
                );
                return Ok(SocketAddr::new(ip, DATA_PORT));
            }
            Err(e) => trace!("Ignoring datagram from {}: {}", from, e),
        }
    }
}
