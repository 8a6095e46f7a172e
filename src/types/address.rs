//! Sonar endpoint selection

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::SonarError;
use crate::protocol::format::DATA_PORT;

/// Where the live source should look for a sonar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SonarAddress {
    /// Listen for status broadcasts and use the first sonar that announces itself
    #[default]
    Auto,

    /// Connect to a known data endpoint
    Explicit(SocketAddr),
}

impl SonarAddress {
    /// Explicit address on the default data port
    pub fn ip(ip: IpAddr) -> Self {
        SonarAddress::Explicit(SocketAddr::new(ip, DATA_PORT))
    }
}

impl fmt::Display for SonarAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SonarAddress::Auto => f.write_str("auto"),
            SonarAddress::Explicit(addr) => write!(f, "{}", addr),
        }
    }
}

impl FromStr for SonarAddress {
    type Err = SonarError;

    /// Accepts `auto`, a bare IP address, or `ip:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(SonarAddress::Auto);
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(SonarAddress::Explicit(addr));
        }
        s.parse::<IpAddr>().map(SonarAddress::ip).map_err(|_| {
            SonarError::invalid_config(format!(
                "'{}' is not an IP address, ip:port, or \"auto\"",
                s
            ))
        })
    }
}
