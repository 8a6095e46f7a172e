//! Ping rate policy sent to the sonar in the simple fire message

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::SonarError;

/// Rate at which the sonar fires pings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PingRate {
    /// 10 Hz
    #[default]
    Normal,

    /// 15 Hz
    High,

    /// 40 Hz
    Highest,

    /// 5 Hz
    Low,

    /// 2 Hz
    Lowest,

    /// Sonar stays connected but does not ping
    Standby,
}

impl PingRate {
    /// Code carried in the simple fire message
    pub fn wire_code(self) -> u8 {
        match self {
            PingRate::Normal => 0,
            PingRate::High => 1,
            PingRate::Highest => 2,
            PingRate::Low => 3,
            PingRate::Lowest => 4,
            PingRate::Standby => 5,
        }
    }

    pub fn from_wire_code(code: u8) -> Result<Self, SonarError> {
        match code {
            0 => Ok(PingRate::Normal),
            1 => Ok(PingRate::High),
            2 => Ok(PingRate::Highest),
            3 => Ok(PingRate::Low),
            4 => Ok(PingRate::Lowest),
            5 => Ok(PingRate::Standby),
            other => Err(SonarError::protocol("Ping rate", format!("unknown code {}", other))),
        }
    }

    /// Nominal ping frequency, `None` in standby
    pub fn hz(self) -> Option<u32> {
        match self {
            PingRate::Normal => Some(10),
            PingRate::High => Some(15),
            PingRate::Highest => Some(40),
            PingRate::Low => Some(5),
            PingRate::Lowest => Some(2),
            PingRate::Standby => None,
        }
    }

    /// Expected time between pings
    pub fn period(self) -> Option<Duration> {
        self.hz().map(|hz| Duration::from_secs_f64(1.0 / hz as f64))
    }
}

impl fmt::Display for PingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PingRate::Normal => "normal",
            PingRate::High => "high",
            PingRate::Highest => "highest",
            PingRate::Low => "low",
            PingRate::Lowest => "lowest",
            PingRate::Standby => "standby",
        };
        f.write_str(name)
    }
}

impl FromStr for PingRate {
    type Err = SonarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(PingRate::Normal),
            "high" => Ok(PingRate::High),
            "highest" => Ok(PingRate::Highest),
            "low" => Ok(PingRate::Low),
            "lowest" => Ok(PingRate::Lowest),
            "standby" => Ok(PingRate::Standby),
            other => Err(SonarError::invalid_config(format!(
                "unknown ping rate '{}' (expected normal, high, highest, low, lowest or standby)",
                other
            ))),
        }
    }
}
