//! Acquisition parameters sent to the sonar.

use crate::protocol::SimpleFire;
use crate::types::PingRate;
use crate::{Result, SonarError};

/// Fire message flags: 8-bit data, gain assist, simple ping result.
const DEFAULT_FIRE_FLAGS: u8 = 0x19;

/// What the sonar is asked to do once connected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SonarConfiguration {
    pub ping_rate: PingRate,
    /// 1 = low frequency, 2 = high frequency
    pub master_mode: u8,
    /// Metres
    pub range_m: f64,
    /// Percent
    pub gain_percent: f64,
    /// m/s, 0 lets the sonar compute it from salinity
    pub speed_of_sound: f64,
    /// ppt
    pub salinity: f64,
    pub gamma: u8,
}

impl Default for SonarConfiguration {
    fn default() -> Self {
        Self {
            ping_rate: PingRate::default(),
            master_mode: 2,
            range_m: 20.0,
            gain_percent: 50.0,
            speed_of_sound: 0.0,
            salinity: 0.0,
            gamma: 127,
        }
    }
}

impl SonarConfiguration {
    pub fn with_ping_rate(mut self, ping_rate: PingRate) -> Self {
        self.ping_rate = ping_rate;
        self
    }

    pub fn with_range(mut self, range_m: f64) -> Self {
        self.range_m = range_m;
        self
    }

    pub fn with_gain(mut self, gain_percent: f64) -> Self {
        self.gain_percent = gain_percent;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.range_m.is_finite() || self.range_m <= 0.0 {
            return Err(SonarError::invalid_config(format!(
                "range must be positive, got {}",
                self.range_m
            )));
        }
        if !self.gain_percent.is_finite() || !(0.0..=100.0).contains(&self.gain_percent) {
            return Err(SonarError::invalid_config(format!(
                "gain must be between 0 and 100 percent, got {}",
                self.gain_percent
            )));
        }
        if !self.speed_of_sound.is_finite() || self.speed_of_sound < 0.0 {
            return Err(SonarError::invalid_config(format!(
                "speed of sound must not be negative, got {}",
                self.speed_of_sound
            )));
        }
        if !self.salinity.is_finite() || self.salinity < 0.0 {
            return Err(SonarError::invalid_config(format!(
                "salinity must not be negative, got {}",
                self.salinity
            )));
        }
        if !matches!(self.master_mode, 1 | 2) {
            return Err(SonarError::invalid_config(format!(
                "master mode must be 1 or 2, got {}",
                self.master_mode
            )));
        }
        Ok(())
    }

    /// Fire message carrying this configuration.
    pub fn simple_fire(&self) -> SimpleFire {
        SimpleFire {
            master_mode: self.master_mode,
            ping_rate: self.ping_rate,
            network_speed: 0xff,
            gamma: self.gamma,
            flags: DEFAULT_FIRE_FLAGS,
            range: self.range_m,
            gain: self.gain_percent,
            speed_of_sound: self.speed_of_sound,
            salinity: self.salinity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SonarConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.range_m, 20.0);
        assert_eq!(config.gain_percent, 50.0);
        assert_eq!(config.ping_rate, PingRate::Normal);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let base = SonarConfiguration::default();
        assert!(base.with_range(0.0).validate().is_err());
        assert!(base.with_range(f64::NAN).validate().is_err());
        assert!(base.with_gain(101.0).validate().is_err());
        assert!(base.with_gain(-1.0).validate().is_err());
        assert!(SonarConfiguration { master_mode: 3, ..base }.validate().is_err());
    }

    #[test]
    fn fire_message_carries_settings() {
        let fire = SonarConfiguration::default()
            .with_ping_rate(PingRate::Highest)
            .with_range(35.0)
            .simple_fire();
        assert_eq!(fire.ping_rate, PingRate::Highest);
        assert_eq!(fire.range, 35.0);
        assert_eq!(fire.gain, 50.0);
        assert_eq!(fire.master_mode, 2);
    }
}
