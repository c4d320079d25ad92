// src/config.rs
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::drivers::SenseError;

/// Environment variable consulted when no config path is given on the command line.
pub const CONFIG_ENV: &str = "CURRENT_SENSE_CONFIG";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub processing: ProcessingConfig,
    pub calibration: CalibrationConfig,
    pub wire: WireConfig,
    pub simulation: SimulationConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub sample_rate_hz: u32,
    /// Raw entries requested per hardware read.
    pub read_len: usize,
    pub adc_channel: u8,
    pub read_timeout_ms: u64,
    /// Timeout of each discard read while idling between batches.
    pub drain_poll_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 25_000,
            read_len: 512,
            adc_channel: 4,
            read_timeout_ms: 100,
            drain_poll_ms: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub cycles_to_average: usize,
    pub min_expected_frequency_hz: f32,
    pub max_expected_frequency_hz: f32,
    pub batch_interval_ms: u64,
    pub timeout_streak_alert: u32,
    pub health_report_every: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            cycles_to_average: 10,
            min_expected_frequency_hz: 20.0,
            max_expected_frequency_hz: 300.0,
            batch_interval_ms: 1000,
            timeout_streak_alert: 20,
            health_report_every: 1000,
        }
    }
}

/// Linear front-end transform: `mV = raw * scale_mv_per_count + offset_mv`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub scale_mv_per_count: f32,
    pub offset_mv: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        // 12-bit code over ~3.1 V at 11 dB attenuation
        Self {
            scale_mv_per_count: 3100.0 / 4095.0,
            offset_mv: 0.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Serial device for the responder; `None` keeps the responder off.
    pub serial_port: Option<String>,
    pub baud_rate: u32,
    pub poll_timeout_ms: u64,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: 115_200,
            poll_timeout_ms: 50,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub frequency_hz: f32,
    pub amplitude_mv: f32,
    pub dc_offset_mv: f32,
    pub noise_mv: f32,
    /// Every n-th entry is tagged with a foreign channel; 0 disables.
    pub foreign_channel_every: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            amplitude_mv: 600.0,
            dc_offset_mv: 1550.0,
            noise_mv: 5.0,
            foreign_channel_every: 0,
            seed: 0x5eed,
        }
    }
}

impl Config {
    /// Loads from `path`, or falls back to built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_json(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), SenseError> {
        let invalid = |msg: &str| Err(SenseError::InvalidConfig(msg.to_owned()));
        if self.sampling.sample_rate_hz == 0 {
            return Err(SenseError::InvalidSampleRate);
        }
        if self.sampling.read_len == 0 {
            return invalid("sampling.read_len must be at least 1");
        }
        if self.sampling.drain_poll_ms == 0 {
            return invalid("sampling.drain_poll_ms must be positive");
        }
        if self.processing.cycles_to_average == 0 {
            return invalid("processing.cycles_to_average must be at least 1");
        }
        let min = self.processing.min_expected_frequency_hz;
        if !(min.is_finite() && min > 0.0) {
            return invalid("processing.min_expected_frequency_hz must be positive");
        }
        if self.processing.max_expected_frequency_hz < min {
            return invalid("processing.max_expected_frequency_hz is below the minimum");
        }
        if self.processing.batch_interval_ms == 0 {
            return invalid("processing.batch_interval_ms must be positive");
        }
        if !(self.calibration.scale_mv_per_count > 0.0) {
            return invalid("calibration.scale_mv_per_count must be positive");
        }
        Ok(())
    }

    /// Worst-case sample budget for N cycles at the slowest expected frequency.
    pub fn max_samples_per_batch(&self) -> u64 {
        let n = self.processing.cycles_to_average as f64;
        let rate = f64::from(self.sampling.sample_rate_hz);
        let min_hz = f64::from(self.processing.min_expected_frequency_hz);
        (n / min_hz * rate).ceil() as u64
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.processing.batch_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.sampling.read_timeout_ms)
    }

    pub fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.sampling.drain_poll_ms)
    }

    pub fn wire_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.wire.poll_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        // 10 cycles at 20 Hz, 25 kHz
        assert_eq!(config.max_samples_per_batch(), 12_500);
    }
    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json(
            r#"{ "processing": { "cycles_to_average": 4 }, "wire": { "serial_port": "/dev/ttyUSB0" } }"#,
        )
        .unwrap();
        assert_eq!(config.processing.cycles_to_average, 4);
        assert_eq!(config.sampling.sample_rate_hz, 25_000);
        assert_eq!(config.wire.serial_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.wire.baud_rate, 115_200);
    }
    #[test]
    fn sample_budget_rounds_up() {
        let mut config = Config::default();
        config.sampling.sample_rate_hz = 1000;
        config.processing.cycles_to_average = 3;
        config.processing.min_expected_frequency_hz = 7.0;
        // 3 / 7 * 1000 = 428.57...
        assert_eq!(config.max_samples_per_batch(), 429);
        let slowest_period = 1000.0 / 7.0;
        assert!(config.max_samples_per_batch() as f64 >= 3.0 * slowest_period);
    }
    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.processing.cycles_to_average = 0;
        assert!(matches!(config.validate(), Err(SenseError::InvalidConfig(_))));
        let mut config = Config::default();
        config.sampling.sample_rate_hz = 0;
        assert!(matches!(config.validate(), Err(SenseError::InvalidSampleRate)));
        let mut config = Config::default();
        config.processing.max_expected_frequency_hz = 5.0;
        assert!(config.validate().is_err());
        let mut config = Config::default();
        config.calibration.scale_mv_per_count = 0.0;
        assert!(config.validate().is_err());
    }
}
