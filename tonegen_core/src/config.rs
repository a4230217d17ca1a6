use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::phase::Interpolation;
use crate::sink::StreamSpec;
use crate::waveform::Waveform;

pub const SAMPLE_RATE: u32 = 44_100;
pub const MIN_FREQUENCY: u32 = 20;
pub const MAX_FREQUENCY: u32 = 20_000;
pub const DEFAULT_FREQUENCY: u32 = 440;
pub const MAX_VOLUME: u32 = 100;
pub const DEFAULT_VOLUME: u32 = 50;

/// Startup configuration for an oscillator engine.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rate requested from the output. The device may settle on another one.
    pub sample_rate: u32,
    /// Entries per waveform table. `None` uses `sample_rate`.
    pub table_len: Option<usize>,
    pub min_frequency: u32,
    pub max_frequency: u32,
    pub default_frequency: u32,
    pub default_volume: u32,
    pub default_waveform: Waveform,
    /// Frames per block. `None` uses the output's minimum.
    pub buffer_frames: Option<usize>,
    pub interpolation: Interpolation,
    /// Output device name (partial, case-insensitive). `None` uses the default.
    pub device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            table_len: None,
            min_frequency: MIN_FREQUENCY,
            max_frequency: MAX_FREQUENCY,
            default_frequency: DEFAULT_FREQUENCY,
            default_volume: DEFAULT_VOLUME,
            default_waveform: Waveform::Sine,
            buffer_frames: None,
            interpolation: Interpolation::Nearest,
            device: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("loading config from {}", path.display());
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be non-zero".into()));
        }
        if self.table_len == Some(0) {
            return Err(ConfigError::Invalid("table_len must be non-zero".into()));
        }
        if self.buffer_frames == Some(0) {
            return Err(ConfigError::Invalid("buffer_frames must be non-zero".into()));
        }
        if self.min_frequency > self.max_frequency {
            return Err(ConfigError::Invalid(format!(
                "min_frequency {} is above max_frequency {}",
                self.min_frequency, self.max_frequency
            )));
        }
        if !self.frequency_range().contains(&self.default_frequency) {
            return Err(ConfigError::Invalid(format!(
                "default_frequency {} is outside {}..={}",
                self.default_frequency, self.min_frequency, self.max_frequency
            )));
        }
        if self.default_volume > MAX_VOLUME {
            return Err(ConfigError::Invalid(format!(
                "default_volume {} is above {}",
                self.default_volume, MAX_VOLUME
            )));
        }
        Ok(())
    }

    pub fn frequency_range(&self) -> RangeInclusive<u32> {
        self.min_frequency..=self.max_frequency
    }

    pub fn table_len(&self) -> usize {
        self.table_len.unwrap_or(self.sample_rate as usize)
    }

    /// Mono i16 request for the output, before device negotiation.
    pub fn stream_spec(&self) -> StreamSpec {
        StreamSpec {
            sample_rate: self.sample_rate,
            channels: 1,
            buffer_frames: self.buffer_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_classic_oscillator() {
        let config = EngineConfig::default();
        assert_eq!(config.table_len(), 44_100);
        assert_eq!(config.frequency_range(), 20..=20_000);
        assert_eq!(config.default_frequency, 440);
        assert_eq!(config.default_volume, 50);
        assert_eq!(config.default_waveform, Waveform::Sine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "default_waveform": "square", "interpolation": "linear", "buffer_frames": 256 }"#,
        )
        .unwrap();
        assert_eq!(config.default_waveform, Waveform::Square);
        assert_eq!(config.interpolation, Interpolation::Linear);
        assert_eq!(config.stream_spec().buffer_frames, Some(256));
        assert_eq!(config.sample_rate, SAMPLE_RATE);
    }

    #[test]
    fn test_json_round_trip_preserves_config() {
        let config = EngineConfig {
            table_len: Some(8192),
            device: Some("pulse".into()),
            ..EngineConfig::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "default_frequency": 5 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "default_volume": 101 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "min_frequency": 100, "max_frequency": 50 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "sample_rate": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(EngineConfig::from_json_str("not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::from_json_file("/nonexistent/tonegen.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
