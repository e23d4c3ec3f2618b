use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors from loading or validating engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("tick rate must be positive and finite, got {0}")]
    InvalidTickRate(f64),
    #[error("streamer range must be non-negative and finite, got {0}")]
    InvalidRange(f32),
    #[error("regulator epsilon must be non-negative and finite, got {0}")]
    InvalidEpsilon(f32),
    #[error("regulator step must be non-zero")]
    ZeroStep,
}

/// Scheduler and replication settings.
///
/// Durations are plain milliseconds so the YAML stays readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Server simulation rate in Hz. The baseline replication period of every
    /// streamable is `1000 / tick_rate_hz` milliseconds.
    pub tick_rate_hz: f64,
    /// Base interval of the streaming jobs. Defaults to the server tick.
    pub streaming_tick_ms: Option<u64>,
    /// Visibility radius given to newly spawned players.
    pub default_range: f32,
    pub regulator: RegulatorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            streaming_tick_ms: None,
            default_range: 100.0,
            regulator: RegulatorConfig::default(),
        }
    }
}

/// Tick-rate regulator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulatorConfig {
    /// How often the regulator pass runs.
    pub interval_ms: u64,
    /// Added to a resting entity's update interval on every pass.
    pub step_ms: u64,
    /// Per-axis tolerance below which a transform counts as unchanged.
    pub epsilon: f32,
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            step_ms: 5,
            epsilon: 0.01,
        }
    }
}

impl RegulatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&source)?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidTickRate(self.tick_rate_hz));
        }
        if !self.default_range.is_finite() || self.default_range < 0.0 {
            return Err(ConfigError::InvalidRange(self.default_range));
        }
        if !self.regulator.epsilon.is_finite() || self.regulator.epsilon < 0.0 {
            return Err(ConfigError::InvalidEpsilon(self.regulator.epsilon));
        }
        if self.regulator.step_ms == 0 {
            return Err(ConfigError::ZeroStep);
        }
        Ok(())
    }

    /// Length of one server tick.
    pub fn server_tick(&self) -> Duration {
        Duration::from_nanos((1e9 / self.tick_rate_hz).round() as u64)
    }

    /// Baseline replication period of a streamable: `1000 / tick_rate_hz` ms.
    pub fn default_update_interval(&self) -> Duration {
        self.server_tick()
    }

    /// Interval of the dispatch job. Ownership, range-exempt collection and
    /// reaping run at four times this.
    pub fn streaming_tick(&self) -> Duration {
        self.streaming_tick_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.server_tick())
    }
}
