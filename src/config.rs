//! Configuration for the Lumen Session Agent.
//!
//! [`SessionConfig`] is the per-session protocol timing, validated
//! synchronously before a session starts. [`AgentConfig`] is the
//! process-level configuration (paths, server port, smoothing factor),
//! persisted as JSON under the local data directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Timing and acquisition parameters for one session.
///
/// All durations are seconds from session start. Immutable once the
/// session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Light stimulus onset.
    #[serde(default = "default_t_on")]
    pub t_on: f64,
    /// Light stimulus offset.
    #[serde(default = "default_t_off")]
    pub t_off: f64,
    /// Total session duration.
    #[serde(default = "default_total_s")]
    pub total_s: f64,
    /// Length of the baseline window ending at `t_on`.
    #[serde(default = "default_baseline_s")]
    pub baseline_s: f64,
    /// Device connection attempts before falling back to the simulator.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Run against the deterministic simulator instead of hardware.
    #[serde(default = "default_demo")]
    pub demo: bool,
}

fn default_t_on() -> f64 {
    5.0
}
fn default_t_off() -> f64 {
    15.0
}
fn default_total_s() -> f64 {
    55.0
}
fn default_baseline_s() -> f64 {
    2.0
}
fn default_retries() -> u32 {
    5
}
fn default_demo() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            t_on: default_t_on(),
            t_off: default_t_off(),
            total_s: default_total_s(),
            baseline_s: default_baseline_s(),
            retries: default_retries(),
            demo: default_demo(),
        }
    }
}

impl SessionConfig {
    /// Check the timing invariants: `0 <= t_on < t_off < total_s` and
    /// `0 < baseline_s <= t_on`.
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        for (name, value) in [
            ("t_on", self.t_on),
            ("t_off", self.t_off),
            ("total_s", self.total_s),
            ("baseline_s", self.baseline_s),
        ] {
            if !value.is_finite() {
                return Err(SessionConfigError::NotFinite { field: name });
            }
        }
        if self.t_on < 0.0 {
            return Err(SessionConfigError::NegativeOnset);
        }
        if self.t_on >= self.t_off {
            return Err(SessionConfigError::OnsetAfterOffset);
        }
        if self.t_off >= self.total_s {
            return Err(SessionConfigError::OffsetAfterEnd);
        }
        if self.baseline_s <= 0.0 || self.baseline_s > self.t_on {
            return Err(SessionConfigError::BaselineOutOfRange);
        }
        Ok(())
    }
}

/// Validation failures for [`SessionConfig`].
#[derive(Debug, Error)]
pub enum SessionConfigError {
    #[error("{field} must be finite")]
    NotFinite { field: &'static str },

    #[error("t_on must be >= 0")]
    NegativeOnset,

    #[error("t_on must be strictly before t_off")]
    OnsetAfterOffset,

    #[error("t_off must be strictly before total_s")]
    OffsetAfterEnd,

    #[error("baseline_s must be > 0 and <= t_on")]
    BaselineOutOfRange,
}

/// Process-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Bind address for the HTTP surface.
    pub host: String,
    /// Bind port for the HTTP surface.
    pub port: u16,
    /// Network address of the pupil sensor.
    pub device_address: String,
    /// Directory for on-disk state.
    pub data_path: PathBuf,
    /// Smoothing factor for the longitudinal engagement EMA.
    pub ema_alpha: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lumen-agent");

        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            device_address: "172.20.10.3:8080".to_string(),
            data_path: data_dir,
            ema_alpha: crate::store::DEFAULT_EMA_ALPHA,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the default location, or defaults if
    /// no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: AgentConfig =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Path of the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lumen-agent")
            .join("config.json")
    }

    /// Path of the engagement record store.
    pub fn store_path(&self) -> PathBuf {
        self.data_path.join("engagement_scores.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Agent configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_timing_rejected() {
        let cfg = SessionConfig {
            t_on: 20.0, // after t_off
            ..SessionConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SessionConfigError::OnsetAfterOffset)
        ));

        let cfg = SessionConfig {
            total_s: 10.0, // before t_off
            ..SessionConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SessionConfigError::OffsetAfterEnd)
        ));

        let cfg = SessionConfig {
            baseline_s: 6.0, // longer than t_on
            ..SessionConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SessionConfigError::BaselineOutOfRange)
        ));

        let cfg = SessionConfig {
            t_on: f64::NAN,
            ..SessionConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SessionConfigError::NotFinite { field: "t_on" })
        ));
    }

    #[test]
    fn test_partial_start_body_uses_defaults() {
        let cfg: SessionConfig = serde_json::from_str(r#"{"t_on": 4.0}"#).unwrap();
        assert_eq!(cfg.t_on, 4.0);
        assert_eq!(cfg.t_off, 15.0);
        assert_eq!(cfg.total_s, 55.0);
        assert!(cfg.demo);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_body_matches_default_config() {
        // An empty JSON object and an absent body must describe the
        // same session.
        let cfg: SessionConfig = serde_json::from_str("{}").unwrap();
        let default = SessionConfig::default();
        assert_eq!(cfg.t_on, default.t_on);
        assert_eq!(cfg.t_off, default.t_off);
        assert_eq!(cfg.total_s, default.total_s);
        assert_eq!(cfg.baseline_s, default.baseline_s);
        assert_eq!(cfg.retries, default.retries);
        assert_eq!(cfg.demo, default.demo);
    }

    #[test]
    fn test_default_agent_config() {
        let config = AgentConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.ema_alpha, 0.3);
        assert!(config.store_path().ends_with("engagement_scores.json"));
    }
}
