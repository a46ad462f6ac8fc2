//! Serializable runner configuration.
//!
//! One TOML file drives both halves of the system:
//!
//! ```toml
//! [forecast]
//! sequence_length = 60
//! predict_days = 7
//! backends = ["lstm", "gru", "xgboost"]
//!
//! [forecast.selector]
//! type = "sector"
//! id = 4
//!
//! [scoring]
//! recent_dates = 9
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use pricecast_core::config::{ConfigError, ForecastConfig};
use pricecast_core::domain::HistoryColumnId;

/// Content hash identifying a runner configuration.
pub type RunId = String;

/// Scoring engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Only predictions of this history column are scored (close).
    pub close_column_id: HistoryColumnId,
    /// Distinct prediction dates kept in a company report.
    pub recent_dates: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            close_column_id: HistoryColumnId(6),
            recent_dates: 9,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recent_dates == 0 {
            return Err(ConfigError::Invalid("recent_dates must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub forecast: ForecastConfig,
    pub scoring: ScoringConfig,
}

impl RunnerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.forecast.validate()?;
        config.scoring.validate()?;
        Ok(config)
    }

    /// Deterministic hash of the whole configuration.
    ///
    /// Two batches with identical settings share a run id.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}
