//! Forecast run configuration, loaded from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{BackendKind, BackendParams};
use crate::dataset::BuildOptions;
use crate::domain::{CompanyId, HistoryColumnId, SectorId, UserId};
use crate::error::ForecastError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ForecastError {
    fn from(err: ConfigError) -> Self {
        ForecastError::Configuration(err.to_string())
    }
}

/// Which companies a batch covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompanySelector {
    #[default]
    All,
    Company {
        id: CompanyId,
    },
    Ticker {
        ticker: String,
    },
    Sector {
        id: SectorId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Window length `L`.
    pub sequence_length: usize,
    /// Forecast horizon `H`, in days.
    pub predict_days: usize,
    pub lookback_years: i64,
    pub seed: u64,
    pub selector: CompanySelector,
    pub backends: Vec<BackendKind>,
    /// History column the persisted predictions refer to (close).
    pub history_column_id: HistoryColumnId,
    pub updated_by_user_id: UserId,
    #[serde(flatten)]
    pub params: BackendParams,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            sequence_length: 60,
            predict_days: 7,
            lookback_years: 4,
            seed: 42,
            selector: CompanySelector::All,
            backends: BackendKind::ALL.to_vec(),
            history_column_id: HistoryColumnId(6),
            updated_by_user_id: UserId(2),
            params: BackendParams::default(),
        }
    }
}

impl ForecastConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence_length == 0 {
            return Err(ConfigError::Invalid("sequence_length must be positive".into()));
        }
        if self.predict_days == 0 {
            return Err(ConfigError::Invalid("predict_days must be positive".into()));
        }
        if self.lookback_years <= 0 {
            return Err(ConfigError::Invalid("lookback_years must be positive".into()));
        }
        if self.backends.is_empty() {
            return Err(ConfigError::Invalid("at least one backend is required".into()));
        }
        self.params
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::new(self.predict_days as i64, self.lookback_years)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let c = ForecastConfig::default();
        assert_eq!(c.sequence_length, 60);
        assert_eq!(c.predict_days, 7);
        assert_eq!(c.lookback_years, 4);
        assert_eq!(c.params.recurrent.units, 50);
        assert_eq!(c.params.boosting.n_estimators, 300);
        assert_eq!(c.build_options().lookback_days, 4 * 365);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = ForecastConfig::from_toml(
            r#"
            sequence_length = 30
            backends = ["xgboost"]

            [selector]
            type = "ticker"
            ticker = "PETR4"

            [boosting]
            n_estimators = 50
            "#,
        )
        .unwrap();
        assert_eq!(c.sequence_length, 30);
        assert_eq!(c.predict_days, 7);
        assert_eq!(c.backends, vec![BackendKind::GradientBoosting]);
        assert_eq!(
            c.selector,
            CompanySelector::Ticker {
                ticker: "PETR4".into()
            }
        );
        assert_eq!(c.params.boosting.n_estimators, 50);
        assert_eq!(c.params.boosting.max_depth, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            ForecastConfig::from_toml("predict_days = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ForecastConfig::from_toml("backends = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ForecastConfig::from_toml("backends = [\"arima\"]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "seed = 7\n[recurrent]\nepochs = 5").unwrap();
        let c = ForecastConfig::from_file(file.path()).unwrap();
        assert_eq!(c.seed, 7);
        assert_eq!(c.params.recurrent.epochs, 5);
    }
}
