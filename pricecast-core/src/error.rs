//! Pipeline error taxonomy.
//!
//! Every error carries an explicit [`Disposition`] so orchestration code can
//! branch on policy (skip the row, skip the unit, abort the batch) instead of
//! matching individual variants at every call site.

use thiserror::Error;

use crate::data::SourceError;

/// How far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Drop the offending row and keep going.
    SkipRow,
    /// Abandon the current (company, backend) unit; siblings continue.
    SkipUnit,
    /// Abort the whole batch.
    Fatal,
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("insufficient data: {0}")]
    DataSufficiency(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("computation error: {0}")]
    Computation(String),

    #[error("external source unavailable: {0}")]
    ExternalIo(String),

    #[error("connection failure: {0}")]
    Connection(String),
}

impl ForecastError {
    pub fn disposition(&self) -> Disposition {
        match self {
            ForecastError::Integrity(_) => Disposition::SkipRow,
            ForecastError::DataSufficiency(_)
            | ForecastError::Computation(_)
            | ForecastError::ExternalIo(_) => Disposition::SkipUnit,
            ForecastError::Configuration(_) | ForecastError::Connection(_) => Disposition::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.disposition() == Disposition::Fatal
    }
}

impl From<SourceError> for ForecastError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Connection(msg) => ForecastError::Connection(msg),
            other => ForecastError::ExternalIo(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispositions_follow_taxonomy() {
        assert_eq!(
            ForecastError::Integrity("dup".into()).disposition(),
            Disposition::SkipRow
        );
        assert_eq!(
            ForecastError::DataSufficiency("short".into()).disposition(),
            Disposition::SkipUnit
        );
        assert!(ForecastError::Configuration("no such ticker".into()).is_fatal());
        assert!(ForecastError::Connection("refused".into()).is_fatal());
    }

    #[test]
    fn connection_source_errors_stay_fatal() {
        let err: ForecastError = SourceError::Connection("refused".into()).into();
        assert!(err.is_fatal());
        let err: ForecastError = SourceError::Missing {
            what: "macro_selic".into(),
        }
        .into();
        assert_eq!(err.disposition(), Disposition::SkipUnit);
    }
}
