use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Listed company identifier.
    CompanyId
);
id_type!(
    /// Economic sector identifier.
    SectorId
);
id_type!(
    /// Persisted forecasting model identifier.
    ModelId
);
id_type!(
    /// Price-history column a prediction refers to (e.g. close).
    HistoryColumnId
);
id_type!(
    /// User recorded as the author of persisted predictions.
    UserId
);

/// Deterministic content hash of a feature matrix (BLAKE3, hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let id = CompanyId(17);
        assert_eq!(serde_json::to_string(&id).unwrap(), "17");
        let back: CompanyId = serde_json::from_str("17").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ids_display_inner_value() {
        assert_eq!(ModelId(3).to_string(), "3");
    }
}
