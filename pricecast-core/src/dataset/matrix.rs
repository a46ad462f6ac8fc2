//! The aligned per-company feature table.

use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::domain::{CompanyId, DatasetHash};
use crate::error::ForecastError;

/// Name of the forecast target column.
pub const TARGET_COLUMN: &str = "close";

/// Own price columns merged onto the close axis, in column order.
pub const OWN_PRICE_FIELDS: [&str; 4] = ["open", "high", "low", "volume"];

/// Price fields taken from each sector peer.
pub const PEER_PRICE_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

pub const MACRO_PREFIX: &str = "macro_";
pub const ACCOUNT_PREFIX: &str = "acct_";

/// Role of a feature column, assigned once by the dataset builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnRole {
    /// The company's own close; the value being forecast.
    Target,
    /// The company's own open/high/low/volume.
    OwnPrice,
    /// A price field of a sector peer.
    Peer { company_id: CompanyId },
    Macro,
    Account,
}

impl ColumnRole {
    pub fn is_target(&self) -> bool {
        matches!(self, ColumnRole::Target)
    }

    pub fn is_exogenous(&self) -> bool {
        !self.is_target()
    }

    /// Recover the role from the column-name prefix convention.
    ///
    /// Used only when a matrix arrives as a flat table from outside.
    pub fn from_column_name(name: &str) -> Self {
        if name == TARGET_COLUMN {
            return ColumnRole::Target;
        }
        if name.starts_with(MACRO_PREFIX) {
            return ColumnRole::Macro;
        }
        if name.starts_with(ACCOUNT_PREFIX) {
            return ColumnRole::Account;
        }
        if let Some((prefix, _)) = name.split_once('_') {
            if let Ok(id) = prefix.parse::<i64>() {
                return ColumnRole::Peer {
                    company_id: CompanyId(id),
                };
            }
        }
        ColumnRole::OwnPrice
    }
}

/// Column name of a peer price field.
pub fn peer_column_name(peer: CompanyId, field: &str) -> String {
    format!("{peer}_{field}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub role: ColumnRole,
    pub values: Vec<f64>,
}

/// Dense daily feature table for one company.
///
/// Dates are strictly increasing. Every column has one value per date.
/// The target column, when present, is always column 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    company_id: CompanyId,
    dates: Vec<NaiveDate>,
    columns: Vec<FeatureColumn>,
}

impl FeatureMatrix {
    /// Assemble a matrix, validating shape, date order, and column order.
    pub fn new(
        company_id: CompanyId,
        dates: Vec<NaiveDate>,
        mut columns: Vec<FeatureColumn>,
    ) -> Result<Self, ForecastError> {
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ForecastError::Integrity(format!(
                "dates for company {company_id} are not strictly increasing"
            )));
        }
        if let Some(bad) = columns.iter().find(|c| c.values.len() != dates.len()) {
            return Err(ForecastError::Integrity(format!(
                "column '{}' has {} values for {} dates",
                bad.name,
                bad.values.len(),
                dates.len()
            )));
        }
        if columns.iter().filter(|c| c.role.is_target()).count() > 1 {
            return Err(ForecastError::Integrity(
                "more than one target column".into(),
            ));
        }
        // Target first, then exogenous in their given order.
        columns.sort_by_key(|c| !c.role.is_target());
        Ok(Self {
            company_id,
            dates,
            columns,
        })
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Position of the target column among the features.
    pub fn target_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.role.is_target())
    }

    pub fn target(&self) -> Option<&[f64]> {
        self.target_index().map(|i| self.columns[i].values.as_slice())
    }

    pub fn count_role(&self, pred: impl Fn(&ColumnRole) -> bool) -> usize {
        self.columns.iter().filter(|c| pred(&c.role)).count()
    }

    /// Drop columns with no finite value, then rows with any non-finite value.
    ///
    /// Returns the number of rows removed.
    pub fn drop_incomplete(&mut self) -> usize {
        self.columns
            .retain(|c| c.role.is_target() || c.values.iter().any(|v| v.is_finite()));

        let keep: Vec<bool> = (0..self.dates.len())
            .map(|i| self.columns.iter().all(|c| c.values[i].is_finite()))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed == 0 {
            return 0;
        }

        let mut idx = 0;
        self.dates.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
        for column in &mut self.columns {
            let mut idx = 0;
            column.values.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
        removed
    }

    /// Row-major `n_rows × n_features` copy of the values.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.n_rows(), self.n_features()), |(r, c)| {
            self.columns[c].values[r]
        })
    }

    /// Keep only the last `n` rows.
    pub fn tail(&self, n: usize) -> FeatureMatrix {
        let start = self.n_rows().saturating_sub(n);
        FeatureMatrix {
            company_id: self.company_id,
            dates: self.dates[start..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| FeatureColumn {
                    name: c.name.clone(),
                    role: c.role,
                    values: c.values[start..].to_vec(),
                })
                .collect(),
        }
    }

    /// BLAKE3 digest over dates, column names and value bits.
    pub fn content_hash(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.company_id.0.to_le_bytes());
        for date in &self.dates {
            hasher.update(date.to_string().as_bytes());
        }
        for column in &self.columns {
            hasher.update(column.name.as_bytes());
            for v in &column.values {
                hasher.update(&v.to_bits().to_le_bytes());
            }
        }
        DatasetHash(hasher.finalize().to_hex().to_string())
    }
}
