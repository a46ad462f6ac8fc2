//! Flat-table exchange with storage and ETL collaborators.
//!
//! Feature matrices travel as one polars frame per company:
//! `company_id`, `date`, then one Float64 column per feature. Forecasts
//! travel as `company_id`, `model_id`, `date`, `value`.

use chrono::{DateTime, Duration, NaiveDate};
use polars::prelude::*;

use crate::domain::{CompanyId, ForecastPoint, ModelId};
use crate::error::ForecastError;

use super::matrix::{ColumnRole, FeatureColumn, FeatureMatrix};

const COMPANY_COLUMN: &str = "company_id";
const MODEL_COLUMN: &str = "model_id";
const DATE_COLUMN: &str = "date";

fn table_error(err: PolarsError) -> ForecastError {
    ForecastError::Integrity(format!("flat table: {err}"))
}

fn epoch() -> NaiveDate {
    DateTime::UNIX_EPOCH.date_naive()
}

fn date_series(dates: &[NaiveDate]) -> Result<Series, ForecastError> {
    let days: Vec<i32> = dates
        .iter()
        .map(|d| d.signed_duration_since(epoch()).num_days() as i32)
        .collect();
    Series::new(DATE_COLUMN.into(), days)
        .cast(&DataType::Date)
        .map_err(table_error)
}

fn read_dates(df: &DataFrame) -> Result<Vec<NaiveDate>, ForecastError> {
    let days = df
        .column(DATE_COLUMN)
        .map_err(table_error)?
        .cast(&DataType::Int32)
        .map_err(table_error)?;
    let days = days.i32().map_err(table_error)?;
    days.into_iter()
        .map(|d| {
            d.map(|d| epoch() + Duration::days(i64::from(d)))
                .ok_or_else(|| ForecastError::Integrity("null date in flat table".into()))
        })
        .collect()
}

impl FeatureMatrix {
    pub fn to_frame(&self) -> Result<DataFrame, ForecastError> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.n_features() + 2);
        columns.push(Series::new(COMPANY_COLUMN.into(), vec![self.company_id().0; self.n_rows()]).into());
        columns.push(date_series(self.dates())?.into());
        for feature in self.columns() {
            columns.push(Series::new(feature.name.as_str().into(), feature.values.clone()).into());
        }
        DataFrame::new(columns).map_err(table_error)
    }

    /// Rebuild a matrix from its flat form. Roles are recovered from the
    /// column-name prefixes; nulls become NaN.
    pub fn from_frame(df: &DataFrame) -> Result<FeatureMatrix, ForecastError> {
        let ids = df
            .column(COMPANY_COLUMN)
            .map_err(table_error)?
            .cast(&DataType::Int64)
            .map_err(table_error)?;
        let company_id = ids
            .i64()
            .map_err(table_error)?
            .get(0)
            .map(CompanyId)
            .ok_or_else(|| ForecastError::DataSufficiency("empty flat table".into()))?;

        let dates = read_dates(df)?;
        let mut columns = Vec::new();
        for column in df.get_columns() {
            let name = column.name().as_str();
            if name == COMPANY_COLUMN || name == DATE_COLUMN {
                continue;
            }
            let values = column.cast(&DataType::Float64).map_err(table_error)?;
            let values = values
                .f64()
                .map_err(table_error)?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            columns.push(FeatureColumn {
                name: name.to_string(),
                role: ColumnRole::from_column_name(name),
                values,
            });
        }
        FeatureMatrix::new(company_id, dates, columns)
    }
}

/// Flat forecast table for one (company, model) rollout.
pub fn forecast_frame(
    company_id: CompanyId,
    model_id: ModelId,
    points: &[ForecastPoint],
) -> Result<DataFrame, ForecastError> {
    let dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    DataFrame::new(vec![
        Series::new(COMPANY_COLUMN.into(), vec![company_id.0; points.len()]).into(),
        Series::new(MODEL_COLUMN.into(), vec![model_id.0; points.len()]).into(),
        date_series(&dates)?.into(),
        Series::new("value".into(), values).into(),
    ])
    .map_err(table_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn sample() -> FeatureMatrix {
        FeatureMatrix::new(
            CompanyId(4),
            vec![d(1), d(4), d(5)],
            vec![
                FeatureColumn {
                    name: "close".into(),
                    role: ColumnRole::Target,
                    values: vec![10.0, 11.0, 12.0],
                },
                FeatureColumn {
                    name: "9_close".into(),
                    role: ColumnRole::Peer {
                        company_id: CompanyId(9),
                    },
                    values: vec![1.0, f64::NAN, 3.0],
                },
                FeatureColumn {
                    name: "macro_selic".into(),
                    role: ColumnRole::Macro,
                    values: vec![0.5, 0.5, 0.5],
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn frame_layout_is_company_date_then_features() {
        let df = sample().to_frame().unwrap();
        let names: Vec<&str> = df.get_column_names().into_iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["company_id", "date", "close", "9_close", "macro_selic"]);
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn matrix_survives_the_flat_table() {
        let original = sample();
        let back = FeatureMatrix::from_frame(&original.to_frame().unwrap()).unwrap();
        assert_eq!(back.company_id(), CompanyId(4));
        assert_eq!(back.dates(), original.dates());
        assert_eq!(back.columns()[1].role, original.columns()[1].role);
        assert!(back.columns()[1].values[1].is_nan());
        assert_eq!(back.columns()[2].values, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn forecast_frame_has_one_row_per_point() {
        let points = vec![
            ForecastPoint {
                date: d(6),
                value: 12.5,
            },
            ForecastPoint {
                date: d(7),
                value: 12.7,
            },
        ];
        let df = forecast_frame(CompanyId(4), ModelId(3), &points).unwrap();
        assert_eq!(df.height(), 2);
        let values = df.column("value").unwrap().f64().unwrap();
        assert_eq!(values.get(1), Some(12.7));
    }
}
