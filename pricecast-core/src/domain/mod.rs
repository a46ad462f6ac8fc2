//! Domain types shared by the forecasting pipeline and the scoring engine.

pub mod ids;
pub mod records;

pub use ids::{CompanyId, DatasetHash, HistoryColumnId, ModelId, SectorId, UserId};
pub use records::{
    Company, ForecastPoint, MacroPoint, ModelEntry, PredictionRecord, PriceBar, StatementLine,
};
