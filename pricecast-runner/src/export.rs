//! Export of JSON reports and CSV diagnostics.
//!
//! - **JSON**: scoring reports, company reports and batch summaries
//! - **CSV**: forecasts, per-unit fit metrics, feature importance and
//!   mutual information of the tree backend

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use pricecast_core::backend::{Diagnostics, FeatureScore};

use crate::runner::{BatchSummary, UnitStatus};
use crate::scoring::{CompanyReport, ScoringReport};

// ─── JSON export ────────────────────────────────────────────────────

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string_pretty(value).with_context(|| format!("failed to serialize {what} to JSON"))
}

pub fn export_report_json(report: &ScoringReport) -> Result<String> {
    to_json(report, "ScoringReport")
}

pub fn export_company_report_json(report: &CompanyReport) -> Result<String> {
    to_json(report, "CompanyReport")
}

pub fn export_summary_json(summary: &BatchSummary) -> Result<String> {
    to_json(summary, "BatchSummary")
}

// ─── CSV export ─────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

/// Every forecast point of every completed unit.
///
/// Columns: company_id, ticker, backend, model_id, date, value
pub fn export_forecasts_csv(summary: &BatchSummary) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["company_id", "ticker", "backend", "model_id", "date", "value"])?;
    for unit in &summary.units {
        let Some(run) = &unit.run else { continue };
        for point in &run.points {
            wtr.write_record([
                &unit.company_id.to_string(),
                &unit.ticker,
                unit.backend.name(),
                &unit.model_id.to_string(),
                &point.date.to_string(),
                &format!("{:.6}", point.value),
            ])?;
        }
    }
    finish(wtr)
}

/// One row per unit with its status and in-sample fit metrics.
///
/// Columns: company_id, ticker, backend, model_id, status, training_rows,
/// rmse, mae, mape, r2, elapsed_ms
pub fn export_fit_metrics_csv(summary: &BatchSummary) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "company_id",
        "ticker",
        "backend",
        "model_id",
        "status",
        "training_rows",
        "rmse",
        "mae",
        "mape",
        "r2",
        "elapsed_ms",
    ])?;
    for unit in &summary.units {
        let status = match unit.status {
            UnitStatus::Completed { .. } => "completed",
            UnitStatus::Skipped { .. } => "skipped",
            UnitStatus::Failed { .. } => "failed",
            UnitStatus::Panicked { .. } => "panicked",
        };
        let metrics = unit.run.as_ref().and_then(|r| r.fit_metrics);
        let rows = unit
            .run
            .as_ref()
            .map(|r| r.training_rows.to_string())
            .unwrap_or_default();
        wtr.write_record([
            &unit.company_id.to_string(),
            &unit.ticker,
            unit.backend.name(),
            &unit.model_id.to_string(),
            status,
            &rows,
            &opt(metrics.map(|m| m.rmse)),
            &opt(metrics.map(|m| m.mae)),
            &opt(metrics.map(|m| m.mape)),
            &opt(metrics.and_then(|m| m.r2)),
            &unit.elapsed_ms.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Ranked feature scores (importance or mutual information).
pub fn export_feature_scores_csv(scores: &[FeatureScore]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["feature", "score"])?;
    for s in scores {
        wtr.write_record([s.feature.as_str(), &format!("{:.6}", s.score)])?;
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set of one batch run.
///
/// Creates `run_{run_id}/` under `output_dir` containing:
/// - `summary.json`: the full `BatchSummary`
/// - `forecasts.csv` and `fit_metrics.csv`
/// - `{ticker}_importance.csv` and `{ticker}_mutual_information.csv` for
///   every completed tree unit
///
/// Returns the path to the created directory.
pub fn save_artifacts(summary: &BatchSummary, run_id: &str, output_dir: &Path) -> Result<PathBuf> {
    let short_id: String = run_id.chars().take(12).collect();
    let run_dir = output_dir.join(format!("run_{short_id}"));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write(&run_dir.join("summary.json"), &export_summary_json(summary)?)?;
    write(&run_dir.join("forecasts.csv"), &export_forecasts_csv(summary)?)?;
    write(&run_dir.join("fit_metrics.csv"), &export_fit_metrics_csv(summary)?)?;

    for run in summary.runs() {
        let Diagnostics::Trees(trees) = &run.diagnostics else {
            continue;
        };
        let ticker = summary
            .units
            .iter()
            .find(|u| u.company_id == run.company_id)
            .map_or_else(|| run.company_id.to_string(), |u| u.ticker.clone());
        write(
            &run_dir.join(format!("{ticker}_importance.csv")),
            &export_feature_scores_csv(&trees.feature_importance)?,
        )?;
        write(
            &run_dir.join(format!("{ticker}_mutual_information.csv")),
            &export_feature_scores_csv(&trees.mutual_information)?,
        )?;
    }
    Ok(run_dir)
}

/// Write a scoring report next to other artifacts.
pub fn save_report(report: &ScoringReport, path: &Path) -> Result<()> {
    write(path, &export_report_json(report)?)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
