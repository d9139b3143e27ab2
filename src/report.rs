//! Reporting of predictions and evaluation results
//!
//! Console tables plus CSV files under the output directory.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::data::store::{Lookups, RowStore};
use crate::features::SequenceSet;
use crate::{PlayerId, Position, Prediction, Result};

/// Output format for the `predict` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// One point of the price vs predicted points scatter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub player_id: PlayerId,
    pub name: String,
    pub position: String,
    pub color: String,
    pub price: f32,
    pub predicted_points: f32,
}

/// Absolute error of one evaluated window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRow {
    pub player_id: PlayerId,
    pub name: String,
    pub gameweek: u32,
    pub actual: f32,
    pub predicted: f32,
    pub abs_error: f32,
}

/// Log line for one prediction
pub fn prediction_line(prediction: &Prediction) -> String {
    format!(
        "{} (ID: {}): Predicted fantasy points for next gameweek = {:.2}",
        prediction.name, prediction.player_id, prediction.predicted_points
    )
}

/// Attach display names, keeping ascending player id order
pub fn name_predictions(predictions: &BTreeMap<PlayerId, f32>, lookups: &Lookups) -> Vec<Prediction> {
    predictions
        .iter()
        .map(|(id, points)| Prediction {
            player_id: *id,
            name: lookups.display_name(*id),
            predicted_points: *points,
        })
        .collect()
}

/// Highest predicted points first; ties by player id
pub fn rank_predictions(predictions: &[Prediction], top: Option<usize>) -> Vec<Prediction> {
    let mut ranked = predictions.to_vec();
    ranked.sort_by(|a, b| {
        b.predicted_points
            .total_cmp(&a.predicted_points)
            .then(a.player_id.cmp(&b.player_id))
    });
    if let Some(n) = top {
        ranked.truncate(n);
    }
    ranked
}

/// Latest price per player in millions, from the unnormalized row store
///
/// Players whose latest row carries no `value` fall back to `now_cost`.
pub fn latest_prices(store: &RowStore, lookups: &Lookups) -> BTreeMap<PlayerId, f32> {
    let mut prices: BTreeMap<PlayerId, f32> = lookups
        .now_cost
        .iter()
        .map(|(id, cost)| (*id, cost / 10.0))
        .collect();
    for (id, row) in store.latest_rows() {
        if let Some(value) = row.value {
            prices.insert(id, value / 10.0);
        }
    }
    prices
}

/// Join predictions with prices and positions, top `top_n` by predicted points
pub fn price_vs_points(
    predictions: &[Prediction],
    prices: &BTreeMap<PlayerId, f32>,
    lookups: &Lookups,
    top_n: usize,
) -> Vec<PricePoint> {
    rank_predictions(predictions, None)
        .into_iter()
        .filter_map(|p| {
            let Some(price) = prices.get(&p.player_id) else {
                log::debug!("No price for {}; left out of the price report", p.name);
                return None;
            };
            let position = lookups.position(p.player_id);
            Some(PricePoint {
                player_id: p.player_id,
                name: p.name,
                position: position.to_string(),
                color: position.color().to_string(),
                price: *price,
                predicted_points: p.predicted_points,
            })
        })
        .take(top_n)
        .collect()
}

/// The `top` windows with the largest absolute error, largest first
pub fn largest_errors(set: &SequenceSet, predictions: &[f32], lookups: &Lookups, top: usize) -> Vec<ErrorRow> {
    let mut rows: Vec<ErrorRow> = set
        .windows
        .iter()
        .zip(predictions.iter())
        .map(|(w, p)| ErrorRow {
            player_id: w.player_id,
            name: lookups.display_name(w.player_id),
            gameweek: w.target_gameweek,
            actual: w.target,
            predicted: *p,
            abs_error: (w.target - p).abs(),
        })
        .collect();

    rows.sort_by(|a, b| b.abs_error.total_cmp(&a.abs_error));
    rows.truncate(top);
    rows
}

/// Write serializable rows as CSV, creating parent directories
pub fn write_csv<T: Serialize, P: AsRef<Path>>(path: P, rows: &[T]) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(path.to_path_buf())
}

/// Render predictions in the requested format
pub fn render_predictions(predictions: &[Prediction], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(predictions_table(predictions)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(predictions)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for p in predictions {
                writer.serialize(p)?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| crate::FplError::Io(e.into_error()))?;
            String::from_utf8(bytes).map_err(|e| crate::FplError::Parse(e.to_string()))
        }
    }
}

pub fn predictions_table(predictions: &[Prediction]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>4}  {:>6}  {:<28} {:>8}", "#", "ID", "Player", "Points");
    let _ = writeln!(out, "{}", "─".repeat(50));
    for (i, p) in predictions.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>4}  {:>6}  {:<28} {:>8.2}",
            i + 1,
            p.player_id,
            truncate(&p.name, 28),
            p.predicted_points
        );
    }
    out
}

pub fn price_table(points: &[PricePoint]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Price vs Predicted Points (top {})", points.len());
    let _ = writeln!(out, "{:<28} {:<4} {:>7} {:>8}", "Player", "Pos", "Price", "Points");
    let _ = writeln!(out, "{}", "─".repeat(50));
    for p in points {
        let _ = writeln!(
            out,
            "{:<28} {:<4} {:>6.1}m {:>8.2}",
            truncate(&p.name, 28),
            p.position,
            p.price,
            p.predicted_points
        );
    }
    out
}

pub fn errors_table(rows: &[ErrorRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Largest Prediction Errors");
    let _ = writeln!(
        out,
        "{:<28} {:>4} {:>7} {:>9} {:>7}",
        "Player", "GW", "Actual", "Predicted", "Error"
    );
    let _ = writeln!(out, "{}", "─".repeat(60));
    for r in rows {
        let _ = writeln!(
            out,
            "{:<28} {:>4} {:>7.1} {:>9.2} {:>7.2}",
            truncate(&r.name, 28),
            r.gameweek,
            r.actual,
            r.predicted,
            r.abs_error
        );
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}

/// Legend entry for a position in the price report
pub fn position_legend() -> String {
    [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Forward,
    ]
    .iter()
    .map(|p| format!("{}={}", p, p.color()))
    .collect::<Vec<_>>()
    .join(", ")
}
