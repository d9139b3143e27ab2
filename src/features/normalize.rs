//! Z-score normalization of feature columns
//!
//! Fitted once over the whole row store, before any window is cut.

use serde::{Deserialize, Serialize};

use crate::data::store::RowStore;
use crate::{Column, Result};

/// Mean and standard deviation of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: Column,
    pub mean: f32,
    pub std: f32,
}

impl ColumnStats {
    pub fn normalize(&self, value: f32) -> f32 {
        (value - self.mean) / self.std
    }
}

/// Feature normalization parameters for z-score normalization of inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureNormalization {
    pub columns: Vec<ColumnStats>,
}

impl FeatureNormalization {
    /// Compute per-column mean and population std over every row
    ///
    /// A column with zero variance gets a std of 1.0 so it maps to 0.
    pub fn fit(store: &RowStore, columns: &[Column]) -> Result<Self> {
        store.require_columns(columns)?;

        let stats = columns
            .iter()
            .map(|column| {
                let values: Vec<f32> = store.rows().iter().filter_map(|r| r.get(*column)).collect();
                let mean = mean(&values);
                let std = std(&values, mean);
                ColumnStats {
                    column: *column,
                    mean,
                    std: if std > f32::EPSILON { std } else { 1.0 },
                }
            })
            .collect();

        Ok(FeatureNormalization { columns: stats })
    }

    /// Standardize the fitted columns of every row in place
    pub fn apply(&self, store: &mut RowStore) {
        for row in store.rows_mut() {
            for stats in &self.columns {
                if let Some(v) = row.get(stats.column) {
                    row.set(stats.column, stats.normalize(v));
                }
            }
        }
    }

    pub fn get(&self, column: Column) -> Option<&ColumnStats> {
        self.columns.iter().find(|s| s.column == column)
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn std(values: &[f32], mean: f32) -> f32 {
    if values.is_empty() {
        return 1.0;
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / values.len() as f32;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FplError, GameweekRow, PlayerId};

    fn rows() -> Vec<GameweekRow> {
        [(90.0, 0.0, 2.0), (0.0, 0.0, 0.0), (90.0, 0.0, 9.0), (60.0, 0.0, 1.0)]
            .iter()
            .enumerate()
            .map(|(i, (minutes, goals, points))| {
                let mut row = GameweekRow::new(PlayerId(1), i as u32 + 1);
                row.minutes = *minutes;
                row.goals = *goals;
                row.points = Some(*points);
                row
            })
            .collect()
    }

    #[test]
    fn test_fit_and_apply() {
        let mut store = RowStore::from_rows(rows(), [Column::Minutes, Column::Goals, Column::Points]);
        let norm = FeatureNormalization::fit(&store, &[Column::Minutes, Column::Goals]).unwrap();

        let minutes = norm.get(Column::Minutes).unwrap();
        assert!((minutes.mean - 60.0).abs() < 1e-4);
        // population std of [90, 0, 90, 60] = sqrt(1350)
        assert!((minutes.std - 1350f32.sqrt()).abs() < 1e-3);

        // constant column
        let goals = norm.get(Column::Goals).unwrap();
        assert_eq!(goals.std, 1.0);

        norm.apply(&mut store);
        let normalized: Vec<f32> = store.rows().iter().map(|r| r.minutes).collect();
        let m: f32 = normalized.iter().sum::<f32>() / normalized.len() as f32;
        assert!(m.abs() < 1e-5);
        assert!(store.rows().iter().all(|r| r.goals == 0.0));

        // target untouched
        let points: Vec<Option<f32>> = store.rows().iter().map(|r| r.points).collect();
        assert_eq!(points, vec![Some(2.0), Some(0.0), Some(9.0), Some(1.0)]);
    }

    #[test]
    fn test_roundtrip_value() {
        let stats = ColumnStats {
            column: Column::Minutes,
            mean: 60.0,
            std: 30.0,
        };
        assert_eq!(stats.normalize(90.0), 1.0);
    }

    #[test]
    fn test_fit_requires_columns() {
        let store = RowStore::from_rows(rows(), [Column::Minutes]);
        let err = FeatureNormalization::fit(&store, &[Column::Assists]).unwrap_err();
        assert!(matches!(err, FplError::MissingColumn { .. }));
    }
}
