//! Sliding-window sequences over per-player gameweek histories
//!
//! Windows are cut by position in the sorted history, not by gameweek
//! number: a gap in a player's gameweeks is invisible here.

use crate::data::store::RowStore;
use crate::{Column, FplError, GameweekRow, PlayerId, Result};

/// A training example: `window_length` consecutive feature tuples and the
/// target of the row that follows them
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub player_id: PlayerId,
    /// `[window_length][feature_count]`
    pub sequence: Vec<Vec<f32>>,
    pub target: f32,
    /// Gameweek of the row the target was taken from
    pub target_gameweek: u32,
}

/// The most recent `window_length` feature tuples of a player, for inference
#[derive(Debug, Clone, PartialEq)]
pub struct LatestWindow {
    pub player_id: PlayerId,
    pub sequence: Vec<Vec<f32>>,
    pub last_gameweek: u32,
}

/// All windows produced by one [`build_sequences`] call
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSet {
    pub windows: Vec<Window>,
    pub window_length: usize,
    pub feature_count: usize,
}

impl SequenceSet {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Input sequences, parallel to [`SequenceSet::targets`]
    pub fn sequences(&self) -> Vec<&[Vec<f32>]> {
        self.windows.iter().map(|w| w.sequence.as_slice()).collect()
    }

    pub fn targets(&self) -> Vec<f32> {
        self.windows.iter().map(|w| w.target).collect()
    }

    /// Keep the windows at the given indices, in that order
    pub fn select(&self, indices: &[usize]) -> SequenceSet {
        SequenceSet {
            windows: indices.iter().filter_map(|i| self.windows.get(*i).cloned()).collect(),
            window_length: self.window_length,
            feature_count: self.feature_count,
        }
    }
}

fn validate(store: &RowStore, window_length: usize, features: &[Column]) -> Result<()> {
    if window_length == 0 {
        return Err(FplError::InvalidWindowLength);
    }
    if features.is_empty() {
        return Err(FplError::NoFeatures);
    }
    store.require_columns(features)
}

/// Rows sorted by `(player_id, gameweek)` and grouped per player.
///
/// Groups come out in ascending player id order; the sort is stable, so
/// duplicate `(player_id, gameweek)` pairs keep their input order.
fn sorted_groups(rows: &[GameweekRow]) -> Vec<Vec<&GameweekRow>> {
    let mut sorted: Vec<&GameweekRow> = rows.iter().collect();
    sorted.sort_by_key(|r| (r.player_id, r.gameweek));

    let mut groups: Vec<Vec<&GameweekRow>> = Vec::new();
    for row in sorted {
        match groups.last_mut() {
            Some(group) if group[0].player_id == row.player_id => group.push(row),
            _ => groups.push(vec![row]),
        }
    }
    groups
}

/// Build fixed-length training windows from the whole row store
///
/// A player with `n` rows contributes `max(0, n - window_length)` windows.
/// Returns [`FplError::NoSequences`] when no player has enough history.
pub fn build_sequences(
    store: &RowStore,
    window_length: usize,
    features: &[Column],
    target: Column,
) -> Result<SequenceSet> {
    validate(store, window_length, features)?;
    store.require_columns(&[target])?;

    let groups = sorted_groups(store.rows());
    let mut windows = Vec::new();

    for group in &groups {
        let n = group.len();
        if n <= window_length {
            continue;
        }
        let tuples = group
            .iter()
            .map(|r| r.features(features))
            .collect::<Result<Vec<_>>>()?;
        for i in 0..n - window_length {
            let next = group[i + window_length];
            let value = next.get(target).ok_or(FplError::MissingValue {
                column: target,
                player_id: next.player_id,
                gameweek: next.gameweek,
            })?;
            windows.push(Window {
                player_id: next.player_id,
                sequence: tuples[i..i + window_length].to_vec(),
                target: value,
                target_gameweek: next.gameweek,
            });
        }
    }

    if windows.is_empty() {
        return Err(FplError::NoSequences {
            players: groups.len(),
            window_length,
        });
    }

    log::debug!(
        "Built {} windows of length {} from {} players",
        windows.len(),
        window_length,
        groups.len()
    );

    Ok(SequenceSet {
        windows,
        window_length,
        feature_count: features.len(),
    })
}

/// The last `window_length` feature tuples of one player
///
/// Returns `None` when the player has fewer than `window_length` rows.
pub fn latest_window(
    store: &RowStore,
    player_id: PlayerId,
    window_length: usize,
    features: &[Column],
) -> Result<Option<LatestWindow>> {
    validate(store, window_length, features)?;
    latest_of(&store.player_rows(player_id), window_length, features)
}

/// [`latest_window`] for every player, in ascending player id order
pub fn latest_windows(
    store: &RowStore,
    window_length: usize,
    features: &[Column],
) -> Result<Vec<LatestWindow>> {
    validate(store, window_length, features)?;
    let mut windows = Vec::new();
    for group in sorted_groups(store.rows()) {
        if let Some(window) = latest_of(&group, window_length, features)? {
            windows.push(window);
        }
    }
    Ok(windows)
}

fn latest_of(rows: &[&GameweekRow], window_length: usize, features: &[Column]) -> Result<Option<LatestWindow>> {
    if rows.len() < window_length {
        return Ok(None);
    }
    let tail = &rows[rows.len() - window_length..];
    let Some(last) = tail.last() else {
        return Ok(None);
    };
    Ok(Some(LatestWindow {
        player_id: last.player_id,
        sequence: tail.iter().map(|r| r.features(features)).collect::<Result<_>>()?,
        last_gameweek: last.gameweek,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURES: [Column; 1] = [Column::Minutes];

    /// Player 7: gameweeks 1..=6, minutes [90,45,0,90,90,60], points [6,2,0,9,5,7]
    fn player_seven() -> Vec<GameweekRow> {
        let minutes = [90.0, 45.0, 0.0, 90.0, 90.0, 60.0];
        let points = [6.0, 2.0, 0.0, 9.0, 5.0, 7.0];
        (0..6)
            .map(|i| {
                let mut row = GameweekRow::new(PlayerId(7), i as u32 + 1);
                row.minutes = minutes[i];
                row.points = Some(points[i]);
                row
            })
            .collect()
    }

    fn player(id: i64, gameweeks: &[u32]) -> Vec<GameweekRow> {
        gameweeks
            .iter()
            .map(|gw| {
                let mut row = GameweekRow::new(PlayerId(id), *gw);
                row.minutes = *gw as f32;
                row.goals = id as f32;
                row.points = Some(*gw as f32 * 10.0);
                row
            })
            .collect()
    }

    fn store(rows: Vec<GameweekRow>) -> RowStore {
        RowStore::from_rows(
            rows,
            [Column::Minutes, Column::Goals, Column::Assists, Column::Points],
        )
    }

    #[test]
    fn test_single_window_example() {
        let store = store(player_seven());
        let set = build_sequences(&store, 5, &FEATURES, Column::Points).unwrap();

        assert_eq!(set.len(), 1);
        let w = &set.windows[0];
        assert_eq!(w.player_id, PlayerId(7));
        assert_eq!(
            w.sequence,
            vec![vec![90.0], vec![45.0], vec![0.0], vec![90.0], vec![90.0]]
        );
        assert_eq!(w.target, 7.0);
        assert_eq!(w.target_gameweek, 6);
    }

    #[test]
    fn test_history_equal_to_window_yields_no_sequences() {
        let store = store(player_seven());
        let err = build_sequences(&store, 6, &FEATURES, Column::Points).unwrap_err();
        assert!(matches!(
            err,
            FplError::NoSequences {
                players: 1,
                window_length: 6
            }
        ));
    }

    #[test]
    fn test_empty_store_yields_no_sequences() {
        let store = store(Vec::new());
        let err = build_sequences(&store, 3, &FEATURES, Column::Points).unwrap_err();
        assert!(matches!(err, FplError::NoSequences { players: 0, .. }));
    }

    #[test]
    fn test_window_count_per_player() {
        let mut rows = player(1, &[1, 2, 3, 4, 5, 6, 7]);
        rows.extend(player(2, &[1, 2]));
        rows.extend(player(3, &[1, 2, 3, 4]));
        let store = store(rows);

        let l = 3;
        let set = build_sequences(&store, l, &[Column::Minutes, Column::Goals], Column::Points).unwrap();

        let count = |id: i64| set.windows.iter().filter(|w| w.player_id == PlayerId(id)).count();
        assert_eq!(count(1), 7 - l);
        assert_eq!(count(2), 0);
        assert_eq!(count(3), 4 - l);
        assert_eq!(set.len(), set.targets().len());
        assert_eq!(set.sequences().len(), set.len());

        for w in &set.windows {
            assert_eq!(w.sequence.len(), l);
            assert!(w.sequence.iter().all(|t| t.len() == 2));
        }
    }

    #[test]
    fn test_targets_follow_sequence_in_sorted_order() {
        // Unsorted input with a gap at gameweek 3
        let rows = player(4, &[5, 1, 4, 2, 6]);
        let store = store(rows);
        let set = build_sequences(&store, 2, &FEATURES, Column::Points).unwrap();

        // Sorted gameweeks: 1, 2, 4, 5, 6
        let seqs: Vec<Vec<f32>> = set
            .windows
            .iter()
            .map(|w| w.sequence.iter().map(|t| t[0]).collect())
            .collect();
        assert_eq!(seqs, vec![vec![1.0, 2.0], vec![2.0, 4.0], vec![4.0, 5.0]]);
        assert_eq!(set.targets(), vec![40.0, 50.0, 60.0]);
        let gws: Vec<u32> = set.windows.iter().map(|w| w.target_gameweek).collect();
        assert_eq!(gws, vec![4, 5, 6]);
    }

    #[test]
    fn test_players_are_contiguous_and_ascending() {
        let mut rows = Vec::new();
        // Interleave two players' rows in the input
        for gw in 1..=5 {
            rows.extend(player(9, &[gw]));
            rows.extend(player(3, &[gw]));
        }
        let store = store(rows);
        let set = build_sequences(&store, 2, &FEATURES, Column::Points).unwrap();

        let ids: Vec<i64> = set.windows.iter().map(|w| w.player_id.0).collect();
        assert_eq!(ids, vec![3, 3, 3, 9, 9, 9]);
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut rows = player(1, &[3, 1, 2, 5, 4]);
        rows.extend(player(2, &[2, 1, 3]));
        let store = store(rows);

        let a = build_sequences(&store, 2, &FEATURES, Column::Points).unwrap();
        let b = build_sequences(&store, 2, &FEATURES, Column::Points).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let store = RowStore::from_rows(player_seven(), [Column::Minutes, Column::Points]);

        let err = build_sequences(&store, 2, &[Column::Minutes, Column::Assists], Column::Points)
            .unwrap_err();
        assert!(matches!(err, FplError::MissingColumn { ref column, .. } if column == "assists"));

        let err = build_sequences(&store, 2, &FEATURES, Column::Value).unwrap_err();
        assert!(matches!(err, FplError::MissingColumn { ref column, .. } if column == "value"));
    }

    #[test]
    fn test_invalid_arguments() {
        let store = store(player_seven());
        assert!(matches!(
            build_sequences(&store, 0, &FEATURES, Column::Points),
            Err(FplError::InvalidWindowLength)
        ));
        assert!(matches!(
            build_sequences(&store, 2, &[], Column::Points),
            Err(FplError::NoFeatures)
        ));
    }

    #[test]
    fn test_missing_target_value() {
        let mut rows = player_seven();
        rows[5].points = None;
        let store = store(rows);

        let err = build_sequences(&store, 5, &FEATURES, Column::Points).unwrap_err();
        assert!(matches!(err, FplError::MissingValue { gameweek: 6, .. }));
    }

    #[test]
    fn test_missing_feature_value_fails_closed() {
        let mut rows = player_seven();
        for row in rows.iter_mut() {
            row.value = Some(55.0);
        }
        rows[1].value = None;
        let store = RowStore::from_rows(rows, [Column::Value, Column::Points]);

        let err = build_sequences(&store, 3, &[Column::Value], Column::Points).unwrap_err();
        assert!(matches!(
            err,
            FplError::MissingValue { column: Column::Value, gameweek: 2, .. }
        ));

        // the gap is outside the last three rows
        assert!(latest_window(&store, PlayerId(7), 3, &[Column::Value]).unwrap().is_some());
        let err = latest_window(&store, PlayerId(7), 5, &[Column::Value]).unwrap_err();
        assert!(matches!(err, FplError::MissingValue { gameweek: 2, .. }));
        assert!(latest_windows(&store, 5, &[Column::Value]).is_err());
    }

    #[test]
    fn test_latest_window_example() {
        let store = store(player_seven());
        let latest = latest_window(&store, PlayerId(7), 3, &FEATURES).unwrap().unwrap();

        // Last three rows are gameweeks 4, 5, 6
        assert_eq!(latest.sequence, vec![vec![90.0], vec![90.0], vec![60.0]]);
        assert_eq!(latest.last_gameweek, 6);
    }

    #[test]
    fn test_latest_window_boundaries() {
        let store = store(player_seven());

        let full = latest_window(&store, PlayerId(7), 6, &FEATURES).unwrap().unwrap();
        assert_eq!(full.sequence.len(), 6);
        assert_eq!(full.sequence[0], vec![90.0]);

        assert!(latest_window(&store, PlayerId(7), 7, &FEATURES).unwrap().is_none());
        assert!(latest_window(&store, PlayerId(8), 1, &FEATURES).unwrap().is_none());
    }

    #[test]
    fn test_latest_windows_one_per_player() {
        let mut rows = player(2, &[1, 2, 3]);
        rows.extend(player(1, &[4, 2, 3, 1]));
        rows.extend(player(5, &[1]));
        let store = store(rows);

        let latest = latest_windows(&store, 3, &FEATURES).unwrap();
        let ids: Vec<i64> = latest.iter().map(|w| w.player_id.0).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(latest[0].sequence, vec![vec![2.0], vec![3.0], vec![4.0]]);
        assert_eq!(latest[1].sequence, vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn test_select_preserves_order() {
        let store = store(player(1, &[1, 2, 3, 4, 5]));
        let set = build_sequences(&store, 1, &FEATURES, Column::Points).unwrap();
        let picked = set.select(&[3, 0]);

        assert_eq!(picked.targets(), vec![50.0, 20.0]);
        assert_eq!(picked.window_length, 1);
    }
}
