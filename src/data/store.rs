//! Local row store and lookup tables
//!
//! Reads the downloaded directory tree into typed gameweek rows. The
//! dynamically named CSV columns are resolved here, once, so everything
//! downstream works on [`GameweekRow`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::data::fixtures::Fixture;
use crate::{Column, FplError, GameweekRow, PlayerId, Position, Result};

/// Source column renames, applied only when the canonical name is absent
pub const COLUMN_RENAMES: [(&str, &str); 3] = [
    ("total_points", "points"),
    ("mins", "minutes"),
    ("goals_scored", "goals"),
];

/// All gameweek rows plus the set of columns every source file supplied
#[derive(Debug, Clone, Default)]
pub struct RowStore {
    rows: Vec<GameweekRow>,
    columns: BTreeSet<Column>,
}

impl RowStore {
    pub fn from_rows(rows: Vec<GameweekRow>, columns: impl IntoIterator<Item = Column>) -> Self {
        RowStore {
            rows,
            columns: columns.into_iter().collect(),
        }
    }

    /// Load every `players/*/gw.csv` below `data_dir`
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let players_dir = data_dir.as_ref().join("players");
        if !players_dir.is_dir() {
            log::warn!("No players directory at {}", players_dir.display());
            return Ok(Self::default());
        }

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(&players_dir)? {
            let path = entry?.path().join("gw.csv");
            if path.is_file() {
                files.push(path);
            }
        }
        // read_dir order is platform dependent
        files.sort();

        let mut rows = Vec::new();
        let mut columns: Option<BTreeSet<Column>> = None;
        for path in &files {
            let text = std::fs::read_to_string(path)?;
            let (file_rows, file_columns) = parse_gameweek_csv(&text, &path.display().to_string())?;
            rows.extend(file_rows);
            columns = Some(match columns {
                None => file_columns,
                Some(acc) => acc.intersection(&file_columns).copied().collect(),
            });
        }

        let store = RowStore {
            rows,
            columns: columns.unwrap_or_default(),
        };
        log::info!(
            "Aggregated player gameweek data: {} rows from {} files",
            store.len(),
            files.len()
        );
        log::debug!("Player gameweek columns: {:?}", store.columns);
        Ok(store)
    }

    pub fn rows(&self) -> &[GameweekRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [GameweekRow] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &BTreeSet<Column> {
        &self.columns
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    /// Fail with a missing-column error unless every column is present
    pub fn require_columns(&self, columns: &[Column]) -> Result<()> {
        match columns.iter().find(|c| !self.has_column(**c)) {
            Some(missing) => Err(FplError::MissingColumn {
                column: missing.name().to_string(),
                location: "player gameweek data".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Distinct player ids, ascending
    pub fn player_ids(&self) -> Vec<PlayerId> {
        let ids: BTreeSet<PlayerId> = self.rows.iter().map(|r| r.player_id).collect();
        ids.into_iter().collect()
    }

    /// Rows of one player, sorted by gameweek
    pub fn player_rows(&self, player_id: PlayerId) -> Vec<&GameweekRow> {
        let mut rows: Vec<&GameweekRow> =
            self.rows.iter().filter(|r| r.player_id == player_id).collect();
        rows.sort_by_key(|r| r.gameweek);
        rows
    }

    /// The highest-gameweek row of every player
    pub fn latest_rows(&self) -> BTreeMap<PlayerId, &GameweekRow> {
        let mut latest: BTreeMap<PlayerId, &GameweekRow> = BTreeMap::new();
        for row in &self.rows {
            let entry = latest.entry(row.player_id).or_insert(row);
            if row.gameweek >= entry.gameweek {
                *entry = row;
            }
        }
        latest
    }

    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            players: self.player_ids().len(),
            rows: self.rows.len(),
            first_gameweek: self.rows.iter().map(|r| r.gameweek).min(),
            last_gameweek: self.rows.iter().map(|r| r.gameweek).max(),
            columns: self.columns.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSummary {
    pub players: usize,
    pub rows: usize,
    pub first_gameweek: Option<u32>,
    pub last_gameweek: Option<u32>,
    pub columns: Vec<Column>,
}

/// Parse one player file into typed rows
///
/// `player_id` and `gameweek` are mandatory; numeric columns are optional and
/// returned in the present-column set. Empty cells in `points`/`value` become
/// `None`; empty feature cells are an error.
pub fn parse_gameweek_csv(text: &str, location: &str) -> Result<(Vec<GameweekRow>, BTreeSet<Column>)> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let raw_headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let headers = apply_renames(&raw_headers);

    let find = |name: &str| headers.iter().position(|h| h == name);
    let missing = |name: &str| FplError::MissingColumn {
        column: name.to_string(),
        location: location.to_string(),
    };
    let player_idx = find("player_id").ok_or_else(|| missing("player_id"))?;
    let gameweek_idx = find("gameweek").ok_or_else(|| missing("gameweek"))?;

    let column_idx: Vec<(Column, usize)> = Column::ALL
        .iter()
        .filter_map(|c| find(c.name()).map(|i| (*c, i)))
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or("").trim();
        let at = || format!("{} row {}", location, line + 1);

        let player_id = parse_integer(cell(player_idx))
            .ok_or_else(|| FplError::Parse(format!("invalid player_id '{}' at {}", cell(player_idx), at())))?;
        let gameweek = parse_integer(cell(gameweek_idx))
            .and_then(|g| u32::try_from(g).ok())
            .ok_or_else(|| FplError::Parse(format!("invalid gameweek '{}' at {}", cell(gameweek_idx), at())))?;

        let mut row = GameweekRow::new(PlayerId(player_id), gameweek);
        for (column, idx) in &column_idx {
            let raw = cell(*idx);
            if raw.is_empty() && matches!(column, Column::Points | Column::Value) {
                continue;
            }
            let value: f32 = raw.parse().map_err(|_| {
                FplError::Parse(format!("invalid {} '{}' at {}", column, raw, at()))
            })?;
            row.set(*column, value);
        }
        rows.push(row);
    }

    Ok((rows, column_idx.into_iter().map(|(c, _)| c).collect()))
}

/// Rename source headers to canonical names where the canonical name is absent
pub fn apply_renames(headers: &[String]) -> Vec<String> {
    let mut renamed = headers.to_vec();
    for (from, to) in COLUMN_RENAMES {
        if renamed.iter().any(|h| h == to) {
            continue;
        }
        if let Some(h) = renamed.iter_mut().find(|h| h.as_str() == from) {
            log::debug!("Renamed '{}' to '{}'", from, to);
            *h = to.to_string();
        }
    }
    renamed
}

/// Integers in the mirror are sometimes written as floats ("3.0")
fn parse_integer(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64)
            .map(|v| v as i64)
    })
}

/// A row of `player_idlist.csv`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub first_name: String,
    pub second_name: String,
}

impl PlayerInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.second_name)
    }
}

/// Read `player_idlist.csv`
pub fn read_player_idlist<P: AsRef<Path>>(path: P) -> Result<Vec<PlayerInfo>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut players = Vec::new();
    for record in reader.deserialize() {
        players.push(record?);
    }
    Ok(players)
}

#[derive(Debug, Clone, Deserialize)]
struct RawPlayer {
    id: i64,
    element_type: i64,
    #[serde(default)]
    now_cost: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamInfo {
    pub id: i64,
    pub name: String,
}

/// Reference tables used for naming and reporting
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub players: HashMap<PlayerId, PlayerInfo>,
    pub positions: HashMap<PlayerId, Position>,
    /// Current price from `players_raw.csv`, in tenths
    pub now_cost: HashMap<PlayerId, f32>,
    pub teams: HashMap<i64, String>,
    pub fixtures: Vec<Fixture>,
}

impl Lookups {
    /// Load whichever lookup files exist in `data_dir`
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let dir = data_dir.as_ref();
        let mut lookups = Lookups::default();

        let idlist = dir.join("player_idlist.csv");
        if idlist.exists() {
            lookups.players = read_player_idlist(&idlist)?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();
        } else {
            log::warn!("{} not found; players will be reported by id", idlist.display());
        }

        let raw = dir.join("players_raw.csv");
        if raw.exists() {
            let mut reader = csv::Reader::from_path(&raw)?;
            for record in reader.deserialize::<RawPlayer>() {
                let p = record?;
                lookups
                    .positions
                    .insert(PlayerId(p.id), Position::from_element_type(p.element_type));
                if let Some(cost) = p.now_cost {
                    lookups.now_cost.insert(PlayerId(p.id), cost);
                }
            }
        } else {
            log::warn!("{} not found; positions are unknown", raw.display());
        }

        let teams = dir.join("teams.csv");
        if teams.exists() {
            let mut reader = csv::Reader::from_path(&teams)?;
            for record in reader.deserialize::<TeamInfo>() {
                let t = record?;
                lookups.teams.insert(t.id, t.name);
            }
        }

        let fixtures = dir.join("fixtures.csv");
        if fixtures.exists() {
            lookups.fixtures = crate::data::fixtures::read_fixtures(&fixtures)?;
        }

        Ok(lookups)
    }

    /// "First Second", or "Player {id}" when the id is unknown
    pub fn display_name(&self, id: PlayerId) -> String {
        self.players
            .get(&id)
            .map(|p| p.full_name())
            .unwrap_or_else(|| format!("Player {}", id))
    }

    pub fn position(&self, id: PlayerId) -> Position {
        self.positions.get(&id).copied().unwrap_or(Position::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_renames_only_when_canonical_absent() {
        let headers: Vec<String> = ["total_points", "mins", "goals_scored", "goals"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let renamed = apply_renames(&headers);
        assert_eq!(renamed, vec!["points", "minutes", "goals_scored", "goals"]);
    }

    #[test]
    fn test_parse_gameweek_csv() {
        let text = "gameweek,total_points,minutes,goals_scored,assists,value,player_id\n\
                    1,6,90,1,0,55,7\n\
                    2,,45,0,1,55.0,7\n";
        let (rows, columns) = parse_gameweek_csv(text, "test").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].player_id, PlayerId(7));
        assert_eq!(rows[0].points, Some(6.0));
        assert_eq!(rows[0].goals, 1.0);
        assert_eq!(rows[1].points, None);
        assert_eq!(rows[1].assists, 1.0);
        assert_eq!(rows[1].value, Some(55.0));
        assert_eq!(
            columns.into_iter().collect::<Vec<_>>(),
            Column::ALL.to_vec()
        );
    }

    #[test]
    fn test_parse_integer_range() {
        assert_eq!(parse_integer("3"), Some(3));
        assert_eq!(parse_integer("3.0"), Some(3));
        assert_eq!(parse_integer("3.5"), None);
        assert_eq!(parse_integer("1e300"), None);
        assert_eq!(parse_integer("NaN"), None);

        let err = parse_gameweek_csv("player_id,gameweek,minutes
1e30,1,90
", "gw.csv").unwrap_err();
        assert!(matches!(err, FplError::Parse(_)));
    }

    #[test]
    fn test_parse_requires_gameweek() {
        let err = parse_gameweek_csv("player_id,minutes\n1,90\n", "gw.csv").unwrap_err();
        assert!(matches!(err, FplError::MissingColumn { ref column, .. } if column == "gameweek"));
    }

    #[test]
    fn test_parse_rejects_non_numeric_feature() {
        let err = parse_gameweek_csv("player_id,gameweek,minutes\n1,1,abc\n", "gw.csv").unwrap_err();
        assert!(matches!(err, FplError::Parse(_)));
    }

    #[test]
    fn test_load_intersects_columns() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "players/A_One_1/gw.csv",
            "gameweek,minutes,goals,assists,points,player_id\n1,90,0,0,2,1\n2,90,1,0,6,1\n",
        );
        write(
            dir.path(),
            "players/B_Two_2/gw.csv",
            "gameweek,minutes,goals,points,player_id\n1,30,0,1,2\n",
        );

        let store = RowStore::load(dir.path()).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.player_ids(), vec![PlayerId(1), PlayerId(2)]);
        assert!(store.has_column(Column::Goals));
        assert!(!store.has_column(Column::Assists));
        assert!(store.require_columns(&[Column::Minutes, Column::Points]).is_ok());
        assert!(matches!(
            store.require_columns(&[Column::Minutes, Column::Assists]),
            Err(FplError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RowStore::load(dir.path()).unwrap();
        assert!(store.is_empty());
        assert!(store.columns().is_empty());
    }

    #[test]
    fn test_player_rows_sorted_and_latest() {
        let mut rows = Vec::new();
        for gw in [3, 1, 2] {
            let mut row = GameweekRow::new(PlayerId(5), gw);
            row.value = Some(50.0 + gw as f32);
            rows.push(row);
        }
        let store = RowStore::from_rows(rows, [Column::Minutes]);

        let gws: Vec<u32> = store.player_rows(PlayerId(5)).iter().map(|r| r.gameweek).collect();
        assert_eq!(gws, vec![1, 2, 3]);
        assert_eq!(store.latest_rows()[&PlayerId(5)].value, Some(53.0));

        let summary = store.summary();
        assert_eq!(summary.players, 1);
        assert_eq!(summary.first_gameweek, Some(1));
        assert_eq!(summary.last_gameweek, Some(3));
    }

    #[test]
    fn test_lookups() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "player_idlist.csv",
            "first_name,second_name,id\nBukayo,Saka,17\n",
        );
        write(
            dir.path(),
            "players_raw.csv",
            "id,element_type,now_cost,web_name\n17,3,100,Saka\n",
        );
        write(dir.path(), "teams.csv", "id,name,short_name\n1,Arsenal,ARS\n");

        let lookups = Lookups::load(dir.path()).unwrap();
        assert_eq!(lookups.display_name(PlayerId(17)), "Bukayo Saka");
        assert_eq!(lookups.display_name(PlayerId(99)), "Player 99");
        assert_eq!(lookups.position(PlayerId(17)), Position::Midfielder);
        assert_eq!(lookups.position(PlayerId(99)), Position::Unknown);
        assert_eq!(lookups.now_cost[&PlayerId(17)], 100.0);
        assert_eq!(lookups.teams[&1], "Arsenal");
        assert!(lookups.fixtures.is_empty());
    }
}
