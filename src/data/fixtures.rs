//! Fixture list with parsed per-match stats
//!
//! The `stats` column of `fixtures.csv` holds a Python literal such as
//! `[{'identifier': 'goals_scored', 'a': [], 'h': [{'value': 1, 'element': 17}]}]`.

use std::path::Path;

use serde::Deserialize;

use crate::Result;

/// One stat entry for a single player
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatValue {
    pub value: i64,
    pub element: i64,
}

/// A stat (goals, assists, bonus, ...) split by home and away side
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixtureStat {
    pub identifier: String,
    #[serde(default)]
    pub h: Vec<StatValue>,
    #[serde(default)]
    pub a: Vec<StatValue>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFixture {
    id: i64,
    #[serde(default)]
    event: Option<i64>,
    #[serde(default)]
    team_h: Option<i64>,
    #[serde(default)]
    team_a: Option<i64>,
    #[serde(default)]
    stats: Option<String>,
}

/// A fixture with its stats already parsed
#[derive(Debug, Clone)]
pub struct Fixture {
    pub id: i64,
    /// Gameweek the fixture belongs to, if scheduled
    pub event: Option<i64>,
    pub team_h: Option<i64>,
    pub team_a: Option<i64>,
    pub stats: Vec<FixtureStat>,
}

impl Fixture {
    /// Sum of home-side values for `goals_scored`, 0 when absent
    pub fn home_goals_scored(&self) -> i64 {
        self.stats
            .iter()
            .find(|s| s.identifier == "goals_scored")
            .map(|s| s.h.iter().map(|v| v.value).sum())
            .unwrap_or(0)
    }
}

/// Parse a `stats` cell; empty or malformed cells give an empty list
pub fn parse_stats(raw: &str) -> Vec<FixtureStat> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let json = python_literal_to_json(raw);
    match serde_json::from_str(&json) {
        Ok(stats) => stats,
        Err(e) => {
            log::warn!("Error parsing stats: {}", e);
            Vec::new()
        }
    }
}

/// Convert the subset of Python literal syntax used by the mirror to JSON
fn python_literal_to_json(raw: &str) -> String {
    raw.replace('\'', "\"")
        .replace("True", "true")
        .replace("False", "false")
        .replace("None", "null")
}

pub fn read_fixtures<P: AsRef<Path>>(path: P) -> Result<Vec<Fixture>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut fixtures = Vec::new();
    for record in reader.deserialize::<RawFixture>() {
        let raw = record?;
        fixtures.push(Fixture {
            id: raw.id,
            event: raw.event,
            team_h: raw.team_h,
            team_a: raw.team_a,
            stats: raw.stats.as_deref().map(parse_stats).unwrap_or_default(),
        });
    }
    log::debug!("Loaded {} fixtures", fixtures.len());
    Ok(fixtures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_goals_scored() {
        let stats = parse_stats(
            "[{'identifier': 'goals_scored', 'a': [{'value': 1, 'element': 40}], \
             'h': [{'value': 2, 'element': 17}, {'value': 1, 'element': 20}]}, \
             {'identifier': 'assists', 'a': [], 'h': [{'value': 1, 'element': 17}]}]",
        );
        assert_eq!(stats.len(), 2);

        let fixture = Fixture {
            id: 1,
            event: Some(1),
            team_h: Some(1),
            team_a: Some(2),
            stats,
        };
        assert_eq!(fixture.home_goals_scored(), 3);
    }

    #[test]
    fn test_empty_and_malformed_stats() {
        assert!(parse_stats("").is_empty());
        assert!(parse_stats("   ").is_empty());
        assert!(parse_stats("[{'identifier':").is_empty());

        let fixture = Fixture {
            id: 2,
            event: None,
            team_h: None,
            team_a: None,
            stats: parse_stats("[]"),
        };
        assert_eq!(fixture.home_goals_scored(), 0);
    }

    #[test]
    fn test_read_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.csv");
        std::fs::write(
            &path,
            "code,event,id,stats,team_a,team_h\n\
             1,1,10,\"[{'identifier': 'goals_scored', 'a': [], 'h': [{'value': 1, 'element': 5}]}]\",2,1\n\
             2,,11,,4,3\n",
        )
        .unwrap();

        let fixtures = read_fixtures(&path).unwrap();
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].home_goals_scored(), 1);
        assert_eq!(fixtures[1].event, None);
        assert!(fixtures[1].stats.is_empty());
    }
}
