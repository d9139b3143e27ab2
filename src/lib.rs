//! Fantasy Premier League points prediction using deep learning
//!
//! Downloads per-player gameweek statistics, cuts them into fixed-length
//! windows, and trains an LSTM to predict next-gameweek fantasy points.

pub mod data;
pub mod features;
pub mod logging;
pub mod model;
pub mod predict;
pub mod report;
pub mod training;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a player (FPL element id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playing position, from the `element_type` column of `players_raw.csv`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    Goalkeeper,
    Defender,
    Midfielder,
    Forward,
    Unknown,
}

impl Position {
    pub fn from_element_type(element_type: i64) -> Self {
        match element_type {
            1 => Position::Goalkeeper,
            2 => Position::Defender,
            3 => Position::Midfielder,
            4 => Position::Forward,
            _ => Position::Unknown,
        }
    }

    /// Colour used for this position in the price/points chart
    pub fn color(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "blue",
            Position::Defender => "green",
            Position::Midfielder => "red",
            Position::Forward => "purple",
            Position::Unknown => "gray",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Goalkeeper => write!(f, "GKP"),
            Position::Defender => write!(f, "DEF"),
            Position::Midfielder => write!(f, "MID"),
            Position::Forward => write!(f, "FWD"),
            Position::Unknown => write!(f, "UNK"),
        }
    }
}

/// Numeric columns of the gameweek row schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Minutes,
    Goals,
    Assists,
    Points,
    Value,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Minutes,
        Column::Goals,
        Column::Assists,
        Column::Points,
        Column::Value,
    ];

    /// Canonical CSV header for this column
    pub fn name(&self) -> &'static str {
        match self {
            Column::Minutes => "minutes",
            Column::Goals => "goals",
            Column::Assists => "assists",
            Column::Points => "points",
            Column::Value => "value",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Column::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One player's statistics for one gameweek
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameweekRow {
    pub player_id: PlayerId,
    pub gameweek: u32,
    pub minutes: f32,
    pub goals: f32,
    pub assists: f32,
    /// Fantasy points; absent for rows that have not been played yet
    pub points: Option<f32>,
    /// Price in tenths of a million
    pub value: Option<f32>,
}

impl GameweekRow {
    pub fn new(player_id: PlayerId, gameweek: u32) -> Self {
        GameweekRow {
            player_id,
            gameweek,
            minutes: 0.0,
            goals: 0.0,
            assists: 0.0,
            points: None,
            value: None,
        }
    }

    /// Read a column value
    pub fn get(&self, column: Column) -> Option<f32> {
        match column {
            Column::Minutes => Some(self.minutes),
            Column::Goals => Some(self.goals),
            Column::Assists => Some(self.assists),
            Column::Points => self.points,
            Column::Value => self.value,
        }
    }

    /// Write a column value
    pub fn set(&mut self, column: Column, value: f32) {
        match column {
            Column::Minutes => self.minutes = value,
            Column::Goals => self.goals = value,
            Column::Assists => self.assists = value,
            Column::Points => self.points = Some(value),
            Column::Value => self.value = Some(value),
        }
    }

    /// Feature tuple in the given column order
    ///
    /// An absent cell is a [`FplError::MissingValue`], never imputed.
    pub fn features(&self, columns: &[Column]) -> Result<Vec<f32>> {
        columns
            .iter()
            .map(|c| {
                self.get(*c).ok_or(FplError::MissingValue {
                    column: *c,
                    player_id: self.player_id,
                    gameweek: self.gameweek,
                })
            })
            .collect()
    }
}

/// Next-gameweek prediction for a single player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub player_id: PlayerId,
    pub name: String,
    pub predicted_points: f32,
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum FplError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required column '{column}' in {location}")]
    MissingColumn { column: String, location: String },

    #[error("Missing {column} value for player {player_id} in gameweek {gameweek}")]
    MissingValue {
        column: Column,
        player_id: PlayerId,
        gameweek: u32,
    },

    #[error("Window length must be at least 1")]
    InvalidWindowLength,

    #[error("At least one feature column is required")]
    NoFeatures,

    #[error("No sequences: none of {players} players has more than {window_length} gameweeks")]
    NoSequences { players: usize, window_length: usize },

    #[error("Model not trained - run `fpl train` first")]
    NoModel,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, FplError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Raw file root of the data mirror; `{season}` is substituted
    pub base_url: String,
    /// GitHub contents API root used to list understat files
    pub api_url: String,
    pub season: String,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub model_path: PathBuf,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Attempts per file; 1 means no retries
    pub max_attempts: u32,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            base_url: "https://raw.githubusercontent.com/vaastav/Fantasy-Premier-League/master/data/{season}/".to_string(),
            api_url: "https://api.github.com/repos/vaastav/Fantasy-Premier-League/contents/data/{season}".to_string(),
            season: "2024-25".to_string(),
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            model_path: PathBuf::from("model/fpl_lstm"),
            user_agent: "fpl-predictor/0.1".to_string(),
            timeout_secs: 30,
            max_attempts: 1,
        }
    }
}

impl DataConfig {
    pub fn season_base_url(&self) -> String {
        self.base_url.replace("{season}", &self.season)
    }

    pub fn season_api_url(&self) -> String {
        self.api_url.replace("{season}", &self.season)
    }

    pub fn players_dir(&self) -> PathBuf {
        self.data_dir.join("players")
    }

    pub fn understat_dir(&self) -> PathBuf {
        self.data_dir.join("understat")
    }

    /// Path of the saved model record (burn appends `.mpk`)
    pub fn model_file(&self) -> PathBuf {
        with_suffix(&self.model_path, ".mpk")
    }

    /// Path of the JSON sidecar holding normalization and run metadata
    pub fn model_meta_file(&self) -> PathBuf {
        with_suffix(&self.model_path, ".meta.json")
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub window_length: usize,
    pub features: Vec<Column>,
    pub target: Column,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        SequenceConfig {
            window_length: 5,
            features: vec![Column::Minutes, Column::Goals, Column::Assists],
            target: Column::Points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub dense_size: usize,
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            hidden_size: 64,
            dense_size: 32,
            dropout: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of windows held out (shuffled) for the final evaluation
    pub test_split: f32,
    /// Fraction of the training windows (tail) used for validation
    pub validation_split: f32,
    pub early_stopping_patience: usize,
    /// Number of cross-validation folds; below 2 disables cross-validation
    pub k_folds: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            test_split: 0.2,
            validation_split: 0.2,
            early_stopping_patience: 5,
            k_folds: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub top_n: usize,
    pub top_errors: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            top_n: 100,
            top_errors: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log file that receives a copy of every record; `None` logs to stderr only
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            file: Some(PathBuf::from("fpl_prediction.log")),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FplError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| FplError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FplError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that would make a later stage fail obscurely
    pub fn validate(&self) -> Result<()> {
        if self.sequence.window_length == 0 {
            return Err(FplError::Config("sequence.window_length must be >= 1".to_string()));
        }
        if self.sequence.features.is_empty() {
            return Err(FplError::Config("sequence.features must not be empty".to_string()));
        }
        if self.sequence.features.contains(&self.sequence.target) {
            return Err(FplError::Config(format!(
                "target column '{}' cannot also be a feature",
                self.sequence.target
            )));
        }
        for (name, fraction) in [
            ("training.test_split", self.training.test_split),
            ("training.validation_split", self.training.validation_split),
        ] {
            if !(0.0..1.0).contains(&fraction) {
                return Err(FplError::Config(format!("{} must be in [0, 1)", name)));
            }
        }
        if self.training.batch_size == 0 {
            return Err(FplError::Config("training.batch_size must be >= 1".to_string()));
        }
        if self.data.max_attempts == 0 {
            return Err(FplError::Config("data.max_attempts must be >= 1".to_string()));
        }
        Ok(())
    }
}
