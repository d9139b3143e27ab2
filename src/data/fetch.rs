//! Download FPL CSV files from the public data mirror
//!
//! Every file is fetched best-effort: failures are recorded in a
//! [`FetchReport`] and the run moves on to the next file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::data::store::{read_player_idlist, PlayerInfo};
use crate::{DataConfig, FplError, Result};

/// Files fetched from the root of the season directory
pub const KEY_FILES: [&str; 4] = ["teams.csv", "fixtures.csv", "player_idlist.csv", "players_raw.csv"];

/// Result of fetching one file
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Downloaded and written to disk
    Saved { path: PathBuf, rows: usize },
    /// The mirror does not serve this file (non-success HTTP status)
    Skipped { reason: String },
    /// Transport, decoding or disk failure
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct FetchEntry {
    pub file: String,
    pub outcome: FetchOutcome,
}

/// Aggregated outcome of an ingestion run
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub entries: Vec<FetchEntry>,
    /// Player files whose gameweek column was derived from row order
    pub synthetic_gameweeks: usize,
    /// Stage-level problems that stopped a whole group of files
    pub stage_errors: Vec<String>,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
}

impl Default for FetchReport {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchReport {
    pub fn new() -> Self {
        FetchReport {
            entries: Vec::new(),
            synthetic_gameweeks: 0,
            stage_errors: Vec::new(),
            started_at: Local::now(),
            finished_at: None,
        }
    }

    /// Record and log the outcome for one file
    pub fn record(&mut self, file: impl Into<String>, outcome: FetchOutcome) {
        let file = file.into();
        match &outcome {
            FetchOutcome::Saved { path, rows } => {
                log::info!("Saved '{}' ({} rows) to {}", file, rows, path.display())
            }
            FetchOutcome::Skipped { reason } => log::warn!("Skipped '{}': {}", file, reason),
            FetchOutcome::Failed { error } => log::error!("Error loading '{}': {}", file, error),
        }
        self.entries.push(FetchEntry { file, outcome });
    }

    pub fn stage_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{}", message);
        self.stage_errors.push(message);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    pub fn saved(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Saved { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&FetchOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }

    /// Iterate over entries that did not save
    pub fn problems(&self) -> impl Iterator<Item = &FetchEntry> {
        self.entries
            .iter()
            .filter(|e| !matches!(e.outcome, FetchOutcome::Saved { .. }))
    }
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fetch Report")?;
        writeln!(f, "───────────────────────────────")?;
        writeln!(f, "  Files:     {}", self.entries.len())?;
        writeln!(f, "  Saved:     {}", self.saved())?;
        writeln!(f, "  Skipped:   {}", self.skipped())?;
        writeln!(f, "  Failed:    {}", self.failed())?;
        if self.synthetic_gameweeks > 0 {
            writeln!(
                f,
                "  Synthetic gameweek column (row order assumed chronological): {} files",
                self.synthetic_gameweeks
            )?;
        }
        for e in &self.stage_errors {
            writeln!(f, "  Stage error: {}", e)?;
        }
        if let Some(done) = self.finished_at {
            let secs = (done - self.started_at).num_milliseconds() as f64 / 1000.0;
            writeln!(f, "  Elapsed:   {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Options for an ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub skip_understat: bool,
    /// Only fetch the first N player files
    pub player_limit: Option<usize>,
}

/// One entry of a GitHub contents API listing
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub download_url: Option<String>,
}

impl ContentEntry {
    pub fn is_csv_file(&self) -> bool {
        self.kind == "file" && self.name.ends_with(".csv")
    }
}

/// Retry an operation with exponential backoff
pub fn with_retry<T, F>(mut operation: F, max_attempts: u32) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if attempt + 1 < max_attempts => {
                log::warn!("Attempt {} failed: {}", attempt + 1, e);
                std::thread::sleep(Duration::from_millis(100 * 2u64.pow(attempt)));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP fetcher for the FPL data mirror
pub struct Fetcher {
    client: reqwest::blocking::Client,
    base_url: String,
    api_url: String,
    data_dir: PathBuf,
    max_attempts: u32,
}

impl Fetcher {
    pub fn new(config: &DataConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Fetcher {
            client,
            base_url: config.season_base_url(),
            api_url: config.season_api_url(),
            data_dir: config.data_dir.clone(),
            max_attempts: config.max_attempts,
        })
    }

    /// Download everything into the data directory
    pub fn ingest(&self, options: &IngestOptions) -> Result<FetchReport> {
        std::fs::create_dir_all(&self.data_dir)?;
        let mut report = FetchReport::new();

        self.fetch_key_files(&mut report);
        if options.skip_understat {
            log::info!("Skipping understat files");
        } else {
            self.fetch_understat(&mut report);
        }
        self.fetch_players(&mut report, options.player_limit);

        report.finish();
        log::info!(
            "Data ingestion complete: {} saved, {} skipped, {} failed",
            report.saved(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    /// Download the season's key files
    pub fn fetch_key_files(&self, report: &mut FetchReport) {
        for name in KEY_FILES {
            let url = format!("{}{}", self.base_url, name);
            let outcome = self.fetch_csv(&url, &self.data_dir.join(name), |text| {
                Ok((text.to_string(), count_rows(text)?))
            });
            report.record(name, outcome);
        }
    }

    /// List the understat directory and download every CSV in it
    pub fn fetch_understat(&self, report: &mut FetchReport) {
        let listing_url = format!("{}/understat", self.api_url);
        let entries: Vec<ContentEntry> = match self.get_text(&listing_url) {
            Ok(Some(body)) => match serde_json::from_str(&body) {
                Ok(entries) => entries,
                Err(e) => {
                    report.stage_error(format!("Invalid understat listing: {}", e));
                    return;
                }
            },
            Ok(None) => {
                report.stage_error(format!("Understat listing not available at {}", listing_url));
                return;
            }
            Err(e) => {
                report.stage_error(format!("Error accessing GitHub API for understat files: {}", e));
                return;
            }
        };

        let dir = self.data_dir.join("understat");
        for entry in entries.iter().filter(|e| e.is_csv_file()) {
            let label = format!("understat/{}", entry.name);
            let Some(url) = entry.download_url.as_deref() else {
                report.record(
                    label,
                    FetchOutcome::Skipped {
                        reason: "no download url".to_string(),
                    },
                );
                continue;
            };
            let outcome = self.fetch_csv(url, &dir.join(&entry.name), |text| {
                Ok((text.to_string(), count_rows(text)?))
            });
            report.record(label, outcome);
        }
    }

    /// Download `gw.csv` for every player in the local `player_idlist.csv`
    pub fn fetch_players(&self, report: &mut FetchReport, limit: Option<usize>) {
        let idlist_path = self.data_dir.join("player_idlist.csv");
        if !idlist_path.exists() {
            report.stage_error("Local player_idlist.csv not found");
            return;
        }
        let players = match read_player_idlist(&idlist_path) {
            Ok(players) => players,
            Err(e) => {
                report.stage_error(format!("Failed to read player_idlist.csv: {}", e));
                return;
            }
        };

        let players_dir = self.data_dir.join("players");
        let total = limit.unwrap_or(players.len()).min(players.len());
        log::info!("Fetching gameweek files for {} players", total);

        for player in players.iter().take(total) {
            let folder = player_folder_name(player);
            let relative = format!("players/{}/gw.csv", folder);
            let url = format!("{}{}", self.base_url, relative);
            let mut synthetic = false;

            let outcome = self.fetch_csv(&url, &players_dir.join(&folder).join("gw.csv"), |text| {
                let tagged = tag_player_csv(text, player.id.0)?;
                synthetic = tagged.synthetic_gameweek;
                Ok((tagged.csv, tagged.rows))
            });

            if synthetic && matches!(outcome, FetchOutcome::Saved { .. }) {
                log::debug!("{}: gameweek column derived from row order", relative);
                report.synthetic_gameweeks += 1;
            }
            report.record(relative, outcome);
        }

        if report.synthetic_gameweeks > 0 {
            log::warn!(
                "{} player files had no gameweek column; row order was assumed to be chronological",
                report.synthetic_gameweeks
            );
        }
    }

    /// Fetch a CSV, transform it, and write it to `path`
    fn fetch_csv<F>(&self, url: &str, path: &Path, transform: F) -> FetchOutcome
    where
        F: FnOnce(&str) -> Result<(String, usize)>,
    {
        let text = match self.get_text(url) {
            Ok(Some(text)) => text,
            Ok(None) => {
                return FetchOutcome::Skipped {
                    reason: format!("not available at {}", url),
                }
            }
            Err(e) => {
                return FetchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let written = transform(&text).and_then(|(csv, rows)| {
            write_file(path, &csv)?;
            Ok(rows)
        });

        match written {
            Ok(rows) => FetchOutcome::Saved {
                path: path.to_path_buf(),
                rows,
            },
            Err(e) => FetchOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    /// GET a URL as UTF-8 text; `Ok(None)` when the server answers with a non-success status
    fn get_text(&self, url: &str) -> Result<Option<String>> {
        with_retry(
            || {
                let resp = self.client.get(url).send()?;
                if !resp.status().is_success() {
                    log::debug!("{} returned {}", url, resp.status());
                    return Ok(None);
                }
                let bytes = resp.bytes()?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            },
            self.max_attempts,
        )
    }
}

/// Directory name the mirror uses for a player: `First_Second_id`
pub fn player_folder_name(player: &PlayerInfo) -> String {
    format!("{}_{}_{}", player.first_name, player.second_name, player.id.0)
}

/// A player file after tagging
#[derive(Debug, Clone)]
pub struct TaggedCsv {
    pub csv: String,
    pub rows: usize,
    /// True when the gameweek column was derived from the 1-based row position
    pub synthetic_gameweek: bool,
}

/// Add a `player_id` column and, when missing, a `gameweek` column
///
/// The derived gameweek assumes the file lists rows in chronological order.
pub fn tag_player_csv(text: &str, player_id: i64) -> Result<TaggedCsv> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let synthetic_gameweek = !headers.iter().any(|h| h == "gameweek");
    let player_idx = headers.iter().position(|h| h == "player_id");

    let mut out_headers = csv::StringRecord::new();
    if synthetic_gameweek {
        out_headers.push_field("gameweek");
    }
    for h in headers.iter() {
        out_headers.push_field(h);
    }
    if player_idx.is_none() {
        out_headers.push_field("player_id");
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&out_headers)?;

    let id = player_id.to_string();
    let mut rows = 0;
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let mut out = csv::StringRecord::new();
        if synthetic_gameweek {
            out.push_field(&(i + 1).to_string());
        }
        for (j, field) in record.iter().enumerate() {
            if Some(j) == player_idx {
                out.push_field(&id);
            } else {
                out.push_field(field);
            }
        }
        if player_idx.is_none() {
            out.push_field(&id);
        }
        writer.write_record(&out)?;
        rows += 1;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| FplError::Io(e.into_error()))?;
    let csv = String::from_utf8(bytes).map_err(|e| FplError::Parse(e.to_string()))?;

    Ok(TaggedCsv {
        csv,
        rows,
        synthetic_gameweek,
    })
}

/// Count data rows, failing if the text is not well-formed CSV
pub fn count_rows(text: &str) -> Result<usize> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut rows = 0;
    for record in reader.records() {
        record?;
        rows += 1;
    }
    Ok(rows)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
