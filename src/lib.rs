//! Expected-goals prediction from per-player rolling match statistics
//!
//! Turns raw (player, match) stat rows into leakage-free rolling features,
//! pivots them into Team A vs Team B feature vectors, and feeds a small
//! regression net that predicts the expected goals for both teams. The same
//! transformation is applied to historical data at training time and to a
//! synthetic upcoming fixture at inference time.

pub mod data;
pub mod features;
pub mod model;
pub mod serve;
pub mod training;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Player position group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "FW")]
    Forward,
    #[serde(rename = "MF")]
    Midfielder,
    #[serde(rename = "DF")]
    Defender,
    #[serde(rename = "other")]
    Other,
}

impl Position {
    /// Parse an fbref position string. Combined listings like "FW,MF" use
    /// the first (primary) role. Anything outside FW/MF/DF maps to `Other`.
    pub fn parse(s: &str) -> Self {
        let primary = s
            .split(|c| c == ',' || c == ' ')
            .next()
            .unwrap_or("")
            .trim()
            .to_uppercase();
        match primary.as_str() {
            "FW" => Position::Forward,
            "MF" => Position::Midfielder,
            "DF" => Position::Defender,
            _ => Position::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Forward => "FW",
            Position::Midfielder => "MF",
            Position::Defender => "DF",
            Position::Other => "other",
        }
    }
}

impl Default for Position {
    /// Documented fallback for players with no recorded history.
    fn default() -> Self {
        Position::Forward
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A player's age at match time, used as the chronological ordering
/// surrogate within a player's history. Stored as whole years plus days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Age {
    pub years: u16,
    pub days: u16,
}

impl Age {
    pub fn new(years: u16, days: u16) -> Self {
        Age { years, days }
    }

    /// Parse "24-105" (fbref) or "99:300" (reserved fixture marker) forms.
    pub fn parse(s: &str) -> Result<Self> {
        let (y, d) = s
            .split_once(|c| c == '-' || c == ':')
            .ok_or_else(|| XgoalsError::Parse(format!("invalid age: {:?}", s)))?;
        let years = y
            .trim()
            .parse()
            .map_err(|_| XgoalsError::Parse(format!("invalid age years: {:?}", s)))?;
        let days = d
            .trim()
            .parse()
            .map_err(|_| XgoalsError::Parse(format!("invalid age days: {:?}", s)))?;
        Ok(Age { years, days })
    }

    /// Age attached to a synthetic upcoming-fixture row. Sorts after any
    /// real player age.
    pub fn future() -> Self {
        Age {
            years: 99,
            days: 300,
        }
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.years, self.days)
    }
}

/// Ordered set of raw numeric statistic names shared by every record in a
/// dataset. Stat values in records are vectors parallel to this schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSchema {
    names: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl PartialEq for StatSchema {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Eq for StatSchema {}

impl StatSchema {
    pub fn new(names: Vec<String>) -> Result<Self> {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(XgoalsError::Parse(format!(
                    "duplicate statistic name in schema: {:?}",
                    name
                )));
            }
        }
        Ok(StatSchema { names, index })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        if self.index.is_empty() && !self.names.is_empty() {
            // Deserialized schemas skip the index; fall back to a scan.
            return self.names.iter().position(|n| n == name);
        }
        self.index.get(name).copied()
    }
}

/// One row per (player, match): identity fields plus raw stat counters
/// parallel to a [`StatSchema`]. Missing counters stay missing here; they
/// are only resolved downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMatchRecord {
    pub player: String,
    pub match_id: String,
    pub team: String,
    pub pos: Position,
    pub age: Age,
    pub values: Vec<Option<f64>>,
}

/// A schema plus the records measured against it, the unit of exchange
/// between the store and the feature pipeline.
#[derive(Debug, Clone)]
pub struct PlayerMatchSet {
    pub schema: StatSchema,
    pub records: Vec<PlayerMatchRecord>,
}

impl PlayerMatchSet {
    pub fn new(schema: StatSchema, records: Vec<PlayerMatchRecord>) -> Self {
        PlayerMatchSet { schema, records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum XgoalsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Scraper failed: {0}")]
    Scraper(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No trained model found - run `xgoals train` first")]
    NoModel,

    #[error("Model error: {0}")]
    Model(String),

    #[error("No historical data found for the requested players")]
    NoHistory,

    #[error("Position list is empty - at least one position group is required")]
    EmptyPositions,

    #[error("Feature contract violation: {0}")]
    FeatureContract(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, XgoalsError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub training: TrainingConfig,
    pub data: DataConfig,
    pub server: ServerConfig,
    pub scraper: ScraperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Trailing window (in matches) for per-player rolling averages
    pub window_size: usize,
    /// Position groups aggregated into team features, in column order
    pub positions: Vec<Position>,
    /// Name of the raw goals counter used for per-team goal totals
    pub goals_stat: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub hidden_dims: Vec<usize>,
    pub dropout: f64,
    pub validation_split: f64,
    pub early_stopping_patience: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    pub model_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub season: String,
    pub teams_file: String,
    pub request_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pipeline: PipelineConfig {
                window_size: 6,
                positions: vec![Position::Forward, Position::Midfielder, Position::Defender],
                goals_stat: "gls".to_string(),
            },
            training: TrainingConfig {
                epochs: 400,
                learning_rate: 1e-3,
                hidden_dims: vec![128, 64],
                dropout: 0.1,
                validation_split: 0.2,
                early_stopping_patience: 30,
                seed: 42,
            },
            data: DataConfig {
                database_path: "data/xgoals.db".to_string(),
                model_dir: "model".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                allowed_origins: vec![
                    "http://localhost:5173".to_string(),
                    "http://127.0.0.1:5173".to_string(),
                    "http://localhost:3000".to_string(),
                ],
            },
            scraper: ScraperConfig {
                season: "2024-2025".to_string(),
                teams_file: "teams.json".to_string(),
                request_delay_ms: 3000,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            XgoalsError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| XgoalsError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| XgoalsError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
