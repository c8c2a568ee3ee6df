//! Configuration Module - run parameters from ~/.sybilhunter.toml
//!
//! Supports:
//! - Data path and delivery mode
//! - Snapshot date window
//! - Analysis selection and CSV layout
//! - Document filters
//!
//! Raw values are only usable after [`HunterConfig::validate`] has turned
//! them into a [`ValidatedConfig`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analysis::CsvFormat;
use crate::model::Fingerprint;
use crate::netdoc::ObjectFilter;
use crate::pipeline::{DeliveryMode, DEFAULT_CHANNEL_CAPACITY};
use crate::source::DateWindow;

/// File name looked up in the home directory.
pub const CONFIG_FILE_NAME: &str = ".sybilhunter.toml";

/// Date layout accepted for window bounds.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Start date {start} is not before end date {end}")]
    InvertedWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("{0}")]
    InvalidCsvFormat(String),

    #[error("Invalid fingerprint filter: {0}")]
    InvalidFingerprint(String),

    #[error("Invalid address filter '{0}'")]
    InvalidAddress(String),

    #[error("No data path given")]
    MissingData,

    #[error("No analysis requested; enable at least one of matrix, print, fingerprints")]
    NoAnalysis,

    #[error("Channel capacity must be at least 1")]
    ZeroCapacity,
}

/// Document filter lists as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub fingerprints: Vec<String>,
    pub addresses: Vec<String>,
    pub nicknames: Vec<String>,
}

/// Which analyses to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysesConfig {
    pub matrix: bool,
    pub print: bool,
    pub fingerprints: bool,
}

impl AnalysesConfig {
    pub fn any(&self) -> bool {
        self.matrix || self.print || self.fingerprints
    }
}

/// Raw, unvalidated run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HunterConfig {
    /// File, directory or `.tar.xz` archive to analyze
    pub data: Option<PathBuf>,
    /// Merge every entry into one set before delivery
    pub cumulative: bool,
    /// Inclusive lower bound, YYYY-MM-DD
    pub start_date: Option<String>,
    /// Exclusive upper bound, YYYY-MM-DD (defaults to now)
    pub end_date: Option<String>,
    /// Directory for analysis output files (stdout when unset)
    pub output_dir: Option<PathBuf>,
    /// `long` or `wide`
    pub csv_format: String,
    /// Sets buffered per analysis
    pub channel_capacity: usize,
    pub filter: FilterConfig,
    pub analyses: AnalysesConfig,
}

impl Default for HunterConfig {
    fn default() -> Self {
        Self {
            data: None,
            cumulative: false,
            start_date: None,
            end_date: None,
            output_dir: None,
            csv_format: "long".to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            filter: FilterConfig::default(),
            analyses: AnalysesConfig::default(),
        }
    }
}

/// Parameters the pipeline can be built from.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub data: PathBuf,
    pub mode: DeliveryMode,
    pub window: DateWindow,
    pub output_dir: Option<PathBuf>,
    pub csv_format: CsvFormat,
    pub channel_capacity: usize,
    pub filter: ObjectFilter,
    pub analyses: AnalysesConfig,
}

impl HunterConfig {
    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `~/.sybilhunter.toml`, or defaults when it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        self.validate_at(Utc::now())
    }

    /// Validates against a fixed "now", which bounds the window when no end
    /// date is given.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<ValidatedConfig, ConfigError> {
        let data = self.data.clone().ok_or(ConfigError::MissingData)?;

        if !self.analyses.any() {
            return Err(ConfigError::NoAnalysis);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let start = match &self.start_date {
            Some(date) => parse_date(date)?,
            None => DateTime::<Utc>::MIN_UTC,
        };
        let end = match &self.end_date {
            Some(date) => parse_date(date)?,
            None => now,
        };
        if start >= end {
            return Err(ConfigError::InvertedWindow { start, end });
        }

        let csv_format = self
            .csv_format
            .parse::<CsvFormat>()
            .map_err(ConfigError::InvalidCsvFormat)?;

        Ok(ValidatedConfig {
            data,
            mode: DeliveryMode::from_cumulative(self.cumulative),
            window: DateWindow::new(start, end),
            output_dir: self.output_dir.clone(),
            csv_format,
            channel_capacity: self.channel_capacity,
            filter: self.build_filter()?,
            analyses: self.analyses.clone(),
        })
    }

    fn build_filter(&self) -> Result<ObjectFilter, ConfigError> {
        let mut filter = ObjectFilter::new();
        for raw in &self.filter.fingerprints {
            let fingerprint = raw
                .parse::<Fingerprint>()
                .map_err(|e| ConfigError::InvalidFingerprint(e.to_string()))?;
            filter = filter.with_fingerprint(fingerprint);
        }
        for raw in &self.filter.addresses {
            let address = raw
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidAddress(raw.clone()))?;
            filter = filter.with_address(address);
        }
        for nickname in &self.filter.nicknames {
            filter = filter.with_nickname(nickname.trim());
        }
        Ok(filter)
    }
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ConfigError::InvalidDate(raw.to_string()))
}
