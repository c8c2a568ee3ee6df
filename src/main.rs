//! sybilhunter - find Sybil groups among Tor relays in archived directory data.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sybil_hunter::analysis::{FingerprintChanges, PrettyPrint, SimilarityMatrix};
use sybil_hunter::config::{HunterConfig, ValidatedConfig};
use sybil_hunter::netdoc::NetDocExtractor;
use sybil_hunter::pipeline::{Analysis, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "sybilhunter", version, about = "Detect Sybil relays in Tor network data")]
struct Cli {
    /// File, directory or .tar.xz archive containing descriptors or consensuses
    #[arg(long)]
    data: Option<PathBuf>,

    /// Merge all entries into one set before analyzing
    #[arg(long)]
    cumulative: bool,

    /// Ignore consensuses published before this date (YYYY-MM-DD)
    #[arg(long = "startdate")]
    start_date: Option<String>,

    /// Ignore consensuses published on or after this date (YYYY-MM-DD)
    #[arg(long = "enddate")]
    end_date: Option<String>,

    /// Write the pairwise descriptor similarity matrix as CSV
    #[arg(long)]
    matrix: bool,

    /// Print every parsed document
    #[arg(long)]
    print: bool,

    /// Report endpoints that changed their fingerprint
    #[arg(long)]
    fingerprints: bool,

    /// CSV layout of the similarity matrix: long or wide
    #[arg(long = "csvformat")]
    csv_format: Option<String>,

    /// Directory for analysis output; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    /// Only consider relays with these fingerprints (comma separated)
    #[arg(long = "filter-fpr", value_delimiter = ',')]
    filter_fpr: Vec<String>,

    /// Only consider relays with these IP addresses (comma separated)
    #[arg(long = "filter-addr", value_delimiter = ',')]
    filter_addr: Vec<String>,

    /// Only consider relays with these nicknames (comma separated)
    #[arg(long = "filter-nickname", value_delimiter = ',')]
    filter_nickname: Vec<String>,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Config file; defaults to ~/.sybilhunter.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Command-line values override the config file.
    fn apply(self, config: &mut HunterConfig) {
        if self.data.is_some() {
            config.data = self.data;
        }
        config.cumulative |= self.cumulative;
        if self.start_date.is_some() {
            config.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            config.end_date = self.end_date;
        }
        config.analyses.matrix |= self.matrix;
        config.analyses.print |= self.print;
        config.analyses.fingerprints |= self.fingerprints;
        if let Some(format) = self.csv_format {
            config.csv_format = format;
        }
        if self.output.is_some() {
            config.output_dir = self.output;
        }
        if !self.filter_fpr.is_empty() {
            config.filter.fingerprints = self.filter_fpr;
        }
        if !self.filter_addr.is_empty() {
            config.filter.addresses = self.filter_addr;
        }
        if !self.filter_nickname.is_empty() {
            config.filter.nicknames = self.filter_nickname;
        }
    }
}

fn init_logging(logfile: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("sybil_hunter=info".parse()?);

    match logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(false).compact().with_writer(io::stderr))
                .with(filter)
                .init();
        }
    }
    Ok(())
}

fn sink(output_dir: Option<&Path>, file_name: &str) -> Result<Box<dyn Write + Send>> {
    match output_dir {
        Some(dir) => {
            let path = dir.join(file_name);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(io::BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

fn build_analyses(config: &ValidatedConfig) -> Result<Vec<Box<dyn Analysis>>> {
    let output_dir = config.output_dir.as_deref();
    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let mut analyses: Vec<Box<dyn Analysis>> = Vec::new();
    if config.analyses.matrix {
        analyses.push(Box::new(SimilarityMatrix::new(
            config.csv_format,
            sink(output_dir, "similarity-matrix.csv")?,
        )));
    }
    if config.analyses.print {
        analyses.push(Box::new(PrettyPrint::new(sink(output_dir, "documents.jsonl")?)));
    }
    if config.analyses.fingerprints {
        analyses.push(Box::new(FingerprintChanges::new(sink(
            output_dir,
            "fingerprint-changes.txt",
        )?)));
    }
    Ok(analyses)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logfile.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => HunterConfig::load_from(path)?,
        None => HunterConfig::load_default()?,
    };
    cli.apply(&mut config);
    let config = config.validate()?;

    let analyses = build_analyses(&config)?;
    let pipeline = Pipeline::new(NetDocExtractor::new(config.filter.clone()))
        .with_window(config.window)
        .with_channel_capacity(config.channel_capacity);

    let stats = pipeline
        .run(&config.data, config.mode, analyses)
        .await
        .with_context(|| format!("Analysis of {} failed", config.data.display()))?;

    info!(
        admitted = stats.entries_admitted,
        deliveries = stats.deliveries,
        failed_analyses = stats.analyses_failed,
        duration = ?stats.duration,
        "Done"
    );

    if stats.analyses_failed > 0 {
        anyhow::bail!("{} analysis task(s) failed", stats.analyses_failed);
    }
    Ok(())
}
