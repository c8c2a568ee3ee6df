//! Fan-out pipeline executor.
//!
//! [`Pipeline`] traverses a [`Source`], hands every admitted entry to an
//! [`ObjectExtractor`] and delivers the parsed [`ObjectSet`]s to any number
//! of [`Analysis`] tasks:
//! - **Independent** mode streams one set per entry to every analysis
//! - **Cumulative** mode merges all entries and delivers the result once
//! - Per-entry failures are reported through a [`DiagnosticReporter`] and skipped
//! - The run only returns once every analysis has drained its inbox

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::diagnostics::{Diagnostic, TracingReporter};
use crate::executor::AnalysisExecutor;
use crate::model::ObjectSet;
use crate::pipeline::traits::Analysis;
use crate::source::{DateWindow, Source, SourceEntry, SourceError};
use crate::traits::{DiagnosticReporter, ObjectExtractor};

/// Default number of sets buffered per analysis before the traversal waits.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// How parsed entries reach the analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One set per source entry, streamed while traversing.
    Independent,
    /// All entries merged, delivered once after traversal.
    Cumulative,
}

impl DeliveryMode {
    pub fn from_cumulative(cumulative: bool) -> Self {
        if cumulative {
            DeliveryMode::Cumulative
        } else {
            DeliveryMode::Independent
        }
    }
}

/// Counters collected over one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    /// File entries handed out by the source
    pub entries_seen: usize,

    /// Entries inside the date window
    pub entries_admitted: usize,

    /// Entries skipped by their snapshot file name
    pub entries_outside_window: usize,

    /// Entries the extractor rejected
    pub parse_failures: usize,

    /// Entries that parsed to an empty set
    pub empty_sets: usize,

    /// Sets handed to analysis inboxes, counted per inbox
    pub deliveries: usize,

    /// Analyses that returned an error
    pub analyses_failed: usize,

    /// Wall-clock time of the whole run
    pub duration: Duration,
}

/// Errors that end a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The source could not be opened or decompressed
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Cumulative traversal produced no documents
    #[error("Gathered object set from '{0}' is empty; is the input the right kind of file?")]
    EmptyInput(String),

    /// The traversal thread panicked
    #[error("Traversal task failed: {0}")]
    Traversal(String),
}

/// Sending half of one analysis' inbox.
struct Outlet {
    name: String,
    tx: Option<mpsc::Sender<Arc<ObjectSet>>>,
}

impl Outlet {
    fn deliver_blocking(&mut self, set: &Arc<ObjectSet>, reporter: &dyn DiagnosticReporter) -> bool {
        let Some(tx) = &self.tx else { return false };
        if tx.blocking_send(Arc::clone(set)).is_ok() {
            return true;
        }
        self.disconnect(reporter);
        false
    }

    async fn deliver(&mut self, set: &Arc<ObjectSet>, reporter: &dyn DiagnosticReporter) -> bool {
        let Some(tx) = &self.tx else { return false };
        if tx.send(Arc::clone(set)).await.is_ok() {
            return true;
        }
        self.disconnect(reporter);
        false
    }

    fn disconnect(&mut self, reporter: &dyn DiagnosticReporter) {
        self.tx = None;
        reporter.report(Diagnostic::ConsumerGone {
            analysis: self.name.clone(),
        });
    }
}

/// State owned by the traversal thread.
struct Traversal {
    source: Source,
    mode: DeliveryMode,
    window: DateWindow,
    extractor: Arc<dyn ObjectExtractor>,
    reporter: Arc<dyn DiagnosticReporter>,
    outlets: Vec<Outlet>,
    accumulator: Option<ObjectSet>,
    stats: PipelineStats,
}

impl Traversal {
    fn run(mut self) -> (Self, Result<(), SourceError>) {
        let source = self.source.clone();
        let reporter = Arc::clone(&self.reporter);
        let result = source.walk(reporter.as_ref(), |entry| self.handle(entry));
        (self, result)
    }

    fn handle(&mut self, entry: SourceEntry<'_>) {
        self.stats.entries_seen += 1;

        if !self.window.admits(entry.path) {
            self.stats.entries_outside_window += 1;
            self.reporter.report(Diagnostic::OutsideWindow {
                path: entry.path.to_path_buf(),
            });
            return;
        }
        self.stats.entries_admitted += 1;

        let objects = match self.extractor.extract(entry.reader) {
            Ok(objects) => objects,
            Err(e) => {
                self.stats.parse_failures += 1;
                self.reporter.report(Diagnostic::ParseFailed {
                    path: entry.path.to_path_buf(),
                    error: e.to_string(),
                });
                return;
            }
        };

        if objects.is_empty() {
            self.stats.empty_sets += 1;
            self.reporter.report(Diagnostic::EmptyObjectSet {
                path: entry.path.to_path_buf(),
            });
        }

        match self.mode {
            DeliveryMode::Independent => {
                if objects.is_empty() {
                    return;
                }
                let shared = Arc::new(objects);
                for outlet in &mut self.outlets {
                    if outlet.deliver_blocking(&shared, self.reporter.as_ref()) {
                        self.stats.deliveries += 1;
                    }
                }
            }
            DeliveryMode::Cumulative => {
                self.accumulator = Some(match self.accumulator.take() {
                    Some(acc) => acc.merge(objects),
                    None => objects,
                });
            }
        }
    }
}

/// Traversal-to-analysis fan-out pipeline.
///
/// # Example
///
/// ```ignore
/// use sybil_hunter::{DeliveryMode, NetDocExtractor, Pipeline};
/// use std::path::Path;
///
/// let pipeline = Pipeline::new(NetDocExtractor::default());
/// let stats = pipeline
///     .run(Path::new("server-descriptors-2015-07.tar.xz"), DeliveryMode::Cumulative, analyses)
///     .await?;
/// println!("{} entries parsed", stats.entries_admitted);
/// ```
pub struct Pipeline {
    extractor: Arc<dyn ObjectExtractor>,
    reporter: Arc<dyn DiagnosticReporter>,
    window: DateWindow,
    channel_capacity: usize,
}

impl Pipeline {
    /// Creates a pipeline with an unbounded date window, diagnostics routed
    /// to `tracing` and [`DEFAULT_CHANNEL_CAPACITY`].
    pub fn new<X>(extractor: X) -> Self
    where
        X: ObjectExtractor + 'static,
    {
        Self {
            extractor: Arc::new(extractor),
            reporter: Arc::new(TracingReporter),
            window: DateWindow::unbounded(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Restricts consensus snapshots to `window`.
    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    /// Routes per-entry diagnostics to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn DiagnosticReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets how many sets each inbox buffers; clamped to at least 1.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Traverses `source` and feeds every analysis.
    ///
    /// Analyses are started before traversal begins. Once delivery is over
    /// every inbox is closed and the call waits for all analyses to finish,
    /// including when it is about to return an error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if:
    /// - The source cannot be opened, or an archive cannot be decompressed
    /// - Cumulative mode gathered no documents (nothing is delivered then)
    /// - The traversal thread panicked
    #[instrument(skip(self, source, analyses), fields(source = %source.display()))]
    pub async fn run(
        &self,
        source: &Path,
        mode: DeliveryMode,
        analyses: Vec<Box<dyn Analysis>>,
    ) -> Result<PipelineStats, PipelineError> {
        let start = Instant::now();

        let mut executor = AnalysisExecutor::new(self.channel_capacity);
        let outlets: Vec<Outlet> = analyses
            .into_iter()
            .map(|analysis| {
                let name = analysis.name().to_string();
                Outlet {
                    name,
                    tx: Some(executor.spawn(analysis)),
                }
            })
            .collect();

        let source = match Source::open(source) {
            Ok(source) => source,
            Err(e) => {
                drop(outlets);
                executor.wait().await;
                return Err(e.into());
            }
        };

        let extractor = self.extractor.extractor_id();
        match mode {
            DeliveryMode::Independent => info!(
                extractor,
                "Processing \"{}\" independently",
                source.path().display()
            ),
            DeliveryMode::Cumulative => info!(
                extractor,
                "Processing \"{}\" cumulatively",
                source.path().display()
            ),
        }

        let root = source.path().display().to_string();
        let traversal = Traversal {
            source,
            mode,
            window: self.window,
            extractor: Arc::clone(&self.extractor),
            reporter: Arc::clone(&self.reporter),
            outlets,
            accumulator: None,
            stats: PipelineStats::default(),
        };

        let joined = tokio::task::spawn_blocking(move || traversal.run()).await;
        let (traversal, walk_result) = match joined {
            Ok(done) => done,
            Err(e) => {
                // The outlets went down with the thread, so the inboxes are
                // already closed.
                executor.wait().await;
                return Err(PipelineError::Traversal(e.to_string()));
            }
        };

        let Traversal {
            mut outlets,
            accumulator,
            mut stats,
            ..
        } = traversal;

        let outcome = match walk_result {
            Err(e) => Err(PipelineError::Source(e)),
            Ok(()) if mode == DeliveryMode::Cumulative => match accumulator {
                Some(objects) if !objects.is_empty() => {
                    let shared = Arc::new(objects);
                    for outlet in &mut outlets {
                        if outlet.deliver(&shared, self.reporter.as_ref()).await {
                            stats.deliveries += 1;
                        }
                    }
                    Ok(())
                }
                _ => Err(PipelineError::EmptyInput(root)),
            },
            Ok(()) => Ok(()),
        };

        // Closing every inbox is the end-of-stream signal.
        drop(outlets);
        stats.analyses_failed = executor.wait().await;
        stats.duration = start.elapsed();

        match outcome {
            Ok(()) => {
                info!(
                    entries = stats.entries_seen,
                    admitted = stats.entries_admitted,
                    parse_failures = stats.parse_failures,
                    deliveries = stats.deliveries,
                    duration_ms = stats.duration.as_millis() as u64,
                    "Pipeline completed"
                );
                Ok(stats)
            }
            Err(e) => {
                warn!(error = %e, "Pipeline aborted");
                Err(e)
            }
        }
    }
}
