//! Non-fatal diagnostics and the reporters that receive them.

use crate::traits::DiagnosticReporter;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Something went wrong with a single entry or consumer. None of these stop
/// the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An entry could not be opened or listed.
    EntryUnreadable { path: PathBuf, error: String },
    /// A snapshot's file name places it outside the requested date window.
    OutsideWindow { path: PathBuf },
    /// The extractor rejected the entry's content.
    ParseFailed { path: PathBuf, error: String },
    /// The entry parsed but held no documents after filtering.
    EmptyObjectSet { path: PathBuf },
    /// An analysis dropped its inbox before the stream ended.
    ConsumerGone { analysis: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::EntryUnreadable { path, error } => {
                write!(f, "cannot read {}: {}", path.display(), error)
            }
            Diagnostic::OutsideWindow { path } => {
                write!(f, "{} not in desired date range", path.display())
            }
            Diagnostic::ParseFailed { path, error } => {
                write!(f, "cannot parse {}: {}", path.display(), error)
            }
            Diagnostic::EmptyObjectSet { path } => {
                write!(f, "{} yielded no documents", path.display())
            }
            Diagnostic::ConsumerGone { analysis } => {
                write!(f, "analysis '{}' stopped reading its inbox", analysis)
            }
        }
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl DiagnosticReporter for TracingReporter {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::OutsideWindow { .. } | Diagnostic::EmptyObjectSet { .. } => {
                debug!("{}", diagnostic)
            }
            _ => warn!("{}", diagnostic),
        }
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticReporter for MemoryReporter {
    fn report(&self, diagnostic: Diagnostic) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reporter_keeps_order() {
        let reporter = MemoryReporter::new();
        reporter.report(Diagnostic::OutsideWindow {
            path: PathBuf::from("a"),
        });
        reporter.report(Diagnostic::ConsumerGone {
            analysis: "matrix".to_string(),
        });

        let seen = reporter.diagnostics();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], Diagnostic::OutsideWindow { .. }));
        assert_eq!(
            seen[1].to_string(),
            "analysis 'matrix' stopped reading its inbox"
        );
    }
}
