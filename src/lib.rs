//! Sybil Hunter - detect groups of related Tor relays in archived directory
//! data.
//!
//! Server descriptors and consensuses are read from a file, a directory tree
//! or a `.tar.xz` archive, parsed into [`ObjectSet`]s and fanned out to
//! concurrently running analyses such as the pairwise [`similarity`] matrix.

pub mod analysis;
pub mod config;
pub mod diagnostics;
pub mod executor;
pub mod model;
pub mod netdoc;
pub mod pipeline;
pub mod similarity;
pub mod source;
pub mod traits;

// Re-export common types for convenience
pub use diagnostics::{Diagnostic, MemoryReporter, TracingReporter};
pub use model::*;
pub use netdoc::{NetDocExtractor, ObjectFilter};
pub use pipeline::{
    Analysis, AnalysisError, DeliveryMode, Inbox, Pipeline, PipelineError, PipelineStats,
};
pub use source::{DateWindow, Source, SourceError};
pub use traits::*;
