use crate::diagnostics::Diagnostic;
use crate::model::ObjectSet;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unknown document type starting with {0:?}")]
    UnknownFormat(String),
    #[error("Malformed `{keyword}` line {line}: {reason}")]
    Malformed {
        line: usize,
        keyword: String,
        reason: String,
    },
    #[error("Missing `{field}` in {document} starting at line {line}")]
    MissingField {
        document: &'static str,
        field: &'static str,
        line: usize,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Turns the content of one traversal entry into parsed documents.
pub trait ObjectExtractor: Send + Sync {
    /// Returns a short name for this extractor, used in logs.
    fn extractor_id(&self) -> &str;

    /// Parses the whole stream into an [`ObjectSet`]. A failure only affects
    /// the entry being parsed.
    fn extract(&self, content: &mut dyn Read) -> Result<ObjectSet, ParseError>;
}

/// Sink for per-entry diagnostics raised during traversal and delivery.
pub trait DiagnosticReporter: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}
