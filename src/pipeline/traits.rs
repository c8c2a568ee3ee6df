//! The contract every analysis plugged into the pipeline satisfies.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::ObjectSet;

/// Receiving end of an analysis' dedicated channel.
///
/// Values are shared with every other analysis and must be treated as
/// read-only.
pub type Inbox = mpsc::Receiver<Arc<ObjectSet>>;

/// Errors raised by an analysis while consuming its inbox.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Writing results failed
    #[error("Failed to write results: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing a document failed
    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Analysis-specific failure
    #[error("Analysis failed: {0}")]
    Failed(String),
}

/// A consumer of parsed [`ObjectSet`]s.
///
/// The pipeline spawns each analysis as its own task and hands it an
/// [`Inbox`]. Implementations must keep receiving until the inbox yields
/// `None`; the pipeline only returns once every analysis has.
///
/// # Example
///
/// ```ignore
/// struct CountRelays(usize);
///
/// #[async_trait]
/// impl Analysis for CountRelays {
///     fn name(&self) -> &str {
///         "count"
///     }
///
///     async fn run(&mut self, mut inbox: Inbox) -> Result<(), AnalysisError> {
///         while let Some(set) = inbox.recv().await {
///             self.0 += set.len();
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Analysis: Send {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Consumes the inbox until it is closed, then performs any final
    /// reporting.
    async fn run(&mut self, inbox: Inbox) -> Result<(), AnalysisError>;
}
