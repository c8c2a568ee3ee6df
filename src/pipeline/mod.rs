//! Pipeline module - concurrent fan-out of parsed documents to analyses.
//!
//! - **Contract**: [`Analysis`] tasks consume an [`Inbox`] until it closes
//! - **Orchestration**: [`Pipeline`] traverses, extracts and delivers in
//!   [`DeliveryMode::Independent`] or [`DeliveryMode::Cumulative`] mode
//! - **Errors**: only [`PipelineError`] reaches the caller; everything else is
//!   a diagnostic

pub mod orchestrator;
pub mod traits;

pub use orchestrator::{
    DeliveryMode, Pipeline, PipelineError, PipelineStats, DEFAULT_CHANNEL_CAPACITY,
};
pub use traits::{Analysis, AnalysisError, Inbox};
