//! Built-in analyses.
//!
//! Every analysis writes to an injected `Write` sink so the binary can
//! point it at a file or stdout and tests at a buffer.

use crate::pipeline::traits::AnalysisError;

mod fingerprints;
mod matrix;
mod print;

pub use fingerprints::FingerprintChanges;
pub use matrix::{CsvFormat, SimilarityMatrix};
pub use print::PrettyPrint;

/// Runs `work` on the blocking pool against the state held in `slot`.
///
/// The state moves into the blocking task and back, so it must be owned.
/// After a panic in `work` the slot stays empty and later calls fail.
pub(crate) async fn offload<S, F>(slot: &mut Option<S>, work: F) -> Result<(), AnalysisError>
where
    S: Send + 'static,
    F: FnOnce(&mut S) -> Result<(), AnalysisError> + Send + 'static,
{
    let mut state = slot
        .take()
        .ok_or_else(|| AnalysisError::Failed("analysis state lost to an earlier panic".into()))?;

    let (state, result) = tokio::task::spawn_blocking(move || {
        let result = work(&mut state);
        (state, result)
    })
    .await
    .map_err(|e| AnalysisError::Failed(format!("Task join error: {}", e)))?;

    *slot = Some(state);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offload_returns_state() {
        let mut slot = Some(vec![1]);
        offload(&mut slot, |v: &mut Vec<i32>| {
            v.push(2);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(slot, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_offload_keeps_state_on_error() {
        let mut slot = Some(0u32);
        let result = offload(&mut slot, |n: &mut u32| {
            *n += 1;
            Err(AnalysisError::Failed("write failed".into()))
        })
        .await;
        assert!(matches!(result, Err(AnalysisError::Failed(_))));
        assert_eq!(slot, Some(1));
    }

    #[tokio::test]
    async fn test_offload_panic_is_an_error() {
        let mut slot = Some(0u32);
        let result = offload(&mut slot, |_: &mut u32| panic!("bug")).await;
        assert!(matches!(result, Err(AnalysisError::Failed(_))));
        assert!(slot.is_none());
        assert!(offload(&mut slot, |_: &mut u32| Ok(())).await.is_err());
    }
}
