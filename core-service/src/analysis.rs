//! Wall-clock ceiling for the AI analysis call.
//!
//! The analysis service is opaque to the core. A slow or hanging call must
//! not pin a "processing" UI state forever, so the caller gets control back
//! after the deadline while the work keeps running in the background.

use core_async::task::{self, JoinHandle};
use core_async::time::{timeout, Duration};
use std::future::Future;
use tracing::warn;

use crate::{Result, ServiceError};

/// Result of racing an analysis against its deadline.
#[derive(Debug)]
pub enum AnalysisOutcome<T> {
    Completed(T),
    /// Deadline hit; the handle resolves once the analysis finishes.
    StillRunning(JoinHandle<T>),
}

impl<T> AnalysisOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            AnalysisOutcome::Completed(value) => Some(value),
            AnalysisOutcome::StillRunning(_) => None,
        }
    }
}

/// Run `analysis` on the runtime and wait for it at most `deadline`.
///
/// # Errors
///
/// [`ServiceError::AnalysisAborted`] if the task panicked before the deadline.
pub async fn run_with_deadline<F, T>(deadline: Duration, analysis: F) -> Result<AnalysisOutcome<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = task::spawn(analysis);

    match timeout(deadline, &mut handle).await {
        Ok(Ok(value)) => Ok(AnalysisOutcome::Completed(value)),
        Ok(Err(join_error)) => Err(ServiceError::AnalysisAborted(join_error.to_string())),
        Err(_) => {
            warn!(
                deadline_secs = deadline.as_secs_f64(),
                "Analysis exceeded its deadline, continuing in background"
            );
            Ok(AnalysisOutcome::StillRunning(handle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::sync::oneshot;

    #[core_async::test]
    async fn test_fast_analysis_completes() {
        let outcome = run_with_deadline(Duration::from_secs(5), async { 7 })
            .await
            .unwrap();

        assert_eq!(outcome.completed(), Some(7));
    }

    #[core_async::test]
    async fn test_slow_analysis_keeps_running() {
        let (release, wait) = oneshot::channel::<()>();

        let outcome = run_with_deadline(Duration::from_millis(20), async move {
            wait.await.ok();
            "exercises"
        })
        .await
        .unwrap();

        let handle = match outcome {
            AnalysisOutcome::StillRunning(handle) => handle,
            AnalysisOutcome::Completed(_) => panic!("analysis should not have finished"),
        };

        release.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), "exercises");
    }

    #[core_async::test]
    async fn test_panicking_analysis_is_reported() {
        let result = run_with_deadline(Duration::from_secs(5), async {
            if true {
                panic!("model crashed");
            }
            0
        })
        .await;

        assert!(matches!(result, Err(ServiceError::AnalysisAborted(_))));
    }
}
