//! Background stage execution.
//!
//! The stage is claimed on the caller's thread, so a duplicate start fails
//! synchronously with `StageBusy`; only the work itself moves to the worker.

use std::thread::{self, JoinHandle};
use tracing::error;

use super::{FailureRecord, Stage, StageGuard, StageReport};
use crate::Result;

pub struct StageRunner;

impl StageRunner {
    pub fn spawn<T, F>(guard: StageGuard, work: F) -> Result<StageHandle>
    where
        T: 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let submission = guard.submission().to_string();
        let stage = guard.stage();
        let worker_submission = submission.clone();

        let handle = thread::Builder::new()
            .name(format!("catsup-{}-{}", submission, stage))
            .spawn(move || {
                let result = guard.run(work);
                StageReport::from_result(&worker_submission, stage, &result)
            })?;

        Ok(StageHandle {
            submission,
            stage,
            handle,
        })
    }
}

/// A stage running on a worker thread
#[derive(Debug)]
pub struct StageHandle {
    submission: String,
    stage: Stage,
    handle: JoinHandle<StageReport>,
}

impl StageHandle {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn submission(&self) -> &str {
        &self.submission
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return its report
    pub fn join(self) -> StageReport {
        match self.handle.join() {
            Ok(report) => report,
            Err(_) => {
                error!("Worker for stage {} of {} panicked", self.stage, self.submission);
                StageReport::failure(
                    &self.submission,
                    self.stage,
                    FailureRecord::new("worker_panicked", "the stage worker thread panicked"),
                )
            }
        }
    }
}
