//! Stage state machine for one submission.
//!
//! Every stage run follows the same sequence: take the stage lock, check
//! preconditions, write Running, run the work, then write Ok or Error. The
//! lock is held until the outcome is recorded.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, warn};

use super::{
    FailureRecord, Stage, StageLock, StageRecord, StageState, StageStatus, StageStore,
    SubmissionStatus,
};
use crate::core::SubmissionLayout;
use crate::{CatsupError, Result};

#[derive(Debug, Clone)]
pub struct StageController {
    layout: SubmissionLayout,
    store: StageStore,
}

impl StageController {
    pub fn new(layout: SubmissionLayout) -> Self {
        let store = StageStore::new(layout.clone());
        Self { layout, store }
    }

    pub fn layout(&self) -> &SubmissionLayout {
        &self.layout
    }

    pub fn store(&self) -> &StageStore {
        &self.store
    }

    pub fn state(&self, stage: Stage) -> Result<StageState> {
        self.store.state(stage)
    }

    /// Stage the on-disk artifacts point at
    pub fn detect_current_stage(&self) -> Stage {
        if self.layout.upload_dir().exists() {
            Stage::Upload
        } else if self.layout.pipeline_in().exists() {
            Stage::Pipeline
        } else if self.layout.inputs_csv().exists() {
            Stage::Prepare
        } else {
            Stage::Template
        }
    }

    /// Stage a `run` should execute, or None once upload has completed.
    /// Artifacts of a stage that failed or was interrupted can make detection
    /// overshoot, so step back while the previous stage did not finish.
    pub fn next_stage(&self) -> Result<Option<Stage>> {
        let mut stage = self.detect_current_stage();
        while let Some(previous) = stage.previous() {
            match self.state(previous)? {
                StageState::Running | StageState::Error => stage = previous,
                _ => break,
            }
        }

        match self.state(stage)? {
            StageState::Ok => Ok(stage.next()),
            _ => Ok(Some(stage)),
        }
    }

    pub fn status(&self) -> Result<SubmissionStatus> {
        let mut stages = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let record = self.store.load(stage)?;
            stages.push(match record {
                Some(record) => StageStatus {
                    stage,
                    state: record.state,
                    updated_at: Some(record.updated_at),
                    failure: record.failure,
                },
                None => StageStatus {
                    stage,
                    state: StageState::NotStarted,
                    updated_at: None,
                    failure: None,
                },
            });
        }

        Ok(SubmissionStatus {
            submission: self.layout.name().to_string(),
            current_stage: self.detect_current_stage(),
            next_stage: self.next_stage()?,
            stages,
        })
    }

    /// Rewrite Running records whose owner is gone to Error(`interrupted`).
    /// Returns the stages that were recovered.
    pub fn recover_interrupted(&self) -> Result<Vec<Stage>> {
        let mut recovered = Vec::new();

        for stage in Stage::ALL {
            if self.state(stage)? != StageState::Running {
                continue;
            }
            let _lock = match StageLock::try_acquire(&self.layout, stage) {
                Ok(lock) => lock,
                Err(CatsupError::StageBusy { .. }) => continue,
                Err(e) => return Err(e),
            };
            if let Some(record) = self.store.load(stage)? {
                if record.state == StageState::Running {
                    self.mark_interrupted(&record)?;
                    recovered.push(stage);
                }
            }
        }

        Ok(recovered)
    }

    /// Forget the outcome of `stage` so it can run again. A stage that is
    /// currently running cannot be reset; a lock file nobody can read is
    /// cleared along with the record.
    pub fn reset(&self, stage: Stage) -> Result<()> {
        let _lock = match StageLock::try_acquire(&self.layout, stage) {
            Err(CatsupError::StageBusy { .. }) if StageLock::is_unreadable(&self.layout, stage) => {
                warn!(
                    "Removing unreadable lock {}",
                    self.layout.stage_lock(stage).display()
                );
                StageLock::force_release(&self.layout, stage)?;
                StageLock::try_acquire(&self.layout, stage)?
            }
            acquired => acquired?,
        };
        self.store.clear(stage)?;
        info!("Reset stage {} of {}", stage, self.layout.name());
        Ok(())
    }

    /// Claim `stage` for a run. Fails without writing any record when the
    /// stage is busy, its preconditions do not hold, or it already completed
    /// and `force` is not set.
    pub fn begin(&self, stage: Stage, force: bool) -> Result<StageGuard> {
        let lock = StageLock::try_acquire(&self.layout, stage)?;

        // Holding the lock, a Running record can only be a leftover
        if let Some(record) = self.store.load(stage)? {
            if record.state == StageState::Running {
                self.mark_interrupted(&record)?;
            }
        }

        self.check_preconditions(stage)?;

        if !force && self.state(stage)? == StageState::Ok {
            return Err(CatsupError::StageAlreadyComplete {
                submission: self.layout.name().to_string(),
                stage,
            });
        }

        Ok(StageGuard {
            submission: self.layout.name().to_string(),
            stage,
            store: self.store.clone(),
            _lock: lock,
        })
    }

    /// Run `work` as `stage`, recording its outcome
    pub fn run_stage<T, F>(&self, stage: Stage, force: bool, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.begin(stage, force)?.run(work)
    }

    fn check_preconditions(&self, stage: Stage) -> Result<()> {
        let precondition = |msg: String| -> Result<()> { Err(CatsupError::Precondition(msg)) };

        match stage {
            Stage::Template => {
                if self.layout.inputs_csv().exists() {
                    return Err(CatsupError::AlreadyExists(format!(
                        "{} exists, won't overwrite",
                        self.layout.inputs_csv().display()
                    )));
                }
            }
            Stage::Prepare => {
                if !self.layout.inputs_csv().exists() {
                    return precondition(format!(
                        "{} doesn't exist; create the template first",
                        self.layout.inputs_csv().display()
                    ));
                }
            }
            Stage::Pipeline => {
                if !self.layout.pipeline_in().is_dir() || !self.layout.processing_manifest().exists() {
                    return precondition(format!(
                        "submission '{}' has not been prepared",
                        self.layout.name()
                    ));
                }
            }
            Stage::Upload => {
                if !self.layout.upload_dir().is_dir() || !self.layout.processing_manifest().exists() {
                    return precondition(format!(
                        "submission '{}' has no pipeline output to upload",
                        self.layout.name()
                    ));
                }
            }
        }

        if let Some(previous) = stage.previous() {
            match self.state(previous)? {
                StageState::Running => {
                    return precondition(format!("stage {} is still running", previous));
                }
                StageState::Error => {
                    return precondition(format!(
                        "stage {} failed; fix it and run it again first",
                        previous
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn mark_interrupted(&self, record: &StageRecord) -> Result<()> {
        warn!(
            "Stage {} of {} was interrupted (pid {} on {})",
            record.stage,
            self.layout.name(),
            record.pid,
            record.hostname
        );
        self.store.mark_error(
            record.stage,
            FailureRecord::interrupted(format!(
                "run by pid {} on {} started {} and never finished",
                record.pid,
                record.hostname,
                record.updated_at.to_rfc3339()
            )),
        )
    }
}

/// Exclusive right to run one stage; releases the lock when dropped
#[derive(Debug)]
pub struct StageGuard {
    submission: String,
    stage: Stage,
    store: StageStore,
    _lock: StageLock,
}

impl StageGuard {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn submission(&self) -> &str {
        &self.submission
    }

    /// Run `work` with the stage marked Running. A panic in `work` is
    /// recorded as `worker_panicked` before it continues to unwind.
    pub fn run<T, F>(self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        info!("*** Preprocessing step: {}", self.stage.description());
        self.store.mark_running(self.stage)?;

        let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Stage {} of {} panicked: {}", self.stage, self.submission, message);
                if let Err(e) = self
                    .store
                    .mark_error(self.stage, FailureRecord::new("worker_panicked", message))
                {
                    error!("Failed to record the panic of stage {}: {}", self.stage, e);
                }
                panic::resume_unwind(payload);
            }
        };

        match outcome {
            Ok(value) => {
                self.store.mark_ok(self.stage)?;
                info!("*** Finished preprocessing step: {}", self.stage.description());
                if let Some(next) = self.stage.next() {
                    info!("*** Next step: {}", next.description());
                }
                Ok(value)
            }
            Err(e) => {
                error!("Stage {} of {} failed: {}", self.stage, self.submission, e);
                if let Err(record_err) = self.store.mark_error(self.stage, FailureRecord::from_error(&e)) {
                    error!("Failed to record the failure of stage {}: {}", self.stage, record_err);
                }
                Err(e)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "the stage worker panicked".to_string()
    }
}
