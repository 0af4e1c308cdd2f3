//! Persistence of stage records.
//!
//! Each stage owns a single JSON file, so replacing it via atomic rename is
//! enough for pollers to only ever see one of Running, Ok or Error.

use std::fs;
use std::io;
use tracing::debug;

use super::{FailureRecord, Stage, StageRecord, StageState};
use crate::core::SubmissionLayout;
use crate::utils::write_json_atomic;
use crate::{CatsupError, Result};

#[derive(Debug, Clone)]
pub struct StageStore {
    layout: SubmissionLayout,
}

impl StageStore {
    pub fn new(layout: SubmissionLayout) -> Self {
        Self { layout }
    }

    pub fn load(&self, stage: Stage) -> Result<Option<StageRecord>> {
        let path = self.layout.stage_record(stage);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: StageRecord = serde_json::from_str(&content).map_err(|e| {
            CatsupError::Serialization(format!("corrupt stage record {}: {}", path.display(), e))
        })?;
        Ok(Some(record))
    }

    pub fn state(&self, stage: Stage) -> Result<StageState> {
        Ok(self
            .load(stage)?
            .map(|record| record.state)
            .unwrap_or(StageState::NotStarted))
    }

    pub fn save(&self, record: &StageRecord) -> Result<()> {
        debug!(
            "Stage {} of {} -> {}",
            record.stage,
            self.layout.name(),
            record.state
        );
        write_json_atomic(&self.layout.stage_record(record.stage), record)
    }

    /// Back to NotStarted
    pub fn clear(&self, stage: Stage) -> Result<()> {
        match fs::remove_file(self.layout.stage_record(stage)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn mark_running(&self, stage: Stage) -> Result<()> {
        self.save(&StageRecord::new(stage, StageState::Running, None))
    }

    pub fn mark_ok(&self, stage: Stage) -> Result<()> {
        self.save(&StageRecord::new(stage, StageState::Ok, None))
    }

    pub fn mark_error(&self, stage: Stage, failure: FailureRecord) -> Result<()> {
        self.save(&StageRecord::new(stage, StageState::Error, Some(failure)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StageStore {
        StageStore::new(SubmissionLayout::new(dir.path(), "sub1").unwrap())
    }

    #[test]
    fn test_missing_record_is_not_started() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).state(Stage::Prepare).unwrap(), StageState::NotStarted);
    }

    #[test]
    fn test_transitions_replace_each_other() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.mark_running(Stage::Pipeline).unwrap();
        assert_eq!(store.state(Stage::Pipeline).unwrap(), StageState::Running);

        store
            .mark_error(Stage::Pipeline, FailureRecord::new("pipeline_execution_error", "exit 1"))
            .unwrap();
        let record = store.load(Stage::Pipeline).unwrap().unwrap();
        assert_eq!(record.state, StageState::Error);
        assert_eq!(record.failure.unwrap().reason, "pipeline_execution_error");

        store.mark_ok(Stage::Pipeline).unwrap();
        let record = store.load(Stage::Pipeline).unwrap().unwrap();
        assert_eq!(record.state, StageState::Ok);
        assert!(record.failure.is_none());

        store.clear(Stage::Pipeline).unwrap();
        store.clear(Stage::Pipeline).unwrap();
        assert_eq!(store.state(Stage::Pipeline).unwrap(), StageState::NotStarted);
    }

    #[test]
    fn test_stages_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.mark_ok(Stage::Template).unwrap();
        store.mark_running(Stage::Prepare).unwrap();

        assert_eq!(store.state(Stage::Template).unwrap(), StageState::Ok);
        assert_eq!(store.state(Stage::Upload).unwrap(), StageState::NotStarted);
    }

    #[test]
    fn test_corrupt_record() {
        let dir = TempDir::new().unwrap();
        let layout = SubmissionLayout::new(dir.path(), "sub1").unwrap();
        fs::create_dir_all(layout.stages_dir()).unwrap();
        fs::write(layout.stage_record(Stage::Upload), "{not json").unwrap();

        let result = StageStore::new(layout).load(Stage::Upload);
        assert!(matches!(result, Err(CatsupError::Serialization(_))));
    }
}
