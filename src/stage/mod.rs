//! Submission stage lifecycle
//!
//! A submission moves through four ordered stages. Each stage has one
//! persisted record in `.stages/<stage>.json`; the absence of a record means
//! the stage has not started. While a stage runs, `.stages/<stage>.lock`
//! names the process that owns it.

pub mod controller;
pub mod lock;
pub mod runner;
pub mod store;

pub use controller::{StageController, StageGuard};
pub use lock::StageLock;
pub use runner::{StageHandle, StageRunner};
pub use store::StageStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CatsupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Template,
    Prepare,
    Pipeline,
    Upload,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Template, Stage::Prepare, Stage::Pipeline, Stage::Upload];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Template => "template",
            Stage::Prepare => "prepare",
            Stage::Pipeline => "pipeline",
            Stage::Upload => "upload",
        }
    }

    /// 1-based position in the lifecycle
    pub fn number(&self) -> u8 {
        match self {
            Stage::Template => 1,
            Stage::Prepare => 2,
            Stage::Pipeline => 3,
            Stage::Upload => 4,
        }
    }

    pub fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Template => None,
            Stage::Prepare => Some(Stage::Template),
            Stage::Pipeline => Some(Stage::Prepare),
            Stage::Upload => Some(Stage::Pipeline),
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Template => Some(Stage::Prepare),
            Stage::Prepare => Some(Stage::Pipeline),
            Stage::Pipeline => Some(Stage::Upload),
            Stage::Upload => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Stage::Template => "user template",
            Stage::Prepare => "prepare data",
            Stage::Pipeline => "nextflow pipeline",
            Stage::Upload => "s3 upload",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "template" | "1" => Ok(Stage::Template),
            "prepare" | "2" => Ok(Stage::Prepare),
            "pipeline" | "3" => Ok(Stage::Pipeline),
            "upload" | "4" => Ok(Stage::Upload),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    NotStarted,
    Running,
    Ok,
    Error,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::NotStarted => "not_started",
            StageState::Running => "running",
            StageState::Ok => "ok",
            StageState::Error => "error",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage ended in Error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub status: String,
    pub reason: String,
    pub detail: String,
}

impl FailureRecord {
    pub fn new(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    pub fn from_error(error: &CatsupError) -> Self {
        Self::new(error.kind(), error.to_string())
    }

    /// A run whose owner disappeared without recording an outcome
    pub fn interrupted(detail: impl Into<String>) -> Self {
        Self::new("interrupted", detail)
    }
}

/// Persisted state of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub state: StageState,
    pub updated_at: DateTime<Utc>,
    pub pid: u32,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

impl StageRecord {
    pub fn new(stage: Stage, state: StageState, failure: Option<FailureRecord>) -> Self {
        Self {
            stage,
            state,
            updated_at: Utc::now(),
            pid: std::process::id(),
            hostname: lock::current_hostname(),
            failure,
        }
    }
}

/// Outcome of one stage run, as handed to API callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub submission: String,
    pub stage: Stage,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageReport {
    pub fn success(submission: &str, stage: Stage) -> Self {
        Self {
            submission: submission.to_string(),
            stage,
            status: "success".to_string(),
            reason: None,
            detail: None,
        }
    }

    pub fn failure(submission: &str, stage: Stage, failure: FailureRecord) -> Self {
        Self {
            submission: submission.to_string(),
            stage,
            status: failure.status,
            reason: Some(failure.reason),
            detail: Some(failure.detail),
        }
    }

    pub fn from_error(submission: &str, stage: Stage, error: &CatsupError) -> Self {
        Self::failure(submission, stage, FailureRecord::from_error(error))
    }

    pub fn from_result<T>(submission: &str, stage: Stage, result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => Self::success(submission, stage),
            Err(e) => Self::from_error(submission, stage, e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// One stage in a status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub state: StageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

/// Snapshot of every stage of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionStatus {
    pub submission: String,
    pub current_stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<Stage>,
    pub stages: Vec<StageStatus>,
}

impl SubmissionStatus {
    pub fn state_of(&self, stage: Stage) -> StageState {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.state)
            .unwrap_or(StageState::NotStarted)
    }
}
