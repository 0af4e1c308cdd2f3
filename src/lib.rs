pub mod cli;
pub mod core;
pub mod manifest;
pub mod stage;
pub mod tools;
pub mod upload;
pub mod utils;

pub use crate::core::{Config, SubmissionLayout, SubmissionManager};
pub use crate::stage::{Stage, StageController, StageReport, StageState};

use std::path::PathBuf;
use thiserror::Error;

use crate::upload::TransportError;

/// Main error type for catsup operations
#[derive(Error, Debug)]
pub enum CatsupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Cannot link {link:?} -> {original:?}: {source}")]
    Link {
        original: PathBuf,
        link: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline failed ({status}): {command}")]
    PipelineExecution { command: String, status: String },

    #[error("Pipeline produced no output in {0:?}")]
    PipelineOutput(PathBuf),

    #[error("Expected pipeline output is missing: {0:?}")]
    MissingOutput(PathBuf),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Upload of {file:?} failed after {attempts} attempts: {source}")]
    UploadExhausted {
        file: PathBuf,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Stage {stage} of submission '{submission}' is already running ({holder})")]
    StageBusy {
        submission: String,
        stage: Stage,
        holder: String,
    },

    #[error("Stage {stage} of submission '{submission}' already completed (use --force to run it again)")]
    StageAlreadyComplete { submission: String, stage: Stage },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CatsupError {
    /// Stable machine-readable name, used as the `reason` of stage failure records
    pub fn kind(&self) -> &'static str {
        match self {
            CatsupError::Io(_) => "io_error",
            CatsupError::Schema(_) => "schema_error",
            CatsupError::Validation(_) => "validation_error",
            CatsupError::Link { .. } => "link_error",
            CatsupError::PipelineExecution { .. } => "pipeline_execution_error",
            CatsupError::PipelineOutput(_) => "pipeline_output_error",
            CatsupError::MissingOutput(_) => "missing_output_error",
            CatsupError::Transport(_) => "transport_error",
            CatsupError::UploadExhausted { .. } => "upload_exhausted_error",
            CatsupError::Configuration(_) => "configuration_error",
            CatsupError::AlreadyExists(_) => "already_exists",
            CatsupError::NotFound(_) => "not_found",
            CatsupError::Precondition(_) => "precondition_failed",
            CatsupError::StageBusy { .. } => "stage_busy",
            CatsupError::StageAlreadyComplete { .. } => "stage_already_complete",
            CatsupError::Csv(_) => "csv_error",
            CatsupError::Serialization(_) => "serialization_error",
        }
    }
}

impl From<serde_json::Error> for CatsupError {
    fn from(err: serde_json::Error) -> Self {
        CatsupError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CatsupError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let schema = CatsupError::Schema("missing column".to_string());
        assert_eq!(format!("{}", schema), "Schema error: missing column");

        let validation = CatsupError::Validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(format!("{}", validation), "Validation failed: a; b");

        let config = CatsupError::Configuration("no destination".to_string());
        assert_eq!(format!("{}", config), "Configuration error: no destination");
    }

    #[test]
    fn test_error_kinds_are_stable() {
        let io_err: CatsupError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(io_err.kind(), "io_error");
        assert_eq!(
            CatsupError::PipelineOutput(PathBuf::from("upload")).kind(),
            "pipeline_output_error"
        );
        assert_eq!(
            CatsupError::UploadExhausted {
                file: PathBuf::from("a.fastq.gz"),
                attempts: 13,
                source: TransportError::new("par", "timeout"),
            }
            .kind(),
            "upload_exhausted_error"
        );
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{oops}");
        let err: CatsupError = parse.unwrap_err().into();
        match err {
            CatsupError::Serialization(msg) => assert!(msg.contains("key must be a string")),
            other => panic!("Expected Serialization error, got {:?}", other),
        }
    }
}
