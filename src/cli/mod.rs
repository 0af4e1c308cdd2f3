pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::core::config::{load_config, Config};
use crate::core::{paths, SubmissionManager};
use crate::stage::StageReport;

#[derive(Parser)]
#[command(
    name = "catsup",
    version,
    about = "Prepare, decontaminate and upload sequencing sample submissions",
    long_about = "catsup moves a submission through four stages: an input manifest template, \
                  identity and rename preparation, the external decontamination pipeline, and \
                  upload of the cleaned reads. Progress is recorded on disk so every stage can \
                  be inspected, resumed or re-run."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to $CATSUP_CONFIG or ~/.catsup/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the submissions
    #[arg(long, global = true, value_name = "DIR", env = "CATSUP_SUBMISSIONS_DIR")]
    pub submissions_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a submission and its input manifest
    Template(commands::template::TemplateArgs),

    /// Assign sample identifiers, hash and link the read files
    Prepare(commands::stage::StageArgs),

    /// Run the decontamination pipeline
    Pipeline(commands::stage::StageArgs),

    /// Upload the cleaned reads and the processing manifest
    Upload(commands::stage::StageArgs),

    /// Run whichever stage a submission needs next
    Run(commands::run::RunArgs),

    /// Show the stage states of a submission
    Status(commands::status::StatusArgs),

    /// List submissions, most recently modified first
    List(commands::status::ListArgs),

    /// Forget the outcome of a stage so it can run again
    Reset(commands::reset::ResetArgs),

    /// Manage the configuration file
    Config(commands::config::ConfigArgs),
}

/// Global options every command needs
#[derive(Debug, Clone)]
pub struct Context {
    pub config_path: PathBuf,
    pub submissions_dir: Option<PathBuf>,
    pub verbose: u8,
}

impl Cli {
    pub fn context(&self) -> Context {
        Context {
            config_path: self.config.clone().unwrap_or_else(paths::config_path),
            submissions_dir: self.submissions_dir.clone(),
            verbose: self.verbose,
        }
    }
}

impl Context {
    /// The configuration file, or defaults when there is none yet
    pub fn load_config(&self) -> anyhow::Result<Config> {
        load_config_or_default(&self.config_path)
    }

    pub fn manager(&self) -> anyhow::Result<SubmissionManager> {
        let manager = SubmissionManager::new(self.load_config()?);
        Ok(match &self.submissions_dir {
            Some(dir) => manager.with_base_dir(dir),
            None => manager,
        })
    }
}

fn load_config_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Ok(load_config(path)?)
    } else {
        debug!("No configuration at {}, using defaults", path.display());
        Ok(Config::default())
    }
}

/// A stage that ran on a worker and failed
#[derive(Error, Debug)]
#[error("Stage {} of '{}' failed: {}", .0.stage, .0.submission, .0.detail.as_deref().unwrap_or("unknown error"))]
pub struct StageFailure(pub StageReport);

/// Process exit code for a failure reason
pub fn exit_code(kind: &str) -> i32 {
    match kind {
        "configuration_error" => 2,
        "io_error" | "link_error" => 3,
        "schema_error" | "validation_error" | "csv_error" => 4,
        "pipeline_execution_error" | "pipeline_output_error" => 5,
        "transport_error" | "upload_exhausted_error" | "missing_output_error" => 6,
        "stage_busy" | "stage_already_complete" | "precondition_failed" | "already_exists" => 7,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{FailureRecord, Stage};
    use crate::CatsupError;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stage_command() {
        let cli = Cli::try_parse_from(["catsup", "-vv", "prepare", "sub1", "--force", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Prepare(args) => {
                assert_eq!(args.name, "sub1");
                assert!(args.force);
                assert!(args.json);
            }
            _ => panic!("Expected prepare"),
        }
    }

    #[test]
    fn test_exit_codes_follow_error_class() {
        assert_eq!(exit_code(CatsupError::Configuration(String::new()).kind()), 2);
        assert_eq!(exit_code(CatsupError::Validation(vec![]).kind()), 4);
        assert_eq!(exit_code(CatsupError::PipelineOutput(PathBuf::new()).kind()), 5);
        assert_eq!(exit_code(CatsupError::MissingOutput(PathBuf::new()).kind()), 6);
        assert_eq!(exit_code(CatsupError::Precondition(String::new()).kind()), 7);
        assert_eq!(exit_code("interrupted"), 1);
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.pipeline.name, "catnip");
    }

    #[test]
    fn test_stage_failure_message() {
        let report = StageReport::failure("sub1", Stage::Upload, FailureRecord::new("transport_error", "par: 503"));
        assert_eq!(StageFailure(report).to_string(), "Stage upload of 'sub1' failed: par: 503");
    }
}
