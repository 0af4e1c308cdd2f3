//! Common test utilities for catsup integration tests
//!
//! Provides a temporary submissions directory, read-file fixtures and a
//! scripted command executor standing in for nextflow and s3cmd.
#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use catsup::core::config::PipelineDefinition;
use catsup::core::SubmissionManager;
use catsup::manifest::{write_rows, InputRow, INPUT_FIELDS};
use catsup::tools::{CommandExecutor, CommandOutput, ExternalCommand};
use catsup::upload::RecordingSleeper;
use catsup::Config;

pub const SCRIPT: &str = "/opt/catnip/main.nf";

/// Test environment that manages temporary directories and cleanup
pub struct TestEnvironment {
    temp_dir: TempDir,
    pub submissions: PathBuf,
    pub reads: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let submissions = temp_dir.path().join("submissions");
        let reads = temp_dir.path().join("reads");
        fs::create_dir_all(&submissions).expect("Failed to create submissions dir");
        fs::create_dir_all(&reads).expect("Failed to create reads dir");

        TestEnvironment {
            temp_dir,
            submissions,
            reads,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join(relative)
    }

    /// Create read files whose content is their own name
    pub fn write_reads(&self, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = self.reads.join(name);
                fs::write(&path, format!("@{}\nACGT\n+\nIIII\n", name)).unwrap();
                path
            })
            .collect()
    }

    pub fn manager(&self, config: Config, executor: Arc<ScriptedExecutor>) -> SubmissionManager {
        SubmissionManager::new(config)
            .with_base_dir(&self.submissions)
            .with_executor(executor)
    }

    pub fn manager_with_sleeper(
        &self,
        config: Config,
        executor: Arc<ScriptedExecutor>,
        sleeper: Arc<RecordingSleeper>,
    ) -> SubmissionManager {
        self.manager(config, executor).with_sleeper(sleeper)
    }
}

/// Configuration with a pipeline and, optionally, a bucket destination
pub fn test_config(bucket: bool) -> Config {
    let mut config = Config::default();
    config.pipelines.insert(
        "catnip".to_string(),
        PipelineDefinition {
            script: SCRIPT.to_string(),
            image: "catdrop.img".to_string(),
            short_read_reference: "/refs/short.fa".to_string(),
            long_read_reference: Some("/refs/long.mmi".to_string()),
        },
    );
    if bucket {
        config.upload.bucket = Some("s3://submissions".to_string());
        config.upload.s3cmd_config = Some("/etc/s3cfg".to_string());
    }
    config
}

pub fn input_row(index: usize, subindex: usize, sample_name: &str, filename: &Path) -> InputRow {
    InputRow {
        index: index.to_string(),
        subindex: subindex.to_string(),
        sample_name: sample_name.to_string(),
        sample_filename: filename.to_string_lossy().to_string(),
        sample_file_extension: "fastq.gz".to_string(),
        sample_host: "Homo sapiens".to_string(),
        sample_collection_date: "2020-01-30".to_string(),
        sample_country: "United Kingdom".to_string(),
        submission_title: "Bacteria infection study".to_string(),
        submission_description: "Bacteria infection study for drug resistance".to_string(),
        submitter_organisation: "University of Oxford".to_string(),
        submitter_email: "someone@example.org".to_string(),
        instrument_platform: "Illumina pair-ended sequencing".to_string(),
        instrument_model: "Illumina HiSeq 4000".to_string(),
        instrument_flowcell: "96".to_string(),
    }
}

pub fn write_input_manifest(path: &Path, rows: &[InputRow]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    write_rows(path, &INPUT_FIELDS, rows).unwrap();
}

/// What the fake pipeline does when invoked
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineBehaviour {
    /// Write a cleaned copy of every linked input
    Clean,
    /// Exit 0 without writing anything
    NoOutput,
    /// Exit 1
    Fail,
}

/// Records every command; plays nextflow and s3cmd
pub struct ScriptedExecutor {
    calls: Mutex<Vec<ExternalCommand>>,
    pipeline: PipelineBehaviour,
    s3cmd_failures: u32,
}

impl ScriptedExecutor {
    pub fn new(pipeline: PipelineBehaviour) -> Arc<Self> {
        Self::with_s3cmd_failures(pipeline, 0)
    }

    /// s3cmd fails its first `failures` invocations
    pub fn with_s3cmd_failures(pipeline: PipelineBehaviour, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            pipeline,
            s3cmd_failures: failures,
        })
    }

    pub fn calls(&self) -> Vec<ExternalCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<ExternalCommand> {
        self.calls().into_iter().filter(|c| c.program == program).collect()
    }

    fn run_pipeline(&self, command: &ExternalCommand) -> io::Result<CommandOutput> {
        match self.pipeline {
            PipelineBehaviour::Fail => return Ok(CommandOutput::failure(1, "pipeline failed")),
            PipelineBehaviour::NoOutput => return Ok(CommandOutput::success()),
            PipelineBehaviour::Clean => {}
        }

        let run_dir = command.current_dir.clone().unwrap_or_default();
        let output = run_dir.join("../upload");
        fs::create_dir_all(&output)?;
        for entry in fs::read_dir(run_dir.join("../pipeline_in"))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let (stem, extension) = name.split_once('.').unwrap();
            let (sample, occurrence) = stem.rsplit_once('_').unwrap();
            let cleaned = fs::read(entry.path())?;
            fs::write(output.join(format!("{}_C{}.{}", sample, occurrence, extension)), cleaned)?;
        }
        fs::write(run_dir.join(".nextflow.log"), "pipeline completed\n")?;
        Ok(CommandOutput::success())
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &ExternalCommand) -> io::Result<CommandOutput> {
        let s3cmd_calls = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(command.clone());
            calls.iter().filter(|c| c.program == "s3cmd").count() as u32
        };

        if command.program == "s3cmd" {
            if s3cmd_calls <= self.s3cmd_failures {
                return Ok(CommandOutput::failure(1, "ERROR: Connection reset"));
            }
            return Ok(CommandOutput::success());
        }
        if command.args.first().map(String::as_str) == Some(SCRIPT) {
            return self.run_pipeline(command);
        }
        Ok(CommandOutput::success())
    }
}
