//! On-disk layout of a submission and its metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::stage::Stage;
use crate::utils::write_json_atomic;
use crate::{CatsupError, Result};

/// How the samples of a submission were sequenced. Fixed when the submission
/// is created; drives files-per-sample, the read pattern and the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SequencingVariant {
    #[default]
    IlluminaPaired,
    IlluminaSingle,
    Nanopore,
}

impl SequencingVariant {
    pub const ALL: [SequencingVariant; 3] = [
        SequencingVariant::IlluminaPaired,
        SequencingVariant::IlluminaSingle,
        SequencingVariant::Nanopore,
    ];

    pub fn files_per_sample(&self) -> usize {
        match self {
            SequencingVariant::IlluminaPaired => 2,
            SequencingVariant::IlluminaSingle | SequencingVariant::Nanopore => 1,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.files_per_sample() == 2
    }

    /// Glob the pipeline uses to find read files in its input directory
    pub fn read_pattern(&self) -> &'static str {
        if self.is_paired() {
            "*_{1,2}.fastq.gz"
        } else {
            "*_1.fastq.gz"
        }
    }

    pub fn uses_long_read_reference(&self) -> bool {
        matches!(self, SequencingVariant::Nanopore)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SequencingVariant::IlluminaPaired => "illumina-paired",
            SequencingVariant::IlluminaSingle => "illumina-single",
            SequencingVariant::Nanopore => "nanopore",
        }
    }
}

impl fmt::Display for SequencingVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SequencingVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "illumina-paired" | "paired" => Ok(SequencingVariant::IlluminaPaired),
            "illumina-single" | "single" => Ok(SequencingVariant::IlluminaSingle),
            "nanopore" | "ont" => Ok(SequencingVariant::Nanopore),
            _ => Err(format!(
                "Unknown sequencing variant: {} (expected illumina-paired, illumina-single or nanopore)",
                s
            )),
        }
    }
}

/// Paths of everything a submission owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionLayout {
    name: String,
    root: PathBuf,
}

impl SubmissionLayout {
    /// Layout of submission `name` under `base`. The name becomes a directory
    /// name so it must be a single, non-hidden path component.
    pub fn new(base: &Path, name: &str) -> Result<Self> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && Path::new(name).components().count() == 1;
        if !valid {
            return Err(CatsupError::Precondition(format!(
                "'{}' is not a valid submission name",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            root: base.join(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn inputs_csv(&self) -> PathBuf {
        self.root.join("inputs.csv")
    }

    pub fn processing_manifest(&self) -> PathBuf {
        self.root.join("sp3data.csv")
    }

    pub fn sample_map(&self) -> PathBuf {
        self.root.join("sample_uuid_map.csv")
    }

    pub fn pipeline_in(&self) -> PathBuf {
        self.root.join("pipeline_in")
    }

    pub fn pipeline_in_staging(&self) -> PathBuf {
        self.root.join(".pipeline_in.partial")
    }

    pub fn pipeline_run(&self) -> PathBuf {
        self.root.join("pipeline_run")
    }

    pub fn pipeline_stdout_log(&self) -> PathBuf {
        self.pipeline_run().join("pipeline.stdout.log")
    }

    pub fn pipeline_stderr_log(&self) -> PathBuf {
        self.pipeline_run().join("pipeline.stderr.log")
    }

    pub fn nextflow_log(&self) -> PathBuf {
        self.pipeline_run().join(".nextflow.log")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.root.join("upload")
    }

    pub fn upload_manifest(&self) -> PathBuf {
        self.upload_dir().join("sp3data.csv")
    }

    pub fn upload_marker(&self) -> PathBuf {
        self.upload_dir().join("upload_done.txt")
    }

    pub fn stages_dir(&self) -> PathBuf {
        self.root.join(".stages")
    }

    pub fn stage_record(&self, stage: Stage) -> PathBuf {
        self.stages_dir().join(format!("{}.json", stage.name()))
    }

    pub fn stage_lock(&self, stage: Stage) -> PathBuf {
        self.stages_dir().join(format!("{}.lock", stage.name()))
    }

    pub fn record_path(&self) -> PathBuf {
        self.root.join(".submission.json")
    }
}

/// Per-submission metadata stored in `.submission.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub name: String,
    pub variant: SequencingVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub par_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn new(name: &str, variant: SequencingVariant) -> Self {
        Self {
            name: name.to_string(),
            variant,
            par_url: None,
            created_at: Utc::now(),
        }
    }

    pub fn load(layout: &SubmissionLayout) -> Result<Option<Self>> {
        let path = layout.record_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, layout: &SubmissionLayout) -> Result<()> {
        write_json_atomic(&layout.record_path(), self)
    }
}
