//! Configuration for catsup

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::SequencingVariant;
use crate::{CatsupError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineDefinition>,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory submissions are created in
    #[serde(default)]
    pub submissions_dir: Option<String>,
    #[serde(default = "default_number_of_example_samples")]
    pub number_of_example_samples: usize,
    #[serde(default)]
    pub default_variant: SequencingVariant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Key into `pipelines` of the pipeline to run
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    /// Container runtime, passed as `-with-<container>`
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default)]
    pub additional_params: String,
    /// Run in the pipeline working directory after every run; empty disables it
    #[serde(default = "default_cleanup_command")]
    pub cleanup_command: String,
    #[serde(default = "default_program")]
    pub program: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineDefinition {
    pub script: String,
    pub image: String,
    pub short_read_reference: String,
    #[serde(default)]
    pub long_read_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UploadConfig {
    /// Pre-authenticated request URL; files are PUT to `{par_url}{submission}/{file}`
    #[serde(default)]
    pub par_url: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub s3cmd_config: Option<String>,
}

// Default value functions
fn default_number_of_example_samples() -> usize {
    4
}

fn default_pipeline_name() -> String {
    "catnip".to_string()
}

fn default_container() -> String {
    "docker".to_string()
}

fn default_cleanup_command() -> String {
    "nextflow clean -f".to_string()
}

fn default_program() -> String {
    "nextflow".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            submissions_dir: None,
            number_of_example_samples: default_number_of_example_samples(),
            default_variant: SequencingVariant::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            container: default_container(),
            additional_params: String::new(),
            cleanup_command: default_cleanup_command(),
            program: default_program(),
        }
    }
}

impl UploadConfig {
    pub fn has_destination(&self) -> bool {
        non_empty(&self.par_url).is_some() || non_empty(&self.bucket).is_some()
    }
}

impl Config {
    /// Definition of the selected pipeline
    pub fn selected_pipeline(&self) -> Result<&PipelineDefinition> {
        self.pipelines.get(&self.pipeline.name).ok_or_else(|| {
            CatsupError::Configuration(format!(
                "pipeline '{}' has no [pipelines.{}] section",
                self.pipeline.name, self.pipeline.name
            ))
        })
    }

    /// Check that the configuration can drive every stage. All problems are
    /// reported together.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.general.number_of_example_samples == 0 {
            problems.push("general.number_of_example_samples must be at least 1".to_string());
        }

        match self.selected_pipeline() {
            Ok(definition) => {
                let mut files = vec![
                    ("script", definition.script.as_str()),
                    ("short_read_reference", definition.short_read_reference.as_str()),
                ];
                if let Some(long) = &definition.long_read_reference {
                    files.push(("long_read_reference", long.as_str()));
                }
                for (key, value) in files {
                    if !Path::new(value).exists() {
                        problems.push(format!(
                            "pipelines.{}.{}: file {} does not exist",
                            self.pipeline.name, key, value
                        ));
                    }
                }
                if definition.image.trim().is_empty() {
                    problems.push(format!("pipelines.{}.image is empty", self.pipeline.name));
                }
            }
            Err(e) => problems.push(e.to_string()),
        }

        if non_empty(&self.upload.bucket).is_some() {
            match non_empty(&self.upload.s3cmd_config) {
                Some(cfg) if Path::new(cfg).exists() => {}
                Some(cfg) => problems.push(format!("upload.s3cmd_config: file {} does not exist", cfg)),
                None => problems.push("upload.bucket is set but upload.s3cmd_config is not".to_string()),
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CatsupError::Configuration(problems.join("; ")))
        }
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A commented starting point written by `catsup config init`
pub fn example_config() -> String {
    r#"[general]
# submissions_dir = "/data/submissions"
number_of_example_samples = 4
default_variant = "illumina-paired"

[pipeline]
name = "catnip"
container = "docker"
additional_params = ""
cleanup_command = "nextflow clean -f"

[pipelines.catnip]
script = "/opt/catnip/main.nf"
image = "oxfordmmm/catdrop:v0.0.1"
short_read_reference = "/data/references/human_short.fa"
long_read_reference = "/data/references/human_long.mmi"

[upload]
# par_url = "https://objectstorage.example.com/p/TOKEN/n/namespace/b/bucket/o/"
# bucket = "s3://submissions"
# s3cmd_config = "/home/user/.s3cfg"
"#
    .to_string()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| CatsupError::Configuration(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}
