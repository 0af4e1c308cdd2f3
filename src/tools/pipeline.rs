//! Runs the external decontamination pipeline for a submission.
//!
//! The pipeline is started from `pipeline_run/` and reads the renamed links
//! in `../pipeline_in/`, writing cleaned reads to `../upload`.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::traits::{CommandExecutor, ExternalCommand};
use crate::core::{Config, SequencingVariant, SubmissionLayout};
use crate::{CatsupError, Result};

pub struct PipelineInvoker {
    name: String,
    program: String,
    script: String,
    additional_params: Vec<String>,
    container: String,
    image: String,
    short_read_reference: String,
    long_read_reference: Option<String>,
    cleanup_command: Vec<String>,
    executor: Arc<dyn CommandExecutor>,
}

impl PipelineInvoker {
    pub fn from_config(config: &Config, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        let definition = config.selected_pipeline()?;

        Ok(Self {
            name: config.pipeline.name.clone(),
            program: config.pipeline.program.clone(),
            script: definition.script.clone(),
            additional_params: config
                .pipeline
                .additional_params
                .split_whitespace()
                .map(String::from)
                .collect(),
            container: config.pipeline.container.clone(),
            image: definition.image.clone(),
            short_read_reference: definition.short_read_reference.clone(),
            long_read_reference: definition.long_read_reference.clone(),
            cleanup_command: config
                .pipeline
                .cleanup_command
                .split_whitespace()
                .map(String::from)
                .collect(),
            executor,
        })
    }

    fn reference_for(&self, variant: SequencingVariant) -> Result<&str> {
        if variant.uses_long_read_reference() {
            self.long_read_reference.as_deref().ok_or_else(|| {
                CatsupError::Configuration(format!(
                    "pipeline '{}' has no long_read_reference for {} submissions",
                    self.name, variant
                ))
            })
        } else {
            Ok(&self.short_read_reference)
        }
    }

    /// The pipeline invocation for a submission
    pub fn build_command(&self, layout: &SubmissionLayout, variant: SequencingVariant) -> Result<ExternalCommand> {
        let reference = self.reference_for(variant)?;

        Ok(ExternalCommand::new(&self.program)
            .arg(&self.script)
            .args(self.additional_params.iter().cloned())
            .args(["--input_dir", "../pipeline_in/"])
            .args(["--read_pattern", variant.read_pattern()])
            .args(["--paired", if variant.is_paired() { "true" } else { "false" }])
            .args(["--output_dir", "../upload"])
            .arg(format!("-with-{}", self.container))
            .arg(&self.image)
            .args(["--db", reference])
            .current_dir(layout.pipeline_run())
            .log_to(layout.pipeline_stdout_log(), layout.pipeline_stderr_log()))
    }

    /// Run the pipeline and check it produced output. Returns the upload directory.
    pub fn run(&self, layout: &SubmissionLayout, variant: SequencingVariant) -> Result<PathBuf> {
        let command = self.build_command(layout, variant)?;
        fs::create_dir_all(layout.pipeline_run())?;

        info!("Running pipeline: {}", self.name);
        info!("Changing directory to: {}", layout.pipeline_run().display());
        info!("Nextflow invocation: {}", command.command_line());

        let result = self.executor.execute(&command);
        self.cleanup(layout);

        let output = result.map_err(|e| CatsupError::PipelineExecution {
            command: command.command_line(),
            status: format!("could not start: {}", e),
        })?;
        if !output.success {
            return Err(CatsupError::PipelineExecution {
                command: command.command_line(),
                status: output.status,
            });
        }

        let upload_dir = layout.upload_dir();
        let has_output = fs::read_dir(&upload_dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if !has_output {
            return Err(CatsupError::PipelineOutput(upload_dir));
        }

        Ok(upload_dir)
    }

    fn cleanup(&self, layout: &SubmissionLayout) {
        let Some((program, args)) = self.cleanup_command.split_first() else {
            return;
        };
        let command = ExternalCommand::new(program.as_str())
            .args(args.iter().cloned())
            .current_dir(layout.pipeline_run());

        debug!("Pipeline cleanup: {}", command.command_line());
        match self.executor.execute(&command) {
            Ok(output) if output.success => {}
            Ok(output) => warn!("Pipeline cleanup failed ({}): {}", output.status, output.stderr.trim()),
            Err(e) => warn!("Pipeline cleanup could not start: {}", e),
        }
    }
}
