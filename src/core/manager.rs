use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::config::Config;
use super::paths;
use super::submission::{SequencingVariant, SubmissionLayout, SubmissionRecord};
use crate::manifest::{ManifestTransformer, PermissiveValidator, RowValidator, TemplateValidator, TemplateWriter};
use crate::stage::{Stage, StageController, StageHandle, StageReport, StageRunner, SubmissionStatus};
use crate::tools::{CommandExecutor, PipelineInvoker, SystemExecutor};
use crate::upload::{RetryPolicy, Sleeper, ThreadSleeper, UploadEngine};
use crate::{CatsupError, Result};

type StageWork = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Per-run options for a stage
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    /// Run a stage again even though it already completed
    pub force: bool,
    /// Template: build rows from the read files in this directory
    pub reads_dir: Option<PathBuf>,
    /// Template: sequencing variant of the new submission
    pub variant: Option<SequencingVariant>,
    /// Pre-authenticated upload URL for this submission
    pub par_url: Option<String>,
    /// Prepare: skip the row content checks
    pub skip_validation: bool,
}

/// A submission found under the submissions directory
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionEntry {
    pub name: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub status: SubmissionStatus,
}

/// Runs the stages of the submissions under one base directory
#[derive(Clone)]
pub struct SubmissionManager {
    config: Arc<Config>,
    base_dir: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    sleeper: Arc<dyn Sleeper>,
    retry_policy: RetryPolicy,
}

impl SubmissionManager {
    /// Manager for the configured submissions directory
    pub fn new(config: Config) -> Self {
        let base_dir = paths::submissions_dir(config.general.submissions_dir.as_deref());
        Self {
            config: Arc::new(config),
            base_dir,
            executor: Arc::new(SystemExecutor),
            sleeper: Arc::new(ThreadSleeper),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn layout(&self, name: &str) -> Result<SubmissionLayout> {
        SubmissionLayout::new(&self.base_dir, name)
    }

    pub fn controller(&self, name: &str) -> Result<StageController> {
        Ok(StageController::new(self.layout(name)?))
    }

    /// Run `stage` on the calling thread and wait for it
    pub fn execute(&self, name: &str, stage: Stage, options: &StageOptions) -> Result<()> {
        let controller = self.controller(name)?;
        let work = self.work_for(controller.layout(), stage, options);
        controller.run_stage(stage, options.force, work)
    }

    /// API mode: run `stage` and describe the outcome instead of failing
    pub fn report(&self, name: &str, stage: Stage, options: &StageOptions) -> StageReport {
        StageReport::from_result(name, stage, &self.execute(name, stage, options))
    }

    /// Start `stage` on a worker thread. The stage is claimed before this
    /// returns, so a second start of the same stage fails with `StageBusy`.
    pub fn spawn(&self, name: &str, stage: Stage, options: &StageOptions) -> Result<StageHandle> {
        let controller = self.controller(name)?;
        let guard = controller.begin(stage, options.force)?;
        StageRunner::spawn(guard, self.work_for(controller.layout(), stage, options))
    }

    /// Start whichever stage the submission needs next. Returns None once
    /// every stage has completed.
    pub fn run_next(&self, name: &str, options: &StageOptions) -> Result<Option<StageHandle>> {
        let controller = self.controller(name)?;
        controller.recover_interrupted()?;

        match controller.next_stage()? {
            Some(stage) => {
                info!("Next stage of {}: {}", name, stage.description());
                self.spawn(name, stage, options).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Stage snapshot of an existing submission. Running stages whose owner
    /// has gone away are recorded as interrupted first.
    pub fn status(&self, name: &str) -> Result<SubmissionStatus> {
        let controller = self.existing(name)?;
        let recovered = controller.recover_interrupted()?;
        if !recovered.is_empty() {
            debug!("Recovered interrupted stages of {}: {:?}", name, recovered);
        }
        controller.status()
    }

    pub fn reset(&self, name: &str, stage: Stage) -> Result<()> {
        self.existing(name)?.reset(stage)
    }

    /// Contents of the pipeline's own log, if it has run
    pub fn pipeline_log(&self, name: &str) -> Result<Option<String>> {
        let path = self.existing(name)?.layout().nextflow_log();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    /// Submissions with an input manifest, most recently modified first
    pub fn list_submissions(&self) -> Result<Vec<SubmissionEntry>> {
        if !self.base_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(layout) = self.layout(&name) else {
                continue;
            };
            if !layout.exists() || !layout.inputs_csv().exists() {
                continue;
            }

            let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
            let status = StageController::new(layout.clone()).status()?;
            entries.push(SubmissionEntry {
                name,
                path: layout.root().to_path_buf(),
                modified,
                status,
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    fn existing(&self, name: &str) -> Result<StageController> {
        let controller = self.controller(name)?;
        if !controller.layout().exists() {
            return Err(CatsupError::NotFound(format!(
                "submission '{}' does not exist in {}",
                name,
                self.base_dir.display()
            )));
        }
        Ok(controller)
    }

    /// The work of one stage. Configuration is resolved inside the work, so
    /// a configuration problem is recorded as the stage's failure.
    fn work_for(&self, layout: &SubmissionLayout, stage: Stage, options: &StageOptions) -> StageWork {
        let layout = layout.clone();
        let config = self.config.clone();
        let options = options.clone();

        match stage {
            Stage::Template => Box::new(move || {
                let variant = options.variant.unwrap_or(config.general.default_variant);
                TemplateWriter::new(variant)
                    .with_example_samples(config.general.number_of_example_samples)
                    .create(&layout, options.reads_dir.as_deref())?;

                let mut record = SubmissionRecord::new(layout.name(), variant);
                record.par_url = options.par_url;
                record.save(&layout)
            }),
            Stage::Prepare => Box::new(move || {
                let validator: Box<dyn RowValidator> = if options.skip_validation {
                    Box::new(PermissiveValidator)
                } else {
                    Box::new(TemplateValidator)
                };

                let output = ManifestTransformer::new(&layout, validator).prepare(&layout.inputs_csv())?;
                info!(
                    "Prepared submission {} ({} files, {} samples)",
                    output.submission_uuid, output.rows, output.samples
                );
                Ok(())
            }),
            Stage::Pipeline => {
                let executor = self.executor.clone();

                Box::new(move || {
                    let variant = match SubmissionRecord::load(&layout)? {
                        Some(record) => record.variant,
                        None => options.variant.unwrap_or(config.general.default_variant),
                    };
                    PipelineInvoker::from_config(&config, executor)?
                        .run(&layout, variant)
                        .map(|_| ())
                })
            }
            Stage::Upload => {
                let executor = self.executor.clone();
                let sleeper = self.sleeper.clone();
                let policy = self.retry_policy.clone();

                Box::new(move || {
                    let par_url = match options.par_url {
                        Some(url) => Some(url),
                        None => SubmissionRecord::load(&layout)?.and_then(|record| record.par_url),
                    };
                    let engine = UploadEngine::from_config(&config.upload, par_url.as_deref(), executor)?
                        .with_policy(policy)
                        .with_sleeper(sleeper);

                    let summary = engine.upload(&layout)?;
                    info!(
                        "Uploaded {} files of submission {} to {}",
                        summary.files.len(),
                        summary.submission_uuid,
                        summary.destinations.join(", ")
                    );
                    Ok(())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PipelineDefinition;
    use crate::manifest::read_processing_manifest;
    use crate::stage::StageState;
    use crate::tools::fake::FakeExecutor;
    use crate::tools::CommandOutput;
    use crate::upload::RecordingSleeper;
    use tempfile::TempDir;

    fn config() -> Config {
        let mut config = Config::default();
        config.pipelines.insert(
            "catnip".to_string(),
            PipelineDefinition {
                script: "/opt/catnip/main.nf".to_string(),
                image: "catdrop.img".to_string(),
                short_read_reference: "/refs/short.fa".to_string(),
                long_read_reference: None,
            },
        );
        config.upload.bucket = Some("s3://bucket".to_string());
        config.upload.s3cmd_config = Some("/etc/s3cfg".to_string());
        config
    }

    /// Executor whose pipeline writes a cleaned copy of every linked input
    fn pipeline_executor() -> Arc<FakeExecutor> {
        Arc::new(FakeExecutor::new(|cmd, _| {
            if cmd.args.first().map(String::as_str) == Some("/opt/catnip/main.nf") {
                let run_dir = cmd.current_dir.clone().unwrap();
                let input = run_dir.join("../pipeline_in");
                let output = run_dir.join("../upload");
                fs::create_dir_all(&output)?;
                for entry in fs::read_dir(&input)? {
                    let name = entry?.file_name().to_string_lossy().to_string();
                    let (stem, ext) = name.split_once('.').unwrap();
                    let (id, n) = stem.rsplit_once('_').unwrap();
                    fs::write(output.join(format!("{}_C{}.{}", id, n, ext)), b"clean")?;
                }
            }
            Ok(CommandOutput::success())
        }))
    }

    fn manager(dir: &TempDir, executor: Arc<FakeExecutor>) -> SubmissionManager {
        SubmissionManager::new(config())
            .with_base_dir(dir.path().join("submissions"))
            .with_executor(executor)
            .with_sleeper(Arc::new(RecordingSleeper::new()))
    }

    fn reads(dir: &TempDir) -> PathBuf {
        let reads = dir.path().join("reads");
        fs::create_dir_all(&reads).unwrap();
        for name in ["P0001_1.fastq.gz", "P0001_2.fastq.gz", "P0002_1.fastq.gz", "P0002_2.fastq.gz"] {
            fs::write(reads.join(name), name.as_bytes()).unwrap();
        }
        reads
    }

    #[test]
    fn test_full_lifecycle() {
        let dir = TempDir::new().unwrap();
        let executor = pipeline_executor();
        let manager = manager(&dir, executor.clone());
        let options = StageOptions {
            reads_dir: Some(reads(&dir)),
            skip_validation: true,
            ..Default::default()
        };

        for stage in Stage::ALL {
            manager.execute("sub1", stage, &options).unwrap();
        }

        let status = manager.status("sub1").unwrap();
        assert!(Stage::ALL.iter().all(|s| status.state_of(*s) == StageState::Ok));
        assert_eq!(status.next_stage, None);

        let layout = manager.layout("sub1").unwrap();
        let rows = read_processing_manifest(&layout.processing_manifest()).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.sample_filename.contains("_C") && !r.clean_file_md5.is_empty()));
        assert!(layout.upload_manifest().exists());

        let s3cmd: Vec<_> = executor.calls().into_iter().filter(|c| c.program == "s3cmd").collect();
        assert_eq!(s3cmd.len(), 1);
    }

    #[test]
    fn test_template_records_variant() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Arc::new(FakeExecutor::succeeding()));
        let options = StageOptions {
            variant: Some(SequencingVariant::IlluminaSingle),
            par_url: Some("https://par.example/o/".to_string()),
            ..Default::default()
        };

        manager.execute("sub1", Stage::Template, &options).unwrap();

        let layout = manager.layout("sub1").unwrap();
        let record = SubmissionRecord::load(&layout).unwrap().unwrap();
        assert_eq!(record.variant, SequencingVariant::IlluminaSingle);
        assert_eq!(record.par_url.as_deref(), Some("https://par.example/o/"));
        assert!(matches!(
            manager.execute("sub1", Stage::Template, &options),
            Err(CatsupError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_configuration_error_is_recorded_on_the_stage() {
        let dir = TempDir::new().unwrap();
        let executor = pipeline_executor();
        let manager = manager(&dir, executor.clone());
        let options = StageOptions {
            reads_dir: Some(reads(&dir)),
            skip_validation: true,
            ..Default::default()
        };
        for stage in [Stage::Template, Stage::Prepare, Stage::Pipeline] {
            manager.execute("sub1", stage, &options).unwrap();
        }
        let calls_before = executor.calls().len();

        let mut config = config();
        config.upload = Default::default();
        let unconfigured = SubmissionManager::new(config)
            .with_base_dir(manager.base_dir())
            .with_executor(executor.clone());

        let report = unconfigured.report("sub1", Stage::Upload, &StageOptions::default());

        assert!(!report.is_success());
        assert_eq!(report.reason.as_deref(), Some("configuration_error"));
        assert_eq!(executor.calls().len(), calls_before);
        let status = manager.status("sub1").unwrap();
        assert_eq!(status.state_of(Stage::Upload), StageState::Error);
        let failure = status.stages[3].failure.clone().unwrap();
        assert_eq!(failure.reason, "configuration_error");
        assert!(!manager.layout("sub1").unwrap().stage_lock(Stage::Upload).exists());
    }

    #[test]
    fn test_nanopore_without_reference_fails_the_pipeline_stage() {
        let dir = TempDir::new().unwrap();
        let executor = pipeline_executor();
        let manager = manager(&dir, executor.clone());
        let options = StageOptions {
            reads_dir: Some(reads(&dir)),
            variant: Some(SequencingVariant::Nanopore),
            skip_validation: true,
            ..Default::default()
        };
        manager.execute("sub1", Stage::Template, &options).unwrap();
        manager.execute("sub1", Stage::Prepare, &options).unwrap();

        let handle = manager.spawn("sub1", Stage::Pipeline, &options).unwrap();
        let report = handle.join();

        assert_eq!(report.reason.as_deref(), Some("configuration_error"));
        assert!(executor.calls().is_empty());
        let controller = manager.controller("sub1").unwrap();
        assert_eq!(controller.state(Stage::Pipeline).unwrap(), StageState::Error);
        assert_eq!(controller.next_stage().unwrap(), Some(Stage::Pipeline));
    }

    #[test]
    fn test_run_next_walks_the_stages() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, pipeline_executor());
        let options = StageOptions {
            reads_dir: Some(reads(&dir)),
            skip_validation: true,
            ..Default::default()
        };

        let mut stages = Vec::new();
        while let Some(handle) = manager.run_next("sub1", &options).unwrap() {
            stages.push(handle.stage());
            assert!(handle.join().is_success());
        }

        assert_eq!(stages, Stage::ALL.to_vec());
    }

    #[test]
    fn test_failed_pipeline_is_next_again() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(FakeExecutor::new(|cmd, _| {
            if cmd.program == "nextflow" && !cmd.args.contains(&"clean".to_string()) {
                Ok(CommandOutput::failure(1, "boom"))
            } else {
                Ok(CommandOutput::success())
            }
        }));
        let manager = manager(&dir, executor);
        let options = StageOptions {
            reads_dir: Some(reads(&dir)),
            skip_validation: true,
            ..Default::default()
        };
        manager.execute("sub1", Stage::Template, &options).unwrap();
        manager.execute("sub1", Stage::Prepare, &options).unwrap();

        let report = manager.report("sub1", Stage::Pipeline, &options);

        assert_eq!(report.reason.as_deref(), Some("pipeline_execution_error"));
        let controller = manager.controller("sub1").unwrap();
        assert_eq!(controller.next_stage().unwrap(), Some(Stage::Pipeline));
    }

    #[test]
    fn test_list_submissions_newest_first() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Arc::new(FakeExecutor::succeeding()));
        manager.execute("older", Stage::Template, &StageOptions::default()).unwrap();
        manager.execute("newer", Stage::Template, &StageOptions::default()).unwrap();
        fs::create_dir_all(manager.base_dir().join("not-a-submission")).unwrap();

        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        fs::File::open(manager.base_dir().join("older"))
            .unwrap()
            .set_modified(past)
            .unwrap();

        let names: Vec<String> = manager
            .list_submissions()
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["newer", "older"]);
    }

    #[test]
    fn test_status_of_missing_submission() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Arc::new(FakeExecutor::succeeding()));
        assert!(matches!(manager.status("nope"), Err(CatsupError::NotFound(_))));
    }
}
