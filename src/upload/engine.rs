//! Upload stage: finalise the processing manifest and ship the pipeline output.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::retry::{with_retry, RetryPolicy, Sleeper, ThreadSleeper};
use super::transport::{BucketStore, ObjectStore, PreAuthenticatedStore};
use crate::core::config::{non_empty, UploadConfig};
use crate::core::SubmissionLayout;
use crate::manifest::{
    clean_filename, read_processing_manifest, write_rows, IntegrityHasher, SampleIdentityRegistry,
    PROCESSING_FIELDS,
};
use crate::tools::CommandExecutor;
use crate::utils::write_atomic;
use crate::{CatsupError, Result};

/// What an upload transferred
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub submission_uuid: String,
    pub files: Vec<PathBuf>,
    pub destinations: Vec<String>,
}

pub struct UploadEngine {
    stores: Vec<Box<dyn ObjectStore>>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    hasher: IntegrityHasher,
}

impl UploadEngine {
    /// At least one destination is required
    pub fn new(stores: Vec<Box<dyn ObjectStore>>) -> Result<Self> {
        if stores.is_empty() {
            return Err(CatsupError::Configuration(
                "You need either an upload par_url or an upload bucket".to_string(),
            ));
        }
        Ok(Self {
            stores,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
            hasher: IntegrityHasher::default(),
        })
    }

    /// Destinations from configuration. `par_override` is the submission's
    /// own pre-authenticated URL and takes precedence over the configured one.
    pub fn from_config(
        upload: &UploadConfig,
        par_override: Option<&str>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        let mut stores: Vec<Box<dyn ObjectStore>> = Vec::new();

        let par_url = par_override
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .or_else(|| non_empty(&upload.par_url));
        if let Some(url) = par_url {
            stores.push(Box::new(PreAuthenticatedStore::new(url)?));
        }

        if let Some(bucket) = non_empty(&upload.bucket) {
            let s3cmd_config = non_empty(&upload.s3cmd_config).ok_or_else(|| {
                CatsupError::Configuration("upload.bucket is set but upload.s3cmd_config is not".to_string())
            })?;
            stores.push(Box::new(BucketStore::new(bucket, s3cmd_config, executor)));
        }

        Self::new(stores)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Record cleaned-file digests and names in the processing manifest.
    /// Returns the submission identifier.
    pub fn finalize_manifest(&self, layout: &SubmissionLayout) -> Result<String> {
        let manifest = layout.processing_manifest();
        let mut rows = read_processing_manifest(&manifest)?;
        let submission_uuid = rows
            .first()
            .map(|row| row.submission_uuid4.clone())
            .ok_or_else(|| CatsupError::Schema(format!("{} has no rows", manifest.display())))?;

        let mut occurrences = SampleIdentityRegistry::new();
        for row in rows.iter_mut() {
            let sample_uuid = row.sample_uuid()?;
            let occurrence = occurrences.next_occurrence(sample_uuid);
            let name = clean_filename(&sample_uuid, occurrence, &row.sample_file_extension);

            let cleaned = layout.upload_dir().join(&name);
            if !cleaned.is_file() {
                return Err(CatsupError::MissingOutput(cleaned));
            }
            let digests = self.hasher.digest(&cleaned)?;
            row.set_clean_digests(&digests);
            row.sample_filename = name;
        }

        write_rows(&manifest, &PROCESSING_FIELDS, &rows)?;
        info!("Recorded cleaned-file digests in {}", manifest.display());
        Ok(submission_uuid)
    }

    pub fn upload(&self, layout: &SubmissionLayout) -> Result<UploadSummary> {
        let submission_uuid = self.finalize_manifest(layout)?;

        write_atomic(&layout.upload_manifest(), &fs::read(layout.processing_manifest())?)?;

        let marker = layout.upload_marker();
        let mut files = Vec::new();
        for entry in fs::read_dir(layout.upload_dir())? {
            let path = entry?.path();
            if path.is_file() && path != marker {
                files.push(path);
            }
        }
        files.sort();

        let mut destinations = Vec::with_capacity(self.stores.len());
        for store in &self.stores {
            info!("Uploading {} files to {}", files.len(), store.target());
            self.transfer(store.as_ref(), &submission_uuid, &files)?;

            if store.wants_completion_marker() {
                fs::write(&marker, b"")?;
                self.transfer(store.as_ref(), &submission_uuid, std::slice::from_ref(&marker))?;
            }
            destinations.push(store.target().to_string());
        }

        Ok(UploadSummary {
            submission_uuid,
            files,
            destinations,
        })
    }

    fn transfer(&self, store: &dyn ObjectStore, prefix: &str, files: &[PathBuf]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let batch_size = store.batch_size().unwrap_or(files.len()).max(1);

        for batch in files.chunks(batch_size) {
            let label = match batch {
                [single] => single.clone(),
                _ => batch[0].parent().map(PathBuf::from).unwrap_or_default(),
            };
            let context = format!("upload of {} to {}", label.display(), store.target());

            with_retry(
                |_| store.put(prefix, batch),
                &self.policy,
                self.sleeper.as_ref(),
                &context,
            )
            .map_err(|exhausted| CatsupError::UploadExhausted {
                file: label.clone(),
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            })?;
        }
        Ok(())
    }
}
