//! Prepare stage: turn the user's input manifest into the processing manifest.
//!
//! Rows are handled strictly in file order because sample identifiers and
//! occurrence numbers are assigned on first sight. Outputs are only written
//! once every row has been hashed and linked, so a failed prepare leaves no
//! processing manifest, audit map or pipeline-input directory behind.

use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use super::{
    read_input_manifest, renamed_filename, stage_rows, AuditEntry, IntegrityHasher,
    ProcessingRow, RenameLinker, RowValidator, SampleIdentityRegistry, AUDIT_FIELDS,
    PROCESSING_FIELDS,
};
use crate::core::SubmissionLayout;
use crate::{CatsupError, Result};

/// What a successful prepare produced
#[derive(Debug, Clone)]
pub struct PrepareOutput {
    pub submission_uuid: Uuid,
    pub processing_manifest: PathBuf,
    pub audit_map: PathBuf,
    pub pipeline_in: PathBuf,
    pub rows: usize,
    pub samples: usize,
}

pub struct ManifestTransformer<'a> {
    layout: &'a SubmissionLayout,
    validator: Box<dyn RowValidator>,
    hasher: IntegrityHasher,
}

impl<'a> ManifestTransformer<'a> {
    pub fn new(layout: &'a SubmissionLayout, validator: Box<dyn RowValidator>) -> Self {
        Self {
            layout,
            validator,
            hasher: IntegrityHasher::default(),
        }
    }

    pub fn prepare(&self, input_manifest: &Path) -> Result<PrepareOutput> {
        if !input_manifest.exists() {
            return Err(CatsupError::NotFound(format!(
                "input manifest {} does not exist",
                input_manifest.display()
            )));
        }

        let rows = read_input_manifest(input_manifest)?;

        let problems: Vec<String> = rows
            .iter()
            .enumerate()
            .flat_map(|(i, row)| self.validator.validate(i + 1, row))
            .collect();
        if !problems.is_empty() {
            for problem in &problems {
                tracing::error!("{}", problem);
            }
            return Err(CatsupError::Validation(problems));
        }

        let submission_uuid = Uuid::new_v4();
        let mut registry = SampleIdentityRegistry::new();
        let linker = RenameLinker::new(
            self.layout.pipeline_in_staging(),
            self.layout.pipeline_in(),
        )?;

        let mut processing = Vec::with_capacity(rows.len());
        let mut audit = Vec::with_capacity(rows.len());

        for row in &rows {
            let original = Path::new(&row.sample_filename);
            let digests = self.hasher.digest(original)?;

            let sample_uuid = registry.identifier_for(&row.sample_name);
            let occurrence = registry.next_occurrence(sample_uuid);
            let renamed = renamed_filename(&sample_uuid, occurrence, &row.sample_file_extension);

            let linked = linker.link_for_pipeline(original, &renamed)?;
            info!("{} -> {}", linked.display(), original.display());

            audit.push(AuditEntry {
                sample_name: row.sample_name.clone(),
                sample_uuid4: sample_uuid.to_string(),
                original_file: row.sample_filename.clone(),
                renamed_file: renamed.clone(),
            });
            processing.push(ProcessingRow::from_input(
                row,
                submission_uuid,
                sample_uuid,
                renamed,
                &digests,
            ));
        }

        let processing_manifest = self.layout.processing_manifest();
        let audit_map = self.layout.sample_map();
        let staged_manifest = stage_rows(&processing_manifest, &PROCESSING_FIELDS, &processing)?;
        let staged_audit = stage_rows(&audit_map, &AUDIT_FIELDS, &audit)?;
        let pipeline_in = linker.commit()?;
        staged_manifest.persist(&processing_manifest).map_err(|e| e.error)?;
        staged_audit.persist(&audit_map).map_err(|e| e.error)?;

        info!("Wrote submission data to: {}", processing_manifest.display());
        info!("Wrote sample file <-> uuid map to: {}", audit_map.display());

        Ok(PrepareOutput {
            submission_uuid,
            processing_manifest,
            audit_map,
            pipeline_in,
            rows: processing.len(),
            samples: registry.sample_count(),
        })
    }
}
