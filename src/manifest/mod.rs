//! Submission manifests
//!
//! Three CSV files describe a submission:
//! - `inputs.csv`, authored by the user, one row per physical read file
//! - `sp3data.csv`, the processing manifest written at prepare time and
//!   finalised with cleaned-file digests at upload time
//! - `sample_uuid_map.csv`, the write-once audit map from sample names to
//!   identifiers and renamed files

pub mod hasher;
pub mod identity;
pub mod linker;
pub mod template;
pub mod transform;
pub mod validator;

pub use hasher::{FileDigests, IntegrityHasher};
pub use identity::SampleIdentityRegistry;
pub use linker::RenameLinker;
pub use template::TemplateWriter;
pub use transform::{ManifestTransformer, PrepareOutput};
pub use validator::{PermissiveValidator, RowValidator, TemplateValidator};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::utils::atomic::temp_file_beside;
use crate::{CatsupError, Result};

/// Header of the user-authored input manifest, in required order
pub const INPUT_FIELDS: [&str; 15] = [
    "index",
    "subindex",
    "sample_name",
    "sample_filename",
    "sample_file_extension",
    "sample_host",
    "sample_collection_date",
    "sample_country",
    "submission_title",
    "submission_description",
    "submitter_organisation",
    "submitter_email",
    "instrument_platform",
    "instrument_model",
    "instrument_flowcell",
];

/// Header of the processing manifest
pub const PROCESSING_FIELDS: [&str; 22] = [
    "submission_uuid4",
    "sample_uuid4",
    "index",
    "subindex",
    "sample_filename",
    "sample_file_extension",
    "sample_host",
    "sample_collection_date",
    "sample_country",
    "submission_title",
    "submission_description",
    "submitter_organisation",
    "submitter_email",
    "instrument_platform",
    "instrument_model",
    "instrument_flowcell",
    "original_file_md5",
    "original_file_sha1",
    "original_file_sha512",
    "clean_file_md5",
    "clean_file_sha1",
    "clean_file_sha512",
];

/// Header of the sample audit map
pub const AUDIT_FIELDS: [&str; 4] = ["sample_name", "sample_uuid4", "original_file", "renamed_file"];

/// One row of `inputs.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRow {
    pub index: String,
    pub subindex: String,
    pub sample_name: String,
    pub sample_filename: String,
    pub sample_file_extension: String,
    pub sample_host: String,
    pub sample_collection_date: String,
    pub sample_country: String,
    pub submission_title: String,
    pub submission_description: String,
    pub submitter_organisation: String,
    pub submitter_email: String,
    pub instrument_platform: String,
    pub instrument_model: String,
    pub instrument_flowcell: String,
}

impl InputRow {
    /// Field name / value pairs in header order
    pub fn fields(&self) -> [(&'static str, &str); 15] {
        [
            ("index", self.index.as_str()),
            ("subindex", self.subindex.as_str()),
            ("sample_name", self.sample_name.as_str()),
            ("sample_filename", self.sample_filename.as_str()),
            ("sample_file_extension", self.sample_file_extension.as_str()),
            ("sample_host", self.sample_host.as_str()),
            ("sample_collection_date", self.sample_collection_date.as_str()),
            ("sample_country", self.sample_country.as_str()),
            ("submission_title", self.submission_title.as_str()),
            ("submission_description", self.submission_description.as_str()),
            ("submitter_organisation", self.submitter_organisation.as_str()),
            ("submitter_email", self.submitter_email.as_str()),
            ("instrument_platform", self.instrument_platform.as_str()),
            ("instrument_model", self.instrument_model.as_str()),
            ("instrument_flowcell", self.instrument_flowcell.as_str()),
        ]
    }
}

/// One row of `sp3data.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRow {
    pub submission_uuid4: String,
    pub sample_uuid4: String,
    pub index: String,
    pub subindex: String,
    pub sample_filename: String,
    pub sample_file_extension: String,
    pub sample_host: String,
    pub sample_collection_date: String,
    pub sample_country: String,
    pub submission_title: String,
    pub submission_description: String,
    pub submitter_organisation: String,
    pub submitter_email: String,
    pub instrument_platform: String,
    pub instrument_model: String,
    pub instrument_flowcell: String,
    pub original_file_md5: String,
    pub original_file_sha1: String,
    pub original_file_sha512: String,
    pub clean_file_md5: String,
    pub clean_file_sha1: String,
    pub clean_file_sha512: String,
}

impl ProcessingRow {
    /// Build the processing row for an input row. The sample name is dropped
    /// and the cleaned-file digests are left empty until upload.
    pub fn from_input(
        input: &InputRow,
        submission_uuid: Uuid,
        sample_uuid: Uuid,
        renamed_filename: String,
        original: &FileDigests,
    ) -> Self {
        Self {
            submission_uuid4: submission_uuid.to_string(),
            sample_uuid4: sample_uuid.to_string(),
            index: input.index.clone(),
            subindex: input.subindex.clone(),
            sample_filename: renamed_filename,
            sample_file_extension: input.sample_file_extension.clone(),
            sample_host: input.sample_host.clone(),
            sample_collection_date: input.sample_collection_date.clone(),
            sample_country: input.sample_country.clone(),
            submission_title: input.submission_title.clone(),
            submission_description: input.submission_description.clone(),
            submitter_organisation: input.submitter_organisation.clone(),
            submitter_email: input.submitter_email.clone(),
            instrument_platform: input.instrument_platform.clone(),
            instrument_model: input.instrument_model.clone(),
            instrument_flowcell: input.instrument_flowcell.clone(),
            original_file_md5: original.md5.clone(),
            original_file_sha1: original.sha1.clone(),
            original_file_sha512: original.sha512.clone(),
            clean_file_md5: String::new(),
            clean_file_sha1: String::new(),
            clean_file_sha512: String::new(),
        }
    }

    pub fn sample_uuid(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sample_uuid4).map_err(|e| {
            CatsupError::Schema(format!(
                "invalid sample_uuid4 '{}' in processing manifest: {}",
                self.sample_uuid4, e
            ))
        })
    }

    pub fn set_clean_digests(&mut self, digests: &FileDigests) {
        self.clean_file_md5 = digests.md5.clone();
        self.clean_file_sha1 = digests.sha1.clone();
        self.clean_file_sha512 = digests.sha512.clone();
    }
}

/// One row of `sample_uuid_map.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sample_name: String,
    pub sample_uuid4: String,
    pub original_file: String,
    pub renamed_file: String,
}

/// Pipeline-visible name of an original read file
pub fn renamed_filename(sample_uuid: &Uuid, occurrence: u32, extension: &str) -> String {
    format!("{}_{}.{}", sample_uuid, occurrence, extension)
}

/// Name the decontamination pipeline gives to the cleaned version of a read file
pub fn clean_filename(sample_uuid: &Uuid, occurrence: u32, extension: &str) -> String {
    format!("{}_C{}.{}", sample_uuid, occurrence, extension)
}

/// Read a CSV file whose header must equal `expected`, field for field
pub fn read_rows<T: DeserializeOwned>(path: &Path, expected: &[&str]) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let received: Vec<&str> = headers.iter().collect();

    if received != expected {
        tracing::error!("File {:?} has wrong header", path);
        tracing::error!("Expected: {:?}", expected);
        tracing::error!("Received: {:?}", received);
        return Err(CatsupError::Schema(format!(
            "{} has wrong header: expected [{}], received [{}]",
            path.display(),
            expected.join(", "),
            received.join(", ")
        )));
    }

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn read_input_manifest(path: &Path) -> Result<Vec<InputRow>> {
    read_rows(path, &INPUT_FIELDS)
}

pub fn read_processing_manifest(path: &Path) -> Result<Vec<ProcessingRow>> {
    read_rows(path, &PROCESSING_FIELDS)
}

pub fn read_audit_map(path: &Path) -> Result<Vec<AuditEntry>> {
    read_rows(path, &AUDIT_FIELDS)
}

/// Write a whole CSV file atomically: the header is always present, even with no rows
pub fn write_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    stage_rows(path, header, rows)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write a CSV file to a temporary file beside `path`. Nothing appears at
/// `path` until the returned file is persisted; dropping it discards it.
pub fn stage_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<NamedTempFile> {
    let temp = temp_file_beside(path)?;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(temp.as_file());
        writer.write_record(header)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    Ok(temp)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn input_row(index: usize, subindex: usize, sample_name: &str, filename: &str) -> InputRow {
        InputRow {
            index: index.to_string(),
            subindex: subindex.to_string(),
            sample_name: sample_name.to_string(),
            sample_filename: filename.to_string(),
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
}
