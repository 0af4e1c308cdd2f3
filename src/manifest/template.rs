//! Template stage: create a submission's input manifest.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{write_rows, InputRow, INPUT_FIELDS};
use crate::core::{SequencingVariant, SubmissionLayout};
use crate::{CatsupError, Result};

const DEFAULT_EXTENSION: &str = "fastq.gz";

pub struct TemplateWriter {
    variant: SequencingVariant,
    number_of_example_samples: usize,
}

impl TemplateWriter {
    pub fn new(variant: SequencingVariant) -> Self {
        Self {
            variant,
            number_of_example_samples: 4,
        }
    }

    pub fn with_example_samples(mut self, count: usize) -> Self {
        self.number_of_example_samples = count;
        self
    }

    /// Write `inputs.csv` for the submission. With `reads_dir` one row is
    /// produced per read file found there, otherwise placeholder rows are
    /// written for the user to edit. An existing input manifest is never
    /// overwritten.
    pub fn create(&self, layout: &SubmissionLayout, reads_dir: Option<&Path>) -> Result<PathBuf> {
        let input_csv = layout.inputs_csv();
        if input_csv.exists() {
            return Err(CatsupError::AlreadyExists(format!(
                "{} exists, won't overwrite",
                input_csv.display()
            )));
        }

        let rows = match reads_dir {
            Some(dir) => self.rows_from_directory(dir)?,
            None => self.example_rows(),
        };

        fs::create_dir_all(layout.root())?;
        write_rows(&input_csv, &INPUT_FIELDS, &rows)?;
        info!("Created {} with {} rows", input_csv.display(), rows.len());

        Ok(input_csv)
    }

    fn example_rows(&self) -> Vec<InputRow> {
        let per_sample = self.variant.files_per_sample();
        let mut rows = Vec::with_capacity(self.number_of_example_samples * per_sample);

        for i in 1..=self.number_of_example_samples {
            for j in 1..=per_sample {
                rows.push(self.row(
                    i,
                    j,
                    format!("P000{}", i),
                    format!("in/P000{}_{}.{}", i, j, DEFAULT_EXTENSION),
                    DEFAULT_EXTENSION.to_string(),
                ));
            }
        }
        rows
    }

    fn rows_from_directory(&self, dir: &Path) -> Result<Vec<InputRow>> {
        if !dir.is_dir() {
            return Err(CatsupError::NotFound(format!(
                "reads directory {} does not exist",
                dir.display()
            )));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let per_sample = self.variant.files_per_sample();
        let leftover = files.len() % per_sample;
        if leftover != 0 {
            warn!(
                "{} file(s) in {} do not complete a sample of {} files and were skipped",
                leftover,
                dir.display(),
                per_sample
            );
        }

        let mut rows = Vec::with_capacity(files.len() - leftover);
        for (i, group) in files.chunks_exact(per_sample).enumerate() {
            let sample_name = sample_name_for(&group[0], 1, per_sample);
            for (j, path) in group.iter().enumerate() {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                rows.push(self.row(
                    i + 1,
                    j + 1,
                    sample_name.clone(),
                    path.to_string_lossy().to_string(),
                    extension_of(&name),
                ));
            }
        }
        Ok(rows)
    }

    fn row(
        &self,
        index: usize,
        subindex: usize,
        sample_name: String,
        sample_filename: String,
        sample_file_extension: String,
    ) -> InputRow {
        let (platform, model) = match self.variant {
            SequencingVariant::IlluminaPaired => ("Illumina pair-ended sequencing", "Illumina HiSeq 4000"),
            SequencingVariant::IlluminaSingle => ("Illumina single-end sequencing", "Illumina HiSeq 4000"),
            SequencingVariant::Nanopore => ("Oxford Nanopore sequencing", "MinION"),
        };

        InputRow {
            index: index.to_string(),
            subindex: subindex.to_string(),
            sample_name,
            sample_filename,
            sample_file_extension,
            sample_host: "Homo sapiens".to_string(),
            sample_collection_date: "2020-01-30".to_string(),
            sample_country: "United Kingdom".to_string(),
            submission_title: "Bacteria infection study".to_string(),
            submission_description: "Bacteria infection study for drug resistance".to_string(),
            submitter_organisation: "University of Oxford".to_string(),
            submitter_email: "crookit@ndm.ox.ac.uk".to_string(),
            instrument_platform: platform.to_string(),
            instrument_model: model.to_string(),
            instrument_flowcell: "96".to_string(),
        }
    }
}

/// File name up to the first '.', minus a trailing `_<position>` read marker
/// when the sample has more than one file
fn sample_name_for(path: &Path, position: usize, per_sample: usize) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or_default();

    if per_sample > 1 {
        let marker = format!("_{}", position);
        if let Some(base) = stem.strip_suffix(&marker) {
            if !base.is_empty() {
                return base.to_string();
            }
        }
    }
    stem.to_string()
}

fn extension_of(file_name: &str) -> String {
    match file_name.split_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_string(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::read_input_manifest;
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_example_rows_for_paired_reads() {
        let dir = TempDir::new().unwrap();
        let layout = SubmissionLayout::new(dir.path(), "sub1").unwrap();

        let path = TemplateWriter::new(SequencingVariant::IlluminaPaired)
            .with_example_samples(2)
            .create(&layout, None)
            .unwrap();

        let rows = read_input_manifest(&path).unwrap();
        let files: Vec<&str> = rows.iter().map(|r| r.sample_filename.as_str()).collect();
        assert_eq!(
            files,
            vec![
                "in/P0001_1.fastq.gz",
                "in/P0001_2.fastq.gz",
                "in/P0002_1.fastq.gz",
                "in/P0002_2.fastq.gz"
            ]
        );
        assert_eq!(rows[1].sample_name, "P0001");
        assert_eq!(rows[1].subindex, "2");
    }

    #[test]
    fn test_existing_manifest_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let layout = SubmissionLayout::new(dir.path(), "sub1").unwrap();
        fs::create_dir_all(layout.root()).unwrap();
        fs::write(layout.inputs_csv(), "user edits").unwrap();

        let result = TemplateWriter::new(SequencingVariant::IlluminaPaired).create(&layout, None);

        assert!(matches!(result, Err(CatsupError::AlreadyExists(_))));
        assert_eq!(fs::read_to_string(layout.inputs_csv()).unwrap(), "user edits");
    }

    #[test]
    fn test_rows_from_reads_directory() {
        let dir = TempDir::new().unwrap();
        let reads = dir.path().join("reads");
        fs::create_dir_all(&reads).unwrap();
        for name in ["S2_1.fastq.gz", "S1_2.fastq.gz", "S1_1.fastq.gz", "S2_2.fastq.gz", "odd.fq"] {
            fs::write(reads.join(name), b"data").unwrap();
        }
        let layout = SubmissionLayout::new(dir.path(), "sub1").unwrap();

        let path = TemplateWriter::new(SequencingVariant::IlluminaPaired)
            .create(&layout, Some(&reads))
            .unwrap();

        let rows = read_input_manifest(&path).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].sample_name, "S1");
        assert!(rows[0].sample_filename.ends_with("S1_1.fastq.gz"));
        assert_eq!(rows[1].sample_name, "S1");
        assert!(rows[1].sample_filename.ends_with("S1_2.fastq.gz"));
        assert_eq!(rows[2].sample_name, "S2");
        assert_eq!(rows[2].index, "2");
        assert_eq!(rows[0].sample_file_extension, "fastq.gz");
    }

    #[test]
    fn test_missing_reads_directory() {
        let dir = TempDir::new().unwrap();
        let layout = SubmissionLayout::new(dir.path(), "sub1").unwrap();

        let result = TemplateWriter::new(SequencingVariant::Nanopore)
            .create(&layout, Some(&dir.path().join("missing")));

        assert!(matches!(result, Err(CatsupError::NotFound(_))));
        assert!(!layout.inputs_csv().exists());
    }

    #[test]
    fn test_sample_names() {
        assert_eq!(sample_name_for(Path::new("a/P7_1.fastq.gz"), 1, 2), "P7");
        assert_eq!(sample_name_for(Path::new("a/P7_1.fastq.gz"), 1, 1), "P7_1");
        assert_eq!(sample_name_for(Path::new("_1.fastq.gz"), 1, 2), "_1");
        assert_eq!(extension_of("reads.fq"), "fq");
        assert_eq!(extension_of("reads"), "fastq.gz");
    }
}
