//! Row-level content checks for the input manifest.
//!
//! Validation runs before any hashing or linking work. Every problem in the
//! manifest is collected so the user can fix them in one pass.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use super::InputRow;

/// Content check applied to each input row
pub trait RowValidator: Send + Sync {
    /// Problems found in `row`; `line` is the 1-based data row number
    fn validate(&self, line: usize, row: &InputRow) -> Vec<String>;
}

/// The checks the submission template promises: no empty values, ISO
/// collection dates, plausible e-mail addresses and existing read files
#[derive(Debug, Default, Clone)]
pub struct TemplateValidator;

/// Accepts every row
#[derive(Debug, Default, Clone)]
pub struct PermissiveValidator;

const DATE_FIELDS: [&str; 1] = ["sample_collection_date"];
const EMAIL_FIELDS: [&str; 1] = ["submitter_email"];
const FILEPATH_FIELDS: [&str; 1] = ["sample_filename"];

impl RowValidator for TemplateValidator {
    fn validate(&self, line: usize, row: &InputRow) -> Vec<String> {
        let mut problems = Vec::new();

        for (field, value) in row.fields() {
            if value.is_empty() {
                problems.push(format!("row {}: column {} is empty", line, field));
                continue;
            }
            if DATE_FIELDS.contains(&field) && !is_valid_date(value) {
                problems.push(format!(
                    "row {}: column {} date is '{}', expected YYYY-MM-DD",
                    line, field, value
                ));
            }
            if EMAIL_FIELDS.contains(&field) && !is_valid_email(value) {
                problems.push(format!(
                    "row {}: column {} e-mail '{}' is not valid",
                    line, field, value
                ));
            }
            if FILEPATH_FIELDS.contains(&field) && !Path::new(value).exists() {
                problems.push(format!(
                    "row {}: column {} file '{}' does not exist",
                    line, field, value
                ));
            }
        }

        problems
    }
}

impl RowValidator for PermissiveValidator {
    fn validate(&self, _line: usize, _row: &InputRow) -> Vec<String> {
        Vec::new()
    }
}

/// `YYYY-MM-DD` with a year in 1900..=2100; day range is not checked per month
pub fn is_valid_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let part = |range: std::ops::Range<usize>| s.get(range).and_then(|p| p.parse::<u32>().ok());

    match (part(0..4), part(5..7), part(8..10)) {
        (Some(year), Some(month), Some(day)) => {
            (1900..=2100).contains(&year) && (1..=12).contains(&month) && (1..=31).contains(&day)
        }
        _ => false,
    }
}

pub fn is_valid_email(s: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| {
            Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").expect("static regex")
        })
        .is_match(s)
}
