pub mod config;
pub mod manager;
pub mod paths;
pub mod submission;

pub use config::Config;
pub use manager::{StageOptions, SubmissionEntry, SubmissionManager};
pub use submission::{SequencingVariant, SubmissionLayout, SubmissionRecord};
