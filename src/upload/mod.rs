//! Upload of decontaminated reads
//!
//! The upload stage finalises the processing manifest with cleaned-file
//! digests and then sends every file in `upload/` to each configured
//! destination, retrying transient failures with exponential backoff.

pub mod engine;
pub mod retry;
pub mod transport;

pub use engine::{UploadEngine, UploadSummary};
pub use retry::{with_retry, Exhausted, RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper};
pub use transport::{BucketStore, ObjectStore, PreAuthenticatedStore, TransportError, TransportResult};
