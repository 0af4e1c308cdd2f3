pub mod atomic;
pub mod progress;

pub use atomic::{write_atomic, write_json_atomic};
