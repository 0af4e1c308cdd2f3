//! Multi-algorithm content digests for read files.
//!
//! Sequencing files are large, so every file is streamed exactly once and the
//! same buffer feeds the MD5, SHA-1 and SHA-512 accumulators.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::Result;

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Lowercase hex digests of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigests {
    pub md5: String,
    pub sha1: String,
    pub sha512: String,
}

#[derive(Debug, Clone)]
pub struct IntegrityHasher {
    buffer_size: usize,
}

impl Default for IntegrityHasher {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl IntegrityHasher {
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Digest the file at `path`. Failing to open or read it is an I/O error.
    pub fn digest(&self, path: &Path) -> Result<FileDigests> {
        let file = File::open(path)?;
        Ok(self.digest_reader(file)?)
    }

    pub fn digest_reader<R: Read>(&self, mut reader: R) -> io::Result<FileDigests> {
        let mut md5 = md5::Context::new();
        let mut sha1 = Sha1::new();
        let mut sha512 = Sha512::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let chunk = &buffer[..bytes_read];
            md5.consume(chunk);
            sha1.update(chunk);
            sha512.update(chunk);
        }

        Ok(FileDigests {
            md5: format!("{:x}", md5.compute()),
            sha1: hex::encode(sha1.finalize()),
            sha512: hex::encode(sha512.finalize()),
        })
    }
}
