//! Destinations an upload can be sent to.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::tools::{CommandExecutor, ExternalCommand};
use crate::{CatsupError, Result};

/// A single failed transfer attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{target}: {message}")]
pub struct TransportError {
    pub target: String,
    pub message: String,
}

impl TransportError {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Object storage reachable under a per-submission prefix
pub trait ObjectStore: Send + Sync {
    /// Short label used in logs and errors
    fn target(&self) -> &str;

    /// Transfer `files` to `{destination}/{prefix}/{file name}`
    fn put(&self, prefix: &str, files: &[PathBuf]) -> TransportResult<()>;

    /// Files per `put` call; None sends every file in one call
    fn batch_size(&self) -> Option<usize> {
        Some(1)
    }

    /// Whether a completion marker is sent after all files
    fn wants_completion_marker(&self) -> bool {
        false
    }
}

/// Pre-authenticated request URL; each file is an HTTP PUT
pub struct PreAuthenticatedStore {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl PreAuthenticatedStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| CatsupError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: &str, client: reqwest::blocking::Client) -> Self {
        Self {
            base_url: base_url.trim().to_string(),
            client,
        }
    }

    pub fn url_for(&self, prefix: &str, file: &Path) -> String {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{}{}/{}", self.base_url, prefix, name)
    }
}

impl ObjectStore for PreAuthenticatedStore {
    fn target(&self) -> &str {
        "par"
    }

    fn put(&self, prefix: &str, files: &[PathBuf]) -> TransportResult<()> {
        for file in files {
            let url = self.url_for(prefix, file);
            debug!("PUT {}", url);

            let body = File::open(file)
                .map_err(|e| TransportError::new(self.target(), format!("{}: {}", file.display(), e)))?;
            let response = self
                .client
                .put(&url)
                .body(body)
                .send()
                .map_err(|e| TransportError::new(self.target(), e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::new(
                    self.target(),
                    format!("PUT {} returned HTTP {}", file.display(), status),
                ));
            }
            info!("Uploaded {}", file.display());
        }
        Ok(())
    }

    fn wants_completion_marker(&self) -> bool {
        true
    }
}

/// S3-compatible bucket, written with one bulk `s3cmd put`
pub struct BucketStore {
    bucket: String,
    s3cmd_config: String,
    executor: Arc<dyn CommandExecutor>,
}

impl BucketStore {
    pub fn new(bucket: &str, s3cmd_config: &str, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            bucket: bucket.trim().trim_end_matches('/').to_string(),
            s3cmd_config: s3cmd_config.to_string(),
            executor,
        }
    }

    pub fn command(&self, prefix: &str, files: &[PathBuf]) -> ExternalCommand {
        ExternalCommand::new("s3cmd")
            .args(["-c", self.s3cmd_config.as_str(), "put"])
            .args(files.iter().map(|f| f.to_string_lossy().to_string()))
            .arg(format!("{}/{}/", self.bucket, prefix))
    }
}

impl ObjectStore for BucketStore {
    fn target(&self) -> &str {
        "bucket"
    }

    fn put(&self, prefix: &str, files: &[PathBuf]) -> TransportResult<()> {
        let command = self.command(prefix, files);
        info!("s3cmd invocation: {}", command.command_line());

        let output = self
            .executor
            .execute(&command)
            .map_err(|e| TransportError::new(self.target(), format!("could not start s3cmd: {}", e)))?;
        if !output.success {
            return Err(TransportError::new(
                self.target(),
                format!("s3cmd failed ({}): {}", output.status, output.stderr.trim()),
            ));
        }

        info!("Uploaded files to: {}/{}", self.bucket, prefix);
        Ok(())
    }

    fn batch_size(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fake::FakeExecutor;
    use crate::tools::CommandOutput;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_par_url_layout() {
        let store = PreAuthenticatedStore::new("https://par.example/p/TOKEN/o/").unwrap();
        assert_eq!(
            store.url_for("sub-uuid", Path::new("/data/upload/U_C1.fastq.gz")),
            "https://par.example/p/TOKEN/o/sub-uuid/U_C1.fastq.gz"
        );
    }

    #[test]
    fn test_bucket_command() {
        let store = BucketStore::new("s3://bucket/", "/home/u/.s3cfg", Arc::new(FakeExecutor::succeeding()));
        let command = store.command("sub-uuid", &[PathBuf::from("up/a"), PathBuf::from("up/b")]);

        assert_eq!(
            command.command_line(),
            "s3cmd -c /home/u/.s3cfg put up/a up/b s3://bucket/sub-uuid/"
        );
    }

    #[test]
    fn test_bucket_failure_is_transport_error() {
        let executor = Arc::new(FakeExecutor::new(|_, _| Ok(CommandOutput::failure(1, "403 Forbidden"))));
        let store = BucketStore::new("s3://bucket", "cfg", executor);

        let err = store.put("sub", &[PathBuf::from("a")]).unwrap_err();
        assert_eq!(err.target, "bucket");
        assert!(err.message.contains("403 Forbidden"));
    }

    fn local_store(base: &str) -> PreAuthenticatedStore {
        let client = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
        PreAuthenticatedStore::with_client(base, client)
    }

    /// Serve `statuses` to consecutive requests and return the received request heads
    fn serve(statuses: Vec<u16>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/o/", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for status in statuses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut received = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = stream.read(&mut buf).unwrap();
                    received.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&received).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap())
                            })
                            .unwrap_or(0);
                        if received.len() >= end + 4 + length || n == 0 {
                            requests.push(text[..end].to_string());
                            break;
                        }
                    }
                    if n == 0 {
                        break;
                    }
                }
                write!(
                    stream,
                    "HTTP/1.1 {} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                )
                .unwrap();
            }
            requests
        });

        (base, handle)
    }

    #[test]
    fn test_par_put_sends_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("U_C1.fastq.gz");
        std::fs::write(&file, b"cleaned reads").unwrap();
        let (base, server) = serve(vec![200]);

        local_store(&base).put("sub-uuid", &[file]).unwrap();

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("PUT /o/sub-uuid/U_C1.fastq.gz HTTP/1.1"));
    }

    #[test]
    fn test_par_non_success_status() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.fastq.gz");
        std::fs::write(&file, b"x").unwrap();
        let (base, server) = serve(vec![503]);

        let err = local_store(&base).put("sub", &[file]).unwrap_err();
        server.join().unwrap();

        assert_eq!(err.target, "par");
        assert!(err.message.contains("503"));
    }
}
