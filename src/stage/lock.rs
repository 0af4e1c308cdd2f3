//! Exclusive ownership of one stage of one submission.
//!
//! The lock file is written in full to a temporary file and then linked into
//! place without replacing an existing lock, so at most one process holds it
//! and a lock is never observed half written. It records the owner's pid and
//! hostname; a lock whose owner is gone is broken by the next caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Stage;
use crate::core::SubmissionLayout;
use crate::{CatsupError, Result};

/// Locks from another host are trusted for this long
const FOREIGN_LOCK_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            hostname: current_hostname(),
            acquired_at: Utc::now(),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "pid {} on {} since {}",
            self.pid,
            self.hostname,
            self.acquired_at.to_rfc3339()
        )
    }

    pub fn is_stale(&self) -> bool {
        if self.hostname == current_hostname() {
            !is_process_alive(self.pid)
        } else {
            let age = Utc::now() - self.acquired_at;
            age.num_hours() > FOREIGN_LOCK_MAX_AGE_HOURS
        }
    }
}

#[derive(Debug)]
pub struct StageLock {
    path: PathBuf,
    lock_file: Option<File>,
}

impl StageLock {
    /// Try to take the lock for `stage`. A live holder yields `StageBusy`.
    pub fn try_acquire(layout: &SubmissionLayout, stage: Stage) -> Result<Self> {
        let path = layout.stage_lock(stage);
        fs::create_dir_all(layout.stages_dir())?;

        // Bounded: a stale lock is broken at most once before giving up
        for _ in 0..2 {
            match create_lock_file(&path)? {
                Some(file) => {
                    debug!("Acquired {}", path.display());
                    return Ok(Self {
                        path,
                        lock_file: Some(file),
                    });
                }
                None => match read_lock_info(&path) {
                    Some(info) if info.is_stale() => {
                        warn!("Breaking stale lock {} ({})", path.display(), info.describe());
                        if !break_stale_lock(&path, &info)? {
                            break;
                        }
                    }
                    None if !path.exists() => continue,
                    holder => return Err(busy(layout, stage, holder)),
                },
            }
        }

        Err(CatsupError::StageBusy {
            submission: layout.name().to_string(),
            stage,
            holder: "lock was re-taken while breaking a stale lock".to_string(),
        })
    }

    /// Holder of a live lock on `stage`, if any
    pub fn holder(layout: &SubmissionLayout, stage: Stage) -> Option<LockInfo> {
        let path = layout.stage_lock(stage);
        if !path.exists() {
            return None;
        }
        match read_lock_info(&path) {
            Some(info) if info.is_stale() => None,
            Some(info) => Some(info),
            // Can't read lock, assume locked
            None => Some(LockInfo {
                pid: 0,
                hostname: "unknown".to_string(),
                acquired_at: Utc::now(),
            }),
        }
    }

    pub fn is_held(layout: &SubmissionLayout, stage: Stage) -> bool {
        Self::holder(layout, stage).is_some()
    }

    /// A lock file exists but does not name a holder
    pub fn is_unreadable(layout: &SubmissionLayout, stage: Stage) -> bool {
        let path = layout.stage_lock(stage);
        path.exists() && read_lock_info(&path).is_none()
    }

    /// Remove a lock file regardless of its holder
    pub fn force_release(layout: &SubmissionLayout, stage: Stage) -> Result<()> {
        remove_if_present(&layout.stage_lock(stage))
    }
}

impl Drop for StageLock {
    fn drop(&mut self) {
        self.lock_file = None;
        let _ = fs::remove_file(&self.path);
    }
}

fn busy(layout: &SubmissionLayout, stage: Stage, holder: Option<LockInfo>) -> CatsupError {
    CatsupError::StageBusy {
        submission: layout.name().to_string(),
        stage,
        holder: holder
            .map(|h| h.describe())
            .unwrap_or_else(|| "unknown holder".to_string()),
    }
}

/// Write our lock info beside `path` and link it into place. Returns None
/// when another lock already exists.
fn create_lock_file(path: &Path) -> Result<Option<File>> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(&serde_json::to_vec(&LockInfo::current())?)?;
    temp.as_file().sync_all()?;

    match temp.persist_noclobber(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e.error.into()),
    }
}

/// Move a stale lock aside and delete it, unless it was replaced by a fresh
/// lock since it was read. Returns false when a live holder took over.
fn break_stale_lock(path: &Path, stale: &LockInfo) -> Result<bool> {
    let aside = path.with_extension(format!("lock.stale-{}", Uuid::new_v4()));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        // Someone else broke it first
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    }

    if read_lock_info(&aside).as_ref() == Some(stale) {
        remove_if_present(&aside)?;
        return Ok(true);
    }

    // A fresh lock was moved aside; put it back for its owner
    debug!("Lock {} was re-taken, restoring it", path.display());
    let restored = fs::hard_link(&aside, path);
    remove_if_present(&aside)?;
    match restored {
        Ok(()) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn read_lock_info(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn current_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    // pid 0 and negative values address process groups
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    // Signal 0 only checks that the process exists
    let result = unsafe { libc::kill(pid as i32, 0) };
    result == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    // Fallback: assume alive if we can't check
    true
}
