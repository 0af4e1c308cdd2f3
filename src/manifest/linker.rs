//! Materialises renamed read files for the pipeline.
//!
//! Links are created in a staging directory next to the final
//! `pipeline_in` directory. `commit` swaps the staging directory into place,
//! so `pipeline_in` only ever appears once every link exists. A linker that
//! is dropped without being committed removes its staging directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{CatsupError, Result};

pub struct RenameLinker {
    staging: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl RenameLinker {
    /// Start a fresh staging area; leftovers of an earlier failed run are discarded
    pub fn new(staging: PathBuf, target: PathBuf) -> Result<Self> {
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        Ok(Self {
            staging,
            target,
            committed: false,
        })
    }

    /// Create `renamed_name` in the staging area pointing at the absolute path
    /// of `original`. An existing entry with the same name is replaced.
    pub fn link_for_pipeline(&self, original: &Path, renamed_name: &str) -> Result<PathBuf> {
        let link = self.staging.join(renamed_name);
        let link_error = |source: io::Error| CatsupError::Link {
            original: original.to_path_buf(),
            link: link.clone(),
            source,
        };

        let absolute = std::path::absolute(original).map_err(link_error)?;
        if !absolute.exists() {
            return Err(link_error(io::Error::new(
                io::ErrorKind::NotFound,
                "original file does not exist",
            )));
        }

        if fs::symlink_metadata(&link).is_ok() {
            fs::remove_file(&link).map_err(link_error)?;
        }

        create_link(&absolute, &link).map_err(link_error)?;
        debug!("{} -> {}", link.display(), absolute.display());

        Ok(self.target.join(renamed_name))
    }

    /// Replace the pipeline-input directory with the staged links
    pub fn commit(mut self) -> Result<PathBuf> {
        if self.target.exists() {
            fs::remove_dir_all(&self.target)?;
        }
        fs::rename(&self.staging, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for RenameLinker {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_dir_all(&self.staging);
        }
    }
}

#[cfg(unix)]
fn create_link(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn create_link(original: &Path, link: &Path) -> io::Result<()> {
    fs::hard_link(original, link)
}
