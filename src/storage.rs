//! Write-then-publish storage for sanitized output

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

const SUFFIX: &str = "_sanitized.pdf";

/// Directory holding published sanitized files. Each file is written under a
/// temporary name and only appears at its final path once fully synced.
#[derive(Debug, Clone)]
pub struct SanitizedStore {
    dir: PathBuf,
}

impl SanitizedStore {
    /// Create the directory if needed and resolve it to an absolute path.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        let dir = fs::canonicalize(dir.as_ref())?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, file_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", file_id, SUFFIX))
    }

    /// Publish `bytes` under `file_id`. The temp file is removed on every
    /// failure path by its drop.
    pub fn persist(&self, file_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        if file_id.is_empty()
            || !file_id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(Error::Config(format!("Invalid file id: {:?}", file_id)));
        }

        let target = self.path_for(file_id);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&target).map_err(|e| Error::Io(e.error))?;

        debug!(path = %target.display(), len = bytes.len(), "Sanitized output published");
        Ok(target)
    }
}
