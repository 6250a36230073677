// src/archive/mod.rs

use anyhow::{anyhow, Context, Result};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::info;

pub mod staging;

pub use staging::{scan_staging, ReportNaming, StagedReport, StagingEntry};

/// Where a processed staging file ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Loaded and committed: `<base>/<year>/`.
    Archived { year: i32 },
    /// Load or procedure failed: `<base>/error/`.
    Errored,
    /// Could not be parsed or named: `<base>/quarantine/`.
    Quarantined,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Archived { year } => write!(f, "archived/{}", year),
            Disposition::Errored => f.write_str("error"),
            Disposition::Quarantined => f.write_str("quarantine"),
        }
    }
}

/// Directory layout under the collector's base directory.
#[derive(Debug, Clone)]
pub struct Archive {
    base_dir: PathBuf,
}

impl Archive {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("staging")
    }

    pub fn year_dir(&self, year: i32) -> PathBuf {
        self.base_dir.join(year.to_string())
    }

    pub fn error_dir(&self) -> PathBuf {
        self.base_dir.join("error")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.base_dir.join("quarantine")
    }

    pub fn dir_for(&self, disposition: Disposition) -> PathBuf {
        match disposition {
            Disposition::Archived { year } => self.year_dir(year),
            Disposition::Errored => self.error_dir(),
            Disposition::Quarantined => self.quarantine_dir(),
        }
    }

    /// Move `path` into the directory for `disposition`, keeping its file name.
    ///
    /// The target directory is created if missing. An existing file of the same
    /// name is replaced. Returns the new path.
    pub fn dispose(&self, path: &Path, disposition: Disposition) -> Result<PathBuf> {
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("{:?} has no file name", path))?;
        let dir = self.dir_for(disposition);
        fs::create_dir_all(&dir).with_context(|| format!("creating {:?}", dir))?;

        let dest = dir.join(file_name);
        fs::rename(path, &dest).with_context(|| format!("moving {:?} to {:?}", path, dest))?;
        info!(from = %path.display(), to = %dest.display(), %disposition, "moved file");
        Ok(dest)
    }
}
