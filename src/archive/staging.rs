// src/archive/staging.rs

use anyhow::{Context, Result};
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// File naming for staged reports: `<prefix><year>.<ext>`.
#[derive(Debug, Clone)]
pub struct ReportNaming {
    prefix: String,
    ext: String,
    pattern: Regex,
}

impl ReportNaming {
    pub fn new(prefix: &str, ext: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r"^{}(\d{{4}})\.{}$",
            regex::escape(prefix),
            regex::escape(ext)
        ))
        .context("building staged file name pattern")?;
        Ok(Self {
            prefix: prefix.to_string(),
            ext: ext.to_string(),
            pattern,
        })
    }

    pub fn file_name(&self, year: i32) -> String {
        format!("{}{}.{}", self.prefix, year, self.ext)
    }

    /// Recover the report year from a staged file name, if it is one of ours.
    pub fn year_of(&self, file_name: &str) -> Option<i32> {
        self.pattern.captures(file_name)?.get(1)?.as_str().parse().ok()
    }
}

/// A report file sitting in staging, with the year it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedReport {
    pub year: i32,
    pub path: PathBuf,
}

/// One regular file found in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingEntry {
    Report(StagedReport),
    /// A file whose name does not follow the report naming.
    Unrecognized(PathBuf),
}

impl StagingEntry {
    pub fn path(&self) -> &Path {
        match self {
            StagingEntry::Report(r) => &r.path,
            StagingEntry::Unrecognized(p) => p,
        }
    }
}

/// Snapshot of the regular files in `staging_dir`, sorted by name.
///
/// Subdirectories are skipped. A missing directory yields an empty list.
pub fn scan_staging(staging_dir: &Path, naming: &ReportNaming) -> Result<Vec<StagingEntry>> {
    if !staging_dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(staging_dir)
        .with_context(|| format!("listing staging directory {:?}", staging_dir))?
    {
        let entry = entry.with_context(|| format!("reading entry in {:?}", staging_dir))?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let year = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| naming.year_of(n));
            match year {
                Some(year) => StagingEntry::Report(StagedReport { year, path }),
                None => StagingEntry::Unrecognized(path),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_naming_round_trip() -> Result<()> {
        let naming = ReportNaming::new("NRCReactorStatus", "txt")?;
        assert_eq!(naming.file_name(2025), "NRCReactorStatus2025.txt");
        assert_eq!(naming.year_of("NRCReactorStatus2025.txt"), Some(2025));
        Ok(())
    }

    #[test]
    fn test_naming_is_strict() -> Result<()> {
        let naming = ReportNaming::new("NRCReactorStatus", "txt")?;
        assert_eq!(naming.year_of("NRCReactorStatus2025.txt.bak"), None);
        assert_eq!(naming.year_of("NRCReactorStatus25.txt"), None);
        assert_eq!(naming.year_of("NRCReactorStatus2025Xtxt"), None);
        assert_eq!(naming.year_of("OtherReport2025.txt"), None);
        Ok(())
    }

    #[test]
    fn test_scan_staging() -> Result<()> {
        let tmp = tempdir()?;
        let naming = ReportNaming::new("NRCReactorStatus", "txt")?;
        fs::write(tmp.path().join("NRCReactorStatus2024.txt"), "x")?;
        fs::write(tmp.path().join("NRCReactorStatus2023.txt"), "x")?;
        fs::write(tmp.path().join("notes.md"), "x")?;
        fs::create_dir(tmp.path().join("nested"))?;

        let entries = scan_staging(tmp.path(), &naming)?;
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            StagingEntry::Report(StagedReport {
                year: 2023,
                path: tmp.path().join("NRCReactorStatus2023.txt"),
            })
        );
        assert!(matches!(&entries[1], StagingEntry::Report(r) if r.year == 2024));
        assert_eq!(
            entries[2],
            StagingEntry::Unrecognized(tmp.path().join("notes.md"))
        );
        Ok(())
    }

    #[test]
    fn test_scan_missing_dir() -> Result<()> {
        let tmp = tempdir()?;
        let naming = ReportNaming::new("NRCReactorStatus", "txt")?;
        assert!(scan_staging(&tmp.path().join("staging"), &naming)?.is_empty());
        Ok(())
    }
}
