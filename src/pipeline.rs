// src/pipeline.rs

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::fs;
use tracing::{error, info, warn};
use url::Url;

use crate::{
    archive::{scan_staging, Archive, Disposition, ReportNaming, StagedReport, StagingEntry},
    backfill::BackfillRange,
    config::Config,
    duck::{
        insert_report, run_procedure, DuckSink, MergeProcedure, SqlProcedure,
        StagedBatchCommitter, TableName,
    },
    fetch::{build_client, download_report, urls::parse_base_url},
    process::{parse_report, ReportLayout},
};

/// Outcome counts of the COLLECTING phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectSummary {
    pub attempted: usize,
    pub staged: usize,
    pub failed: usize,
}

/// Outcome counts of the PROCESSING phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub archived: usize,
    pub errored: usize,
    pub quarantined: usize,
    /// Files whose move out of staging failed.
    pub stranded: usize,
}

impl ProcessSummary {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Archived { .. } => self.archived += 1,
            Disposition::Errored => self.errored += 1,
            Disposition::Quarantined => self.quarantined += 1,
        }
    }
}

/// Fetches yearly power status reports and pushes them through the staging
/// table, one file at a time.
pub struct Collector {
    client: Client,
    base_url: Url,
    naming: ReportNaming,
    layout: ReportLayout,
    archive: Archive,
    sink: DuckSink,
    staging_table: TableName,
    committer: Box<dyn StagedBatchCommitter>,
}

impl Collector {
    /// Wire everything up from configuration, with the procedure it names.
    pub fn from_config(config: &Config) -> Result<Self> {
        let staging_table = TableName::parse(&config.staging_table)?;
        let committer: Box<dyn StagedBatchCommitter> = match &config.procedure.sql {
            Some(sql) => Box::new(SqlProcedure {
                name: config.procedure.name.clone(),
                sql: sql.clone(),
            }),
            None => Box::new(MergeProcedure {
                name: config.procedure.name.clone(),
                staging: staging_table.clone(),
                target: TableName::parse(&config.target_table)?,
                date_column: config.layout.date_column.clone(),
                unit_column: config.layout.unit_column.clone(),
            }),
        };
        Self::build(config, staging_table, committer)
    }

    /// Same as [`Collector::from_config`] but with an injected procedure.
    pub fn with_committer(
        config: &Config,
        committer: Box<dyn StagedBatchCommitter>,
    ) -> Result<Self> {
        let staging_table = TableName::parse(&config.staging_table)?;
        Self::build(config, staging_table, committer)
    }

    fn build(
        config: &Config,
        staging_table: TableName,
        committer: Box<dyn StagedBatchCommitter>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(&config.user_agent)?,
            base_url: parse_base_url(&config.base_url)?,
            naming: ReportNaming::new(&config.filename_prefix, &config.file_ext)?,
            layout: config.layout.clone(),
            archive: Archive::new(&config.base_dir),
            sink: DuckSink::open(config.database_path())?,
            staging_table,
            committer,
        })
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn sink(&self) -> &DuckSink {
        &self.sink
    }

    /// COLLECTING: download every year the cursor yields into staging.
    ///
    /// A failed year is logged and skipped; the cursor moves on regardless.
    pub fn collect(&self, range: BackfillRange) -> Result<CollectSummary> {
        let staging = self.archive.staging_dir();
        fs::create_dir_all(&staging)
            .with_context(|| format!("creating staging directory {:?}", staging))?;

        let mut summary = CollectSummary::default();
        for year in range.years() {
            summary.attempted += 1;
            match download_report(&self.client, &self.base_url, &self.naming, &staging, year) {
                Ok(Some(_)) => summary.staged += 1,
                Ok(None) => summary.failed += 1,
                Err(e) => {
                    error!(year, "download failed: {:#}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            attempted = summary.attempted,
            staged = summary.staged,
            failed = summary.failed,
            "collect finished"
        );
        Ok(summary)
    }

    /// PROCESSING: parse, load and file away everything currently in staging.
    ///
    /// Only listing the staging directory can fail the run; every per-file
    /// problem is logged and turned into a disposition.
    pub fn process(&self) -> Result<ProcessSummary> {
        let entries = scan_staging(&self.archive.staging_dir(), &self.naming)?;
        info!(files = entries.len(), "processing staged files");

        let mut summary = ProcessSummary::default();
        for entry in entries {
            let disposition = match &entry {
                StagingEntry::Report(report) => self.process_report(report),
                StagingEntry::Unrecognized(path) => {
                    warn!(path = %path.display(), "file name does not match report naming");
                    Disposition::Quarantined
                }
            };

            match self.archive.dispose(entry.path(), disposition) {
                Ok(_) => summary.record(disposition),
                Err(e) => {
                    error!(path = %entry.path().display(), "could not move file: {:#}", e);
                    summary.stranded += 1;
                }
            }
        }

        info!(
            archived = summary.archived,
            errored = summary.errored,
            quarantined = summary.quarantined,
            stranded = summary.stranded,
            "process finished"
        );
        Ok(summary)
    }

    /// Decide where one staged report goes.
    ///
    /// The procedure only runs after a successful load.
    pub fn process_report(&self, report: &StagedReport) -> Disposition {
        let table = match parse_report(&report.path, &self.layout) {
            Ok(table) => table,
            Err(e) => {
                error!(path = %report.path.display(), "Error reading file: {:#}", e);
                return Disposition::Quarantined;
            }
        };

        if let Err(e) = insert_report(&self.sink, &self.staging_table, &table) {
            error!(path = %report.path.display(), "Error inserting data: {:#}", e);
            return Disposition::Errored;
        }

        if let Err(e) = run_procedure(&self.sink, self.committer.as_ref()) {
            error!(path = %report.path.display(), "Error running procedure: {:#}", e);
            return Disposition::Errored;
        }

        Disposition::Archived { year: report.year }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use duckdb::Connection;
    use std::{
        cell::Cell,
        path::Path,
        rc::Rc,
    };
    use tempfile::tempdir;

    /// Counts invocations and optionally fails.
    struct CountingCommitter {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl StagedBatchCommitter for CountingCommitter {
        fn name(&self) -> &str {
            "counting"
        }

        fn commit_staged_batch(&self, _conn: &Connection) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                bail!("procedure rejected batch");
            }
            Ok(())
        }
    }

    fn config(base: &Path) -> Config {
        Config {
            base_dir: base.to_path_buf(),
            // never contacted by these tests
            base_url: "http://127.0.0.1:9/".to_string(),
            ..Config::default()
        }
    }

    fn collector(base: &Path, fail: bool) -> Result<(Collector, Rc<Cell<usize>>)> {
        let calls = Rc::new(Cell::new(0));
        let committer = CountingCommitter {
            calls: calls.clone(),
            fail,
        };
        Ok((Collector::with_committer(&config(base), Box::new(committer))?, calls))
    }

    fn stage(collector: &Collector, name: &str, body: &str) -> Result<()> {
        let dir = collector.archive().staging_dir();
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(name), body)?;
        Ok(())
    }

    const GOOD: &str = "ReportDt|Unit|Power\n12/31/2024 12:00:00 AM|Byron 1|100\n";

    #[test]
    fn test_good_file_is_archived_by_year() -> Result<()> {
        let tmp = tempdir()?;
        let (collector, calls) = collector(tmp.path(), false)?;
        stage(&collector, "NRCReactorStatus2024.txt", GOOD)?;

        let summary = collector.process()?;
        assert_eq!(summary.archived, 1);
        assert_eq!(calls.get(), 1);
        assert!(tmp.path().join("2024/NRCReactorStatus2024.txt").exists());
        assert!(!tmp.path().join("staging/NRCReactorStatus2024.txt").exists());
        Ok(())
    }

    #[test]
    fn test_procedure_failure_goes_to_error() -> Result<()> {
        let tmp = tempdir()?;
        let (collector, calls) = collector(tmp.path(), true)?;
        stage(&collector, "NRCReactorStatus2024.txt", GOOD)?;

        let summary = collector.process()?;
        assert_eq!(summary.errored, 1);
        assert_eq!(calls.get(), 1);
        assert!(tmp.path().join("error/NRCReactorStatus2024.txt").exists());
        Ok(())
    }

    #[test]
    fn test_load_failure_skips_procedure() -> Result<()> {
        let tmp = tempdir()?;
        let (collector, calls) = collector(tmp.path(), false)?;
        // first file fixes the staging table's columns
        stage(&collector, "NRCReactorStatus2023.txt", GOOD)?;
        stage(
            &collector,
            "NRCReactorStatus2024.txt",
            "ReportDt|Unit|Power|Extra\n12/31/2024 12:00:00 AM|Byron 1|100|x\n",
        )?;

        let summary = collector.process()?;
        assert_eq!(summary.archived, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(calls.get(), 1);
        assert!(tmp.path().join("error/NRCReactorStatus2024.txt").exists());
        Ok(())
    }

    #[test]
    fn test_unparseable_and_unrecognized_are_quarantined() -> Result<()> {
        let tmp = tempdir()?;
        let (collector, calls) = collector(tmp.path(), false)?;
        stage(
            &collector,
            "NRCReactorStatus2022.txt",
            "Unit|Power\nByron 1|100\n",
        )?;
        stage(&collector, "readme.txt", "hello")?;

        let summary = collector.process()?;
        assert_eq!(summary.quarantined, 2);
        assert_eq!(calls.get(), 0);
        assert!(tmp.path().join("quarantine/NRCReactorStatus2022.txt").exists());
        assert!(tmp.path().join("quarantine/readme.txt").exists());
        let left = fs::read_dir(tmp.path().join("staging"))?.count();
        assert_eq!(left, 0);
        Ok(())
    }

    #[test]
    fn test_from_config_uses_configured_tables() -> Result<()> {
        let tmp = tempdir()?;
        let mut cfg = config(tmp.path());
        cfg.staging_table = "main.custom_stg".to_string();
        cfg.database_path = Some(tmp.path().join("custom.duckdb"));

        let collector = Collector::from_config(&cfg)?;
        assert_eq!(collector.staging_table, TableName::parse("main.custom_stg")?);
        assert_eq!(collector.sink().path(), tmp.path().join("custom.duckdb").as_path());
        Ok(())
    }

    #[test]
    fn test_from_config_rejects_bad_staging_table() {
        let tmp = tempdir().unwrap();
        let mut cfg = config(tmp.path());
        cfg.staging_table = "a.b.c.d".to_string();
        assert!(Collector::from_config(&cfg).is_err());
    }

    #[test]
    fn test_empty_staging() -> Result<()> {
        let tmp = tempdir()?;
        let (collector, _) = collector(tmp.path(), false)?;
        assert_eq!(collector.process()?, ProcessSummary::default());
        Ok(())
    }

    #[test]
    fn test_collect_zero_years_creates_staging_only() -> Result<()> {
        let tmp = tempdir()?;
        let (collector, _) = collector(tmp.path(), false)?;
        let from = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let to = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let summary = collector.collect(BackfillRange::new(from, to, 1)?)?;
        assert_eq!(summary, CollectSummary::default());
        assert!(tmp.path().join("staging").is_dir());
        Ok(())
    }

    #[test]
    fn test_collect_transport_failure_is_counted() -> Result<()> {
        let tmp = tempdir()?;
        let (collector, _) = collector(tmp.path(), false)?;
        let day = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let summary = collector.collect(BackfillRange::single(day))?;
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(fs::read_dir(tmp.path().join("staging"))?.count(), 0);
        Ok(())
    }
}
