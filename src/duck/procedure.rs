use anyhow::{Context, Result};
use duckdb::Connection;
use tracing::info;

use super::{quote_ident, DuckSink, TableName};

/// Whatever turns a loaded staging table into permanent rows.
///
/// The pipeline only guarantees that the staging table holds exactly one
/// file's rows when this runs; merge rules and validation live behind it.
pub trait StagedBatchCommitter {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn commit_staged_batch(&self, conn: &Connection) -> Result<()>;
}

/// Runs `committer` in its own connection and transaction.
pub fn run_procedure(sink: &DuckSink, committer: &dyn StagedBatchCommitter) -> Result<()> {
    let mut conn = sink.connect()?;
    let tx = conn.transaction().context("beginning procedure transaction")?;
    committer
        .commit_staged_batch(&tx)
        .with_context(|| format!("running procedure {}", committer.name()))?;
    tx.commit()
        .with_context(|| format!("committing procedure {}", committer.name()))?;
    info!(procedure = committer.name(), "procedure completed");
    Ok(())
}

/// An operator-supplied SQL batch.
#[derive(Debug, Clone)]
pub struct SqlProcedure {
    pub name: String,
    pub sql: String,
}

impl StagedBatchCommitter for SqlProcedure {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit_staged_batch(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&self.sql)?;
        Ok(())
    }
}

/// Default upload: upsert staged rows into the permanent table by (date, unit).
#[derive(Debug, Clone)]
pub struct MergeProcedure {
    pub name: String,
    pub staging: TableName,
    pub target: TableName,
    pub date_column: String,
    pub unit_column: String,
}

impl MergeProcedure {
    fn sql(&self) -> String {
        let stg = &self.staging;
        let tgt = &self.target;
        let tgt_alias = tgt.quoted_table();
        let date = quote_ident(&self.date_column);
        let unit = quote_ident(&self.unit_column);

        let mut sql = String::new();
        if let Some(schema) = tgt.quoted_schema() {
            sql.push_str(&format!("CREATE SCHEMA IF NOT EXISTS {schema};\n"));
        }
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {tgt} AS SELECT * FROM {stg} LIMIT 0;\n\
             DELETE FROM {tgt} WHERE EXISTS (\n\
                 SELECT 1 FROM {stg} AS s\n\
                 WHERE s.{date} IS NOT DISTINCT FROM {tgt_alias}.{date}\n\
                   AND s.{unit} IS NOT DISTINCT FROM {tgt_alias}.{unit}\n\
             );\n\
             INSERT INTO {tgt} BY NAME SELECT * FROM {stg};\n"
        ));
        sql
    }
}

impl StagedBatchCommitter for MergeProcedure {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit_staged_batch(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&self.sql())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duck::{insert_report, row_count};
    use crate::process::{parse_report_str, ReportLayout};
    use anyhow::Result;
    use tempfile::tempdir;

    fn layout() -> ReportLayout {
        ReportLayout {
            date_column: "Date".to_string(),
            unit_column: "Unit".to_string(),
        }
    }

    fn merge() -> Result<MergeProcedure> {
        Ok(MergeProcedure {
            name: "nrc_reactor_status_stg_upload".to_string(),
            staging: TableName::parse("main.stg")?,
            target: TableName::parse("main.reactor_status")?,
            date_column: "Date".to_string(),
            unit_column: "Unit".to_string(),
        })
    }

    #[test]
    fn test_merge_upserts_by_date_and_unit() -> Result<()> {
        let tmp = tempdir()?;
        let sink = DuckSink::open(tmp.path().join("nrc.duckdb"))?;
        let merge_proc = merge()?;

        let jan = parse_report_str(
            "Date|Unit|Status\n2024-01-01|UnitA|100\n2024-01-01|UnitB|90\n",
            &layout(),
        )?;
        insert_report(&sink, &merge_proc.staging, &jan)?;
        run_procedure(&sink, &merge_proc)?;

        let revised = parse_report_str(
            "Date|Unit|Status\n2024-01-01|UnitB|50\n2024-01-02|UnitA|100\n",
            &layout(),
        )?;
        insert_report(&sink, &merge_proc.staging, &revised)?;
        run_procedure(&sink, &merge_proc)?;

        let conn = sink.connect()?;
        assert_eq!(row_count(&conn, &merge_proc.target)?, 3);
        let status: String = conn.query_row(
            r#"SELECT "Status" FROM main.reactor_status WHERE "Unit" = 'UnitB'"#,
            [],
            |r| r.get(0),
        )?;
        assert_eq!(status, "50");
        Ok(())
    }

    #[test]
    fn test_sql_procedure_runs_batch() -> Result<()> {
        let tmp = tempdir()?;
        let sink = DuckSink::open(tmp.path().join("nrc.duckdb"))?;
        let staging = TableName::parse("main.stg")?;

        let report = parse_report_str("Date|Unit|Status\n2024-01-01|UnitA|100\n", &layout())?;
        insert_report(&sink, &staging, &report)?;

        let procedure = SqlProcedure {
            name: "copy_out".to_string(),
            sql: "CREATE TABLE IF NOT EXISTS copied AS SELECT * FROM main.stg;".to_string(),
        };
        run_procedure(&sink, &procedure)?;
        assert_eq!(row_count(&sink.connect()?, &TableName::parse("copied")?)?, 1);
        Ok(())
    }

    #[test]
    fn test_failing_procedure_rolls_back() -> Result<()> {
        let tmp = tempdir()?;
        let sink = DuckSink::open(tmp.path().join("nrc.duckdb"))?;

        let procedure = SqlProcedure {
            name: "broken".to_string(),
            sql: "CREATE TABLE side_effect (x INTEGER); SELECT * FROM missing_table;"
                .to_string(),
        };
        let err = run_procedure(&sink, &procedure).unwrap_err();
        assert!(format!("{err:#}").contains("broken"));

        let conn = sink.connect()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'side_effect'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(exists, 0);
        Ok(())
    }
}
