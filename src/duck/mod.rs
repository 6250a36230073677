use anyhow::{bail, Context, Result};
use duckdb::Connection;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::process::{date_parser::format_timestamp, ReportTable};

pub mod procedure;

pub use procedure::{run_procedure, MergeProcedure, SqlProcedure, StagedBatchCommitter};

/// Rows per multi-row INSERT statement.
const CHUNK_ROWS: usize = 1_000;

/// A `[database.][schema.]table` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub table: String,
}

impl TableName {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split('.').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            bail!("invalid table name {:?}", raw);
        }
        match parts.as_slice() {
            [table] => Ok(Self {
                database: None,
                schema: None,
                table: table.to_string(),
            }),
            [schema, table] => Ok(Self {
                database: None,
                schema: Some(schema.to_string()),
                table: table.to_string(),
            }),
            [database, schema, table] => Ok(Self {
                database: Some(database.to_string()),
                schema: Some(schema.to_string()),
                table: table.to_string(),
            }),
            _ => bail!("table name {:?} has more than three parts", raw),
        }
    }

    /// Quoted `database.schema` prefix, if a schema was given.
    fn quoted_schema(&self) -> Option<String> {
        let schema = self.schema.as_deref()?;
        Some(match &self.database {
            Some(db) => format!("{}.{}", quote_ident(db), quote_ident(schema)),
            None => quote_ident(schema),
        })
    }

    /// The bare table name, quoted, for column qualification.
    pub fn quoted_table(&self) -> String {
        quote_ident(&self.table)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quoted_schema() {
            Some(prefix) => write!(f, "{}.{}", prefix, quote_ident(&self.table)),
            None => f.write_str(&quote_ident(&self.table)),
        }
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Hands out one `DuckDB` connection per unit of work.
///
/// Nothing is cached: each caller opens a connection, uses it inside a scope
/// and drops it, which closes it.
#[derive(Debug, Clone)]
pub struct DuckSink {
    path: PathBuf,
}

impl DuckSink {
    /// Point at a database file, creating its parent directory if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {:?}", parent))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("opening DuckDB at {}", self.path.display()))
    }
}

/// Replace the staging table's contents with `report`.
///
/// Truncate and append run in two separate connections and transactions.
/// A failure between them leaves the table empty, never holding rows from
/// an earlier file. Returns the number of rows appended.
pub fn insert_report(sink: &DuckSink, table: &TableName, report: &ReportTable) -> Result<usize> {
    {
        let mut conn = sink.connect()?;
        let tx = conn.transaction().context("beginning truncate transaction")?;
        ensure_staging_table(&tx, table, report)?;
        tx.execute_batch(&format!("TRUNCATE {};", table))
            .with_context(|| format!("truncating {}", table))?;
        tx.commit().context("committing truncate")?;
        debug!(table = %table, "truncated staging table");
    }

    let mut conn = sink.connect()?;
    let tx = conn.transaction().context("beginning append transaction")?;
    let appended = append_rows(&tx, table, report)?;
    tx.commit().context("committing append")?;

    info!(table = %table, rows = appended, "loaded staging table");
    Ok(appended)
}

/// Create the staging table from the report header if it is missing.
///
/// The date column is `TIMESTAMP`, everything else `VARCHAR`. An existing
/// table is left alone, so a header that no longer matches it fails on append.
fn ensure_staging_table(conn: &Connection, table: &TableName, report: &ReportTable) -> Result<()> {
    let mut ddl = String::new();
    if let Some(schema) = table.quoted_schema() {
        ddl.push_str(&format!("CREATE SCHEMA IF NOT EXISTS {};\n", schema));
    }
    let columns: Vec<String> = report
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let ty = if i == report.date_idx {
                "TIMESTAMP"
            } else {
                "VARCHAR"
            };
            format!("{} {}", quote_ident(h), ty)
        })
        .collect();
    ddl.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        table,
        columns.join(", ")
    ));
    conn.execute_batch(&ddl)
        .with_context(|| format!("creating staging table {}", table))
}

fn append_rows(conn: &Connection, table: &TableName, report: &ReportTable) -> Result<usize> {
    if report.is_empty() {
        return Ok(0);
    }

    let column_list = report
        .headers
        .iter()
        .map(|h| quote_ident(h))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = format!("({})", vec!["?"; report.headers.len()].join(", "));

    let mut total = 0usize;
    for chunk in report.rows.chunks(CHUNK_ROWS) {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            column_list,
            vec![placeholders.as_str(); chunk.len()].join(", ")
        );
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("preparing insert into {}", table))?;

        let mut param_idx = 1usize;
        for row in chunk {
            for (i, cell) in row.cells.iter().enumerate() {
                if i == report.date_idx {
                    let ts = row.report_dt.as_ref().map(format_timestamp);
                    stmt.raw_bind_parameter(param_idx, ts.as_deref())?;
                } else {
                    stmt.raw_bind_parameter(param_idx, cell.as_deref())?;
                }
                param_idx += 1;
            }
        }

        total += stmt
            .raw_execute()
            .with_context(|| format!("inserting into {}", table))?;
    }
    Ok(total)
}

/// Number of rows currently in `table`.
pub fn row_count(conn: &Connection, table: &TableName) -> Result<i64> {
    let n = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
    Ok(n)
}
