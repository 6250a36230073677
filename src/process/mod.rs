// src/process/mod.rs
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use std::{borrow::Cow, collections::HashMap, fs, path::Path};
use tracing::{debug, warn};

pub mod date_parser;
pub mod trimming;

use date_parser::parse_report_datetime;
use trimming::record_cells;

/// Which header columns carry the report date and the unit identifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReportLayout {
    pub date_column: String,
    pub unit_column: String,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            date_column: "ReportDt".to_string(),
            unit_column: "Unit".to_string(),
        }
    }
}

/// One data line of a power status report, aligned to the header.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    /// Cleaned cells, one per header column; `None` for blank cells.
    pub cells: Vec<Option<String>>,
    /// Parsed value of the date column.
    pub report_dt: Option<NaiveDateTime>,
}

/// A parsed report file: header plus deduplicated rows in file order.
#[derive(Debug, Clone)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<ReportRow>,
    /// Index of the date column inside `headers`.
    pub date_idx: usize,
    /// Index of the unit column inside `headers`.
    pub unit_idx: usize,
}

impl ReportTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell value by column name, for the given row.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h == column)?;
        self.rows.get(row)?.cells.get(idx)?.as_deref()
    }

    pub fn unit(&self, row: usize) -> Option<&str> {
        self.rows.get(row)?.cells.get(self.unit_idx)?.as_deref()
    }
}

/// Read and parse a staged report file.
#[tracing::instrument(level = "info", skip(path, layout), fields(path = %path.as_ref().display()))]
pub fn parse_report<P: AsRef<Path>>(path: P, layout: &ReportLayout) -> Result<ReportTable> {
    let path = path.as_ref();
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read report file: {:?}", path))?;
    let text = String::from_utf8_lossy(&bytes);
    if let Cow::Owned(_) = text {
        warn!("report is not valid UTF-8, invalid bytes replaced");
    }
    let table = parse_report_str(&text, layout)
        .with_context(|| format!("Failed to parse report file: {:?}", path))?;
    debug!(rows = table.len(), "parsed report");
    Ok(table)
}

/// Parse report text already loaded in memory.
///
/// The first line is the header. Quotes carry no meaning. Cells are trimmed
/// and blanks become `None`, all-blank rows are dropped, and rows sharing a
/// (date, unit) pair collapse to the last one in file order.
pub fn parse_report_str(text: &str, layout: &ReportLayout) -> Result<ReportTable> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .quoting(false)
        .from_reader(text.as_bytes());

    let header_record = rdr.headers().context("reading header line")?.clone();
    let headers = header_names(&header_record)?;
    let date_idx = column_index(&headers, &layout.date_column)?;
    let unit_idx = column_index(&headers, &layout.unit_column)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.context("reading report row")?;
        let line_no = record.position().map_or(0, |p| p.line());
        let mut cells = record_cells(&record);
        if cells.len() > headers.len() {
            // a trailing delimiter on the header allows one blank trailing field
            if cells.len() > header_record.len()
                || cells[headers.len()..].iter().any(Option::is_some)
            {
                bail!(
                    "line {} has {} fields but the header has {}",
                    line_no,
                    cells.len(),
                    headers.len()
                );
            }
            cells.truncate(headers.len());
        }
        cells.resize(headers.len(), None);

        if cells.iter().all(Option::is_none) {
            continue;
        }

        let report_dt = match cells[date_idx].as_deref() {
            Some(raw) => Some(parse_report_datetime(raw).ok_or_else(|| {
                anyhow!(
                    "line {}: cannot parse {} value {:?}",
                    line_no,
                    layout.date_column,
                    raw
                )
            })?),
            None => {
                warn!(line = line_no, "row without {}", layout.date_column);
                None
            }
        };

        rows.push(ReportRow { cells, report_dt });
    }

    let rows = keep_last_per_key(rows, unit_idx);
    Ok(ReportTable {
        headers,
        rows,
        date_idx,
        unit_idx,
    })
}

/// Column names of the header record. A single trailing delimiter is
/// dropped; any other unnamed column is an error.
fn header_names(record: &StringRecord) -> Result<Vec<String>> {
    let mut names: Vec<String> = record.iter().map(str::to_string).collect();
    if names.len() > 1 && names.last().is_some_and(|n| n.is_empty()) {
        names.pop();
    }
    if names.iter().all(|n| n.is_empty()) {
        bail!("report has no header line");
    }
    if let Some(pos) = names.iter().position(|n| n.is_empty()) {
        bail!("header column {} has no name in {:?}", pos + 1, names);
    }
    Ok(names)
}

fn column_index(headers: &[String], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| anyhow!("missing {} column in header {:?}", name, headers))
}

/// Drop every row that a later row with the same (date, unit) supersedes.
fn keep_last_per_key(rows: Vec<ReportRow>, unit_idx: usize) -> Vec<ReportRow> {
    let mut last_seen: HashMap<(Option<NaiveDateTime>, Option<String>), usize> =
        HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        last_seen.insert((row.report_dt, row.cells[unit_idx].clone()), i);
    }

    let before = rows.len();
    let kept: Vec<ReportRow> = rows
        .into_iter()
        .enumerate()
        .filter(|(i, row)| {
            last_seen.get(&(row.report_dt, row.cells[unit_idx].clone())) == Some(i)
        })
        .map(|(_, row)| row)
        .collect();

    if kept.len() < before {
        debug!(
            dropped = before - kept.len(),
            "removed duplicate (date, unit) rows"
        );
    }
    kept
}
