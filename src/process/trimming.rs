use csv::StringRecord;

/// Trim a raw cell; empty or whitespace-only cells become `None`.
pub fn clean_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Cleaned cells of one pipe-delimited record.
pub fn record_cells(record: &StringRecord) -> Vec<Option<String>> {
    record.iter().map(clean_cell).collect()
}
