use anyhow::{Context, Result};
use reqwest::{blocking::Client, StatusCode};
use std::{fs, path::Path};
use tracing::{error, info};
use url::Url;

use super::urls::report_url;
use crate::archive::{ReportNaming, StagedReport};

/// Download one year's power status report into `staging_path`.
///
/// Returns `Ok(None)` when the server answers with anything but 200; nothing
/// is written in that case. Transport and disk failures are errors.
pub fn download_report(
    client: &Client,
    base: &Url,
    naming: &ReportNaming,
    staging_path: &Path,
    year: i32,
) -> Result<Option<StagedReport>> {
    let url = report_url(base, year)?;
    let resp = client
        .get(url.clone())
        .send()
        .with_context(|| format!("GET {}", url))?;

    if resp.status() != StatusCode::OK {
        error!(%url, status = %resp.status(), "error downloading report");
        return Ok(None);
    }

    let bytes = resp
        .bytes()
        .with_context(|| format!("reading body from {}", url))?;
    let path = staging_path.join(naming.file_name(year));
    fs::write(&path, &bytes).with_context(|| format!("writing {:?}", path))?;
    info!(%url, path = %path.display(), bytes = bytes.len(), "downloaded report");

    Ok(Some(StagedReport { year, path }))
}
