// src/fetch/urls.rs
use anyhow::{Context, Result};
use url::Url;

/// Parse the report root, making sure it ends in `/` so joins append to it.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).with_context(|| format!("parsing base URL {}", raw))
}

/// `<base><year>/<year>powerstatus.txt`
pub fn report_url(base: &Url, year: i32) -> Result<Url> {
    base.join(&format!("{year}/{year}powerstatus.txt"))
        .with_context(|| format!("building report URL for {}", year))
}
