// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::blocking::Client;

pub mod reports;
pub mod urls;

pub use reports::download_report;

/// Blocking HTTP client shared by every download in a run.
///
/// No explicit timeout is set; the transport default applies.
pub fn build_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .build()
        .context("building HTTP client")
}
