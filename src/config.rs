// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::process::ReportLayout;

const DEFAULT_BASE_URL: &str =
    "https://www.nrc.gov/reading-rm/doc-collections/event-status/reactor-status/";

/// Runtime settings for one collect + process run.
///
/// Every field has a default so an empty (or absent) YAML file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub base_dir: PathBuf,
    pub filename_prefix: String,
    pub file_ext: String,
    /// Defaults to `<base_dir>/nrc.duckdb` when unset.
    pub database_path: Option<PathBuf>,
    pub staging_table: String,
    pub target_table: String,
    pub procedure: ProcedureConfig,
    pub layout: ReportLayout,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcedureConfig {
    pub name: String,
    /// Custom SQL batch run instead of the built-in merge.
    pub sql: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            base_dir: PathBuf::from("data/nrc"),
            filename_prefix: "NRCReactorStatus".to_string(),
            file_ext: "txt".to_string(),
            database_path: None,
            staging_table: "main.nrc_reactor_status_stg".to_string(),
            target_table: "main.nrc_reactor_status".to_string(),
            procedure: ProcedureConfig::default(),
            layout: ReportLayout::default(),
            user_agent: concat!("nrcscraper/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for ProcedureConfig {
    fn default() -> Self {
        Self {
            name: "nrc_reactor_status_stg_upload".to_string(),
            sql: None,
        }
    }
}

impl Config {
    /// Load from a YAML file, or fall back to defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // serde_yaml rejects an empty document for a struct, treat it as "all defaults"
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("nrc.duckdb"))
    }
}
