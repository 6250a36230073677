use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use nrcscraper::{backfill::BackfillRange, config::Config, pipeline::Collector};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Parser, Debug)]
#[command(
    name = "nrcscraper",
    version,
    about = "Download NRC reactor power status reports and load them into DuckDB"
)]
struct Cli {
    /// First day of the backfill (YYYY-MM-DD), defaults to today
    #[arg(short = 'f', long, alias = "backfillFrom", value_parser = parse_date)]
    backfill_from: Option<NaiveDate>,

    /// Last day of the backfill (YYYY-MM-DD), defaults to today
    #[arg(short = 't', long, alias = "backfillTo", value_parser = parse_date)]
    backfill_to: Option<NaiveDate>,

    /// Years the cursor moves per fetch; negative walks backwards
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    step_years: i32,

    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the base directory holding staging/, error/ and yearly archives
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| format!("expected {DATE_FORMAT}: {e}"))
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cli = Cli::parse();

    // ─── 2) configuration ────────────────────────────────────────────
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.base_dir {
        config.base_dir = dir;
    }

    let today = Local::now().date_naive();
    let range = BackfillRange::new(
        cli.backfill_from.unwrap_or(today),
        cli.backfill_to.unwrap_or(today),
        cli.step_years,
    )?;
    let collector = Collector::from_config(&config).context("setting up collector")?;
    info!(
        from = %range.cursor(),
        to = %range.until(),
        step_years = range.step_years(),
        base_dir = %config.base_dir.display(),
        db = %collector.sink().path().display(),
        "startup"
    );

    // ─── 3) collect, then process staging ────────────────────────────
    collector.collect(range)?;
    collector.process()?;

    info!("all done");
    Ok(())
}
