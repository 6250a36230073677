pub mod archive;
pub mod backfill;
pub mod config;
pub mod duck;
pub mod fetch;
pub mod pipeline;
pub mod process;
