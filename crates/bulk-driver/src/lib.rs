//! Batch driver for bandfold.
//!
//! Runs many band-structure datasets in parallel from one TOML file. The
//! file must include a `[bulk]` section to be recognized as a batch request;
//! each `[[jobs]]` entry is a complete single-dataset job.
//!
//! - **Thread pool**: jobs run on a rayon pool sized from `bulk.threads` or
//!   the physical core count
//! - **Shared cache**: all jobs use one derived-data cache, so a folder shared
//!   by several jobs is processed once
//! - **Output**: one long-format CSV per job (see [`output`])
//! - **Failure isolation**: a failing job is logged and reported in
//!   [`DriverStats`]; the rest of the batch continues

pub mod config;
pub mod driver;
pub mod output;

pub use config::{BulkConfig, BulkSection, ConfigError, OutputConfig};
pub use driver::{BulkDriver, DriverError, DriverStats, JobError, JobResult};
pub use output::{write_csv, write_plot_file};
