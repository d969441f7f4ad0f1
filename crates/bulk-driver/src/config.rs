//! Configuration types for batch runs over many datasets.
//!
//! A batch file is an ordinary TOML document with a `[bulk]` section and one
//! `[[jobs]]` table per dataset. Each job table has exactly the shape of a
//! single-job [`BandJobConfig`] file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use bandfold_core::io::BandJobConfig;

// ============================================================================
// Sections
// ============================================================================

/// Execution settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkSection {
    /// Number of threads to use (default: physical core count)
    #[serde(default)]
    pub threads: Option<usize>,

    /// Disable the on-disk derived-data cache for this batch
    #[serde(default)]
    pub no_cache: bool,
}

/// Output configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one CSV file per job
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    /// Prefix for output filenames
    #[serde(default)]
    pub prefix: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("bands_out")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            prefix: String::new(),
        }
    }
}

impl OutputConfig {
    /// Destination file for a job.
    pub fn file_for(&self, job: &BandJobConfig) -> PathBuf {
        self.directory
            .join(format!("{}{}.csv", self.prefix, job.display_name()))
    }
}

// ============================================================================
// Complete Bulk Configuration
// ============================================================================

/// Complete configuration for a batch run.
///
/// A TOML file is recognized as a bulk request if it contains the `[bulk]` section.
///
/// ```toml
/// [bulk]
/// threads = 4
///
/// [output]
/// directory = "plots"
///
/// [[jobs]]
/// folder = "runs/GaAs"
///
/// [[jobs]]
/// folder = "runs/GaAs-soc"
/// soc_axis = "z"
/// [jobs.plot]
/// kind = "spd"
/// groups = ["s", "p"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    pub bulk: BulkSection,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub jobs: Vec<BandJobConfig>,
}

impl BulkConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let document: toml::Table = toml::from_str(content)?;
        if !document.contains_key("bulk") {
            return Err(ConfigError::NotBulkConfig);
        }
        let config: BulkConfig = document.try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bulk.threads == Some(0) {
            return Err(ConfigError::InvalidThreads);
        }
        if self.output.directory.as_os_str().is_empty() {
            return Err(ConfigError::InvalidOutput(
                "output.directory must not be empty".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for (index, job) in self.jobs.iter().enumerate() {
            job.validate()
                .map_err(|source| ConfigError::Job { index, source })?;
            let name = job.display_name();
            if !names.insert(name.clone()) {
                return Err(ConfigError::InvalidOutput(format!(
                    "two jobs write to '{}'; set distinct `name` fields",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn effective_threads(&self) -> usize {
        self.bulk.threads.unwrap_or_else(num_cpus::get_physical)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("not a bulk configuration (missing [bulk] section)")]
    NotBulkConfig,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("bulk.threads must be at least 1")]
    InvalidThreads,

    #[error("invalid output configuration: {0}")]
    InvalidOutput(String),

    #[error("job {index}: {source}")]
    Job {
        index: usize,
        #[source]
        source: bandfold_core::ConfigError,
    },
}
