//! Parallel execution of batch jobs.
//!
//! Every job loads its dataset, assembles the plot and writes one CSV file.
//! Jobs share one [`DerivedDataCache`] and one reader, so a folder referenced
//! by several jobs is parsed once and its derived arrays are written once.
//! The reader releases a folder when the last job using it finishes.
//! A failing job is recorded and logged; the others keep running.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;

use bandfold_core::bandstructure::build_plot;
use bandfold_core::cache::DerivedDataCache;
use bandfold_core::dataset::Dataset;
use bandfold_core::io::{BandJobConfig, JsonReader};
use bandfold_core::reader::{Reader, Unfolder};

use crate::config::BulkConfig;
use crate::output::write_plot_file;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

// ============================================================================
// Job Results
// ============================================================================

/// Result of a single job execution.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Position in the `[[jobs]]` list
    pub index: usize,
    pub name: String,
    pub output: PathBuf,
    /// Data rows written
    pub rows: usize,
    pub duration: Duration,
}

/// Error from a failed job.
#[derive(Debug, Clone)]
pub struct JobError {
    pub index: usize,
    pub name: String,
    pub message: String,
}

/// Summary of a batch run.
#[derive(Debug, Default)]
pub struct DriverStats {
    pub total_jobs: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_time: Duration,
    /// Sorted by job index
    pub results: Vec<JobResult>,
    /// Sorted by job index
    pub errors: Vec<JobError>,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to build thread pool: {0}")]
    ThreadPoolError(String),

    #[error("progress bar setup failed: {0}")]
    ProgressError(String),
}

// ============================================================================
// Bulk Driver
// ============================================================================

pub struct BulkDriver {
    config: BulkConfig,
    threads: usize,
    cache: DerivedDataCache,
    unfolder: Option<Arc<dyn Unfolder>>,
    show_progress: bool,
}

impl BulkDriver {
    /// `requested_threads` overrides `bulk.threads` from the file.
    pub fn new(config: BulkConfig, requested_threads: Option<usize>) -> Self {
        let threads = requested_threads
            .filter(|&n| n > 0)
            .unwrap_or_else(|| config.effective_threads());
        let cache = if config.bulk.no_cache {
            DerivedDataCache::disabled()
        } else {
            DerivedDataCache::new()
        };
        Self {
            config,
            threads,
            cache,
            unfolder: None,
            show_progress: true,
        }
    }

    /// Unfolder for jobs with an `[unfold]` table and no cached result.
    pub fn with_unfolder(mut self, unfolder: Arc<dyn Unfolder>) -> Self {
        self.unfolder = Some(unfolder);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn job_count(&self) -> usize {
        self.config.jobs.len()
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Execute all jobs against `bands.json` dumps.
    pub fn run(&self) -> Result<DriverStats, DriverError> {
        self.run_with_reader(&JsonReader::new())
    }

    /// Execute all jobs with a caller-supplied reader.
    pub fn run_with_reader(&self, reader: &dyn Reader) -> Result<DriverStats, DriverError> {
        let jobs = &self.config.jobs;
        if jobs.is_empty() {
            warn!("no jobs to execute (the configuration has no [[jobs]] entries)");
            return Ok(DriverStats::default());
        }
        info!(
            "running {} job(s) on {} thread(s), writing to {}",
            jobs.len(),
            self.threads,
            self.config.output.directory.display()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| DriverError::ThreadPoolError(e.to_string()))?;

        let pending = pending_folders(jobs);
        let completed = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(jobs.len()));
        let errors = Mutex::new(Vec::new());

        let pb = if self.show_progress {
            ProgressBar::new(jobs.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)
                .map_err(|e| DriverError::ProgressError(e.to_string()))?
                .progress_chars("█▓░"),
        );

        let start_time = Instant::now();
        pool.install(|| {
            jobs.par_iter().enumerate().for_each(|(index, job)| {
                match self.execute_job(reader, index, job) {
                    Ok(result) => {
                        debug!(
                            "job {} ({}) wrote {} rows in {:.2}s",
                            index,
                            result.name,
                            result.rows,
                            result.duration.as_secs_f64()
                        );
                        completed.fetch_add(1, Ordering::Relaxed);
                        results.lock().push(result);
                    }
                    Err(e) => {
                        error!("job {} ({}) failed: {}", e.index, e.name, e.message);
                        errors.lock().push(e);
                    }
                }
                for folder in job_folders(job) {
                    let last = pending
                        .get(folder)
                        .map_or(false, |count| count.fetch_sub(1, Ordering::AcqRel) == 1);
                    if last {
                        reader.release(folder);
                    }
                }
                pb.inc(1);
            });
        });
        pb.finish_and_clear();

        let total_time = start_time.elapsed();
        let mut results = results.into_inner();
        let mut errors = errors.into_inner();
        results.sort_by_key(|r| r.index);
        errors.sort_by_key(|e| e.index);

        let completed = completed.load(Ordering::Relaxed);
        if errors.is_empty() {
            info!(
                "{} jobs completed in {:.2}s",
                completed,
                total_time.as_secs_f64()
            );
        } else {
            warn!(
                "{}/{} jobs completed, {} failed in {:.2}s",
                completed,
                jobs.len(),
                errors.len(),
                total_time.as_secs_f64()
            );
        }

        Ok(DriverStats {
            total_jobs: jobs.len(),
            completed,
            failed: errors.len(),
            total_time,
            results,
            errors,
        })
    }

    fn execute_job(
        &self,
        reader: &dyn Reader,
        index: usize,
        job: &BandJobConfig,
    ) -> Result<JobResult, JobError> {
        let start = Instant::now();
        let name = job.display_name();
        let fail = |message: String| JobError {
            index,
            name: name.clone(),
            message,
        };

        let dataset = Dataset::load(
            reader,
            self.unfolder.as_deref(),
            &self.cache,
            &job.dataset_options(),
        )
        .map_err(|e| fail(e.to_string()))?;
        let plot = build_plot(&dataset, &job.plot, &job.plot_options())
            .map_err(|e| fail(e.to_string()))?;

        let output = self.config.output.file_for(job);
        let rows = write_plot_file(&plot, &output)
            .map_err(|e| fail(format!("output write error: {}", e)))?;

        Ok(JobResult {
            index,
            name: name.clone(),
            output,
            rows,
            duration: start.elapsed(),
        })
    }
}

/// Dataset folders a job reads from.
fn job_folders(job: &BandJobConfig) -> impl Iterator<Item = &Path> {
    std::iter::once(job.folder.as_path()).chain(job.efermi_folder.as_deref())
}

/// Outstanding job count per folder, so the reader can drop a folder as
/// soon as its last job finishes.
fn pending_folders(jobs: &[BandJobConfig]) -> HashMap<&Path, AtomicUsize> {
    let mut pending: HashMap<&Path, AtomicUsize> = HashMap::new();
    for job in jobs {
        for folder in job_folders(job) {
            *pending.entry(folder).or_default().get_mut() += 1;
        }
    }
    pending
}
