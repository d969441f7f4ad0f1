use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{info, warn};

use bandfold_bulk_driver::{write_csv, BulkConfig, BulkDriver, ConfigError as BulkConfigError};
use bandfold_core::{
    bandstructure::{build_plot, BandPlot, PlotSelection},
    cache::DerivedDataCache,
    dataset::Dataset,
    io::{BandJobConfig, JsonReader},
    projection::OrbitalGroup,
};

#[derive(Parser, Debug)]
#[command(
    name = "bandfold",
    about = "Band-structure reconstruction from simulation dumps"
)]
struct Cli {
    /// Path to a TOML job file (single job, or batch with a [bulk] section)
    #[arg(short, long)]
    config: PathBuf,
    /// CSV output for a single job (defaults to stdout); output directory for a batch
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Thread count for a batch (overrides bulk.threads)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
    /// Replace the job's plot with an orbital-group projection, e.g. "spd"
    #[arg(long)]
    spd: Option<String>,
    /// Plotted energy window, e.g. "-4,4"
    #[arg(long, value_delimiter = ',', num_args = 2, allow_hyphen_values = true)]
    erange: Option<Vec<f64>>,
    /// Do not read or write the derived-data cache
    #[arg(long)]
    no_cache: bool,
    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Warn
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    info!("loading config {}", cli.config.display());
    let raw = fs::read_to_string(&cli.config)?;
    match BulkConfig::from_str(&raw) {
        Ok(config) => run_bulk(&cli, config),
        Err(BulkConfigError::NotBulkConfig) => {
            let job = BandJobConfig::from_str(&raw)?;
            run_single(&cli, job)
        }
        Err(e) => Err(e.into()),
    }
}

fn run_bulk(cli: &Cli, mut config: BulkConfig) -> Result<(), Box<dyn std::error::Error>> {
    if cli.spd.is_some() || cli.erange.is_some() {
        warn!("--spd and --erange apply to single jobs only; ignored for a batch");
    }
    if let Some(dir) = &cli.output {
        config.output.directory = dir.clone();
    }
    config.bulk.no_cache |= cli.no_cache;

    let driver = BulkDriver::new(config, cli.threads).with_progress(!cli.quiet);
    let stats = driver.run()?;
    if stats.failed > 0 {
        return Err(format!("{} of {} jobs failed", stats.failed, stats.total_jobs).into());
    }
    Ok(())
}

fn run_single(cli: &Cli, mut job: BandJobConfig) -> Result<(), Box<dyn std::error::Error>> {
    if cli.threads.is_some() {
        warn!("--threads applies to batch files only; ignored");
    }
    if let Some(spec) = &cli.spd {
        job.plot = PlotSelection::Spd {
            groups: OrbitalGroup::parse_list(spec)?,
        };
    }
    if let Some(range) = &cli.erange {
        job.erange = [range[0], range[1]];
    }
    job.validate()?;

    let cache = if cli.no_cache {
        DerivedDataCache::disabled()
    } else {
        DerivedDataCache::new()
    };
    let reader = JsonReader::new();
    let dataset = Dataset::load(&reader, None, &cache, &job.dataset_options())?;
    let plot = build_plot(&dataset, &job.plot, &job.plot_options())?;

    match &cli.output {
        Some(path) => info!("writing CSV to {}", path.display()),
        None => info!("streaming CSV to stdout"),
    }
    let rows = emit_csv(&plot, cli.output.as_deref())?;
    info!(
        "wrote {} rows ({} bands, {} segments)",
        rows,
        plot.bands.len(),
        plot.segments.len()
    );
    Ok(())
}

fn emit_csv(plot: &BandPlot, dest: Option<&Path>) -> io::Result<usize> {
    let mut writer: Box<dyn Write> = match dest {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    write_csv(plot, &mut writer)
}
