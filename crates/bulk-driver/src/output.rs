//! CSV export of assembled band plots.
//!
//! The format is long: one row per (segment, point, band). Path ticks are
//! written first as `#`-prefixed lines so the table itself stays rectangular.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use bandfold_core::bandstructure::BandPlot;

/// Write `plot` to `writer`. Returns the number of data rows.
pub fn write_csv<W: Write>(plot: &BandPlot, writer: &mut W) -> io::Result<usize> {
    writeln!(writer, "# tick,label,distance,kpoint_index")?;
    for (idx, tick) in plot.ticks.iter().enumerate() {
        writeln!(
            writer,
            "# {idx},{},{},{}",
            tick.label, tick.distance, tick.kpoint_index
        )?;
    }

    let has_spectral = plot.segments.iter().any(|s| s.spectral_weights.is_some());
    let has_spin = plot.segments.iter().any(|s| s.spin_weights.is_some());
    write!(writer, "segment,reversed,point,distance,band,energy")?;
    if has_spectral {
        write!(writer, ",spectral_weight")?;
    }
    if has_spin {
        write!(writer, ",spin_weight")?;
    }
    for label in &plot.legend {
        write!(writer, ",{}", label.replace(',', ";"))?;
    }
    writeln!(writer)?;

    let mut rows = 0;
    for segment in &plot.segments {
        for (point, distance) in segment.distances.iter().enumerate() {
            for (row, &band) in plot.bands.iter().enumerate() {
                write!(
                    writer,
                    "{},{},{point},{distance},{},{}",
                    segment.segment_id,
                    segment.reversed,
                    band + 1,
                    segment.eigenvalues[[row, point]]
                )?;
                if has_spectral {
                    let value = segment.spectral_weights.as_ref().map(|w| w[[row, point]]);
                    write_optional(writer, value)?;
                }
                if has_spin {
                    let value = segment.spin_weights.as_ref().map(|w| w[[row, point]]);
                    write_optional(writer, value)?;
                }
                if let Some(projections) = &segment.projections {
                    for value in projections.slice(ndarray::s![row, point, ..]) {
                        write!(writer, ",{value}")?;
                    }
                }
                writeln!(writer)?;
                rows += 1;
            }
        }
    }
    writer.flush()?;
    Ok(rows)
}

fn write_optional<W: Write>(writer: &mut W, value: Option<f64>) -> io::Result<()> {
    match value {
        Some(v) => write!(writer, ",{v}"),
        None => write!(writer, ","),
    }
}

/// Write `plot` to `path`, creating parent directories as needed.
pub fn write_plot_file(plot: &BandPlot, path: &Path) -> io::Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_csv(plot, &mut writer)
}
