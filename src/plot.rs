//! PNG charts of merged group tables and corpus-wide distributions.

use plotters::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::aggregate::{Analysis, Distribution, Granularity, PositionTable};
use crate::counter::Bucketing;

const GROUP_SIZE: (u32, u32) = (1600, 700);
const TREND_SIZE: (u32, u32) = (900, 500);

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Drawing failed: {0}")]
    Draw(String),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for PlotError {
    fn from(e: DrawingAreaErrorKind<E>) -> Self {
        PlotError::Draw(e.to_string())
    }
}

/// Chart file name for a title: spaces become underscores.
pub fn file_name(title: &str) -> String {
    format!("{}.png", title.replace(' ', "_"))
}

/// Draw every merged group of both levels plus one distribution trend per
/// level. Returns the written paths.
pub fn plot_analysis(analysis: &Analysis, output_dir: &Path) -> Result<Vec<PathBuf>, PlotError> {
    std::fs::create_dir_all(output_dir).map_err(|source| PlotError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for level in Granularity::ALL {
        let level_analysis = analysis.level(level);
        for (group, table) in &level_analysis.groups {
            if table.is_empty() {
                log::debug!("Not plotting empty group {group}");
                continue;
            }
            let title = format!("{group} {level}");
            let path = output_dir.join(file_name(&title));
            plot_group(table, &title, &path)?;
            written.push(path);
        }

        let title = format!("{level} distribution");
        let path = output_dir.join(file_name(&title));
        plot_distribution(&level_analysis.distribution, &title, &path)?;
        written.push(path);
    }

    log::info!("Wrote {} charts to {}", written.len(), output_dir.display());
    Ok(written)
}

/// Grouped bar chart: one cluster per pattern, one bar per position bucket.
pub fn plot_group(table: &PositionTable, title: &str, path: &Path) -> Result<(), PlotError> {
    let scheme = table.scheme();
    let buckets = scheme.bucket_count() as i32;
    let stride = buckets + 1;
    let keys: Vec<&str> = table.rows().map(|(k, _)| k).collect();
    let y_max = table
        .rows()
        .flat_map(|(_, b)| b.iter().copied())
        .max()
        .unwrap_or(0)
        .max(1) as f64;

    let root = BitMapBackend::new(path, GROUP_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(0i32..keys.len() as i32 * stride, 0f64..y_max * 1.1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels((keys.len() as i32 * stride) as usize)
        .x_label_formatter(&|x| {
            if x.rem_euclid(stride) == buckets / 2 {
                keys.get((x / stride) as usize).map(|k| k.to_string()).unwrap_or_default()
            } else {
                String::new()
            }
        })
        .x_desc("Pattern")
        .y_desc("Cumulative occurrences")
        .draw()?;

    for (b, label) in scheme.labels().iter().enumerate() {
        let color = Palette99::pick(b).mix(0.9);
        let bars = table.rows().enumerate().map(move |(i, (_, counts))| {
            let x = i as i32 * stride + b as i32;
            Rectangle::new([(x, 0.0), (x + 1, counts[b] as f64)], color.filled())
        });
        chart
            .draw_series(bars)?
            .label(*label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Line chart of the summed normalized shares per bucket.
pub fn plot_distribution(dist: &Distribution, title: &str, path: &Path) -> Result<(), PlotError> {
    let labels = dist.scheme.labels();
    let points: Vec<(i32, f64)> = dist
        .totals
        .iter()
        .enumerate()
        .map(|(i, t)| (i as i32, *t))
        .collect();
    let y_max = dist.totals.iter().copied().fold(0.0, f64::max).max(1e-6);

    let root = BitMapBackend::new(path, TREND_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(-1i32..labels.len() as i32, 0f64..y_max * 1.1)?;

    chart
        .configure_mesh()
        .x_labels(labels.len() + 2)
        .x_label_formatter(&|x| labels.get(*x as usize).map(|l| l.to_string()).unwrap_or_default())
        .y_desc(format!("Sum of normalized rows ({} rows)", dist.rows_used))
        .draw()?;

    chart.draw_series(LineSeries::new(points.iter().copied(), &BLUE))?;
    chart.draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 4, BLUE.filled())))?;
    root.present()?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}
