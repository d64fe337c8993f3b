/**
 * Chart rendering
 *
 * One 2x2 PNG per batch (a chart per array of the shape) and one summary
 * PNG overlaying the primary series of every stored entry. Finished files
 * are optionally handed to an external viewer that is not waited on.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, Local};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::{FontStyle, Palette};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::batch::{ChartSpec, MeasurementBatch};
use crate::persist::{ensure_dir, file_stamp, session_file_name, PersistError};
use crate::session::SessionEntry;

pub const FONT_FAMILY: &str = "sans-serif";

const SERIES_COLORS: [RGBColor; 4] = [BLUE, RED, GREEN, MAGENTA];

//dash length and gap of the overall-figure line, in pixels
const REFERENCE_DASH: (u32, u32) = (8, 6);

#[derive(Debug, Error)]
pub enum PlotError {
    #[error(transparent)]
    Output(#[from] PersistError),

    #[error("failed to draw {}: {message}", .path.display())]
    Draw { path: PathBuf, message: String },
}

#[derive(Debug, Clone)]
pub struct PlotSettings {
    /// Program launched with the PNG path after each render.
    pub viewer: Option<String>,
    /// TrueType candidates; the first readable one is used for all text.
    pub font_paths: Vec<PathBuf>,
    pub batch_size: (u32, u32),
    pub summary_size: (u32, u32),
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            viewer: None,
            font_paths: Vec::new(),
            batch_size: (1400, 1000),
            summary_size: (1400, 800),
        }
    }
}

pub struct Plotter {
    settings: PlotSettings,
    labels: bool,
}

impl Plotter {
    pub fn new(settings: PlotSettings) -> Self {
        let labels = settings.font_paths.iter().any(|p| load_font(p));
        if !labels {
            warn!("no chart font available, charts will carry no text");
        }
        Self { settings, labels }
    }

    pub fn has_labels(&self) -> bool {
        self.labels
    }

    pub fn render_batch(&self, batch: &MeasurementBatch, dir: &Path, at: &DateTime<Local>) -> Result<PathBuf, PlotError> {
        ensure_dir(dir)?;
        let prefix = batch.shape().file_prefix();
        let path = dir.join(session_file_name(Some(prefix), &batch.session_id, at, "png"));

        self.draw_batch(&path, batch).map_err(|message| PlotError::Draw {
            path: path.clone(),
            message,
        })?;
        info!(path = %path.display(), session = %batch.session_id, "batch chart saved");

        self.show(&path);
        Ok(path)
    }

    /// Returns `Ok(None)` when there is nothing stored yet.
    pub fn render_summary(&self, entries: &[SessionEntry], dir: &Path, at: &DateTime<Local>) -> Result<Option<PathBuf>, PlotError> {
        if entries.is_empty() {
            return Ok(None);
        }
        ensure_dir(dir)?;
        let path = dir.join(format!("summary_{}.png", file_stamp(at)));

        self.draw_summary(&path, entries).map_err(|message| PlotError::Draw {
            path: path.clone(),
            message,
        })?;
        info!(path = %path.display(), series = entries.len(), "summary chart saved");

        self.show(&path);
        Ok(Some(path))
    }

    fn draw_batch(&self, path: &Path, batch: &MeasurementBatch) -> Result<(), String> {
        let root = BitMapBackend::new(path, self.settings.batch_size).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let root = if self.labels {
            let title = format!(
                "Session {}: {} ({} groups)",
                batch.session_id,
                batch.shape().label(),
                batch.groups()
            );
            root.titled(&title, (FONT_FAMILY, 26)).map_err(draw_err)?
        } else {
            root
        };

        let areas = root.split_evenly((2, 2));
        for ((area, spec), color) in areas.iter().zip(batch.shape().charts()).zip(SERIES_COLORS) {
            let values = batch.series.column(spec.key);
            let reference = batch.overall(spec.block, spec.kind);
            draw_group_chart(area, spec, values, reference, color, self.labels)?;
        }

        root.present().map_err(draw_err)
    }

    fn draw_summary(&self, path: &Path, entries: &[SessionEntry]) -> Result<(), String> {
        let root = BitMapBackend::new(path, self.settings.summary_size).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let series = summary_series(entries);
        let x_end = series.iter().map(|(_, pts)| pts.len()).max().unwrap_or(1).max(1) as f64 + 0.5;
        let (y_lo, y_hi) = value_range(series.iter().flat_map(|(_, pts)| pts.iter().map(|p| p.1)));

        let mut builder = ChartBuilder::on(&root);
        builder.margin(15);
        if self.labels {
            builder
                .caption("Primary series across sessions", (FONT_FAMILY, 24))
                .x_label_area_size(40)
                .y_label_area_size(60);
        }
        let mut chart = builder
            .build_cartesian_2d(0.5f64..x_end, y_lo..y_hi)
            .map_err(draw_err)?;

        if self.labels {
            chart
                .configure_mesh()
                .x_desc("Group")
                .y_desc("Time (us)")
                .draw()
                .map_err(draw_err)?;
        }

        for (i, (name, points)) in series.iter().enumerate() {
            let color = Palette99::pick(i).to_rgba();
            let anno = chart
                .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
                .map_err(draw_err)?;
            if self.labels {
                anno.label(name.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
            }
            chart
                .draw_series(points.iter().map(|&p| Circle::new(p, 3, color.filled())))
                .map_err(draw_err)?;
        }

        if self.labels {
            chart
                .configure_series_labels()
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(draw_err)?;
        }

        root.present().map_err(draw_err)
    }

    //fire and forget, the loop must not wait on a window
    fn show(&self, path: &Path) {
        let Some(viewer) = self.settings.viewer.as_deref() else {
            return;
        };
        match Command::new(viewer)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => debug!(viewer, pid = child.id(), "viewer started"),
            Err(e) => warn!(viewer, error = %e, "could not start viewer"),
        }
    }
}

fn draw_err<E: std::fmt::Display>(e: E) -> String {
    e.to_string()
}

fn load_font(path: &Path) -> bool {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    // plotters keeps registered fonts for the life of the process
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    match plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
        Ok(()) => {
            debug!(path = %path.display(), "chart font loaded");
            true
        }
        Err(_) => {
            warn!(path = %path.display(), "font data rejected");
            false
        }
    }
}

fn draw_group_chart(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    spec: &ChartSpec,
    values: Option<&[f64]>,
    reference: Option<f64>,
    color: RGBColor,
    labels: bool,
) -> Result<(), String> {
    let values = values.unwrap_or(&[]);
    let x_end = values.len().max(1) as f64 + 0.5;
    let (y_lo, y_hi) = value_range(values.iter().copied().chain(reference));

    let mut builder = ChartBuilder::on(area);
    builder.margin(12);
    if labels {
        builder
            .caption(spec.title, (FONT_FAMILY, 20))
            .x_label_area_size(35)
            .y_label_area_size(55);
    }
    let mut chart = builder
        .build_cartesian_2d(0.5f64..x_end, y_lo..y_hi)
        .map_err(draw_err)?;

    if labels {
        chart
            .configure_mesh()
            .x_desc("Group")
            .y_desc("Time (us)")
            .draw()
            .map_err(draw_err)?;
    }

    let points = group_points(values);
    chart
        .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
        .map_err(draw_err)?;
    chart
        .draw_series(points.iter().map(|&p| Circle::new(p, 4, color.filled())))
        .map_err(draw_err)?;

    if let Some(level) = reference {
        chart
            .draw_series(DashedLineSeries::new(
                vec![(0.5, level), (x_end, level)],
                REFERENCE_DASH.0,
                REFERENCE_DASH.1,
                BLACK.mix(0.5).stroke_width(1),
            ))
            .map_err(draw_err)?;
    }
    Ok(())
}

/// Groups are numbered from 1 on the x axis.
fn group_points(values: &[f64]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| ((i + 1) as f64, *v))
        .collect()
}

/// One named series per entry, duplicates of a session id included.
pub fn summary_series(entries: &[SessionEntry]) -> Vec<(String, Vec<(f64, f64)>)> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let shape = entry.batch.shape();
            let name = format!(
                "#{} session {} ({})",
                i + 1,
                entry.session_id(),
                shape.primary_key().unwrap_or(shape.label())
            );
            (name, group_points(entry.batch.series.primary()))
        })
        .collect()
}

/// Padded y range over the finite values, `0..1` when there are none.
fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.1).max(hi.abs() * 0.05).max(1e-3);
    (lo - pad, hi + pad)
}
