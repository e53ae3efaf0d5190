//! Visualization tools for sensor channels.
//!
//! This module provides functions to render channel traces with detected
//! peaks marked, either one channel per image or all column groups stacked
//! in a single grid, using the plotters library.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::processors::grouping::SensorGroup;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty channel")]
    EmptyChannel,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1920;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1080;

/// Trace color (steel blue).
const TRACE_COLOR: (u8, u8, u8) = (55, 126, 184);

/// Peak marker color (red).
const PEAK_COLOR: (u8, u8, u8) = (228, 26, 28);

/// Plot a channel trace against sample index with peaks marked, saved as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `values` - Channel samples in acquisition order
/// * `peak_indices` - Sample indices to mark with circles
/// * `_title` - Title for the plot (unused - no fonts on WSL)
pub fn plot_channel(
    output_path: &Path,
    values: &[f64],
    peak_indices: &[usize],
    _title: &str,
) -> Result<()> {
    if values.is_empty() {
        return Err(VisualizationError::EmptyChannel);
    }

    let root =
        BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    draw_trace(&root, values, peak_indices)?;

    root.present()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Plot every group's primary channel in one vertically stacked grid.
///
/// Panels share the image top to bottom in group order; each panel shows the
/// group's trace with its peaks marked. Useful for eyeballing whether the
/// calibration window really holds one response per group.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `groups` - Column groups in schema order
/// * `peaks_per_group` - Peak indices aligned with `groups`
/// * `_title` - Title for the plot (unused - no fonts on WSL)
pub fn plot_group_grid(
    output_path: &Path,
    groups: &[SensorGroup],
    peaks_per_group: &[Vec<usize>],
    _title: &str,
) -> Result<()> {
    if groups.is_empty() || groups.iter().all(|g| g.is_empty()) {
        return Err(VisualizationError::EmptyChannel);
    }

    let root =
        BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let panels = root.split_evenly((groups.len(), 1));
    let empty: Vec<usize> = Vec::new();

    for (i, (panel, group)) in panels.iter().zip(groups.iter()).enumerate() {
        if group.is_empty() {
            continue;
        }
        let peaks = peaks_per_group.get(i).unwrap_or(&empty);
        draw_trace(panel, &group.primary, peaks)?;
    }

    root.present()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

fn draw_trace<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    values: &[f64],
    peak_indices: &[usize],
) -> Result<()> {
    let (y_min, y_max) = value_bounds(values);
    let y_padding = (y_max - y_min) * 0.05;

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .build_cartesian_2d(
            0.0..(values.len().max(2) - 1) as f64,
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let trace = RGBColor(TRACE_COLOR.0, TRACE_COLOR.1, TRACE_COLOR.2);
    chart
        .draw_series(LineSeries::new(
            values.iter().enumerate().map(|(i, v)| (i as f64, *v)),
            &trace,
        ))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let marker = RGBColor(PEAK_COLOR.0, PEAK_COLOR.1, PEAK_COLOR.2);
    chart
        .draw_series(
            peak_indices
                .iter()
                .filter(|&&idx| idx < values.len())
                .map(|&idx| Circle::new((idx as f64, values[idx]), 5, marker.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Compute the value bounds, widened when the trace is flat.
fn value_bounds(values: &[f64]) -> (f64, f64) {
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for v in values {
        if *v < y_min { y_min = *v; }
        if *v > y_max { y_max = *v; }
    }

    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (y_min, y_max)
}
