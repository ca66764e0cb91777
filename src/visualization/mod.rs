//! Histogram plots for regrouping reports.
//!
//! Two plots are produced with the plotters library: the distribution of
//! particles per new exposure group, and for the time finder, the
//! distribution of gaps between consecutive exposures.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::processors::summary::Histogram;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty histogram")]
    EmptyHistogram,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
pub const DEFAULT_WIDTH: u32 = 1280;

/// Default plot height in pixels.
pub const DEFAULT_HEIGHT: u32 = 960;

const BAR_COLOR: RGBColor = RGBColor(31, 119, 180);

/// Labels and size of a histogram plot.
#[derive(Debug, Clone)]
pub struct HistogramPlot<'a> {
    pub caption: &'a str,
    pub x_desc: &'a str,
    pub y_desc: &'a str,
    pub width: u32,
    pub height: u32,
}

impl<'a> HistogramPlot<'a> {
    pub fn new(caption: &'a str, x_desc: &'a str) -> Self {
        Self {
            caption,
            x_desc,
            y_desc: "Frequency",
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Draw a bar histogram and save it as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `hist` - Binned data, see [`crate::processors::summary::histogram`]
/// * `plot` - Caption, axis descriptions and pixel size
pub fn plot_histogram(output_path: &Path, hist: &Histogram, plot: &HistogramPlot) -> Result<()> {
    if hist.is_empty() || hist.edges.len() != hist.counts.len() + 1 {
        return Err(VisualizationError::EmptyHistogram);
    }

    let x_min = hist.edges[0];
    let x_max = hist.edges[hist.edges.len() - 1];
    let y_max = (hist.max_count() as f64 * 1.05).max(1.0);

    let root = BitMapBackend::new(output_path, (plot.width, plot.height)).into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(plot.caption, ("sans-serif", 24))
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, 0.0..y_max)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(plot.x_desc)
        .y_desc(plot.y_desc)
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(hist.counts.iter().enumerate().map(|(i, &count)| {
            Rectangle::new(
                [(hist.edges[i], 0.0), (hist.edges[i + 1], count as f64)],
                BAR_COLOR.filled(),
            )
        }))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}
