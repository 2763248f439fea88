//! Chart preparation and rasterization.
//!
//! Preparation (ordering points into parallel axis vectors) is the part with
//! correctness requirements; rasterization is behind [`ChartRenderer`] so the
//! assembler can be tested without producing pixels.

use crate::error::ReportError;
use crate::model::TimeSeriesPoint;
use plotters::prelude::*;
use printpdf::image_crate::{codecs::png::PngEncoder, ColorType, ImageEncoder};

// Fixed styling; not request-driven.
pub const CHART_WIDTH_PX: u32 = 800;
pub const CHART_HEIGHT_PX: u32 = 400;
const CHART_MARGIN_PX: u32 = 12;
const STROKE_WIDTH: u32 = 2;

/// One metric's numeric chart data: equal-length timestamp/value vectors,
/// stable-sorted ascending by timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartSeries {
    pub timestamps_ms: Vec<i64>,
    pub values: Vec<f64>,
}

impl ChartSeries {
    pub fn from_points(points: &[TimeSeriesPoint]) -> Self {
        let mut pairs: Vec<(i64, f64)> = points
            .iter()
            .map(|p| (p.timestamp_ms, p.value))
            .collect();
        // Vec::sort_by_key is stable, so equal timestamps keep their
        // original relative order.
        pairs.sort_by_key(|(ts, _)| *ts);

        Self {
            timestamps_ms: pairs.iter().map(|(ts, _)| *ts).collect(),
            values: pairs.iter().map(|(_, v)| *v).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_ms.is_empty()
    }
}

/// Stable in-place ordering for full points, used for the detail tables so
/// rows and chart agree on order.
pub fn sort_points(points: &mut [TimeSeriesPoint]) {
    points.sort_by_key(|p| p.timestamp_ms);
}

/// External rasterizer seam. Failure for one series degrades only that
/// series' detail page.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, key: &str, series: &ChartSeries) -> Result<Vec<u8>, ReportError>;
}

/// Line-chart PNG rasterizer. Axes are drawn without tick labels; the
/// surrounding document carries the metric name and units.
#[derive(Clone, Debug, Default)]
pub struct PlottersChartRenderer;

impl ChartRenderer for PlottersChartRenderer {
    fn render(&self, key: &str, series: &ChartSeries) -> Result<Vec<u8>, ReportError> {
        if series.is_empty() {
            return Err(ReportError::render(key, "no points to plot"));
        }

        let (width, height) = (CHART_WIDTH_PX, CHART_HEIGHT_PX);
        let mut raw = vec![0u8; (width * height * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut raw, (width, height)).into_drawing_area();
            root.fill(&WHITE).map_err(|e| ReportError::render(key, e))?;

            let (x_range, y_range) = padded_ranges(series);
            let mut chart = ChartBuilder::on(&root)
                .margin(CHART_MARGIN_PX)
                .x_label_area_size(18)
                .y_label_area_size(24)
                .build_cartesian_2d(x_range, y_range)
                .map_err(|e| ReportError::render(key, e))?;

            chart
                .configure_mesh()
                .x_labels(0)
                .y_labels(0)
                .draw()
                .map_err(|e| ReportError::render(key, e))?;

            chart
                .draw_series(LineSeries::new(
                    series
                        .timestamps_ms
                        .iter()
                        .zip(&series.values)
                        .map(|(ts, v)| (*ts, *v)),
                    BLUE.stroke_width(STROKE_WIDTH),
                ))
                .map_err(|e| ReportError::render(key, e))?;

            root.present().map_err(|e| ReportError::render(key, e))?;
        }

        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&raw, width, height, ColorType::Rgb8)
            .map_err(|e| ReportError::render(key, e))?;
        Ok(png)
    }
}

/// Plot ranges with degenerate spans padded so plotters always gets a
/// non-empty cartesian area.
fn padded_ranges(series: &ChartSeries) -> (std::ops::Range<i64>, std::ops::Range<f64>) {
    let x_min = *series.timestamps_ms.first().unwrap_or(&0);
    let x_max = *series.timestamps_ms.last().unwrap_or(&0);
    let x_range = if x_min == x_max {
        x_min - 1..x_max + 1
    } else {
        x_min..x_max
    };

    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;
    for v in &series.values {
        y_min = y_min.min(*v);
        y_max = y_max.max(*v);
    }
    let span = y_max - y_min;
    let pad = if span.abs() < f64::EPSILON {
        1.0
    } else {
        span * 0.05
    };

    (x_range, y_min - pad..y_max + pad)
}
