use crate::chart::{self, ChartRenderer, ChartSeries};
use crate::error::ReportError;
use crate::model::{ReportRequest, SeriesCollection, SummaryStats};
use crate::stats;
use chrono::{DateTime, Utc};
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};
use std::io::Cursor;

/// Detail tables show at most this many rows before the truncation marker.
pub const TABLE_ROW_CAP: usize = 20;
const TRUNCATION_MARKER: &str = "... (truncated)";

const PAGE_WIDTH_MM: f64 = 210.0;
const PAGE_HEIGHT_MM: f64 = 297.0;
const MARGIN_MM: f64 = 15.0;
const CHART_DPI: f64 = 180.0;

#[derive(Clone, Debug)]
pub struct TitleSection {
    pub heading: String,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct SummaryLine {
    pub key: String,
    pub stats: SummaryStats,
}

impl SummaryLine {
    pub fn formatted(&self) -> String {
        format!(
            "Count: {}, Average: {:.2}, Min: {:.2}, Max: {:.2}",
            self.stats.count, self.stats.average, self.stats.min, self.stats.max
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableRow {
    pub timestamp: String,
    pub value: String,
    pub labels: String,
}

#[derive(Clone, Debug)]
pub struct DetailPage {
    pub key: String,
    pub chart_png: Vec<u8>,
    pub rows: Vec<TableRow>,
    pub truncated: bool,
}

/// Composed document model. Assembly is split in two: `compose` builds this
/// model (everything with ordering/truncation semantics), `render_pdf`
/// serializes it. Tests assert on the model instead of parsing PDF bytes.
#[derive(Clone, Debug)]
pub struct ReportDocument {
    pub title: TitleSection,
    pub summary: Vec<SummaryLine>,
    pub details: Vec<DetailPage>,
    /// Series whose chart failed to rasterize, with the reason. Their
    /// summary lines are retained; only the detail page is dropped.
    pub render_failures: Vec<(String, String)>,
}

/// Build the document model from a decoded collection. Empty series are
/// excluded from every section; iteration is in key order so output is
/// deterministic.
pub fn compose(
    request: &ReportRequest,
    collection: &SeriesCollection,
    renderer: &dyn ChartRenderer,
    generated_at: DateTime<Utc>,
    row_cap: usize,
) -> ReportDocument {
    let title = TitleSection {
        heading: format!("Time Series Report - {}", request.report_type),
        generated_at,
        period_start: request.start,
        period_end: request.end,
    };

    let mut summary = Vec::new();
    let mut details = Vec::new();
    let mut render_failures = Vec::new();

    for (key, points) in collection {
        if points.is_empty() {
            continue;
        }
        summary.push(SummaryLine {
            key: key.clone(),
            stats: stats::summarize(points),
        });
    }

    for (key, points) in collection {
        if points.is_empty() {
            continue;
        }

        let series = ChartSeries::from_points(points);
        let chart_png = match renderer.render(key, &series) {
            Ok(png) => png,
            Err(err) => {
                render_failures.push((key.clone(), err.to_string()));
                continue;
            }
        };

        let mut ordered = points.clone();
        chart::sort_points(&mut ordered);
        let truncated = ordered.len() > row_cap;
        let rows = ordered
            .iter()
            .take(row_cap)
            .map(|p| TableRow {
                timestamp: format_timestamp(p.timestamp_ms),
                value: format!("{:.2}", p.value),
                labels: p
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{k}:{v}"))
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect();

        details.push(DetailPage {
            key: key.clone(),
            chart_png,
            rows,
            truncated,
        });
    }

    ReportDocument {
        title,
        summary,
        details,
        render_failures,
    }
}

/// Serialize the model to PDF bytes. Failures here are fatal for the whole
/// request; no partial document is returned.
pub fn render_pdf(document: &ReportDocument) -> Result<Vec<u8>, ReportError> {
    let (doc, page, layer) =
        PdfDocument::new(
            &document.title.heading,
            Mm(PAGE_WIDTH_MM as f32),
            Mm(PAGE_HEIGHT_MM as f32),
            "report",
        );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(ReportError::assembly)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(ReportError::assembly)?;

    let mut writer = PageWriter {
        doc: &doc,
        layer: doc.get_page(page).get_layer(layer),
        y: PAGE_HEIGHT_MM - MARGIN_MM,
    };

    writer.text(&document.title.heading, 16.0, MARGIN_MM, &bold, 10.0);
    writer.text(
        &format!(
            "Generated: {}",
            document.title.generated_at.format("%Y-%m-%d %H:%M:%S")
        ),
        10.0,
        MARGIN_MM,
        &regular,
        5.0,
    );
    writer.text(
        &format!(
            "Period: {} to {}",
            document.title.period_start.format("%Y-%m-%d %H:%M:%S"),
            document.title.period_end.format("%Y-%m-%d %H:%M:%S")
        ),
        10.0,
        MARGIN_MM,
        &regular,
        10.0,
    );

    writer.text("Summary Statistics", 12.0, MARGIN_MM, &bold, 8.0);
    for line in &document.summary {
        writer.ensure(12.0);
        writer.text(&format!("Metric: {}", line.key), 10.0, MARGIN_MM, &regular, 5.0);
        writer.text(&line.formatted(), 10.0, MARGIN_MM + 5.0, &regular, 7.0);
    }

    for detail in &document.details {
        // A chart that made it through rasterization but fails to decode is
        // treated like a rasterizer failure: drop the page, keep the rest.
        let image = match decode_chart(&detail.key, &detail.chart_png) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(series = %detail.key, error = %err, "skipping detail page");
                continue;
            }
        };

        writer.new_page();
        writer.text(&format!("Chart: {}", detail.key), 12.0, MARGIN_MM, &bold, 8.0);

        let chart_height_mm = f64::from(crate::chart::CHART_HEIGHT_PX) / CHART_DPI * 25.4;
        writer.y -= chart_height_mm;
        image.add_to_layer(
            writer.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN_MM as f32)),
                translate_y: Some(Mm(writer.y as f32)),
                dpi: Some(CHART_DPI as f32),
                ..Default::default()
            },
        );
        writer.y -= 10.0;

        table_row(&mut writer, "Timestamp", "Value", "Labels", &bold, 10.0);
        for row in &detail.rows {
            writer.ensure(10.0);
            table_row(&mut writer, &row.timestamp, &row.value, &row.labels, &regular, 8.0);
        }
        if detail.truncated {
            writer.ensure(10.0);
            writer.text(TRUNCATION_MARKER, 8.0, MARGIN_MM, &regular, 5.0);
        }
    }

    drop(writer);
    doc.save_to_bytes().map_err(ReportError::assembly)
}

fn decode_chart(key: &str, png: &[u8]) -> Result<Image, ReportError> {
    let decoder = PngDecoder::new(Cursor::new(png)).map_err(|e| ReportError::render(key, e))?;
    Image::try_from(decoder).map_err(|e| ReportError::render(key, e))
}

fn table_row(
    writer: &mut PageWriter<'_>,
    timestamp: &str,
    value: &str,
    labels: &str,
    font: &IndirectFontRef,
    size: f64,
) {
    let y = writer.y;
    let size = size as f32;
    let y = Mm(y as f32);
    writer.layer.use_text(timestamp, size, Mm(MARGIN_MM as f32), y, font);
    writer.layer.use_text(value, size, Mm((MARGIN_MM + 55.0) as f32), y, font);
    writer.layer.use_text(labels, size, Mm((MARGIN_MM + 85.0) as f32), y, font);
    writer.y -= 6.0;
}

struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f64,
}

impl PageWriter<'_> {
    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH_MM as f32), Mm(PAGE_HEIGHT_MM as f32), "report");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT_MM - MARGIN_MM;
    }

    fn ensure(&mut self, needed_mm: f64) {
        if self.y < needed_mm + MARGIN_MM {
            self.new_page();
        }
    }

    fn text(&mut self, text: &str, size: f64, x: f64, font: &IndirectFontRef, advance_mm: f64) {
        self.layer
            .use_text(text, size as f32, Mm(x as f32), Mm(self.y as f32), font);
        self.y -= advance_mm;
    }
}

fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
