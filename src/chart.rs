use camino::Utf8Path;
use svg::Document;
use svg::node::element::{Circle, Line, Polyline, Rectangle, Text};

use crate::domain::ReportTable;
use crate::error::TaxlenError;
use crate::report::write_file_atomic;

const W: f32 = 1000.0;
const H: f32 = 500.0;
const MARGIN_LEFT: f32 = 84.0;
const MARGIN_RIGHT: f32 = 24.0;
const MARGIN_TOP: f32 = 24.0;
const MIN_PLOT_HEIGHT: f32 = 220.0;
const TICK_FONT_SIZE: f32 = 11.0;
const TITLE_FONT_SIZE: f32 = 14.0;
// Rough advance of one glyph at TICK_FONT_SIZE, used to reserve room for rotated labels.
const GLYPH_WIDTH: f32 = 6.8;
const LINE_COLOR: &str = "#1f77b4";
const FONT: &str = "DejaVu Sans, Helvetica, Arial, sans-serif";

#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub accession: String,
    pub length: u64,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Frame {
    width: f32,
    height: f32,
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
    y_min: f64,
    y_max: f64,
    y_ticks: Vec<f64>,
}

impl Frame {
    fn new(table: &ReportTable) -> Self {
        let longest_label = table
            .rows()
            .iter()
            .map(|row| row.accession.chars().count())
            .max()
            .unwrap_or(0) as f32;
        let bottom_margin = 16.0 + longest_label * GLYPH_WIDTH + 12.0 + TITLE_FONT_SIZE + 10.0;
        let height = H.max(MARGIN_TOP + MIN_PLOT_HEIGHT + bottom_margin);

        let lo = table.shortest().map(|row| row.length).unwrap_or(0) as f64;
        let hi = table.longest().map(|row| row.length).unwrap_or(0) as f64;
        let pad = if hi > lo { (hi - lo) * 0.05 } else { (hi * 0.05).max(1.0) };
        let y_min = (lo - pad).max(0.0);
        let y_max = hi + pad;

        Self {
            width: W,
            height,
            left: MARGIN_LEFT,
            right: W - MARGIN_RIGHT,
            top: MARGIN_TOP,
            bottom: height - bottom_margin,
            y_min,
            y_max,
            y_ticks: nice_ticks(y_min, y_max),
        }
    }

    fn x_for(&self, index: usize, count: usize) -> f32 {
        let slot = (self.right - self.left) / count.max(1) as f32;
        self.left + slot * (index as f32 + 0.5)
    }

    fn y_for(&self, value: f64) -> f32 {
        let span = (self.y_max - self.y_min).max(f64::EPSILON);
        let frac = ((value - self.y_min) / span) as f32;
        self.bottom - frac * (self.bottom - self.top)
    }
}

/// Positions of the plotted markers, in table order.
pub fn chart_points(table: &ReportTable) -> Vec<ChartPoint> {
    let frame = Frame::new(table);
    points_in(&frame, table)
}

fn points_in(frame: &Frame, table: &ReportTable) -> Vec<ChartPoint> {
    let count = table.len();
    table
        .rows()
        .iter()
        .enumerate()
        .map(|(idx, row)| ChartPoint {
            accession: row.accession.clone(),
            length: row.length,
            x: frame.x_for(idx, count),
            y: frame.y_for(row.length as f64),
        })
        .collect()
}

pub fn render_svg(table: &ReportTable) -> String {
    let frame = Frame::new(table);
    let points = points_in(&frame, table);

    let mut doc = Document::new()
        .set("viewBox", (0, 0, frame.width, frame.height))
        .set("width", frame.width)
        .set("height", frame.height)
        .add(
            Rectangle::new()
                .set("x", 0)
                .set("y", 0)
                .set("width", frame.width)
                .set("height", frame.height)
                .set("fill", "#ffffff"),
        );

    for tick in &frame.y_ticks {
        let y = frame.y_for(*tick);
        doc = doc
            .add(
                Line::new()
                    .set("x1", frame.left)
                    .set("y1", y)
                    .set("x2", frame.right)
                    .set("y2", y)
                    .set("stroke", "#e5e7eb")
                    .set("stroke-width", 1),
            )
            .add(
                Text::new(format_tick(*tick))
                    .set("x", frame.left - 8.0)
                    .set("y", y + 4.0)
                    .set("text-anchor", "end")
                    .set("font-family", FONT)
                    .set("font-size", TICK_FONT_SIZE)
                    .set("fill", "#222222"),
            );
    }

    doc = doc
        .add(
            Line::new()
                .set("x1", frame.left)
                .set("y1", frame.top)
                .set("x2", frame.left)
                .set("y2", frame.bottom)
                .set("stroke", "#222222")
                .set("stroke-width", 1),
        )
        .add(
            Line::new()
                .set("x1", frame.left)
                .set("y1", frame.bottom)
                .set("x2", frame.right)
                .set("y2", frame.bottom)
                .set("stroke", "#222222")
                .set("stroke-width", 1),
        );

    for point in &points {
        let label_y = frame.bottom + 10.0;
        doc = doc
            .add(
                Line::new()
                    .set("x1", point.x)
                    .set("y1", frame.bottom)
                    .set("x2", point.x)
                    .set("y2", frame.bottom + 4.0)
                    .set("stroke", "#222222")
                    .set("stroke-width", 1),
            )
            .add(
                Text::new(point.accession.clone())
                    .set("x", point.x)
                    .set("y", label_y)
                    .set("transform", format!("rotate(-90 {} {})", point.x, label_y))
                    .set("text-anchor", "end")
                    .set("dominant-baseline", "middle")
                    .set("font-family", FONT)
                    .set("font-size", TICK_FONT_SIZE)
                    .set("fill", "#222222"),
            );
    }

    let polyline = points
        .iter()
        .map(|point| format!("{},{}", point.x, point.y))
        .collect::<Vec<_>>()
        .join(" ");
    doc = doc.add(
        Polyline::new()
            .set("points", polyline)
            .set("fill", "none")
            .set("stroke", LINE_COLOR)
            .set("stroke-width", 1.5),
    );
    for point in &points {
        doc = doc.add(
            Circle::new()
                .set("cx", point.x)
                .set("cy", point.y)
                .set("r", 3.5)
                .set("fill", LINE_COLOR),
        );
    }

    let mid_x = (frame.left + frame.right) * 0.5;
    let mid_y = (frame.top + frame.bottom) * 0.5;
    doc = doc
        .add(
            Text::new("Accession")
                .set("x", mid_x)
                .set("y", frame.height - 10.0)
                .set("text-anchor", "middle")
                .set("font-family", FONT)
                .set("font-size", TITLE_FONT_SIZE)
                .set("fill", "#222222"),
        )
        .add(
            Text::new("Length")
                .set("x", 22)
                .set("y", mid_y)
                .set("transform", format!("rotate(-90 22 {mid_y})"))
                .set("text-anchor", "middle")
                .set("font-family", FONT)
                .set("font-size", TITLE_FONT_SIZE)
                .set("fill", "#222222"),
        );

    doc.to_string()
}

/// Parser options with the host's fonts. Without any, resvg drops every `<text>`
/// node and the chart comes out unlabelled.
fn render_options() -> resvg::usvg::Options<'static> {
    let mut options = resvg::usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    if options.fontdb.is_empty() {
        tracing::warn!("no system fonts found; chart labels will be missing");
    } else {
        tracing::debug!(faces = options.fontdb.len(), "fonts loaded");
    }
    options
}

pub fn rasterize_png(svg_text: &str) -> Result<Vec<u8>, TaxlenError> {
    let options = render_options();
    let tree = resvg::usvg::Tree::from_str(svg_text, &options)
        .map_err(|err| TaxlenError::ChartRender(err.to_string()))?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| TaxlenError::ChartRender("invalid canvas size".to_string()))?;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::default(),
        &mut pixmap.as_mut(),
    );
    pixmap
        .encode_png()
        .map_err(|err| TaxlenError::ChartRender(err.to_string()))
}

/// PNG bytes of the length chart, longest first. Unsorted input is re-sorted.
pub fn render_png(table: &ReportTable) -> Result<Vec<u8>, TaxlenError> {
    if table.is_empty() {
        return Err(TaxlenError::ChartRender("nothing to plot".to_string()));
    }
    if table.is_sorted() {
        return rasterize_png(&render_svg(table));
    }
    tracing::debug!("chart input was not sorted by length; re-sorting");
    rasterize_png(&render_svg(&table.clone().ensure_sorted()))
}

/// Draws length per accession, longest first, and writes it as PNG to `output_path`.
pub fn render_chart(table: &ReportTable, output_path: &Utf8Path) -> Result<(), TaxlenError> {
    let png = render_png(table)?;
    write_file_atomic(output_path, &png)?;
    tracing::info!(path = %output_path, points = table.len(), "chart written");
    Ok(())
}

fn nice_ticks(lo: f64, hi: f64) -> Vec<f64> {
    let span = hi - lo;
    if span <= 0.0 {
        return vec![lo];
    }
    let step = nice_step(span / 6.0);
    let mut tick = (lo / step).ceil() * step;
    let mut ticks = Vec::new();
    while tick <= hi + step * 1e-9 {
        ticks.push(tick);
        tick += step;
    }
    ticks
}

fn nice_step(raw: f64) -> f64 {
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let nice = if normalized < 1.5 {
        1.0
    } else if normalized < 3.0 {
        2.0
    } else if normalized < 7.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn format_tick(value: f64) -> String {
    if value.fract().abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SequenceRecord;

    #[test]
    fn nice_ticks_cover_range() {
        let ticks = nice_ticks(0.0, 525.0);
        assert_eq!(ticks, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0]);
        assert_eq!(nice_ticks(5.0, 5.0), vec![5.0]);
    }

    #[test]
    fn tick_labels_drop_trailing_zero_fraction() {
        assert_eq!(format_tick(200.0), "200");
        assert_eq!(format_tick(0.5), "0.5");
    }

    #[test]
    fn long_labels_grow_canvas() {
        let long = "X".repeat(80);
        let table = ReportTable::from_records(vec![SequenceRecord::new(long, 10, "")]);
        let frame = Frame::new(&table);
        assert!(frame.height > H);
        assert!(frame.bottom - frame.top >= MIN_PLOT_HEIGHT - 0.01);
    }

    #[test]
    fn text_renders_with_or_without_fonts() {
        let options = render_options();
        let svg = render_svg(&ReportTable::from_records(vec![SequenceRecord::new("A.1", 100, "")]));
        let tree = resvg::usvg::Tree::from_str(&svg, &options).unwrap();
        assert_eq!(tree.size().to_int_size().width(), W as u32);
        assert!(rasterize_png(&svg).unwrap().starts_with(b"\x89PNG"));
    }

    #[test]
    fn single_point_is_centered() {
        let table = ReportTable::from_records(vec![SequenceRecord::new("A.1", 100, "")]);
        let points = chart_points(&table);
        assert_eq!(points.len(), 1);
        assert!((points[0].x - (MARGIN_LEFT + W - MARGIN_RIGHT) / 2.0).abs() < 0.01);
    }
}
