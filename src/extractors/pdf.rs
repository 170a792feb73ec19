// src/extractors/pdf.rs

// --- Imports ---
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use pdf_extract::{
    ColorSpace, Document, MediaBox, OutputDev, OutputError, Path as PdfPath, PathOp, Transform,
};

use crate::extractors::classify::{Row, Table};
use crate::extractors::document::TableSource;
use crate::storage::save_table_dump;
use crate::utils::error::ExtractError;

// --- Layout Constants (PDF user-space units) ---
const SNAP_TOLERANCE: f64 = 3.0;         // Parallel rulings closer than this are one line
const JOIN_TOLERANCE: f64 = 3.0;         // Collinear rulings with a smaller gap are one line
const INTERSECTION_TOLERANCE: f64 = 3.0; // Rulings this close to touching still cross
const MIN_EDGE_LENGTH: f64 = 3.0;
const THIN_RECT: f64 = 2.0;              // Filled rectangles thinner than this are drawn rules
const AXIS_EPSILON: f64 = 0.5;
const LINE_TOLERANCE: f64 = 3.0;         // Baselines closer than this share a text line
const WORD_GAP: f64 = 3.0;               // A wider gap between glyphs reads as a space

// --- Page Primitives ---
/// One decoded glyph, positioned by its baseline origin and advance.
#[derive(Debug, Clone, PartialEq)]
struct Glyph {
    x0: f64,
    x1: f64,
    baseline: f64,
    size: f64,
    text: String,
}

impl Glyph {
    fn centre(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, self.baseline + self.size * 0.3)
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned ruling. `position` is the y of a horizontal edge or the x of
/// a vertical one; `start..end` is its span along the other axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Edge {
    orientation: Orientation,
    position: f64,
    start: f64,
    end: f64,
}

impl Edge {
    fn between(a: (f64, f64), b: (f64, f64)) -> Option<Edge> {
        if (a.1 - b.1).abs() <= AXIS_EPSILON {
            Some(Edge {
                orientation: Orientation::Horizontal,
                position: (a.1 + b.1) / 2.0,
                start: a.0.min(b.0),
                end: a.0.max(b.0),
            })
        } else if (a.0 - b.0).abs() <= AXIS_EPSILON {
            Some(Edge {
                orientation: Orientation::Vertical,
                position: (a.0 + b.0) / 2.0,
                start: a.1.min(b.1),
                end: a.1.max(b.1),
            })
        } else {
            None
        }
    }

    fn covers(&self, value: f64) -> bool {
        value >= self.start - INTERSECTION_TOLERANCE && value <= self.end + INTERSECTION_TOLERANCE
    }
}

fn apply(m: &Transform, x: f64, y: f64) -> (f64, f64) {
    (x * m.m11 + y * m.m21 + m.m31, x * m.m12 + y * m.m22 + m.m32)
}

fn rect_edges(a: (f64, f64), b: (f64, f64)) -> Vec<Edge> {
    let (x0, x1) = (a.0.min(b.0), a.0.max(b.0));
    let (y0, y1) = (a.1.min(b.1), a.1.max(b.1));

    if y1 - y0 <= THIN_RECT {
        let y = (y0 + y1) / 2.0;
        return Edge::between((x0, y), (x1, y)).into_iter().collect();
    }
    if x1 - x0 <= THIN_RECT {
        let x = (x0 + x1) / 2.0;
        return Edge::between((x, y0), (x, y1)).into_iter().collect();
    }

    [
        ((x0, y0), (x1, y0)),
        ((x0, y1), (x1, y1)),
        ((x0, y0), (x0, y1)),
        ((x1, y0), (x1, y1)),
    ]
    .into_iter()
    .filter_map(|(p, q)| Edge::between(p, q))
    .collect()
}

/// Straight axis-aligned pieces of a painted path, in page space. Curves and
/// diagonals are not rulings.
fn path_edges(ctm: &Transform, path: &PdfPath) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut current: Option<(f64, f64)> = None;
    let mut subpath_start: Option<(f64, f64)> = None;

    for op in &path.ops {
        match *op {
            PathOp::MoveTo(x, y) => {
                let point = apply(ctm, x, y);
                current = Some(point);
                subpath_start = Some(point);
            }
            PathOp::LineTo(x, y) => {
                let point = apply(ctm, x, y);
                if let Some(from) = current {
                    edges.extend(Edge::between(from, point));
                }
                current = Some(point);
            }
            PathOp::CurveTo(_, _, _, _, x, y) => current = Some(apply(ctm, x, y)),
            PathOp::Rect(x, y, w, h) => {
                edges.extend(rect_edges(apply(ctm, x, y), apply(ctm, x + w, y + h)));
            }
            PathOp::Close => {
                if let (Some(from), Some(to)) = (current, subpath_start) {
                    edges.extend(Edge::between(from, to));
                }
                current = subpath_start;
            }
        }
    }

    edges
}

// --- Text Layer Collection ---
/// Receives glyphs and painted paths from the PDF interpreter and turns each
/// finished page into its tables.
#[derive(Debug, Default)]
struct PageCollector {
    glyphs: Vec<Glyph>,
    edges: Vec<Edge>,
    pages: Vec<Vec<Table>>,
}

impl OutputDev for PageCollector {
    fn begin_page(&mut self, _page_num: u32, _media_box: &MediaBox, _art_box: Option<(f64, f64, f64, f64)>) -> Result<(), OutputError> {
        self.glyphs.clear();
        self.edges.clear();
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        let glyphs = std::mem::take(&mut self.glyphs);
        let edges = std::mem::take(&mut self.edges);
        self.pages.push(find_tables(edges, &glyphs));
        Ok(())
    }

    fn output_character(&mut self, trm: &Transform, width: f64, _spacing: f64, font_size: f64, char: &str) -> Result<(), OutputError> {
        let horizontal_scale = (trm.m11 * trm.m11 + trm.m12 * trm.m12).sqrt();
        let vertical_scale = (trm.m21 * trm.m21 + trm.m22 * trm.m22).sqrt();
        let x0 = trm.m31;
        self.glyphs.push(Glyph {
            x0,
            x1: x0 + width * font_size * horizontal_scale,
            baseline: trm.m32,
            size: font_size * vertical_scale,
            text: char.to_string(),
        });
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn stroke(&mut self, ctm: &Transform, _colorspace: &ColorSpace, _color: &[f64], path: &PdfPath) -> Result<(), OutputError> {
        self.edges.extend(path_edges(ctm, path));
        Ok(())
    }

    fn fill(&mut self, ctm: &Transform, _colorspace: &ColorSpace, _color: &[f64], path: &PdfPath) -> Result<(), OutputError> {
        self.edges.extend(path_edges(ctm, path));
        Ok(())
    }
}

// --- Ruled Table Detection ---
fn unique_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    values
}

/// Moves clusters of nearly equal positions onto their mean.
fn snap(edges: &mut [Edge]) {
    edges.sort_by(|a, b| a.position.total_cmp(&b.position));
    let mut start = 0;
    for i in 1..=edges.len() {
        if i == edges.len() || edges[i].position - edges[i - 1].position > SNAP_TOLERANCE {
            let cluster = &mut edges[start..i];
            let mean = cluster.iter().map(|e| e.position).sum::<f64>() / cluster.len() as f64;
            cluster.iter_mut().for_each(|e| e.position = mean);
            start = i;
        }
    }
}

fn join(mut edges: Vec<Edge>) -> Vec<Edge> {
    edges.sort_by(|a, b| a.position.total_cmp(&b.position).then(a.start.total_cmp(&b.start)));
    let mut joined: Vec<Edge> = Vec::new();
    for edge in edges {
        match joined.last_mut() {
            Some(last) if last.position == edge.position && edge.start <= last.end + JOIN_TOLERANCE => {
                last.end = last.end.max(edge.end);
            }
            _ => joined.push(edge),
        }
    }
    joined
}

/// Snaps and joins the rulings of each orientation, dropping fragments too
/// short to bound a cell.
fn merge_edges(edges: Vec<Edge>) -> Vec<Edge> {
    let mut merged = Vec::new();
    for orientation in [Orientation::Horizontal, Orientation::Vertical] {
        let mut group: Vec<Edge> = edges.iter().copied().filter(|e| e.orientation == orientation).collect();
        snap(&mut group);
        merged.extend(join(group));
    }
    merged.retain(|e| e.end - e.start >= MIN_EDGE_LENGTH);
    merged
}

/// Rulings meeting at one grid point.
#[derive(Debug, Default)]
struct Crossing {
    horizontal: Vec<usize>,
    vertical: Vec<usize>,
}

impl Crossing {
    fn shares_horizontal(&self, other: &Crossing) -> bool {
        self.horizontal.iter().any(|e| other.horizontal.contains(e))
    }

    fn shares_vertical(&self, other: &Crossing) -> bool {
        self.vertical.iter().any(|e| other.vertical.contains(e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CellBox {
    x0: f64,
    x1: f64,
    bottom: f64,
    top: f64,
}

impl CellBox {
    fn corners(&self) -> [(f64, f64); 4] {
        [(self.x0, self.top), (self.x1, self.top), (self.x0, self.bottom), (self.x1, self.bottom)]
    }

    fn contains(&self, (x, y): (f64, f64)) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.bottom && y < self.top
    }
}

/// The smallest ruled rectangles: from each grid point, the nearest point
/// below and to the right that closes a box along existing rulings.
fn find_cells(edges: &[Edge]) -> Vec<CellBox> {
    let (horizontal, vertical): (Vec<&Edge>, Vec<&Edge>) =
        edges.iter().partition(|e| e.orientation == Orientation::Horizontal);
    let xs = unique_sorted(vertical.iter().map(|e| e.position));
    let ys = unique_sorted(horizontal.iter().map(|e| e.position));
    let index_of = |axis: &[f64], value: f64| axis.iter().position(|&v| v == value).unwrap_or_default();

    // Keyed by (column index, row index); rows count upwards from the page bottom.
    let mut crossings: BTreeMap<(usize, usize), Crossing> = BTreeMap::new();
    for (vi, v) in vertical.iter().enumerate() {
        for (hi, h) in horizontal.iter().enumerate() {
            if v.covers(h.position) && h.covers(v.position) {
                let crossing = crossings
                    .entry((index_of(&xs, v.position), index_of(&ys, h.position)))
                    .or_default();
                crossing.horizontal.push(hi);
                crossing.vertical.push(vi);
            }
        }
    }

    let mut cells = Vec::new();
    for (&(xi, yi), corner) in &crossings {
        'search: for below in (0..yi).rev() {
            let Some(bottom_left) = crossings.get(&(xi, below)) else { continue };
            if !corner.shares_vertical(bottom_left) {
                continue;
            }
            for right in xi + 1..xs.len() {
                let Some(top_right) = crossings.get(&(right, yi)) else { continue };
                if !corner.shares_horizontal(top_right) {
                    continue;
                }
                let Some(bottom_right) = crossings.get(&(right, below)) else { continue };
                if top_right.shares_vertical(bottom_right) && bottom_left.shares_horizontal(bottom_right) {
                    cells.push(CellBox { x0: xs[xi], x1: xs[right], bottom: ys[below], top: ys[yi] });
                    break 'search;
                }
            }
        }
    }
    cells
}

fn table_origin(cells: &[CellBox]) -> (f64, f64) {
    let top = cells.iter().map(|c| c.top).fold(f64::MIN, f64::max);
    let left = cells.iter().map(|c| c.x0).fold(f64::MAX, f64::min);
    (top, left)
}

/// Cells sharing a corner belong to the same table. A lone box is not a table.
/// Tables come out top to bottom, then left to right.
fn group_cells(cells: Vec<CellBox>) -> Vec<Vec<CellBox>> {
    let mut remaining = cells;
    let mut tables: Vec<Vec<CellBox>> = Vec::new();

    while let Some(seed) = remaining.pop() {
        let mut corners: Vec<(f64, f64)> = seed.corners().to_vec();
        let mut table = vec![seed];
        loop {
            let (joined, rest): (Vec<CellBox>, Vec<CellBox>) = remaining
                .into_iter()
                .partition(|c| c.corners().iter().any(|p| corners.contains(p)));
            remaining = rest;
            if joined.is_empty() {
                break;
            }
            corners.extend(joined.iter().flat_map(|c| c.corners()));
            table.extend(joined);
        }
        tables.push(table);
    }

    tables.retain(|t| t.len() > 1);
    tables.sort_by(|a, b| {
        let (a_top, a_left) = table_origin(a);
        let (b_top, b_left) = table_origin(b);
        b_top.total_cmp(&a_top).then(a_left.total_cmp(&b_left))
    });
    tables
}

fn line_text(line: &[&Glyph]) -> String {
    let mut text = String::new();
    let mut last_end: Option<f64> = None;
    for glyph in line {
        let gap = last_end.map(|end| glyph.x0 - end > WORD_GAP).unwrap_or(false);
        if (glyph.is_blank() || gap) && !text.is_empty() && !text.ends_with(' ') {
            text.push(' ');
        }
        if !glyph.is_blank() {
            text.push_str(&glyph.text);
        }
        last_end = Some(glyph.x1);
    }
    text.trim_end().to_string()
}

/// Text of the glyphs centred in a cell; wrapped lines are joined with `\n`.
fn cell_text(cell: &CellBox, glyphs: &[Glyph]) -> Option<String> {
    let mut inside: Vec<&Glyph> = glyphs.iter().filter(|g| cell.contains(g.centre())).collect();
    inside.sort_by(|a, b| b.baseline.total_cmp(&a.baseline).then(a.x0.total_cmp(&b.x0)));

    let mut lines: Vec<Vec<&Glyph>> = Vec::new();
    for glyph in inside {
        match lines.last_mut() {
            Some(line) if (line[0].baseline - glyph.baseline).abs() <= LINE_TOLERANCE => line.push(glyph),
            _ => lines.push(vec![glyph]),
        }
    }

    let text = lines
        .iter_mut()
        .map(|line| {
            line.sort_by(|a, b| a.x0.total_cmp(&b.x0));
            line_text(line)
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!text.is_empty()).then_some(text)
}

/// Rows of one table, top to bottom, over the table's column starts. Grid
/// positions covered by a merged cell, and cells without text, are `None`.
fn table_rows(cells: &[CellBox], glyphs: &[Glyph]) -> Table {
    let columns = unique_sorted(cells.iter().map(|c| c.x0));
    let tops = unique_sorted(cells.iter().map(|c| c.top));

    tops.iter()
        .rev()
        .map(|&top| {
            columns
                .iter()
                .map(|&x0| {
                    cells
                        .iter()
                        .find(|c| c.top == top && c.x0 == x0)
                        .and_then(|c| cell_text(c, glyphs))
                })
                .collect::<Row>()
        })
        .collect()
}

/// Tables of one page, found from its ruling lines. Text outside any ruled
/// grid is ignored.
fn find_tables(edges: Vec<Edge>, glyphs: &[Glyph]) -> Vec<Table> {
    let edges = merge_edges(edges);
    group_cells(find_cells(&edges))
        .iter()
        .map(|cells| table_rows(cells, glyphs))
        .collect()
}

// --- Document Handle ---
/// A fertilizer bulletin on disk. The file is only read when its tables are requested.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    path: PathBuf,
    id: String,
    dump_tables: bool,
}

impl PdfDocument {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, id, dump_tables: false }
    }

    /// Also writes the extracted tables to `<stem>.tables.json` whenever the
    /// document is read.
    pub fn with_table_dump(mut self, enabled: bool) -> Self {
        self.dump_tables = enabled;
        self
    }

    fn dump(&self, pages: &[Vec<Table>]) {
        let dump_path = self.path.with_extension("tables.json");
        if let Err(e) = save_table_dump(&dump_path, &self.id, pages) {
            tracing::warn!("Failed to write table dump for {}: {}", self.id, e);
        }
    }
}

impl TableSource for PdfDocument {
    fn document_id(&self) -> &str {
        &self.id
    }

    fn pages(&self) -> Result<Vec<Vec<Table>>, ExtractError> {
        let mut document = Document::load(&self.path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
        if document.is_encrypted() {
            document
                .decrypt("")
                .map_err(|e| ExtractError::Pdf(format!("encrypted document: {}", e)))?;
        }

        // Malformed fonts can panic inside the interpreter.
        let mut collector = PageCollector::default();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::output_doc(&document, &mut collector)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ExtractError::Pdf(e.to_string())),
            Err(_) => return Err(ExtractError::Pdf("PDF interpreter panicked (malformed document)".to_string())),
        }

        for (index, tables) in collector.pages.iter().enumerate() {
            tracing::trace!("{} page {}: {} table(s)", self.id, index + 1, tables.len());
        }
        if self.dump_tables {
            self.dump(&collector.pages);
        }
        Ok(collector.pages)
    }
}

/// Writes a PDF with one ruled table per page. Cells are laid out on a grid
/// with a wide first column; `\n` in a cell wraps it onto a further line and
/// the other cells of that row are centred vertically. A title line is printed
/// above each table.
#[cfg(test)]
pub(crate) fn write_test_pdf(path: &Path, pages: &[Vec<Vec<&str>>]) {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    const LEFT: f32 = 40.0;
    const TOP: f32 = 760.0;
    const FIRST_WIDTH: f32 = 140.0;
    const WIDTH: f32 = 70.0;
    const LEADING: f32 = 14.0;

    fn text(operations: &mut Vec<Operation>, x: f32, y: f32, s: &str) {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), Object::Integer(10)]));
        operations.push(Operation::new("Td", vec![Object::Real(x), Object::Real(y)]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(s)]));
        operations.push(Operation::new("ET", vec![]));
    }

    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for rows in pages {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut xs = vec![LEFT, LEFT + FIRST_WIDTH];
        while xs.len() < columns + 1 {
            let last = *xs.last().unwrap();
            xs.push(last + WIDTH);
        }
        let right = *xs.last().unwrap();

        let mut operations = Vec::new();
        text(&mut operations, LEFT, TOP + 20.0, "Weekly fertilizer price monitoring");

        let mut ys = vec![TOP];
        for row in rows {
            let top = *ys.last().unwrap();
            let lines = row.iter().map(|cell| cell.split('\n').count()).max().unwrap_or(1) as f32;
            let height = LEADING * lines + 6.0;
            for (column, cell) in row.iter().enumerate() {
                let cell_lines: Vec<&str> = cell.split('\n').collect();
                let first_baseline = top - (height - LEADING * cell_lines.len() as f32) / 2.0 - 11.0;
                for (k, line) in cell_lines.iter().enumerate() {
                    if !line.is_empty() {
                        text(&mut operations, xs[column] + 4.0, first_baseline - LEADING * k as f32, line);
                    }
                }
            }
            ys.push(top - height);
        }
        let bottom = *ys.last().unwrap();

        for y in &ys {
            operations.push(Operation::new("m", vec![Object::Real(LEFT), Object::Real(*y)]));
            operations.push(Operation::new("l", vec![Object::Real(right), Object::Real(*y)]));
        }
        for x in &xs {
            operations.push(Operation::new("m", vec![Object::Real(*x), Object::Real(TOP)]));
            operations.push(Operation::new("l", vec![Object::Real(*x), Object::Real(bottom)]));
        }
        operations.push(Operation::new("S", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(pages_id, Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    }));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
