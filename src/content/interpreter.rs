//! Content stream interpretation.
//!
//! Executes a page's operators and records what was painted: text as
//! [`TextFragment`](crate::page::TextFragment)s and thin lines as
//! [`RulingLine`]s, both in page space (origin at the bottom-left of the
//! visible area, `/Rotate` applied).
//!
//! Glyph placement follows the text rendering matrix
//! `Trm = [Tfs*Th 0 0 Tfs 0 Trise] x Tm x CTM`; after each glyph the text
//! matrix advances by `tx = (w0*Tfs + Tc + Tw) * Th`, with `Tw` applied only
//! to the single-byte code 32.

use crate::config::LayoutConfig;
use crate::content::graphics_state::{GraphicsStateStack, Matrix};
use crate::content::operators::{Operator, TextElement};
use crate::content::parser::parse_content_stream;
use crate::document::{Document, PageHandle};
use crate::fonts::{Font, Glyph};
use crate::geometry::{Point, Rect};
use crate::object::{Dict, Object, ObjectRef};
use crate::page::{Page, RulingLine};
use std::collections::HashMap;
use std::sync::Arc;

/// Deepest chain of nested form XObjects followed.
pub const MAX_FORM_DEPTH: usize = 12;

/// Glyph box extent below the baseline, in em.
const DESCENT: f32 = -0.2;
/// Glyph box extent above the baseline, in em.
const ASCENT: f32 = 0.8;
/// Narrowest glyph box, in em, so zero-width glyphs still have an area.
const MIN_GLYPH_WIDTH: f32 = 0.05;
/// Deviation in page units under which a segment counts as axis-aligned.
const AXIS_TOLERANCE: f32 = 0.5;

/// Filled rectangles must be at least this many times longer than thick to
/// count as rulings.
const MIN_FILL_ASPECT: f32 = 4.0;

/// Interpret one page.
pub fn interpret_page(doc: &Document, handle: &PageHandle, layout: &LayoutConfig) -> Page {
    let [llx, lly, urx, ury] = handle.crop_box.unwrap_or(handle.media_box);
    let (x0, x1) = (llx.min(urx) as f32, llx.max(urx) as f32);
    let (y0, y1) = (lly.min(ury) as f32, lly.max(ury) as f32);
    let (w, h) = (x1 - x0, y1 - y0);

    let rotation = match handle.rotate {
        90 => Matrix::from_array([0.0, -1.0, 1.0, 0.0, 0.0, w]),
        180 => Matrix::from_array([-1.0, 0.0, 0.0, -1.0, w, h]),
        270 => Matrix::from_array([0.0, 1.0, -1.0, 0.0, h, 0.0]),
        _ => Matrix::identity(),
    };
    let (width, height) = if handle.rotate == 90 || handle.rotate == 270 {
        (h, w)
    } else {
        (w, h)
    };
    let ctm = Matrix::translation(-x0, -y0).multiply(&rotation);

    let contents = doc.page_contents(handle);
    let mut interpreter = Interpreter::new(doc, layout, Page::new(handle.index, width, height), ctm);
    interpreter.page.diagnostics.undecodable_streams += contents.undecodable;
    interpreter.run(&contents.data, &handle.resources, 0);
    let page = interpreter.finish();
    log::debug!(
        "Page {}: {} fragments, {} rulings",
        page.index,
        page.fragments.len(),
        page.rulings.len()
    );
    page
}

/// One subpath in page space. Points after the first carry whether they
/// were reached by a curve.
#[derive(Debug, Clone, Default)]
struct Subpath {
    points: Vec<(Point, bool)>,
    closed: bool,
}

impl Subpath {
    fn has_curves(&self) -> bool {
        self.points.iter().any(|&(_, curved)| curved)
    }

    /// Straight segments, including the closing one.
    fn straight_segments(&self) -> Vec<(Point, Point)> {
        let mut segments: Vec<(Point, Point)> = self
            .points
            .windows(2)
            .filter(|pair| !pair[1].1)
            .map(|pair| (pair[0].0, pair[1].0))
            .collect();
        if self.closed && self.points.len() > 2 {
            if let (Some(first), Some(last)) = (self.points.first(), self.points.last()) {
                segments.push((last.0, first.0));
            }
        }
        segments
    }

    /// Bounds when the subpath is an axis-aligned rectangle.
    fn as_rect(&self) -> Option<Rect> {
        if self.has_curves() {
            return None;
        }
        let mut corners: Vec<Point> = Vec::with_capacity(5);
        for &(p, _) in &self.points {
            if corners.last().map_or(true, |q| !same_point(*q, p)) {
                corners.push(p);
            }
        }
        if corners.len() == 5 && same_point(corners[0], corners[4]) {
            corners.pop();
        }
        if corners.len() != 4 {
            return None;
        }
        let aligned = (0..4).all(|i| {
            let (a, b) = (corners[i], corners[(i + 1) % 4]);
            (a.x - b.x).abs() <= AXIS_TOLERANCE || (a.y - b.y).abs() <= AXIS_TOLERANCE
        });
        if !aligned {
            return None;
        }
        Rect::bounding(corners)
    }
}

fn same_point(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() <= f32::EPSILON && (a.y - b.y).abs() <= f32::EPSILON
}

/// Text accumulated since the last split.
#[derive(Debug, Clone)]
struct PendingFragment {
    text: String,
    bbox: Rect,
    font_size: f32,
    baseline: f32,
    end_x: f32,
}

struct Interpreter<'a> {
    doc: &'a Document,
    layout: &'a LayoutConfig,
    page: Page,
    states: GraphicsStateStack,
    text_matrix: Matrix,
    line_matrix: Matrix,
    path: Vec<Subpath>,
    pending: Option<PendingFragment>,
    /// Fonts loaded by reference, shared across form scopes
    fonts: HashMap<ObjectRef, Arc<Font>>,
    /// Forms currently being interpreted
    active_forms: Vec<ObjectRef>,
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document, layout: &'a LayoutConfig, page: Page, ctm: Matrix) -> Self {
        Self {
            doc,
            layout,
            page,
            states: GraphicsStateStack::with_ctm(ctm),
            text_matrix: Matrix::identity(),
            line_matrix: Matrix::identity(),
            path: Vec::new(),
            pending: None,
            fonts: HashMap::new(),
            active_forms: Vec::new(),
        }
    }

    fn finish(mut self) -> Page {
        self.flush();
        self.page
    }

    fn run(&mut self, data: &[u8], resources: &Dict, depth: usize) {
        let stream = parse_content_stream(data);
        if stream.malformed > 0 {
            log::warn!(
                "Page {}: skipped {} malformed operators",
                self.page.index,
                stream.malformed
            );
        }
        self.page.diagnostics.skipped_operators += stream.malformed;

        let mut scope_fonts: HashMap<String, Arc<Font>> = HashMap::new();
        for op in stream.operators {
            self.execute(op, resources, &mut scope_fonts, depth);
        }
    }

    fn execute(
        &mut self,
        op: Operator,
        resources: &Dict,
        scope_fonts: &mut HashMap<String, Arc<Font>>,
        depth: usize,
    ) {
        match op {
            Operator::BeginText => {
                self.text_matrix = Matrix::identity();
                self.line_matrix = Matrix::identity();
            },
            Operator::EndText => self.flush(),
            Operator::Td { tx, ty } => self.move_line(tx, ty),
            Operator::TD { tx, ty } => {
                self.states.current_mut().leading = -ty;
                self.move_line(tx, ty);
            },
            Operator::Tm { matrix } => {
                self.text_matrix = Matrix::from_array(matrix);
                self.line_matrix = self.text_matrix;
            },
            Operator::TStar => self.next_line(),
            Operator::Tj { text } => self.show(&text, resources, scope_fonts),
            Operator::TJ { array } => {
                let font = self.current_font(resources, scope_fonts);
                for element in array {
                    match element {
                        TextElement::String(bytes) => self.show_with(&bytes, &font),
                        TextElement::Offset(offset) => self.adjust(offset),
                    }
                }
            },
            Operator::Quote { text } => {
                self.next_line();
                self.show(&text, resources, scope_fonts);
            },
            Operator::DoubleQuote {
                word_space,
                char_space,
                text,
            } => {
                let gs = self.states.current_mut();
                gs.word_space = word_space;
                gs.char_space = char_space;
                self.next_line();
                self.show(&text, resources, scope_fonts);
            },
            Operator::Tc { char_space } => self.states.current_mut().char_space = char_space,
            Operator::Tw { word_space } => self.states.current_mut().word_space = word_space,
            Operator::Tz { scale } => self.states.current_mut().horizontal_scaling = scale / 100.0,
            Operator::TL { leading } => self.states.current_mut().leading = leading,
            Operator::Tf { font, size } => {
                let gs = self.states.current_mut();
                gs.font_name = Some(font);
                gs.font_size = size;
            },
            Operator::Tr { render } => self.states.current_mut().render_mode = render,
            Operator::Ts { rise } => self.states.current_mut().text_rise = rise,

            Operator::SaveState => self.states.save(),
            Operator::RestoreState => {
                if !self.states.restore() {
                    log::debug!("Page {}: Q without matching q", self.page.index);
                    self.page.diagnostics.skipped_operators += 1;
                }
            },
            Operator::Cm { matrix } => {
                let gs = self.states.current_mut();
                gs.ctm = Matrix::from_array(matrix).multiply(&gs.ctm);
            },
            Operator::SetLineWidth { width } => self.states.current_mut().line_width = width,
            Operator::SetExtGState { name } => self.apply_ext_gstate(&name, resources),

            Operator::MoveTo { x, y } => {
                let p = self.to_page(x, y);
                self.path.push(Subpath {
                    points: vec![(p, false)],
                    closed: false,
                });
            },
            Operator::LineTo { x, y } => self.extend_path(x, y, false),
            Operator::CurveTo { x, y } => self.extend_path(x, y, true),
            Operator::ClosePath => {
                if let Some(subpath) = self.path.last_mut() {
                    subpath.closed = true;
                }
            },
            Operator::Rectangle { x, y, width, height } => {
                let corners = [(x, y), (x + width, y), (x + width, y + height), (x, y + height)];
                let points = corners.iter().map(|&(px, py)| (self.to_page(px, py), false)).collect();
                self.path.push(Subpath { points, closed: true });
            },
            Operator::Stroke { close } => {
                if close {
                    if let Some(subpath) = self.path.last_mut() {
                        subpath.closed = true;
                    }
                }
                self.stroke_rulings();
                self.path.clear();
            },
            Operator::Fill => {
                self.fill_rulings();
                self.path.clear();
            },
            Operator::FillStroke { close } => {
                if close {
                    if let Some(subpath) = self.path.last_mut() {
                        subpath.closed = true;
                    }
                }
                self.fill_rulings();
                self.stroke_rulings();
                self.path.clear();
            },
            Operator::EndPath => self.path.clear(),
            Operator::Clip => {},

            Operator::Do { name } => self.paint_xobject(&name, resources, depth),
            Operator::InlineImage | Operator::NoOp { .. } => {},
            Operator::Other { name, .. } => {
                log::debug!("Page {}: unsupported operator '{}'", self.page.index, name);
                self.page.diagnostics.unsupported_operators += 1;
            },
        }
    }

    fn to_page(&self, x: f32, y: f32) -> Point {
        self.states.current().ctm.transform_point(x, y)
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.states.current().leading;
        self.move_line(0.0, -leading);
    }

    fn extend_path(&mut self, x: f32, y: f32, curved: bool) {
        let p = self.to_page(x, y);
        match self.path.last_mut() {
            Some(subpath) if !subpath.closed => subpath.points.push((p, curved)),
            Some(subpath) => {
                // After `h` the current point is the subpath's start.
                let start = subpath.points.first().map_or(p, |&(q, _)| q);
                self.path.push(Subpath {
                    points: vec![(start, false), (p, curved)],
                    closed: false,
                });
            },
            None => self.path.push(Subpath {
                points: vec![(p, false)],
                closed: false,
            }),
        }
    }

    fn stroke_rulings(&mut self) {
        let gs = self.states.current();
        let stroke_width = gs.line_width.max(0.0) * gs.ctm.mean_scale();
        if stroke_width > self.layout.ruling_max_width {
            return;
        }
        let min_length = self.layout.ruling_min_length;
        let mut found = Vec::new();
        for subpath in &self.path {
            for (a, b) in subpath.straight_segments() {
                let (dx, dy) = ((a.x - b.x).abs(), (a.y - b.y).abs());
                if dy <= AXIS_TOLERANCE && dx >= min_length && dx > 0.0 {
                    found.push(RulingLine::horizontal((a.y + b.y) / 2.0, a.x, b.x, stroke_width));
                } else if dx <= AXIS_TOLERANCE && dy >= min_length && dy > 0.0 {
                    found.push(RulingLine::vertical((a.x + b.x) / 2.0, a.y, b.y, stroke_width));
                }
            }
        }
        for ruling in found {
            self.page.push_ruling(ruling);
        }
    }

    fn fill_rulings(&mut self) {
        let max_width = self.layout.ruling_max_width;
        let min_length = self.layout.ruling_min_length;
        let mut found = Vec::new();
        for rect in self.path.iter().filter_map(Subpath::as_rect) {
            let (w, h) = (rect.width(), rect.height());
            if w >= h && h <= max_width && w >= min_length && w >= MIN_FILL_ASPECT * h {
                let y = (rect.y0 + rect.y1) / 2.0;
                found.push(RulingLine::horizontal(y, rect.x0, rect.x1, h));
            } else if h > w && w <= max_width && h >= min_length && h >= MIN_FILL_ASPECT * w {
                let x = (rect.x0 + rect.x1) / 2.0;
                found.push(RulingLine::vertical(x, rect.y0, rect.y1, w));
            }
        }
        for ruling in found {
            self.page.push_ruling(ruling);
        }
    }

    fn apply_ext_gstate(&mut self, name: &str, resources: &Dict) {
        let Some(Object::Dictionary(states)) = self.doc.resolve_entry(resources, "ExtGState") else {
            return;
        };
        let Some(Object::Dictionary(state)) = self.doc.resolve_entry(&states, name) else {
            log::debug!("ExtGState '{}' not found", name);
            return;
        };
        if let Some(width) = state.get("LW").and_then(Object::as_number) {
            self.states.current_mut().line_width = width as f32;
        }
    }

    fn current_font(&mut self, resources: &Dict, scope_fonts: &mut HashMap<String, Arc<Font>>) -> Arc<Font> {
        let Some(name) = self.states.current().font_name.clone() else {
            return Arc::new(Font::fallback());
        };
        if let Some(font) = scope_fonts.get(&name) {
            return Arc::clone(font);
        }
        let entry = match self.doc.resolve_entry(resources, "Font") {
            Some(Object::Dictionary(fonts)) => fonts.get(&name).cloned(),
            _ => None,
        };
        let font = match entry {
            Some(Object::Reference(r)) => match self.fonts.get(&r) {
                Some(font) => Arc::clone(font),
                None => {
                    let font = Arc::new(Font::load(self.doc, &Object::Reference(r)));
                    self.fonts.insert(r, Arc::clone(&font));
                    font
                },
            },
            Some(obj) => Arc::new(Font::load(self.doc, &obj)),
            None => {
                log::debug!("Font '{}' missing from resources, using fallback", name);
                Arc::new(Font::fallback())
            },
        };
        scope_fonts.insert(name, Arc::clone(&font));
        font
    }

    fn show(&mut self, bytes: &[u8], resources: &Dict, scope_fonts: &mut HashMap<String, Arc<Font>>) {
        let font = self.current_font(resources, scope_fonts);
        self.show_with(bytes, &font);
    }

    fn show_with(&mut self, bytes: &[u8], font: &Font) {
        let gs = self.states.current();
        let (tfs, th) = (gs.font_size, gs.horizontal_scaling);
        let (tc, tw, rise) = (gs.char_space, gs.word_space, gs.text_rise);
        let ctm = gs.ctm;
        let visible = !gs.is_invisible_text();

        for glyph in font.decode(bytes) {
            if visible {
                let trm = Matrix::from_array([tfs * th, 0.0, 0.0, tfs, 0.0, rise])
                    .multiply(&self.text_matrix)
                    .multiply(&ctm);
                self.place_glyph(&glyph, &trm);
            }
            let spacing = if glyph.is_word_space { tw } else { 0.0 };
            let tx = (glyph.width * tfs + tc + spacing) * th;
            self.text_matrix = Matrix::translation(tx, 0.0).multiply(&self.text_matrix);
        }
    }

    /// `TJ` adjustment in thousandths of an em; negative values move right.
    fn adjust(&mut self, offset: f32) {
        let gs = self.states.current();
        let shift = -offset / 1000.0;
        let tx = shift * gs.font_size * gs.horizontal_scaling;
        self.text_matrix = Matrix::translation(tx, 0.0).multiply(&self.text_matrix);
        if shift > self.layout.tj_split_em {
            self.flush();
        }
    }

    fn place_glyph(&mut self, glyph: &Glyph, trm: &Matrix) {
        if glyph.text.chars().all(char::is_whitespace) {
            self.flush();
            return;
        }
        let text: String = glyph.text.chars().filter(|c| !c.is_control()).collect();
        if text.is_empty() {
            return;
        }

        let size = trm.vertical_scale();
        if !(size > 0.0 && size.is_finite()) {
            return;
        }
        let w = glyph.width.max(MIN_GLYPH_WIDTH);
        let corners = [(0.0, DESCENT), (w, DESCENT), (w, ASCENT), (0.0, ASCENT)];
        let Some(bbox) = Rect::bounding(corners.iter().map(|&(x, y)| trm.transform_point(x, y))) else {
            return;
        };
        let origin = trm.transform_point(0.0, 0.0);

        if let Some(pending) = &self.pending {
            let gap = bbox.x0 - pending.end_x;
            let same_line = (origin.y - pending.baseline).abs() <= 0.2 * size;
            let same_size = (size - pending.font_size).abs() <= 0.1 * size;
            let adjacent = gap <= self.layout.tj_split_em * size && gap >= -0.5 * size;
            if !(same_line && same_size && adjacent) {
                self.flush();
            }
        }

        match &mut self.pending {
            Some(pending) => {
                pending.text.push_str(&text);
                pending.bbox = pending.bbox.union(&bbox);
                pending.end_x = bbox.x1;
            },
            None => {
                self.pending = Some(PendingFragment {
                    text,
                    bbox,
                    font_size: size,
                    baseline: origin.y,
                    end_x: bbox.x1,
                })
            },
        }
    }

    fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.page
                .push_fragment(pending.bbox, pending.text, pending.font_size, pending.baseline);
        }
    }

    fn paint_xobject(&mut self, name: &str, resources: &Dict, depth: usize) {
        let Some(Object::Dictionary(xobjects)) = self.doc.resolve_entry(resources, "XObject") else {
            log::debug!("Do '{}' without an XObject dictionary", name);
            return;
        };
        let Some(entry) = xobjects.get(name) else {
            log::debug!("XObject '{}' not found", name);
            return;
        };
        let object_ref = entry.as_reference();
        if let Some(r) = object_ref {
            if self.active_forms.contains(&r) {
                log::warn!("Page {}: form XObject {} paints itself, skipping", self.page.index, r);
                return;
            }
        }
        let xobject = match self.doc.resolve_object(entry) {
            Ok(obj) => obj,
            Err(e) => {
                log::warn!("Page {}: XObject '{}' unresolvable: {}", self.page.index, name, e);
                self.page.diagnostics.undecodable_streams += 1;
                return;
            },
        };
        let Object::Stream { dict, .. } = &xobject else {
            log::debug!("XObject '{}' is not a stream", name);
            return;
        };
        match dict.get("Subtype").and_then(Object::as_name) {
            Some("Form") => {},
            Some("Image") => return,
            other => {
                log::debug!("XObject '{}' has subtype {:?}, skipping", name, other);
                return;
            },
        }
        if depth >= MAX_FORM_DEPTH {
            log::warn!(
                "Page {}: form XObjects nested deeper than {}, skipping '{}'",
                self.page.index,
                MAX_FORM_DEPTH,
                name
            );
            return;
        }
        let data = match xobject.decode_stream_data() {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Page {}: form '{}' undecodable: {}", self.page.index, name, e);
                self.page.diagnostics.undecodable_streams += 1;
                return;
            },
        };

        let matrix = dict
            .get("Matrix")
            .and_then(Object::as_array)
            .map(|items| items.iter().filter_map(Object::as_number).collect::<Vec<_>>())
            .and_then(|values| Matrix::from_values(&values))
            .unwrap_or_default();
        let form_resources = match self.doc.resolve_entry(dict, "Resources") {
            Some(Object::Dictionary(d)) => d,
            _ => resources.clone(),
        };

        self.flush();
        let depth_before = self.states.depth();
        let (text_matrix, line_matrix) = (self.text_matrix, self.line_matrix);
        self.states.save();
        {
            let gs = self.states.current_mut();
            gs.ctm = matrix.multiply(&gs.ctm);
        }
        if let Some(r) = object_ref {
            self.active_forms.push(r);
        }

        self.run(&data, &form_resources, depth + 1);

        if object_ref.is_some() {
            self.active_forms.pop();
        }
        self.flush();
        while self.states.depth() > depth_before {
            if !self.states.restore() {
                break;
            }
        }
        self.text_matrix = text_matrix;
        self.line_matrix = line_matrix;
    }
}
