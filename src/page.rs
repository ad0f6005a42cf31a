//! Interpreted page content: positioned text fragments and ruling lines.
//!
//! A [`Page`] is produced once by the content interpreter and is read-only
//! afterwards. Tables refer to its fragments through [`FragmentId`]s, which
//! index into [`Page::fragments`].

use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Index of a fragment within its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FragmentId(pub usize);

/// A positioned run of text.
///
/// Invariant: `bbox.x1 > bbox.x0`, `bbox.y1 > bbox.y0`, and `text` is not
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    /// Position in paint order
    pub id: FragmentId,
    /// Bounding box in page space, origin bottom-left
    pub bbox: Rect,
    /// Unicode text
    pub text: String,
    /// Rendered font size in page units
    pub font_size: f32,
    /// Baseline y in page space
    pub baseline: f32,
}

impl TextFragment {
    /// Centre of the bounding box.
    pub fn centroid(&self) -> Point {
        self.bbox.center()
    }
}

/// Ruling orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Constant y
    Horizontal,
    /// Constant x
    Vertical,
}

/// A thin painted line, used as a table boundary hint.
///
/// `start` is the lower coordinate end: leftmost for horizontal lines,
/// bottom for vertical ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RulingLine {
    /// Lower end
    pub start: Point,
    /// Upper end
    pub end: Point,
    /// Orientation
    pub orientation: Orientation,
    /// Painted width in page units
    pub stroke_width: f32,
}

impl RulingLine {
    /// Horizontal ruling at `y` from `x0` to `x1`.
    pub fn horizontal(y: f32, x0: f32, x1: f32, stroke_width: f32) -> Self {
        Self {
            start: Point::new(x0.min(x1), y),
            end: Point::new(x0.max(x1), y),
            orientation: Orientation::Horizontal,
            stroke_width,
        }
    }

    /// Vertical ruling at `x` from `y0` to `y1`.
    pub fn vertical(x: f32, y0: f32, y1: f32, stroke_width: f32) -> Self {
        Self {
            start: Point::new(x, y0.min(y1)),
            end: Point::new(x, y0.max(y1)),
            orientation: Orientation::Vertical,
            stroke_width,
        }
    }

    /// Constant coordinate: y for horizontal, x for vertical.
    pub fn position(&self) -> f32 {
        match self.orientation {
            Orientation::Horizontal => self.start.y,
            Orientation::Vertical => self.start.x,
        }
    }

    /// Extent along the line: `(x0, x1)` or `(y0, y1)`.
    pub fn span(&self) -> (f32, f32) {
        match self.orientation {
            Orientation::Horizontal => (self.start.x, self.end.x),
            Orientation::Vertical => (self.start.y, self.end.y),
        }
    }

    /// Length of the line.
    pub fn length(&self) -> f32 {
        let (a, b) = self.span();
        b - a
    }
}

/// Per-page counters reported with the job result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDiagnostics {
    /// Malformed operators and byte runs skipped
    pub skipped_operators: usize,
    /// Operators the interpreter does not implement
    pub unsupported_operators: usize,
    /// Content streams or XObjects that could not be decoded
    pub undecodable_streams: usize,
    /// Table candidates demoted to free text
    pub demoted_tables: usize,
    /// Tables emitted
    pub emitted_tables: usize,
    /// Text fragments produced
    pub fragments: usize,
    /// Ruling lines produced
    pub rulings: usize,
}

impl PageDiagnostics {
    /// Component-wise sum.
    pub fn merge(&mut self, other: &PageDiagnostics) {
        self.skipped_operators += other.skipped_operators;
        self.unsupported_operators += other.unsupported_operators;
        self.undecodable_streams += other.undecodable_streams;
        self.demoted_tables += other.demoted_tables;
        self.emitted_tables += other.emitted_tables;
        self.fragments += other.fragments;
        self.rulings += other.rulings;
    }
}

/// One interpreted page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page index
    pub index: usize,
    /// Width in page units
    pub width: f32,
    /// Height in page units
    pub height: f32,
    /// Visible area with the origin moved to (0, 0)
    pub media_box: Rect,
    /// Fragments in paint order; `fragments[i].id == FragmentId(i)`
    pub fragments: Vec<TextFragment>,
    /// Ruling lines in paint order
    pub rulings: Vec<RulingLine>,
    /// Interpretation counters
    pub diagnostics: PageDiagnostics,
}

impl Page {
    /// Empty page of the given size.
    pub fn new(index: usize, width: f32, height: f32) -> Self {
        Self {
            index,
            width,
            height,
            media_box: Rect::new(0.0, 0.0, width, height),
            fragments: Vec::new(),
            rulings: Vec::new(),
            diagnostics: PageDiagnostics::default(),
        }
    }

    /// Append a fragment, assigning its id. Empty text or degenerate boxes
    /// are dropped.
    pub fn push_fragment(&mut self, bbox: Rect, text: String, font_size: f32, baseline: f32) -> Option<FragmentId> {
        if text.trim().is_empty() || bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return None;
        }
        let id = FragmentId(self.fragments.len());
        self.fragments.push(TextFragment {
            id,
            bbox,
            text,
            font_size,
            baseline,
        });
        self.diagnostics.fragments = self.fragments.len();
        Some(id)
    }

    /// Append a ruling line.
    pub fn push_ruling(&mut self, ruling: RulingLine) {
        self.rulings.push(ruling);
        self.diagnostics.rulings = self.rulings.len();
    }

    /// Look up a fragment by id.
    pub fn fragment(&self, id: FragmentId) -> Option<&TextFragment> {
        self.fragments.get(id.0)
    }
}
