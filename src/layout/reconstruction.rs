//! Filling a table skeleton with text.
//!
//! Every fragment of the skeleton is assigned to exactly one grid position.
//! Cells separated by a missing ruling are then merged into spans, first
//! along rows and then along columns, so that no 2-D span is formed.

use crate::config::LayoutConfig;
use crate::geometry::{interval_overlap, Rect};
use crate::layout::clustering::TableSkeleton;
use crate::layout::lines::join_text;
use crate::layout::table::{BoundarySource, Cell, TableRegion};
use crate::page::{FragmentId, Orientation, Page, TextFragment};

/// Share of a fragment's area that must fall into a second cell for it to
/// count as straddling a boundary.
const STRADDLE_SHARE: f32 = 0.1;

/// Share of a border a ruling must cover to divide two cells.
const DIVIDER_COVERAGE: f32 = 0.5;

/// Assign the skeleton's fragments to cells, merge spans, and score the result.
pub fn reconstruct(page: &Page, skeleton: &TableSkeleton, layout: &LayoutConfig) -> TableRegion {
    let rows = skeleton.rows();
    let columns = skeleton.columns();
    let mut grid = Grid::new(rows, columns);

    let mut assigned = 0usize;
    let mut straddling = 0usize;
    for frag in skeleton.fragments.iter().filter_map(|&id| page.fragment(id)) {
        let (r, c, straddles) = locate(frag, skeleton);
        grid.fragments[r][c].push(frag.id);
        assigned += 1;
        if straddles {
            straddling += 1;
        }
    }

    let tol = layout.snap_tolerance;
    if layout.merge_policy.merges_rows() && skeleton.column_source == BoundarySource::Rulings {
        grid.merge_rows(|r, k| has_vertical_divider(skeleton, r, k, tol));
    }
    if layout.merge_policy.merges_columns() && skeleton.row_source == BoundarySource::Rulings {
        grid.merge_columns(|k, c| has_horizontal_divider(skeleton, k, c, tol));
    }

    let cells = grid.into_cells(page, layout.word_gap_factor);
    let filled = if cells.is_empty() {
        0.0
    } else {
        cells.iter().filter(|c| !c.text.is_empty()).count() as f32 / cells.len() as f32
    };
    let straddle_share = if assigned == 0 {
        0.0
    } else {
        straddling as f32 / assigned as f32
    };
    let confidence =
        (skeleton.structural_confidence() * (0.8 + 0.2 * filled) * (1.0 - 0.5 * straddle_share)).clamp(0.0, 1.0);

    log::debug!(
        "Reconstructed {}x{} table with {} cells, {} straddling fragments, confidence {:.2}",
        rows,
        columns,
        cells.len(),
        straddling,
        confidence
    );

    TableRegion {
        bbox: skeleton.bbox,
        rows,
        columns,
        cells,
        confidence,
        row_source: skeleton.row_source,
        column_source: skeleton.column_source,
    }
}

/// Bounds of grid position `(r, c)`.
fn cell_rect(skeleton: &TableSkeleton, r: usize, c: usize) -> Rect {
    Rect::new(
        skeleton.column_bounds[c],
        skeleton.row_bounds[r + 1],
        skeleton.column_bounds[c + 1],
        skeleton.row_bounds[r],
    )
}

/// Grid position for a fragment, and whether it straddles a boundary.
///
/// A fragment with a significant share in several cells goes to the cell
/// with the largest overlap, ties resolved topmost then leftmost. Otherwise
/// the cell holding its centroid wins.
fn locate(frag: &TextFragment, skeleton: &TableSkeleton) -> (usize, usize, bool) {
    let area = frag.bbox.area();
    let centroid = frag.centroid();
    let mut best: Option<(usize, usize, f32)> = None;
    let mut significant = 0usize;
    let mut centroid_cell = None;

    for r in 0..skeleton.rows() {
        for c in 0..skeleton.columns() {
            let rect = cell_rect(skeleton, r, c);
            let overlap = rect.overlap_area(&frag.bbox);
            if overlap > STRADDLE_SHARE * area {
                significant += 1;
            }
            if overlap > 0.0 && best.map_or(true, |(_, _, o)| overlap > o) {
                best = Some((r, c, overlap));
            }
            if centroid_cell.is_none() && rect.contains_point(&centroid) {
                centroid_cell = Some((r, c));
            }
        }
    }

    if significant > 1 {
        if let Some((r, c, _)) = best {
            return (r, c, true);
        }
    }
    if let Some((r, c)) = centroid_cell {
        return (r, c, false);
    }
    if let Some((r, c, _)) = best {
        return (r, c, false);
    }

    // Claimed through the snap margin but outside the grid.
    let row = skeleton
        .row_bounds
        .iter()
        .filter(|&&b| b >= centroid.y)
        .count()
        .saturating_sub(1)
        .min(skeleton.rows().saturating_sub(1));
    let col = skeleton
        .column_bounds
        .iter()
        .filter(|&&b| b <= centroid.x)
        .count()
        .saturating_sub(1)
        .min(skeleton.columns().saturating_sub(1));
    (row, col, false)
}

/// Length of the skeleton's rulings at `position` (within `tol`) inside
/// the interval `[a, b]`.
fn ruling_coverage(skeleton: &TableSkeleton, orientation: Orientation, position: f32, a: f32, b: f32, tol: f32) -> f32 {
    skeleton
        .rulings
        .iter()
        .filter(|r| r.orientation == orientation && (r.position() - position).abs() <= tol)
        .map(|r| {
            let (s, e) = r.span();
            interval_overlap(s, e, a, b)
        })
        .sum()
}

/// A vertical ruling separates columns `k - 1` and `k` in row `r`.
fn has_vertical_divider(skeleton: &TableSkeleton, r: usize, k: usize, tol: f32) -> bool {
    let (y0, y1) = (skeleton.row_bounds[r + 1], skeleton.row_bounds[r]);
    let x = skeleton.column_bounds[k];
    ruling_coverage(skeleton, Orientation::Vertical, x, y0, y1, tol) >= DIVIDER_COVERAGE * (y1 - y0)
}

/// A horizontal ruling separates rows `k - 1` and `k` in column `c`.
fn has_horizontal_divider(skeleton: &TableSkeleton, k: usize, c: usize, tol: f32) -> bool {
    let (x0, x1) = (skeleton.column_bounds[c], skeleton.column_bounds[c + 1]);
    let y = skeleton.row_bounds[k];
    ruling_coverage(skeleton, Orientation::Horizontal, y, x0, x1, tol) >= DIVIDER_COVERAGE * (x1 - x0)
}

/// Working state: fragments per position plus span bookkeeping.
struct Grid {
    rows: usize,
    columns: usize,
    fragments: Vec<Vec<Vec<FragmentId>>>,
    /// `(row_span, col_span)` of the cell anchored at each position
    spans: Vec<Vec<(usize, usize)>>,
    /// Position belongs to a span anchored elsewhere
    covered: Vec<Vec<bool>>,
}

impl Grid {
    fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            fragments: vec![vec![Vec::new(); columns]; rows],
            spans: vec![vec![(1, 1); columns]; rows],
            covered: vec![vec![false; columns]; rows],
        }
    }

    fn filled(&self, r: usize, c: usize) -> usize {
        usize::from(!self.fragments[r][c].is_empty())
    }

    /// Widen cells across columns; `divided(r, k)` reports a border between
    /// columns `k - 1` and `k`.
    fn merge_rows(&mut self, divided: impl Fn(usize, usize) -> bool) {
        for r in 0..self.rows {
            let mut c = 0;
            while c < self.columns {
                let mut end = c;
                let mut texts = self.filled(r, c);
                while end + 1 < self.columns && !divided(r, end + 1) {
                    let next = self.filled(r, end + 1);
                    if texts + next > 1 {
                        break;
                    }
                    texts += next;
                    end += 1;
                }
                for k in c + 1..=end {
                    let moved = std::mem::take(&mut self.fragments[r][k]);
                    self.fragments[r][c].extend(moved);
                    self.covered[r][k] = true;
                }
                self.spans[r][c].1 = end - c + 1;
                c = end + 1;
            }
        }
    }

    /// Lengthen 1-column cells down rows; `divided(k, c)` reports a border
    /// between rows `k - 1` and `k`.
    fn merge_columns(&mut self, divided: impl Fn(usize, usize) -> bool) {
        for c in 0..self.columns {
            let mut r = 0;
            while r < self.rows {
                if self.covered[r][c] || self.spans[r][c].1 != 1 {
                    r += 1;
                    continue;
                }
                let mut end = r;
                let mut texts = self.filled(r, c);
                while end + 1 < self.rows
                    && !self.covered[end + 1][c]
                    && self.spans[end + 1][c].1 == 1
                    && !divided(end + 1, c)
                {
                    let next = self.filled(end + 1, c);
                    if texts + next > 1 {
                        break;
                    }
                    texts += next;
                    end += 1;
                }
                for k in r + 1..=end {
                    let moved = std::mem::take(&mut self.fragments[k][c]);
                    self.fragments[r][c].extend(moved);
                    self.covered[k][c] = true;
                }
                self.spans[r][c].0 = end - r + 1;
                r = end + 1;
            }
        }
    }

    fn into_cells(self, page: &Page, word_gap_factor: f32) -> Vec<Cell> {
        let mut cells = Vec::new();
        for (r, row) in self.fragments.into_iter().enumerate() {
            for (c, mut fragments) in row.into_iter().enumerate() {
                if self.covered[r][c] {
                    continue;
                }
                fragments.sort();
                let (row_span, col_span) = self.spans[r][c];
                cells.push(Cell {
                    row: r,
                    col: c,
                    row_span,
                    col_span,
                    text: join_text(page, &fragments, word_gap_factor),
                    fragments,
                });
            }
        }
        cells
    }
}
