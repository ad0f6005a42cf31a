//! Table block detection.
//!
//! Finds candidate table areas on a page and derives their row and column
//! boundaries. Boundaries come, in priority order, from ruling lines, from
//! whitespace gaps that recur at the same x-range across lines, and (rows
//! only) from the text lines themselves.
//!
//! Ruled blocks are found first: rulings are snapped to shared positions,
//! collinear pieces are joined, and rulings that cross are grouped with a
//! union-find. The remaining fragments are grouped into lines and scanned
//! for runs of multi-segment lines with recurring gaps.

use crate::config::LayoutConfig;
use crate::geometry::{interval_overlap, Rect};
use crate::layout::lines::{group_lines, TextLine};
use crate::layout::table::BoundarySource;
use crate::page::{FragmentId, Orientation, Page, RulingLine};
use crate::utils::safe_float_cmp;

/// Row and column boundaries for one candidate table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSkeleton {
    /// Table bounds
    pub bbox: Rect,
    /// Row boundaries, top to bottom (descending y); `rows + 1` entries
    pub row_bounds: Vec<f32>,
    /// Column boundaries, left to right; `columns + 1` entries
    pub column_bounds: Vec<f32>,
    /// Origin of the row boundaries
    pub row_source: BoundarySource,
    /// Origin of the column boundaries
    pub column_source: BoundarySource,
    /// Mean share of lines supporting each whitespace column gap
    pub column_support: f32,
    /// Rulings inside the block, snapped and joined
    pub rulings: Vec<RulingLine>,
    /// Fragments claimed by the block
    pub fragments: Vec<FragmentId>,
}

impl TableSkeleton {
    /// Grid rows.
    pub fn rows(&self) -> usize {
        self.row_bounds.len().saturating_sub(1)
    }

    /// Grid columns.
    pub fn columns(&self) -> usize {
        self.column_bounds.len().saturating_sub(1)
    }

    /// Mean of the row and column axis scores, before text is considered.
    pub fn structural_confidence(&self) -> f32 {
        (axis_score(self.row_source, 1.0) + axis_score(self.column_source, self.column_support)) / 2.0
    }
}

/// Evidence score of one grid axis.
pub fn axis_score(source: BoundarySource, support: f32) -> f32 {
    match source {
        BoundarySource::Rulings => 1.0,
        BoundarySource::Whitespace => 0.5 + 0.3 * support.clamp(0.0, 1.0),
        BoundarySource::Lines => 0.6,
    }
}

/// Find candidate tables on a page, top to bottom.
pub fn detect_skeletons(page: &Page, layout: &LayoutConfig, recurrence_fraction: f32) -> Vec<TableSkeleton> {
    let tol = layout.snap_tolerance;
    let rulings = join_rulings(snap_rulings(page.rulings.clone(), tol), tol);

    // Innermost blocks claim text first; a block nested inside another
    // keeps its area even when it yields no table.
    let mut blocks = ruled_blocks(&rulings, tol);
    blocks.sort_by(|a, b| safe_float_cmp(a.bbox.area(), b.bbox.area()));
    let areas: Vec<Rect> = blocks.iter().map(|b| b.bbox.expand(tol)).collect();

    let mut claimed = vec![false; page.fragments.len()];
    let mut skeletons = Vec::new();
    for (i, block) in blocks.into_iter().enumerate() {
        let area = areas[i];
        let nested: Vec<&Rect> = areas[..i].iter().filter(|inner| area.contains_rect(inner, tol)).collect();
        let ids: Vec<FragmentId> = page
            .fragments
            .iter()
            .filter(|f| {
                let c = f.centroid();
                !claimed[f.id.0] && area.contains_point(&c) && !nested.iter().any(|inner| inner.contains_point(&c))
            })
            .map(|f| f.id)
            .collect();
        if ids.is_empty() {
            continue;
        }
        if let Some(skeleton) = ruled_skeleton(page, block, ids, layout, recurrence_fraction) {
            for id in &skeleton.fragments {
                claimed[id.0] = true;
            }
            skeletons.push(skeleton);
        }
    }

    let free: Vec<FragmentId> = page
        .fragments
        .iter()
        .filter(|f| !claimed[f.id.0])
        .map(|f| f.id)
        .collect();
    let lines = group_lines(page, &free);
    skeletons.extend(whitespace_skeletons(page, &lines, layout, recurrence_fraction));

    skeletons.sort_by(|a, b| safe_float_cmp(b.bbox.y1, a.bbox.y1).then_with(|| safe_float_cmp(a.bbox.x0, b.bbox.x0)));
    skeletons
}

/// Align rulings of one orientation whose positions lie within `tolerance`
/// of each other to the cluster mean.
pub fn snap_rulings(rulings: Vec<RulingLine>, tolerance: f32) -> Vec<RulingLine> {
    let (mut horizontal, mut vertical): (Vec<_>, Vec<_>) = rulings
        .into_iter()
        .partition(|r| r.orientation == Orientation::Horizontal);
    snap_group(&mut horizontal, tolerance);
    snap_group(&mut vertical, tolerance);
    horizontal.extend(vertical);
    horizontal
}

fn snap_group(rulings: &mut [RulingLine], tolerance: f32) {
    rulings.sort_by(|a, b| safe_float_cmp(a.position(), b.position()));
    let mut start = 0;
    for i in 1..=rulings.len() {
        let end_of_cluster = i == rulings.len() || rulings[i].position() - rulings[start].position() > tolerance;
        if end_of_cluster && i > start {
            let mean = rulings[start..i].iter().map(RulingLine::position).sum::<f32>() / (i - start) as f32;
            for r in &mut rulings[start..i] {
                *r = at_position(r, mean);
            }
            start = i;
        }
    }
}

fn at_position(r: &RulingLine, position: f32) -> RulingLine {
    let (a, b) = r.span();
    match r.orientation {
        Orientation::Horizontal => RulingLine::horizontal(position, a, b, r.stroke_width),
        Orientation::Vertical => RulingLine::vertical(position, a, b, r.stroke_width),
    }
}

fn with_span(r: &RulingLine, a: f32, b: f32, stroke_width: f32) -> RulingLine {
    match r.orientation {
        Orientation::Horizontal => RulingLine::horizontal(r.position(), a, b, stroke_width),
        Orientation::Vertical => RulingLine::vertical(r.position(), a, b, stroke_width),
    }
}

/// Merge collinear rulings that overlap or whose gap is within `tolerance`.
/// Expects snapped input.
pub fn join_rulings(mut rulings: Vec<RulingLine>, tolerance: f32) -> Vec<RulingLine> {
    rulings.sort_by(|a, b| {
        (a.orientation == Orientation::Vertical)
            .cmp(&(b.orientation == Orientation::Vertical))
            .then_with(|| safe_float_cmp(a.position(), b.position()))
            .then_with(|| safe_float_cmp(a.span().0, b.span().0))
    });

    let mut joined: Vec<RulingLine> = Vec::with_capacity(rulings.len());
    for r in rulings {
        if let Some(last) = joined.last_mut() {
            let (start, end) = last.span();
            let (s, e) = r.span();
            let collinear = last.orientation == r.orientation && (last.position() - r.position()).abs() < 1e-3;
            if collinear && s <= end + tolerance {
                *last = with_span(last, start, end.max(e), last.stroke_width.max(r.stroke_width));
                continue;
            }
        }
        joined.push(r);
    }
    joined
}

/// Disjoint-set forest over ruling indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = rb.min(ra);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    /// Crossing horizontal and vertical rulings
    Grid,
    /// Parallel horizontal rulings with matching extents
    HorizontalStack,
    /// Parallel vertical rulings with matching extents
    VerticalStack,
}

#[derive(Debug, Clone)]
struct RuledBlock {
    kind: BlockKind,
    bbox: Rect,
    rulings: Vec<RulingLine>,
}

fn crosses(h: &RulingLine, v: &RulingLine, tol: f32) -> bool {
    let (hx0, hx1) = h.span();
    let (vy0, vy1) = v.span();
    let (x, y) = (v.position(), h.position());
    x >= hx0 - tol && x <= hx1 + tol && y >= vy0 - tol && y <= vy1 + tol
}

fn ruling_bounds(rulings: &[RulingLine]) -> Option<Rect> {
    Rect::bounding(rulings.iter().flat_map(|r| [r.start, r.end]))
}

/// Group rulings into blocks, top to bottom.
fn ruled_blocks(rulings: &[RulingLine], tol: f32) -> Vec<RuledBlock> {
    let mut sets = DisjointSet::new(rulings.len());
    for (i, a) in rulings.iter().enumerate() {
        for (j, b) in rulings.iter().enumerate().skip(i + 1) {
            let touching = match (a.orientation, b.orientation) {
                (Orientation::Horizontal, Orientation::Vertical) => crosses(a, b, tol),
                (Orientation::Vertical, Orientation::Horizontal) => crosses(b, a, tol),
                _ => false,
            };
            if touching {
                sets.union(i, j);
            }
        }
    }

    let mut groups: Vec<Vec<RulingLine>> = Vec::new();
    let mut group_of_root: Vec<Option<usize>> = vec![None; rulings.len()];
    for (i, r) in rulings.iter().enumerate() {
        let root = sets.find(i);
        match group_of_root[root] {
            Some(g) => groups[g].push(*r),
            None => {
                group_of_root[root] = Some(groups.len());
                groups.push(vec![*r]);
            },
        }
    }

    let mut blocks = Vec::new();
    let mut lone_horizontal = Vec::new();
    let mut lone_vertical = Vec::new();
    for group in groups {
        if group.len() == 1 {
            match group[0].orientation {
                Orientation::Horizontal => lone_horizontal.push(group[0]),
                Orientation::Vertical => lone_vertical.push(group[0]),
            }
            continue;
        }
        if let Some(bbox) = ruling_bounds(&group) {
            blocks.push(RuledBlock {
                kind: BlockKind::Grid,
                bbox,
                rulings: group,
            });
        }
    }
    blocks.extend(stack_parallel(lone_horizontal, tol, BlockKind::HorizontalStack));
    blocks.extend(stack_parallel(lone_vertical, tol, BlockKind::VerticalStack));
    blocks.sort_by(|a, b| safe_float_cmp(b.bbox.y1, a.bbox.y1).then_with(|| safe_float_cmp(a.bbox.x0, b.bbox.x0)));
    blocks
}

/// Stack lone parallel rulings whose extents match within `tol`.
fn stack_parallel(mut rulings: Vec<RulingLine>, tol: f32, kind: BlockKind) -> Vec<RuledBlock> {
    rulings.sort_by(|a, b| {
        safe_float_cmp(a.span().0, b.span().0)
            .then_with(|| safe_float_cmp(a.span().1, b.span().1))
            .then_with(|| safe_float_cmp(a.position(), b.position()))
    });
    let mut stacks: Vec<Vec<RulingLine>> = Vec::new();
    for r in rulings {
        let (s, e) = r.span();
        let existing = stacks.iter_mut().find(|stack| {
            let (s0, e0) = stack[0].span();
            (s - s0).abs() <= tol && (e - e0).abs() <= tol
        });
        match existing {
            Some(stack) => stack.push(r),
            None => stacks.push(vec![r]),
        }
    }
    stacks
        .into_iter()
        .filter(|stack| stack.len() >= 2)
        .filter_map(|stack| {
            ruling_bounds(&stack).map(|bbox| RuledBlock {
                kind,
                bbox,
                rulings: stack,
            })
        })
        .collect()
}

/// Distinct positions of one orientation plus the two block edges, sorted
/// ascending and deduplicated within `tol`.
fn ruling_positions(rulings: &[RulingLine], orientation: Orientation, edges: (f32, f32), tol: f32) -> Vec<f32> {
    let mut positions: Vec<f32> = rulings
        .iter()
        .filter(|r| r.orientation == orientation)
        .map(RulingLine::position)
        .collect();
    positions.push(edges.0);
    positions.push(edges.1);
    positions.sort_by(|a, b| safe_float_cmp(*a, *b));
    let mut out: Vec<f32> = Vec::with_capacity(positions.len());
    for p in positions {
        match out.last() {
            Some(&last) if p - last <= tol => {},
            _ => out.push(p),
        }
    }
    // Keep the far edge exact.
    if let Some(last) = out.last_mut() {
        *last = last.max(edges.1);
    }
    out
}

/// Rulings of one orientation whose extent covers `extent` within `tol`.
fn spanning_rulings(rulings: &[RulingLine], orientation: Orientation, extent: (f32, f32), tol: f32) -> usize {
    rulings
        .iter()
        .filter(|r| r.orientation == orientation)
        .filter(|r| {
            let (a, b) = r.span();
            a <= extent.0 + tol && b >= extent.1 - tol
        })
        .count()
}

fn ruled_skeleton(
    page: &Page,
    block: RuledBlock,
    ids: Vec<FragmentId>,
    layout: &LayoutConfig,
    recurrence_fraction: f32,
) -> Option<TableSkeleton> {
    let tol = layout.snap_tolerance;
    let bbox = block.bbox;
    let lines = group_lines(page, &ids);

    let vertical_positions = ruling_positions(&block.rulings, Orientation::Vertical, (bbox.x0, bbox.x1), tol);
    let ruled_columns = block.kind != BlockKind::HorizontalStack
        && spanning_rulings(&block.rulings, Orientation::Vertical, (bbox.y0, bbox.y1), tol) >= 2
        && vertical_positions.len() >= 3;
    let (column_bounds, column_source, column_support) = if ruled_columns {
        (vertical_positions, BoundarySource::Rulings, 1.0)
    } else {
        let (inner, support) = recurring_gaps(page, &lines, layout, recurrence_fraction)?;
        let mut bounds = vec![bbox.x0];
        bounds.extend(inner.into_iter().filter(|&x| x > bbox.x0 && x < bbox.x1));
        bounds.push(bbox.x1);
        (bounds, BoundarySource::Whitespace, support)
    };

    let mut row_bounds = ruling_positions(&block.rulings, Orientation::Horizontal, (bbox.y0, bbox.y1), tol);
    row_bounds.reverse();
    let mut row_source = BoundarySource::Rulings;
    let spanning_rows = spanning_rulings(&block.rulings, Orientation::Horizontal, (bbox.x0, bbox.x1), tol) >= 2;
    let ruled_rows_usable = spanning_rows
        && row_bounds.len() >= 3
        && match block.kind {
            BlockKind::Grid => true,
            BlockKind::HorizontalStack => row_bounds
                .windows(2)
                .all(|band| lines_in_band(&lines, band[1], band[0]) <= 1),
            BlockKind::VerticalStack => false,
        };
    if !ruled_rows_usable {
        if block.kind == BlockKind::HorizontalStack {
            // Leave multi-line bands to whitespace detection.
            return None;
        }
        row_bounds = line_row_bounds(&lines, bbox.y1, bbox.y0);
        row_source = BoundarySource::Lines;
    }

    let skeleton = TableSkeleton {
        bbox,
        row_bounds,
        column_bounds,
        row_source,
        column_source,
        column_support,
        rulings: block.rulings,
        fragments: ids,
    };
    if skeleton.rows() < 2 || skeleton.columns() < 2 {
        log::debug!(
            "Rejecting ruled block {}x{} at y={:.1}",
            skeleton.rows(),
            skeleton.columns(),
            bbox.y1
        );
        return None;
    }
    Some(skeleton)
}

fn lines_in_band(lines: &[TextLine], y0: f32, y1: f32) -> usize {
    lines
        .iter()
        .filter(|l| {
            let cy = l.bbox.center().y;
            cy > y0 && cy <= y1
        })
        .count()
}

/// Boundaries between consecutive lines, framed by `top` and `bottom`.
fn line_row_bounds(lines: &[TextLine], top: f32, bottom: f32) -> Vec<f32> {
    let mut bounds = vec![top];
    for pair in lines.windows(2) {
        let (upper, lower) = (&pair[0], &pair[1]);
        let mid = (upper.bbox.y0 + lower.bbox.y1) / 2.0;
        let y = if mid < upper.baseline && mid > lower.baseline {
            mid
        } else {
            (upper.baseline + lower.baseline) / 2.0
        };
        if bounds.last().is_some_and(|&last| y < last) && y > bottom {
            bounds.push(y);
        }
    }
    if bounds.last().is_some_and(|&last| bottom < last) {
        bounds.push(bottom);
    }
    bounds
}

/// Column gaps shared by the lines: interior boundary positions and the
/// mean support of the gaps, or `None` when no gap recurs.
pub fn recurring_gaps(
    page: &Page,
    lines: &[TextLine],
    layout: &LayoutConfig,
    recurrence_fraction: f32,
) -> Option<(Vec<f32>, f32)> {
    if lines.len() < 2 {
        return None;
    }
    let segments: Vec<Vec<(f32, f32)>> = lines
        .iter()
        .map(|l| {
            l.segments(page, layout.min_gap_factor * l.font_size)
                .iter()
                .map(|s| (s.x0, s.x1))
                .collect()
        })
        .collect();

    let mut points: Vec<f32> = segments.iter().flatten().flat_map(|&(a, b)| [a, b]).collect();
    points.sort_by(|a, b| safe_float_cmp(*a, *b));
    points.dedup_by(|a, b| (*a - *b).abs() < 1e-3);
    let (&left, &right) = (points.first()?, points.last()?);

    let mut sizes: Vec<f32> = lines.iter().map(|l| l.font_size).collect();
    sizes.sort_by(|a, b| safe_float_cmp(*a, *b));
    let median_size = sizes[sizes.len() / 2];
    let min_width = layout.min_gap_factor * median_size;

    let supports: Vec<f32> = points
        .windows(2)
        .map(|w| {
            let clear = segments
                .iter()
                .filter(|line| line.iter().all(|&(a, b)| interval_overlap(a, b, w[0], w[1]) <= 1e-3))
                .count();
            clear as f32 / lines.len() as f32
        })
        .collect();

    let mut boundaries = Vec::new();
    let mut run_supports = Vec::new();
    let mut i = 0;
    while i < supports.len() {
        if supports[i] < recurrence_fraction {
            i += 1;
            continue;
        }
        let start = i;
        let mut min_support = supports[i];
        while i + 1 < supports.len() && supports[i + 1] >= recurrence_fraction {
            i += 1;
            min_support = min_support.min(supports[i]);
        }
        let (x0, x1) = (points[start], points[i + 1]);
        let interior = x0 > left + 1e-3 && x1 < right - 1e-3;
        if interior && x1 - x0 >= min_width {
            boundaries.push((x0 + x1) / 2.0);
            run_supports.push(min_support);
        }
        i += 1;
    }

    if boundaries.is_empty() {
        return None;
    }
    let support = run_supports.iter().sum::<f32>() / run_supports.len() as f32;
    Some((boundaries, support))
}

/// Runs of consecutive multi-segment lines with recurring gaps.
fn whitespace_skeletons(
    page: &Page,
    lines: &[TextLine],
    layout: &LayoutConfig,
    recurrence_fraction: f32,
) -> Vec<TableSkeleton> {
    let mut skeletons = Vec::new();
    let mut run: Vec<TextLine> = Vec::new();
    for line in lines {
        let multi = line.segments(page, layout.min_gap_factor * line.font_size).len() >= 2;
        let continues = run.last().map_or(true, |prev: &TextLine| {
            prev.spacing_to(line) <= layout.max_line_spacing_factor * prev.font_size.max(line.font_size)
        });
        if !(multi && continues) {
            skeletons.extend(whitespace_block(page, &run, layout, recurrence_fraction));
            run.clear();
        }
        if multi {
            run.push(line.clone());
        }
    }
    skeletons.extend(whitespace_block(page, &run, layout, recurrence_fraction));
    skeletons
}

fn whitespace_block(
    page: &Page,
    lines: &[TextLine],
    layout: &LayoutConfig,
    recurrence_fraction: f32,
) -> Option<TableSkeleton> {
    if lines.len() < 2 {
        return None;
    }
    let (inner, support) = recurring_gaps(page, lines, layout, recurrence_fraction)?;
    let bbox = lines.iter().map(|l| l.bbox).reduce(|a, b| a.union(&b))?;

    let mut column_bounds = vec![bbox.x0];
    column_bounds.extend(inner);
    column_bounds.push(bbox.x1);
    let row_bounds = line_row_bounds(lines, bbox.y1, bbox.y0);

    let skeleton = TableSkeleton {
        bbox,
        row_bounds,
        column_bounds,
        row_source: BoundarySource::Lines,
        column_source: BoundarySource::Whitespace,
        column_support: support,
        rulings: Vec::new(),
        fragments: lines.iter().flat_map(|l| l.fragments.iter().copied()).collect(),
    };
    if skeleton.rows() < 2 || skeleton.columns() < 2 {
        return None;
    }
    log::debug!(
        "Whitespace block {}x{} at y={:.1}, gap support {:.2}",
        skeleton.rows(),
        skeleton.columns(),
        bbox.y1,
        support
    );
    Some(skeleton)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(page: &mut Page, text: &str, x: f32, baseline: f32) {
        let width = 5.0 * text.chars().count() as f32;
        page.push_fragment(
            Rect::new(x, baseline - 2.0, x + width, baseline + 8.0),
            text.to_string(),
            10.0,
            baseline,
        );
    }

    /// Three rows of two cells between x 100..300, rows 40pt high from y 700.
    fn ruled_page() -> Page {
        let mut page = Page::new(0, 612.0, 792.0);
        for y in [700.0, 660.0, 620.0, 580.0] {
            page.push_ruling(RulingLine::horizontal(y, 100.0, 300.0, 0.5));
        }
        for x in [100.0, 200.0, 300.0] {
            page.push_ruling(RulingLine::vertical(x, 580.0, 700.0, 0.5));
        }
        let cells = [("Name", "Age"), ("Alice", "30"), ("Bob", "25")];
        for (i, (a, b)) in cells.iter().enumerate() {
            let baseline = 675.0 - 40.0 * i as f32;
            frag(&mut page, a, 110.0, baseline);
            frag(&mut page, b, 210.0, baseline);
        }
        page
    }

    #[test]
    fn test_snap_and_join() {
        let rulings = vec![
            RulingLine::horizontal(100.0, 0.0, 50.0, 1.0),
            RulingLine::horizontal(101.0, 52.0, 100.0, 1.0),
            RulingLine::horizontal(200.0, 0.0, 100.0, 1.0),
            RulingLine::vertical(10.0, 0.0, 40.0, 1.0),
            RulingLine::vertical(10.0, 60.0, 90.0, 1.0),
        ];
        let joined = join_rulings(snap_rulings(rulings, 3.0), 3.0);
        assert_eq!(joined.len(), 4);
        assert_eq!(joined[0].position(), 100.5);
        assert_eq!(joined[0].span(), (0.0, 100.0));
        assert_eq!(joined[1].position(), 200.0);
        // The vertical pieces are 20pt apart and stay separate.
        assert_eq!(joined[2].span(), (0.0, 40.0));
    }

    #[test]
    fn test_ruled_grid_skeleton() {
        let page = ruled_page();
        let skeletons = detect_skeletons(&page, &LayoutConfig::default(), 0.7);
        assert_eq!(skeletons.len(), 1);
        let s = &skeletons[0];
        assert_eq!((s.rows(), s.columns()), (3, 2));
        assert_eq!(s.column_bounds, vec![100.0, 200.0, 300.0]);
        assert_eq!(s.row_bounds, vec![700.0, 660.0, 620.0, 580.0]);
        assert_eq!(s.row_source, BoundarySource::Rulings);
        assert_eq!(s.column_source, BoundarySource::Rulings);
        assert_eq!(s.structural_confidence(), 1.0);
        assert_eq!(s.fragments.len(), 6);
    }

    #[test]
    fn test_page_frame_does_not_swallow_inner_grid() {
        let mut page = ruled_page();
        for y in [20.0, 772.0] {
            page.push_ruling(RulingLine::horizontal(y, 20.0, 592.0, 0.5));
        }
        for x in [20.0, 592.0] {
            page.push_ruling(RulingLine::vertical(x, 20.0, 772.0, 0.5));
        }
        frag(&mut page, "Report", 72.0, 740.0);

        let skeletons = detect_skeletons(&page, &LayoutConfig::default(), 0.7);
        assert_eq!(skeletons.len(), 1);
        let s = &skeletons[0];
        assert_eq!((s.rows(), s.columns()), (3, 2));
        assert_eq!(s.row_source, BoundarySource::Rulings);
        assert_eq!(s.column_source, BoundarySource::Rulings);
        assert_eq!(s.fragments.len(), 6);
        assert_eq!(s.bbox, Rect::new(100.0, 580.0, 300.0, 700.0));
    }

    #[test]
    fn test_single_vertical_ruling_is_not_a_column_grid() {
        let mut page = Page::new(0, 612.0, 792.0);
        for y in [700.0, 660.0, 620.0, 580.0] {
            page.push_ruling(RulingLine::horizontal(y, 100.0, 300.0, 0.5));
        }
        page.push_ruling(RulingLine::vertical(200.0, 580.0, 700.0, 0.5));
        for (i, (a, b)) in [("Name", "Age"), ("Alice", "30"), ("Bob", "25")].iter().enumerate() {
            let baseline = 675.0 - 40.0 * i as f32;
            frag(&mut page, a, 110.0, baseline);
            frag(&mut page, b, 210.0, baseline);
        }

        let skeletons = detect_skeletons(&page, &LayoutConfig::default(), 0.7);
        assert_eq!(skeletons.len(), 1);
        let s = &skeletons[0];
        assert_eq!(s.column_source, BoundarySource::Whitespace);
        assert_eq!(s.row_source, BoundarySource::Rulings);
        assert_eq!(s.columns(), 2);
        assert!(s.structural_confidence() < 1.0);
    }

    #[test]
    fn test_partial_horizontal_rulings_do_not_define_rows() {
        let mut page = Page::new(0, 612.0, 792.0);
        page.push_ruling(RulingLine::horizontal(700.0, 100.0, 300.0, 0.5));
        // Interior rules cover only the left column.
        for y in [660.0, 620.0] {
            page.push_ruling(RulingLine::horizontal(y, 100.0, 200.0, 0.5));
        }
        for x in [100.0, 200.0, 300.0] {
            page.push_ruling(RulingLine::vertical(x, 580.0, 700.0, 0.5));
        }
        for (i, (a, b)) in [("Name", "Age"), ("Alice", "30"), ("Bob", "25")].iter().enumerate() {
            let baseline = 675.0 - 40.0 * i as f32;
            frag(&mut page, a, 110.0, baseline);
            frag(&mut page, b, 210.0, baseline);
        }

        let skeletons = detect_skeletons(&page, &LayoutConfig::default(), 0.7);
        assert_eq!(skeletons.len(), 1);
        let s = &skeletons[0];
        assert_eq!(s.column_source, BoundarySource::Rulings);
        assert_eq!(s.row_source, BoundarySource::Lines);
        assert_eq!(s.rows(), 3);
    }

    #[test]
    fn test_outline_only_box_uses_whitespace_and_lines() {
        let mut page = Page::new(0, 612.0, 792.0);
        for y in [700.0, 600.0] {
            page.push_ruling(RulingLine::horizontal(y, 100.0, 400.0, 0.5));
        }
        for x in [100.0, 400.0] {
            page.push_ruling(RulingLine::vertical(x, 600.0, 700.0, 0.5));
        }
        for (i, baseline) in [680.0, 665.0, 650.0].iter().enumerate() {
            frag(&mut page, &format!("item{}", i), 110.0, *baseline);
            frag(&mut page, "12", 300.0, *baseline);
        }
        let skeletons = detect_skeletons(&page, &LayoutConfig::default(), 0.7);
        assert_eq!(skeletons.len(), 1);
        let s = &skeletons[0];
        assert_eq!(s.column_source, BoundarySource::Whitespace);
        assert_eq!(s.row_source, BoundarySource::Lines);
        assert_eq!((s.rows(), s.columns()), (3, 2));
        assert!(s.structural_confidence() < 1.0);
    }

    #[test]
    fn test_whitespace_block() {
        let mut page = Page::new(0, 612.0, 792.0);
        frag(&mut page, "A paragraph of prose above the table", 72.0, 740.0);
        for (i, (a, b, c)) in [("Item", "Qty", "Price"), ("Apple", "3", "1.20"), ("Pear", "10", "0.80")]
            .iter()
            .enumerate()
        {
            let baseline = 700.0 - 14.0 * i as f32;
            frag(&mut page, a, 72.0, baseline);
            frag(&mut page, b, 200.0, baseline);
            frag(&mut page, c, 300.0, baseline);
        }
        let skeletons = detect_skeletons(&page, &LayoutConfig::default(), 0.7);
        assert_eq!(skeletons.len(), 1);
        let s = &skeletons[0];
        assert_eq!((s.rows(), s.columns()), (3, 3));
        assert_eq!(s.column_source, BoundarySource::Whitespace);
        assert_eq!(s.column_support, 1.0);
        // (0.8 + 0.6) / 2
        assert!((s.structural_confidence() - 0.7).abs() < 1e-6);
        assert_eq!(s.fragments.len(), 9);
    }

    #[test]
    fn test_prose_is_not_a_table() {
        let mut page = Page::new(0, 612.0, 792.0);
        frag(&mut page, "Lorem ipsum dolor sit amet", 72.0, 700.0);
        frag(&mut page, "consectetur adipiscing", 72.0, 686.0);
        assert!(detect_skeletons(&page, &LayoutConfig::default(), 0.7).is_empty());
    }

    #[test]
    fn test_gap_needs_recurrence() {
        let mut page = Page::new(0, 612.0, 792.0);
        // Only the first of three lines has a gap at x 130..200.
        frag(&mut page, "aaaaaa", 100.0, 700.0);
        frag(&mut page, "bb", 200.0, 700.0);
        frag(&mut page, "cccccccccccccccccccc", 100.0, 686.0);
        frag(&mut page, "dd", 250.0, 686.0);
        frag(&mut page, "eeeeeeeeeeeeeeeeeeee", 100.0, 672.0);
        frag(&mut page, "ff", 250.0, 672.0);
        let ids: Vec<FragmentId> = page.fragments.iter().map(|f| f.id).collect();
        let lines = group_lines(&page, &ids);
        let (bounds, support) = recurring_gaps(&page, &lines, &LayoutConfig::default(), 0.7).unwrap();
        // Only the 210..250 gap is shared by all lines.
        assert_eq!(bounds, vec![230.0]);
        assert_eq!(support, 1.0);
        assert!(recurring_gaps(&page, &lines[..1], &LayoutConfig::default(), 0.7).is_none());
    }

    #[test]
    fn test_booktabs_rules() {
        let mut page = Page::new(0, 612.0, 792.0);
        for y in [720.0, 700.0, 680.0] {
            page.push_ruling(RulingLine::horizontal(y, 72.0, 400.0, 0.8));
        }
        frag(&mut page, "Key", 80.0, 706.0);
        frag(&mut page, "Value", 300.0, 706.0);
        frag(&mut page, "alpha", 80.0, 686.0);
        frag(&mut page, "1", 300.0, 686.0);
        let skeletons = detect_skeletons(&page, &LayoutConfig::default(), 0.7);
        assert_eq!(skeletons.len(), 1);
        let s = &skeletons[0];
        assert_eq!(s.row_source, BoundarySource::Rulings);
        assert_eq!(s.column_source, BoundarySource::Whitespace);
        assert_eq!((s.rows(), s.columns()), (2, 2));
    }

    #[test]
    fn test_axis_scores() {
        assert_eq!(axis_score(BoundarySource::Rulings, 0.0), 1.0);
        assert_eq!(axis_score(BoundarySource::Lines, 1.0), 0.6);
        assert!((axis_score(BoundarySource::Whitespace, 0.5) - 0.65).abs() < 1e-6);
    }
}
