//! Grouping fragments into text lines.
//!
//! Two fragments share a line when their baselines differ by less than half
//! the smaller font size. Lines are returned top to bottom, and fragments
//! within a line left to right.

use crate::geometry::Rect;
use crate::page::{FragmentId, Page, TextFragment};
use crate::utils::safe_float_cmp;

/// A horizontal run of fragments sharing a baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    /// Fragments ordered left to right
    pub fragments: Vec<FragmentId>,
    /// Union of the fragment boxes
    pub bbox: Rect,
    /// Mean baseline
    pub baseline: f32,
    /// Largest font size on the line
    pub font_size: f32,
}

/// Fragments of a line separated from their neighbours by a wide gap.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSegment {
    /// Left edge
    pub x0: f32,
    /// Right edge
    pub x1: f32,
    /// Fragments ordered left to right
    pub fragments: Vec<FragmentId>,
}

/// True when two fragments belong on one line.
pub fn same_line(a: &TextFragment, b: &TextFragment) -> bool {
    (a.baseline - b.baseline).abs() < 0.5 * a.font_size.min(b.font_size)
}

/// Group the given fragments of `page` into lines, top to bottom.
///
/// Unknown ids are ignored.
pub fn group_lines(page: &Page, ids: &[FragmentId]) -> Vec<TextLine> {
    let mut frags: Vec<&TextFragment> = ids.iter().filter_map(|&id| page.fragment(id)).collect();
    frags.sort_by(|a, b| {
        safe_float_cmp(b.baseline, a.baseline)
            .then_with(|| safe_float_cmp(a.bbox.x0, b.bbox.x0))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut groups: Vec<Vec<&TextFragment>> = Vec::new();
    for frag in frags {
        match groups.last_mut() {
            Some(group) if group.first().is_some_and(|anchor| same_line(anchor, frag)) => group.push(frag),
            _ => groups.push(vec![frag]),
        }
    }

    groups
        .into_iter()
        .filter_map(|mut group| {
            group.sort_by(|a, b| safe_float_cmp(a.bbox.x0, b.bbox.x0).then_with(|| a.id.cmp(&b.id)));
            let bbox = group.iter().map(|f| f.bbox).reduce(|acc, b| acc.union(&b))?;
            let baseline = group.iter().map(|f| f.baseline).sum::<f32>() / group.len() as f32;
            let font_size = group.iter().map(|f| f.font_size).fold(0.0f32, f32::max);
            Some(TextLine {
                fragments: group.iter().map(|f| f.id).collect(),
                bbox,
                baseline,
                font_size,
            })
        })
        .collect()
}

impl TextLine {
    /// Split the line wherever the horizontal gap between consecutive
    /// fragments is at least `min_gap`.
    pub fn segments(&self, page: &Page, min_gap: f32) -> Vec<LineSegment> {
        let mut segments: Vec<LineSegment> = Vec::new();
        for frag in self.fragments.iter().filter_map(|&id| page.fragment(id)) {
            match segments.last_mut() {
                Some(seg) if frag.bbox.x0 - seg.x1 < min_gap => {
                    seg.x1 = seg.x1.max(frag.bbox.x1);
                    seg.fragments.push(frag.id);
                },
                _ => segments.push(LineSegment {
                    x0: frag.bbox.x0,
                    x1: frag.bbox.x1,
                    fragments: vec![frag.id],
                }),
            }
        }
        segments
    }

    /// The line's text; see [`join_text`].
    pub fn text(&self, page: &Page, word_gap_factor: f32) -> String {
        join_line(page, &self.fragments, word_gap_factor)
    }

    /// Vertical distance between two baselines.
    pub fn spacing_to(&self, other: &TextLine) -> f32 {
        (self.baseline - other.baseline).abs()
    }
}

/// Text of a set of fragments: lines top to bottom, fragments left to
/// right, separated by a space across lines and across gaps wider than
/// `word_gap_factor` times the font size.
pub fn join_text(page: &Page, ids: &[FragmentId], word_gap_factor: f32) -> String {
    let lines = group_lines(page, ids);
    let mut out = String::new();
    for line in &lines {
        let text = line.text(page, word_gap_factor);
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&text);
    }
    out
}

/// Join fragments already ordered left to right.
fn join_line(page: &Page, ids: &[FragmentId], word_gap_factor: f32) -> String {
    let mut out = String::new();
    let mut prev: Option<&TextFragment> = None;
    for frag in ids.iter().filter_map(|&id| page.fragment(id)) {
        let text = frag.text.trim();
        if text.is_empty() {
            continue;
        }
        if let Some(p) = prev {
            let gap = frag.bbox.x0 - p.bbox.x1;
            if gap > word_gap_factor * p.font_size.min(frag.font_size) && !out.ends_with(' ') {
                out.push(' ');
            }
        }
        out.push_str(text);
        prev = Some(frag);
    }
    out
}
