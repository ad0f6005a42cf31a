//! Layout analysis: from positioned fragments to tables and text lines.
//!
//! - [`lines`]: baseline grouping and line segmentation
//! - [`clustering`]: candidate table blocks and their grid boundaries
//! - [`reconstruction`]: fragment assignment, span merging and scoring
//! - [`table`]: the resulting [`TableRegion`]s
//!
//! [`LayoutAnalyzer::analyze`] runs all of them on one page.

pub mod clustering;
pub mod lines;
pub mod reconstruction;
pub mod table;

pub use clustering::{detect_skeletons, TableSkeleton};
pub use lines::{group_lines, join_text, TextLine};
pub use reconstruction::reconstruct;
pub use table::{BoundarySource, Cell, TableRegion};

use crate::config::{ExtractionConfig, LayoutConfig};
use crate::geometry::Rect;
use crate::output::OutputRow;
use crate::page::{FragmentId, Page, PageDiagnostics};
use crate::utils::safe_float_cmp;

/// A unit of page content in reading order.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutBlock {
    /// An emitted table
    Table(TableRegion),
    /// A line of free text
    Text {
        /// Line bounds
        bbox: Rect,
        /// Joined text
        text: String,
        /// Source fragments, left to right
        fragments: Vec<FragmentId>,
    },
}

impl LayoutBlock {
    /// Page-space bounds.
    pub fn bbox(&self) -> Rect {
        match self {
            LayoutBlock::Table(table) => table.bbox,
            LayoutBlock::Text { bbox, .. } => *bbox,
        }
    }
}

/// Analysis result for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    /// Zero-based page index
    pub page_index: usize,
    /// Blocks top to bottom, then left to right
    pub blocks: Vec<LayoutBlock>,
    /// Interpreter counters plus table counts
    pub diagnostics: PageDiagnostics,
}

impl PageLayout {
    /// Emitted tables in block order.
    pub fn tables(&self) -> impl Iterator<Item = &TableRegion> {
        self.blocks.iter().filter_map(|b| match b {
            LayoutBlock::Table(t) => Some(t),
            LayoutBlock::Text { .. } => None,
        })
    }

    /// Output rows in reading order.
    pub fn rows(&self) -> Vec<OutputRow> {
        let mut rows = Vec::new();
        for block in &self.blocks {
            match block {
                LayoutBlock::Table(table) => {
                    rows.extend(table.grid().into_iter().map(|cells| OutputRow::new(cells, true)));
                },
                LayoutBlock::Text { text, .. } => rows.push(OutputRow::new(vec![text.clone()], false)),
            }
        }
        rows
    }
}

/// Runs clustering and reconstruction on interpreted pages.
#[derive(Debug, Clone)]
pub struct LayoutAnalyzer {
    layout: LayoutConfig,
    recurrence_fraction: f32,
    confidence_threshold: f32,
}

impl LayoutAnalyzer {
    /// Create an analyzer.
    pub fn new(layout: LayoutConfig, recurrence_fraction: f32, confidence_threshold: f32) -> Self {
        Self {
            layout,
            recurrence_fraction,
            confidence_threshold,
        }
    }

    /// Create an analyzer from job options.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.layout.clone(), config.recurrence_fraction(), config.confidence_threshold)
    }

    /// Detect tables on `page` and lay out the rest as text lines.
    ///
    /// Tables scoring below the confidence threshold are demoted: their
    /// fragments are emitted as free text.
    pub fn analyze(&self, page: &Page) -> PageLayout {
        let mut diagnostics = page.diagnostics;
        let mut claimed = vec![false; page.fragments.len()];
        let mut blocks = Vec::new();

        for skeleton in detect_skeletons(page, &self.layout, self.recurrence_fraction) {
            let table = reconstruct(page, &skeleton, &self.layout);
            if table.confidence < self.confidence_threshold || !table.is_well_formed() {
                log::warn!(
                    "Page {}: demoting {}x{} table at y={:.1} (confidence {:.2})",
                    page.index,
                    table.rows,
                    table.columns,
                    table.bbox.y1,
                    table.confidence
                );
                diagnostics.demoted_tables += 1;
                continue;
            }
            for id in table.cells.iter().flat_map(|c| c.fragments.iter()) {
                claimed[id.0] = true;
            }
            diagnostics.emitted_tables += 1;
            blocks.push(LayoutBlock::Table(table));
        }

        let free: Vec<FragmentId> = page
            .fragments
            .iter()
            .filter(|f| !claimed[f.id.0])
            .map(|f| f.id)
            .collect();
        for line in group_lines(page, &free) {
            let text = line.text(page, self.layout.word_gap_factor);
            if text.is_empty() {
                continue;
            }
            blocks.push(LayoutBlock::Text {
                bbox: line.bbox,
                text,
                fragments: line.fragments,
            });
        }

        blocks.sort_by(|a, b| {
            let (a, b) = (a.bbox(), b.bbox());
            safe_float_cmp(b.y1, a.y1).then_with(|| safe_float_cmp(a.x0, b.x0))
        });

        log::debug!(
            "Page {}: {} blocks, {} tables, {} demoted",
            page.index,
            blocks.len(),
            diagnostics.emitted_tables,
            diagnostics.demoted_tables
        );
        PageLayout {
            page_index: page.index,
            blocks,
            diagnostics,
        }
    }
}
