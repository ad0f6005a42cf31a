//! Row sinks and the page-ordered streaming writer.
//!
//! The engine hands every page's rows to a [`RowSink`], strictly in
//! ascending page order. [`StreamingWriter`] performs the reordering and
//! stops at the first sink failure.

pub mod csv;
pub mod harvest;
pub mod memory;
pub mod writer;

pub use self::csv::CsvSink;
pub use harvest::{HarvestReport, SectionHarvester, SectionMarkers};
pub use memory::{MemorySink, RecordedRow};
pub use writer::{StreamingWriter, WriterStats};

use crate::layout::PageLayout;
use crate::page::PageDiagnostics;

/// Error reported by a sink.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer of extracted rows.
///
/// `append_row` is called once per table row or free-text line, in page
/// order. `finalize` is called once after the last page, and also when the
/// job fails.
pub trait RowSink {
    /// Accept one row of cell texts.
    fn append_row(&mut self, page_index: usize, row: &[String], is_table: bool) -> Result<(), SinkError>;

    /// Flush and close the sink.
    fn finalize(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: RowSink + ?Sized> RowSink for &mut S {
    fn append_row(&mut self, page_index: usize, row: &[String], is_table: bool) -> Result<(), SinkError> {
        (**self).append_row(page_index, row, is_table)
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        (**self).finalize()
    }
}

impl<S: RowSink + ?Sized> RowSink for Box<S> {
    fn append_row(&mut self, page_index: usize, row: &[String], is_table: bool) -> Result<(), SinkError> {
        (**self).append_row(page_index, row, is_table)
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        (**self).finalize()
    }
}

/// Both sinks receive every row. The first failure wins; the second sink is
/// still finalized when the first fails to.
impl<A: RowSink, B: RowSink> RowSink for (A, B) {
    fn append_row(&mut self, page_index: usize, row: &[String], is_table: bool) -> Result<(), SinkError> {
        self.0.append_row(page_index, row, is_table)?;
        self.1.append_row(page_index, row, is_table)
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        let first = self.0.finalize();
        let second = self.1.finalize();
        first.and(second)
    }
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    /// Cell texts, left to right
    pub cells: Vec<String>,
    /// Row of a table rather than a free-text line
    pub is_table: bool,
}

impl OutputRow {
    /// Create a row.
    pub fn new(cells: Vec<String>, is_table: bool) -> Self {
        Self { cells, is_table }
    }
}

/// Everything the writer needs from one finished page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutput {
    /// Zero-based page index
    pub page_index: usize,
    /// Rows in reading order
    pub rows: Vec<OutputRow>,
    /// Counters recorded while the page was processed
    pub diagnostics: PageDiagnostics,
}

impl PageOutput {
    /// Create a page result.
    pub fn new(page_index: usize, rows: Vec<OutputRow>, diagnostics: PageDiagnostics) -> Self {
        Self {
            page_index,
            rows,
            diagnostics,
        }
    }
}

impl From<PageLayout> for PageOutput {
    fn from(layout: PageLayout) -> Self {
        Self {
            page_index: layout.page_index,
            rows: layout.rows(),
            diagnostics: layout.diagnostics,
        }
    }
}
