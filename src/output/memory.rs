//! In-memory sink.

use super::{RowSink, SinkError};

/// A row captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRow {
    /// Zero-based page index
    pub page_index: usize,
    /// Cell texts
    pub cells: Vec<String>,
    /// Table row rather than free text
    pub is_table: bool,
}

/// Collects every row it is given.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Vec<RecordedRow>,
    finalized: bool,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows in arrival order.
    pub fn rows(&self) -> &[RecordedRow] {
        &self.rows
    }

    /// Take the collected rows.
    pub fn into_rows(self) -> Vec<RecordedRow> {
        self.rows
    }

    /// Table rows only.
    pub fn table_rows(&self) -> impl Iterator<Item = &RecordedRow> {
        self.rows.iter().filter(|r| r.is_table)
    }

    /// Distinct pages that produced rows, in arrival order.
    pub fn pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.rows.iter().map(|r| r.page_index).collect();
        pages.dedup();
        pages
    }

    /// `finalize` has been called.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl RowSink for MemorySink {
    fn append_row(&mut self, page_index: usize, row: &[String], is_table: bool) -> Result<(), SinkError> {
        self.rows.push(RecordedRow {
            page_index,
            cells: row.to_vec(),
            is_table,
        });
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        self.finalized = true;
        Ok(())
    }
}
