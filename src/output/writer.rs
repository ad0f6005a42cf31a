//! Page-ordered delivery of rows to a sink.

use super::{PageOutput, RowSink};
use crate::error::{Error, Result};
use crate::page::PageDiagnostics;
use crate::pipeline::reorder::ReorderBuffer;

/// Totals of what reached the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Pages fully written
    pub pages_written: usize,
    /// Rows written
    pub rows_written: usize,
    /// Table rows among them
    pub table_rows: usize,
    /// Duplicate page results dropped
    pub duplicates_dropped: usize,
}

/// Writes page results to a sink in ascending page order.
///
/// Results may arrive in any order. Each page is written at most once;
/// after the first sink failure every further call fails.
pub struct StreamingWriter<S: RowSink> {
    sink: S,
    buffer: ReorderBuffer<PageOutput>,
    stats: WriterStats,
    written: Vec<(usize, PageDiagnostics)>,
    failed: bool,
    finalized: bool,
}

impl<S: RowSink> StreamingWriter<S> {
    /// Writer whose first page is `first_page`.
    pub fn new(sink: S, first_page: usize) -> Self {
        Self {
            sink,
            buffer: ReorderBuffer::new(first_page),
            stats: WriterStats::default(),
            written: Vec::new(),
            failed: false,
            finalized: false,
        }
    }

    /// Accept a finished page and write every page that is now in order.
    /// Returns the number of pages written by this call.
    pub fn accept(&mut self, output: PageOutput) -> Result<usize> {
        let page = output.page_index;
        if self.failed {
            return Err(stopped(page));
        }
        if let Err(dup) = self.buffer.insert(page, output) {
            log::warn!("Dropping duplicate result for page {}", dup.page_index);
            self.stats.duplicates_dropped += 1;
            return Ok(0);
        }
        self.drain()
    }

    fn drain(&mut self) -> Result<usize> {
        let mut pages = 0;
        while let Some((page, output)) = self.buffer.pop_ready() {
            for row in &output.rows {
                if let Err(source) = self.sink.append_row(page, &row.cells, row.is_table) {
                    self.failed = true;
                    log::error!("Sink failed on page {}: {}", page, source);
                    return Err(Error::SinkWrite {
                        page: Some(page),
                        source,
                    });
                }
                self.stats.rows_written += 1;
                if row.is_table {
                    self.stats.table_rows += 1;
                }
            }
            self.stats.pages_written += 1;
            self.written.push((page, output.diagnostics));
            pages += 1;
        }
        Ok(pages)
    }

    /// Next page the writer is waiting for.
    pub fn next_page(&self) -> usize {
        self.buffer.next_page()
    }

    /// Pages held back for an earlier page.
    pub fn pending_pages(&self) -> usize {
        self.buffer.len()
    }

    /// Running totals.
    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Diagnostics of the pages written so far, in page order.
    pub fn written_pages(&self) -> &[(usize, PageDiagnostics)] {
        &self.written
    }

    /// The sink has failed.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Finalize the sink. Only the first call reaches the sink.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        if let Err(source) = self.sink.finalize() {
            self.failed = true;
            log::error!("Sink failed to finalize: {}", source);
            return Err(Error::SinkWrite { page: None, source });
        }
        Ok(())
    }

    /// Finalize and return the sink.
    pub fn into_inner(mut self) -> Result<S> {
        self.finalize()?;
        Ok(self.sink)
    }

    /// Shared access to the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

fn stopped(page: usize) -> Error {
    Error::SinkWrite {
        page: Some(page),
        source: "writer stopped after an earlier sink failure".into(),
    }
}
