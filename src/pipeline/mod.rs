//! Parallel extraction jobs.
//!
//! ```text
//! [Dispatcher] --page index--> [Workers x N] --PageOutput--> [Writer]
//!      ^   ^                                                   |  |
//!      |   +------------------- idle worker -------------------+  |
//!      +----------------------- buffer slot ----------------------+
//! ```
//!
//! The dispatcher and the workers run on a dedicated rayon pool; the
//! writer runs on the calling thread. Each dispatched page takes two
//! permits. A worker permit is returned once the writer has received the
//! page's result and delivered whatever became ready, including the
//! monitor's page-boundary checks, so a page is only handed out after the
//! writer has seen every earlier result it could deliver. A buffer permit
//! is held until the page is delivered, so pages in flight plus pages
//! waiting for reassembly never exceed [`ExtractionConfig::buffered_pages`].
//! The dispatcher checks the cancellation token and the deadline after
//! taking both permits; pages already dispatched always complete.

pub mod extractor;
pub mod reorder;

pub use extractor::{LayoutExtractor, PageExtractor};
pub use reorder::ReorderBuffer;

use crate::config::ExtractionConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::monitor::{CancelReason, CancellationToken, Monitor, ProgressObserver};
use crate::output::{PageOutput, RowSink, StreamingWriter};
use crate::page::PageDiagnostics;
use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Diagnostics of one delivered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageReport {
    /// Zero-based page index
    pub page_index: usize,
    /// Counters for the page
    pub diagnostics: PageDiagnostics,
}

/// Summary of a finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    /// Pages selected by the page range
    pub pages_total: usize,
    /// Per-page diagnostics in page order
    pub pages: Vec<PageReport>,
    /// Sum of all page diagnostics
    pub totals: PageDiagnostics,
    /// Rows delivered to the sink
    pub rows_written: usize,
    /// Table rows among them
    pub table_rows: usize,
    /// Wall-clock time of the job
    pub elapsed: Duration,
    /// The document needed cross-reference recovery
    pub recovered: bool,
}

/// One extraction request: a document, options and a sink.
pub struct ExtractionJob<'a, S: RowSink> {
    doc: &'a Document,
    config: ExtractionConfig,
    sink: S,
    extractor: Box<dyn PageExtractor + 'a>,
    monitor: Monitor,
}

impl<'a, S: RowSink> ExtractionJob<'a, S> {
    /// Job using [`LayoutExtractor`] and a monitor built from `config`.
    pub fn new(doc: &'a Document, config: ExtractionConfig, sink: S) -> Self {
        Self {
            doc,
            extractor: Box::new(LayoutExtractor::new(&config)),
            monitor: Monitor::from_config(&config),
            config,
            sink,
        }
    }

    /// Replace the per-page processing.
    pub fn with_extractor(mut self, extractor: impl PageExtractor + 'a) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Replace the monitor.
    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Receive progress after every delivered page.
    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.monitor.add_observer(observer);
        self
    }

    /// Token that cancels this job from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.monitor.token().clone()
    }

    /// Run the job to completion.
    ///
    /// The sink is finalized in every case once the job has started. On
    /// cancellation the job fails with [`Error::ExtractionTimeout`] naming
    /// the first page that was not delivered, unless every page was.
    pub fn run(self) -> Result<JobReport> {
        let ExtractionJob {
            doc,
            config,
            sink,
            extractor,
            mut monitor,
        } = self;
        config.validate()?;

        let range = match config.page_range {
            Some(r) => r.resolve(doc.page_count()),
            None => 0..doc.page_count(),
        };
        let pages: Vec<usize> = range.clone().collect();
        let total = pages.len();
        let mut writer = StreamingWriter::new(sink, range.start);
        monitor.start();
        let started = Instant::now();
        let token = monitor.token().clone();

        let outcome = if total == 0 {
            log::info!("No pages selected");
            Ok(())
        } else {
            let workers = config.worker_count().min(total);
            let slots = config.buffered_pages();
            log::info!(
                "Extracting {} pages with {} workers, {} pages buffered",
                total,
                workers,
                slots
            );
            run_pages(doc, &pages, &*extractor, &mut writer, &mut monitor, workers, slots)
        };

        let finalized = writer.finalize();
        if let Err(e) = outcome {
            log::error!("Extraction failed: {}", e);
            if let Err(f) = finalized {
                log::error!("Sink finalize after failure also failed: {}", f);
            }
            return Err(e);
        }
        finalized?;

        if let Some(reason) = token.reason() {
            if writer.next_page() < range.end {
                let err = Error::ExtractionTimeout {
                    page: Some(writer.next_page()),
                    reason,
                };
                log::error!("{}", err);
                return Err(err);
            }
        }

        let stats = writer.stats();
        let mut totals = PageDiagnostics::default();
        let pages: Vec<PageReport> = writer
            .written_pages()
            .iter()
            .map(|&(page_index, diagnostics)| {
                totals.merge(&diagnostics);
                PageReport {
                    page_index,
                    diagnostics,
                }
            })
            .collect();
        let report = JobReport {
            pages_total: total,
            pages,
            totals,
            rows_written: stats.rows_written,
            table_rows: stats.table_rows,
            elapsed: started.elapsed(),
            recovered: doc.is_recovered(),
        };
        log::info!(
            "Extracted {} pages: {} rows ({} table rows), {} tables, {} demoted, {} skipped operators in {:?}",
            report.pages.len(),
            report.rows_written,
            report.table_rows,
            report.totals.emitted_tables,
            report.totals.demoted_tables,
            report.totals.skipped_operators,
            report.elapsed
        );
        Ok(report)
    }
}

/// Dispatch `pages` to the pool and write their results in order.
fn run_pages<S: RowSink>(
    doc: &Document,
    pages: &[usize],
    extractor: &dyn PageExtractor,
    writer: &mut StreamingWriter<S>,
    monitor: &mut Monitor,
    workers: usize,
    slots: usize,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers + 1)
        .thread_name(|i| format!("pdf-tabula-{}", i))
        .build()
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let token = monitor.token().clone();
    let deadline = monitor.deadline();
    let budget = monitor.budget();
    let total = pages.len();

    let (task_tx, task_rx) = bounded::<usize>(workers);
    let (result_tx, result_rx) = bounded::<(usize, Result<PageOutput>)>(slots);
    let (buffer_tx, buffer_rx) = permits(slots);
    let (idle_tx, idle_rx) = permits(workers);

    pool.in_place_scope(|scope| {
        let dispatch_token = token.clone();
        scope.spawn(move |_| {
            for &index in pages {
                if buffer_rx.recv().is_err() || idle_rx.recv().is_err() {
                    break;
                }
                if let (Some(deadline), Some(budget)) = (deadline, budget) {
                    if Instant::now() >= deadline {
                        dispatch_token.cancel(CancelReason::Timeout { budget });
                    }
                }
                if dispatch_token.is_cancelled() {
                    log::info!("Cancelled before page {}", index);
                    break;
                }
                if task_tx.send(index).is_err() {
                    break;
                }
            }
        });

        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move |_| {
                for index in task_rx.iter() {
                    let outcome = extract_one(doc, extractor, index);
                    if result_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        let mut failure: Option<Error> = None;
        let mut completed = 0usize;
        for (index, outcome) in result_rx.iter() {
            if failure.is_some() {
                let _ = buffer_tx.try_send(());
                let _ = idle_tx.try_send(());
                continue;
            }
            let written = outcome.and_then(|output| writer.accept(output));
            match written {
                Ok(pages_written) => {
                    for _ in 0..pages_written {
                        completed += 1;
                        monitor.page_completed(completed, total);
                        let _ = buffer_tx.try_send(());
                    }
                },
                Err(e) => {
                    log::debug!("Page {} failed, stopping dispatch", index);
                    token.cancel(CancelReason::Aborted);
                    failure = Some(e);
                    let _ = buffer_tx.try_send(());
                },
            }
            // Only now may the dispatcher hand out another page.
            let _ = idle_tx.try_send(());
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })
}

/// A channel pre-filled with `count` permits.
fn permits(count: usize) -> (Sender<()>, Receiver<()>) {
    let (tx, rx) = bounded::<()>(count);
    for _ in 0..count {
        let _ = tx.try_send(());
    }
    (tx, rx)
}

fn extract_one(doc: &Document, extractor: &dyn PageExtractor, index: usize) -> Result<PageOutput> {
    let Some(handle) = doc.page(index) else {
        return Err(Error::MalformedDocument {
            page: Some(index),
            reason: "page missing from page tree".to_string(),
        });
    };
    match catch_unwind(AssertUnwindSafe(|| extractor.extract(doc, handle))) {
        Ok(Ok(mut output)) => {
            output.page_index = index;
            Ok(output)
        },
        Ok(Err(e)) => Err(e.at_page(index)),
        Err(_) => Err(Error::MalformedDocument {
            page: Some(index),
            reason: "page processing panicked".to_string(),
        }),
    }
}

/// Load `data` and run a job over it with the default extractor.
///
/// The sink is finalized even when loading fails.
pub fn extract_document<S: RowSink>(
    data: impl Into<Bytes>,
    config: ExtractionConfig,
    mut sink: S,
) -> Result<JobReport> {
    let doc = match Document::load(data, config.password.as_deref()) {
        Ok(doc) => doc,
        Err(e) => {
            let err = e.into_malformed();
            log::error!("Extraction failed: {}", err);
            if let Err(f) = sink.finalize() {
                log::error!("Sink finalize after failure also failed: {}", f);
            }
            return Err(err);
        },
    };
    ExtractionJob::new(&doc, config, sink).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::testing::single_page_pdf;
    use crate::output::{MemorySink, OutputRow};

    fn table_pdf() -> Vec<u8> {
        let content = "0.5 w 100 700 m 300 700 l S 100 660 m 300 660 l S 100 620 m 300 620 l S \
                       100 620 m 100 700 l S 200 620 m 200 700 l S 300 620 m 300 700 l S \
                       BT /F1 10 Tf 110 675 Td (Name) Tj 100 0 Td (Age) Tj -100 -40 Td (Bob) Tj 100 0 Td (25) Tj ET";
        single_page_pdf(
            content,
            "<< /Font << /F1 5 0 R >> >>",
            &["<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>"],
        )
    }

    #[test]
    fn test_extract_document_single_page() {
        let mut sink = MemorySink::new();
        let report = extract_document(table_pdf(), ExtractionConfig::default(), &mut sink).unwrap();
        assert_eq!(report.pages_total, 1);
        assert_eq!(report.totals.emitted_tables, 1);
        let rows: Vec<Vec<String>> = sink.table_rows().map(|r| r.cells.clone()).collect();
        assert_eq!(rows, vec![vec!["Name", "Age"], vec!["Bob", "25"]]);
        assert!(sink.is_finalized());
    }

    #[test]
    fn test_load_failure_finalizes_sink() {
        let mut sink = MemorySink::new();
        let err = extract_document(b"not a pdf".to_vec(), ExtractionConfig::default(), &mut sink).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Malformed);
        assert!(sink.rows().is_empty());
        assert!(sink.is_finalized());
    }

    #[test]
    fn test_empty_page_range_still_finalizes() {
        let doc = Document::load(table_pdf(), None).unwrap();
        let mut sink = MemorySink::new();
        let config = ExtractionConfig::default().with_page_range(crate::config::PageRange::new(5, 9));
        let report = ExtractionJob::new(&doc, config, &mut sink).run().unwrap();
        assert_eq!(report.pages_total, 0);
        assert!(sink.rows().is_empty());
        assert!(sink.is_finalized());
    }

    #[test]
    fn test_extractor_error_carries_page() {
        let doc = Document::load(table_pdf(), None).unwrap();
        let mut sink = MemorySink::new();
        let failing = |_: &Document, _: &crate::document::PageHandle| -> Result<PageOutput> { Err(Error::InvalidXref) };
        let err = ExtractionJob::new(&doc, ExtractionConfig::default(), &mut sink)
            .with_extractor(failing)
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::MalformedDocument { page: Some(0), .. }));
        assert!(sink.is_finalized());
    }

    #[test]
    fn test_cancelled_before_start() {
        let doc = Document::load(table_pdf(), None).unwrap();
        let mut sink = MemorySink::new();
        let job = ExtractionJob::new(&doc, ExtractionConfig::default(), &mut sink);
        job.cancellation_token().cancel(CancelReason::Requested);
        let err = job.run().unwrap_err();
        assert!(matches!(
            err,
            Error::ExtractionTimeout {
                page: Some(0),
                reason: CancelReason::Requested
            }
        ));
    }

    #[test]
    fn test_custom_extractor_rows() {
        let doc = Document::load(table_pdf(), None).unwrap();
        let mut sink = MemorySink::new();
        let fixed = |_: &Document, page: &crate::document::PageHandle| -> Result<PageOutput> {
            Ok(PageOutput::new(
                page.index,
                vec![OutputRow::new(vec!["x".into()], false)],
                PageDiagnostics::default(),
            ))
        };
        let report = ExtractionJob::new(&doc, ExtractionConfig::default().with_workers(2), &mut sink)
            .with_extractor(fixed)
            .run()
            .unwrap();
        assert_eq!(report.rows_written, 1);
        assert_eq!(sink.rows()[0].cells, vec!["x".to_string()]);
    }
}
