//! Per-page processing.

use crate::config::ExtractionConfig;
use crate::content::interpret_page;
use crate::document::{Document, PageHandle};
use crate::error::Result;
use crate::layout::{LayoutAnalyzer, PageLayout};
use crate::output::PageOutput;

/// Turns one page of a document into output rows.
///
/// Implementations are shared by all workers of a job.
pub trait PageExtractor: Sync {
    /// Process one page.
    fn extract(&self, doc: &Document, page: &PageHandle) -> Result<PageOutput>;
}

/// Interpret the content stream, then run layout analysis.
#[derive(Debug, Clone)]
pub struct LayoutExtractor {
    config: ExtractionConfig,
    analyzer: LayoutAnalyzer,
}

impl LayoutExtractor {
    /// Extractor using the layout settings of `config`.
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            config: config.clone(),
            analyzer: LayoutAnalyzer::from_config(config),
        }
    }

    /// Tables and text lines of one page.
    pub fn analyze_page(&self, doc: &Document, handle: &PageHandle) -> PageLayout {
        let page = interpret_page(doc, handle, &self.config.layout);
        self.analyzer.analyze(&page)
    }
}

impl PageExtractor for LayoutExtractor {
    fn extract(&self, doc: &Document, page: &PageHandle) -> Result<PageOutput> {
        Ok(self.analyze_page(doc, page).into())
    }
}

impl<F> PageExtractor for F
where
    F: Fn(&Document, &PageHandle) -> Result<PageOutput> + Sync,
{
    fn extract(&self, doc: &Document, page: &PageHandle) -> Result<PageOutput> {
        self(doc, page)
    }
}
