//! Extraction job configuration.
//!
//! [`ExtractionConfig`] carries the per-request options (page range,
//! password, detection sensitivity, resource limits) and the layout
//! heuristics in [`LayoutConfig`]. Both can be built in code or read from
//! JSON:
//!
//! ```
//! use pdf_tabula::config::{DetectionSensitivity, ExtractionConfig, PageRange};
//!
//! let config = ExtractionConfig::from_json_str(r#"{"page_range": {"start": 0, "end": 4},
//!     "detection_sensitivity": "High", "confidence_threshold": 0.6}"#).unwrap();
//! assert_eq!(config.page_range, Some(PageRange::new(0, 4)));
//! assert_eq!(config.detection_sensitivity, DetectionSensitivity::High);
//! assert_eq!(config.recurrence_fraction(), 0.5);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inclusive, zero-based page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    /// First page
    pub start: usize,
    /// Last page, inclusive
    pub end: usize,
}

impl PageRange {
    /// Range `start..=end`.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Page indices selected from a document with `page_count` pages.
    /// Out-of-range ends are clamped; the result may be empty.
    pub fn resolve(&self, page_count: usize) -> std::ops::Range<usize> {
        if self.start >= page_count || self.end < self.start {
            return 0..0;
        }
        self.start..self.end.min(page_count - 1) + 1
    }
}

/// How readily whitespace alignment is taken as a column boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectionSensitivity {
    /// Gaps must recur in 85% of a block's lines
    Low,
    /// 70%
    #[default]
    Medium,
    /// 50%
    High,
}

impl DetectionSensitivity {
    /// Fraction of lines that must share a gap for it to count as recurring.
    pub fn recurrence_fraction(self) -> f32 {
        match self {
            DetectionSensitivity::Low => 0.85,
            DetectionSensitivity::Medium => 0.7,
            DetectionSensitivity::High => 0.5,
        }
    }

    /// Parse `low`, `medium` or `high`, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "low" => Some(DetectionSensitivity::Low),
            "medium" => Some(DetectionSensitivity::Medium),
            "high" => Some(DetectionSensitivity::High),
            _ => None,
        }
    }
}

/// Which adjacent empty cells may be merged into spanning cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpanMergePolicy {
    /// Never merge
    Disabled,
    /// Merge horizontally within a row
    RowsOnly,
    /// Merge vertically within a column
    ColumnsOnly,
    /// Merge within rows, then within columns among cells still unmerged
    #[default]
    RowsThenColumns,
}

impl SpanMergePolicy {
    /// Horizontal merging allowed.
    pub fn merges_rows(self) -> bool {
        matches!(self, SpanMergePolicy::RowsOnly | SpanMergePolicy::RowsThenColumns)
    }

    /// Vertical merging allowed.
    pub fn merges_columns(self) -> bool {
        matches!(self, SpanMergePolicy::ColumnsOnly | SpanMergePolicy::RowsThenColumns)
    }
}

/// Geometric thresholds for interpretation and clustering, in page units
/// unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Widest stroke or filled rectangle still treated as a ruling
    pub ruling_max_width: f32,
    /// Shortest ruling kept
    pub ruling_min_length: f32,
    /// Distance within which ruling ends and positions are snapped together
    pub snap_tolerance: f32,
    /// Narrowest column gap, as a multiple of the font size
    pub min_gap_factor: f32,
    /// Largest baseline distance between lines of one block, as a multiple
    /// of the font size
    pub max_line_spacing_factor: f32,
    /// Gap inside a cell rendered as a space, as a multiple of the font size
    pub word_gap_factor: f32,
    /// `TJ` adjustment, in em, that starts a new fragment
    pub tj_split_em: f32,
    /// Spanning-cell merge policy
    pub merge_policy: SpanMergePolicy,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            ruling_max_width: 3.0,
            ruling_min_length: 2.0,
            snap_tolerance: 3.0,
            min_gap_factor: 1.0,
            max_line_spacing_factor: 2.0,
            word_gap_factor: 0.15,
            tj_split_em: 0.2,
            merge_policy: SpanMergePolicy::default(),
        }
    }
}

/// Options for one extraction job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Pages to process; all pages when `None`
    pub page_range: Option<PageRange>,
    /// User or owner password
    #[serde(skip)]
    pub password: Option<String>,
    /// Whitespace-gap recurrence preset
    pub detection_sensitivity: DetectionSensitivity,
    /// Overrides the fraction implied by `detection_sensitivity`
    pub recurrence_fraction: Option<f32>,
    /// Cancel once resident memory exceeds this many bytes
    pub memory_ceiling_bytes: Option<u64>,
    /// Minimum time between memory samples; 0 samples at every page
    pub sample_interval_ms: u64,
    /// Tables scoring below this are emitted as free text
    pub confidence_threshold: f32,
    /// Whole-job wall-clock budget
    pub timeout_ms: Option<u64>,
    /// Worker threads; defaults to the available cores
    pub workers: Option<usize>,
    /// Pages in flight plus pages awaiting reassembly; defaults to twice the
    /// worker count
    pub max_buffered_pages: Option<usize>,
    /// Geometric thresholds
    pub layout: LayoutConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            page_range: None,
            password: None,
            detection_sensitivity: DetectionSensitivity::default(),
            recurrence_fraction: None,
            memory_ceiling_bytes: None,
            sample_interval_ms: 0,
            confidence_threshold: 0.5,
            timeout_ms: None,
            workers: None,
            max_buffered_pages: None,
            layout: LayoutConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Set the page range.
    pub fn with_page_range(mut self, range: PageRange) -> Self {
        self.page_range = Some(range);
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the detection sensitivity.
    pub fn with_sensitivity(mut self, sensitivity: DetectionSensitivity) -> Self {
        self.detection_sensitivity = sensitivity;
        self
    }

    /// Set the memory ceiling.
    pub fn with_memory_ceiling(mut self, bytes: u64) -> Self {
        self.memory_ceiling_bytes = Some(bytes);
        self
    }

    /// Set the confidence threshold.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the whole-job timeout.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis().min(u64::MAX as u128) as u64);
        self
    }

    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the page buffering bound.
    pub fn with_max_buffered_pages(mut self, pages: usize) -> Self {
        self.max_buffered_pages = Some(pages);
        self
    }

    /// Replace the layout thresholds.
    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    /// Effective recurrence fraction.
    pub fn recurrence_fraction(&self) -> f32 {
        self.recurrence_fraction
            .unwrap_or_else(|| self.detection_sensitivity.recurrence_fraction())
    }

    /// Effective worker count, at least 1.
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }

    /// Effective buffering bound, never below the worker count.
    pub fn buffered_pages(&self) -> usize {
        let workers = self.worker_count();
        self.max_buffered_pages.unwrap_or(workers * 2).max(workers)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(range) = self.page_range {
            if range.end < range.start {
                return Err(Error::Config(format!(
                    "page range end {} precedes start {}",
                    range.end, range.start
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if let Some(fraction) = self.recurrence_fraction {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(Error::Config(format!("recurrence fraction {} outside (0, 1]", fraction)));
            }
        }
        if self.workers == Some(0) {
            return Err(Error::Config("worker count must be at least 1".to_string()));
        }
        if self.max_buffered_pages == Some(0) {
            return Err(Error::Config("page buffer must hold at least 1 page".to_string()));
        }
        let layout = &self.layout;
        let positive = [
            ("ruling_max_width", layout.ruling_max_width),
            ("snap_tolerance", layout.snap_tolerance),
            ("min_gap_factor", layout.min_gap_factor),
            ("max_line_spacing_factor", layout.max_line_spacing_factor),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::Config(format!("{} must be positive, got {}", name, value)));
            }
        }
        let non_negative = [
            ("ruling_min_length", layout.ruling_min_length),
            ("word_gap_factor", layout.word_gap_factor),
            ("tj_split_em", layout.tj_split_em),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(Error::Config(format!("{} must not be negative, got {}", name, value)));
            }
        }
        Ok(())
    }
}
