// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::manual_find)]
#![allow(clippy::match_like_matches_macro)]

//! # PDF Tabula
//!
//! Layout-based table extraction from PDF documents.
//!
//! PDF pages carry no table markup: a table is only positioned text and a
//! few painted lines. This crate recovers rows, columns and merged cells
//! from that geometry and streams the result, page by page, to a sink.
//!
//! ## Pipeline
//!
//! ```text
//! bytes --[document]--> Document --[content]--> Page (fragments + rulings)
//!       --[layout]--> PageLayout (tables + text lines)
//!       --[output]--> RowSink (in page order)
//! ```
//!
//! - [`document`]: container parsing, cross-reference recovery, decryption
//! - [`content`]: content stream interpretation into text fragments and
//!   ruling lines
//! - [`layout`]: line grouping, table detection, cell reconstruction and
//!   confidence scoring
//! - [`output`]: the [`RowSink`](output::RowSink) contract, CSV and
//!   in-memory sinks, section number harvesting
//! - [`pipeline`]: parallel jobs with ordered reassembly
//! - [`monitor`]: progress, memory ceiling and cancellation
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_tabula::config::ExtractionConfig;
//! use pdf_tabula::output::CsvSink;
//! use pdf_tabula::pipeline::extract_document;
//!
//! # fn main() -> pdf_tabula::Result<()> {
//! let bytes = std::fs::read("journal.pdf")?;
//! let sink = CsvSink::create("journal.csv")?;
//! let report = extract_document(bytes, ExtractionConfig::default(), sink)?;
//! println!("{} rows from {} pages", report.rows_written, report.pages.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 (<http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license (<http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]

// Error handling
pub mod error;

// Options
pub mod config;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;
pub mod xref_reconstruction;

// Stream decoders
pub mod decoders;

// Encryption support
pub mod encryption;

// Content streams and fonts
pub mod content;
pub mod fonts;

// Geometry and page model
pub mod geometry;
pub mod page;

// Layout analysis
pub mod layout;

// Output
pub mod output;

// Jobs
pub mod monitor;
pub mod pipeline;

// Re-exports
pub use config::{ExtractionConfig, PageRange};
pub use document::{Document, EncryptionState};
pub use error::{Error, ErrorKind, Result};
pub use layout::{Cell, TableRegion};
pub use output::{RowSink, SinkError};
pub use page::{Page, RulingLine, TextFragment};
pub use pipeline::{extract_document, ExtractionJob, JobReport};

/// Floating point helpers.
pub mod utils {
    use std::cmp::Ordering;

    /// Safely compare two floating point numbers, handling NaN cases.
    ///
    /// NaN values are treated as equal to each other and greater than all other values.
    /// This ensures that sorting operations never panic due to NaN comparisons.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::cmp::Ordering;
    /// # use pdf_tabula::utils::safe_float_cmp;
    /// assert_eq!(safe_float_cmp(1.0, 2.0), Ordering::Less);
    /// assert_eq!(safe_float_cmp(f32::NAN, 1.0), Ordering::Greater);
    /// ```
    #[inline]
    pub fn safe_float_cmp(a: f32, b: f32) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater, // NaN > all numbers
            (false, true) => Ordering::Less,    // all numbers < NaN
            (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        }
    }

    /// Median of a non-empty slice, `None` when empty.
    pub fn median(values: &[f32]) -> Option<f32> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| safe_float_cmp(*a, *b));
        Some(sorted[sorted.len() / 2])
    }

}

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
