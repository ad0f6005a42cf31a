//! Error types for the extraction engine.
//!
//! Every failure a job can surface belongs to one of four kinds: a malformed
//! document, a decryption failure, a cancellation (timeout, memory ceiling or
//! external request) and a sink failure. The container parser raises finer
//! grained variants internally; [`Error::kind`] folds them into the taxonomy
//! and [`Error::at_page`] normalizes them once they escape a job.

use crate::monitor::CancelReason;
use crate::object::ObjectRef;
use crate::output::SinkError;
use std::fmt;

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while loading or extracting a document.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Broken container structure that linear recovery could not repair.
    #[error("Malformed document{}: {reason}", PageSuffix(.page))]
    MalformedDocument {
        /// Page being processed when the problem surfaced, if any
        page: Option<usize>,
        /// Human-readable cause
        reason: String,
    },

    /// Wrong or missing password, or an unsupported security handler.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// The job was cancelled cooperatively.
    #[error("Extraction cancelled{}: {reason}", PageSuffix(.page))]
    ExtractionTimeout {
        /// First page that was not delivered to the sink
        page: Option<usize>,
        /// Why the job was cancelled
        reason: CancelReason,
    },

    /// The output sink rejected a row or failed to finalize.
    #[error("Sink write failed{}: {source}", PageSuffix(.page))]
    SinkWrite {
        /// Page whose rows were being written
        page: Option<usize>,
        /// Error reported by the sink
        #[source]
        source: SinkError,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: {0}")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Unexpected end of file
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Structural problem in the container
    Malformed,
    /// Security handler rejected the password
    Decryption,
    /// Cooperative cancellation
    Timeout,
    /// Output consumer failure
    Sink,
    /// Invalid configuration, raised before a job starts
    Config,
}

impl Error {
    /// Classify this error into the job-level taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decryption(_) => ErrorKind::Decryption,
            Error::ExtractionTimeout { .. } => ErrorKind::Timeout,
            Error::SinkWrite { .. } => ErrorKind::Sink,
            Error::Config(_) => ErrorKind::Config,
            Error::MalformedDocument { .. }
            | Error::InvalidHeader(_)
            | Error::ParseError { .. }
            | Error::InvalidXref
            | Error::ObjectNotFound(..)
            | Error::InvalidObjectType { .. }
            | Error::UnexpectedEof
            | Error::Io(_)
            | Error::Unsupported(_)
            | Error::InvalidPdf(_)
            | Error::Decode(_)
            | Error::CircularReference(_)
            | Error::RecursionLimitExceeded(_) => ErrorKind::Malformed,
        }
    }

    /// Page index attached to this error, when known.
    pub fn page(&self) -> Option<usize> {
        match self {
            Error::MalformedDocument { page, .. }
            | Error::ExtractionTimeout { page, .. }
            | Error::SinkWrite { page, .. } => *page,
            _ => None,
        }
    }

    /// Attach a page index, converting low-level container errors into
    /// [`Error::MalformedDocument`].
    ///
    /// An index that is already present is kept.
    pub fn at_page(self, index: usize) -> Error {
        match self {
            Error::MalformedDocument { page, reason } => Error::MalformedDocument {
                page: page.or(Some(index)),
                reason,
            },
            Error::ExtractionTimeout { page, reason } => Error::ExtractionTimeout {
                page: page.or(Some(index)),
                reason,
            },
            Error::SinkWrite { page, source } => Error::SinkWrite {
                page: page.or(Some(index)),
                source,
            },
            err @ (Error::Decryption(_) | Error::Config(_)) => err,
            other => Error::MalformedDocument {
                page: Some(index),
                reason: other.to_string(),
            },
        }
    }

    /// Convert a low-level error into [`Error::MalformedDocument`] without a page.
    pub fn into_malformed(self) -> Error {
        match self.kind() {
            ErrorKind::Malformed => match self {
                err @ Error::MalformedDocument { .. } => err,
                other => Error::MalformedDocument {
                    page: None,
                    reason: other.to_string(),
                },
            },
            _ => self,
        }
    }
}

/// Formats ` at page N` when a page index is known.
struct PageSuffix<'a>(&'a Option<usize>);

impl fmt::Display for PageSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(page) => write!(f, " at page {}", page),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_header_error() {
        let err = Error::InvalidHeader("NotAPDF".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid PDF header"));
        assert!(msg.contains("NotAPDF"));
    }

    #[test]
    fn test_parse_error() {
        let err = Error::ParseError {
            offset: 1234,
            reason: "invalid token".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("invalid token"));
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(10, 0);
        let msg = format!("{}", err);
        assert!(msg.contains("10 0 R"));
    }

    #[test]
    fn test_malformed_display_with_page() {
        let err = Error::MalformedDocument {
            page: Some(4),
            reason: "missing /Contents".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("at page 4"));
        assert!(msg.contains("missing /Contents"));

        let err = Error::MalformedDocument {
            page: None,
            reason: "no trailer".to_string(),
        };
        assert!(!format!("{}", err).contains("at page"));
    }

    #[test]
    fn test_low_level_errors_classify_as_malformed() {
        assert_eq!(Error::InvalidXref.kind(), ErrorKind::Malformed);
        assert_eq!(Error::UnexpectedEof.kind(), ErrorKind::Malformed);
        assert_eq!(Error::Decode("bad".into()).kind(), ErrorKind::Malformed);
        assert_eq!(Error::Decryption("bad".into()).kind(), ErrorKind::Decryption);
        assert_eq!(Error::Config("bad".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn test_at_page_normalizes() {
        let err = Error::ObjectNotFound(7, 0).at_page(2);
        match err {
            Error::MalformedDocument { page, reason } => {
                assert_eq!(page, Some(2));
                assert!(reason.contains("7 0 R"));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_at_page_keeps_existing_index() {
        let err = Error::MalformedDocument {
            page: Some(1),
            reason: "x".into(),
        }
        .at_page(9);
        assert_eq!(err.page(), Some(1));
    }

    #[test]
    fn test_at_page_leaves_decryption_alone() {
        let err = Error::Decryption("wrong password".into()).at_page(3);
        assert_eq!(err.kind(), ErrorKind::Decryption);
        assert_eq!(err.page(), None);
    }

    #[test]
    fn test_sink_error_source() {
        use std::error::Error as _;
        let err = Error::SinkWrite {
            page: Some(0),
            source: "disk full".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Sink);
        assert!(err.source().is_some());
        assert!(format!("{}", err).contains("disk full"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
