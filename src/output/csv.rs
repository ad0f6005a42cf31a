//! CSV sink.
//!
//! Records follow RFC 4180: CRLF terminators, and fields quoted only when
//! they contain a delimiter, quote or line break. Rows may differ in width
//! since free-text lines carry a single cell.

use super::{RowSink, SinkError};
use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes rows as CSV records.
pub struct CsvSink<W: Write> {
    writer: ::csv::Writer<W>,
    page_column: bool,
    kind_column: bool,
}

impl<W: Write> CsvSink<W> {
    /// Sink writing cell texts only.
    pub fn new(inner: W) -> Self {
        let writer = ::csv::WriterBuilder::new()
            .flexible(true)
            .terminator(::csv::Terminator::CRLF)
            .from_writer(inner);
        Self {
            writer,
            page_column: false,
            kind_column: false,
        }
    }

    /// Prefix every record with the one-based page number.
    pub fn with_page_column(mut self, enabled: bool) -> Self {
        self.page_column = enabled;
        self
    }

    /// Prefix every record with `table` or `text`, after the page number.
    pub fn with_kind_column(mut self, enabled: bool) -> Self {
        self.kind_column = enabled;
        self
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> std::result::Result<W, SinkError> {
        self.writer.into_inner().map_err(|e| e.to_string().into())
    }
}

impl CsvSink<BufWriter<File>> {
    /// Create or truncate a CSV file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn append_row(&mut self, page_index: usize, row: &[String], is_table: bool) -> std::result::Result<(), SinkError> {
        let page = (page_index + 1).to_string();
        let mut fields: Vec<&str> = Vec::with_capacity(row.len() + 2);
        if self.page_column {
            fields.push(&page);
        }
        if self.kind_column {
            fields.push(if is_table { "table" } else { "text" });
        }
        fields.extend(row.iter().map(String::as_str));
        self.writer.write_record(&fields)?;
        Ok(())
    }

    fn finalize(&mut self) -> std::result::Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_quoting() {
        let mut sink = CsvSink::new(Vec::new());
        sink.append_row(0, &row(&["plain", "a,b", "say \"hi\""]), true).unwrap();
        sink.append_row(0, &row(&["two\nlines"]), false).unwrap();
        sink.finalize().unwrap();
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "plain,\"a,b\",\"say \"\"hi\"\"\"\r\n\"two\nlines\"\r\n");
    }

    #[test]
    fn test_page_and_kind_columns() {
        let mut sink = CsvSink::new(Vec::new()).with_page_column(true).with_kind_column(true);
        sink.append_row(0, &row(&["Name", "Age"]), true).unwrap();
        sink.append_row(2, &row(&["Footer"]), false).unwrap();
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "1,table,Name,Age\r\n3,text,Footer\r\n");
    }

    #[test]
    fn test_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path).unwrap();
        sink.append_row(0, &row(&["x", "y"]), true).unwrap();
        sink.finalize().unwrap();
        drop(sink);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x,y\r\n");
    }
}
