//! Cross-reference table parser.
//!
//! Maps object numbers to byte offsets (or object-stream slots). Handles
//! classic `xref` tables, cross-reference streams, hybrid files with
//! `/XRefStm`, and `/Prev` chains from incremental updates, where the
//! newest section wins.

use crate::error::{Error, Result};
use crate::lexer::{skip_whitespace, token, Token};
use crate::object::{Dict, Object};
use crate::parser::{parse_indirect_object, parse_object};
use std::collections::{HashMap, HashSet};

/// How an object is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free slot
    Free,
    /// Object at a byte offset in the file
    Uncompressed {
        /// Byte offset of `N G obj`
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Object inside an object stream
    Compressed {
        /// Object number of the containing stream
        stream: u32,
        /// Index within the stream
        index: u32,
    },
}

/// Merged cross-reference data plus the trailer dictionary.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Dict,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Trailer dictionary (empty when none was found).
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Replace the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = trailer;
    }

    /// All entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Number of in-use entries.
    pub fn in_use_count(&self) -> usize {
        self.entries.values().filter(|e| !matches!(e, XRefEntry::Free)).count()
    }

    /// Number of entries, including free ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries were read.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add entries from an older section; existing entries win.
    fn merge_older(&mut self, older: CrossRefTable) {
        for (num, entry) in older.entries {
            self.entries.entry(num).or_insert(entry);
        }
        for (key, value) in older.trailer {
            if key != "Prev" && key != "XRefStm" {
                self.trailer.entry(key).or_insert(value);
            }
        }
    }
}

/// Offset named by the last `startxref` in the file.
pub fn find_xref_offset(data: &[u8]) -> Result<u64> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let pos = tail
        .windows(9)
        .rposition(|w| w == b"startxref")
        .ok_or(Error::InvalidXref)?;

    match token(&tail[pos + 9..]) {
        Ok((_, Token::Integer(n))) if n >= 0 && (n as u64) < data.len() as u64 => Ok(n as u64),
        _ => Err(Error::InvalidXref),
    }
}

/// Parse the section at `offset` and every older section reachable from it.
pub fn parse_xref(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    parse_chain(data, offset, &mut visited)
}

fn parse_chain(data: &[u8], offset: u64, visited: &mut HashSet<u64>) -> Result<CrossRefTable> {
    if !visited.insert(offset) || visited.len() > 100 {
        return Err(Error::InvalidPdf(format!("xref /Prev loop at offset {}", offset)));
    }

    let start = usize::try_from(offset).map_err(|_| Error::InvalidXref)?;
    let section = data.get(start..).ok_or(Error::InvalidXref)?;
    let body = skip_whitespace(section);

    let mut table = if body.starts_with(b"xref") {
        parse_classic(&body[4..], start)?
    } else {
        parse_stream_section(section, start)?
    };
    log::debug!("xref section at {}: {} entries", offset, table.len());

    // Hybrid files: the classic trailer points at a stream with the
    // compressed entries, which override nothing in the classic table.
    if let Some(stm) = table.trailer.get("XRefStm").and_then(|o| o.as_integer()) {
        match parse_chain(data, stm as u64, visited) {
            Ok(extra) => table.merge_older(extra),
            Err(e) => log::warn!("Ignoring unreadable /XRefStm at {}: {}", stm, e),
        }
    }

    if let Some(prev) = table.trailer.get("Prev").and_then(|o| o.as_integer()) {
        match parse_chain(data, prev as u64, visited) {
            Ok(older) => table.merge_older(older),
            Err(e) => log::warn!("Ignoring unreadable /Prev section at {}: {}", prev, e),
        }
    }

    Ok(table)
}

/// Classic table: subsections `first count` followed by 20-byte rows,
/// then `trailer << ... >>`.
fn parse_classic(mut input: &[u8], base: usize) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();

    loop {
        input = skip_whitespace(input);
        if input.starts_with(b"trailer") {
            let (_, trailer) = parse_object(&input[7..]).map_err(|_| Error::ParseError {
                offset: base,
                reason: "unreadable trailer dictionary".to_string(),
            })?;
            match trailer {
                Object::Dictionary(d) => table.trailer = d,
                _ => return Err(Error::InvalidXref),
            }
            return Ok(table);
        }

        let (rest, first) = read_uint(input).ok_or(Error::InvalidXref)?;
        let (rest, count) = read_uint(skip_whitespace(rest)).ok_or(Error::InvalidXref)?;
        if count > 10_000_000 {
            return Err(Error::InvalidPdf(format!("xref subsection count {} too large", count)));
        }
        input = rest;

        for i in 0..count {
            input = skip_whitespace(input);
            let (rest, offset) = read_uint(input).ok_or(Error::InvalidXref)?;
            let (rest, gen) = read_uint(skip_whitespace(rest)).ok_or(Error::InvalidXref)?;
            let rest = skip_whitespace(rest);
            let kind = *rest.first().ok_or(Error::UnexpectedEof)?;
            input = &rest[1..];

            let num = u32::try_from(first + i).map_err(|_| Error::InvalidXref)?;
            let entry = match kind {
                b'n' => XRefEntry::Uncompressed {
                    offset,
                    generation: u16::try_from(gen).unwrap_or(u16::MAX),
                },
                b'f' => XRefEntry::Free,
                _ => return Err(Error::InvalidXref),
            };
            table.insert(num, entry);
        }
    }
}

fn read_uint(input: &[u8]) -> Option<(&[u8], u64)> {
    let end = input.iter().position(|c| !c.is_ascii_digit()).unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    let value = std::str::from_utf8(&input[..end]).ok()?.parse().ok()?;
    Some((&input[end..], value))
}

/// Cross-reference stream (`/Type /XRef`). Never encrypted.
fn parse_stream_section(section: &[u8], base: usize) -> Result<CrossRefTable> {
    let (_, (_, obj)) = parse_indirect_object(section).map_err(|_| Error::ParseError {
        offset: base,
        reason: "expected xref stream object".to_string(),
    })?;
    if !obj.has_type("XRef") {
        return Err(Error::InvalidXref);
    }
    let dict = obj.as_dict().cloned().unwrap_or_default();
    let data = obj.decode_stream_data()?;

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|w| w.as_array())
        .map(|arr| {
            arr.iter()
                .map(|v| v.as_integer().unwrap_or(0).clamp(0, 8) as usize)
                .collect()
        })
        .ok_or_else(|| Error::InvalidPdf("xref stream without /W".to_string()))?;
    if widths.len() != 3 {
        return Err(Error::InvalidPdf(format!("xref stream /W has {} fields", widths.len())));
    }
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(Error::InvalidPdf("xref stream /W is all zero".to_string()));
    }

    let size = dict.get("Size").and_then(|s| s.as_integer()).unwrap_or(0).max(0);
    let index: Vec<(u64, u64)> = match dict.get("Index").and_then(|i| i.as_array()) {
        Some(arr) => arr
            .chunks(2)
            .filter_map(|pair| match pair {
                [a, b] => Some((a.as_integer()?.max(0) as u64, b.as_integer()?.max(0) as u64)),
                _ => None,
            })
            .collect(),
        None => vec![(0, size as u64)],
    };

    let mut table = CrossRefTable::new();
    let mut rows = data.chunks_exact(row_len);
    'outer: for (first, count) in index {
        for i in 0..count {
            let Some(row) = rows.next() else { break 'outer };
            let (f0, rest) = row.split_at(widths[0]);
            let (f1, f2) = rest.split_at(widths[1]);
            // A missing type field defaults to 1.
            let kind = if widths[0] == 0 { 1 } else { read_be(f0) };
            let Ok(num) = u32::try_from(first + i) else { break 'outer };
            let entry = match kind {
                0 => XRefEntry::Free,
                1 => XRefEntry::Uncompressed {
                    offset: read_be(f1),
                    generation: u16::try_from(read_be(f2)).unwrap_or(0),
                },
                2 => XRefEntry::Compressed {
                    stream: u32::try_from(read_be(f1)).map_err(|_| Error::InvalidXref)?,
                    index: u32::try_from(read_be(f2)).map_err(|_| Error::InvalidXref)?,
                },
                // Unknown types are treated as null references.
                _ => XRefEntry::Free,
            };
            table.insert(num, entry);
        }
    }

    let mut trailer = dict;
    for key in ["Length", "Filter", "DecodeParms", "W", "Index", "Type"] {
        trailer.remove(key);
    }
    table.trailer = trailer;
    Ok(table)
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
