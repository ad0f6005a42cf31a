//! Cross-reference reconstruction for damaged files.
//!
//! Used only when the regular xref data is unusable: the whole file is
//! scanned for `N G obj` headers, the last definition of an object number
//! wins, and a trailer is recovered from the last `trailer` dictionary (or a
//! cross-reference stream dictionary) naming a `/Root`, or synthesized from
//! the first `/Type /Catalog` object.

use crate::error::{Error, Result};
use crate::lexer::skip_whitespace;
use crate::object::{Dict, Object, ObjectRef};
use crate::parser::{parse_indirect_object, parse_object};
use crate::xref::{CrossRefTable, XRefEntry};
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    static ref RE_OBJ_HEADER: Regex =
        Regex::new(r"(?-u)\b(\d{1,10})[ \t\r\n\f\x00]+(\d{1,5})[ \t\r\n\f\x00]+obj\b").unwrap();
    static ref RE_TRAILER: Regex = Regex::new(r"(?-u)trailer[ \t\r\n\f\x00]*<<").unwrap();
}

/// Result of a linear scan.
#[derive(Debug)]
pub struct Reconstruction {
    /// Direct objects found, with the recovered trailer set
    pub table: CrossRefTable,
    /// Object numbers of `/Type /ObjStm` streams encountered
    pub object_streams: Vec<u32>,
}

/// Rebuild cross-reference data by scanning `data` end to end.
pub fn reconstruct_xref(data: &[u8]) -> Result<Reconstruction> {
    log::info!("Reconstructing xref by scanning {} bytes", data.len());

    let mut table = CrossRefTable::new();
    let mut found = 0usize;

    for caps in RE_OBJ_HEADER.captures_iter(data) {
        let (Some(whole), Some(num), Some(gen)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let (Some(num), Some(gen)) = (ascii_number::<u32>(num.as_bytes()), ascii_number::<u16>(gen.as_bytes())) else {
            continue;
        };

        // Headers must be followed by something that can start an object.
        let after = skip_whitespace(&data[whole.end()..]);
        let plausible = after.first().is_some_and(|&c| {
            matches!(c, b'<' | b'[' | b'(' | b'/' | b't' | b'f' | b'n' | b'-' | b'+' | b'.') || c.is_ascii_digit()
        });
        if !plausible {
            log::debug!("Skipping false object header at offset {}", whole.start());
            continue;
        }

        table.insert(
            num,
            XRefEntry::Uncompressed {
                offset: whole.start() as u64,
                generation: gen,
            },
        );
        found += 1;
    }

    if found == 0 {
        return Err(Error::InvalidPdf("no objects found during xref reconstruction".to_string()));
    }

    let mut object_streams = Vec::new();
    let mut catalog: Option<ObjectRef> = None;
    let mut stream_trailer: Option<Dict> = None;

    let mut offsets: Vec<(u32, u64, u16)> = table
        .entries()
        .filter_map(|(num, e)| match e {
            XRefEntry::Uncompressed { offset, generation } => Some((num, *offset, *generation)),
            _ => None,
        })
        .collect();
    offsets.sort_by_key(|&(_, offset, _)| offset);

    for (num, offset, gen) in offsets {
        let Ok((_, (_, obj))) = parse_indirect_object(&data[offset as usize..]) else {
            continue;
        };
        if obj.has_type("ObjStm") {
            object_streams.push(num);
        } else if obj.has_type("Catalog") && catalog.is_none() {
            catalog = Some(ObjectRef::new(num, gen));
        } else if obj.has_type("XRef") {
            if let Some(dict) = obj.as_dict().filter(|d| d.contains_key("Root")) {
                stream_trailer = Some(dict.clone());
            }
        }
    }

    let trailer = find_trailer(data)
        .or_else(|| {
            stream_trailer.map(|mut d| {
                for key in ["Length", "Filter", "DecodeParms", "W", "Index", "Type", "Prev"] {
                    d.remove(key);
                }
                d
            })
        })
        .or_else(|| {
            catalog.map(|root| {
                log::info!("Synthesizing trailer with /Root {}", root);
                let mut d = Dict::new();
                d.insert("Root".to_string(), Object::Reference(root));
                d
            })
        })
        .ok_or_else(|| Error::InvalidPdf("no trailer or catalog found during reconstruction".to_string()))?;

    table.set_trailer(trailer);
    log::info!(
        "Reconstructed xref with {} objects and {} object streams",
        found,
        object_streams.len()
    );

    Ok(Reconstruction { table, object_streams })
}

/// Last `trailer << ... >>` naming a `/Root`.
fn find_trailer(data: &[u8]) -> Option<Dict> {
    let mut best = None;
    for m in RE_TRAILER.find_iter(data) {
        let dict_start = m.end() - 2;
        if let Ok((_, Object::Dictionary(dict))) = parse_object(&data[dict_start..]) {
            if dict.contains_key("Root") {
                best = Some(dict);
            }
        }
    }
    best
}

fn ascii_number<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_objects_and_trailer() {
        let pdf = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
trailer\n<< /Size 3 /Root 1 0 R >>\n%%EOF";
        let rec = reconstruct_xref(pdf).unwrap();
        assert!(matches!(rec.table.get(1), Some(XRefEntry::Uncompressed { offset: 9, .. })));
        assert!(rec.table.get(2).is_some());
        assert_eq!(
            rec.table.trailer().get("Root"),
            Some(&Object::Reference(ObjectRef::new(1, 0)))
        );
    }

    #[test]
    fn test_last_definition_wins() {
        let pdf = b"%PDF-1.4\n3 0 obj\n(old)\nendobj\n3 0 obj\n(new)\nendobj\n\
1 0 obj << /Type /Catalog >> endobj\n";
        let rec = reconstruct_xref(pdf).unwrap();
        let Some(XRefEntry::Uncompressed { offset, .. }) = rec.table.get(3) else {
            panic!("object 3 missing");
        };
        let (_, (_, obj)) = parse_indirect_object(&pdf[*offset as usize..]).unwrap();
        assert_eq!(obj, Object::String(b"new".to_vec()));
    }

    #[test]
    fn test_trailer_synthesized_from_catalog() {
        let pdf = b"%PDF-1.4\n5 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
4 0 obj\n<< /Type /Catalog /Pages 5 0 R >>\nendobj\n";
        let rec = reconstruct_xref(pdf).unwrap();
        assert_eq!(
            rec.table.trailer().get("Root"),
            Some(&Object::Reference(ObjectRef::new(4, 0)))
        );
    }

    #[test]
    fn test_false_headers_skipped() {
        let pdf = b"%PDF-1.4\n(12 0 obj)\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";
        let rec = reconstruct_xref(pdf).unwrap();
        assert!(rec.table.get(12).is_none());
    }

    #[test]
    fn test_nothing_found() {
        assert!(reconstruct_xref(b"%PDF-1.4\ngarbage").is_err());
    }

    #[test]
    fn test_object_streams_recorded() {
        let pdf = b"%PDF-1.5\n1 0 obj << /Type /Catalog >> endobj\n\
6 0 obj\n<< /Type /ObjStm /N 0 /First 0 /Length 0 >>\nstream\n\nendstream\nendobj\n";
        let rec = reconstruct_xref(pdf).unwrap();
        assert_eq!(rec.object_streams, vec![6]);
    }
}
