//! Object streams (`/Type /ObjStm`).
//!
//! The decoded stream starts with `/N` pairs of integers (object number,
//! offset relative to `/First`) followed by the objects themselves.
//! Objects inside an object stream are never individually encrypted, so the
//! caller decrypts the stream once and the members come out as plaintext.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::parse_object;

/// Parse an (already decrypted) object stream.
///
/// Entries keep their in-stream order so `index` values from a
/// cross-reference stream address them directly. Members that fail to parse
/// are logged and skipped.
pub fn parse_object_stream(stream_obj: &Object) -> Result<Vec<(u32, Object)>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };
    if let Some(kind) = dict.get("Type").and_then(|t| t.as_name()) {
        if kind != "ObjStm" {
            return Err(Error::InvalidPdf(format!("expected /Type /ObjStm, got /{}", kind)));
        }
    }

    let n = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .filter(|n| (0..=1_000_000).contains(n))
        .ok_or_else(|| Error::InvalidPdf("object stream without a valid /N".to_string()))? as usize;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .filter(|f| *f >= 0)
        .ok_or_else(|| Error::InvalidPdf("object stream without a valid /First".to_string()))? as usize;

    let decoded = stream_obj.decode_stream_data()?;
    if decoded.len() < first {
        return Err(Error::InvalidPdf(format!(
            "object stream is {} bytes but /First is {}",
            decoded.len(),
            first
        )));
    }

    let (header, body) = decoded.split_at(first);
    let pairs = read_pairs(header, n)?;
    let mut objects = Vec::with_capacity(pairs.len());

    for (num, offset) in pairs {
        let Some(slice) = body.get(offset..) else {
            log::warn!("Object {} offset {} is past the end of its object stream", num, offset);
            continue;
        };
        match parse_object(slice) {
            Ok((_, obj)) => objects.push((num, obj)),
            Err(e) => log::warn!("Failed to parse object {} in object stream: {:?}", num, e),
        }
    }

    Ok(objects)
}

fn read_pairs(mut header: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    for i in 0..count {
        let mut next = || -> Option<i64> {
            match token(header) {
                Ok((rest, Token::Integer(v))) if v >= 0 => {
                    header = rest;
                    Some(v)
                },
                _ => None,
            }
        };
        let (Some(num), Some(offset)) = (next(), next()) else {
            return Err(Error::ParseError {
                offset: 0,
                reason: format!("object stream header truncated at pair {}", i),
            });
        };
        let num = u32::try_from(num).map_err(|_| Error::InvalidPdf(format!("object number {} out of range", num)))?;
        pairs.push((num, offset as usize));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dict;

    fn objstm(n: i64, first: i64, data: &[u8]) -> Object {
        let mut dict = Dict::new();
        dict.insert("Type".into(), Object::Name("ObjStm".into()));
        dict.insert("N".into(), Object::Integer(n));
        dict.insert("First".into(), Object::Integer(first));
        Object::Stream {
            dict,
            data: bytes::Bytes::copy_from_slice(data),
        }
    }

    #[test]
    fn test_parse_members_in_order() {
        let header = b"10 0 11 6 ";
        let body = b"(abc) << /K 1 >>";
        let mut data = header.to_vec();
        data.extend_from_slice(body);
        let objects = parse_object_stream(&objstm(2, header.len() as i64, &data)).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0], (10, Object::String(b"abc".to_vec())));
        assert_eq!(objects[1].0, 11);
        assert!(objects[1].1.as_dict().is_some());
    }

    #[test]
    fn test_truncated_header() {
        let err = parse_object_stream(&objstm(2, 4, b"10 0")).unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }

    #[test]
    fn test_first_past_end() {
        assert!(parse_object_stream(&objstm(1, 100, b"1 0 null")).is_err());
    }

    #[test]
    fn test_wrong_type() {
        let mut obj = objstm(0, 0, b"");
        if let Object::Stream { dict, .. } = &mut obj {
            dict.insert("Type".into(), Object::Name("XRef".into()));
        }
        assert!(parse_object_stream(&obj).is_err());
    }
}
