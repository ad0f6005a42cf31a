//! PDF object parser.
//!
//! Recursive descent over lexer tokens: composite objects (arrays,
//! dictionaries, streams) recurse into [`parse_object`]; an integer followed
//! by `gen R` becomes an indirect reference.

use crate::error::{Error, Result};
use crate::lexer::{is_whitespace, skip_whitespace, token, Token};
use crate::object::{Dict, Object, ObjectRef};
use nom::IResult;

/// Maximum nesting of arrays and dictionaries.
const MAX_NESTING: usize = 256;

/// Decode escape sequences in a literal string.
///
/// ```
/// # use pdf_tabula::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"a\\(b\\)\\101"), b"a(b)A");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let c = raw[i];
        if c != b'\\' || i + 1 >= raw.len() {
            // A bare CR or CRLF inside a string reads as LF.
            if c == b'\r' {
                out.push(b'\n');
                if raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            } else if c != b'\\' {
                out.push(c);
            }
            i += 1;
            continue;
        }

        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'(' | b')' | b'\\' => out.push(next),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut code = u32::from(next - b'0');
                let mut digits = 1;
                while digits < 3 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            code = code * 8 + u32::from(d - b'0');
                            i += 1;
                            digits += 1;
                        },
                        _ => break,
                    }
                }
                out.push((code & 0xFF) as u8);
            },
            // Unknown escapes drop the backslash.
            other => out.push(other),
        }
    }

    out
}

/// Decode a hex string body to bytes. Whitespace is ignored and an odd
/// trailing digit is padded with 0.
///
/// ```
/// # use pdf_tabula::parser::decode_hex;
/// assert_eq!(decode_hex(b"48 65 6C 6C 6F").unwrap(), b"Hello");
/// assert_eq!(decode_hex(b"7").unwrap(), vec![0x70]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(hex_bytes.len() / 2 + 1);
    let mut high: Option<u8> = None;

    for &c in hex_bytes {
        if is_whitespace(c) {
            continue;
        }
        let nibble = hex_value(c).ok_or_else(|| Error::ParseError {
            offset: 0,
            reason: format!("invalid hex digit 0x{:02X}", c),
        })?;
        match high.take() {
            Some(h) => out.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    Ok(out)
}

pub(crate) fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn fail(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Parse a single PDF object.
///
/// ```
/// use pdf_tabula::parser::parse_object;
/// use pdf_tabula::object::Object;
///
/// let (_, obj) = parse_object(b"<< /Type /Page /Count 3 >>").unwrap();
/// assert_eq!(obj.as_dict().unwrap().get("Count"), Some(&Object::Integer(3)));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_object_at_depth(input, 0)
}

fn parse_object_at_depth(input: &[u8], depth: usize) -> IResult<&[u8], Object> {
    if depth > MAX_NESTING {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }

    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),
        Token::Integer(i) => {
            if let Ok((after_gen, Token::Integer(gen))) = token(input) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if (0..=i64::from(u32::MAX)).contains(&i) && (0..=i64::from(u16::MAX)).contains(&gen) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(i as u32, gen as u16))));
                    }
                }
            }
            Ok((input, Object::Integer(i)))
        },
        Token::Real(r) => Ok((input, Object::Real(r))),
        Token::LiteralString(raw) => Ok((input, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(decoded) => Ok((input, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::HexDigit,
            ))),
        },
        Token::Name(name) => Ok((input, Object::Name(name))),
        Token::ArrayStart => parse_array(input, depth),
        Token::DictStart => {
            let (remaining, dict) = parse_dictionary(input, depth)?;
            if let Ok((stream_input, Token::StreamStart)) = token(remaining) {
                let (rest, data) = parse_stream_data(stream_input, &dict)?;
                return Ok((
                    rest,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::copy_from_slice(data),
                    },
                ));
            }
            Ok((remaining, Object::Dictionary(dict)))
        },
        _ => Err(fail(input)),
    }
}

/// Stream body following the `stream` keyword.
///
/// A direct `/Length` is trusted only when `endstream` follows it; otherwise
/// (indirect or wrong length) the body runs to the next `endstream`.
fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], &'a [u8]> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(|l| l.as_integer()) {
        if length >= 0 && (length as usize) <= input.len() {
            let length = length as usize;
            if let Ok((rest, Token::StreamEnd)) = token(&input[length..]) {
                return Ok((rest, &input[..length]));
            }
        }
        log::debug!("Stream /Length {} does not reach endstream, scanning", length);
    }

    match find_endstream(input) {
        Some(pos) => {
            let mut end = pos;
            // The EOL before endstream is not part of the data.
            if end > 0 && input[end - 1] == b'\n' {
                end -= 1;
            }
            if end > 0 && input[end - 1] == b'\r' {
                end -= 1;
            }
            let rest = &input[pos + b"endstream".len()..];
            Ok((rest, &input[..end]))
        },
        None => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof))),
    }
}

fn find_endstream(input: &[u8]) -> Option<usize> {
    input.windows(9).position(|w| w == b"endstream")
}

fn parse_array(input: &[u8], depth: usize) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::ArrayEnd)) => return Ok((rest, Object::Array(items))),
            Ok(_) => {
                let (rest, obj) = parse_object_at_depth(remaining, depth + 1)?;
                items.push(obj);
                remaining = rest;
            },
            // Unterminated at end of input: keep what was read.
            Err(_) if skip_whitespace(remaining).is_empty() => {
                return Ok((&remaining[remaining.len()..], Object::Array(items)))
            },
            Err(e) => return Err(e),
        }
    }
}

fn parse_dictionary(input: &[u8], depth: usize) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::DictEnd)) => return Ok((rest, dict)),
            Ok((rest, Token::Name(key))) => match parse_object_at_depth(rest, depth + 1) {
                Ok((after, value)) => {
                    dict.insert(key, value);
                    remaining = after;
                },
                // A key with no value before `>>` is dropped.
                Err(_) => match token(rest) {
                    Ok((after, Token::DictEnd)) => return Ok((after, dict)),
                    _ if skip_whitespace(rest).is_empty() => return Ok((&rest[rest.len()..], dict)),
                    _ => return Err(fail(rest)),
                },
            },
            Ok(_) => return Err(fail(remaining)),
            Err(_) if skip_whitespace(remaining).is_empty() => {
                return Ok((&remaining[remaining.len()..], dict))
            },
            Err(e) => return Err(e),
        }
    }
}

/// Parse `N G obj <object> endobj` and return the object with its reference.
///
/// A missing `endobj` is tolerated.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id) = match token(input)? {
        (rest, Token::Integer(n)) if n >= 0 => (rest, n as u32),
        (rest, _) => return Err(fail(rest)),
    };
    let (rest, gen) = match token(rest)? {
        (rest, Token::Integer(g)) if (0..=i64::from(u16::MAX)).contains(&g) => (rest, g as u16),
        (rest, _) => return Err(fail(rest)),
    };
    let rest = match token(rest)? {
        (rest, Token::ObjStart) => rest,
        (rest, _) => return Err(fail(rest)),
    };
    let (rest, obj) = parse_object(rest)?;
    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ => rest,
    };
    Ok((rest, (ObjectRef::new(id, gen), obj)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_lookahead() {
        let (_, obj) = parse_object(b"12 0 R").unwrap();
        assert_eq!(obj, Object::Reference(ObjectRef::new(12, 0)));

        let (rest, obj) = parse_object(b"12 0 ]").unwrap();
        assert_eq!(obj, Object::Integer(12));
        assert_eq!(rest, b" 0 ]");
    }

    #[test]
    fn test_array_with_references() {
        let (_, obj) = parse_object(b"[1 0 R 2 0 R /X 3.5]").unwrap();
        let arr = obj.as_array().unwrap();
        assert_eq!(arr.len(), 4);
        assert_eq!(arr[1], Object::Reference(ObjectRef::new(2, 0)));
        assert_eq!(arr[3], Object::Real(3.5));
    }

    #[test]
    fn test_nested_dictionary() {
        let (_, obj) = parse_object(b"<< /Font << /F1 5 0 R >> /Kids [] >>").unwrap();
        let dict = obj.as_dict().unwrap();
        let font = dict.get("Font").and_then(|f| f.as_dict()).unwrap();
        assert_eq!(font.get("F1"), Some(&Object::Reference(ObjectRef::new(5, 0))));
        assert_eq!(dict.get("Kids"), Some(&Object::Array(vec![])));
    }

    #[test]
    fn test_stream_with_length() {
        let input = b"<< /Length 5 >>\nstream\nhello\nendstream endobj";
        let (rest, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"hello"),
            other => panic!("expected stream, got {:?}", other),
        }
        assert_eq!(rest, b" endobj");
    }

    #[test]
    fn test_stream_with_wrong_length_scans() {
        let input = b"<< /Length 99 >>\nstream\nabc\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"abc"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_indirect_length_scans() {
        let input = b"<< /Length 8 0 R >>\r\nstream\r\nxyz\r\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"xyz"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_string_decoding() {
        assert_eq!(decode_literal_string_escapes(b"a\\nb"), b"a\nb");
        assert_eq!(decode_literal_string_escapes(b"\\247"), vec![0xA7]);
        assert_eq!(decode_literal_string_escapes(b"line\\\ncont"), b"linecont");
        assert_eq!(decode_literal_string_escapes(b"\\q"), b"q");
    }

    #[test]
    fn test_invalid_hex_rejected() {
        assert!(decode_hex(b"4G").is_err());
        assert!(parse_object(b"<4G>").is_err());
    }

    #[test]
    fn test_unterminated_array_returns_partial() {
        let (_, obj) = parse_object(b"[1 2 3").unwrap();
        assert_eq!(obj.as_array().map(|a| a.len()), Some(3));
    }

    #[test]
    fn test_dictionary_key_must_be_name() {
        assert!(parse_object(b"<< 1 2 >>").is_err());
    }

    #[test]
    fn test_indirect_object() {
        let (_, (r, obj)) = parse_indirect_object(b"7 0 obj\n<< /Type /Catalog >>\nendobj").unwrap();
        assert_eq!(r, ObjectRef::new(7, 0));
        assert!(obj.has_type("Catalog"));
    }

    #[test]
    fn test_excessive_nesting_fails() {
        let mut input = vec![b'['; MAX_NESTING + 10];
        input.extend(vec![b']'; MAX_NESTING + 10]);
        assert!(parse_object(&input).is_err());
    }
}
