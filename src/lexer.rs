//! PDF lexer (tokenizer).
//!
//! Splits a byte slice into the atomic units of PDF syntax: numbers,
//! literal and hexadecimal strings, names, keywords and delimiters.
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (`%` to end of line)
//! are skipped between tokens.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real number (e.g., 3.14, -2.5, .5)
    Real(f64),
    /// Raw literal string content, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Raw hex string content, whitespace preserved
    HexString(&'a [u8]),
    /// Name with `#XX` escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R` in an indirect reference
    R,
}

/// PDF whitespace characters (space, tab, CR, LF, NUL, form feed).
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Regular characters: anything that is neither whitespace nor a delimiter.
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) = take_while(is_whitespace)(input)?;
    if ws.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Space)));
    }
    Ok((remaining, ()))
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip any run of whitespace and comments.
pub fn skip_whitespace(input: &[u8]) -> &[u8] {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        return remaining;
    }
}

fn digit_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
}

/// Integers (`42`, `-7`, `+3`) and reals (`3.14`, `.5`, `4.`, `-.002`).
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let start = input;
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && !matches!(frac_part, Some(Some(_))) {
        return Err(digit_error(start));
    }

    let negative = sign == Some('-');
    match frac_part {
        Some(frac) => {
            let mut text = String::with_capacity(24);
            if negative {
                text.push('-');
            }
            text.push_str(int_part.and_then(|d| std::str::from_utf8(d).ok()).unwrap_or("0"));
            text.push('.');
            text.push_str(frac.and_then(|d| std::str::from_utf8(d).ok()).unwrap_or("0"));
            let num: f64 = text.parse().map_err(|_| digit_error(start))?;
            Ok((input, Token::Real(num)))
        },
        None => {
            let digits = int_part
                .and_then(|d| std::str::from_utf8(d).ok())
                .ok_or_else(|| digit_error(start))?;
            match digits.parse::<i64>() {
                Ok(n) => Ok((input, Token::Integer(if negative { -n } else { n }))),
                // Out-of-range integers degrade to reals.
                Err(_) => {
                    let n: f64 = digits.parse().map_err(|_| digit_error(start))?;
                    Ok((input, Token::Real(if negative { -n } else { n })))
                },
            }
        },
    }
}

/// Literal string with balanced parentheses; escapes are skipped, not decoded.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (remaining, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    if depth != 0 || pos > remaining.len() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    Ok((&remaining[pos..], Token::LiteralString(&remaining[..pos - 1])))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#XX` escape sequences in a name.
///
/// ```
/// # use pdf_tabula::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes("A#20B"), "A B");
/// assert_eq!(decode_name_escapes("A#"), "A#");
/// ```
pub fn decode_name_escapes(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'#' {
            if let Some(byte) = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|e| e.into_bytes().iter().map(|&b| b as char).collect())
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(is_regular), |raw: &[u8]| {
            let text: String = raw.iter().map(|&b| b as char).collect();
            Token::Name(decode_name_escapes(&text))
        }),
    )(input)
}

/// A keyword only matches when it is not the prefix of a longer token.
fn keyword<'a>(word: &'static [u8], tok: Token<'static>) -> impl Fn(&'a [u8]) -> IResult<&'a [u8], Token<'a>> {
    move |input: &'a [u8]| {
        let (rest, _) = tag(word)(input)?;
        if rest.first().is_some_and(|&c| is_regular(c)) {
            return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
        }
        Ok((rest, tok.clone()))
    }
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        keyword(b"false", Token::False),
        keyword(b"true", Token::True),
        keyword(b"null", Token::Null),
        keyword(b"obj", Token::ObjStart),
        keyword(b"endobj", Token::ObjEnd),
        keyword(b"endstream", Token::StreamEnd),
        keyword(b"stream", Token::StreamStart),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        keyword(b"R", Token::R),
    ))(input)
}

/// Parse a single token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_whitespace(input);
    alt((parse_keyword, parse_name, parse_number, parse_literal_string, parse_hex_string))(input)
}

/// Parse tokens until the input is exhausted or no token matches.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    many0(token)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-17 "), Ok((&b" "[..], Token::Integer(-17))));
        assert_eq!(token(b"+3"), Ok((&b""[..], Token::Integer(3))));
    }

    #[test]
    fn test_reals() {
        assert_eq!(token(b"2.5"), Ok((&b""[..], Token::Real(2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"4."), Ok((&b""[..], Token::Real(4.0))));
        assert_eq!(token(b"-.25"), Ok((&b""[..], Token::Real(-0.25))));
    }

    #[test]
    fn test_lone_sign_is_not_a_number() {
        assert!(token(b"-").is_err());
        assert!(token(b".").is_err());
    }

    #[test]
    fn test_literal_string_nesting_and_escapes() {
        assert_eq!(
            token(b"(a (b) c)"),
            Ok((&b""[..], Token::LiteralString(b"a (b) c")))
        );
        assert_eq!(
            token(b"(x\\)y)"),
            Ok((&b""[..], Token::LiteralString(b"x\\)y")))
        );
        assert!(token(b"(unterminated").is_err());
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(token(b"<48 65>"), Ok((&b""[..], Token::HexString(b"48 65"))));
        assert_eq!(token(b"<<"), Ok((&b""[..], Token::DictStart)));
    }

    #[test]
    fn test_names() {
        assert_eq!(token(b"/Type"), Ok((&b""[..], Token::Name("Type".into()))));
        assert_eq!(token(b"/A#20B/C"), Ok((&b"/C"[..], Token::Name("A B".into()))));
        assert_eq!(token(b"/ "), Ok((&b" "[..], Token::Name(String::new()))));
    }

    #[test]
    fn test_keywords_require_boundary() {
        assert_eq!(token(b"true]"), Ok((&b"]"[..], Token::True)));
        assert_eq!(token(b"R "), Ok((&b" "[..], Token::R)));
        assert!(token(b"Re").is_err());
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            token(b"% comment\n  12"),
            Ok((&b""[..], Token::Integer(12)))
        );
    }

    #[test]
    fn test_token_sequence() {
        let (rest, toks) = tokens(b"<< /Size 3 /Root 1 0 R >>").unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            toks,
            vec![
                Token::DictStart,
                Token::Name("Size".into()),
                Token::Integer(3),
                Token::Name("Root".into()),
                Token::Integer(1),
                Token::Integer(0),
                Token::R,
                Token::DictEnd,
            ]
        );
    }

    #[test]
    fn test_decode_name_escapes() {
        assert_eq!(decode_name_escapes("Type"), "Type");
        assert_eq!(decode_name_escapes("A#23B"), "A#B");
        assert_eq!(decode_name_escapes("A#ZZ"), "A#ZZ");
    }
}
