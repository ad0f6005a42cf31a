//! Content stream parser.
//!
//! Content streams use postfix notation: operands precede the operator
//! keyword. Parsing never fails; unparseable bytes and operators with the
//! wrong operand types are skipped and counted in
//! [`ContentStream::malformed`].
//!
//! ```text
//! BT
//!   /F1 12 Tf
//!   100 700 Td
//!   (Hello, World!) Tj
//! ET
//! ```

use crate::content::operators::{Operator, TextElement};
use crate::lexer::{is_regular, is_whitespace, skip_whitespace};
use crate::object::Object;
use crate::parser::parse_object;

/// Parsed operators plus a count of what had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentStream {
    /// Operators in stream order
    pub operators: Vec<Operator>,
    /// Skipped byte runs, dangling operands and ill-typed operators
    pub malformed: usize,
}

/// An operator keyword with its untyped operands.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOperation {
    /// Operator keyword
    pub name: String,
    /// Operands in stream order
    pub operands: Vec<Object>,
}

/// Split a stream into keyword/operand groups.
///
/// Also used for CMap streams, which share the postfix syntax. Returns the
/// operations and the number of skipped runs.
pub fn raw_operations(data: &[u8]) -> (Vec<RawOperation>, usize) {
    let mut ops = Vec::new();
    let mut operands = Vec::new();
    let mut malformed = 0;
    let mut in_garbage = false;
    let mut input = data;

    loop {
        input = skip_whitespace(input);
        let Some(&first) = input.first() else { break };

        if is_operator_start(first) {
            let len = input.iter().position(|&c| !is_regular(c)).unwrap_or(input.len());
            let name: String = input[..len].iter().map(|&b| b as char).collect();
            input = &input[len..];
            in_garbage = false;

            match name.as_str() {
                "true" => operands.push(Object::Boolean(true)),
                "false" => operands.push(Object::Boolean(false)),
                "null" => operands.push(Object::Null),
                "BI" => {
                    operands.clear();
                    match skip_inline_image(input) {
                        Some(rest) => {
                            input = rest;
                            ops.push(RawOperation {
                                name,
                                operands: Vec::new(),
                            });
                        },
                        None => {
                            // No EI: the rest of the stream is image data.
                            malformed += 1;
                            break;
                        },
                    }
                },
                _ => ops.push(RawOperation {
                    name,
                    operands: std::mem::take(&mut operands),
                }),
            }
            continue;
        }

        match parse_object(input) {
            Ok((rest, obj)) if rest.len() < input.len() => {
                operands.push(obj);
                input = rest;
                in_garbage = false;
            },
            _ => {
                if !in_garbage {
                    malformed += 1;
                    in_garbage = true;
                }
                operands.clear();
                input = &input[1..];
            },
        }
    }

    if !operands.is_empty() {
        malformed += 1;
    }
    (ops, malformed)
}

/// Parse a decoded content stream.
pub fn parse_content_stream(data: &[u8]) -> ContentStream {
    let (raw, mut malformed) = raw_operations(data);
    let mut operators = Vec::with_capacity(raw.len());
    for op in raw {
        match build_operator(&op.name, op.operands) {
            Some(operator) => operators.push(operator),
            None => {
                log::debug!("Skipping '{}' with invalid operands", op.name);
                malformed += 1;
            },
        }
    }
    ContentStream { operators, malformed }
}

fn is_operator_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'\'' || byte == b'"'
}

/// Typed operator, or `None` when the operands do not fit.
fn build_operator(name: &str, operands: Vec<Object>) -> Option<Operator> {
    let op = match name {
        "Td" => {
            let [tx, ty] = numbers(&operands)?;
            Operator::Td { tx, ty }
        },
        "TD" => {
            let [tx, ty] = numbers(&operands)?;
            Operator::TD { tx, ty }
        },
        "Tm" => Operator::Tm {
            matrix: numbers(&operands)?,
        },
        "T*" => Operator::TStar,

        "Tj" => Operator::Tj {
            text: last_string(&operands)?,
        },
        "'" => Operator::Quote {
            text: last_string(&operands)?,
        },
        "\"" => {
            let text = last_string(&operands)?;
            let at = operands.len().checked_sub(3)?;
            let [word_space, char_space] = numbers(&operands[at..at + 2])?;
            Operator::DoubleQuote {
                word_space,
                char_space,
                text,
            }
        },
        "TJ" => {
            let array = operands.last()?.as_array()?;
            Operator::TJ {
                array: array
                    .iter()
                    .filter_map(|item| match item {
                        Object::String(s) => Some(TextElement::String(s.clone())),
                        other => other.as_number().map(|n| TextElement::Offset(n as f32)),
                    })
                    .collect(),
            }
        },

        "Tc" => {
            let [char_space] = numbers(&operands)?;
            Operator::Tc { char_space }
        },
        "Tw" => {
            let [word_space] = numbers(&operands)?;
            Operator::Tw { word_space }
        },
        "Tz" => {
            let [scale] = numbers(&operands)?;
            Operator::Tz { scale }
        },
        "TL" => {
            let [leading] = numbers(&operands)?;
            Operator::TL { leading }
        },
        "Tf" => {
            let at = operands.len().checked_sub(2)?;
            let font = operands[at].as_name()?.to_string();
            let [size] = numbers(&operands)?;
            Operator::Tf { font, size }
        },
        "Tr" => {
            let render = operands.last()?.as_integer()?;
            Operator::Tr {
                render: render.clamp(0, 7) as u8,
            }
        },
        "Ts" => {
            let [rise] = numbers(&operands)?;
            Operator::Ts { rise }
        },
        "BT" => Operator::BeginText,
        "ET" => Operator::EndText,

        "q" => Operator::SaveState,
        "Q" => Operator::RestoreState,
        "cm" => Operator::Cm {
            matrix: numbers(&operands)?,
        },
        "w" => {
            let [width] = numbers(&operands)?;
            Operator::SetLineWidth { width }
        },
        "gs" => Operator::SetExtGState {
            name: operands.last()?.as_name()?.to_string(),
        },

        "m" => {
            let [x, y] = numbers(&operands)?;
            Operator::MoveTo { x, y }
        },
        "l" => {
            let [x, y] = numbers(&operands)?;
            Operator::LineTo { x, y }
        },
        "c" => {
            let [_, _, _, _, x, y] = numbers(&operands)?;
            Operator::CurveTo { x, y }
        },
        "v" | "y" => {
            let [_, _, x, y] = numbers(&operands)?;
            Operator::CurveTo { x, y }
        },
        "h" => Operator::ClosePath,
        "re" => {
            let [x, y, width, height] = numbers(&operands)?;
            Operator::Rectangle { x, y, width, height }
        },

        "S" => Operator::Stroke { close: false },
        "s" => Operator::Stroke { close: true },
        "f" | "F" | "f*" => Operator::Fill,
        "B" | "B*" => Operator::FillStroke { close: false },
        "b" | "b*" => Operator::FillStroke { close: true },
        "n" => Operator::EndPath,
        "W" | "W*" => Operator::Clip,

        "Do" => Operator::Do {
            name: operands.last()?.as_name()?.to_string(),
        },
        "BI" => Operator::InlineImage,

        "g" | "G" | "rg" | "RG" | "k" | "K" | "cs" | "CS" | "sc" | "SC" | "scn" | "SCN" | "J" | "j" | "M" | "d"
        | "ri" | "i" | "sh" | "BMC" | "BDC" | "EMC" | "MP" | "DP" | "d0" | "d1" | "BX" | "EX" => Operator::NoOp {
            name: name.to_string(),
        },

        _ => Operator::Other {
            name: name.to_string(),
            operands,
        },
    };
    Some(op)
}

/// The last `N` operands as numbers.
fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    let start = operands.len().checked_sub(N)?;
    let mut out = [0.0f32; N];
    for (slot, obj) in out.iter_mut().zip(&operands[start..]) {
        *slot = obj.as_number()? as f32;
    }
    Some(out)
}

fn last_string(operands: &[Object]) -> Option<Vec<u8>> {
    operands.last()?.as_string().map(<[u8]>::to_vec)
}

/// Skip `key value ... ID <data> EI`, returning the input after `EI`.
fn skip_inline_image(input: &[u8]) -> Option<&[u8]> {
    let mut remaining = input;
    loop {
        remaining = skip_whitespace(remaining);
        if remaining.starts_with(b"ID") && remaining.get(2).map_or(true, |&c| is_whitespace(c)) {
            remaining = remaining.get(3..).unwrap_or(&[]);
            break;
        }
        let (rest, _) = parse_object(remaining).ok()?;
        if rest.len() == remaining.len() {
            return None;
        }
        remaining = rest;
    }

    // EI must be preceded by whitespace and followed by whitespace, a
    // delimiter or the end of the stream.
    let mut i = 0;
    while i + 2 < remaining.len() + 1 {
        if remaining[i..].starts_with(b"EI")
            && (i == 0 || is_whitespace(remaining[i - 1]))
            && remaining.get(i + 2).map_or(true, |&c| !is_regular(c))
        {
            return Some(&remaining[i + 2..]);
        }
        i += 1;
    }
    None
}
