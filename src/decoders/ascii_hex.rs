//! ASCIIHexDecode.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use crate::lexer::is_whitespace;
use crate::parser::hex_value;

/// Hex pairs up to `>`; whitespace ignored, odd final digit padded with 0.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() / 2);
        let mut high: Option<u8> = None;

        for &c in input {
            if c == b'>' {
                break;
            }
            if is_whitespace(c) {
                continue;
            }
            let nibble = hex_value(c)
                .ok_or_else(|| Error::Decode(format!("ASCIIHexDecode: invalid digit '{}'", c as char)))?;
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

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}
