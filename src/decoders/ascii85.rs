//! ASCII85Decode.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use crate::lexer::is_whitespace;

/// Base-85 groups of five characters, `z` for four zero bytes, `~>` terminator.
pub struct Ascii85Decoder;

impl StreamDecoder for Ascii85Decoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let body = input.strip_prefix(b"<~").unwrap_or(input);
        let mut out = Vec::with_capacity(body.len() * 4 / 5 + 4);
        let mut group = [0u8; 5];
        let mut count = 0;

        for &c in body {
            match c {
                b'~' => break,
                b'z' if count == 0 => out.extend_from_slice(&[0; 4]),
                b'z' => return Err(Error::Decode("ASCII85Decode: 'z' inside a group".to_string())),
                b'!'..=b'u' => {
                    group[count] = c - b'!';
                    count += 1;
                    if count == 5 {
                        out.extend_from_slice(&group_value(&group)?.to_be_bytes());
                        count = 0;
                    }
                },
                c if is_whitespace(c) => {},
                other => {
                    return Err(Error::Decode(format!(
                        "ASCII85Decode: invalid character '{}'",
                        other as char
                    )))
                },
            }
        }

        match count {
            0 => {},
            1 => return Err(Error::Decode("ASCII85Decode: dangling single character".to_string())),
            n => {
                for slot in group.iter_mut().skip(n) {
                    *slot = 84;
                }
                let bytes = group_value(&group)?.to_be_bytes();
                out.extend_from_slice(&bytes[..n - 1]);
            },
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}

fn group_value(group: &[u8; 5]) -> Result<u32> {
    group
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(85)?.checked_add(u32::from(d)))
        .ok_or_else(|| Error::Decode("ASCII85Decode: group overflow".to_string()))
}
