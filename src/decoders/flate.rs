//! FlateDecode (zlib/deflate).

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// FlateDecode filter with recovery for truncated or mis-headed streams.
pub struct FlateDecoder;

/// Read a decoder to the end, keeping whatever came out before an error.
fn drain<R: Read>(mut reader: R) -> (Vec<u8>, Option<std::io::Error>) {
    let mut out = Vec::new();
    match reader.read_to_end(&mut out) {
        Ok(_) => (out, None),
        Err(e) => (out, Some(e)),
    }
}

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let (out, err) = drain(ZlibDecoder::new(input));
        let err = match err {
            None => return Ok(out),
            Some(e) if !out.is_empty() => {
                log::warn!("FlateDecode partial recovery: {} bytes before error: {}", out.len(), e);
                return Ok(out);
            },
            Some(e) => e,
        };

        // Corrupt zlib header over valid deflate data.
        log::debug!("Zlib decode failed ({}), trying raw deflate", err);
        let (out, raw_err) = drain(DeflateDecoder::new(input));
        if raw_err.is_none() || !out.is_empty() {
            return Ok(out);
        }

        if input.len() > 2 {
            let (out, skip_err) = drain(DeflateDecoder::new(&input[2..]));
            if skip_err.is_none() || !out.is_empty() {
                log::debug!("Deflate after skipping header: {} bytes", out.len());
                return Ok(out);
            }
        }

        Err(Error::Decode(format!("FlateDecode: {}", err)))
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
