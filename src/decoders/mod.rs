//! Stream filter decoders.
//!
//! Only the text-bearing filters are supported: content streams, form
//! XObjects, object streams and cross-reference streams use Flate and, more
//! rarely, the two ASCII encodings. Image codecs are reported as
//! [`Error::Unsupported`] so the caller can skip the stream.

use crate::error::{Error, Result};

mod ascii85;
mod ascii_hex;
mod flate;
mod predictor;

pub use ascii85::Ascii85Decoder;
pub use ascii_hex::AsciiHexDecoder;
pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Decoded output may be at most this many times the encoded size.
const MAX_DECOMPRESSION_RATIO: usize = 100;

/// Hard cap on any single decoded stream.
const MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

/// Ratio checks start above this size so tiny highly compressible streams pass.
const RATIO_CHECK_FLOOR: usize = 1024 * 1024;

/// A single stream filter.
pub trait StreamDecoder {
    /// Decode one filter stage.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as it appears in `/Filter`.
    fn name(&self) -> &str;
}

fn decoder_for(name: &str) -> Result<Box<dyn StreamDecoder>> {
    match name {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        "ASCIIHexDecode" | "AHx" => Ok(Box::new(AsciiHexDecoder)),
        "ASCII85Decode" | "A85" => Ok(Box::new(Ascii85Decoder)),
        other => Err(Error::Unsupported(format!("stream filter {}", other))),
    }
}

/// Run `data` through a filter chain.
///
/// `params[i]` holds the predictor parameters of `filters[i]`, if any.
pub fn decode_stream(data: &[u8], filters: &[String], params: &[Option<DecodeParams>]) -> Result<Vec<u8>> {
    let encoded_size = data.len().max(1);
    let mut current = data.to_vec();

    for (i, name) in filters.iter().enumerate() {
        // Crypt filters are applied by the security handler.
        if name == "Crypt" {
            continue;
        }
        let decoder = decoder_for(name)?;
        current = decoder.decode(&current)?;

        if let Some(Some(p)) = params.get(i) {
            if p.predictor > 1 {
                current = decode_predictor(&current, p)?;
            }
        }

        if current.len() > MAX_DECOMPRESSED_SIZE {
            return Err(Error::Decode(format!(
                "decoded size {} bytes exceeds limit {} bytes",
                current.len(),
                MAX_DECOMPRESSED_SIZE
            )));
        }
        if current.len() > RATIO_CHECK_FLOOR && current.len() / encoded_size > MAX_DECOMPRESSION_RATIO {
            return Err(Error::Decode(format!(
                "decompression ratio {}:1 exceeds limit {}:1",
                current.len() / encoded_size,
                MAX_DECOMPRESSION_RATIO
            )));
        }
    }

    Ok(current)
}
