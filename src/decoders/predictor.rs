//! TIFF and PNG predictor post-processing for Flate-compressed streams.
//!
//! Cross-reference streams almost always carry `/Predictor 12` with
//! `/Columns` equal to the total entry width, so this path is hot during
//! loading even for documents without images.

use crate::error::{Error, Result};
use crate::object::Dict;

/// Parameters from a `/DecodeParms` dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// 1 = none, 2 = TIFF, 10..=15 = PNG
    pub predictor: i64,
    /// Samples per row
    pub columns: usize,
    /// Colour components per sample
    pub colors: usize,
    /// Bits per colour component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read parameters from a dictionary, defaulting missing or nonsensical entries.
    pub fn from_dict(dict: &Dict) -> Self {
        let get = |key: &str, default: i64| -> i64 {
            dict.get(key)
                .and_then(|v| v.as_integer())
                .filter(|&v| v > 0)
                .unwrap_or(default)
        };
        Self {
            predictor: get("Predictor", 1),
            columns: get("Columns", 1) as usize,
            colors: get("Colors", 1) as usize,
            bits_per_component: get("BitsPerComponent", 8) as usize,
        }
    }

    /// Decoded bytes in one row, without the PNG tag byte.
    pub fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes per complete pixel, at least one.
    fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Undo the predictor named in `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_len = params.row_bytes().max(1);
    let bpp = params.pixel_bytes();
    let mut out = Vec::with_capacity(data.len());

    for row in data.chunks(row_len) {
        let start = out.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { out[start + i - bpp] } else { 0 };
            out.push(byte.wrapping_add(left));
        }
    }
    Ok(out)
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.row_bytes();
    if row_len == 0 {
        return Err(Error::Decode("PNG predictor with empty rows".to_string()));
    }
    let bpp = params.pixel_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];

    // A short final row is decoded as far as it goes.
    for encoded in data.chunks(row_len + 1) {
        let (&tag, body) = match encoded.split_first() {
            Some(split) => split,
            None => break,
        };
        let mut row = vec![0u8; body.len()];
        for i in 0..body.len() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                _ => return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", tag))),
            };
            row[i] = body[i].wrapping_add(predicted);
        }
        out.extend_from_slice(&row);
        prev[..row.len()].copy_from_slice(&row);
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
