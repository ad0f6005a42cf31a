//! AES-CBC for the AESV2 (128-bit) and AESV3 (256-bit) crypt filters.
//!
//! Padding is handled by hand: object data uses PKCS#7, while the R6 key
//! derivation and the `/UE` `/OE` unwrapping run without padding.

use crate::error::{Error, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

fn check_lengths(key: &[u8], iv: &[u8], data: &[u8]) -> Result<()> {
    if key.len() != 16 && key.len() != 32 {
        return Err(Error::Decode(format!("AES key must be 16 or 32 bytes, got {}", key.len())));
    }
    if iv.len() != 16 {
        return Err(Error::Decode("AES IV must be 16 bytes".to_string()));
    }
    if data.len() % 16 != 0 {
        return Err(Error::Decode(format!("AES data length {} is not a multiple of 16", data.len())));
    }
    Ok(())
}

/// CBC-decrypt without removing padding. The key length selects AES-128 or AES-256.
pub fn decrypt_no_padding(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, iv, data)?;
    let mut buf = data.to_vec();
    let failed = |_| Error::Decode("AES decryption failed".to_string());
    if key.len() == 16 {
        Aes128CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(failed)?;
    } else {
        Aes256CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(failed)?;
    }
    Ok(buf)
}

/// CBC-encrypt block-aligned data without padding.
pub fn encrypt_no_padding(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, iv, data)?;
    let mut buf = data.to_vec();
    let len = buf.len();
    let failed = |_| Error::Decode("AES encryption failed".to_string());
    if key.len() == 16 {
        Aes128CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map_err(failed)?;
    } else {
        Aes256CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map_err(failed)?;
    }
    Ok(buf)
}

/// Decrypt object data laid out as `IV || ciphertext` and strip PKCS#7 padding.
pub fn decrypt_object_data(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < 16 {
        return Err(Error::Decode(format!("AES data too short: {} bytes", data.len())));
    }
    let (iv, body) = data.split_at(16);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let mut plain = decrypt_no_padding(key, iv, body)?;
    let pad = plain.last().copied().unwrap_or(0) as usize;
    if pad == 0 || pad > 16 || pad > plain.len() || plain[plain.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(Error::Decode("invalid PKCS#7 padding".to_string()));
    }
    plain.truncate(plain.len() - pad);
    Ok(plain)
}

/// Encrypt `data` as `IV || ciphertext` with PKCS#7 padding.
pub fn encrypt_object_data(key: &[u8], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    let pad = 16 - data.len() % 16;
    let mut padded = data.to_vec();
    padded.extend(std::iter::repeat(pad as u8).take(pad));
    let mut out = iv.to_vec();
    out.extend(encrypt_no_padding(key, iv, &padded)?);
    Ok(out)
}
