//! Standard security handler key derivation and password checks.
//!
//! Revisions 2 to 4 derive the file key from the password with MD5 and RC4;
//! revisions 5 and 6 check SHA-2 hashes and unwrap a random file key stored
//! in `/UE` or `/OE`.

use super::aes;
use super::rc4::rc4_crypt;
use super::EncryptDict;
use crate::error::Result;
use md5::{Digest, Md5};
use sha2::{Sha256, Sha384, Sha512};

pub(crate) const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Pad or truncate a password to 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PADDING;
    let n = password.len().min(32);
    padded[..n].copy_from_slice(&password[..n]);
    padded[n..].copy_from_slice(&PADDING[..32 - n]);
    padded
}

/// Algorithm 2: file key from a user password (revisions 2 to 4).
pub fn compute_file_key(password: &[u8], dict: &EncryptDict, file_id: &[u8]) -> Vec<u8> {
    let key_len = dict.key_length_bytes().clamp(5, 16);
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(&dict.owner_key);
    hasher.update(dict.permissions.to_le_bytes());
    hasher.update(file_id);
    if dict.revision >= 4 && !dict.encrypt_metadata {
        hasher.update([0xFF; 4]);
    }
    let mut hash = hasher.finalize().to_vec();

    if dict.revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..key_len]).to_vec();
        }
    }
    hash.truncate(if dict.revision == 2 { 5 } else { key_len });
    hash
}

/// Algorithms 4 and 5: the `/U` value a file key should produce.
fn expected_user_key(key: &[u8], dict: &EncryptDict, file_id: &[u8]) -> Vec<u8> {
    if dict.revision == 2 {
        return rc4_crypt(key, &PADDING);
    }
    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let mut hash = hasher.finalize().to_vec();
    for i in 0..20u8 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        hash = rc4_crypt(&round_key, &hash);
    }
    hash
}

/// Algorithm 6: authenticate a user password, returning the file key.
pub fn authenticate_user(password: &[u8], dict: &EncryptDict, file_id: &[u8]) -> Option<Vec<u8>> {
    let key = compute_file_key(password, dict, file_id);
    let expected = expected_user_key(&key, dict, file_id);
    // Revision 3+ only defines the first 16 bytes of /U.
    let n = if dict.revision == 2 { 32 } else { 16 };
    if dict.user_key.len() >= n && constant_time_eq(&dict.user_key[..n], &expected[..n]) {
        Some(key)
    } else {
        None
    }
}

/// Algorithm 7: recover the user password from `/O` with an owner password
/// and authenticate with it.
pub fn authenticate_owner(password: &[u8], dict: &EncryptDict, file_id: &[u8]) -> Option<Vec<u8>> {
    let key_len = if dict.revision == 2 {
        5
    } else {
        dict.key_length_bytes().clamp(5, 16)
    };
    let mut hash = Md5::digest(pad_password(password)).to_vec();
    if dict.revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..key_len]).to_vec();
        }
    }
    let rc4_key = &hash[..key_len];

    let mut user_password = dict.owner_key.get(..32)?.to_vec();
    if dict.revision == 2 {
        user_password = rc4_crypt(rc4_key, &user_password);
    } else {
        for i in (0..20u8).rev() {
            let round_key: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
            user_password = rc4_crypt(&round_key, &user_password);
        }
    }
    authenticate_user(&user_password, dict, file_id)
}

/// Revision 5+ passwords are UTF-8 truncated to 127 bytes.
fn truncate_utf8(password: &[u8]) -> &[u8] {
    &password[..password.len().min(127)]
}

/// Hash for revisions 5 (plain SHA-256) and 6 (Algorithm 2.B).
fn hash_r5_r6(password: &[u8], salt: &[u8], user_data: &[u8], revision: u32) -> Result<Vec<u8>> {
    let mut sha = Sha256::new();
    sha2::Digest::update(&mut sha, password);
    sha2::Digest::update(&mut sha, salt);
    sha2::Digest::update(&mut sha, user_data);
    let mut k = sha2::Digest::finalize(sha).to_vec();
    if revision == 5 {
        return Ok(k);
    }

    let mut round = 0u32;
    loop {
        let mut block = Vec::with_capacity(password.len() + k.len() + user_data.len());
        block.extend_from_slice(password);
        block.extend_from_slice(&k);
        block.extend_from_slice(user_data);
        let k1: Vec<u8> = block.iter().copied().cycle().take(block.len() * 64).collect();

        let e = aes::encrypt_no_padding(&k[..16], &k[16..32], &k1)?;
        let selector = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        k = match selector {
            0 => <Sha256 as sha2::Digest>::digest(&e).to_vec(),
            1 => <Sha384 as sha2::Digest>::digest(&e).to_vec(),
            _ => <Sha512 as sha2::Digest>::digest(&e).to_vec(),
        };
        round += 1;
        let last = u32::from(e.last().copied().unwrap_or(0));
        if round >= 64 && last <= round - 32 {
            break;
        }
    }
    k.truncate(32);
    Ok(k)
}

/// Algorithms 11 and 12 (user), then 2.A key unwrapping.
pub fn authenticate_r5_r6(password: &[u8], dict: &EncryptDict) -> Result<Option<Vec<u8>>> {
    let password = truncate_utf8(password);
    let u = &dict.user_key;
    let o = &dict.owner_key;
    if u.len() < 48 || o.len() < 48 {
        return Ok(None);
    }

    // Owner check first: it needs the full 48 bytes of /U.
    let owner_hash = hash_r5_r6(password, &o[32..40], &u[..48], dict.revision)?;
    if constant_time_eq(&owner_hash, &o[..32]) {
        if let Some(oe) = dict.owner_encryption.as_deref() {
            let wrapping = hash_r5_r6(password, &o[40..48], &u[..48], dict.revision)?;
            return Ok(Some(aes::decrypt_no_padding(&wrapping, &[0u8; 16], oe)?));
        }
    }

    let user_hash = hash_r5_r6(password, &u[32..40], &[], dict.revision)?;
    if constant_time_eq(&user_hash, &u[..32]) {
        if let Some(ue) = dict.user_encryption.as_deref() {
            let wrapping = hash_r5_r6(password, &u[40..48], &[], dict.revision)?;
            return Ok(Some(aes::decrypt_no_padding(&wrapping, &[0u8; 16], ue)?));
        }
    }
    Ok(None)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Algorithm 3: the `/O` value for a pair of passwords (revisions 2 to 4).
pub fn compute_owner_key(owner_password: &[u8], user_password: &[u8], revision: u32, key_len: usize) -> Vec<u8> {
    let key_len = if revision == 2 { 5 } else { key_len.clamp(5, 16) };
    let source = if owner_password.is_empty() { user_password } else { owner_password };
    let mut hash = Md5::digest(pad_password(source)).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..key_len]).to_vec();
        }
    }
    let rc4_key = &hash[..key_len];
    let mut out = rc4_crypt(rc4_key, &pad_password(user_password));
    if revision >= 3 {
        for i in 1..=19u8 {
            let round_key: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
            out = rc4_crypt(&round_key, &out);
        }
    }
    out
}

/// Algorithms 4 and 5: the `/U` value for a file key, padded to 32 bytes.
pub fn compute_user_key(key: &[u8], dict: &EncryptDict, file_id: &[u8]) -> Vec<u8> {
    let mut u = expected_user_key(key, dict, file_id);
    u.resize(32, 0);
    u
}
