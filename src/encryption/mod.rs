//! Standard security handler.
//!
//! Supports `/V` 1, 2, 4 and 5 with revisions 2 to 6: RC4 (40 to 128 bit),
//! AESV2 and AESV3 crypt filters, and the `Identity` filter. Authentication
//! happens once at load time; afterwards the handler is immutable and shared
//! by every worker.

use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use std::collections::HashMap;

mod aes;
mod algorithms;
mod handler;
mod rc4;

pub use aes::{decrypt_object_data, encrypt_object_data};
pub use algorithms::{compute_file_key, compute_owner_key, compute_user_key, pad_password};
pub use handler::SecurityHandler;
pub use rc4::rc4_crypt;

/// Cipher applied by a crypt filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// Data is stored in the clear
    Identity,
    /// RC4 with a per-object key
    Rc4,
    /// AES-128-CBC with a per-object key
    AesV2,
    /// AES-256-CBC with the file key
    AesV3,
}

impl CryptMethod {
    fn from_cfm(name: Option<&str>) -> Result<Self> {
        match name {
            None | Some("None") => Ok(CryptMethod::Identity),
            Some("V2") => Ok(CryptMethod::Rc4),
            Some("AESV2") => Ok(CryptMethod::AesV2),
            Some("AESV3") => Ok(CryptMethod::AesV3),
            Some(other) => Err(Error::Decryption(format!("unsupported crypt filter method /{}", other))),
        }
    }
}

/// Parsed `/Encrypt` dictionary.
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// Security handler name, `Standard` for password security
    pub filter: String,
    /// `/V`
    pub version: u32,
    /// `/R`
    pub revision: u32,
    /// `/Length` in bits
    pub length_bits: u32,
    /// `/O`
    pub owner_key: Vec<u8>,
    /// `/U`
    pub user_key: Vec<u8>,
    /// `/P`
    pub permissions: i32,
    /// `/EncryptMetadata`, default true
    pub encrypt_metadata: bool,
    /// `/OE` (revision 5+)
    pub owner_encryption: Option<Vec<u8>>,
    /// `/UE` (revision 5+)
    pub user_encryption: Option<Vec<u8>>,
    /// Named filters from `/CF`
    pub crypt_filters: HashMap<String, CryptMethod>,
    /// `/StmF`
    pub stream_filter: Option<String>,
    /// `/StrF`
    pub string_filter: Option<String>,
}

impl EncryptDict {
    /// Read an encryption dictionary whose values are already resolved.
    pub fn from_dict(dict: &Dict) -> Result<Self> {
        let name = |key: &str| dict.get(key).and_then(|o| o.as_name()).map(str::to_string);
        let int = |key: &str| dict.get(key).and_then(|o| o.as_integer());
        let bytes = |key: &str| dict.get(key).and_then(|o| o.as_string()).map(<[u8]>::to_vec);

        let filter = name("Filter").ok_or_else(|| Error::Decryption("/Encrypt without /Filter".to_string()))?;
        let version = int("V").unwrap_or(0).max(0) as u32;
        let revision = int("R")
            .ok_or_else(|| Error::Decryption("/Encrypt without /R".to_string()))?
            .max(0) as u32;
        let default_bits = match version {
            1 => 40,
            5 => 256,
            _ => 128,
        };

        let mut crypt_filters = HashMap::new();
        let mut cf_bits = None;
        if let Some(cf) = dict.get("CF").and_then(|o| o.as_dict()) {
            for (key, value) in cf {
                let Some(filter_dict) = value.as_dict() else { continue };
                let method = CryptMethod::from_cfm(filter_dict.get("CFM").and_then(|o| o.as_name()))?;
                crypt_filters.insert(key.clone(), method);
                // /Length inside a crypt filter may be in bytes or bits.
                if let Some(len) = filter_dict.get("Length").and_then(|o| o.as_integer()) {
                    cf_bits = Some(if len <= 32 { len * 8 } else { len });
                }
            }
        }

        Ok(Self {
            filter,
            version,
            revision,
            length_bits: int("Length").or(cf_bits).unwrap_or(default_bits).clamp(40, 256) as u32,
            owner_key: bytes("O").ok_or_else(|| Error::Decryption("/Encrypt without /O".to_string()))?,
            user_key: bytes("U").ok_or_else(|| Error::Decryption("/Encrypt without /U".to_string()))?,
            permissions: int("P").unwrap_or(-4) as i32,
            encrypt_metadata: dict
                .get("EncryptMetadata")
                .and_then(|o| o.as_bool())
                .unwrap_or(true),
            owner_encryption: bytes("OE"),
            user_encryption: bytes("UE"),
            crypt_filters,
            stream_filter: name("StmF"),
            string_filter: name("StrF"),
        })
    }

    /// File key length in bytes.
    pub fn key_length_bytes(&self) -> usize {
        (self.length_bits / 8) as usize
    }

    /// Method for a filter name from `/StmF` or `/StrF`.
    fn method_for(&self, name: Option<&str>) -> Result<CryptMethod> {
        if self.version < 4 {
            return Ok(CryptMethod::Rc4);
        }
        match name {
            None | Some("Identity") => Ok(CryptMethod::Identity),
            Some(n) => self
                .crypt_filters
                .get(n)
                .copied()
                .ok_or_else(|| Error::Decryption(format!("crypt filter /{} is not defined in /CF", n))),
        }
    }
}

/// Read a `/Encrypt` dictionary from a resolved object.
pub fn encrypt_dict_from_object(obj: &Object) -> Result<EncryptDict> {
    let dict = obj
        .as_dict()
        .ok_or_else(|| Error::Decryption(format!("/Encrypt is a {}, not a dictionary", obj.type_name())))?;
    EncryptDict::from_dict(dict)
}
