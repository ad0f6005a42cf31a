//! Authenticated security handler: decrypts strings and streams per object.

use super::{aes, algorithms, rc4, CryptMethod, EncryptDict};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use md5::{Digest, Md5};

/// File key plus the crypt methods for strings and streams.
#[derive(Debug, Clone)]
pub struct SecurityHandler {
    file_key: Vec<u8>,
    stream_method: CryptMethod,
    string_method: CryptMethod,
    encrypt_metadata: bool,
    revision: u32,
}

impl SecurityHandler {
    /// Authenticate against `dict`.
    ///
    /// The empty user password is always tried; a supplied password is
    /// tried as user password and then as owner password.
    pub fn authenticate(dict: &EncryptDict, file_id: &[u8], password: Option<&str>) -> Result<Self> {
        if dict.filter != "Standard" {
            return Err(Error::Decryption(format!("unsupported security handler /{}", dict.filter)));
        }
        if !matches!(dict.version, 1 | 2 | 4 | 5) || !(2..=6).contains(&dict.revision) {
            return Err(Error::Decryption(format!(
                "unsupported encryption V={} R={}",
                dict.version, dict.revision
            )));
        }

        let stream_method = dict.method_for(dict.stream_filter.as_deref())?;
        let string_method = dict.method_for(dict.string_filter.as_deref())?;

        let mut candidates: Vec<&[u8]> = vec![b""];
        if let Some(pw) = password.filter(|p| !p.is_empty()) {
            candidates.insert(0, pw.as_bytes());
        }

        let mut file_key = None;
        for candidate in &candidates {
            file_key = if dict.revision >= 5 {
                algorithms::authenticate_r5_r6(candidate, dict)?
            } else {
                algorithms::authenticate_user(candidate, dict, file_id)
                    .or_else(|| algorithms::authenticate_owner(candidate, dict, file_id))
            };
            if file_key.is_some() {
                break;
            }
        }

        let file_key = file_key.ok_or_else(|| match password {
            Some(_) => Error::Decryption("incorrect password".to_string()),
            None => Error::Decryption("document requires a password".to_string()),
        })?;
        log::info!(
            "Authenticated security handler V={} R={} ({:?} streams, {:?} strings)",
            dict.version,
            dict.revision,
            stream_method,
            string_method
        );

        Ok(Self {
            file_key,
            stream_method,
            string_method,
            encrypt_metadata: dict.encrypt_metadata,
            revision: dict.revision,
        })
    }

    /// Security handler revision.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Algorithm 1: key for one object.
    fn object_key(&self, method: CryptMethod, r: ObjectRef) -> Vec<u8> {
        if method == CryptMethod::AesV3 {
            return self.file_key.clone();
        }
        let mut hasher = Md5::new();
        hasher.update(&self.file_key);
        hasher.update(&r.id.to_le_bytes()[..3]);
        hasher.update(r.gen.to_le_bytes());
        if method == CryptMethod::AesV2 {
            hasher.update(b"sAlT");
        }
        let hash = hasher.finalize();
        hash[..(self.file_key.len() + 5).min(16)].to_vec()
    }

    fn apply(&self, method: CryptMethod, data: &[u8], r: ObjectRef) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4::rc4_crypt(&self.object_key(method, r), data)),
            CryptMethod::AesV2 | CryptMethod::AesV3 => aes::decrypt_object_data(&self.object_key(method, r), data),
        }
    }

    /// Decrypt a string belonging to object `r`.
    pub fn decrypt_string(&self, data: &[u8], r: ObjectRef) -> Result<Vec<u8>> {
        self.apply(self.string_method, data, r)
    }

    /// Decrypt stream data belonging to object `r`.
    ///
    /// Cross-reference streams, unencrypted metadata and streams carrying an
    /// explicit `Identity` crypt filter are returned unchanged.
    pub fn decrypt_stream(&self, dict: &Dict, data: &[u8], r: ObjectRef) -> Result<Vec<u8>> {
        let kind = dict.get("Type").and_then(|t| t.as_name());
        if kind == Some("XRef") || (kind == Some("Metadata") && !self.encrypt_metadata) || has_identity_crypt_filter(dict) {
            return Ok(data.to_vec());
        }
        self.apply(self.stream_method, data, r)
    }

    /// Decrypt every string and stream inside an object read from the file.
    pub fn decrypt_object(&self, obj: Object, r: ObjectRef) -> Result<Object> {
        Ok(match obj {
            Object::String(s) => Object::String(self.decrypt_string(&s, r)?),
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|o| self.decrypt_object(o, r))
                    .collect::<Result<_>>()?,
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.decrypt_dict(dict, r)?),
            Object::Stream { dict, data } => {
                let plain = self.decrypt_stream(&dict, &data, r)?;
                Object::Stream {
                    dict: self.decrypt_dict(dict, r)?,
                    data: bytes::Bytes::from(plain),
                }
            },
            other => other,
        })
    }

    fn decrypt_dict(&self, dict: Dict, r: ObjectRef) -> Result<Dict> {
        dict.into_iter()
            .map(|(k, v)| Ok((k, self.decrypt_object(v, r)?)))
            .collect()
    }
}

fn has_identity_crypt_filter(dict: &Dict) -> bool {
    let is_crypt = match dict.get("Filter") {
        Some(Object::Name(n)) => n == "Crypt",
        Some(Object::Array(a)) => a.first().and_then(|f| f.as_name()) == Some("Crypt"),
        _ => false,
    };
    if !is_crypt {
        return false;
    }
    let params = match dict.get("DecodeParms") {
        Some(Object::Array(a)) => a.first().and_then(|p| p.as_dict()),
        Some(other) => other.as_dict(),
        None => None,
    };
    params
        .and_then(|p| p.get("Name"))
        .and_then(|n| n.as_name())
        .map_or(true, |n| n == "Identity")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FILE_ID: &[u8] = b"fedcba9876543210";

    fn rc4_dict(user: &[u8], owner: &[u8]) -> EncryptDict {
        let mut d = EncryptDict {
            filter: "Standard".to_string(),
            version: 2,
            revision: 3,
            length_bits: 128,
            owner_key: Vec::new(),
            user_key: Vec::new(),
            permissions: -4,
            encrypt_metadata: true,
            owner_encryption: None,
            user_encryption: None,
            crypt_filters: HashMap::new(),
            stream_filter: None,
            string_filter: None,
        };
        d.owner_key = algorithms::compute_owner_key(owner, user, 3, 16);
        let key = algorithms::compute_file_key(user, &d, FILE_ID);
        d.user_key = algorithms::compute_user_key(&key, &d, FILE_ID);
        d
    }

    #[test]
    fn test_wrong_password_rejected() {
        let d = rc4_dict(b"secret", b"owner");
        let err = SecurityHandler::authenticate(&d, FILE_ID, Some("wrong")).unwrap_err();
        assert!(matches!(err, Error::Decryption(_)));
        let err = SecurityHandler::authenticate(&d, FILE_ID, None).unwrap_err();
        assert!(format!("{}", err).contains("requires a password"));
    }

    #[test]
    fn test_empty_user_password_opens_without_prompt() {
        let d = rc4_dict(b"", b"owner");
        assert!(SecurityHandler::authenticate(&d, FILE_ID, None).is_ok());
    }

    #[test]
    fn test_string_roundtrip_rc4() {
        let d = rc4_dict(b"secret", b"owner");
        let handler = SecurityHandler::authenticate(&d, FILE_ID, Some("owner")).unwrap();
        let r = ObjectRef::new(4, 0);
        let key = handler.object_key(CryptMethod::Rc4, r);
        let ciphertext = rc4::rc4_crypt(&key, b"Total");
        assert_eq!(handler.decrypt_string(&ciphertext, r).unwrap(), b"Total");
    }

    #[test]
    fn test_xref_stream_not_decrypted() {
        let d = rc4_dict(b"", b"owner");
        let handler = SecurityHandler::authenticate(&d, FILE_ID, None).unwrap();
        let mut dict = Dict::new();
        dict.insert("Type".into(), Object::Name("XRef".into()));
        assert_eq!(handler.decrypt_stream(&dict, b"raw", ObjectRef::new(9, 0)).unwrap(), b"raw");
    }

    #[test]
    fn test_unsupported_handler() {
        let mut d = rc4_dict(b"", b"");
        d.filter = "Adobe.PubSec".to_string();
        assert!(matches!(
            SecurityHandler::authenticate(&d, FILE_ID, None),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_identity_crypt_filter_detection() {
        let mut dict = Dict::new();
        dict.insert("Filter".into(), Object::Array(vec![Object::Name("Crypt".into())]));
        assert!(has_identity_crypt_filter(&dict));
        dict.insert("Filter".into(), Object::Name("FlateDecode".into()));
        assert!(!has_identity_crypt_filter(&dict));
    }
}
