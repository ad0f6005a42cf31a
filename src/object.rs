//! PDF object types.

use crate::decoders::{self, DecodeParams};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Dictionary payload shared by dictionaries and streams.
pub type Dict = HashMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (starting with /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dict),
    /// Stream (dictionary + data)
    Stream {
        /// Stream dictionary
        dict: Dict,
        /// Raw stream data, still filtered
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Human-readable type name, without the data.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an integer or real.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Check whether this is a dictionary or stream whose `/Type` is `name`.
    pub fn has_type(&self, name: &str) -> bool {
        self.as_dict()
            .and_then(|d| d.get("Type"))
            .and_then(|t| t.as_name())
            .is_some_and(|t| t == name)
    }

    /// Read a rectangle array such as `/MediaBox [0 0 612 792]`.
    pub fn as_rect(&self) -> Option<[f64; 4]> {
        let arr = self.as_array()?;
        if arr.len() != 4 {
            return None;
        }
        let mut out = [0.0; 4];
        for (slot, obj) in out.iter_mut().zip(arr) {
            *slot = obj.as_number()?;
        }
        Some(out)
    }

    /// Apply the stream's filter chain and return the decoded bytes.
    ///
    /// Stream data held by a loaded document is already decrypted, so this
    /// only undoes compression and encoding filters.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => {
                let filters = dict
                    .get("Filter")
                    .map(extract_filter_names)
                    .unwrap_or_default();

                if filters.is_empty() {
                    return Ok(data.to_vec());
                }

                let params = extract_decode_params(dict.get("DecodeParms"), filters.len());
                decoders::decode_stream(data, &filters, &params)
            },
            _ => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }
}

/// Filter names from a `/Filter` entry (a single name or an array of names).
fn extract_filter_names(filter_obj: &Object) -> Vec<String> {
    match filter_obj {
        Object::Name(name) => vec![name.clone()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
            .collect(),
        _ => vec![],
    }
}

/// Predictor parameters for each filter in the chain.
///
/// `/DecodeParms` is either one dictionary (single filter) or an array
/// aligned with the `/Filter` array, where `null` means "no parameters".
fn extract_decode_params(params_obj: Option<&Object>, filter_count: usize) -> Vec<Option<DecodeParams>> {
    let mut out = vec![None; filter_count];
    match params_obj {
        Some(Object::Dictionary(d)) => {
            if let Some(slot) = out.first_mut() {
                *slot = Some(DecodeParams::from_dict(d));
            }
        },
        Some(Object::Array(arr)) => {
            for (slot, obj) in out.iter_mut().zip(arr) {
                *slot = obj.as_dict().map(DecodeParams::from_dict);
            }
        },
        _ => {},
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_object_ref_display() {
        assert_eq!(ObjectRef::new(12, 0).to_string(), "12 0 R");
    }

    #[test]
    fn test_as_number() {
        assert_eq!(Object::Integer(3).as_number(), Some(3.0));
        assert_eq!(Object::Real(2.5).as_number(), Some(2.5));
        assert_eq!(Object::Name("X".into()).as_number(), None);
    }

    #[test]
    fn test_as_rect() {
        let obj = Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(612.0),
            Object::Integer(792),
        ]);
        assert_eq!(obj.as_rect(), Some([0.0, 0.0, 612.0, 792.0]));
        assert_eq!(Object::Array(vec![Object::Integer(1)]).as_rect(), None);
    }

    #[test]
    fn test_has_type() {
        let mut dict = Dict::new();
        dict.insert("Type".into(), Object::Name("Page".into()));
        let obj = Object::Dictionary(dict);
        assert!(obj.has_type("Page"));
        assert!(!obj.has_type("Pages"));
    }

    #[test]
    fn test_decode_unfiltered_stream() {
        let obj = Object::Stream {
            dict: Dict::new(),
            data: bytes::Bytes::from_static(b"BT ET"),
        };
        assert_eq!(obj.decode_stream_data().unwrap(), b"BT ET");
    }

    #[test]
    fn test_decode_flate_stream() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"0 0 m 10 0 l S").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut dict = Dict::new();
        dict.insert("Filter".into(), Object::Name("FlateDecode".into()));
        let obj = Object::Stream {
            dict,
            data: bytes::Bytes::from(compressed),
        };
        assert_eq!(obj.decode_stream_data().unwrap(), b"0 0 m 10 0 l S");
    }

    #[test]
    fn test_decode_non_stream_fails() {
        let err = Object::Integer(1).decode_stream_data().unwrap_err();
        assert!(format!("{}", err).contains("Stream"));
    }
}
