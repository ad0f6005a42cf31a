//! Font metrics and text decoding.
//!
//! A [`Font`] turns the bytes of a string operand into [`Glyph`]s: a character
//! code, its Unicode text and its horizontal advance. Simple fonts (Type1,
//! TrueType, Type3) use one byte per code; composite (Type0) fonts use their
//! encoding CMap's codespace, usually two bytes.

pub mod cmap;
mod encoding;

pub use cmap::CMap;
pub use encoding::{glyph_name_to_unicode, BaseEncoding};

use crate::content::Matrix;
use crate::document::Document;
use crate::object::{Dict, Object};
use std::collections::HashMap;

/// Advance used when a font gives no width, in thousandths of an em.
const FALLBACK_WIDTH: f32 = 500.0;

/// Fallback advance for Courier and fixed-pitch fonts.
const FIXED_PITCH_WIDTH: f32 = 600.0;

/// Composite-font default from the PDF reference (`/DW`).
const CID_DEFAULT_WIDTH: f32 = 1000.0;

/// Fixed-pitch bit of `/Flags`.
const FLAG_FIXED_PITCH: i64 = 1;

/// Font program family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    /// Type1, MMType1 or TrueType: one byte per code
    Simple,
    /// Glyphs defined by content streams, scaled by `/FontMatrix`
    Type3,
    /// Type0 with CID-keyed descendant
    Composite,
}

/// One decoded character code.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    /// Character code as read from the string
    pub code: u32,
    /// Unicode text; U+FFFD when unknown
    pub text: String,
    /// Horizontal advance in text space for a font size of 1
    pub width: f32,
    /// Single-byte code 32, which receives word spacing
    pub is_word_space: bool,
}

/// A font resource prepared for text extraction.
#[derive(Debug, Clone)]
pub struct Font {
    /// `/BaseFont`
    pub base_font: String,
    /// Font family
    pub kind: FontKind,
    encoding: Vec<Option<String>>,
    to_unicode: Option<CMap>,
    code_map: CMap,
    widths: HashMap<u32, f32>,
    default_width: f32,
    glyph_scale: f32,
}

impl Font {
    /// Font used when a `Tf` name cannot be resolved.
    pub fn fallback() -> Self {
        Self {
            base_font: "Helvetica".to_string(),
            kind: FontKind::Simple,
            encoding: standard_table(BaseEncoding::WinAnsi),
            to_unicode: None,
            code_map: CMap::default(),
            widths: HashMap::new(),
            default_width: FALLBACK_WIDTH,
            glyph_scale: 0.001,
        }
    }

    /// Read a font dictionary. Problems degrade to fallback behaviour and
    /// are logged; this never fails.
    pub fn load(doc: &Document, font: &Object) -> Self {
        let dict = match doc.resolve_object(font) {
            Ok(obj) => match obj.as_dict() {
                Some(d) => d.clone(),
                None => {
                    log::debug!("Font resource is a {}, using fallback", obj.type_name());
                    return Self::fallback();
                },
            },
            Err(e) => {
                log::debug!("Font resource unresolvable ({}), using fallback", e);
                return Self::fallback();
            },
        };

        let base_font = dict
            .get("BaseFont")
            .and_then(|o| o.as_name())
            .unwrap_or("Unknown")
            .to_string();
        let to_unicode = doc
            .resolve_entry(&dict, "ToUnicode")
            .and_then(|obj| match obj.decode_stream_data() {
                Ok(data) => Some(CMap::parse(&data)),
                Err(e) => {
                    log::warn!("ToUnicode of font '{}' undecodable: {}", base_font, e);
                    None
                },
            })
            .filter(|cmap| !cmap.is_empty());

        match dict.get("Subtype").and_then(|o| o.as_name()) {
            Some("Type0") => Self::load_composite(doc, &dict, base_font, to_unicode),
            subtype => Self::load_simple(doc, &dict, base_font, to_unicode, subtype == Some("Type3")),
        }
    }

    fn load_simple(doc: &Document, dict: &Dict, base_font: String, to_unicode: Option<CMap>, type3: bool) -> Self {
        let descriptor = doc
            .resolve_entry(dict, "FontDescriptor")
            .and_then(|d| d.as_dict().cloned())
            .unwrap_or_default();
        let fixed_pitch = descriptor
            .get("Flags")
            .and_then(|f| f.as_integer())
            .is_some_and(|f| f & FLAG_FIXED_PITCH != 0)
            || base_font.contains("Courier");
        let default_width = doc
            .resolve_entry(&descriptor, "MissingWidth")
            .and_then(|w| w.as_number())
            .map(|w| w as f32)
            .filter(|w| *w > 0.0)
            .unwrap_or(if fixed_pitch { FIXED_PITCH_WIDTH } else { FALLBACK_WIDTH });

        let first_char = dict.get("FirstChar").and_then(|o| o.as_integer()).unwrap_or(0).max(0) as u32;
        let mut widths = HashMap::new();
        if let Some(Object::Array(items)) = doc.resolve_entry(dict, "Widths") {
            for (i, item) in items.iter().enumerate() {
                if let Some(w) = doc.resolve_object(item).ok().and_then(|o| o.as_number()) {
                    widths.insert(first_char + i as u32, w as f32);
                }
            }
        }

        let glyph_scale = if type3 {
            doc.resolve_entry(dict, "FontMatrix")
                .and_then(|m| {
                    let values: Vec<f64> = m.as_array()?.iter().filter_map(|v| v.as_number()).collect();
                    Matrix::from_values(&values)
                })
                .map(|m| m.a)
                .unwrap_or(0.001)
        } else {
            0.001
        };

        let default_base = if dict.get("Subtype").and_then(|o| o.as_name()) == Some("TrueType") {
            BaseEncoding::WinAnsi
        } else {
            BaseEncoding::Standard
        };
        let encoding = simple_encoding(doc, dict.get("Encoding"), default_base);

        log::debug!(
            "Loaded {} font '{}' ({} widths, ToUnicode: {})",
            if type3 { "Type3" } else { "simple" },
            base_font,
            widths.len(),
            to_unicode.is_some()
        );
        Self {
            base_font,
            kind: if type3 { FontKind::Type3 } else { FontKind::Simple },
            encoding,
            to_unicode,
            code_map: CMap::default(),
            widths,
            default_width,
            glyph_scale,
        }
    }

    fn load_composite(doc: &Document, dict: &Dict, base_font: String, to_unicode: Option<CMap>) -> Self {
        let code_map = match doc.resolve_entry(dict, "Encoding") {
            Some(Object::Name(name)) => {
                if !name.starts_with("Identity") {
                    log::debug!("Predefined CMap /{} treated as two-byte identity", name);
                }
                CMap::identity()
            },
            Some(stream @ Object::Stream { .. }) => match stream.decode_stream_data() {
                Ok(data) => {
                    let parsed = CMap::parse(&data);
                    if parsed.has_codespaces() {
                        parsed
                    } else {
                        CMap::identity()
                    }
                },
                Err(e) => {
                    log::warn!("Encoding CMap of '{}' undecodable: {}", base_font, e);
                    CMap::identity()
                },
            },
            _ => CMap::identity(),
        };

        let descendant = doc
            .resolve_entry(dict, "DescendantFonts")
            .and_then(|d| d.as_array().and_then(|a| a.first()).cloned())
            .and_then(|d| doc.resolve_object(&d).ok())
            .and_then(|d| d.as_dict().cloned())
            .unwrap_or_default();
        let default_width = descendant
            .get("DW")
            .and_then(|w| w.as_number())
            .map(|w| w as f32)
            .unwrap_or(CID_DEFAULT_WIDTH);
        let widths = doc
            .resolve_entry(&descendant, "W")
            .and_then(|w| w.as_array().map(|items| cid_widths(doc, items)))
            .unwrap_or_default();

        log::debug!("Loaded composite font '{}' ({} CID widths)", base_font, widths.len());
        Self {
            base_font,
            kind: FontKind::Composite,
            encoding: Vec::new(),
            to_unicode,
            code_map,
            widths,
            default_width,
            glyph_scale: 0.001,
        }
    }

    /// Split a string operand into glyphs.
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let mut glyphs = Vec::with_capacity(bytes.len());
        let mut rest = bytes;
        while !rest.is_empty() {
            let (code, len) = match self.kind {
                FontKind::Composite => self.code_map.next_code(rest, 2),
                FontKind::Simple | FontKind::Type3 => Some((rest[0] as u32, 1)),
            }
            .unwrap_or((rest[0] as u32, 1));
            rest = &rest[len..];
            glyphs.push(Glyph {
                code,
                text: self.unicode(code),
                width: self.width(code) * self.glyph_scale,
                is_word_space: len == 1 && code == 32,
            });
        }
        glyphs
    }

    fn unicode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.lookup(code)) {
            if text != "\u{FFFD}" {
                return text.to_string();
            }
        }
        match self.kind {
            FontKind::Composite => self
                .code_map
                .cid(code)
                .and_then(char::from_u32)
                .filter(|c| !c.is_control())
                .map(String::from)
                .unwrap_or_else(|| "\u{FFFD}".to_string()),
            FontKind::Simple | FontKind::Type3 => self
                .encoding
                .get(code as usize)
                .cloned()
                .flatten()
                .unwrap_or_else(|| "\u{FFFD}".to_string()),
        }
    }

    /// Advance in glyph space units (thousandths of an em for most fonts).
    fn width(&self, code: u32) -> f32 {
        let key = match self.kind {
            FontKind::Composite => self.code_map.cid(code).unwrap_or(code),
            FontKind::Simple | FontKind::Type3 => code,
        };
        self.widths.get(&key).copied().unwrap_or(self.default_width)
    }
}

fn standard_table(base: BaseEncoding) -> Vec<Option<String>> {
    base.table().into_iter().map(|c| c.map(String::from)).collect()
}

/// Build a 256-entry table from `/Encoding` (a name or a dictionary with
/// `/BaseEncoding` and `/Differences`).
fn simple_encoding(doc: &Document, encoding: Option<&Object>, default_base: BaseEncoding) -> Vec<Option<String>> {
    let encoding = encoding.and_then(|e| doc.resolve_object(e).ok());
    match encoding {
        Some(Object::Name(name)) => standard_table(BaseEncoding::from_name(&name).unwrap_or(default_base)),
        Some(Object::Dictionary(dict)) => {
            let base = dict
                .get("BaseEncoding")
                .and_then(|b| b.as_name())
                .and_then(BaseEncoding::from_name)
                .unwrap_or(default_base);
            let mut table = standard_table(base);
            if let Some(Object::Array(diffs)) = dict.get("Differences").and_then(|d| doc.resolve_object(d).ok()) {
                apply_differences(&mut table, &diffs);
            }
            table
        },
        _ => standard_table(default_base),
    }
}

/// `[code /name /name ... code /name ...]`
fn apply_differences(table: &mut [Option<String>], diffs: &[Object]) {
    let mut code: usize = 0;
    for item in diffs {
        match item {
            Object::Integer(n) => code = (*n).clamp(0, 255) as usize,
            Object::Name(name) => {
                if let Some(slot) = table.get_mut(code) {
                    match glyph_name_to_unicode(name) {
                        Some(text) => *slot = Some(text),
                        None => log::debug!("Unknown glyph name /{} at code {}", name, code),
                    }
                }
                code += 1;
            },
            _ => {},
        }
    }
}

/// Parse a `/W` array: `c [w1 w2 ...]` or `c_first c_last w`.
fn cid_widths(doc: &Document, items: &[Object]) -> HashMap<u32, f32> {
    let items: Vec<Object> = items.iter().filter_map(|i| doc.resolve_object(i).ok()).collect();
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < items.len() {
        let Some(first) = items[i].as_integer().map(|n| n.max(0) as u32) else {
            i += 1;
            continue;
        };
        match items.get(i + 1) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = w.as_number() {
                        widths.insert(first + offset as u32, w as f32);
                    }
                }
                i += 2;
            },
            Some(last) => {
                let (Some(last), Some(w)) = (last.as_integer(), items.get(i + 2).and_then(|w| w.as_number())) else {
                    i += 1;
                    continue;
                };
                let last = (last.max(0) as u32).min(first + 0xFFFF);
                for cid in first..=last {
                    widths.insert(cid, w as f32);
                }
                i += 3;
            },
            None => break,
        }
    }
    widths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_font(widths: &[(u32, f32)]) -> Font {
        Font {
            widths: widths.iter().copied().collect(),
            ..Font::fallback()
        }
    }

    #[test]
    fn test_simple_decode() {
        let font = simple_font(&[(b'A' as u32, 667.0)]);
        let glyphs = font.decode(b"A B");
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[0].text, "A");
        assert!((glyphs[0].width - 0.667).abs() < 1e-6);
        assert!(glyphs[1].is_word_space);
        assert!((glyphs[2].width - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_differences() {
        let mut table = standard_table(BaseEncoding::WinAnsi);
        apply_differences(
            &mut table,
            &[
                Object::Integer(65),
                Object::Name("eacute".into()),
                Object::Name("bullet".into()),
                Object::Integer(1),
                Object::Name("fi".into()),
            ],
        );
        assert_eq!(table[65].as_deref(), Some("é"));
        assert_eq!(table[66].as_deref(), Some("\u{2022}"));
        assert_eq!(table[1].as_deref(), Some("\u{FB01}"));
        assert_eq!(table[67].as_deref(), Some("C"));
    }

    #[test]
    fn test_composite_decode_with_tounicode() {
        let font = Font {
            kind: FontKind::Composite,
            encoding: Vec::new(),
            to_unicode: Some(CMap::parse(b"beginbfchar <0001> <0041> <0002> <0042> endbfchar")),
            code_map: CMap::identity(),
            widths: [(1, 700.0)].into_iter().collect(),
            default_width: 1000.0,
            ..Font::fallback()
        };
        let glyphs = font.decode(&[0x00, 0x01, 0x00, 0x02, 0x00, 0x20]);
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[0].text, "A");
        assert_eq!(glyphs[1].text, "B");
        assert!((glyphs[0].width - 0.7).abs() < 1e-6);
        assert!((glyphs[1].width - 1.0).abs() < 1e-6);
        // Two-byte code 32 does not receive word spacing.
        assert!(!glyphs[2].is_word_space);
    }

    #[test]
    fn test_type3_scale() {
        let font = Font {
            kind: FontKind::Type3,
            glyph_scale: 0.01,
            widths: [(b'x' as u32, 50.0)].into_iter().collect(),
            ..Font::fallback()
        };
        assert!((font.decode(b"x")[0].width - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_code_is_replacement() {
        let font = Font::fallback();
        assert_eq!(font.decode(&[0x81])[0].text, "\u{FFFD}");
    }

    #[test]
    fn test_fffd_tounicode_falls_back_to_encoding() {
        let font = Font {
            to_unicode: Some(CMap::parse(b"beginbfchar <41> <FFFD> endbfchar")),
            ..Font::fallback()
        };
        assert_eq!(font.decode(b"A")[0].text, "A");
    }
}
