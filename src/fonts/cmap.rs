//! CMap parsing.
//!
//! Handles both `/ToUnicode` CMaps (`bfchar`, `bfrange`) and embedded
//! encoding CMaps of composite fonts (`cidchar`, `cidrange`). Codespace
//! ranges decide how many bytes each character code occupies.
//!
//! ```text
//! 1 begincodespacerange <0000> <FFFF> endcodespacerange
//! 2 beginbfchar
//! <0003> <0020>
//! <0011> <00660069>
//! endbfchar
//! 1 beginbfrange
//! <0024> <003D> <0041>
//! endbfrange
//! ```

use crate::content::parser::raw_operations;
use crate::object::Object;
use std::collections::HashMap;

/// Longest range expanded from one `bfrange` or `cidrange` entry.
const MAX_RANGE: u32 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodespaceRange {
    low: u32,
    high: u32,
    bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CidRange {
    low: u32,
    high: u32,
    first_cid: u32,
}

/// Parsed CMap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CMap {
    codespaces: Vec<CodespaceRange>,
    unicode: HashMap<u32, String>,
    cid_ranges: Vec<CidRange>,
    identity: bool,
}

impl CMap {
    /// Parse a decoded CMap stream. Unparseable entries are skipped.
    pub fn parse(data: &[u8]) -> Self {
        let (ops, malformed) = raw_operations(data);
        if malformed > 0 {
            log::debug!("CMap contained {} malformed sections", malformed);
        }

        let mut cmap = CMap::default();
        for op in ops {
            match op.name.as_str() {
                "endcodespacerange" => {
                    for pair in op.operands.chunks_exact(2) {
                        if let (Some(lo), Some(hi)) = (pair[0].as_string(), pair[1].as_string()) {
                            if !lo.is_empty() && lo.len() <= 4 && lo.len() == hi.len() {
                                cmap.codespaces.push(CodespaceRange {
                                    low: code_value(lo),
                                    high: code_value(hi),
                                    bytes: lo.len(),
                                });
                            }
                        }
                    }
                },
                "endbfchar" => {
                    for pair in op.operands.chunks_exact(2) {
                        let Some(src) = pair[0].as_string() else { continue };
                        if let Some(dst) = destination(&pair[1]) {
                            cmap.unicode.insert(code_value(src), dst);
                        }
                    }
                },
                "endbfrange" => {
                    for triple in op.operands.chunks_exact(3) {
                        cmap.add_bfrange(&triple[0], &triple[1], &triple[2]);
                    }
                },
                "endcidchar" => {
                    for pair in op.operands.chunks_exact(2) {
                        if let (Some(src), Some(cid)) = (pair[0].as_string(), pair[1].as_integer()) {
                            let code = code_value(src);
                            cmap.cid_ranges.push(CidRange {
                                low: code,
                                high: code,
                                first_cid: cid.max(0) as u32,
                            });
                        }
                    }
                },
                "endcidrange" => {
                    for triple in op.operands.chunks_exact(3) {
                        if let (Some(lo), Some(hi), Some(cid)) =
                            (triple[0].as_string(), triple[1].as_string(), triple[2].as_integer())
                        {
                            cmap.cid_ranges.push(CidRange {
                                low: code_value(lo),
                                high: code_value(hi),
                                first_cid: cid.max(0) as u32,
                            });
                        }
                    }
                },
                "usecmap" => log::debug!("Ignoring usecmap in embedded CMap"),
                _ => {},
            }
        }
        cmap
    }

    /// The predefined `Identity-H` / `Identity-V` CMap.
    pub fn identity() -> Self {
        Self {
            codespaces: vec![CodespaceRange {
                low: 0,
                high: 0xFFFF,
                bytes: 2,
            }],
            identity: true,
            ..Default::default()
        }
    }

    fn add_bfrange(&mut self, lo: &Object, hi: &Object, dst: &Object) {
        let (Some(lo), Some(hi)) = (lo.as_string(), hi.as_string()) else { return };
        let (start, end) = (code_value(lo), code_value(hi));
        if end < start || end - start > MAX_RANGE {
            log::debug!("Skipping bfrange {:X}..{:X}", start, end);
            return;
        }
        match dst {
            Object::Array(items) => {
                for (code, item) in (start..=end).zip(items) {
                    if let Some(text) = destination(item) {
                        self.unicode.insert(code, text);
                    }
                }
            },
            Object::String(bytes) => {
                let base = utf16_units(bytes);
                let Some(&last) = base.last() else { return };
                for (offset, code) in (start..=end).enumerate() {
                    let mut units = base.clone();
                    let bumped = last as u32 + offset as u32;
                    if bumped > 0xFFFF {
                        break;
                    }
                    if let Some(slot) = units.last_mut() {
                        *slot = bumped as u16;
                    }
                    self.unicode.insert(code, String::from_utf16_lossy(&units));
                }
            },
            _ => {},
        }
    }

    /// Unicode text for a code, if mapped.
    pub fn lookup(&self, code: u32) -> Option<&str> {
        self.unicode.get(&code).map(String::as_str)
    }

    /// CID for a code. Identity maps every code to itself.
    pub fn cid(&self, code: u32) -> Option<u32> {
        if self.identity {
            return Some(code);
        }
        self.cid_ranges
            .iter()
            .rev()
            .find(|r| (r.low..=r.high).contains(&code))
            .map(|r| r.first_cid + (code - r.low))
    }

    /// True when codespace ranges were declared.
    pub fn has_codespaces(&self) -> bool {
        !self.codespaces.is_empty()
    }

    /// Read the next character code from `bytes`, returning it with its
    /// length. Falls back to the shortest declared code length when no range
    /// matches, and to `default_len` without codespaces.
    pub fn next_code(&self, bytes: &[u8], default_len: usize) -> Option<(u32, usize)> {
        if bytes.is_empty() {
            return None;
        }
        for len in 1..=4usize.min(bytes.len()) {
            let code = code_value(&bytes[..len]);
            if self
                .codespaces
                .iter()
                .any(|r| r.bytes == len && (r.low..=r.high).contains(&code))
            {
                return Some((code, len));
            }
        }
        let len = self
            .codespaces
            .iter()
            .map(|r| r.bytes)
            .min()
            .unwrap_or(default_len)
            .clamp(1, 4)
            .min(bytes.len());
        Some((code_value(&bytes[..len]), len))
    }

    /// Number of Unicode mappings.
    pub fn len(&self) -> usize {
        self.unicode.len()
    }

    /// True when there are no Unicode mappings.
    pub fn is_empty(&self) -> bool {
        self.unicode.is_empty()
    }
}

/// Big-endian value of up to four code bytes.
fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().take(4).fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    if bytes.len() == 1 {
        return vec![bytes[0] as u16];
    }
    bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => *single as u16,
            _ => 0,
        })
        .collect()
}

/// `bfchar` destinations are UTF-16BE strings or, rarely, glyph names.
fn destination(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes) if !bytes.is_empty() => Some(String::from_utf16_lossy(&utf16_units(bytes))),
        Object::Name(name) => super::encoding::glyph_name_to_unicode(name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bfchar() {
        let cmap = CMap::parse(b"2 beginbfchar\n<0041> <0058>\n<00E9> <00E9>\nendbfchar");
        assert_eq!(cmap.lookup(0x41), Some("X"));
        assert_eq!(cmap.lookup(0xE9), Some("é"));
        assert_eq!(cmap.len(), 2);
    }

    #[test]
    fn test_parse_bfchar_ligature() {
        let cmap = CMap::parse(b"beginbfchar <000C> <00660069> endbfchar");
        assert_eq!(cmap.lookup(0x0C), Some("fi"));
    }

    #[test]
    fn test_surrogate_pair() {
        let cmap = CMap::parse(b"beginbfchar <01> <D835DF0C> endbfchar");
        assert_eq!(cmap.lookup(0x01), Some("\u{1D70C}"));
    }

    #[test]
    fn test_parse_bfrange_sequential() {
        let cmap = CMap::parse(b"beginbfrange\n<0020> <007E> <0020>\nendbfrange");
        assert_eq!(cmap.lookup(0x20), Some(" "));
        assert_eq!(cmap.lookup(0x41), Some("A"));
        assert_eq!(cmap.lookup(0x7E), Some("~"));
        assert_eq!(cmap.lookup(0x7F), None);
    }

    #[test]
    fn test_parse_bfrange_array() {
        let cmap = CMap::parse(b"beginbfrange <005F> <0061> [<00660066> <00660069> <00660066006C>] endbfrange");
        assert_eq!(cmap.lookup(0x5F), Some("ff"));
        assert_eq!(cmap.lookup(0x60), Some("fi"));
        assert_eq!(cmap.lookup(0x61), Some("ffl"));
    }

    #[test]
    fn test_codespace_lengths() {
        let cmap = CMap::parse(b"2 begincodespacerange <00> <80> <8140> <FFFF> endcodespacerange");
        assert_eq!(cmap.next_code(b"\x41\x42", 1), Some((0x41, 1)));
        assert_eq!(cmap.next_code(b"\x81\x40\x41", 1), Some((0x8140, 2)));
        assert_eq!(cmap.next_code(b"", 1), None);
    }

    #[test]
    fn test_no_codespace_uses_default() {
        let cmap = CMap::parse(b"beginbfchar <41> <0041> endbfchar");
        assert!(!cmap.has_codespaces());
        assert_eq!(cmap.next_code(b"\x00\x41", 2), Some((0x41, 2)));
    }

    #[test]
    fn test_cid_ranges() {
        let cmap = CMap::parse(b"begincidrange <0000> <00FF> 100 endcidrange begincidchar <0105> 7 endcidchar");
        assert_eq!(cmap.cid(0x10), Some(116));
        assert_eq!(cmap.cid(0x0105), Some(7));
        assert_eq!(cmap.cid(0x0200), None);
        assert_eq!(CMap::identity().cid(0x1234), Some(0x1234));
    }

    #[test]
    fn test_full_tounicode_stream() {
        let data = b"/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
/CMapName /Adobe-Identity-UCS def\n1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n\
1 beginbfchar\n<0003> <0020>\nendbfchar\nendcmap\nCMapName currentdict /CMap defineresource pop\nend\nend";
        let cmap = CMap::parse(data);
        assert_eq!(cmap.lookup(3), Some(" "));
        assert!(cmap.has_codespaces());
    }

    #[test]
    fn test_empty() {
        assert!(CMap::parse(b"").is_empty());
    }
}
