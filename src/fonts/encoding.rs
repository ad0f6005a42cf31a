//! Simple-font encodings and glyph names.

/// Glyph names of printable ASCII, 0x20 to 0x7E.
const ASCII_NAMES: &[&str] = &[
    "space", "exclam", "quotedbl", "numbersign", "dollar", "percent", "ampersand", "quotesingle", "parenleft",
    "parenright", "asterisk", "plus", "comma", "hyphen", "period", "slash", "zero", "one", "two", "three", "four",
    "five", "six", "seven", "eight", "nine", "colon", "semicolon", "less", "equal", "greater", "question", "at", "A",
    "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V", "W",
    "X", "Y", "Z", "bracketleft", "backslash", "bracketright", "asciicircum", "underscore", "grave", "a", "b", "c",
    "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y",
    "z", "braceleft", "bar", "braceright", "asciitilde",
];

/// Glyph names of Latin-1, 0xA0 to 0xFF.
const LATIN1_NAMES: &[&str] = &[
    "nbspace", "exclamdown", "cent", "sterling", "currency", "yen", "brokenbar", "section", "dieresis", "copyright",
    "ordfeminine", "guillemotleft", "logicalnot", "sfthyphen", "registered", "macron", "degree", "plusminus",
    "twosuperior", "threesuperior", "acute", "mu", "paragraph", "periodcentered", "cedilla", "onesuperior",
    "ordmasculine", "guillemotright", "onequarter", "onehalf", "threequarters", "questiondown", "Agrave", "Aacute",
    "Acircumflex", "Atilde", "Adieresis", "Aring", "AE", "Ccedilla", "Egrave", "Eacute", "Ecircumflex", "Edieresis",
    "Igrave", "Iacute", "Icircumflex", "Idieresis", "Eth", "Ntilde", "Ograve", "Oacute", "Ocircumflex", "Otilde",
    "Odieresis", "multiply", "Oslash", "Ugrave", "Uacute", "Ucircumflex", "Udieresis", "Yacute", "Thorn",
    "germandbls", "agrave", "aacute", "acircumflex", "atilde", "adieresis", "aring", "ae", "ccedilla", "egrave",
    "eacute", "ecircumflex", "edieresis", "igrave", "iacute", "icircumflex", "idieresis", "eth", "ntilde", "ograve",
    "oacute", "ocircumflex", "otilde", "odieresis", "divide", "oslash", "ugrave", "uacute", "ucircumflex",
    "udieresis", "yacute", "thorn", "ydieresis",
];

/// Common glyph names outside ASCII and Latin-1.
const EXTRA_NAMES: &[(&str, char)] = &[
    ("bullet", '\u{2022}'),
    ("endash", '\u{2013}'),
    ("emdash", '\u{2014}'),
    ("quoteleft", '\u{2018}'),
    ("quoteright", '\u{2019}'),
    ("quotesinglbase", '\u{201A}'),
    ("quotedblleft", '\u{201C}'),
    ("quotedblright", '\u{201D}'),
    ("quotedblbase", '\u{201E}'),
    ("dagger", '\u{2020}'),
    ("daggerdbl", '\u{2021}'),
    ("ellipsis", '\u{2026}'),
    ("perthousand", '\u{2030}'),
    ("guilsinglleft", '\u{2039}'),
    ("guilsinglright", '\u{203A}'),
    ("fraction", '\u{2044}'),
    ("Euro", '\u{20AC}'),
    ("trademark", '\u{2122}'),
    ("minus", '\u{2212}'),
    ("fi", '\u{FB01}'),
    ("fl", '\u{FB02}'),
    ("florin", '\u{0192}'),
    ("circumflex", '\u{02C6}'),
    ("tilde", '\u{02DC}'),
    ("caron", '\u{02C7}'),
    ("breve", '\u{02D8}'),
    ("dotaccent", '\u{02D9}'),
    ("ring", '\u{02DA}'),
    ("ogonek", '\u{02DB}'),
    ("hungarumlaut", '\u{02DD}'),
    ("dotlessi", '\u{0131}'),
    ("Lslash", '\u{0141}'),
    ("lslash", '\u{0142}'),
    ("OE", '\u{0152}'),
    ("oe", '\u{0153}'),
    ("Scaron", '\u{0160}'),
    ("scaron", '\u{0161}'),
    ("Ydieresis", '\u{0178}'),
    ("Zcaron", '\u{017D}'),
    ("zcaron", '\u{017E}'),
    ("hyphenminus", '-'),
];

/// Windows-1252 codes 0x80 to 0x9F.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Mac OS Roman codes 0x80 to 0xFF.
const MAC_ROMAN_HIGH: &str = "ÄÅÇÉÑÖÜáàâäãåçéèêëíìîïñóòôöõúùûü†°¢£§•¶ß®©™´¨≠ÆØ∞±≤≥¥µ∂∑∏π∫ªºΩæø¿¡¬√ƒ≈∆«»…\u{00A0}ÀÃÕŒœ–—“”‘’÷◊ÿŸ⁄€‹›ﬁﬂ‡·‚„‰ÂÊÁËÈÍÎÏÌÓÔ\u{F8FF}ÒÚÛÙıˆ˜¯˘˙˚¸˝˛ˇ";

/// StandardEncoding codes above 0x7F that are defined.
const STANDARD_HIGH: &[(u8, char)] = &[
    (0xA1, '¡'),
    (0xA2, '¢'),
    (0xA3, '£'),
    (0xA4, '\u{2044}'),
    (0xA5, '¥'),
    (0xA6, 'ƒ'),
    (0xA7, '§'),
    (0xA8, '¤'),
    (0xA9, '\''),
    (0xAA, '\u{201C}'),
    (0xAB, '«'),
    (0xAC, '\u{2039}'),
    (0xAD, '\u{203A}'),
    (0xAE, '\u{FB01}'),
    (0xAF, '\u{FB02}'),
    (0xB1, '\u{2013}'),
    (0xB2, '\u{2020}'),
    (0xB3, '\u{2021}'),
    (0xB4, '·'),
    (0xB6, '¶'),
    (0xB7, '\u{2022}'),
    (0xB8, '\u{201A}'),
    (0xB9, '\u{201E}'),
    (0xBA, '\u{201D}'),
    (0xBB, '»'),
    (0xBC, '\u{2026}'),
    (0xBD, '\u{2030}'),
    (0xBF, '¿'),
    (0xC1, '`'),
    (0xC2, '´'),
    (0xC3, 'ˆ'),
    (0xC4, '˜'),
    (0xC5, '¯'),
    (0xC6, '˘'),
    (0xC7, '˙'),
    (0xC8, '¨'),
    (0xCA, '˚'),
    (0xCB, '¸'),
    (0xCD, '˝'),
    (0xCE, '˛'),
    (0xCF, 'ˇ'),
    (0xD0, '\u{2014}'),
    (0xE1, 'Æ'),
    (0xE3, 'ª'),
    (0xE8, 'Ł'),
    (0xE9, 'Ø'),
    (0xEA, 'Œ'),
    (0xEB, 'º'),
    (0xF1, 'æ'),
    (0xF5, 'ı'),
    (0xF8, 'ł'),
    (0xF9, 'ø'),
    (0xFA, 'œ'),
    (0xFB, 'ß'),
];

/// Named base encodings of simple fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseEncoding {
    /// Adobe StandardEncoding
    Standard,
    /// WinAnsiEncoding (Windows-1252)
    WinAnsi,
    /// MacRomanEncoding
    MacRoman,
}

impl BaseEncoding {
    /// Encoding for an `/Encoding` or `/BaseEncoding` name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "StandardEncoding" => Some(BaseEncoding::Standard),
            "WinAnsiEncoding" => Some(BaseEncoding::WinAnsi),
            "MacRomanEncoding" | "MacExpertEncoding" => Some(BaseEncoding::MacRoman),
            _ => None,
        }
    }

    /// Character for a single-byte code.
    pub fn lookup(self, code: u8) -> Option<char> {
        match (self, code) {
            (BaseEncoding::Standard, 0x27) => Some('\u{2019}'),
            (BaseEncoding::Standard, 0x60) => Some('\u{2018}'),
            (_, 0x20..=0x7E) => Some(code as char),
            (BaseEncoding::Standard, _) => STANDARD_HIGH
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, ch)| *ch),
            (BaseEncoding::WinAnsi, 0x80..=0x9F) => WIN_ANSI_HIGH[(code - 0x80) as usize],
            (BaseEncoding::WinAnsi, 0xA0..=0xFF) => char::from_u32(code as u32),
            (BaseEncoding::MacRoman, 0x80..=0xFF) => MAC_ROMAN_HIGH.chars().nth((code - 0x80) as usize),
            _ => None,
        }
    }

    /// Full 256-entry table.
    pub fn table(self) -> Vec<Option<char>> {
        (0..=255u8).map(|code| self.lookup(code)).collect()
    }
}

/// Unicode for a glyph name from a `/Differences` array.
///
/// Knows the ASCII and Latin-1 glyph names, common typographic names, and
/// the `uniXXXX` and `uXXXX` conventions.
pub fn glyph_name_to_unicode(name: &str) -> Option<String> {
    if let Some(i) = ASCII_NAMES.iter().position(|n| *n == name) {
        return Some(((0x20 + i) as u8 as char).to_string());
    }
    if let Some(i) = LATIN1_NAMES.iter().position(|n| *n == name) {
        return char::from_u32(0xA0 + i as u32).map(String::from);
    }
    if let Some((_, ch)) = EXTRA_NAMES.iter().find(|(n, _)| *n == name) {
        return Some(ch.to_string());
    }
    match name {
        "ff" => return Some("ff".to_string()),
        "ffi" => return Some("ffi".to_string()),
        "ffl" => return Some("ffl".to_string()),
        _ => {},
    }

    // Suffixes such as "a.sc" or "one.oldstyle" name variants of the base glyph.
    if let Some((base, _)) = name.split_once('.') {
        if !base.is_empty() {
            return glyph_name_to_unicode(base);
        }
    }

    if let Some(digits) = name.strip_prefix("uni").filter(|h| h.len() >= 4 && h.len() % 4 == 0) {
        let units: Option<Vec<u16>> = digits
            .as_bytes()
            .chunks(4)
            .map(|chunk| std::str::from_utf8(chunk).ok().and_then(|s| u16::from_str_radix(s, 16).ok()))
            .collect();
        return units.map(|u| String::from_utf16_lossy(&u));
    }
    let hex = name.strip_prefix('u').filter(|h| (4..=6).contains(&h.len()))?;
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_ansi() {
        let t = BaseEncoding::WinAnsi.table();
        assert_eq!(t[b'A' as usize], Some('A'));
        assert_eq!(t[0x27], Some('\''));
        assert_eq!(t[0x96], Some('\u{2013}'));
        assert_eq!(t[0xE9], Some('é'));
        assert_eq!(t[0x81], None);
    }

    #[test]
    fn test_standard_quotes() {
        assert_eq!(BaseEncoding::Standard.lookup(0x27), Some('\u{2019}'));
        assert_eq!(BaseEncoding::Standard.lookup(0xD0), Some('\u{2014}'));
        assert_eq!(BaseEncoding::Standard.lookup(0xE9), Some('Ø'));
    }

    #[test]
    fn test_mac_roman() {
        assert_eq!(MAC_ROMAN_HIGH.chars().count(), 128);
        assert_eq!(BaseEncoding::MacRoman.lookup(0x8E), Some('é'));
        assert_eq!(BaseEncoding::MacRoman.lookup(0xD0), Some('\u{2013}'));
    }

    #[test]
    fn test_glyph_names() {
        assert_eq!(glyph_name_to_unicode("A").as_deref(), Some("A"));
        assert_eq!(glyph_name_to_unicode("zero").as_deref(), Some("0"));
        assert_eq!(glyph_name_to_unicode("eacute").as_deref(), Some("é"));
        assert_eq!(glyph_name_to_unicode("emdash").as_deref(), Some("\u{2014}"));
        assert_eq!(glyph_name_to_unicode("uni0041").as_deref(), Some("A"));
        assert_eq!(glyph_name_to_unicode("u1F600").as_deref(), Some("\u{1F600}"));
        assert_eq!(glyph_name_to_unicode("a.sc").as_deref(), Some("a"));
        assert_eq!(glyph_name_to_unicode("g123"), None);
    }
}
