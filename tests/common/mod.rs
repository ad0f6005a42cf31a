//! Minimal PDF writer for integration tests.
//!
//! Produces documents with correct xref offsets, optional FlateDecode
//! content streams and optional RC4-128 (revision 3) standard security.

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use md5::{Digest, Md5};
use pdf_tabula::encryption::{compute_file_key, compute_owner_key, compute_user_key, rc4_crypt, EncryptDict};
use std::collections::BTreeMap;
use std::io::Write;

/// First element of the trailer `/ID`.
pub const FILE_ID: &[u8; 16] = b"pdf_tabula_tests";

enum Body {
    Plain(String),
    Stream { dict: String, data: Vec<u8> },
}

struct Rc4Security {
    dict: EncryptDict,
    file_key: Vec<u8>,
}

/// Builder for a document with numbered objects. Object 1 is the catalog.
pub struct PdfBuilder {
    objects: BTreeMap<u32, Body>,
    compress: bool,
    security: Option<Rc4Security>,
    info: Option<u32>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            compress: false,
            security: None,
            info: None,
        }
    }

    /// FlateDecode every stream added with [`PdfBuilder::stream`].
    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Protect the document with RC4-128, revision 3.
    pub fn encrypted(mut self, user_password: &str, owner_password: &str) -> Self {
        let mut dict = EncryptDict {
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
            crypt_filters: Default::default(),
            stream_filter: None,
            string_filter: None,
        };
        dict.owner_key = compute_owner_key(owner_password.as_bytes(), user_password.as_bytes(), 3, 16);
        let file_key = compute_file_key(user_password.as_bytes(), &dict, FILE_ID);
        dict.user_key = compute_user_key(&file_key, &dict, FILE_ID);
        self.security = Some(Rc4Security { dict, file_key });
        self
    }

    pub fn object(&mut self, id: u32, body: impl Into<String>) -> &mut Self {
        self.objects.insert(id, Body::Plain(body.into()));
        self
    }

    /// A stream object; `dict_entries` go inside `<< >>` next to `/Length`.
    pub fn stream(&mut self, id: u32, dict_entries: &str, data: &[u8]) -> &mut Self {
        let (dict, data) = if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            (format!("{} /Filter /FlateDecode", dict_entries), encoder.finish().unwrap())
        } else {
            (dict_entries.to_string(), data.to_vec())
        };
        self.objects.insert(id, Body::Stream { dict, data });
        self
    }

    pub fn info(&mut self, id: u32) -> &mut Self {
        self.info = Some(id);
        self
    }

    pub fn next_id(&self) -> u32 {
        self.objects.keys().next_back().map_or(1, |last| last + 1)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let mut offsets = BTreeMap::new();
        for (&id, body) in &self.objects {
            offsets.insert(id, out.len());
            out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
            match body {
                Body::Plain(text) => out.extend_from_slice(text.as_bytes()),
                Body::Stream { dict, data } => {
                    let data = match &self.security {
                        Some(sec) => rc4_crypt(&object_key(&sec.file_key, id), data),
                        None => data.clone(),
                    };
                    out.extend_from_slice(format!("<< {} /Length {} >>\nstream\n", dict, data.len()).as_bytes());
                    out.extend_from_slice(&data);
                    out.extend_from_slice(b"\nendstream");
                },
            }
            out.extend_from_slice(b"\nendobj\n");
        }

        let mut size = self.next_id();
        let mut trailer_extra = format!("/ID [<{}> <{}>]", hex(FILE_ID), hex(FILE_ID));
        if let Some(sec) = &self.security {
            let id = size;
            size += 1;
            offsets.insert(id, out.len());
            out.extend_from_slice(
                format!(
                    "{} 0 obj\n<< /Filter /Standard /V 2 /R 3 /Length 128 /P {} /O <{}> /U <{}> >>\nendobj\n",
                    id,
                    sec.dict.permissions,
                    hex(&sec.dict.owner_key),
                    hex(&sec.dict.user_key)
                )
                .as_bytes(),
            );
            trailer_extra.push_str(&format!(" /Encrypt {} 0 R", id));
        }
        if let Some(info) = self.info {
            trailer_extra.push_str(&format!(" /Info {} 0 R", info));
        }

        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
        for id in 1..size {
            match offsets.get(&id) {
                Some(off) => out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes()),
                None => out.extend_from_slice(b"0000000000 00000 f \n"),
            }
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                size, trailer_extra, xref
            )
            .as_bytes(),
        );
        out
    }
}

/// Per-object RC4 key for generation 0.
fn object_key(file_key: &[u8], id: u32) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&id.to_le_bytes()[..3]);
    hasher.update(0u16.to_le_bytes());
    let hash = hasher.finalize();
    hash[..(file_key.len() + 5).min(16)].to_vec()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Letter-sized pages sharing Helvetica as `/F1`.
///
/// Catalog 1, pages 2, font 3, then page `i` at `4 + 2i` with its content
/// at `5 + 2i`.
pub fn pages_document(builder: PdfBuilder, pages: &[String]) -> Vec<u8> {
    let mut builder = builder;
    let kids: Vec<String> = (0..pages.len()).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages.len()),
        )
        .object(
            3,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        );
    for (i, content) in pages.iter().enumerate() {
        let page_id = 4 + 2 * i as u32;
        builder
            .object(
                page_id,
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                     /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                    page_id + 1
                ),
            )
            .stream(page_id + 1, "", content.as_bytes());
    }
    builder.build()
}

/// Plain, uncompressed document.
pub fn simple_document(pages: &[String]) -> Vec<u8> {
    pages_document(PdfBuilder::new(), pages)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)")
}

/// One text run at `(x, baseline)` in 10pt Helvetica.
pub fn text_at(x: f32, baseline: f32, text: &str) -> String {
    format!("BT /F1 10 Tf {} {} Td ({}) Tj ET\n", x, baseline, escape(text))
}

/// A fully ruled grid with its top-left corner at `(x0, top)`. Text sits
/// 10pt right of each cell's left edge and 25pt below its top edge.
pub fn ruled_table(x0: f32, top: f32, column_width: f32, row_height: f32, rows: &[&[&str]]) -> String {
    let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let right = x0 + column_width * columns as f32;
    let bottom = top - row_height * rows.len() as f32;
    let mut out = String::from("0.5 w\n");
    for r in 0..=rows.len() {
        let y = top - row_height * r as f32;
        out.push_str(&format!("{} {} m {} {} l S\n", x0, y, right, y));
    }
    for c in 0..=columns {
        let x = x0 + column_width * c as f32;
        out.push_str(&format!("{} {} m {} {} l S\n", x, bottom, x, top));
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let x = x0 + column_width * c as f32 + 10.0;
            let baseline = top - row_height * r as f32 - 25.0;
            out.push_str(&text_at(x, baseline, cell));
        }
    }
    out
}

/// Text aligned on fixed columns, one line every 14pt from `top`.
pub fn whitespace_table(columns: &[f32], top: f32, rows: &[&[&str]]) -> String {
    let mut out = String::new();
    for (r, row) in rows.iter().enumerate() {
        let baseline = top - 14.0 * r as f32;
        for (x, cell) in columns.iter().zip(row.iter()) {
            out.push_str(&text_at(*x, baseline, cell));
        }
    }
    out
}

/// The reference two-column table: Name/Age, Alice/30, Bob/25.
pub fn name_age_table() -> String {
    ruled_table(
        100.0,
        700.0,
        100.0,
        40.0,
        &[&["Name", "Age"], &["Alice", "30"], &["Bob", "25"]],
    )
}

/// Content for a page carrying one marker line and one small table.
pub fn numbered_page(index: usize) -> String {
    let mut content = text_at(72.0, 740.0, &format!("Page {} heading", index + 1));
    content.push_str(&ruled_table(
        100.0,
        700.0,
        100.0,
        40.0,
        &[&["Key", "Value"], &[&format!("p{}", index + 1), &format!("{}", (index + 1) * 10)]],
    ));
    content
}
