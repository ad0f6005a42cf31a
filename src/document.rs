//! PDF document model and loader.
//!
//! A [`Document`] owns the raw file bytes and the merged cross-reference
//! table. Objects are parsed on demand from the immutable buffer and
//! decrypted per object; object streams are expanded once while loading.
//! Nothing is cached behind interior mutability, so a loaded document is
//! `Send + Sync` and can be shared by every page worker.
//!
//! # Example
//!
//! ```no_run
//! use pdf_tabula::document::Document;
//!
//! let doc = Document::open("journal.pdf", None)?;
//! println!("{} pages", doc.page_count());
//! # Ok::<(), pdf_tabula::error::Error>(())
//! ```

use crate::encryption::{encrypt_dict_from_object, SecurityHandler};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_indirect_object;
use crate::xref::{find_xref_offset, parse_xref, CrossRefTable, XRefEntry};
use crate::xref_reconstruction::reconstruct_xref;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// Longest chain of references followed by [`Document::resolve_object`].
const MAX_REFERENCE_CHAIN: u32 = 32;

/// Deepest page tree accepted.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// US Letter, used when no `/MediaBox` can be found.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Whether and how a document is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionState {
    /// No `/Encrypt` entry
    None,
    /// Encrypted and the empty user password does not open it
    PasswordProtected,
    /// Encrypted and authenticated
    Unlocked,
}

/// Document information dictionary fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Number of pages in the page tree
    pub page_count: usize,
    /// `/Producer`
    pub producer: Option<String>,
    /// `/Title`
    pub title: Option<String>,
}

/// A leaf of the page tree with inherited attributes applied.
#[derive(Debug, Clone)]
pub struct PageHandle {
    /// Zero-based position in document order
    pub index: usize,
    /// The page dictionary's reference, when it was indirect
    pub object_ref: Option<ObjectRef>,
    /// `/MediaBox` as `[llx, lly, urx, ury]`
    pub media_box: [f64; 4],
    /// `/CropBox`, when present
    pub crop_box: Option<[f64; 4]>,
    /// Resource dictionary (values may still be references)
    pub resources: Dict,
    /// `/Contents`: a stream reference, a stream, or an array of them
    pub contents: Option<Object>,
    /// `/Rotate`, normalized to 0, 90, 180 or 270
    pub rotate: i64,
}

/// Decoded content bytes of a page.
#[derive(Debug, Clone, Default)]
pub struct PageContents {
    /// Concatenated content streams, separated by newlines
    pub data: Vec<u8>,
    /// Streams that could not be resolved or decoded
    pub undecodable: usize,
}

/// Options controlling how a document is loaded.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// User or owner password
    pub password: Option<String>,
    /// Fall back to a linear object scan when the xref data is unusable
    pub allow_recovery: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            password: None,
            allow_recovery: true,
        }
    }
}

/// Builds [`Document`]s from raw bytes.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    options: LoaderOptions,
}

/// Cross-reference data from either the regular chain or reconstruction.
struct Structure {
    xref: CrossRefTable,
    object_streams: Vec<u32>,
    recovered: bool,
}

impl Loader {
    /// Loader with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader with explicit options.
    pub fn with_options(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Report whether a document needs a password, without unlocking it.
    pub fn encryption_state(data: &[u8]) -> Result<EncryptionState> {
        let loader = Loader::new();
        let structure = loader.read_structure(data)?;
        let probe = Document::skeleton(Bytes::copy_from_slice(data), structure.xref, (1, 0));
        let Some(encrypt) = probe.trailer.get("Encrypt").cloned() else {
            return Ok(EncryptionState::None);
        };
        let dict = encrypt_dict_from_object(&probe.resolve_object(&encrypt)?)?;
        match SecurityHandler::authenticate(&dict, &file_id(&probe.trailer), None) {
            Ok(_) => Ok(EncryptionState::Unlocked),
            Err(Error::Decryption(_)) => Ok(EncryptionState::PasswordProtected),
            Err(e) => Err(e),
        }
    }

    /// Parse, authenticate and index a document.
    pub fn load(&self, data: impl Into<Bytes>) -> Result<Document> {
        let data: Bytes = data.into();
        let version = parse_header(&data)?;
        let structure = self.read_structure(&data)?;
        let recovered = structure.recovered;

        match self.build(data.clone(), version, structure) {
            Ok(doc) => Ok(doc),
            Err(e) if !recovered && self.options.allow_recovery && e.kind() == crate::error::ErrorKind::Malformed => {
                log::warn!("Document structure unusable ({}), reconstructing xref", e);
                let structure = self.reconstruct(&data)?;
                self.build(data, version, structure)
            },
            Err(e) => Err(e.into_malformed()),
        }
    }

    fn read_structure(&self, data: &[u8]) -> Result<Structure> {
        let regular = find_xref_offset(data).and_then(|offset| parse_xref(data, offset));
        match regular {
            Ok(xref) if !xref.is_empty() && xref.trailer().contains_key("Root") => Ok(Structure {
                xref,
                object_streams: Vec::new(),
                recovered: false,
            }),
            Ok(_) if self.options.allow_recovery => {
                log::warn!("Cross-reference data is empty or has no /Root, scanning file");
                self.reconstruct(data)
            },
            Err(e) if self.options.allow_recovery => {
                log::warn!("Cross-reference chain broken ({}), scanning file", e);
                self.reconstruct(data)
            },
            Ok(_) => Err(Error::MalformedDocument {
                page: None,
                reason: "trailer has no /Root".to_string(),
            }),
            Err(e) => Err(e.into_malformed()),
        }
    }

    fn reconstruct(&self, data: &[u8]) -> Result<Structure> {
        let rec = reconstruct_xref(data).map_err(Error::into_malformed)?;
        Ok(Structure {
            xref: rec.table,
            object_streams: rec.object_streams,
            recovered: true,
        })
    }

    fn build(&self, data: Bytes, version: (u8, u8), structure: Structure) -> Result<Document> {
        let mut doc = Document::skeleton(data, structure.xref, version);
        doc.recovered = structure.recovered;

        if let Some(encrypt) = doc.trailer.get("Encrypt").cloned() {
            doc.encrypt_ref = encrypt.as_reference();
            let dict = encrypt_dict_from_object(&doc.resolve_object(&encrypt)?)?;
            let handler = SecurityHandler::authenticate(&dict, &file_id(&doc.trailer), self.options.password.as_deref())?;
            doc.security = Some(handler);
            doc.encryption = EncryptionState::Unlocked;
            log::info!("Document unlocked");
        }

        doc.expand_object_streams(&structure.object_streams);
        doc.pages = doc.collect_pages()?;
        doc.metadata = doc.read_metadata();
        if doc.recovered {
            log::warn!("Loaded {} pages from a reconstructed cross-reference table", doc.pages.len());
        } else {
            log::debug!("Loaded {} pages", doc.pages.len());
        }
        Ok(doc)
    }
}

/// A loaded, read-only PDF document.
#[derive(Debug)]
pub struct Document {
    data: Bytes,
    version: (u8, u8),
    xref: CrossRefTable,
    trailer: Dict,
    compressed: HashMap<u32, Object>,
    security: Option<SecurityHandler>,
    encrypt_ref: Option<ObjectRef>,
    encryption: EncryptionState,
    pages: Vec<PageHandle>,
    metadata: DocumentMetadata,
    recovered: bool,
}

impl Document {
    /// Load a document from memory.
    pub fn load(data: impl Into<Bytes>, password: Option<&str>) -> Result<Self> {
        Loader::with_options(LoaderOptions {
            password: password.map(str::to_string),
            ..Default::default()
        })
        .load(data)
    }

    /// Read and load a document from disk.
    pub fn open(path: impl AsRef<Path>, password: Option<&str>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::load(data, password)
    }

    fn skeleton(data: Bytes, xref: CrossRefTable, version: (u8, u8)) -> Self {
        let trailer = xref.trailer().clone();
        Self {
            data,
            version,
            xref,
            trailer,
            compressed: HashMap::new(),
            security: None,
            encrypt_ref: None,
            encryption: EncryptionState::None,
            pages: Vec::new(),
            metadata: DocumentMetadata::default(),
            recovered: false,
        }
    }

    /// `(major, minor)` from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All pages in document order.
    pub fn pages(&self) -> &[PageHandle] {
        &self.pages
    }

    /// One page by zero-based index.
    pub fn page(&self, index: usize) -> Option<&PageHandle> {
        self.pages.get(index)
    }

    /// Info dictionary fields.
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Encryption state after loading: `None` or `Unlocked`.
    pub fn encryption_state(&self) -> EncryptionState {
        self.encryption
    }

    /// True when the cross-reference table was rebuilt by scanning.
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    /// Resolve an indirect object.
    pub fn resolve(&self, r: ObjectRef) -> Result<Object> {
        match self.xref.get(r.id) {
            Some(XRefEntry::Compressed { .. }) => {
                if let Some(obj) = self.compressed.get(&r.id) {
                    return Ok(obj.clone());
                }
            },
            Some(XRefEntry::Uncompressed { offset, .. }) => {
                if let Some(obj) = self.read_at(*offset, r) {
                    return self.decrypt(obj, r);
                }
                log::debug!("xref offset {} for {} is wrong, scanning", offset, r);
            },
            Some(XRefEntry::Free) | None => {
                if let Some(obj) = self.compressed.get(&r.id) {
                    return Ok(obj.clone());
                }
            },
        }

        let offset = self.scan_for_object(r).ok_or(Error::ObjectNotFound(r.id, r.gen))?;
        let obj = self.read_at(offset, r).ok_or(Error::ObjectNotFound(r.id, r.gen))?;
        self.decrypt(obj, r)
    }

    /// Follow references until a direct object is reached.
    pub fn resolve_object(&self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        let mut seen = HashSet::new();
        for _ in 0..MAX_REFERENCE_CHAIN {
            match current {
                Object::Reference(r) => {
                    if !seen.insert(r) {
                        return Err(Error::CircularReference(r));
                    }
                    current = self.resolve(r)?;
                },
                direct => return Ok(direct),
            }
        }
        Err(Error::RecursionLimitExceeded(MAX_REFERENCE_CHAIN))
    }

    /// Resolve a dictionary entry, treating missing objects as absent.
    pub fn resolve_entry(&self, dict: &Dict, key: &str) -> Option<Object> {
        let value = dict.get(key)?;
        match self.resolve_object(value) {
            Ok(Object::Null) => None,
            Ok(obj) => Some(obj),
            Err(e) => {
                log::debug!("Cannot resolve /{}: {}", key, e);
                None
            },
        }
    }

    /// Decoded contents of a stream, which may be given by reference.
    pub fn stream_data(&self, obj: &Object) -> Result<Vec<u8>> {
        self.resolve_object(obj)?.decode_stream_data()
    }

    /// Concatenate and decode a page's content streams.
    pub fn page_contents(&self, page: &PageHandle) -> PageContents {
        let mut out = PageContents::default();
        let items = match page.contents.as_ref().map(|c| self.resolve_object(c)) {
            None => return out,
            Some(Ok(Object::Array(items))) => items,
            Some(Ok(single)) => vec![single],
            Some(Err(e)) => {
                log::warn!("Page {} contents unresolvable: {}", page.index, e);
                out.undecodable += 1;
                return out;
            },
        };
        for item in &items {
            match self.stream_data(item) {
                Ok(bytes) => {
                    out.data.extend_from_slice(&bytes);
                    out.data.push(b'\n');
                },
                Err(e) => {
                    log::warn!("Page {}: skipping undecodable content stream: {}", page.index, e);
                    out.undecodable += 1;
                },
            }
        }
        out
    }

    fn read_at(&self, offset: u64, r: ObjectRef) -> Option<Object> {
        let start = usize::try_from(offset).ok()?;
        let slice = self.data.get(start..)?;
        match parse_indirect_object(slice) {
            Ok((_, (found, obj))) if found.id == r.id => Some(obj),
            _ => None,
        }
    }

    /// Last `id gen obj` header in the file.
    fn scan_for_object(&self, r: ObjectRef) -> Option<u64> {
        let needle = format!("{} {} obj", r.id, r.gen);
        let needle = needle.as_bytes();
        let data = &self.data[..];
        let mut best = None;
        let mut from = 0;
        while let Some(pos) = find_bytes(&data[from..], needle) {
            let at = from + pos;
            let boundary = at == 0 || !data[at - 1].is_ascii_digit();
            if boundary {
                best = Some(at as u64);
            }
            from = at + needle.len();
        }
        best
    }

    fn decrypt(&self, obj: Object, r: ObjectRef) -> Result<Object> {
        match &self.security {
            Some(handler) if self.encrypt_ref != Some(r) => handler.decrypt_object(obj, r),
            _ => Ok(obj),
        }
    }

    /// Parse every object stream once and keep its members.
    fn expand_object_streams(&mut self, extra: &[u32]) {
        let mut streams: BTreeSet<u32> = extra.iter().copied().collect();
        for (_, entry) in self.xref.entries() {
            if let XRefEntry::Compressed { stream, .. } = entry {
                streams.insert(*stream);
            }
        }

        let mut members = HashMap::new();
        for stream_num in streams {
            let stream = match self.resolve(ObjectRef::new(stream_num, 0)) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("Object stream {} unreadable: {}", stream_num, e);
                    continue;
                },
            };
            match parse_object_stream(&stream) {
                Ok(objects) => {
                    for (num, obj) in objects {
                        let belongs = match self.xref.get(num) {
                            Some(XRefEntry::Compressed { stream, .. }) => *stream == stream_num,
                            Some(XRefEntry::Free) | None => true,
                            Some(XRefEntry::Uncompressed { .. }) => false,
                        };
                        if belongs {
                            members.insert(num, obj);
                        }
                    }
                },
                Err(e) => log::warn!("Object stream {} malformed: {}", stream_num, e),
            }
        }
        log::debug!("Expanded {} objects from object streams", members.len());
        self.compressed = members;
    }

    fn catalog(&self) -> Result<Dict> {
        let root = self.trailer.get("Root").ok_or_else(|| Error::MalformedDocument {
            page: None,
            reason: "trailer has no /Root".to_string(),
        })?;
        match self.resolve_object(root)? {
            Object::Dictionary(d) => Ok(d),
            other => Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Walk the page tree depth first, applying inheritance.
    fn collect_pages(&self) -> Result<Vec<PageHandle>> {
        let catalog = self.catalog()?;
        let root = catalog.get("Pages").ok_or_else(|| Error::MalformedDocument {
            page: None,
            reason: "catalog has no /Pages".to_string(),
        })?;

        struct Frame {
            node: Object,
            inherited: Dict,
            depth: usize,
        }

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![Frame {
            node: root.clone(),
            inherited: Dict::new(),
            depth: 0,
        }];

        while let Some(frame) = stack.pop() {
            if frame.depth > MAX_PAGE_TREE_DEPTH {
                return Err(Error::RecursionLimitExceeded(MAX_PAGE_TREE_DEPTH as u32));
            }
            let node_ref = frame.node.as_reference();
            if let Some(r) = node_ref {
                if !visited.insert(r) {
                    log::warn!("Page tree cycle at {}, skipping", r);
                    continue;
                }
            }
            let node = match self.resolve_object(&frame.node) {
                Ok(Object::Dictionary(d)) => d,
                Ok(other) if frame.depth == 0 => {
                    return Err(Error::InvalidObjectType {
                        expected: "Dictionary".to_string(),
                        found: other.type_name().to_string(),
                    })
                },
                Err(e) if frame.depth == 0 => return Err(e),
                Ok(_) | Err(_) => {
                    log::warn!("Skipping unreadable page tree node {:?}", node_ref);
                    continue;
                },
            };

            let kind = node.get("Type").and_then(|t| t.as_name());
            let kids = node.get("Kids").and_then(|k| self.resolve_object(k).ok());
            let is_leaf = kind == Some("Page") || (kind != Some("Pages") && kids.is_none());

            let mut inherited = frame.inherited;
            for key in ["Resources", "MediaBox", "CropBox", "Rotate"] {
                if let Some(v) = node.get(key) {
                    inherited.insert(key.to_string(), v.clone());
                }
            }

            if is_leaf {
                pages.push(self.page_handle(pages.len(), node_ref, &node, &inherited));
                continue;
            }

            if let Some(Object::Array(kids)) = kids {
                // Reverse so the first kid is processed first.
                for kid in kids.into_iter().rev() {
                    stack.push(Frame {
                        node: kid,
                        inherited: inherited.clone(),
                        depth: frame.depth + 1,
                    });
                }
            }
        }

        Ok(pages)
    }

    fn page_handle(&self, index: usize, object_ref: Option<ObjectRef>, node: &Dict, inherited: &Dict) -> PageHandle {
        let rect = |key: &str| -> Option<[f64; 4]> {
            let obj = self.resolve_object(inherited.get(key)?).ok()?;
            let [a, b, c, d] = obj.as_rect()?;
            let normalized = [a.min(c), b.min(d), a.max(c), b.max(d)];
            (normalized[2] > normalized[0] && normalized[3] > normalized[1]).then_some(normalized)
        };
        let media_box = rect("MediaBox").unwrap_or_else(|| {
            log::debug!("Page {} has no usable /MediaBox, assuming Letter", index);
            DEFAULT_MEDIA_BOX
        });
        let resources = inherited
            .get("Resources")
            .and_then(|r| self.resolve_object(r).ok())
            .and_then(|r| r.as_dict().cloned())
            .unwrap_or_default();
        let rotate = inherited
            .get("Rotate")
            .and_then(|r| self.resolve_object(r).ok())
            .and_then(|r| r.as_integer())
            .unwrap_or(0)
            .rem_euclid(360)
            / 90
            * 90;

        PageHandle {
            index,
            object_ref,
            media_box,
            crop_box: rect("CropBox"),
            resources,
            contents: node.get("Contents").cloned(),
            rotate,
        }
    }

    fn read_metadata(&self) -> DocumentMetadata {
        let info = self
            .trailer
            .get("Info")
            .and_then(|i| self.resolve_object(i).ok())
            .and_then(|i| i.as_dict().cloned())
            .unwrap_or_default();
        let text = |key: &str| {
            self.resolve_entry(&info, key)
                .and_then(|v| v.as_string().map(decode_text_string))
                .filter(|s| !s.is_empty())
        };
        DocumentMetadata {
            page_count: self.pages.len(),
            producer: text("Producer"),
            title: text("Title"),
        }
    }
}

/// First element of the trailer's `/ID` array.
fn file_id(trailer: &Dict) -> Vec<u8> {
    trailer
        .get("ID")
        .and_then(|id| id.as_array())
        .and_then(|arr| arr.first())
        .and_then(|first| first.as_string())
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

/// Decode a PDF text string: UTF-16BE with a byte order mark, UTF-8 with a
/// BOM, or PDFDocEncoding (read as Latin-1).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// `%PDF-M.m` within the first KiB.
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(1024)];
    let at = find_bytes(window, b"%PDF-")
        .ok_or_else(|| Error::InvalidHeader("no %PDF- marker in the first 1024 bytes".to_string()))
        .map_err(Error::into_malformed)?;
    if at > 0 {
        log::warn!("PDF header found at offset {} instead of 0", at);
    }
    match data.get(at + 5..at + 8) {
        Some([major, b'.', minor]) if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok((major - b'0', minor - b'0'))
        },
        _ => {
            log::warn!("Unreadable PDF version, assuming 1.4");
            Ok((1, 4))
        },
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
