//! Streaming PDF file writer.
//!
//! Objects are serialized to the output as soon as they are complete; only
//! their byte offsets are kept for the cross-reference table. Ids can be
//! allocated long before the object they name is written, which is what lets
//! pages, fonts and outline nodes reference each other in a single pass.

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::writer::object_serializer::ObjectSerializer;
use std::collections::BTreeMap;
use std::io::Write;

/// Destination for indirect objects.
///
/// Builders are written against this trait so they can run against a real
/// file or an in-memory [`MemorySink`].
pub trait ObjectSink {
    /// Reserve a fresh object id. Ids are never reused.
    fn allocate(&mut self) -> Result<ObjectRef>;

    /// Write the object for a previously allocated id.
    fn write_object(&mut self, id: ObjectRef, obj: &Object) -> Result<()>;

    /// Allocate an id and write the object in one step.
    fn add_object(&mut self, obj: &Object) -> Result<ObjectRef> {
        let id = self.allocate()?;
        self.write_object(id, obj)?;
        Ok(id)
    }
}

/// Entries the document catalog may carry besides the page tree.
#[derive(Debug, Clone, Default)]
pub struct CatalogExtras {
    /// Named destinations dictionary
    pub dests: Option<ObjectRef>,
    /// Outline root
    pub outlines: Option<ObjectRef>,
    /// Document information entries (Title, Author, Producer, ...)
    pub info: Vec<(String, Object)>,
}

/// Compress data using Flate (zlib) compression.
pub fn compress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Build a stream object, Flate-compressing the data when `compress` is set.
pub fn stream_object(entries: Vec<(&str, Object)>, data: Vec<u8>, compress: bool) -> Result<Object> {
    if !compress {
        return Ok(ObjectSerializer::stream(entries, data));
    }
    let compressed = compress_data(&data)?;
    let mut entries = entries;
    entries.push(("Filter", ObjectSerializer::name("FlateDecode")));
    Ok(ObjectSerializer::stream(entries, compressed))
}

/// A PDF file being written to `W`.
pub struct PdfFile<W: Write> {
    out: W,
    serializer: ObjectSerializer,
    /// Bytes written so far
    offset: u64,
    /// Offsets of written objects, keyed by object number
    xref: BTreeMap<u32, u64>,
    next_id: u32,
    max_id: u32,
    pages_root: ObjectRef,
    pages: Vec<ObjectRef>,
}

impl<W: Write> PdfFile<W> {
    /// Start a new file: writes the header and reserves the page tree root.
    ///
    /// `max_id` bounds the object numbers that may be allocated.
    pub fn new(out: W, version: &str, max_id: u32) -> Result<Self> {
        let mut file = Self {
            out,
            serializer: ObjectSerializer::compact(),
            offset: 0,
            xref: BTreeMap::new(),
            next_id: 1,
            max_id,
            pages_root: ObjectRef::new(0, 0),
            pages: Vec::new(),
        };

        let mut header = Vec::new();
        writeln!(header, "%PDF-{}", version)?;
        // Binary marker (recommended for binary content)
        header.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        file.emit(&header)?;

        file.pages_root = file.allocate()?;
        Ok(file)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    /// The reserved id of the page tree root, used as every page's /Parent.
    pub fn pages_root(&self) -> ObjectRef {
        self.pages_root
    }

    /// Append a written page to the page tree.
    pub fn add_page(&mut self, page: ObjectRef) {
        self.pages.push(page);
    }

    /// Number of pages added so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of objects written so far.
    pub fn object_count(&self) -> usize {
        self.xref.len()
    }

    /// Write the page tree, catalog, info dictionary, cross-reference table
    /// and trailer, then hand back the underlying writer.
    pub fn finish(mut self, extras: CatalogExtras) -> Result<W> {
        let kids: Vec<Object> = self.pages.iter().map(|p| Object::Reference(*p)).collect();
        let pages_obj = ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Pages")),
            ("Kids", Object::Array(kids)),
            ("Count", ObjectSerializer::integer(self.pages.len() as i64)),
        ]);
        let pages_root = self.pages_root;
        self.write_object(pages_root, &pages_obj)?;

        let mut catalog = vec![
            ("Type", ObjectSerializer::name("Catalog")),
            ("Pages", Object::Reference(pages_root)),
        ];
        if let Some(dests) = extras.dests {
            catalog.push(("Dests", Object::Reference(dests)));
        }
        if let Some(outlines) = extras.outlines {
            catalog.push(("Outlines", Object::Reference(outlines)));
            catalog.push(("PageMode", ObjectSerializer::name("UseOutlines")));
        }
        let catalog_id = self.add_object(&ObjectSerializer::dict(catalog))?;

        let info = Object::Dictionary(extras.info.into_iter().collect());
        let info_id = self.add_object(&info)?;

        // Write xref table
        let xref_start = self.offset;
        let size = self.next_id;
        let mut table = Vec::new();
        writeln!(table, "xref")?;
        writeln!(table, "0 {}", size)?;
        // Object 0 is always free
        writeln!(table, "0000000000 65535 f ")?;
        for id in 1..size {
            match self.xref.get(&id) {
                Some(offset) => writeln!(table, "{:010} 00000 n ", offset)?,
                None => {
                    log::warn!("Object {} was allocated but never written", id);
                    writeln!(table, "0000000000 00001 f ")?
                },
            }
        }

        let trailer = ObjectSerializer::dict(vec![
            ("Size", ObjectSerializer::integer(size as i64)),
            ("Root", Object::Reference(catalog_id)),
            ("Info", Object::Reference(info_id)),
        ]);
        writeln!(table, "trailer")?;
        self.serializer.write_object(&mut table, &trailer)?;
        writeln!(table)?;
        writeln!(table, "startxref")?;
        writeln!(table, "{}", xref_start)?;
        write!(table, "%%EOF")?;
        self.emit(&table)?;
        self.out.flush()?;

        log::debug!(
            "Finished PDF: {} pages, {} objects, {} bytes",
            self.pages.len(),
            self.xref.len(),
            self.offset
        );
        Ok(self.out)
    }
}

impl<W: Write> ObjectSink for PdfFile<W> {
    fn allocate(&mut self) -> Result<ObjectRef> {
        if self.next_id > self.max_id {
            return Err(Error::ResourceExhausted {
                limit: self.max_id,
            });
        }
        let id = self.next_id;
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(Error::ResourceExhausted {
                limit: self.max_id,
            })?;
        Ok(ObjectRef::new(id, 0))
    }

    fn write_object(&mut self, id: ObjectRef, obj: &Object) -> Result<()> {
        if id.id == 0 || id.id >= self.next_id {
            return Err(Error::ContractViolation(format!(
                "object {} written without being allocated",
                id
            )));
        }
        if self.xref.contains_key(&id.id) {
            return Err(Error::ContractViolation(format!("object {} written twice", id)));
        }
        let bytes = self.serializer.serialize_indirect(id, obj)?;
        self.xref.insert(id.id, self.offset);
        self.emit(&bytes)
    }
}

/// An in-memory sink that keeps every object it receives.
#[derive(Debug, Default)]
pub struct MemorySink {
    next_id: u32,
    /// Objects written so far
    pub objects: BTreeMap<ObjectRef, Object>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a written object.
    pub fn get(&self, id: ObjectRef) -> Option<&Object> {
        self.objects.get(&id)
    }

    /// Number of ids allocated so far.
    pub fn allocated(&self) -> u32 {
        self.next_id
    }
}

impl ObjectSink for MemorySink {
    fn allocate(&mut self) -> Result<ObjectRef> {
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(Error::ResourceExhausted { limit: u32::MAX })?;
        Ok(ObjectRef::new(self.next_id, 0))
    }

    fn write_object(&mut self, id: ObjectRef, obj: &Object) -> Result<()> {
        self.objects.insert(id, obj.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).to_string()
    }

    #[test]
    fn test_create_empty_pdf() {
        let file = PdfFile::new(Vec::new(), "1.4", u32::MAX - 1).unwrap();
        let bytes = file.finish(CatalogExtras::default()).unwrap();
        let s = text(&bytes);
        assert!(s.starts_with("%PDF-1.4"));
        assert!(s.contains("/Type /Catalog"));
        assert!(s.contains("/Type /Pages"));
        assert!(s.contains("/Count 0"));
        assert!(s.contains("xref"));
        assert!(s.ends_with("%%EOF"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let mut file = PdfFile::new(Vec::new(), "1.4", u32::MAX - 1).unwrap();
        let id = file.add_object(&Object::Integer(7)).unwrap();
        let bytes = file.finish(CatalogExtras::default()).unwrap();
        let s = text(&bytes);

        let xref_pos = s.rfind("xref\n").unwrap();
        let line = s[xref_pos..].lines().nth(2 + id.id as usize).unwrap();
        let offset: usize = line[..10].parse().unwrap();
        assert!(s[offset..].starts_with(&format!("{} 0 obj", id.id)));
    }

    #[test]
    fn test_catalog_extras() {
        let mut file = PdfFile::new(Vec::new(), "1.4", u32::MAX - 1).unwrap();
        let dests = file.add_object(&ObjectSerializer::dict(vec![])).unwrap();
        let extras = CatalogExtras {
            dests: Some(dests),
            outlines: None,
            info: vec![("Producer".to_string(), ObjectSerializer::string("pdf_weave"))],
        };
        let s = text(&file.finish(extras).unwrap());
        assert!(s.contains(&format!("/Dests {} 0 R", dests.id)));
        assert!(!s.contains("/Outlines"));
        assert!(s.contains("/Producer (pdf_weave)"));
    }

    #[test]
    fn test_allocation_limit() {
        let mut file = PdfFile::new(Vec::new(), "1.4", 3).unwrap();
        // id 1 is the page tree root
        assert_eq!(file.allocate().unwrap().id, 2);
        assert_eq!(file.allocate().unwrap().id, 3);
        assert!(matches!(file.allocate(), Err(Error::ResourceExhausted { limit: 3 })));
    }

    #[test]
    fn test_write_unallocated_is_rejected() {
        let mut file = PdfFile::new(Vec::new(), "1.4", u32::MAX - 1).unwrap();
        let err = file
            .write_object(ObjectRef::new(50, 0), &Object::Null)
            .unwrap_err();
        assert!(matches!(err, Error::ContractViolation(_)));
    }

    #[test]
    fn test_unwritten_ids_are_free_entries() {
        let mut file = PdfFile::new(Vec::new(), "1.4", u32::MAX - 1).unwrap();
        let _unused = file.allocate().unwrap();
        let s = text(&file.finish(CatalogExtras::default()).unwrap());
        assert!(s.contains("0000000000 00001 f "));
    }

    #[test]
    fn test_output_parses_with_lopdf() {
        let mut file = PdfFile::new(Vec::new(), "1.4", u32::MAX - 1).unwrap();
        let root = file.pages_root();
        let page = file
            .add_object(&ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Page")),
                ("Parent", Object::Reference(root)),
                ("MediaBox", ObjectSerializer::rect(0.0, 0.0, 100.0, 100.0)),
            ]))
            .unwrap();
        file.add_page(page);
        let bytes = file.finish(CatalogExtras::default()).unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_compress_data_roundtrip() {
        use std::io::Read;
        let compressed = compress_data(b"0 0 m 10 10 l S").unwrap();
        let mut decoder = flate2::read::ZlibDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0 0 m 10 10 l S");
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        let a = sink.add_object(&Object::Integer(1)).unwrap();
        let b = sink.allocate().unwrap();
        assert_ne!(a, b);
        assert_eq!(sink.get(a), Some(&Object::Integer(1)));
        assert_eq!(sink.get(b), None);
        assert_eq!(sink.allocated(), 2);
    }
}
