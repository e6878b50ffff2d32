//! Image resources: imported PDF pages and grayscale bitmaps.
//!
//! Image sources are turned into single-page PDFs by an [`ImageEmbedder`].
//! The first page of that file is read with `lopdf` and re-emitted as a Form
//! XObject, together with every object its resources reach. Raw grayscale
//! bitmaps become plain image XObjects.
//!
//! Each distinct source (by path) or bitmap (by content fingerprint) is
//! converted once, the first time it is placed, and gets its object id right
//! away. The objects themselves are held back until [`ImageTable::flush`] at
//! document close. A source that fails to convert is remembered so the
//! embedder is not run on it again.

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::registry::{CacheEntry, ResourceCache};
use crate::writer::object_serializer::ObjectSerializer;
use crate::writer::pdf_writer::stream_object;
use crate::writer::ObjectSink;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Parent links followed when looking up inherited page attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Crop box of an image source, in the source's own units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageBox {
    /// Left
    pub x1: f64,
    /// Bottom
    pub y1: f64,
    /// Right
    pub x2: f64,
    /// Top
    pub y2: f64,
}

impl ImageBox {
    /// Create a box from two corners.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Horizontal extent.
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    /// Vertical extent.
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

/// Converts an image source into an embeddable single-page PDF.
pub trait ImageEmbedder {
    /// Produce a temporary PDF whose first page is the source cropped to
    /// `bbox`, placed at the origin. The caller deletes the file.
    fn embed(&mut self, source: &Path, bbox: &ImageBox) -> Result<PathBuf>;
}

/// Embedder that accepts PDF sources only, passing their pages through
/// unchanged via a temporary copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfCopyEmbedder;

impl PdfCopyEmbedder {
    fn tool_error(source: &Path, reason: impl ToString) -> Error {
        Error::ExternalTool {
            source_name: source.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl ImageEmbedder for PdfCopyEmbedder {
    fn embed(&mut self, source: &Path, _bbox: &ImageBox) -> Result<PathBuf> {
        let mut magic = [0u8; 5];
        std::fs::File::open(source)
            .and_then(|mut f| f.read_exact(&mut magic))
            .map_err(|e| Self::tool_error(source, e))?;
        if &magic != b"%PDF-" {
            return Err(Self::tool_error(source, "not a PDF file"));
        }

        let (_, path) = tempfile::Builder::new()
            .prefix("pdf_weave")
            .suffix(".pdf")
            .tempfile()
            .and_then(|t| t.keep().map_err(std::io::Error::from))
            .map_err(|e| Self::tool_error(source, e))?;
        if let Err(e) = std::fs::copy(source, &path) {
            let _ = std::fs::remove_file(&path);
            return Err(Self::tool_error(source, e));
        }
        Ok(path)
    }
}

/// Embedder that rejects every source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullImageEmbedder;

impl ImageEmbedder for NullImageEmbedder {
    fn embed(&mut self, source: &Path, _bbox: &ImageBox) -> Result<PathBuf> {
        Err(Error::ExternalTool {
            source_name: source.display().to_string(),
            reason: "no image embedder configured".to_string(),
        })
    }
}

/// An 8-bit grayscale raster, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayBitmap {
    /// Width in samples
    pub width: u32,
    /// Height in samples
    pub height: u32,
    /// One byte per sample, 0 black to 255 white
    pub pixels: Vec<u8>,
}

impl GrayBitmap {
    /// Create a bitmap, checking that the pixel count matches.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let bitmap = Self { width, height, pixels };
        bitmap.validate()?;
        Ok(bitmap)
    }

    fn validate(&self) -> Result<()> {
        let expected = self.width as usize * self.height as usize;
        if expected == 0 || self.pixels.len() != expected {
            return Err(Error::ContractViolation(format!(
                "bitmap of {}x{} carries {} pixels",
                self.width,
                self.height,
                self.pixels.len()
            )));
        }
        Ok(())
    }

    /// SHA-256 over the dimensions and pixels.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_be_bytes());
        hasher.update(self.height.to_be_bytes());
        hasher.update(&self.pixels);
        hasher.finalize().into()
    }

    fn to_xobject(&self, compress: bool) -> Result<Object> {
        stream_object(
            vec![
                ("Type", ObjectSerializer::name("XObject")),
                ("Subtype", ObjectSerializer::name("Image")),
                ("Width", ObjectSerializer::integer(self.width as i64)),
                ("Height", ObjectSerializer::integer(self.height as i64)),
                ("ColorSpace", ObjectSerializer::name("DeviceGray")),
                ("BitsPerComponent", ObjectSerializer::integer(8)),
            ],
            self.pixels.clone(),
            compress,
        )
    }
}

/// Cache key of an image resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageKey {
    /// Image source file
    Path(PathBuf),
    /// Bitmap content fingerprint
    Bitmap([u8; 32]),
}

/// How an image XObject maps onto the page.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ImageExtent {
    /// A form whose BBox is `[0 0 width height]`
    Form {
        /// BBox width
        width: f64,
        /// BBox height
        height: f64,
    },
    /// An image XObject filling the unit square
    #[default]
    Unit,
}

/// First page of a PDF, detached from its document.
///
/// Objects reached from the page resources are held in `objects`; references
/// among them use their index in that list until the page is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedPage {
    /// MediaBox `[llx lly urx ury]`
    pub media_box: [f64; 4],
    /// Decoded page content
    pub content: Vec<u8>,
    /// Page resources dictionary
    pub resources: Object,
    /// Objects the resources depend on
    pub objects: Vec<Object>,
}

impl ImportedPage {
    /// Read the first page of the PDF at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let doc = lopdf::Document::load(path)?;
        Self::from_document(&doc)
    }

    /// Detach the first page of a parsed document.
    pub fn from_document(doc: &lopdf::Document) -> Result<Self> {
        let page_id = *doc
            .get_pages()
            .values()
            .next()
            .ok_or_else(|| Error::ImageImport("document has no pages".to_string()))?;
        let page = doc.get_dictionary(page_id)?;

        let media_box = match inherited(doc, page, b"MediaBox") {
            Some(obj) => rect_of(deref(doc, obj)?)?,
            None => return Err(Error::ImageImport("page has no MediaBox".to_string())),
        };
        let content = doc.get_page_content(page_id)?;

        let mut importer = PageImporter::new(doc);
        let resources = match inherited(doc, page, b"Resources") {
            Some(obj) => importer.convert(deref(doc, obj)?)?,
            None => ObjectSerializer::dict(vec![]),
        };
        let objects = importer.finish()?;

        Ok(Self {
            media_box,
            content,
            resources,
            objects,
        })
    }

    /// Width of the page.
    pub fn width(&self) -> f64 {
        self.media_box[2] - self.media_box[0]
    }

    /// Height of the page.
    pub fn height(&self) -> f64 {
        self.media_box[3] - self.media_box[1]
    }

    /// Write the page as a Form XObject under `form_id`.
    pub fn write_form(self, form_id: ObjectRef, sink: &mut dyn ObjectSink, compress: bool) -> Result<()> {
        let ids = self
            .objects
            .iter()
            .map(|_| sink.allocate())
            .collect::<Result<Vec<_>>>()?;
        for (obj, id) in self.objects.iter().zip(&ids) {
            sink.write_object(*id, &relink(obj, &ids))?;
        }

        let (width, height) = (self.width(), self.height());
        let mut entries = vec![
            ("Type", ObjectSerializer::name("XObject")),
            ("Subtype", ObjectSerializer::name("Form")),
            ("BBox", ObjectSerializer::rect(0.0, 0.0, width, height)),
            ("Resources", relink(&self.resources, &ids)),
        ];
        if self.media_box[0] != 0.0 || self.media_box[1] != 0.0 {
            entries.push((
                "Matrix",
                ObjectSerializer::array(vec![
                    ObjectSerializer::integer(1),
                    ObjectSerializer::integer(0),
                    ObjectSerializer::integer(0),
                    ObjectSerializer::integer(1),
                    ObjectSerializer::real(-self.media_box[0]),
                    ObjectSerializer::real(-self.media_box[1]),
                ]),
            ));
        }
        sink.write_object(form_id, &stream_object(entries, self.content, compress)?)
    }
}

/// Replace placeholder references (object list indices) with real ids.
fn relink(obj: &Object, ids: &[ObjectRef]) -> Object {
    match obj {
        Object::Reference(r) => ids
            .get(r.id as usize)
            .map_or(Object::Null, |id| Object::Reference(*id)),
        Object::Array(items) => Object::Array(items.iter().map(|o| relink(o, ids)).collect()),
        Object::Dictionary(dict) => {
            Object::Dictionary(dict.iter().map(|(k, v)| (k.clone(), relink(v, ids))).collect())
        },
        Object::Stream { dict, data } => Object::Stream {
            dict: dict.iter().map(|(k, v)| (k.clone(), relink(v, ids))).collect(),
            data: data.clone(),
        },
        other => other.clone(),
    }
}

/// Look up a page attribute, following /Parent for inherited ones.
fn inherited<'d>(
    doc: &'d lopdf::Document,
    mut dict: &'d lopdf::Dictionary,
    key: &[u8],
) -> Option<&'d lopdf::Object> {
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn deref<'d>(doc: &'d lopdf::Document, obj: &'d lopdf::Object) -> Result<&'d lopdf::Object> {
    match obj {
        lopdf::Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

fn number(obj: &lopdf::Object) -> Option<f64> {
    match obj {
        lopdf::Object::Integer(i) => Some(*i as f64),
        lopdf::Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn rect_of(obj: &lopdf::Object) -> Result<[f64; 4]> {
    let invalid = || Error::ImageImport("malformed MediaBox".to_string());
    let items = obj.as_array().map_err(|_| invalid())?;
    if items.len() != 4 {
        return Err(invalid());
    }
    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        *slot = number(item).ok_or_else(invalid)?;
    }
    Ok([
        rect[0].min(rect[2]),
        rect[1].min(rect[3]),
        rect[0].max(rect[2]),
        rect[1].max(rect[3]),
    ])
}

/// Copies the objects reachable from a page's resources out of a `lopdf`
/// document.
struct PageImporter<'a> {
    doc: &'a lopdf::Document,
    index: HashMap<lopdf::ObjectId, u32>,
    objects: Vec<Option<Object>>,
}

impl<'a> PageImporter<'a> {
    fn new(doc: &'a lopdf::Document) -> Self {
        Self {
            doc,
            index: HashMap::new(),
            objects: Vec::new(),
        }
    }

    /// Placeholder reference for a source object, copying it on first sight.
    fn import(&mut self, id: lopdf::ObjectId) -> Result<ObjectRef> {
        if let Some(&local) = self.index.get(&id) {
            return Ok(ObjectRef::new(local, 0));
        }
        // claim the slot before recursing so reference cycles terminate
        let local = self.objects.len() as u32;
        self.index.insert(id, local);
        self.objects.push(None);

        let source = self.doc.get_object(id)?;
        let converted = self.convert(source)?;
        self.objects[local as usize] = Some(converted);
        Ok(ObjectRef::new(local, 0))
    }

    fn dictionary(&mut self, dict: &lopdf::Dictionary) -> Result<HashMap<String, Object>> {
        let mut out = HashMap::new();
        for (key, value) in dict.iter() {
            // never drag a page tree along
            if key.as_slice() == b"Parent" {
                continue;
            }
            out.insert(String::from_utf8_lossy(key).into_owned(), self.convert(value)?);
        }
        Ok(out)
    }

    fn convert(&mut self, obj: &lopdf::Object) -> Result<Object> {
        Ok(match obj {
            lopdf::Object::Null => Object::Null,
            lopdf::Object::Boolean(b) => Object::Boolean(*b),
            lopdf::Object::Integer(i) => Object::Integer(*i),
            lopdf::Object::Real(r) => Object::Real(*r as f64),
            lopdf::Object::Name(n) => Object::Name(String::from_utf8_lossy(n).into_owned()),
            lopdf::Object::String(s, _) => Object::String(s.clone()),
            lopdf::Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.convert(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            lopdf::Object::Dictionary(dict) => Object::Dictionary(self.dictionary(dict)?),
            lopdf::Object::Stream(stream) => Object::Stream {
                dict: self.dictionary(&stream.dict)?,
                data: bytes::Bytes::from(stream.content.clone()),
            },
            lopdf::Object::Reference(id) => Object::Reference(self.import(*id)?),
        })
    }

    fn finish(self) -> Result<Vec<Object>> {
        self.objects
            .into_iter()
            .map(|o| o.ok_or_else(|| Error::ImageImport("unresolved object while importing".to_string())))
            .collect()
    }
}

/// An image whose id is reserved but whose objects are not written yet.
#[derive(Debug)]
enum PendingImage {
    Form(ImportedPage),
    Bitmap(GrayBitmap),
}

/// Image XObjects of a document.
#[derive(Debug)]
pub struct ImageTable {
    images: ResourceCache<ImageKey, ImageExtent>,
    pending: Vec<(ObjectRef, PendingImage)>,
    failed: HashSet<PathBuf>,
    compress: bool,
}

impl ImageTable {
    /// Create an empty table.
    pub fn new(compress: bool) -> Self {
        Self {
            images: ResourceCache::new("Im"),
            pending: Vec::new(),
            failed: HashSet::new(),
            compress,
        }
    }

    /// The form for `source`, converting it on first use.
    ///
    /// Returns `Ok(None)` when the source cannot be converted; that failure is
    /// logged once and remembered. Errors are only returned for fatal
    /// conditions.
    pub fn form(
        &mut self,
        source: &Path,
        crop: &ImageBox,
        embedder: &mut dyn ImageEmbedder,
        sink: &mut dyn ObjectSink,
    ) -> Result<Option<CacheEntry<ImageExtent>>> {
        let key = ImageKey::Path(source.to_path_buf());
        if let Some(entry) = self.images.get(&key) {
            return Ok(Some(entry.clone()));
        }
        if self.failed.contains(source) {
            log::debug!("Skipping {} after an earlier failure", source.display());
            return Ok(None);
        }

        let page = match Self::import(source, crop, embedder) {
            Ok(page) => page,
            Err(e) if e.is_recoverable() => {
                log::warn!("Cannot embed image {}: {}", source.display(), e);
                self.failed.insert(source.to_path_buf());
                return Ok(None);
            },
            Err(e) => return Err(e),
        };

        let extent = ImageExtent::Form {
            width: page.width(),
            height: page.height(),
        };
        let (entry, _) = self.images.lookup_or_insert_with(key, sink, || Ok(extent))?;
        let entry = entry.clone();
        log::debug!("Imported {} as {} ({})", source.display(), entry.name, entry.id);
        self.pending.push((entry.id, PendingImage::Form(page)));
        Ok(Some(entry))
    }

    fn import(source: &Path, crop: &ImageBox, embedder: &mut dyn ImageEmbedder) -> Result<ImportedPage> {
        let temp = embedder.embed(source, crop)?;
        let page = ImportedPage::load(&temp);
        if let Err(e) = std::fs::remove_file(&temp) {
            log::warn!("Could not remove temporary file {}: {}", temp.display(), e);
        }
        page
    }

    /// The image XObject for `bitmap`, reserving its id on first use.
    pub fn bitmap(&mut self, bitmap: &GrayBitmap, sink: &mut dyn ObjectSink) -> Result<CacheEntry<ImageExtent>> {
        bitmap.validate()?;
        let key = ImageKey::Bitmap(bitmap.fingerprint());
        let (entry, created) = self
            .images
            .lookup_or_insert_with(key, sink, || Ok(ImageExtent::Unit))?;
        let entry = entry.clone();
        if created {
            log::debug!("Reserved {}x{} bitmap as {}", bitmap.width, bitmap.height, entry.name);
            self.pending.push((entry.id, PendingImage::Bitmap(bitmap.clone())));
        }
        Ok(entry)
    }

    /// Write every placed image, in placement order.
    pub fn flush(self, sink: &mut dyn ObjectSink) -> Result<()> {
        log::debug!("Writing {} images", self.pending.len());
        for (id, image) in self.pending {
            match image {
                PendingImage::Form(page) => page.write_form(id, sink, self.compress)?,
                PendingImage::Bitmap(bitmap) => sink.write_object(id, &bitmap.to_xobject(self.compress)?)?,
            }
        }
        Ok(())
    }

    /// Number of distinct images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether no image has been embedded.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Whether `source` failed to embed earlier.
    pub fn has_failed(&self, source: &Path) -> bool {
        self.failed.contains(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MemorySink;
    use lopdf::{dictionary, Stream};

    fn one_page_pdf(media_box: [i64; 4]) -> lopdf::Document {
        let mut doc = lopdf::Document::with_version("1.4");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = doc.add_object(Stream::new(dictionary! {}, b"0 0 1 rg 0 0 10 10 re f".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content,
        });
        doc.objects.insert(
            pages_id,
            lopdf::Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => media_box.iter().map(|v| lopdf::Object::Integer(*v)).collect::<Vec<_>>(),
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);
        doc
    }

    #[test]
    fn test_import_inherits_attributes() {
        let doc = one_page_pdf([0, 0, 40, 30]);
        let page = ImportedPage::from_document(&doc).unwrap();
        assert_eq!(page.width(), 40.0);
        assert_eq!(page.height(), 30.0);
        assert!(String::from_utf8_lossy(&page.content).contains("re f"));
        assert_eq!(page.objects.len(), 1);
        let font = page.resources.get("Font").and_then(|f| f.get("F1")).unwrap();
        assert_eq!(font, &Object::Reference(ObjectRef::new(0, 0)));
    }

    #[test]
    fn test_write_form_relinks() {
        let doc = one_page_pdf([10, 10, 50, 40]);
        let page = ImportedPage::from_document(&doc).unwrap();
        let mut sink = MemorySink::new();
        let form_id = sink.allocate().unwrap();
        page.write_form(form_id, &mut sink, false).unwrap();

        let form = sink.get(form_id).unwrap();
        assert_eq!(form.get("Subtype").and_then(Object::as_name), Some("Form"));
        let bbox = form.get("BBox").and_then(Object::as_array).unwrap();
        assert_eq!(bbox[2], Object::Real(40.0));
        assert!(form.get("Matrix").is_some());
        let font_ref = form
            .get("Resources")
            .and_then(|r| r.get("Font"))
            .and_then(|f| f.get("F1"))
            .and_then(Object::as_reference)
            .unwrap();
        let font = sink.get(font_ref).unwrap();
        assert_eq!(font.get("BaseFont").and_then(Object::as_name), Some("Helvetica"));
    }

    #[test]
    fn test_null_embedder_failure_is_remembered() {
        let mut sink = MemorySink::new();
        let mut table = ImageTable::new(false);
        let source = Path::new("figure.png");
        let crop = ImageBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(table.form(source, &crop, &mut NullImageEmbedder, &mut sink).unwrap().is_none());
        assert!(table.has_failed(source));
        assert!(table.form(source, &crop, &mut NullImageEmbedder, &mut sink).unwrap().is_none());
        assert_eq!(sink.allocated(), 0);
    }

    #[test]
    fn test_form_written_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("figure.pdf");
        one_page_pdf([0, 0, 40, 30]).save(&path).unwrap();

        let mut sink = MemorySink::new();
        let mut table = ImageTable::new(false);
        let crop = ImageBox::new(0.0, 0.0, 40.0, 30.0);
        let entry = table
            .form(&path, &crop, &mut PdfCopyEmbedder, &mut sink)
            .unwrap()
            .unwrap();
        assert_eq!(entry.value, ImageExtent::Form { width: 40.0, height: 30.0 });
        assert!(sink.get(entry.id).is_none());

        table.flush(&mut sink).unwrap();
        let form = sink.get(entry.id).unwrap();
        assert_eq!(form.get("Subtype").and_then(Object::as_name), Some("Form"));
    }

    #[test]
    fn test_copy_embedder_rejects_non_pdf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"\x89PNG....").unwrap();
        let result = PdfCopyEmbedder.embed(file.path(), &ImageBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(result, Err(Error::ExternalTool { .. })));
    }

    #[test]
    fn test_bitmap_deduplicated_by_content() {
        let mut sink = MemorySink::new();
        let mut table = ImageTable::new(false);
        let a = GrayBitmap::new(2, 1, vec![0, 255]).unwrap();
        let b = GrayBitmap::new(1, 2, vec![0, 255]).unwrap();
        let first = table.bitmap(&a, &mut sink).unwrap();
        let again = table.bitmap(&a.clone(), &mut sink).unwrap();
        let other = table.bitmap(&b, &mut sink).unwrap();
        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert_eq!(table.len(), 2);
        assert!(sink.get(first.id).is_none());
        table.flush(&mut sink).unwrap();
        let image = sink.get(first.id).unwrap();
        assert_eq!(image.get("ColorSpace").and_then(Object::as_name), Some("DeviceGray"));
    }

    #[test]
    fn test_bitmap_size_mismatch() {
        assert!(matches!(GrayBitmap::new(2, 2, vec![0; 3]), Err(Error::ContractViolation(_))));
        assert!(GrayBitmap::new(0, 0, vec![]).is_err());
    }
}
