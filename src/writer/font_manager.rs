//! Font resources of a document.
//!
//! Every font the layout layer draws with gets one `/F<n>` resource, shared by
//! all pages. A font whose family resolves to a parseable TrueType/OpenType
//! program is embedded as a Type0 composite font with Identity-H encoding;
//! anything else becomes a synthetic Type3 font built from glyph bitmaps.
//!
//! Font objects are only written when the document is closed, once the set
//! of glyphs in use is known.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::fonts::truetype_parser::tounicode_cmap;
use crate::fonts::{family_name, font_size_from_name, FontMetrics, FontResolver, Glyph, TrueTypeFont};
use crate::object::{Object, ObjectRef};
use crate::registry::{CacheEntry, ResourceCache};
use crate::writer::content_stream::TextArrayItem;
use crate::writer::object_serializer::ObjectSerializer;
use crate::writer::pdf_writer::stream_object;
use crate::writer::type3_font::{SyntheticFont, SYNTHETIC_FONT_SIZE};
use crate::writer::ObjectSink;

/// An embedded outline font and the glyphs drawn with it.
#[derive(Debug, Clone)]
pub struct OutlineFont {
    /// /BaseFont name
    pub base_font: String,
    /// Complete font program
    program: Vec<u8>,
    /// Descriptor metrics
    pub metrics: FontMetrics,
    /// Nominal size from the resource name, in device pixels
    pub size: f64,
    /// Glyph id -> character code it was drawn for
    used: BTreeMap<u16, u32>,
    num_glyphs: u16,
}

impl OutlineFont {
    /// Accept a font program, or explain why it cannot be used.
    pub fn from_program(base_font: String, program: Vec<u8>, size: f64) -> Result<Self> {
        let (metrics, num_glyphs) = {
            let font = TrueTypeFont::parse(&program)?;
            (font.metrics(), font.num_glyphs())
        };
        Ok(Self {
            base_font,
            program,
            metrics,
            size,
            used: BTreeMap::new(),
            num_glyphs,
        })
    }

    /// Glyph ids in use.
    pub fn used_glyphs(&self) -> impl Iterator<Item = u16> + '_ {
        self.used.keys().copied()
    }

    fn flush(self, font_id: ObjectRef, compress: bool, sink: &mut dyn ObjectSink) -> Result<()> {
        let font = TrueTypeFont::parse(&self.program)?;
        let m = &self.metrics;

        let program_len = self.program.len() as i64;
        let file_id = sink.add_object(&stream_object(
            vec![("Length1", ObjectSerializer::integer(program_len))],
            self.program.clone(),
            compress,
        )?)?;

        let descriptor_id = sink.add_object(&ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("FontDescriptor")),
            ("FontName", ObjectSerializer::name(&self.base_font)),
            ("Flags", ObjectSerializer::integer(m.flags as i64)),
            (
                "FontBBox",
                ObjectSerializer::array(m.bbox.iter().map(|v| Object::Integer(*v as i64)).collect()),
            ),
            ("ItalicAngle", ObjectSerializer::real(m.italic_angle)),
            ("Ascent", ObjectSerializer::integer(m.ascent as i64)),
            ("Descent", ObjectSerializer::integer(m.descent as i64)),
            ("CapHeight", ObjectSerializer::integer(m.cap_height as i64)),
            ("StemV", ObjectSerializer::integer(m.stem_v as i64)),
            ("FontFile2", Object::Reference(file_id)),
        ]))?;

        let cid_font_id = sink.add_object(&ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Font")),
            ("Subtype", ObjectSerializer::name("CIDFontType2")),
            ("BaseFont", ObjectSerializer::name(&self.base_font)),
            (
                "CIDSystemInfo",
                ObjectSerializer::dict(vec![
                    ("Registry", ObjectSerializer::string("Adobe")),
                    ("Ordering", ObjectSerializer::string("Identity")),
                    ("Supplement", ObjectSerializer::integer(0)),
                ]),
            ),
            ("FontDescriptor", Object::Reference(descriptor_id)),
            ("DW", ObjectSerializer::integer(1000)),
            ("W", font.widths_array(self.used.keys())),
            ("CIDToGIDMap", ObjectSerializer::name("Identity")),
        ]))?;

        let cmap = tounicode_cmap(&self.used).into_bytes();
        let tounicode_id = sink.add_object(&stream_object(vec![], cmap, compress)?)?;

        log::debug!(
            "Writing outline font {} ({}) with {} glyphs",
            font_id,
            self.base_font,
            self.used.len()
        );
        sink.write_object(
            font_id,
            &ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Font")),
                ("Subtype", ObjectSerializer::name("Type0")),
                ("BaseFont", ObjectSerializer::name(&self.base_font)),
                ("Encoding", ObjectSerializer::name("Identity-H")),
                ("DescendantFonts", ObjectSerializer::array(vec![Object::Reference(cid_font_id)])),
                ("ToUnicode", Object::Reference(tounicode_id)),
            ]),
        )
    }
}

/// How a font is represented in the output.
#[derive(Debug, Clone)]
pub enum FontResource {
    /// Embedded TrueType/OpenType program
    Outline(OutlineFont),
    /// Type3 font painted from glyph bitmaps
    Synthetic(SyntheticFont),
}

impl FontResource {
    /// Size to select the font at with `Tf`.
    pub fn text_size(&self) -> f64 {
        match self {
            FontResource::Outline(font) => font.size,
            FontResource::Synthetic(_) => SYNTHETIC_FONT_SIZE,
        }
    }

    /// Record that `glyph` is drawn for `code` and return the bytes that
    /// select it in a text-showing operator.
    ///
    /// Returns `None` when the font cannot encode the glyph.
    pub fn encode(&mut self, code: u32, glyph: &Glyph) -> Option<TextArrayItem> {
        match self {
            FontResource::Outline(font) => {
                if glyph.index >= font.num_glyphs {
                    log::warn!(
                        "Glyph id {} is out of range for {} ({} glyphs)",
                        glyph.index,
                        font.base_font,
                        font.num_glyphs
                    );
                    return None;
                }
                font.used.entry(glyph.index).or_insert(code);
                Some(TextArrayItem::HexText(glyph.index.to_be_bytes().to_vec()))
            },
            FontResource::Synthetic(font) => {
                let Ok(byte) = u8::try_from(code) else {
                    log::warn!("Character code {} does not fit a synthetic font; skipped", code);
                    return None;
                };
                font.add_glyph(byte, glyph);
                Some(TextArrayItem::Text(vec![byte]))
            },
        }
    }

    /// Whether this is an embedded outline font.
    pub fn is_outline(&self) -> bool {
        matches!(self, FontResource::Outline(_))
    }
}

/// Fonts in use by a document, keyed by resource name.
#[derive(Debug)]
pub struct FontTable {
    fonts: ResourceCache<String, FontResource>,
    compress: bool,
}

impl FontTable {
    /// Create an empty table.
    pub fn new(compress: bool) -> Self {
        Self {
            fonts: ResourceCache::new("F"),
            compress,
        }
    }

    /// The resource for font `name`, set up on first use.
    ///
    /// The resolver is consulted once per name with the family part of the
    /// name. A missing or unparseable program is not an error; the font
    /// falls back to a synthetic one.
    pub fn select(
        &mut self,
        name: &str,
        resolver: &mut dyn FontResolver,
        sink: &mut dyn ObjectSink,
    ) -> Result<&mut CacheEntry<FontResource>> {
        let (entry, _) = self.fonts.lookup_or_insert_with(name.to_string(), sink, || {
            Ok(Self::resolve(name, resolver))
        })?;
        Ok(entry)
    }

    fn resolve(name: &str, resolver: &mut dyn FontResolver) -> FontResource {
        let family = family_name(name);
        match resolver.resolve(family) {
            Some(data) => {
                match OutlineFont::from_program(data.postscript_name, data.program, font_size_from_name(name)) {
                    Ok(font) => {
                        log::debug!("Font {} uses outline program {}", name, font.base_font);
                        return FontResource::Outline(font);
                    },
                    Err(e) => log::warn!("Font program for {} is unusable: {}", family, e),
                }
            },
            None => log::info!("No outline program for {}; using a synthetic font", family),
        }
        FontResource::Synthetic(SyntheticFont::new())
    }

    /// Number of fonts.
    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    /// Whether no font has been used.
    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Look up a font by resource name.
    pub fn get(&self, name: &str) -> Option<&CacheEntry<FontResource>> {
        self.fonts.get(&name.to_string())
    }

    /// Write every font object.
    pub fn flush(self, sink: &mut dyn ObjectSink) -> Result<()> {
        let compress = self.compress;
        for (_, entry) in self.fonts.into_entries() {
            match entry.value {
                FontResource::Outline(font) => font.flush(entry.id, compress, sink)?,
                FontResource::Synthetic(font) => font.flush(entry.id, sink)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{NullFontResolver, OutlineFontData};
    use crate::writer::MemorySink;

    fn glyph(index: u16) -> Glyph {
        Glyph {
            index,
            advance: 4,
            width: 2,
            height: 2,
            xoff: 0,
            yoff: 1,
            bitmap: vec![1; 4],
        }
    }

    #[test]
    fn test_unresolved_font_is_synthetic() {
        let mut sink = MemorySink::new();
        let mut table = FontTable::new(false);
        let entry = table.select("cmr10.600pk", &mut NullFontResolver, &mut sink).unwrap();
        assert_eq!(entry.name, "F1");
        assert!(!entry.value.is_outline());
        assert_eq!(entry.value.text_size(), SYNTHETIC_FONT_SIZE);
    }

    #[test]
    fn test_font_selected_once() {
        let mut sink = MemorySink::new();
        let mut table = FontTable::new(false);
        let mut calls = 0;
        let mut resolver = |_: &str| -> Option<OutlineFontData> {
            calls += 1;
            None
        };
        let first = table.select("a", &mut resolver, &mut sink).unwrap().id;
        let again = table.select("a", &mut resolver, &mut sink).unwrap().id;
        let other = table.select("b", &mut resolver, &mut sink).unwrap().name.clone();
        assert_eq!(first, again);
        assert_eq!(other, "F2");
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_garbage_program_falls_back() {
        let mut sink = MemorySink::new();
        let mut table = FontTable::new(false);
        let mut resolver = |_: &str| -> Option<OutlineFontData> {
            Some(OutlineFontData {
                postscript_name: "Broken".to_string(),
                program: vec![0u8; 32],
            })
        };
        let entry = table.select("Broken:bold", &mut resolver, &mut sink).unwrap();
        assert!(!entry.value.is_outline());
    }

    #[test]
    fn test_resolver_sees_family_name() {
        let mut sink = MemorySink::new();
        let mut table = FontTable::new(false);
        let mut seen = Vec::new();
        let mut resolver = |name: &str| -> Option<OutlineFontData> {
            seen.push(name.to_string());
            None
        };
        table.select("DejaVuSans:bold", &mut resolver, &mut sink).unwrap();
        assert_eq!(seen, vec!["DejaVuSans".to_string()]);
    }

    #[test]
    fn test_synthetic_encoding() {
        let mut font = FontResource::Synthetic(SyntheticFont::new());
        assert_eq!(font.encode(65, &glyph(0)), Some(TextArrayItem::Text(vec![65])));
        assert_eq!(font.encode(300, &glyph(0)), None);
    }

    #[test]
    fn test_flush_writes_every_font() {
        let mut sink = MemorySink::new();
        let mut table = FontTable::new(false);
        let id = {
            let entry = table.select("x", &mut NullFontResolver, &mut sink).unwrap();
            entry.value.encode(66, &glyph(0));
            entry.id
        };
        table.flush(&mut sink).unwrap();
        let font = sink.get(id).unwrap();
        assert_eq!(font.get("Subtype").and_then(Object::as_name), Some("Type3"));
    }
}
