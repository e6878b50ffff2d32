//! TrueType/OpenType font parser for PDF embedding.
//!
//! This module wraps the `ttf-parser` crate to extract the metrics a PDF
//! font descriptor and CID widths array need.
//!
//! # Font Embedding in PDF
//!
//! Per ISO 32000-1 sections 9.6-9.8, embedded fonts require:
//! - FontDescriptor with metrics (ascender, descender, cap height, etc.)
//! - ToUnicode CMap for text extraction
//! - Font program data (FontFile2 for TrueType)
//! - CIDFont for Unicode (Type 0 composite fonts with Identity-H encoding)

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::object::Object;
use ttf_parser::{Face, GlyphId};

/// Descriptor metrics in 1/1000 em, extracted once when a font is accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    /// Font bounding box [llx lly urx ury]
    pub bbox: [i32; 4],
    /// Ascender
    pub ascent: i32,
    /// Descender (negative)
    pub descent: i32,
    /// Cap height
    pub cap_height: i32,
    /// Italic angle in degrees
    pub italic_angle: f64,
    /// Estimated vertical stem width
    pub stem_v: i32,
    /// FontDescriptor /Flags
    pub flags: u32,
}

/// Parsed TrueType font data for PDF embedding.
#[derive(Debug)]
pub struct TrueTypeFont<'a> {
    face: Face<'a>,
}

impl<'a> TrueTypeFont<'a> {
    /// Parse a TrueType/OpenType font from raw data.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::FontUnavailable("font program is empty".to_string()));
        }
        let face = Face::parse(data, 0).map_err(|e| Error::FontUnavailable(e.to_string()))?;
        Ok(Self { face })
    }

    fn scale(&self, v: i32) -> i32 {
        let upem = self.face.units_per_em().max(1) as i32;
        v * 1000 / upem
    }

    /// Get the font's PostScript name.
    pub fn postscript_name(&self) -> Option<String> {
        self.face
            .names()
            .into_iter()
            .find(|name| name.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
            .and_then(|name| name.to_string())
    }

    /// Get units per em for this font.
    pub fn units_per_em(&self) -> u16 {
        self.face.units_per_em()
    }

    /// Get the number of glyphs in the font.
    pub fn num_glyphs(&self) -> u16 {
        self.face.number_of_glyphs()
    }

    /// Get glyph width in 1/1000 em units.
    pub fn glyph_width(&self, glyph_id: u16) -> i32 {
        self.face
            .glyph_hor_advance(GlyphId(glyph_id))
            .map(|adv| self.scale(adv as i32))
            .unwrap_or(0)
    }

    /// Get font flags for PDF FontDescriptor.
    ///
    /// Bit 1 FixedPitch, bit 6 Nonsymbolic, bit 7 Italic.
    pub fn font_flags(&self) -> u32 {
        let mut flags = 1 << 5;
        if self.face.is_monospaced() {
            flags |= 1 << 0;
        }
        if self.face.is_italic() {
            flags |= 1 << 6;
        }
        flags
    }

    /// Collect the descriptor metrics.
    pub fn metrics(&self) -> FontMetrics {
        let bbox = self.face.global_bounding_box();
        let ascent = self.scale(self.face.ascender() as i32);
        FontMetrics {
            bbox: [
                self.scale(bbox.x_min as i32),
                self.scale(bbox.y_min as i32),
                self.scale(bbox.x_max as i32),
                self.scale(bbox.y_max as i32),
            ],
            ascent,
            descent: self.scale(self.face.descender() as i32),
            cap_height: self
                .face
                .capital_height()
                .map(|h| self.scale(h as i32))
                .unwrap_or(ascent),
            italic_angle: self.face.italic_angle().unwrap_or(0.0) as f64,
            // TrueType doesn't store StemV; estimate from weight
            stem_v: if self.face.is_bold() { 140 } else { 80 },
            flags: self.font_flags(),
        }
    }

    /// Widths for the CIDFont /W entry: `[start [w1 w2 ...] start2 [...] ...]`
    /// with runs of consecutive glyph ids grouped together.
    pub fn widths_array<'g>(&self, used_glyphs: impl IntoIterator<Item = &'g u16>) -> Object {
        let mut glyphs: Vec<u16> = used_glyphs.into_iter().copied().collect();
        glyphs.sort_unstable();
        glyphs.dedup();

        let mut result = Vec::new();
        let mut i = 0;
        while i < glyphs.len() {
            let start = glyphs[i];
            let mut widths = vec![Object::Integer(self.glyph_width(start) as i64)];
            while i + 1 < glyphs.len() && glyphs[i + 1] == glyphs[i] + 1 {
                i += 1;
                widths.push(Object::Integer(self.glyph_width(glyphs[i]) as i64));
            }
            result.push(Object::Integer(start as i64));
            result.push(Object::Array(widths));
            i += 1;
        }
        Object::Array(result)
    }
}

/// ToUnicode CMap mapping glyph ids (used as CIDs with Identity-H) back to
/// the character codes they were drawn for.
pub fn tounicode_cmap(glyph_to_unicode: &BTreeMap<u16, u32>) -> String {
    let mut cmap = String::new();

    cmap.push_str("/CIDInit /ProcSet findresource begin\n");
    cmap.push_str("12 dict begin\n");
    cmap.push_str("begincmap\n");
    cmap.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    cmap.push_str("/CMapName /Adobe-Identity-UCS def\n");
    cmap.push_str("/CMapType 2 def\n");
    cmap.push_str("1 begincodespacerange\n");
    cmap.push_str("<0000> <FFFF>\n");
    cmap.push_str("endcodespacerange\n");

    let mappings: Vec<(u16, u32)> = glyph_to_unicode.iter().map(|(g, u)| (*g, *u)).collect();
    // at most 100 entries per bfchar section
    for chunk in mappings.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for &(gid, unicode) in chunk {
            match char::from_u32(unicode) {
                Some(c) if unicode > 0xFFFF => {
                    let mut units = [0u16; 2];
                    let encoded = c.encode_utf16(&mut units);
                    cmap.push_str(&format!("<{:04X}> <{:04X}{:04X}>\n", gid, encoded[0], encoded[1]));
                },
                _ => cmap.push_str(&format!("<{:04X}> <{:04X}>\n", gid, unicode & 0xFFFF)),
            }
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\n");
    cmap.push_str("CMapName currentdict /CMap defineresource pop\n");
    cmap.push_str("end\n");
    cmap.push_str("end\n");
    cmap
}
