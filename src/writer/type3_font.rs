//! Synthetic Type3 fonts built from glyph bitmaps.
//!
//! Each used glyph becomes a glyph procedure that paints its raster as a
//! 1-bit image mask. The font matrix is fixed at `0.01`, and text using the
//! font is set at size 100, so one glyph-space unit is one device pixel
//! whatever the nominal size of the font.

use crate::error::Result;
use crate::fonts::Glyph;
use crate::object::{Object, ObjectRef};
use crate::writer::content_stream::{ContentStreamBuilder, ContentStreamOp};
use crate::writer::object_serializer::ObjectSerializer;
use crate::writer::ObjectSink;
use std::collections::BTreeMap;

/// Size passed to `Tf` for synthetic fonts.
pub const SYNTHETIC_FONT_SIZE: f64 = 100.0;

/// Glyph box in glyph space: (llx, lly, urx, ury).
pub type GlyphBox = (i32, i32, i32, i32);

/// Glyph box of a raster, one pixel of slack on the right and top edges.
pub fn glyph_box(glyph: &Glyph) -> GlyphBox {
    let llx = -glyph.xoff;
    let lly = glyph.yoff - glyph.height as i32 + 1;
    let urx = glyph.width as i32 - glyph.xoff + 1;
    let ury = glyph.yoff + 1;
    (llx, lly, urx, ury)
}

/// Encode a raster as ASCIIHex image-mask samples.
///
/// Rows are padded to a multiple of 8 bits. A set bit means no ink, which with
/// the `[0 1]` decode array leaves the pixel unpainted.
pub fn mask_hex(glyph: &Glyph) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let padded = (glyph.width + 7) & !7;
    let mut out = Vec::with_capacity((padded * glyph.height / 4) as usize);
    let mut nibble = 0u8;
    let mut count = 0;
    for y in 0..glyph.height {
        for x in 0..padded {
            nibble <<= 1;
            if x < glyph.width && !glyph.ink(x, y) {
                nibble |= 1;
            }
            count += 1;
            if count == 4 {
                out.push(HEX[nibble as usize]);
                nibble = 0;
                count = 0;
            }
        }
    }
    out
}

/// A Type3 font accumulating the glyphs drawn with it.
#[derive(Debug, Clone, Default)]
pub struct SyntheticFont {
    glyphs: BTreeMap<u8, Glyph>,
    bbox: Option<GlyphBox>,
}

impl SyntheticFont {
    /// Create an empty font.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a glyph; the first raster seen for a code is kept.
    pub fn add_glyph(&mut self, code: u8, glyph: &Glyph) {
        if self.glyphs.contains_key(&code) {
            return;
        }
        let (llx, lly, urx, ury) = glyph_box(glyph);
        self.bbox = Some(match self.bbox {
            None => (llx, lly, urx, ury),
            Some((a, b, c, d)) => (a.min(llx), b.min(lly), c.max(urx), d.max(ury)),
        });
        self.glyphs.insert(code, glyph.clone());
    }

    /// Whether any glyph has been recorded.
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Codes in use, ascending.
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.glyphs.keys().copied()
    }

    /// Union of all recorded glyph boxes.
    pub fn bbox(&self) -> Option<GlyphBox> {
        self.bbox
    }

    /// Glyph procedure: `d1` metrics, then the raster as an image mask.
    fn char_proc(glyph: &Glyph) -> Result<Vec<u8>> {
        let (llx, lly, urx, ury) = glyph_box(glyph);
        let mut content = ContentStreamBuilder::new();
        content.op(ContentStreamOp::SetGlyphMetrics {
            wx: glyph.advance as f64,
            llx: llx as f64,
            lly: lly as f64,
            urx: urx as f64,
            ury: ury as f64,
        });
        if glyph.width > 0 && glyph.height > 0 {
            content
                .save_state()
                .transform(
                    glyph.width as f64,
                    0.0,
                    0.0,
                    glyph.height as f64,
                    llx as f64,
                    lly as f64,
                )
                .op(ContentStreamOp::InlineImageMask {
                    width: glyph.width,
                    height: glyph.height,
                    hex: mask_hex(glyph),
                })
                .restore_state();
        }
        content.build()
    }

    /// The /Differences array: a code number starts each run of contiguous codes.
    pub fn differences(&self) -> Vec<Object> {
        let mut diffs = Vec::new();
        let mut previous: Option<u8> = None;
        for code in self.codes() {
            if previous.map_or(true, |p| p as u16 + 1 != code as u16) {
                diffs.push(Object::Integer(code as i64));
            }
            diffs.push(Object::Name(format!("ch{}", code)));
            previous = Some(code);
        }
        diffs
    }

    /// The /Widths array over FirstChar..=LastChar, zero for unused codes.
    pub fn widths(&self) -> Vec<Object> {
        let (Some(first), Some(last)) = (self.codes().next(), self.codes().last()) else {
            return Vec::new();
        };
        (first..=last)
            .map(|code| {
                let w = self.glyphs.get(&code).map_or(0, |g| g.advance);
                Object::Integer(w as i64)
            })
            .collect()
    }

    /// Write the glyph procedures and the font dictionary under `font_id`.
    pub fn flush(self, font_id: ObjectRef, sink: &mut dyn ObjectSink) -> Result<()> {
        let (Some(first), Some(last)) = (self.codes().next(), self.codes().last()) else {
            log::debug!("Synthetic font {} has no glyphs; writing an empty font", font_id);
            let empty = ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Font")),
                ("Subtype", ObjectSerializer::name("Type3")),
                ("FontBBox", ObjectSerializer::rect(0.0, 0.0, 0.0, 0.0)),
                ("FontMatrix", font_matrix()),
                ("CharProcs", ObjectSerializer::dict(vec![])),
                ("Encoding", ObjectSerializer::dict(vec![("Type", ObjectSerializer::name("Encoding"))])),
                ("FirstChar", ObjectSerializer::integer(0)),
                ("LastChar", ObjectSerializer::integer(0)),
                ("Widths", ObjectSerializer::array(vec![ObjectSerializer::integer(0)])),
            ]);
            return sink.write_object(font_id, &empty);
        };

        let mut char_procs = std::collections::HashMap::new();
        let mut notdef = None;
        for (code, glyph) in &self.glyphs {
            let proc_id = sink.add_object(&ObjectSerializer::stream(vec![], Self::char_proc(glyph)?))?;
            notdef.get_or_insert(proc_id);
            char_procs.insert(format!("ch{}", code), Object::Reference(proc_id));
        }
        if let Some(notdef) = notdef {
            char_procs.insert(".notdef".to_string(), Object::Reference(notdef));
        }

        let (llx, lly, urx, ury) = self.bbox.unwrap_or_default();
        let font = ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Font")),
            ("Subtype", ObjectSerializer::name("Type3")),
            (
                "FontBBox",
                ObjectSerializer::array(vec![
                    ObjectSerializer::integer(llx as i64),
                    ObjectSerializer::integer(lly as i64),
                    ObjectSerializer::integer(urx as i64),
                    ObjectSerializer::integer(ury as i64),
                ]),
            ),
            ("FontMatrix", font_matrix()),
            ("FirstChar", ObjectSerializer::integer(first as i64)),
            ("LastChar", ObjectSerializer::integer(last as i64)),
            ("Widths", ObjectSerializer::array(self.widths())),
            ("CharProcs", Object::Dictionary(char_procs)),
            (
                "Encoding",
                ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("Encoding")),
                    ("Differences", ObjectSerializer::array(self.differences())),
                ]),
            ),
        ]);
        log::debug!(
            "Writing synthetic font {} with {} glyphs ({}..={})",
            font_id,
            self.glyphs.len(),
            first,
            last
        );
        sink.write_object(font_id, &font)
    }
}

fn font_matrix() -> Object {
    ObjectSerializer::array(vec![
        ObjectSerializer::real(0.01),
        ObjectSerializer::integer(0),
        ObjectSerializer::integer(0),
        ObjectSerializer::real(0.01),
        ObjectSerializer::integer(0),
        ObjectSerializer::integer(0),
    ])
}
