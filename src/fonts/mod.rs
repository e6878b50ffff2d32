//! Font inputs: glyph rasters from the layout layer and outline font programs
//! from the host.
//!
//! The layout layer draws glyphs through a [`GlyphSource`], which always
//! provides a bitmap. When the host's [`FontResolver`] also yields a usable
//! TrueType/OpenType program for the font, text is emitted with that outline
//! font; otherwise the bitmaps are packed into a synthetic Type3 font.

pub mod truetype_parser;

pub use truetype_parser::{FontMetrics, TrueTypeFont};

/// A rendered glyph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    /// Glyph id in the outline font program, if there is one
    pub index: u16,
    /// Advance width in device pixels
    pub advance: i32,
    /// Raster width in pixels
    pub width: u32,
    /// Raster height in pixels
    pub height: u32,
    /// Horizontal distance from the left edge of the raster to the origin
    pub xoff: i32,
    /// Vertical distance from the origin up to the top row of the raster
    pub yoff: i32,
    /// Row-major pixels, top row first; nonzero means ink
    pub bitmap: Vec<u8>,
}

impl Glyph {
    /// Whether pixel `(x, y)` carries ink. Out-of-range pixels are blank.
    pub fn ink(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let idx = (y as usize) * (self.width as usize) + x as usize;
        self.bitmap.get(idx).is_some_and(|&p| p != 0)
    }
}

/// Provider of glyphs for one font, owned by the layout layer.
pub trait GlyphSource {
    /// Resource name of the font, e.g. `"cmr10.600pk"`.
    fn name(&self) -> &str;

    /// The glyph for a character code, if the font has one.
    fn glyph(&self, code: u32) -> Option<Glyph>;
}

/// An outline font program located by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineFontData {
    /// PostScript name used as /BaseFont
    pub postscript_name: String,
    /// Complete TrueType/OpenType file
    pub program: Vec<u8>,
}

/// Locates outline font programs by font family name.
pub trait FontResolver {
    /// Return the program for `font_name`, or `None` when there is none.
    fn resolve(&mut self, font_name: &str) -> Option<OutlineFontData>;
}

impl<F> FontResolver for F
where
    F: FnMut(&str) -> Option<OutlineFontData>,
{
    fn resolve(&mut self, font_name: &str) -> Option<OutlineFontData> {
        self(font_name)
    }
}

/// Resolver that never finds anything; every font becomes synthetic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFontResolver;

impl FontResolver for NullFontResolver {
    fn resolve(&mut self, _font_name: &str) -> Option<OutlineFontData> {
        None
    }
}

/// The family part of a resource name: everything before the first `:`.
pub fn family_name(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

/// Nominal font size in device pixels encoded in a resource name.
///
/// Names look like `cmr10.600pk`: the digits just before the first `.` are
/// the point size (10 if absent) and what follows the dot, minus a two
/// letter suffix, is the resolution (72 if absent).
pub fn font_size_from_name(name: &str) -> f64 {
    let Some(pos) = name.find('.') else {
        return 10.0;
    };
    let head = &name[..pos];
    let digits = head
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    let size = head[pos - digits..]
        .parse::<f64>()
        .ok()
        .filter(|s| *s > 0.0)
        .unwrap_or(10.0);
    let dpi = name
        .get(pos + 1..name.len().saturating_sub(2))
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .unwrap_or(72.0);
    size * dpi / 72.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_size_from_name() {
        assert!((font_size_from_name("cmr10.600pk") - 10.0 * 600.0 / 72.0).abs() < 1e-9);
        assert!((font_size_from_name("ecrm12.300pk") - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_font_size_defaults() {
        assert_eq!(font_size_from_name("Helvetica"), 10.0);
        assert_eq!(font_size_from_name("cmr.600pk"), 10.0 * 600.0 / 72.0);
        assert_eq!(font_size_from_name("cmr10.x"), 10.0);
    }

    #[test]
    fn test_family_name() {
        assert_eq!(family_name("DejaVuSans:bold"), "DejaVuSans");
        assert_eq!(family_name("cmr10.600pk"), "cmr10.600pk");
    }

    #[test]
    fn test_glyph_ink() {
        let g = Glyph {
            index: 0,
            advance: 3,
            width: 2,
            height: 2,
            xoff: 0,
            yoff: 1,
            bitmap: vec![1, 0, 0, 1],
        };
        assert!(g.ink(0, 0));
        assert!(!g.ink(1, 0));
        assert!(g.ink(1, 1));
        assert!(!g.ink(5, 0));
    }

    #[test]
    fn test_closure_resolver() {
        let mut resolver = |name: &str| {
            (name == "Serif").then(|| OutlineFontData {
                postscript_name: "Serif-Regular".to_string(),
                program: vec![1, 2, 3],
            })
        };
        assert!(resolver.resolve("Serif").is_some());
        assert!(resolver.resolve("Sans").is_none());
        assert!(NullFontResolver.resolve("Serif").is_none());
    }
}
