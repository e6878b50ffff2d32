//! Configuration for a rendering session.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Standard paper sizes, in centimetres (portrait).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperSize {
    /// ISO A3
    A3,
    /// ISO A4
    A4,
    /// ISO A5
    A5,
    /// ISO B5
    B5,
    /// US Letter
    Letter,
    /// US Legal
    Legal,
}

impl PaperSize {
    /// Resolve a page type name such as `"a4"` or `"letter"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "a3" => Some(PaperSize::A3),
            "a4" => Some(PaperSize::A4),
            "a5" => Some(PaperSize::A5),
            "b5" => Some(PaperSize::B5),
            "letter" | "us-letter" => Some(PaperSize::Letter),
            "legal" | "us-legal" => Some(PaperSize::Legal),
            _ => None,
        }
    }

    /// Width and height in centimetres.
    pub fn dimensions_cm(self) -> (f64, f64) {
        match self {
            PaperSize::A3 => (29.7, 42.0),
            PaperSize::A4 => (21.0, 29.7),
            PaperSize::A5 => (14.8, 21.0),
            PaperSize::B5 => (17.6, 25.0),
            PaperSize::Letter => (21.59, 27.94),
            PaperSize::Legal => (21.59, 35.56),
        }
    }
}

/// Rendering session configuration.
///
/// Coordinates handed to the session are in layout units; `pixel` of them make
/// one device pixel, and `dpi` device pixels make one inch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Device resolution
    pub dpi: u32,
    /// Layout units per device pixel
    pub pixel: i64,
    /// Expected number of pages (a hint for preallocation)
    pub nr_pages: usize,
    /// Page type name, informational once the paper size is known
    pub page_type: String,
    /// Swap paper width and height
    pub landscape: bool,
    /// Portrait paper width in centimetres
    pub paper_w: f64,
    /// Portrait paper height in centimetres
    pub paper_h: f64,
    /// Compress content streams with Flate
    pub compress: bool,
    /// PDF header version
    pub version: String,
    /// Document title (Info dictionary)
    pub title: Option<String>,
    /// Document author (Info dictionary)
    pub author: Option<String>,
    /// Creator application (Info dictionary)
    pub creator: Option<String>,
    /// Draw a dashed border around link areas
    pub link_border_visible: bool,
    /// Show outline entries expanded when the document opens
    pub outline_open: bool,
    /// Largest object number the session may allocate
    pub object_limit: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererConfig {
    /// Create a configuration for A4 portrait at 600 dpi.
    pub fn new() -> Self {
        Self {
            dpi: 600,
            pixel: 256,
            nr_pages: 0,
            page_type: "a4".to_string(),
            landscape: false,
            paper_w: 21.0,
            paper_h: 29.7,
            compress: true,
            // 1.4 is the first version with constant alpha in ExtGState
            version: "1.4".to_string(),
            title: None,
            author: None,
            creator: None,
            link_border_visible: false,
            outline_open: false,
            object_limit: u32::MAX - 1,
        }
    }

    /// Configuration for a named paper size; `None` if the name is unknown.
    pub fn for_paper(page_type: &str, landscape: bool) -> Option<Self> {
        let (paper_w, paper_h) = PaperSize::from_name(page_type)?.dimensions_cm();
        Some(Self {
            page_type: page_type.to_string(),
            landscape,
            paper_w,
            paper_h,
            ..Self::new()
        })
    }

    /// Load a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the device resolution.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Set the number of layout units per device pixel.
    pub fn with_pixel(mut self, pixel: i64) -> Self {
        self.pixel = pixel;
        self
    }

    /// Set the expected page count.
    pub fn with_nr_pages(mut self, nr_pages: usize) -> Self {
        self.nr_pages = nr_pages;
        self
    }

    /// Set the paper dimensions in centimetres (portrait).
    pub fn with_paper(mut self, paper_w: f64, paper_h: f64) -> Self {
        self.paper_w = paper_w;
        self.paper_h = paper_h;
        self
    }

    /// Set landscape orientation.
    pub fn with_landscape(mut self, landscape: bool) -> Self {
        self.landscape = landscape;
        self
    }

    /// Enable or disable content stream compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Set the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the document author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set the creator application.
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    /// Show or hide link borders.
    pub fn with_link_border_visible(mut self, visible: bool) -> Self {
        self.link_border_visible = visible;
        self
    }

    /// Expand outline entries by default.
    pub fn with_outline_open(mut self, open: bool) -> Self {
        self.outline_open = open;
        self
    }

    /// Cap the number of objects in the output.
    pub fn with_object_limit(mut self, limit: u32) -> Self {
        self.object_limit = limit;
        self
    }

    /// Paper size in centimetres after applying the orientation.
    pub fn oriented_paper_cm(&self) -> (f64, f64) {
        if self.landscape {
            (self.paper_h, self.paper_w)
        } else {
            (self.paper_w, self.paper_h)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.dpi, 600);
        assert_eq!(config.version, "1.4");
        assert!(config.compress);
        assert_eq!(config.oriented_paper_cm(), (21.0, 29.7));
    }

    #[test]
    fn test_landscape_swaps_dimensions() {
        let config = RendererConfig::for_paper("letter", true).unwrap();
        assert_eq!(config.oriented_paper_cm(), (27.94, 21.59));
    }

    #[test]
    fn test_unknown_paper() {
        assert!(RendererConfig::for_paper("napkin", false).is_none());
        assert_eq!(PaperSize::from_name(" A5 "), Some(PaperSize::A5));
    }

    #[test]
    fn test_builder_chain() {
        let config = RendererConfig::new()
            .with_dpi(300)
            .with_title("Report")
            .with_compress(false)
            .with_outline_open(true);
        assert_eq!(config.dpi, 300);
        assert_eq!(config.title.as_deref(), Some("Report"));
        assert!(!config.compress);
        assert!(config.outline_open);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = RendererConfig::from_json(r#"{"dpi": 1200, "landscape": true}"#).unwrap();
        assert_eq!(config.dpi, 1200);
        assert!(config.landscape);
        assert_eq!(config.pixel, 256);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(RendererConfig::from_json("{dpi: }").is_err());
    }
}
