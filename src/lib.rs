// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # pdf_weave
//!
//! Streaming PDF backend for typesetting engines. A layout engine draws
//! through a small set of primitives (glyphs, lines, arcs, fills, images,
//! clips, links, outline entries) and gets a paginated PDF 1.4 file.
//!
//! ## Features
//!
//! - **Fonts**: embedded TrueType/OpenType programs as Type0 fonts with
//!   ToUnicode maps, or synthetic Type3 fonts built from glyph bitmaps when no
//!   outline program is available
//! - **Text batching**: glyphs on one baseline become a single `TJ` with
//!   explicit kerning only where the placement deviates
//! - **Graphics**: pens, brushes, constant alpha, transforms, rectangular
//!   clips, Bézier arcs
//! - **Images**: external files converted to single-page PDFs and imported as
//!   Form XObjects, plus grayscale bitmaps; both deduplicated
//! - **Navigation**: named destinations, link annotations, nested outlines
//!
//! Page content is written as each page closes. Everything shared between
//! pages is collected and written once, when the document closes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_weave::{DocumentSession, NullFontResolver, PdfCopyEmbedder, Pencil, RendererConfig, Rgba};
//!
//! # fn main() -> pdf_weave::Result<()> {
//! let config = RendererConfig::for_paper("a4", false).unwrap_or_default().with_title("Report");
//! let mut doc = DocumentSession::create("report.pdf", config, NullFontResolver, PdfCopyEmbedder)?;
//!
//! let pixel = doc.geometry().pixel;
//! doc.set_pencil(Pencil::new(Rgba::rgb(0, 0, 128), pixel));
//! doc.line(100 * pixel, -200 * pixel, 900 * pixel, -200 * pixel);
//! doc.anchor("intro", 100 * pixel, -180 * pixel);
//! doc.toc_entry("toc-strong-1", "Introduction", 100 * pixel, -180 * pixel);
//!
//! doc.next_page();
//! doc.href("#intro", 100 * pixel, -300 * pixel, 400 * pixel, -280 * pixel);
//! doc.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Coordinates
//!
//! Primitives take integer layout units. `pixel` of them make one device
//! pixel and `dpi` device pixels make an inch. The origin is the top-left
//! corner of the paper with y growing upward, so points on the page have
//! `y <= 0`.
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Configuration
pub mod config;

// PDF object model
pub mod object;

// Resource ids
pub mod registry;

// Coordinates and paths
pub mod geometry;

// Font inputs
pub mod fonts;

// PDF writing
pub mod writer;

// Drawing session
pub mod renderer;

// Re-exports
pub use config::{PaperSize, RendererConfig};
pub use error::{Error, Result};
pub use fonts::{FontResolver, Glyph, GlyphSource, NullFontResolver, OutlineFontData};
pub use geometry::{Affine, PageGeometry, Si};
pub use object::{Object, ObjectRef};
pub use renderer::{Brush, DocumentSession, Pencil, Rgba};
pub use writer::{GrayBitmap, ImageBox, ImageEmbedder, NullImageEmbedder, PdfCopyEmbedder};

/// Version of the crate, as written to the document's `/Producer`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
