//! Low-level PDF writing.
//!
//! ```text
//! DocumentSession (renderer)
//!     ↓ page content            ↓ deferred resources
//! [ContentStreamBuilder]     [FontTable] [AlphaStates] [ImageTable]
//!                            [LinkGraph] [OutlineBuilder]
//!     ↓                          ↓
//! [ObjectSink] ← PdfFile (header, objects, xref, trailer)
//!     ↓
//! [ObjectSerializer]
//!     ↓
//! PDF bytes
//! ```
//!
//! Every builder writes through `&mut dyn ObjectSink`, so each one can be
//! exercised against a [`MemorySink`] without producing a file.

pub mod annotation_builder;
pub mod content_stream;
pub mod font_manager;
pub mod graphics_state;
pub mod image_handler;
pub mod object_serializer;
pub mod outline_builder;
pub mod pdf_writer;
pub mod type3_font;

pub use annotation_builder::{Destination, LinkAnnotation, LinkGraph, LinkTarget};
pub use content_stream::{ContentStreamBuilder, ContentStreamOp, TextArrayItem};
pub use font_manager::{FontResource, FontTable, OutlineFont};
pub use graphics_state::{AlphaStates, ExtGStateBuilder, OPAQUE};
pub use image_handler::{
    GrayBitmap, ImageBox, ImageEmbedder, ImageExtent, ImageKey, ImageTable, ImportedPage,
    NullImageEmbedder, PdfCopyEmbedder,
};
pub use object_serializer::ObjectSerializer;
pub use outline_builder::{toc_level, OutlineBuilder, OutlineEntry, OutlineNode, OutlineTree};
pub use pdf_writer::{compress_data, stream_object, CatalogExtras, MemorySink, ObjectSink, PdfFile};
pub use type3_font::{SyntheticFont, SYNTHETIC_FONT_SIZE};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _serializer = ObjectSerializer::new();
        let _builder = ContentStreamBuilder::new();
        let _sink = MemorySink::new();
        assert!(FontTable::new(true).is_empty());
    }
}
