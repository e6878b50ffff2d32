//! The document session: the primitive API the layout layer draws through.
//!
//! A session owns the output file and every deferred builder. Page content is
//! streamed out as each page closes; fonts, alpha states, link annotations,
//! destinations and the outline are written when the document closes.
//!
//! Primitives never return errors. Contract violations (bad scope nesting,
//! malformed coordinate lists, drawing after close) are logged and the call
//! is ignored. A recoverable failure such as an image that cannot be
//! converted skips the placement. A fatal failure (I/O, object id
//! exhaustion) poisons the session: later primitives do nothing and
//! [`DocumentSession::close`] returns the stored error.

use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::fonts::{FontResolver, GlyphSource};
use crate::geometry::arc::{bezier_arc, PathSegment};
use crate::geometry::{Affine, PageGeometry, Si};
use crate::object::{Object, ObjectRef};
use crate::renderer::graphics::{quantize, Brush, Pencil, Rgb1000, ScopeKind, StateStack};
use crate::renderer::text::{batch_runs, PendingGlyph};
use crate::writer::annotation_builder::{LinkGraph, LinkTarget};
use crate::writer::content_stream::{ContentStreamBuilder, ContentStreamOp};
use crate::writer::font_manager::FontTable;
use crate::writer::graphics_state::AlphaStates;
use crate::writer::image_handler::{GrayBitmap, ImageBox, ImageEmbedder, ImageExtent, ImageTable};
use crate::writer::object_serializer::ObjectSerializer;
use crate::writer::outline_builder::{text_string, toc_level, OutlineBuilder, OutlineEntry};
use crate::writer::pdf_writer::{stream_object, CatalogExtras, ObjectSink, PdfFile};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Scopes every page opens before user content: the outer save with the
/// device transform, and the page clip.
const PAGE_SCOPES: usize = 2;

/// Padding added around link rectangles, in device pixels.
const LINK_PAD_X: Si = 5;
const LINK_PAD_Y: Si = 10;

/// Content and resources of the page being drawn.
struct PageContent {
    id: ObjectRef,
    ops: ContentStreamBuilder,
    fonts: BTreeMap<String, ObjectRef>,
    ext_gstates: BTreeMap<String, ObjectRef>,
    xobjects: BTreeMap<String, ObjectRef>,
    annots: Vec<ObjectRef>,
    /// Inside `BT`/`ET`: device position of the last `Td` origin
    text: Option<(Si, Si)>,
    pending: Vec<PendingGlyph>,
}

impl PageContent {
    fn new(id: ObjectRef) -> Self {
        Self {
            id,
            ops: ContentStreamBuilder::new(),
            fonts: BTreeMap::new(),
            ext_gstates: BTreeMap::new(),
            xobjects: BTreeMap::new(),
            annots: Vec::new(),
            text: None,
            pending: Vec::new(),
        }
    }
}

fn resource_dict(map: &BTreeMap<String, ObjectRef>) -> Object {
    Object::Dictionary(
        map.iter()
            .map(|(name, id)| (name.clone(), Object::Reference(*id)))
            .collect(),
    )
}

fn open_file<W: Write>(file: &mut Option<PdfFile<W>>) -> Result<&mut PdfFile<W>> {
    file.as_mut()
        .ok_or_else(|| Error::ContractViolation("the document is already closed".to_string()))
}

/// A PDF document being rendered.
///
/// ```ignore
/// use pdf_weave::{DocumentSession, RendererConfig, NullFontResolver, PdfCopyEmbedder, Pencil, Rgba};
///
/// let mut doc = DocumentSession::create("out.pdf", RendererConfig::new(), NullFontResolver, PdfCopyEmbedder)?;
/// doc.set_pencil(Pencil::new(Rgba::rgb(200, 0, 0), 256));
/// doc.line(0, -10_000, 100_000, -10_000);
/// doc.close()?;
/// ```
pub struct DocumentSession<W: Write> {
    file: Option<PdfFile<W>>,
    output: Option<W>,
    config: RendererConfig,
    geometry: PageGeometry,
    font_resolver: Box<dyn FontResolver>,
    embedder: Box<dyn ImageEmbedder>,
    fonts: FontTable,
    alpha: AlphaStates,
    images: ImageTable,
    links: LinkGraph,
    outline: OutlineBuilder,
    state: StateStack,
    page: PageContent,
    page_index: usize,
    pencil: Pencil,
    brush: Brush,
    failure: Option<Error>,
    closed: bool,
}

impl DocumentSession<BufWriter<File>> {
    /// Create `path` and open the first page.
    pub fn create(
        path: impl AsRef<Path>,
        config: RendererConfig,
        fonts: impl FontResolver + 'static,
        images: impl ImageEmbedder + 'static,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        log::info!("Writing {}", path.display());
        Self::new(BufWriter::new(file), config, fonts, images)
    }
}

impl<W: Write> DocumentSession<W> {
    /// Start a document on `writer` and open the first page.
    pub fn new(
        writer: W,
        config: RendererConfig,
        fonts: impl FontResolver + 'static,
        images: impl ImageEmbedder + 'static,
    ) -> Result<Self> {
        let geometry = PageGeometry::from_config(&config);
        let file = PdfFile::new(writer, &config.version, config.object_limit)?;
        log::debug!(
            "New document: {} at {} dpi, {:.1}x{:.1} pt, {} pages expected",
            config.page_type,
            geometry.dpi,
            geometry.width_pt,
            geometry.height_pt,
            config.nr_pages
        );

        let mut session = Self {
            file: Some(file),
            output: None,
            geometry,
            font_resolver: Box::new(fonts),
            embedder: Box::new(images),
            fonts: FontTable::new(config.compress),
            alpha: AlphaStates::new(),
            images: ImageTable::new(config.compress),
            links: LinkGraph::new(),
            outline: OutlineBuilder::new(),
            state: StateStack::new(),
            page: PageContent::new(ObjectRef::new(0, 0)),
            page_index: 0,
            pencil: Pencil::default(),
            brush: Brush::default(),
            failure: None,
            closed: false,
            config,
        };
        if let Err(e) = session.open_page() {
            session.closed = true;
            return Err(e);
        }
        Ok(session)
    }

    /// The session configuration.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The layout → device mapping.
    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// Zero-based index of the page being drawn.
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Transform and clip scopes the caller has left open on this page.
    pub fn open_scopes(&self) -> usize {
        self.state.depth().saturating_sub(PAGE_SCOPES)
    }

    /// Whether a fatal error has stopped the session.
    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current pencil.
    pub fn pencil(&self) -> Pencil {
        self.pencil
    }

    /// Current brush.
    pub fn brush(&self) -> Brush {
        self.brush
    }

    /// Set the color and width of lines and glyphs. Operators are emitted
    /// lazily, at the next mark that uses them.
    pub fn set_pencil(&mut self, pencil: Pencil) {
        self.pencil = pencil;
    }

    /// Set the background color used by [`clear`](Self::clear).
    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    /// Run one primitive, applying the error policy.
    fn run(&mut self, what: &str, op: impl FnOnce(&mut Self) -> Result<()>) {
        if self.closed {
            log::warn!("{}", Error::ContractViolation(format!("{} after close", what)));
            return;
        }
        if self.failure.is_some() {
            return;
        }
        if let Err(e) = op(self) {
            if e.is_recoverable() {
                log::warn!("{} skipped: {}", what, e);
            } else {
                log::error!("{} failed; no further output will be produced: {}", what, e);
                self.failure = Some(e);
            }
        }
    }

    fn device(&self, x: Si, y: Si) -> (f64, f64) {
        (self.geometry.to_x(x) as f64, self.geometry.to_y(y) as f64)
    }

    /// Layout point → default user space.
    fn user_space(&self, x: Si, y: Si) -> (f64, f64) {
        let (dx, dy) = self.device(x, y);
        let scale = self.geometry.scale();
        (dx * scale, dy * scale)
    }

    // ---- pages ----

    fn open_page(&mut self) -> Result<()> {
        let id = open_file(&mut self.file)?.allocate()?;
        self.page = PageContent::new(id);
        self.state.reset();

        let scale = self.geometry.scale();
        let (x1, y1, x2, y2) = self.geometry.page_clip();
        let (x, y, w, h) = self.geometry.outer_rect(x1, y1, x2, y2);
        self.state.push(ScopeKind::Page);
        self.page.ops.save_state().transform(scale, 0.0, 0.0, scale, 0.0, 0.0);
        self.state.push(ScopeKind::Page);
        self.page.ops.save_state().clip_rect(x, y, w, h);

        log::debug!("Opened page {} as {}", self.page_index + 1, id);
        Ok(())
    }

    fn close_page(&mut self) -> Result<()> {
        self.end_text()?;
        while let Some(kind) = self.state.innermost() {
            if kind != ScopeKind::Page {
                log::warn!(
                    "{:?} scope left open on page {}; closing it",
                    kind,
                    self.page_index + 1
                );
            }
            self.state.pop(kind)?;
            self.page.ops.restore_state();
        }

        let id = self.page.id;
        let page = std::mem::replace(&mut self.page, PageContent::new(id));
        let content = stream_object(Vec::new(), page.ops.build()?, self.config.compress)?;
        let file = open_file(&mut self.file)?;
        let contents = file.add_object(&content)?;

        let mut resources = Vec::new();
        if !page.fonts.is_empty() {
            resources.push(("Font", resource_dict(&page.fonts)));
        }
        if !page.ext_gstates.is_empty() {
            resources.push(("ExtGState", resource_dict(&page.ext_gstates)));
        }
        if !page.xobjects.is_empty() {
            resources.push(("XObject", resource_dict(&page.xobjects)));
        }

        let mut dict = vec![
            ("Type", ObjectSerializer::name("Page")),
            ("Parent", Object::Reference(file.pages_root())),
            (
                "MediaBox",
                ObjectSerializer::rect(0.0, 0.0, self.geometry.width_pt, self.geometry.height_pt),
            ),
            ("Contents", Object::Reference(contents)),
            ("Resources", ObjectSerializer::dict(resources)),
        ];
        if !page.annots.is_empty() {
            dict.push((
                "Annots",
                Object::Array(page.annots.iter().map(|a| Object::Reference(*a)).collect()),
            ));
        }
        file.write_object(id, &ObjectSerializer::dict(dict))?;
        file.add_page(id);
        log::debug!("Closed page {} ({} annotations)", self.page_index + 1, page.annots.len());
        Ok(())
    }

    /// Finish the current page and start a new one.
    pub fn next_page(&mut self) {
        self.run("next_page", |s| {
            s.close_page()?;
            s.page_index += 1;
            s.open_page()
        });
    }

    // ---- text ----

    fn begin_text(&mut self) {
        if self.page.text.is_none() {
            let origin = (self.geometry.to_x(0), self.geometry.to_y(0));
            self.page
                .ops
                .op(ContentStreamOp::BeginText)
                .op(ContentStreamOp::SetTextMatrix(
                    1.0,
                    0.0,
                    0.0,
                    1.0,
                    origin.0 as f64,
                    origin.1 as f64,
                ));
            self.page.text = Some(origin);
        }
    }

    fn end_text(&mut self) -> Result<()> {
        if self.page.text.is_some() {
            self.flush_glyphs()?;
            self.page.ops.op(ContentStreamOp::EndText);
            self.page.text = None;
        }
        Ok(())
    }

    /// Write the buffered glyphs as `Td` + `TJ` runs.
    fn flush_glyphs(&mut self) -> Result<()> {
        if self.page.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.page.pending);
        let Some((_, size)) = self.state.current().font.clone() else {
            return Err(Error::ContractViolation(
                "glyphs are pending but no font is selected".to_string(),
            ));
        };
        let (mut px, mut py) = self
            .page
            .text
            .unwrap_or((self.geometry.to_x(0), self.geometry.to_y(0)));

        for run in batch_runs(&pending, self.geometry.pixel, size) {
            let (x, y) = (self.geometry.to_x(run.x), self.geometry.to_y(run.y));
            self.page
                .ops
                .op(ContentStreamOp::MoveText((x - px) as f64, (y - py) as f64))
                .op(ContentStreamOp::ShowTextArray(run.items));
            (px, py) = (x, y);
        }
        self.page.text = Some((px, py));
        Ok(())
    }

    /// Draw the glyph for `code` from `font` with its origin at `(x, y)`.
    pub fn draw_glyph(&mut self, code: u32, font: &dyn GlyphSource, x: Si, y: Si) {
        self.run("draw_glyph", |s| s.glyph_impl(code, font, x, y));
    }

    fn glyph_impl(&mut self, code: u32, font: &dyn GlyphSource, x: Si, y: Si) -> Result<()> {
        let Some(glyph) = font.glyph(code) else {
            log::debug!("{} has no glyph for code {}", font.name(), code);
            return Ok(());
        };

        let file = open_file(&mut self.file)?;
        let entry = self.fonts.select(font.name(), self.font_resolver.as_mut(), file)?;
        let Some(item) = entry.value.encode(code, &glyph) else {
            return Ok(());
        };
        let (name, id, size) = (entry.name.clone(), entry.id, entry.value.text_size());
        self.page.fonts.insert(name.clone(), id);

        self.begin_text();
        let same_font = matches!(&self.state.current().font, Some((n, s)) if *n == name && *s == size);
        if !same_font {
            self.flush_glyphs()?;
            self.state.current_mut().update_font(&name, size);
            self.page.ops.op(ContentStreamOp::SetFont(name, size));
        }
        self.apply_pencil()?;

        self.page.pending.push(PendingGlyph {
            x,
            y,
            advance: glyph.advance,
            item,
        });
        Ok(())
    }

    // ---- state ----

    fn select_fill(&mut self, color: Rgb1000) {
        if self.state.current_mut().update_fill(color) {
            let (r, g, b) = color.components();
            self.page.ops.op(ContentStreamOp::SetFillColorRGB(r, g, b));
        }
    }

    fn select_stroke(&mut self, color: Rgb1000) {
        if self.state.current_mut().update_stroke(color) {
            let (r, g, b) = color.components();
            self.page.ops.op(ContentStreamOp::SetStrokeColorRGB(r, g, b));
        }
    }

    fn select_alpha(&mut self, alpha: u16) -> Result<()> {
        if !self.state.current_mut().update_alpha(alpha) {
            return Ok(());
        }
        let file = open_file(&mut self.file)?;
        let entry = self.alpha.select(alpha, file)?;
        let name = entry.name.clone();
        self.page.ext_gstates.insert(name.clone(), entry.id);
        self.page.ops.op(ContentStreamOp::SetExtGState(name));
        Ok(())
    }

    /// Bring colors, alpha and line width in line with the pencil. Pending
    /// glyphs are written first when anything changes.
    fn apply_pencil(&mut self) -> Result<()> {
        let color = self.pencil.color.quantized();
        let alpha = self.pencil.color.alpha();
        let width = self.pencil.width as f64 / self.geometry.pixel as f64;
        let current = self.state.current();
        if current.fill == Some(color)
            && current.stroke == Some(color)
            && current.alpha == alpha
            && current.line_width == Some(width)
        {
            return Ok(());
        }

        self.flush_glyphs()?;
        self.select_fill(color);
        self.select_stroke(color);
        if self.state.current_mut().update_line_width(width) {
            self.page.ops.op(ContentStreamOp::SetLineWidth(width));
        }
        self.select_alpha(alpha)
    }

    // ---- scopes ----

    /// Open a scope whose content is mapped through `frame`, an affine map
    /// on layout coordinates.
    pub fn push_transform(&mut self, frame: &Affine) {
        self.run("push_transform", |s| {
            s.end_text()?;
            let m = s.geometry.device_frame(frame);
            s.state.push(ScopeKind::Transform);
            s.page.ops.save_state().transform(m.a, m.b, m.c, m.d, m.e, m.f);
            Ok(())
        });
    }

    /// Close the innermost scope, which must come from `push_transform`.
    pub fn pop_transform(&mut self) {
        self.run("pop_transform", |s| s.pop_scope(ScopeKind::Transform));
    }

    /// Open a scope clipped to the layout rectangle, rounded outward to
    /// whole device pixels.
    pub fn push_clip(&mut self, x1: Si, y1: Si, x2: Si, y2: Si) {
        self.run("push_clip", |s| {
            s.end_text()?;
            let (x, y, w, h) = s.geometry.outer_rect(x1, y1, x2, y2);
            s.state.push(ScopeKind::Clip);
            s.page.ops.save_state().clip_rect(x, y, w, h);
            Ok(())
        });
    }

    /// Close the innermost scope, which must come from `push_clip`.
    pub fn pop_clip(&mut self) {
        self.run("pop_clip", |s| s.pop_scope(ScopeKind::Clip));
    }

    fn pop_scope(&mut self, kind: ScopeKind) -> Result<()> {
        if self.state.innermost() != Some(kind) || self.open_scopes() == 0 {
            return Err(Error::ContractViolation(format!(
                "no open {:?} scope to close (innermost is {:?})",
                kind,
                self.state.innermost()
            )));
        }
        self.end_text()?;
        self.state.pop(kind)?;
        self.page.ops.restore_state();
        Ok(())
    }

    // ---- marks ----

    /// Stroke a segment with the pencil.
    pub fn line(&mut self, x1: Si, y1: Si, x2: Si, y2: Si) {
        self.run("line", |s| {
            s.end_text()?;
            s.apply_pencil()?;
            let (ax, ay) = s.device(x1, y1);
            let (bx, by) = s.device(x2, y2);
            s.page.ops.move_to(ax, ay).line_to(bx, by).stroke();
            Ok(())
        });
    }

    /// Stroke a polyline through the points `(xs[i], ys[i])`.
    pub fn lines(&mut self, xs: &[Si], ys: &[Si]) {
        self.run("lines", |s| {
            s.polyline_path(xs, ys)?;
            s.page.ops.stroke();
            Ok(())
        });
    }

    /// Fill the closed polygon through the points `(xs[i], ys[i])` with the
    /// pencil color.
    pub fn polygon(&mut self, xs: &[Si], ys: &[Si]) {
        self.run("polygon", |s| {
            s.polyline_path(xs, ys)?;
            s.page.ops.close_path().fill();
            Ok(())
        });
    }

    fn polyline_path(&mut self, xs: &[Si], ys: &[Si]) -> Result<()> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(Error::ContractViolation(format!(
                "coordinate lists must be non-empty and of equal length ({} x, {} y)",
                xs.len(),
                ys.len()
            )));
        }
        self.end_text()?;
        self.apply_pencil()?;
        for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
            let (dx, dy) = self.device(x, y);
            if i == 0 {
                self.page.ops.move_to(dx, dy);
            } else {
                self.page.ops.line_to(dx, dy);
            }
        }
        Ok(())
    }

    /// Stroke the arc of the ellipse inscribed in the rectangle, from angle
    /// `alpha` sweeping `delta` (hundredths of a degree).
    pub fn arc(&mut self, x1: Si, y1: Si, x2: Si, y2: Si, alpha: i32, delta: i32) {
        self.run("arc", |s| {
            s.arc_path(x1, y1, x2, y2, alpha, delta)?;
            s.page.ops.stroke();
            Ok(())
        });
    }

    /// Fill the pie slice (or whole ellipse) described as for [`arc`](Self::arc).
    pub fn fill_arc(&mut self, x1: Si, y1: Si, x2: Si, y2: Si, alpha: i32, delta: i32) {
        self.run("fill_arc", |s| {
            s.arc_path(x1, y1, x2, y2, alpha, delta)?;
            s.page.ops.fill();
            Ok(())
        });
    }

    fn arc_path(&mut self, x1: Si, y1: Si, x2: Si, y2: Si, alpha: i32, delta: i32) -> Result<()> {
        self.end_text()?;
        self.apply_pencil()?;
        let (ax, ay) = self.device(x1, y1);
        let (bx, by) = self.device(x2, y2);
        for segment in bezier_arc(ax, ay, bx, by, alpha, delta) {
            match segment {
                PathSegment::MoveTo(x, y) => self.page.ops.move_to(x, y),
                PathSegment::LineTo(x, y) => self.page.ops.line_to(x, y),
                PathSegment::CurveTo(c1x, c1y, c2x, c2y, x, y) => {
                    self.page.ops.curve_to(c1x, c1y, c2x, c2y, x, y)
                },
                PathSegment::Close => self.page.ops.close_path(),
            };
        }
        Ok(())
    }

    /// Fill a rectangle with the pencil color. Empty rectangles draw nothing.
    pub fn fill(&mut self, x1: Si, y1: Si, x2: Si, y2: Si) {
        if !(x1 < x2 && y1 < y2) {
            log::debug!("fill of empty rectangle ({}, {})-({}, {}) ignored", x1, y1, x2, y2);
            return;
        }
        self.run("fill", |s| {
            s.end_text()?;
            s.apply_pencil()?;
            s.rect_path(x1, y1, x2, y2);
            s.page.ops.fill();
            Ok(())
        });
    }

    /// Paint a rectangle with the brush color.
    pub fn clear(&mut self, x1: Si, y1: Si, x2: Si, y2: Si) {
        self.run("clear", |s| {
            s.end_text()?;
            s.state.push(ScopeKind::Local);
            s.page.ops.save_state();
            s.select_fill(s.brush.color.quantized());
            s.select_alpha(s.brush.color.alpha())?;
            s.rect_path(x1, y1, x2, y2);
            s.page.ops.fill();
            s.select_fill(s.pencil.color.quantized());
            s.state.pop(ScopeKind::Local)?;
            s.page.ops.restore_state();
            Ok(())
        });
    }

    fn rect_path(&mut self, x1: Si, y1: Si, x2: Si, y2: Si) {
        let (ax, ay) = self.device(x1, y1);
        let (bx, by) = self.device(x2, y2);
        self.page.ops.rect(ax, ay, bx - ax, by - ay).close_path();
    }

    // ---- images ----

    /// Place the image in `source`, cropped to `crop` (in the image's own
    /// units), scaled to `w` x `h` layout units with its lower-left corner at
    /// `(x, y)`. `alpha` is the 8-bit opacity.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image(&mut self, source: &Path, w: Si, h: Si, x: Si, y: Si, crop: ImageBox, alpha: u8) {
        self.run("draw_image", |s| {
            s.end_text()?;
            let file = open_file(&mut s.file)?;
            let Some(entry) = s.images.form(source, &crop, s.embedder.as_mut(), file)? else {
                return Ok(());
            };
            let (ew, eh) = match entry.value {
                ImageExtent::Form { width, height } => (width, height),
                ImageExtent::Unit => (1.0, 1.0),
            };
            let cw = if crop.width() > 0.0 { crop.width() } else { ew };
            let ch = if crop.height() > 0.0 { crop.height() } else { eh };
            if cw <= 0.0 || ch <= 0.0 {
                return Err(Error::ImageImport(format!("{} has an empty extent", source.display())));
            }
            let pixel = s.geometry.pixel as f64;
            let (sx, sy) = (w as f64 / pixel / cw, h as f64 / pixel / ch);
            s.place_xobject(entry.name, entry.id, sx, sy, x, y, alpha)
        });
    }

    /// Place a grayscale bitmap scaled to `w` x `h` layout units with its
    /// lower-left corner at `(x, y)`.
    pub fn draw_bitmap(&mut self, bitmap: &GrayBitmap, w: Si, h: Si, x: Si, y: Si, alpha: u8) {
        self.run("draw_bitmap", |s| {
            s.end_text()?;
            let file = open_file(&mut s.file)?;
            let entry = s.images.bitmap(bitmap, file)?;
            let pixel = s.geometry.pixel as f64;
            s.place_xobject(entry.name, entry.id, w as f64 / pixel, h as f64 / pixel, x, y, alpha)
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn place_xobject(
        &mut self,
        name: String,
        id: ObjectRef,
        sx: f64,
        sy: f64,
        x: Si,
        y: Si,
        alpha: u8,
    ) -> Result<()> {
        let (tx, ty) = self.device(x, y);
        self.state.push(ScopeKind::Local);
        self.page.ops.save_state();
        self.select_alpha(quantize(alpha))?;
        self.page
            .ops
            .transform(sx, 0.0, 0.0, sy, tx, ty)
            .op(ContentStreamOp::PaintXObject(name.clone()));
        self.state.pop(ScopeKind::Local)?;
        self.page.ops.restore_state();
        self.page.xobjects.insert(name, id);
        Ok(())
    }

    // ---- links and outline ----

    /// Make `(x, y)` on the current page the destination of `label`.
    pub fn anchor(&mut self, label: &str, x: Si, y: Si) {
        self.run("anchor", |s| {
            let (px, py) = s.user_space(x, y);
            s.links.add_destination(label, s.page.id, px, py);
            Ok(())
        });
    }

    /// Make the rectangle a link to `target`: `#label` for an anchor in this
    /// document, anything else is opened as a URI.
    pub fn href(&mut self, target: &str, x1: Si, y1: Si, x2: Si, y2: Si) {
        self.run("href", |s| {
            let pixel = s.geometry.pixel;
            let (lx, ly) = s.user_space(x1 - LINK_PAD_X * pixel, y1 - LINK_PAD_Y * pixel);
            let (ux, uy) = s.user_space(x2 + LINK_PAD_X * pixel, y2 + LINK_PAD_Y * pixel);
            let file = open_file(&mut s.file)?;
            let id = s
                .links
                .add_link(file, s.page_index, [lx, ly, ux, uy], LinkTarget::parse(target))?;
            s.page.annots.push(id);
            Ok(())
        });
    }

    /// Add an outline entry whose level follows from a table-of-contents
    /// kind such as `toc-strong-1` or `toc-3`.
    pub fn toc_entry(&mut self, kind: &str, title: &str, x: Si, y: Si) {
        self.add_outline_entry(title, x, y, toc_level(kind));
    }

    /// Add an outline entry pointing at `(x, y)` on the current page.
    pub fn add_outline_entry(&mut self, title: &str, x: Si, y: Si, level: i32) {
        self.run("add_outline_entry", |s| {
            let (px, py) = s.user_space(x, y);
            s.outline.add_entry(OutlineEntry {
                title: title.to_string(),
                page: s.page.id,
                x: px,
                y: py,
                level,
            });
            Ok(())
        });
    }

    // ---- closing ----

    fn info(&self) -> Vec<(String, Object)> {
        let producer = format!("pdf_weave {}", crate::VERSION);
        let creator = self.config.creator.as_deref().unwrap_or("pdf_weave");
        let mut info = vec![
            ("Producer".to_string(), text_string(&producer)),
            ("Creator".to_string(), text_string(creator)),
        ];
        if let Some(title) = &self.config.title {
            info.push(("Title".to_string(), text_string(title)));
        }
        if let Some(author) = &self.config.author {
            info.push(("Author".to_string(), text_string(author)));
        }
        info
    }

    /// Close the last page and write everything that was deferred.
    ///
    /// Returns the error that stopped the session, if any. Closing twice is
    /// an error.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ContractViolation("the document is already closed".to_string()));
        }
        self.closed = true;
        if let Some(e) = self.failure.take() {
            self.file = None;
            return Err(e);
        }
        match self.finalize() {
            Ok(out) => {
                self.output = Some(out);
                Ok(())
            },
            Err(e) => {
                log::error!("Closing the document failed: {}", e);
                self.file = None;
                Err(e)
            },
        }
    }

    fn finalize(&mut self) -> Result<W> {
        self.close_page()?;
        let mut file = self
            .file
            .take()
            .ok_or_else(|| Error::ContractViolation("the document is already closed".to_string()))?;

        std::mem::take(&mut self.alpha).flush(&mut file)?;
        self.links
            .flush_annotations(&mut file, self.config.link_border_visible)?;
        let dests = self.links.flush_destinations(&mut file)?;
        let outlines = self.outline.flush(&mut file, self.config.outline_open)?;
        std::mem::replace(&mut self.fonts, FontTable::new(self.config.compress)).flush(&mut file)?;
        std::mem::replace(&mut self.images, ImageTable::new(self.config.compress)).flush(&mut file)?;

        let pages = file.page_count();
        let out = file.finish(CatalogExtras {
            dests,
            outlines,
            info: self.info(),
        })?;
        log::info!("Document closed: {} pages", pages);
        Ok(out)
    }

    /// Close the document if needed and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        if !self.closed {
            self.close()?;
        }
        self.output.take().ok_or_else(|| {
            Error::ContractViolation("the document was closed without producing output".to_string())
        })
    }
}

impl<W: Write> Drop for DocumentSession<W> {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!("Document dropped without close; the output is incomplete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{Glyph, NullFontResolver};
    use crate::renderer::graphics::Rgba;
    use crate::writer::image_handler::NullImageEmbedder;

    struct Blocks;

    impl GlyphSource for Blocks {
        fn name(&self) -> &str {
            "blocks10.600pk"
        }

        fn glyph(&self, code: u32) -> Option<Glyph> {
            (code < 128).then(|| Glyph {
                index: code as u16,
                advance: 10,
                width: 2,
                height: 2,
                xoff: 0,
                yoff: 2,
                bitmap: vec![1, 0, 0, 1],
            })
        }
    }

    fn session() -> DocumentSession<Vec<u8>> {
        let config = RendererConfig::new().with_compress(false);
        DocumentSession::new(Vec::new(), config, NullFontResolver, NullImageEmbedder).unwrap()
    }

    fn content(doc: &DocumentSession<Vec<u8>>) -> String {
        String::from_utf8_lossy(&doc.page.ops.build().unwrap()).into_owned()
    }

    #[test]
    fn test_page_starts_with_transform_and_clip() {
        let doc = session();
        let text = content(&doc);
        assert!(text.starts_with("q\n0.12 0 0 0.12 0 0 cm\nq\n"));
        assert!(text.contains(" re\nW\nn\n"));
        assert_eq!(doc.open_scopes(), 0);
    }

    #[test]
    fn test_pencil_emitted_once() {
        let mut doc = session();
        doc.set_pencil(Pencil::new(Rgba::rgb(255, 0, 0), 512));
        doc.line(0, -1000, 1000, -1000);
        doc.line(0, -2000, 1000, -2000);
        let text = content(&doc);
        assert_eq!(text.matches(" rg").count(), 1);
        assert_eq!(text.matches(" RG").count(), 1);
        assert_eq!(text.matches(" w\n").count(), 1);
        assert!(text.contains("2 w"));
    }

    #[test]
    fn test_mismatched_pop_is_ignored() {
        let mut doc = session();
        doc.push_clip(0, -1000, 1000, 0);
        doc.pop_transform();
        assert_eq!(doc.open_scopes(), 1);
        doc.pop_clip();
        doc.pop_clip();
        assert_eq!(doc.open_scopes(), 0);
        assert!(!doc.has_failed());
    }

    #[test]
    fn test_glyphs_batched_into_one_show() {
        let mut doc = session();
        let pixel = doc.geometry().pixel;
        for (i, code) in b"abc".iter().enumerate() {
            doc.draw_glyph(*code as u32, &Blocks, i as Si * 10 * pixel, -100 * pixel);
        }
        doc.line(0, 0, pixel, 0);
        let text = content(&doc);
        assert_eq!(text.matches("BT").count(), 1);
        assert_eq!(text.matches("TJ").count(), 1);
        assert!(text.contains("[(abc) ] TJ"));
        assert!(text.contains("/F1 100 Tf"));
        assert!(text.find("ET").unwrap() < text.find(" l\n").unwrap());
    }

    #[test]
    fn test_bad_coordinate_lists_rejected() {
        let mut doc = session();
        let before = content(&doc);
        doc.lines(&[0, 1], &[0]);
        doc.polygon(&[], &[]);
        assert_eq!(content(&doc), before);
        assert!(!doc.has_failed());
    }

    #[test]
    fn test_empty_fill_draws_nothing() {
        let mut doc = session();
        let before = content(&doc);
        doc.fill(10, 0, 5, 10);
        assert_eq!(content(&doc), before);
    }

    #[test]
    fn test_clear_restores_state() {
        let mut doc = session();
        doc.set_brush(Brush::new(Rgba::rgb(0, 0, 255)));
        doc.clear(0, -1000, 1000, 0);
        let text = content(&doc);
        assert!(text.contains("0 0 1 rg"));
        assert_eq!(doc.state.current().fill, None);
        assert_eq!(doc.open_scopes(), 0);
    }

    #[test]
    fn test_close_twice_is_an_error() {
        let mut doc = session();
        doc.close().unwrap();
        assert!(matches!(doc.close(), Err(Error::ContractViolation(_))));
        doc.line(0, 0, 1, 1);
    }

    #[test]
    fn test_exhausted_ids_poison_session() {
        let config = RendererConfig::new().with_compress(false).with_object_limit(4);
        let mut doc = DocumentSession::new(Vec::new(), config, NullFontResolver, NullImageEmbedder).unwrap();
        for _ in 0..4 {
            doc.next_page();
        }
        assert!(doc.has_failed());
        assert!(matches!(doc.close(), Err(Error::ResourceExhausted { limit: 4 })));
    }

    #[test]
    fn test_finish_returns_pdf() {
        let mut doc = session();
        doc.fill(0, -1000, 1000, 0);
        let bytes = doc.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(bytes.ends_with(b"%%EOF"));
    }
}
