//! PDF content stream builder.
//!
//! Builds PDF content streams containing graphics and text operators
//! according to PDF specification ISO 32000-1:2008 Section 8-9.

use crate::error::Result;
use crate::writer::object_serializer::{format_real, write_name};
use std::io::Write;

/// Operations that can be added to a content stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentStreamOp {
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Set transformation matrix (cm)
    Transform(f64, f64, f64, f64, f64, f64),
    /// Begin text object (BT)
    BeginText,
    /// End text object (ET)
    EndText,
    /// Set font and size (Tf)
    SetFont(String, f64),
    /// Move text position (Td)
    MoveText(f64, f64),
    /// Set text matrix (Tm)
    SetTextMatrix(f64, f64, f64, f64, f64, f64),
    /// Show text with positioning (TJ)
    ShowTextArray(Vec<TextArrayItem>),
    /// Set fill color RGB (rg)
    SetFillColorRGB(f64, f64, f64),
    /// Set stroke color RGB (RG)
    SetStrokeColorRGB(f64, f64, f64),
    /// Set line width (w)
    SetLineWidth(f64),
    /// Move to (m)
    MoveTo(f64, f64),
    /// Line to (l)
    LineTo(f64, f64),
    /// Curve to (c)
    CurveTo(f64, f64, f64, f64, f64, f64),
    /// Rectangle (re)
    Rectangle(f64, f64, f64, f64),
    /// Close path (h)
    ClosePath,
    /// Stroke (S)
    Stroke,
    /// Fill (f)
    Fill,
    /// End path without filling/stroking (n)
    EndPath,
    /// Clip using non-zero winding rule (W)
    Clip,
    /// Paint XObject (Do)
    PaintXObject(String),
    /// Set graphics state from ExtGState dictionary (gs)
    SetExtGState(String),
    /// Type3 glyph width and bounding box (d1)
    SetGlyphMetrics {
        /// Horizontal advance in glyph space
        wx: f64,
        /// Lower-left x of the glyph box
        llx: f64,
        /// Lower-left y of the glyph box
        lly: f64,
        /// Upper-right x of the glyph box
        urx: f64,
        /// Upper-right y of the glyph box
        ury: f64,
    },
    /// 1-bit inline image mask with ASCIIHex data (BI ... ID ... EI)
    InlineImageMask {
        /// Width in samples
        width: u32,
        /// Height in samples
        height: u32,
        /// Upper-case hex digits, without the `>` terminator
        hex: Vec<u8>,
    },
}

/// Item in a TJ array (text or positioning adjustment).
#[derive(Debug, Clone, PartialEq)]
pub enum TextArrayItem {
    /// Single-byte codes, written as a literal string
    Text(Vec<u8>),
    /// Two-byte codes (Identity-H), written as a hex string
    HexText(Vec<u8>),
    /// Positioning adjustment (negative = move right, positive = move left)
    Adjustment(f64),
}

/// Builder for PDF content streams.
#[derive(Debug, Default, Clone)]
pub struct ContentStreamBuilder {
    /// Operations in the stream
    operations: Vec<ContentStreamOp>,
}

impl ContentStreamBuilder {
    /// Create a new content stream builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation to the stream.
    pub fn op(&mut self, op: ContentStreamOp) -> &mut Self {
        self.operations.push(op);
        self
    }

    /// Add multiple operations.
    pub fn ops(&mut self, ops: impl IntoIterator<Item = ContentStreamOp>) -> &mut Self {
        self.operations.extend(ops);
        self
    }

    /// Operations recorded so far.
    pub fn operations(&self) -> &[ContentStreamOp] {
        &self.operations
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Save graphics state.
    pub fn save_state(&mut self) -> &mut Self {
        self.op(ContentStreamOp::SaveState)
    }

    /// Restore graphics state.
    pub fn restore_state(&mut self) -> &mut Self {
        self.op(ContentStreamOp::RestoreState)
    }

    /// Concatenate a matrix onto the CTM.
    pub fn transform(&mut self, a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> &mut Self {
        self.op(ContentStreamOp::Transform(a, b, c, d, e, f))
    }

    /// Move to a point.
    pub fn move_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.op(ContentStreamOp::MoveTo(x, y))
    }

    /// Line to a point.
    pub fn line_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.op(ContentStreamOp::LineTo(x, y))
    }

    /// Cubic Bézier curve.
    pub fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) -> &mut Self {
        self.op(ContentStreamOp::CurveTo(x1, y1, x2, y2, x3, y3))
    }

    /// Rectangle path.
    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) -> &mut Self {
        self.op(ContentStreamOp::Rectangle(x, y, width, height))
    }

    /// Close the current subpath.
    pub fn close_path(&mut self) -> &mut Self {
        self.op(ContentStreamOp::ClosePath)
    }

    /// Stroke the path.
    pub fn stroke(&mut self) -> &mut Self {
        self.op(ContentStreamOp::Stroke)
    }

    /// Fill the path.
    pub fn fill(&mut self) -> &mut Self {
        self.op(ContentStreamOp::Fill)
    }

    /// Intersect the clip with a rectangle: `re W n`.
    pub fn clip_rect(&mut self, x: f64, y: f64, width: f64, height: f64) -> &mut Self {
        self.rect(x, y, width, height)
            .op(ContentStreamOp::Clip)
            .op(ContentStreamOp::EndPath)
    }

    /// Build the content stream bytes.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();

        for op in &self.operations {
            write_op(&mut buf, op)?;
            writeln!(buf)?;
        }

        Ok(buf)
    }
}

fn write_op<W: Write>(w: &mut W, op: &ContentStreamOp) -> std::io::Result<()> {
    match op {
        ContentStreamOp::SaveState => write!(w, "q"),
        ContentStreamOp::RestoreState => write!(w, "Q"),
        ContentStreamOp::Transform(a, b, c, d, e, f) => {
            write_numbers(w, &[*a, *b, *c, *d, *e, *f])?;
            write!(w, "cm")
        },
        ContentStreamOp::BeginText => write!(w, "BT"),
        ContentStreamOp::EndText => write!(w, "ET"),
        ContentStreamOp::SetFont(name, size) => {
            write_name(w, name)?;
            write!(w, " {} Tf", format_real(*size))
        },
        ContentStreamOp::MoveText(tx, ty) => {
            write_numbers(w, &[*tx, *ty])?;
            write!(w, "Td")
        },
        ContentStreamOp::SetTextMatrix(a, b, c, d, e, f) => {
            write_numbers(w, &[*a, *b, *c, *d, *e, *f])?;
            write!(w, "Tm")
        },
        ContentStreamOp::ShowTextArray(items) => {
            write!(w, "[")?;
            for item in items {
                match item {
                    TextArrayItem::Text(codes) => write_literal(w, codes)?,
                    TextArrayItem::HexText(codes) => {
                        write!(w, "<")?;
                        for byte in codes {
                            write!(w, "{:02X}", byte)?;
                        }
                        write!(w, ">")?;
                    },
                    TextArrayItem::Adjustment(adj) => write!(w, "{}", format_real(*adj))?,
                }
                write!(w, " ")?;
            }
            write!(w, "] TJ")
        },
        ContentStreamOp::SetFillColorRGB(r, g, b) => {
            write_numbers(w, &[*r, *g, *b])?;
            write!(w, "rg")
        },
        ContentStreamOp::SetStrokeColorRGB(r, g, b) => {
            write_numbers(w, &[*r, *g, *b])?;
            write!(w, "RG")
        },
        ContentStreamOp::SetLineWidth(width) => write!(w, "{} w", format_real(*width)),
        ContentStreamOp::MoveTo(x, y) => {
            write_numbers(w, &[*x, *y])?;
            write!(w, "m")
        },
        ContentStreamOp::LineTo(x, y) => {
            write_numbers(w, &[*x, *y])?;
            write!(w, "l")
        },
        ContentStreamOp::CurveTo(x1, y1, x2, y2, x3, y3) => {
            write_numbers(w, &[*x1, *y1, *x2, *y2, *x3, *y3])?;
            write!(w, "c")
        },
        ContentStreamOp::Rectangle(x, y, width, height) => {
            write_numbers(w, &[*x, *y, *width, *height])?;
            write!(w, "re")
        },
        ContentStreamOp::ClosePath => write!(w, "h"),
        ContentStreamOp::Stroke => write!(w, "S"),
        ContentStreamOp::Fill => write!(w, "f"),
        ContentStreamOp::EndPath => write!(w, "n"),
        ContentStreamOp::Clip => write!(w, "W"),
        ContentStreamOp::PaintXObject(name) => {
            write_name(w, name)?;
            write!(w, " Do")
        },
        ContentStreamOp::SetExtGState(name) => {
            write_name(w, name)?;
            write!(w, " gs")
        },
        ContentStreamOp::SetGlyphMetrics {
            wx,
            llx,
            lly,
            urx,
            ury,
        } => {
            write_numbers(w, &[*wx, 0.0, *llx, *lly, *urx, *ury])?;
            write!(w, "d1")
        },
        ContentStreamOp::InlineImageMask { width, height, hex } => {
            writeln!(w, "BI")?;
            writeln!(w, "/W {} /H {}", width, height)?;
            writeln!(w, "/BPC 1 /F /AHx /D [0 1] /IM true")?;
            writeln!(w, "ID")?;
            w.write_all(hex)?;
            // ">" is the end-of-data marker for ASCIIHex
            write!(w, ">\nEI")
        },
    }
}

fn write_numbers<W: Write>(w: &mut W, values: &[f64]) -> std::io::Result<()> {
    for v in values {
        write!(w, "{} ", format_real(*v))?;
    }
    Ok(())
}

/// Write a literal string: delimiters and backslash are escaped, control and
/// high bytes go out as three-digit octal escapes.
fn write_literal<W: Write>(w: &mut W, codes: &[u8]) -> std::io::Result<()> {
    write!(w, "(")?;
    for &c in codes {
        match c {
            b'(' | b')' | b'\\' => w.write_all(&[b'\\', c])?,
            c if c <= 32 || c >= 128 => write!(w, "\\{:03o}", c)?,
            c => w.write_all(&[c])?,
        }
    }
    write!(w, ")")
}
