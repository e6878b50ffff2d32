//! The drawing side: pens and tracked state, glyph batching, and the
//! document session that turns primitives into pages.

pub mod graphics;
pub mod session;
pub mod text;

pub use graphics::{Brush, GraphicsState, Pencil, Rgb1000, Rgba, ScopeKind, StateStack};
pub use session::DocumentSession;
pub use text::{batch_runs, GlyphRun, PendingGlyph, GAP_THRESHOLD_PIXELS};
