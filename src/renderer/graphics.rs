//! Pens, brushes and the tracked PDF graphics state.
//!
//! The session only emits a color, alpha, line width or font operator when
//! the value actually changes. To make that safe across `q`/`Q`, the tracked
//! state is saved and restored together with every scope the session opens.

use crate::error::{Error, Result};
use crate::geometry::Si;
use crate::writer::graphics_state::OPAQUE;

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha, 255 is opaque
    pub a: u8,
}

impl Rgba {
    /// Opaque black.
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);

    /// Opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Color with alpha.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Color channels in per-mille.
    pub fn quantized(&self) -> Rgb1000 {
        Rgb1000 {
            r: quantize(self.r),
            g: quantize(self.g),
            b: quantize(self.b),
        }
    }

    /// Alpha in per-mille.
    pub fn alpha(&self) -> u16 {
        quantize(self.a)
    }
}

/// Rescale an 8-bit channel to 0..=1000, rounding down.
pub fn quantize(v: u8) -> u16 {
    (v as u32 * 1000 / 255) as u16
}

/// A color with channels in per-mille, as compared and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb1000 {
    /// Red
    pub r: u16,
    /// Green
    pub g: u16,
    /// Blue
    pub b: u16,
}

impl Rgb1000 {
    /// Channels as fractions for `rg` / `RG`.
    pub fn components(&self) -> (f64, f64, f64) {
        (
            self.r as f64 / 1000.0,
            self.g as f64 / 1000.0,
            self.b as f64 / 1000.0,
        )
    }
}

/// Stroke and text color plus line width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pencil {
    /// Color of lines, outlines and glyphs
    pub color: Rgba,
    /// Line width in layout units
    pub width: Si,
}

impl Pencil {
    /// Create a pencil.
    pub fn new(color: Rgba, width: Si) -> Self {
        Self { color, width }
    }
}

impl Default for Pencil {
    fn default() -> Self {
        Self::new(Rgba::BLACK, 0)
    }
}

/// Background color used by `clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Brush {
    /// Fill color
    pub color: Rgba,
}

impl Brush {
    /// Create a brush.
    pub fn new(color: Rgba) -> Self {
        Self { color }
    }
}

impl Default for Brush {
    fn default() -> Self {
        Self::new(Rgba::WHITE)
    }
}

/// What the content stream has most recently set. `None` means not yet set
/// in this page.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    /// Non-stroking color
    pub fill: Option<Rgb1000>,
    /// Stroking color
    pub stroke: Option<Rgb1000>,
    /// Constant alpha in per-mille
    pub alpha: u16,
    /// Line width in device pixels
    pub line_width: Option<f64>,
    /// Font resource name and size
    pub font: Option<(String, f64)>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill: None,
            stroke: None,
            alpha: OPAQUE,
            line_width: None,
            font: None,
        }
    }
}

impl GraphicsState {
    /// Record a fill color; true if it differs from the current one.
    pub fn update_fill(&mut self, color: Rgb1000) -> bool {
        replace_if_changed(&mut self.fill, color)
    }

    /// Record a stroke color; true if it differs from the current one.
    pub fn update_stroke(&mut self, color: Rgb1000) -> bool {
        replace_if_changed(&mut self.stroke, color)
    }

    /// Record a line width; true if it differs from the current one.
    pub fn update_line_width(&mut self, width: f64) -> bool {
        replace_if_changed(&mut self.line_width, width)
    }

    /// Record an alpha; true if it differs from the current one.
    pub fn update_alpha(&mut self, alpha: u16) -> bool {
        if self.alpha == alpha {
            return false;
        }
        self.alpha = alpha;
        true
    }

    /// Record a font selection; true if it differs from the current one.
    pub fn update_font(&mut self, name: &str, size: f64) -> bool {
        if matches!(&self.font, Some((n, s)) if n == name && *s == size) {
            return false;
        }
        self.font = Some((name.to_string(), size));
        true
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

/// Kind of a scope opened with `q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The outer save and page clip every page starts with
    Page,
    /// `push_transform`
    Transform,
    /// `push_clip`
    Clip,
    /// A local save around a single mark
    Local,
}

/// The tracked state plus the saved states of the open scopes.
#[derive(Debug, Clone, Default)]
pub struct StateStack {
    current: GraphicsState,
    saved: Vec<(ScopeKind, GraphicsState)>,
}

impl StateStack {
    /// Fresh state with no scope open.
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracked state.
    pub fn current(&self) -> &GraphicsState {
        &self.current
    }

    /// The tracked state, for updates.
    pub fn current_mut(&mut self) -> &mut GraphicsState {
        &mut self.current
    }

    /// Save the state for a scope (`q`).
    pub fn push(&mut self, kind: ScopeKind) {
        self.saved.push((kind, self.current.clone()));
    }

    /// Restore the state of the innermost scope (`Q`), which must be of `kind`.
    pub fn pop(&mut self, kind: ScopeKind) -> Result<()> {
        match self.saved.last() {
            Some((top, _)) if *top == kind => {
                if let Some((_, state)) = self.saved.pop() {
                    self.current = state;
                }
                Ok(())
            },
            Some((top, _)) => Err(Error::ContractViolation(format!(
                "cannot close a {:?} scope while a {:?} scope is innermost",
                kind, top
            ))),
            None => Err(Error::ContractViolation(format!(
                "no open scope to close for {:?}",
                kind
            ))),
        }
    }

    /// Kind of the innermost scope.
    pub fn innermost(&self) -> Option<ScopeKind> {
        self.saved.last().map(|(kind, _)| *kind)
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Number of open scopes of `kind`.
    pub fn count(&self, kind: ScopeKind) -> usize {
        self.saved.iter().filter(|(k, _)| *k == kind).count()
    }

    /// Forget everything; used when a new page starts.
    pub fn reset(&mut self) {
        self.current = GraphicsState::default();
        self.saved.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(0), 0);
        assert_eq!(quantize(255), 1000);
        assert_eq!(quantize(128), 501);
        assert_eq!(quantize(1), 3);
    }

    #[test]
    fn test_nearby_colors_quantize_differently() {
        let a = Rgba::rgb(128, 0, 0).quantized();
        let b = Rgba::rgb(129, 0, 0).quantized();
        assert_ne!(a, b);
        assert_eq!(a.components().0, 0.501);
    }

    #[test]
    fn test_redundant_updates_suppressed() {
        let mut state = GraphicsState::default();
        let red = Rgba::rgb(255, 0, 0).quantized();
        assert!(state.update_fill(red));
        assert!(!state.update_fill(red));
        assert!(!state.update_alpha(OPAQUE));
        assert!(state.update_alpha(500));
        assert!(state.update_font("F1", 100.0));
        assert!(!state.update_font("F1", 100.0));
        assert!(state.update_font("F1", 12.0));
    }

    #[test]
    fn test_pop_restores_state() {
        let mut stack = StateStack::new();
        stack.push(ScopeKind::Page);
        stack.current_mut().update_line_width(2.0);
        stack.push(ScopeKind::Clip);
        stack.current_mut().update_line_width(5.0);
        stack.pop(ScopeKind::Clip).unwrap();
        assert_eq!(stack.current().line_width, Some(2.0));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_mismatched_pop_is_rejected() {
        let mut stack = StateStack::new();
        stack.push(ScopeKind::Transform);
        assert!(matches!(stack.pop(ScopeKind::Clip), Err(Error::ContractViolation(_))));
        assert_eq!(stack.depth(), 1);
        stack.pop(ScopeKind::Transform).unwrap();
        assert!(stack.pop(ScopeKind::Transform).is_err());
    }
}
