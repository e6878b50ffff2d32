//! Coordinate systems.
//!
//! Three spaces are involved:
//! - layout space: integer units handed in by the caller, origin at the top-left
//!   corner of the paper, y growing upward (so content sits at negative y);
//! - device space: one unit per device pixel, origin at the bottom-left corner;
//! - PDF default user space: points, reached from device space by the
//!   `72/dpi` scale each page content stream starts with.

pub mod arc;

use crate::config::RendererConfig;

/// Layout-space integer coordinate.
pub type Si = i64;

/// A 2D affine transform `[a b c d e f]`, applied as
/// `x' = a·x + c·y + e`, `y' = b·x + d·y + f` (PDF `cm` order).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    /// Row 1, column 1
    pub a: f64,
    /// Row 1, column 2
    pub b: f64,
    /// Row 2, column 1
    pub c: f64,
    /// Row 2, column 2
    pub d: f64,
    /// Horizontal translation
    pub e: f64,
    /// Vertical translation
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    /// Create a transform from its six coefficients.
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    /// Pure translation.
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Pure scaling.
    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Counter-clockwise rotation by `radians`.
    pub fn rotation(radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    /// Apply the transform to a point.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// The transform that applies `self` first and then `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    /// The inverse transform, or `None` when the matrix is singular.
    pub fn invert(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Affine {
            a,
            b,
            c,
            d,
            e: -(self.e * a + self.f * c),
            f: -(self.e * b + self.f * d),
        })
    }

    /// Image of the axis-aligned rectangle, as its axis-aligned bounding box.
    pub fn bounding_box(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> (f64, f64, f64, f64) {
        let corners = [
            self.apply(x1, y1),
            self.apply(x2, y1),
            self.apply(x1, y2),
            self.apply(x2, y2),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(lx, ly, ux, uy), &(x, y)| (lx.min(x), ly.min(y), ux.max(x), uy.max(y)),
        )
    }
}

fn floor_div(a: Si, b: Si) -> Si {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn ceil_div(a: Si, b: Si) -> Si {
    -floor_div(-a, b)
}

/// Page dimensions and the layout → device mapping for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Device resolution
    pub dpi: u32,
    /// Layout units per device pixel
    pub pixel: Si,
    /// Horizontal origin offset in layout units
    pub ox: Si,
    /// Vertical origin offset in layout units (the paper height)
    pub oy: Si,
    /// Paper width in layout units
    pub width_si: Si,
    /// Page width in points
    pub width_pt: f64,
    /// Page height in points
    pub height_pt: f64,
}

impl PageGeometry {
    /// Derive the geometry from a session configuration.
    pub fn from_config(config: &RendererConfig) -> Self {
        let (paper_w, paper_h) = config.oriented_paper_cm();
        let dpi = config.dpi.max(1);
        let pixel = config.pixel.max(1);
        let units_per_cm = dpi as f64 * pixel as f64 / 2.54;
        Self {
            dpi,
            pixel,
            ox: 0,
            oy: (paper_h * units_per_cm) as Si,
            width_si: (paper_w * units_per_cm) as Si,
            width_pt: 72.0 * paper_w / 2.54,
            height_pt: 72.0 * paper_h / 2.54,
        }
    }

    /// Device pixels → points.
    pub fn scale(&self) -> f64 {
        72.0 / self.dpi as f64
    }

    /// Layout x → device x (floor).
    pub fn to_x(&self, x: Si) -> Si {
        floor_div(x + self.ox, self.pixel)
    }

    /// Layout y → device y (floor).
    pub fn to_y(&self, y: Si) -> Si {
        floor_div(y + self.oy, self.pixel)
    }

    /// Device rectangle covering the layout rectangle, rounded outward to
    /// whole pixels. Corners may be given in any order.
    pub fn outer_rect(&self, x1: Si, y1: Si, x2: Si, y2: Si) -> (f64, f64, f64, f64) {
        let lx = floor_div(x1.min(x2) + self.ox, self.pixel);
        let ly = floor_div(y1.min(y2) + self.oy, self.pixel);
        let ux = ceil_div(x1.max(x2) + self.ox, self.pixel);
        let uy = ceil_div(y1.max(y2) + self.oy, self.pixel);
        (lx as f64, ly as f64, (ux - lx) as f64, (uy - ly) as f64)
    }

    /// The whole-paper clip rectangle in layout units.
    pub fn page_clip(&self) -> (Si, Si, Si, Si) {
        (0, -self.oy, self.width_si, 0)
    }

    /// Conjugate a layout-space frame into device space, ready for `cm`.
    pub fn device_frame(&self, frame: &Affine) -> Affine {
        let pixel = self.pixel as f64;
        // device → layout
        let cv = Affine::new(pixel, 0.0, 0.0, pixel, -(self.ox as f64), -(self.oy as f64));
        let cv_inv = Affine::new(
            1.0 / pixel,
            0.0,
            0.0,
            1.0 / pixel,
            self.ox as f64 / pixel,
            self.oy as f64 / pixel,
        );
        cv.then(frame).then(&cv_inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_floor_division() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(-8, 2), -4);
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(-7, 2), -3);
    }

    #[test]
    fn test_affine_then_and_invert() {
        let t = Affine::translation(3.0, 4.0).then(&Affine::scaling(2.0, 2.0));
        assert_eq!(t.apply(1.0, 1.0), (8.0, 10.0));
        let inv = t.invert().unwrap();
        let (x, y) = inv.apply(8.0, 10.0);
        assert!(close(x, 1.0) && close(y, 1.0));
        assert!(Affine::scaling(0.0, 1.0).invert().is_none());
    }

    #[test]
    fn test_rotation() {
        let (x, y) = Affine::rotation(std::f64::consts::FRAC_PI_2).apply(1.0, 0.0);
        assert!(close(x, 0.0) && close(y, 1.0));
    }

    #[test]
    fn test_page_geometry_a4() {
        let g = PageGeometry::from_config(&RendererConfig::new());
        assert!((g.width_pt - 595.27559).abs() < 1e-3);
        assert!((g.height_pt - 841.88976).abs() < 1e-3);
        // top-left of the paper is device (0, height)
        assert_eq!(g.to_x(0), 0);
        assert_eq!(g.to_y(0), g.oy / g.pixel);
        // bottom of the paper is device y = 0
        assert_eq!(g.to_y(-g.oy), 0);
        assert!(close(g.scale(), 0.12));
    }

    #[test]
    fn test_to_x_floors_negative() {
        let g = PageGeometry::from_config(&RendererConfig::new());
        assert_eq!(g.to_x(-1), -1);
        assert_eq!(g.to_x(255), 0);
        assert_eq!(g.to_x(256), 1);
    }

    #[test]
    fn test_outer_rect_rounds_outward() {
        let g = PageGeometry::from_config(&RendererConfig::new().with_paper(10.0, 10.0));
        let oy = g.oy;
        let (x, y, w, h) = g.outer_rect(300, -oy + 300, 10, -oy + 600);
        assert_eq!((x, y), (0.0, 1.0));
        assert_eq!((w, h), (2.0, 2.0));
    }

    #[test]
    fn test_device_frame_identity() {
        let g = PageGeometry::from_config(&RendererConfig::new());
        let d = g.device_frame(&Affine::identity());
        assert!(close(d.a, 1.0) && close(d.d, 1.0));
        assert!(close(d.e, 0.0) && close(d.f, 0.0));
    }

    #[test]
    fn test_device_frame_translation() {
        let g = PageGeometry::from_config(&RendererConfig::new());
        let d = g.device_frame(&Affine::translation(512.0, -256.0));
        assert!(close(d.e, 2.0));
        assert!(close(d.f, -1.0));
    }
}
