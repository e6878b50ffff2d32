//! Elliptical arcs as cubic Bézier paths.
//!
//! PDF paths only know straight lines and cubic curves, so an arc is cut into
//! pieces of at most a quarter turn. Each piece is the standard unit-circle
//! cubic symmetric about the x axis, rotated onto its place on the circle and
//! then stretched onto the ellipse.

use super::Affine;

/// Angles are integers in hundredths of a degree.
pub const FULL_CIRCLE: i32 = 36_000;

/// Largest span covered by one cubic segment.
pub const QUARTER_TURN: i32 = 9_000;

/// One element of a device-space path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    /// Start a new subpath
    MoveTo(f64, f64),
    /// Straight segment
    LineTo(f64, f64),
    /// Cubic curve: two control points, then the end point
    CurveTo(f64, f64, f64, f64, f64, f64),
    /// Close the subpath
    Close,
}

fn to_radians(angle: i32) -> f64 {
    (angle as f64 / 100.0).to_radians()
}

/// Control points of the unit-circle cubic spanning `span` radians,
/// centred on the positive x axis: `(start, c1, c2, end)`.
fn unit_segment(span: f64) -> [(f64, f64); 4] {
    let bx0 = (span / 2.0).cos();
    let by0 = (span / 2.0).sin();
    let bx1 = (4.0 - bx0) / 3.0;
    let by1 = (1.0 - bx0) * (3.0 - bx0) / (3.0 * by0);
    [(bx0, -by0), (bx1, -by1), (bx1, by1), (bx0, by0)]
}

/// Build the path of an elliptical arc inscribed in the device-space box
/// `(x1, y1)`–`(x2, y2)`, starting at angle `alpha` and sweeping `delta`
/// counter-clockwise.
///
/// A sweep of a full circle or more yields a closed ellipse starting at the
/// `alpha` point. A partial sweep starts at the centre, runs out to the arc
/// and is closed back to the centre (a pie slice). Negative sweeps are drawn
/// as the equivalent positive sweep from `alpha + delta`.
pub fn bezier_arc(x1: f64, y1: f64, x2: f64, y2: f64, alpha: i32, delta: i32) -> Vec<PathSegment> {
    // a sweep beyond one turn is the full ellipse
    let alpha = alpha.rem_euclid(FULL_CIRCLE);
    let delta = delta.clamp(-FULL_CIRCLE, FULL_CIRCLE);
    let (alpha, delta) = if delta < 0 {
        (alpha + delta, -delta)
    } else {
        (alpha, delta)
    };
    let full = delta == FULL_CIRCLE;
    let mut remaining = delta;

    let cx = (x1 + x2) / 2.0;
    let cy = (y1 + y2) / 2.0;
    let rx = (x2 - x1) / 2.0;
    let ry = (y2 - y1) / 2.0;
    let ellipse = Affine::new(rx, 0.0, 0.0, ry, cx, cy);
    let at = |angle: f64, (u, v): (f64, f64)| -> (f64, f64) {
        Affine::rotation(angle).then(&ellipse).apply(u, v)
    };

    let mut path = Vec::with_capacity(3 + (remaining / QUARTER_TURN) as usize);
    let start = at(to_radians(alpha), (1.0, 0.0));
    if full {
        path.push(PathSegment::MoveTo(start.0, start.1));
    } else {
        path.push(PathSegment::MoveTo(cx, cy));
        path.push(PathSegment::LineTo(start.0, start.1));
    }

    let mut covered = 0;
    while remaining > 0 {
        let phi = remaining.min(QUARTER_TURN);
        remaining -= phi;
        // rotate the symmetric piece so it starts where the previous one ended;
        // accumulate in the integer unit so pieces never drift apart
        let mid = to_radians(alpha + covered) + to_radians(phi) / 2.0;
        let [_, c1, c2, end] = unit_segment(to_radians(phi));
        let (c1x, c1y) = at(mid, c1);
        let (c2x, c2y) = at(mid, c2);
        let (ex, ey) = at(mid, end);
        path.push(PathSegment::CurveTo(c1x, c1y, c2x, c2y, ex, ey));
        covered += phi;
    }

    path.push(PathSegment::Close);
    path
}
