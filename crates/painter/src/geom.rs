//! Turtle geometry. Angles are in degrees unless a name says otherwise; a facing of zero
//! points up the y axis and positive angles turn left.

use kurbo::Vec2;

pub fn deg2rad(degrees: f64) -> f64 {
    degrees.to_radians()
}

pub fn rad2deg(radians: f64) -> f64 {
    radians.to_degrees()
}

/// Rotates `v` counter-clockwise by `th` radians.
pub fn rotate(v: Vec2, th: f64) -> Vec2 {
    let (sin, cos) = th.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// The vector of length `len` pointing along the facing `angle` (in radians).
pub fn polar(angle: f64, len: f64) -> Vec2 {
    rotate(Vec2::new(0.0, len), angle)
}
