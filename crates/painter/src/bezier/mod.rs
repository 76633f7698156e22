//! Curves for the `bezier` builtin.
//!
//! A curve is built in the turtle's own frame (starting at the origin, facing up) and then
//! moved to wherever the turtle is when the curve starts drawing. Drawing follows a lookup table
//! of samples, which can be filled in on a background thread (see [`worker`]).

use kurbo::{Affine, CubicBez, ParamCurve, ParamCurveDeriv, Point, QuadBez, Vec2};

use crate::{
    geom::{deg2rad, rad2deg, rotate},
    state::KeyFrame,
};

pub mod worker;

pub use worker::CurveWorker;

const APPROX_STEPS: usize = 16;

/// A position along a curve, with the direction of travel in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub position: Point,
    pub facing: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Curve {
    Quad(QuadBez),
    Cubic(CubicBez),
}

impl Curve {
    /// A curve drawn turtle-style: go `d1`, turn `a1` degrees and go `d2`, and optionally turn
    /// `a2` more and go `d3`. The segments become the control polygon.
    pub fn from_turtle(d1: f64, a1: f64, d2: f64, third: Option<(f64, f64)>) -> Curve {
        let p0 = Point::ORIGIN;
        let p1 = p0 + Vec2::new(0.0, d1);
        let p2 = p1 + rotate(Vec2::new(0.0, d2), deg2rad(a1));
        match third {
            Some((a2, d3)) => {
                let p3 = p2 + rotate(Vec2::new(0.0, d3), deg2rad(a1 + a2));
                Curve::Cubic(CubicBez::new(p0, p1, p2, p3))
            }
            None => Curve::Quad(QuadBez::new(p0, p1, p2)),
        }
    }

    /// Moves a curve from the turtle's frame to the page.
    pub fn positioned(&self, key: &KeyFrame) -> Curve {
        let xf = Affine::translate(key.position.to_vec2()) * Affine::rotate(key.facing_radians());
        match *self {
            Curve::Quad(q) => Curve::Quad(xf * q),
            Curve::Cubic(c) => Curve::Cubic(xf * c),
        }
    }

    pub fn start(&self) -> Point {
        match self {
            Curve::Quad(q) => q.p0,
            Curve::Cubic(c) => c.p0,
        }
    }

    pub fn sample(&self, t: f64) -> Sample {
        let (position, tangent) = match self {
            Curve::Quad(q) => (q.eval(t), q.deriv().eval(t)),
            Curve::Cubic(c) => (c.eval(t), c.deriv().eval(t)),
        };
        Sample {
            position,
            facing: rad2deg(tangent.y.atan2(tangent.x)) - 90.0,
        }
    }

    /// The length of the curve, measured along a coarse polyline.
    pub fn approx_length(&self) -> f64 {
        let mut prev = self.start();
        let mut length = 0.0;
        for i in 0..=APPROX_STEPS {
            let p = self.sample(i as f64 / APPROX_STEPS as f64).position;
            length += p.distance(prev);
            prev = p;
        }
        length
    }

    /// Evenly spaced samples along the curve, about one per unit of length but never more than
    /// `max_samples` (or fewer than two).
    pub fn lookup_table(&self, max_samples: usize) -> Vec<Sample> {
        let n = sample_count(self.approx_length(), max_samples);
        (0..n)
            .map(|i| self.sample(i as f64 / (n - 1) as f64))
            .collect()
    }
}

fn sample_count(length: f64, max_samples: usize) -> usize {
    let max = max_samples.max(2);
    if length.is_nan() {
        2
    } else if length >= max as f64 {
        max
    } else {
        (length as usize).clamp(2, max)
    }
}

/// The samples the turtle has passed through by time `t`: a prefix of the lookup table, or just
/// the point at `t` when there is no table yet. The whole table is passed by `t = 1`.
pub fn lookup(curve: &Curve, lut: Option<&[Sample]>, t: f64) -> Vec<Sample> {
    match lut {
        Some(lut) if !lut.is_empty() => {
            let last = lut.len() - 1;
            let i = if t >= 1.0 {
                last
            } else {
                ((last as f64 * t.max(0.0)) as usize).min(last)
            };
            lut[..=i].to_vec()
        }
        _ => vec![curve.sample(t)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        a.distance(b) < 1e-9
    }

    #[test]
    fn straight_curve() {
        let c = Curve::from_turtle(10.0, 0.0, 10.0, None);
        assert!((c.approx_length() - 20.0).abs() < 1e-9);
        let s = c.sample(0.5);
        assert!(close(s.position, Point::new(0.0, 10.0)));
        assert!(s.facing.abs() < 1e-9);
    }

    #[test]
    fn control_polygon_turns_left() {
        let Curve::Cubic(c) = Curve::from_turtle(10.0, 90.0, 10.0, Some((90.0, 10.0))) else {
            panic!("expected a cubic");
        };
        assert!(close(c.p1, Point::new(0.0, 10.0)));
        assert!(close(c.p2, Point::new(-10.0, 10.0)));
        assert!(close(c.p3, Point::new(-10.0, 0.0)));
        let end = Curve::Cubic(c).sample(1.0);
        assert!((end.facing - 180.0).abs() < 1e-9 || (end.facing + 180.0).abs() < 1e-9);
    }

    #[test]
    fn positioning_follows_the_key_frame() {
        let key = KeyFrame {
            position: Point::new(5.0, 5.0),
            facing: -90.0,
            height: 0.0,
            opacity: 1.0,
        };
        let c = Curve::from_turtle(10.0, 0.0, 10.0, None).positioned(&key);
        assert!(close(c.start(), Point::new(5.0, 5.0)));
        let end = c.sample(1.0);
        assert!(close(end.position, Point::new(25.0, 5.0)));
        assert!((end.facing + 90.0).abs() < 1e-9);
    }

    #[test]
    fn lookups() {
        let c = Curve::from_turtle(10.0, 45.0, 10.0, None);
        let lut = c.lookup_table(1000);
        assert_eq!(lut.len(), c.approx_length() as usize);
        assert_eq!(lookup(&c, Some(&lut), 0.0).len(), 1);
        assert_eq!(lookup(&c, Some(&lut), 0.5).len(), (lut.len() - 1) / 2 + 1);
        assert_eq!(lookup(&c, Some(&lut), 1.0), lut);
        assert_eq!(lookup(&c, None, 0.25), vec![c.sample(0.25)]);
    }

    #[test]
    fn tiny_curves_still_reach_the_end() {
        let c = Curve::from_turtle(0.1, 0.0, 0.1, None);
        assert!(c.approx_length() < 1.0);
        let lut = c.lookup_table(1000);
        assert_eq!(lut.len(), 2);
        let passed = lookup(&c, Some(&lut), 1.0);
        assert_eq!(passed.len(), 2);
        assert!(close(passed[1].position, Point::new(0.0, 0.2)));
    }

    #[test]
    fn huge_curves_are_capped() {
        let c = Curve::from_turtle(1e20, 0.0, 1e20, None);
        assert!(c.approx_length() > 1e20);
        let lut = c.lookup_table(500);
        assert_eq!(lut.len(), 500);
        assert_eq!(lookup(&c, Some(&lut), 1.0).len(), 500);
        assert_eq!(lookup(&c, Some(&lut), 0.5).len(), 250);

        assert_eq!(sample_count(f64::NAN, 500), 2);
        assert_eq!(sample_count(10.0, 0), 2);
    }
}
