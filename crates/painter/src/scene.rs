//! What a renderer gets to see.

use kurbo::{Line, Point, Rect};

/// A line drawn by the turtle. Strokes without a color use whatever the foreground is when
/// they are drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub line: Line,
    pub color: Option<String>,
}

impl Stroke {
    pub fn new(from: Point, to: Point, color: Option<String>) -> Stroke {
        Stroke {
            line: Line::new(from, to),
            color,
        }
    }
}

/// A stroke with its color resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub line: Line,
    pub color: String,
}

/// An owned snapshot of everything drawn so far, in drawing order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawableFrame {
    pub segments: Vec<Segment>,
}

impl DrawableFrame {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The smallest rectangle containing every segment, or `None` if nothing was drawn.
    pub fn bounding_box(&self) -> Option<Rect> {
        self.segments
            .iter()
            .map(|s| Rect::from_points(s.line.p0, s.line.p1))
            .reduce(|a, b| a.union(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box() {
        let seg = |x0, y0, x1, y1| Segment {
            line: Line::new((x0, y0), (x1, y1)),
            color: "black".to_owned(),
        };
        assert_eq!(DrawableFrame::default().bounding_box(), None);
        let frame = DrawableFrame {
            segments: vec![seg(0.0, 0.0, 0.0, 10.0), seg(-5.0, 2.0, 3.0, -1.0)],
        };
        assert_eq!(frame.bounding_box(), Some(Rect::new(-5.0, -1.0, 3.0, 10.0)));
    }
}
