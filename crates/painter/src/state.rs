use kurbo::{Point, Vec2};

use crate::{
    geom::deg2rad,
    scene::{DrawableFrame, Segment, Stroke},
};

/// A partial update to the [`AppState`]. Fields left as `None` are unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatePatch {
    pub position: Option<Point>,
    /// In degrees.
    pub facing: Option<f64>,
    pub height: Option<f64>,
    pub opacity: Option<f64>,
    /// An empty string clears the pen color.
    pub color: Option<String>,
    /// The strokes drawn so far by the mutation in progress. They replace the previous
    /// in-flight strokes and become permanent once the mutation completes.
    pub current_strokes: Option<Vec<Stroke>>,
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub scale: Option<f64>,
    pub offset: Option<Vec2>,
    pub speed: Option<f64>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        *self == StatePatch::default()
    }
}

/// The part of the state that a mutation measures itself against. It's captured when the
/// mutation first runs, so that every ratio is computed from the same starting point.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyFrame {
    pub position: Point,
    pub facing: f64,
    pub height: f64,
    pub opacity: f64,
}

impl KeyFrame {
    pub fn facing_radians(&self) -> f64 {
        deg2rad(self.facing)
    }
}

/// The turtle, its pen, and everything drawn so far.
#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub position: Point,
    /// In degrees, counter-clockwise from the positive y axis.
    pub facing: f64,
    /// 0 is touching the paper, 1 is fully raised.
    pub height: f64,
    pub opacity: f64,
    pub color: Option<String>,
    strokes: Vec<Stroke>,
    current: Vec<Stroke>,
    pub foreground: String,
    pub background: Option<String>,
    pub scale: f64,
    pub offset: Vec2,
    /// Playback speed, in percent.
    pub speed: f64,
}

impl Default for AppState {
    fn default() -> Self {
        AppState {
            position: Point::ORIGIN,
            facing: 0.0,
            height: 0.0,
            opacity: 1.0,
            color: None,
            strokes: Vec::new(),
            current: Vec::new(),
            foreground: "black".to_owned(),
            background: None,
            scale: 1.0,
            offset: Vec2::ZERO,
            speed: 100.0,
        }
    }
}

impl AppState {
    pub fn new() -> AppState {
        AppState::default()
    }

    pub fn reset(&mut self) {
        *self = AppState::default();
    }

    pub fn facing_radians(&self) -> f64 {
        deg2rad(self.facing)
    }

    pub fn key_frame(&self) -> KeyFrame {
        KeyFrame {
            position: self.position,
            facing: self.facing,
            height: self.height,
            opacity: self.opacity,
        }
    }

    /// Committed strokes, oldest first.
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Strokes drawn by the mutation in progress.
    pub fn current_strokes(&self) -> &[Stroke] {
        &self.current
    }

    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(p) = patch.position {
            self.position = p;
        }
        if let Some(f) = patch.facing {
            self.facing = f;
        }
        if let Some(h) = patch.height {
            self.height = h;
        }
        if let Some(o) = patch.opacity {
            self.opacity = o;
        }
        if let Some(c) = patch.color {
            self.color = Some(c).filter(|c| !c.is_empty());
        }
        if let Some(strokes) = patch.current_strokes {
            self.current = strokes;
        }
        if let Some(fg) = patch.foreground {
            self.foreground = if fg.is_empty() { "black".to_owned() } else { fg };
        }
        if let Some(bg) = patch.background {
            self.background = match bg.as_str() {
                "" | "none" | "transparent" => None,
                _ => Some(bg),
            };
        }
        if let Some(s) = patch.scale {
            self.scale = s;
        }
        if let Some(o) = patch.offset {
            self.offset = o;
        }
        if let Some(s) = patch.speed {
            self.speed = s;
        }
    }

    /// Makes the in-flight strokes permanent. Called once the mutation that drew them is done.
    pub fn commit(&mut self) {
        self.strokes.append(&mut self.current);
    }

    pub fn drawable_frame(&self) -> DrawableFrame {
        let segments = self
            .strokes
            .iter()
            .chain(&self.current)
            .map(|s| Segment {
                line: s.line,
                color: s.color.clone().unwrap_or_else(|| self.foreground.clone()),
            })
            .collect();
        DrawableFrame { segments }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_normalisation() {
        let mut state = AppState::new();
        state.apply(StatePatch {
            color: Some("red".to_owned()),
            background: Some("transparent".to_owned()),
            foreground: Some(String::new()),
            ..StatePatch::default()
        });
        assert_eq!(state.color.as_deref(), Some("red"));
        assert_eq!(state.background, None);
        assert_eq!(state.foreground, "black");

        state.apply(StatePatch {
            color: Some(String::new()),
            background: Some("navy".to_owned()),
            ..StatePatch::default()
        });
        assert_eq!(state.color, None);
        assert_eq!(state.background.as_deref(), Some("navy"));
    }

    #[test]
    fn in_flight_strokes_are_replaced_then_committed() {
        let mut state = AppState::new();
        let stroke = |y| Stroke::new(Point::ORIGIN, Point::new(0.0, y), None);
        state.apply(StatePatch {
            current_strokes: Some(vec![stroke(1.0)]),
            ..StatePatch::default()
        });
        state.apply(StatePatch {
            current_strokes: Some(vec![stroke(2.0)]),
            ..StatePatch::default()
        });
        assert!(state.strokes().is_empty());
        assert_eq!(state.current_strokes().len(), 1);

        state.commit();
        assert_eq!(state.strokes(), &[stroke(2.0)]);
        assert!(state.current_strokes().is_empty());
    }

    #[test]
    fn frames_are_snapshots() {
        let mut state = AppState::new();
        state.apply(StatePatch {
            current_strokes: Some(vec![Stroke::new(
                Point::ORIGIN,
                Point::new(0.0, 5.0),
                Some("red".to_owned()),
            )]),
            ..StatePatch::default()
        });
        state.commit();
        state.apply(StatePatch {
            current_strokes: Some(vec![Stroke::new(Point::new(0.0, 5.0), Point::new(1.0, 5.0), None)]),
            foreground: Some("white".to_owned()),
            ..StatePatch::default()
        });

        let frame = state.drawable_frame();
        state.reset();
        assert_eq!(frame.segments.len(), 2);
        assert_eq!(frame.segments[0].color, "red");
        assert_eq!(frame.segments[1].color, "white");
        assert!(state.drawable_frame().is_empty());
    }
}
