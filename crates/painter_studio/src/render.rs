use kurbo::Rect;
use painter::DrawableFrame;
use svg::node::element::{path::Data, Path, Rectangle};
use svg::Document;

const MARGIN: f64 = 10.0;

fn line(color: &str) -> Path {
    Path::new()
        .set("fill", "none")
        .set("stroke", color)
        .set("stroke-width", 1.0)
        .set("stroke-linecap", "round")
}

/// Draws a frame as SVG. Script coordinates have y pointing up, so everything is flipped.
pub fn document(frame: &DrawableFrame, background: Option<&str>) -> Document {
    let bounds = frame
        .bounding_box()
        .unwrap_or(Rect::new(-100.0, -100.0, 100.0, 100.0))
        .inflate(MARGIN, MARGIN);
    let view = (bounds.x0, -bounds.y1, bounds.width(), bounds.height());
    let mut document = Document::new().set("viewBox", view);

    if let Some(color) = background {
        let rect = Rectangle::new()
            .set("x", view.0)
            .set("y", view.1)
            .set("width", view.2)
            .set("height", view.3)
            .set("fill", color);
        document = document.add(rect);
    }

    // Consecutive segments of the same color share a path.
    let mut segments = frame.segments.iter().peekable();
    while let Some(first) = segments.next() {
        let mut data = Data::new();
        let mut pen = None;
        let mut segment = Some(first);
        while let Some(s) = segment {
            let (from, to) = ((s.line.p0.x, -s.line.p0.y), (s.line.p1.x, -s.line.p1.y));
            if pen != Some(from) {
                data = data.move_to(from);
            }
            data = data.line_to(to);
            pen = Some(to);
            segment = segments.next_if(|next| next.color == first.color);
        }
        document = document.add(line(&first.color).set("d", data));
    }
    document
}

#[cfg(test)]
mod tests {
    use kurbo::{Line, Point};
    use painter::Segment;

    use super::*;

    fn segment(from: (f64, f64), to: (f64, f64), color: &str) -> Segment {
        Segment {
            line: Line::new(Point::from(from), Point::from(to)),
            color: color.to_owned(),
        }
    }

    #[test]
    fn paths_are_grouped_by_color() {
        let frame = DrawableFrame {
            segments: vec![
                segment((0.0, 0.0), (0.0, 10.0), "black"),
                segment((0.0, 10.0), (10.0, 10.0), "black"),
                segment((10.0, 10.0), (10.0, 0.0), "red"),
            ],
        };
        let svg = document(&frame, Some("white")).to_string();
        assert_eq!(svg.matches("<path").count(), 2);
        assert_eq!(svg.matches("<rect").count(), 1);
        assert!(svg.contains(r#"viewBox="-10 -20 30 30""#));
        assert!(svg.contains(r#"stroke="red""#));
    }

    #[test]
    fn empty_frames_still_render() {
        let svg = document(&DrawableFrame::default(), None).to_string();
        assert!(svg.contains("<svg"));
        assert!(!svg.contains("<path"));
    }
}
