//! The interfaces through which a run talks to whatever is hosting it.

use painter_script::Span;

/// Where `print`, `println` and error reports go.
pub trait Output {
    fn info(&mut self, text: &str);
    fn error(&mut self, text: &str);
    fn clear(&mut self);
}

/// Highlights ranges of the source, like an editor would.
pub trait Marker {
    fn mark_instruction(&mut self, span: Span);
    fn mark_error(&mut self, span: Span);
    fn clear_marks(&mut self);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Info(String),
    Error(String),
}

/// An [`Output`] that remembers what it was given.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    pub lines: Vec<Line>,
}

impl Transcript {
    pub fn infos(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            Line::Info(s) => Some(s.as_str()),
            Line::Error(_) => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            Line::Error(s) => Some(s.as_str()),
            Line::Info(_) => None,
        })
    }
}

impl Output for Transcript {
    fn info(&mut self, text: &str) {
        self.lines.push(Line::Info(text.to_owned()));
    }

    fn error(&mut self, text: &str) {
        self.lines.push(Line::Error(text.to_owned()));
    }

    fn clear(&mut self) {
        self.lines.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mark {
    Instruction(Span),
    Error(Span),
}

/// A [`Marker`] that remembers the marks currently set.
#[derive(Clone, Debug, Default)]
pub struct Marks {
    pub marks: Vec<Mark>,
}

impl Marker for Marks {
    fn mark_instruction(&mut self, span: Span) {
        self.marks.push(Mark::Instruction(span));
    }

    fn mark_error(&mut self, span: Span) {
        self.marks.push(Mark::Error(span));
    }

    fn clear_marks(&mut self) {
        self.marks.clear();
    }
}
