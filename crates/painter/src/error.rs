use painter_script::{PauseState, Span};

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseFault),
    #[error(transparent)]
    Runtime(#[from] RuntimeFault),
}

impl Error {
    /// The part of the source the error is about.
    pub fn span(&self) -> Span {
        match self {
            Error::Parse(e) => e.span,
            Error::Runtime(e) => e.span,
        }
    }
}

/// The script didn't parse.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} '{token}' ({line}:{column})")]
pub struct ParseFault {
    pub message: String,
    /// The text at the error position.
    pub token: String,
    pub line: u32,
    pub column: usize,
    pub span: Span,
}

impl ParseFault {
    pub fn new(err: painter_script::ParseError, source: &str) -> ParseFault {
        let offset = err.offset.min(source.len());
        let rest = source.get(offset..).unwrap_or("");
        let word_len: usize = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
            .map(char::len_utf8)
            .sum();
        let token_len = if word_len > 0 {
            word_len
        } else {
            rest.chars()
                .next()
                .filter(|c| !c.is_whitespace())
                .map_or(0, char::len_utf8)
        };
        ParseFault {
            message: err.message,
            token: rest[..token_len].to_owned(),
            line: err.line,
            column: err.column,
            span: Span::new(offset, offset + token_len),
        }
    }
}

/// The script failed while running.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeFault {
    pub message: String,
    /// What the evaluator was doing when it failed.
    pub state: Option<PauseState>,
    pub span: Span,
}
