/// Malformed source text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({line}:{column})")]
pub struct ParseError {
    pub message: String,
    /// 1-based.
    pub line: u32,
    /// 1-based, counted in characters.
    pub column: usize,
    /// Byte offset of the offending position.
    pub offset: usize,
}

/// An error that stopped evaluation: an uncaught script exception, a misplaced `break`, or a
/// native function that failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Fault {
    pub message: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Fault {
        Fault {
            message: message.into(),
        }
    }
}
