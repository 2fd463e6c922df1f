use crate::token::TextSpan;

pub type AtnResult<T> = Result<T, AtnError>;

/// Errors raised while assembling or validating an automaton.
///
/// These indicate a malformed automaton description, not bad user input;
/// user-facing problems (unmatched characters, syntax errors) are reported
/// as [`SyntaxError`] diagnostics instead.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AtnError {
    #[error("reference to undefined rule `{0}`")]
    UndefinedRule(String),
    #[error("duplicate rule `{0}`")]
    DuplicateRule(String),
    #[error("rule `{0}` has no alternatives")]
    EmptyRule(String),
    #[error("lexer rule `{0}` can match the empty string")]
    NullableLexerRule(String),
    #[error("lexer command references undefined mode {0}")]
    UndefinedMode(u16),
    #[error("token type {0} is out of range for the declared vocabulary")]
    TokenOutOfRange(u16),
    #[error("automaton has no rules")]
    Empty,
}

/// A recoverable problem found in user text during lexing or parsing.
///
/// Spans are byte offsets into the analyzed text; hosts map them to
/// lines/columns themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub span: TextSpan,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: TextSpan) -> SyntaxError {
        SyntaxError { message: message.into(), span }
    }
}
