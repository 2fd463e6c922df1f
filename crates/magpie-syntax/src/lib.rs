//! Lossless syntax trees for Magpie grammar definition files.
//!
//! This crate provides three complementary entry points:
//! - [`lex`]: a flat token list for callers that only need token-level
//!   information (highlighting tests, quick scans).
//! - [`parse`]: a full-fidelity rowan-based syntax tree covering every byte
//!   of the input, suitable for IDE features.
//! - [`restartable_lexer`]: an incremental scanner that can resume from any
//!   previously recorded token boundary, for editors that re-highlight only
//!   the damaged region of a file.
//!
//! The scanner implements [`magpie_interp::ModalLexer`], so its mode stack
//! and rule-kind context survive round-trips through the interning table
//! that editor integrations use to tag token boundaries.

pub mod ast;
mod lexer;
mod parser;
mod syntax_kind;

pub use ast::*;
pub use lexer::{
    element_kinds, lex, lex_with_errors, restartable_lexer, GrammarLexer, GrammarToken,
};
pub use parser::{parse, GrammarParse, SyntaxElement, SyntaxNode, SyntaxToken};
pub use rowan::{TextRange, TextSize};
pub use syntax_kind::{GrammarLanguage, SyntaxKind};

pub use magpie_editor::ParseError;
pub use magpie_interp::TextSpan;

#[cfg(test)]
mod tests;
