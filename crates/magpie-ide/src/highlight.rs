//! Token-kind to highlighting-class assignment.

use magpie_syntax::SyntaxKind;
use serde::{Deserialize, Serialize};

/// Coloring buckets understood by editor hosts.
///
/// The mapping is deliberately coarse. Finer distinctions (a token reference
/// that resolves to a fragment, say) need name resolution and belong in a
/// semantic pass layered on top of this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightClass {
    Keyword,
    TokenName,
    RuleName,
    String,
    Comment,
    BadCharacter,
}

/// Picks the highlighting class for a single token kind.
///
/// Returns `None` for kinds the default scheme leaves unstyled: punctuation,
/// integers, character sets, action blocks, and the `options {` / `tokens {` /
/// `channels {` introducers, which read as structure rather than keywords.
pub fn highlight_class(kind: SyntaxKind) -> Option<HighlightClass> {
    if kind.is_keyword() {
        return Some(HighlightClass::Keyword);
    }
    match kind {
        SyntaxKind::TokenRef => Some(HighlightClass::TokenName),
        SyntaxKind::RuleRef => Some(HighlightClass::RuleName),
        SyntaxKind::StringLiteral | SyntaxKind::UnterminatedString => Some(HighlightClass::String),
        SyntaxKind::LineComment | SyntaxKind::BlockComment | SyntaxKind::DocComment => {
            Some(HighlightClass::Comment)
        }
        SyntaxKind::Error => Some(HighlightClass::BadCharacter),
        _ => None,
    }
}
