//! Flat file-outline items, one per rule definition.

use magpie_syntax::{AstNode, GrammarParse, Rule, SyntaxNode, TextSpan};
use serde::{Deserialize, Serialize};

use crate::span_of;

/// Which face an outline item shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureItemKind {
    ParserRule,
    LexerRule,
}

/// One outline entry pointing at a rule definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureItem {
    pub name: String,
    pub kind: StructureItemKind,
    /// Span of the name token, for caret placement on navigation.
    pub name_span: TextSpan,
    /// Span of the whole definition, trimmed of surrounding trivia.
    pub span: TextSpan,
}

/// Collects every rule definition in document order.
///
/// Rules declared under `mode` sections are listed alongside the top-level
/// ones; the outline stays flat and hosts apply their own grouping or
/// sorting. Definitions that lost their name to a syntax error are skipped
/// because there is nothing to label them with.
pub fn structure_items(parse: &GrammarParse) -> Vec<StructureItem> {
    let mut items = Vec::new();
    for node in parse.syntax().descendants() {
        let Some(rule) = Rule::cast(node) else {
            continue;
        };
        let Some(name) = rule.name_token() else {
            continue;
        };
        let kind = match &rule {
            Rule::ParserRule(_) => StructureItemKind::ParserRule,
            Rule::LexerRule(_) => StructureItemKind::LexerRule,
        };
        let span = trimmed_span(rule.syntax()).unwrap_or_else(|| span_of(name.text_range()));
        items.push(StructureItem {
            name: name.text().to_string(),
            kind,
            name_span: span_of(name.text_range()),
            span,
        });
    }
    items
}

/// Tightest span over the node's non-trivia tokens. A definition's leading
/// whitespace and comments sit inside its node, so the raw node range would
/// start at the previous declaration's terminator.
fn trimmed_span(node: &SyntaxNode) -> Option<TextSpan> {
    let mut span: Option<TextSpan> = None;
    for element in node.descendants_with_tokens() {
        let Some(token) = element.into_token() else {
            continue;
        };
        if token.kind().is_trivia() {
            continue;
        }
        let token_span = span_of(token.text_range());
        span = Some(match span {
            Some(existing) => existing.cover(token_span),
            None => token_span,
        });
    }
    span
}
