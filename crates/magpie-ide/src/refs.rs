//! Rule-name definitions, references, and rename edits.

use magpie_syntax::{AstNode, GrammarParse, Rule, SyntaxKind, SyntaxToken, TextSpan};
use serde::{Deserialize, Serialize};

use crate::span_of;

/// One occurrence of a rule name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleReference {
    pub span: TextSpan,
    /// Set on the name token of a definition site.
    pub is_definition: bool,
}

/// A replacement applied to the file text over a byte span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub span: TextSpan,
    pub replacement: String,
}

impl TextEdit {
    pub fn new(span: TextSpan, replacement: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
        }
    }
}

/// Finds every occurrence of `name` as a rule definition or reference.
///
/// Grammar naming carries the kind: a name starting with an uppercase letter
/// is a token (lexer rule) name, anything else names a parser rule. Token
/// names are searched in every rule body, so lexer command arguments such as
/// `channel(HIDDEN)` or `pushMode(ISLAND)` count as references. Parser rule
/// names can only occur in parser rule bodies, which keeps lexer command
/// names like `channel` itself out of the results. Labels bound with `=` or
/// `+=` are bindings rather than references and are skipped.
///
/// Results come back in document order.
pub fn find_rule_references(parse: &GrammarParse, name: &str) -> Vec<RuleReference> {
    let token_name = is_token_name(name);
    let ref_kind = if token_name {
        SyntaxKind::TokenRef
    } else {
        SyntaxKind::RuleRef
    };
    let mut found = Vec::new();

    for node in parse.syntax().descendants() {
        let Some(rule) = Rule::cast(node) else {
            continue;
        };
        let defines = match &rule {
            Rule::ParserRule(_) => !token_name,
            Rule::LexerRule(_) => token_name,
        };
        if defines {
            if let Some(def) = rule.name_token() {
                if def.text() == name {
                    found.push(RuleReference {
                        span: span_of(def.text_range()),
                        is_definition: true,
                    });
                }
            }
        }

        if !token_name && matches!(rule, Rule::LexerRule(_)) {
            continue;
        }
        let alt_list = match &rule {
            Rule::ParserRule(it) => it.alt_list(),
            Rule::LexerRule(it) => it.alt_list(),
        };
        let Some(alt_list) = alt_list else {
            continue;
        };
        for element in alt_list.syntax().descendants_with_tokens() {
            let Some(token) = element.into_token() else {
                continue;
            };
            if token.kind() != ref_kind || token.text() != name || is_label(&token) {
                continue;
            }
            found.push(RuleReference {
                span: span_of(token.text_range()),
                is_definition: false,
            });
        }
    }

    found.sort_by_key(|reference| (reference.span.start, reference.span.end));
    found
}

/// Builds one text edit per occurrence of `old_name`, definitions included.
///
/// Edits come back in ascending position and never overlap; hosts apply them
/// back to front so earlier offsets stay valid. An unknown name produces no
/// edits. The new name is taken as given: checking that it fits the
/// grammar's identifier shape and keeps the case kind of the old name is the
/// caller's concern.
pub fn rename_rule(parse: &GrammarParse, old_name: &str, new_name: &str) -> Vec<TextEdit> {
    find_rule_references(parse, old_name)
        .into_iter()
        .map(|reference| TextEdit::new(reference.span, new_name))
        .collect()
}

fn is_token_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// A name directly followed by `=` or `+=` is an element label.
fn is_label(token: &SyntaxToken) -> bool {
    let mut next = token.next_token();
    while let Some(current) = next {
        if !current.kind().is_trivia() {
            return matches!(current.kind(), SyntaxKind::Eq | SyntaxKind::PlusEq);
        }
        next = current.next_token();
    }
    false
}
