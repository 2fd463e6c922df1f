//! Fold regions for grammar files.

use magpie_syntax::{
    AstNode, GrammarParse, GrammarSpec, ModeSpec, NamedAction, Rule, SyntaxKind, SyntaxNode,
    SyntaxToken, TextSpan,
};
use serde::{Deserialize, Serialize};

use crate::span_of;

/// What a fold region collapses; picks the placeholder shown in its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldKind {
    /// A rule body, from after the name to the terminating semicolon.
    Rule,
    /// Everything in a `mode` section after the declaration name.
    Mode,
    /// The body of a named action such as `@members {...}`.
    Action,
    /// A block or documentation comment.
    Comment,
    /// The leading comment run of the file.
    Header,
    /// A top-level `options {...}` block.
    OptionsBlock,
    /// A top-level `tokens {...}` block.
    TokensBlock,
    /// A top-level `channels {...}` block.
    ChannelsBlock,
}

impl FoldKind {
    /// Replacement text an editor shows while the region is collapsed.
    pub fn placeholder(self) -> &'static str {
        match self {
            FoldKind::Rule => ":...;",
            FoldKind::Mode => ";...",
            FoldKind::Action => "{...}",
            _ => "...",
        }
    }
}

/// One collapsible region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldingRange {
    pub span: TextSpan,
    pub kind: FoldKind,
}

/// Computes every fold region for a parsed grammar file.
///
/// Regions come back sorted by position. When two regions cover exactly the
/// same span (a documentation comment that is also the whole file header),
/// the header wins and the plain comment fold is dropped.
pub fn folding_ranges(parse: &GrammarParse) -> Vec<FoldingRange> {
    let root = parse.syntax();
    let mut ranges = Vec::new();

    rule_folds(&root, &mut ranges);
    action_folds(&root, &mut ranges);
    ranges.extend(header_fold(&root));
    comment_folds(&root, &mut ranges);
    block_folds(&root, &mut ranges);
    mode_folds(&root, &mut ranges);

    ranges.sort_by_key(|range| (range.span.start, range.span.end));
    ranges.dedup_by_key(|range| range.span);
    tracing::debug!(target: "magpie.ide", ranges = ranges.len(), "computed fold regions");
    ranges
}

fn rule_folds(root: &SyntaxNode, out: &mut Vec<FoldingRange>) {
    for node in root.descendants() {
        let Some(rule) = Rule::cast(node) else {
            continue;
        };
        let Some(name) = rule.name_token() else {
            continue;
        };
        let Some(semi) = last_direct_token(rule.syntax(), SyntaxKind::Semicolon) else {
            continue;
        };
        let start = u32::from(name.text_range().end());
        let end = u32::from(semi.text_range().end());
        if start >= end {
            continue;
        }
        out.push(FoldingRange {
            span: TextSpan::new(start, end),
            kind: FoldKind::Rule,
        });
    }
}

fn action_folds(root: &SyntaxNode, out: &mut Vec<FoldingRange>) {
    for node in root.descendants() {
        let Some(action) = NamedAction::cast(node) else {
            continue;
        };
        let Some(body) = action.action_token() else {
            continue;
        };
        // One-line actions read fine as they are.
        if !body.text().contains('\n') {
            continue;
        }
        out.push(FoldingRange {
            span: span_of(body.text_range()),
            kind: FoldKind::Action,
        });
    }
}

/// Detects the leading comment run of the file.
///
/// The run starts at the first token (ignoring leading blank space) and
/// continues over comments separated by single whitespace stretches. It ends
/// just before the whitespace in front of the first declaration, and only
/// multi-line runs are worth a fold.
fn header_fold(root: &SyntaxNode) -> Option<FoldingRange> {
    let mut first = root.first_token()?;
    if first.kind() == SyntaxKind::Whitespace {
        first = first.next_token()?;
    }
    if !first.kind().is_comment() {
        return None;
    }

    let start = u32::from(first.text_range().start());
    let mut multi_line = first.text().contains('\n');
    let mut last = first;
    let end = loop {
        let gap = last.next_token()?;
        if gap.kind() != SyntaxKind::Whitespace {
            // An adjacent token with no space in between ends the run.
            break u32::from(gap.text_range().start());
        }
        let next = gap.next_token()?;
        if next.kind().is_comment() {
            multi_line = multi_line || gap.text().contains('\n') || next.text().contains('\n');
            last = next;
        } else {
            break u32::from(gap.text_range().start());
        }
    };

    if end <= start + 1 || !multi_line {
        return None;
    }
    Some(FoldingRange {
        span: TextSpan::new(start, end),
        kind: FoldKind::Header,
    })
}

fn comment_folds(root: &SyntaxNode, out: &mut Vec<FoldingRange>) {
    // Block and doc comments collapse individually. Line comments only fold
    // as part of the header run.
    let mut token = root.first_token();
    while let Some(current) = token {
        if matches!(
            current.kind(),
            SyntaxKind::BlockComment | SyntaxKind::DocComment
        ) {
            out.push(FoldingRange {
                span: span_of(current.text_range()),
                kind: FoldKind::Comment,
            });
        }
        token = current.next_token();
    }
}

fn block_folds(root: &SyntaxNode, out: &mut Vec<FoldingRange>) {
    let Some(grammar) = GrammarSpec::cast(root.clone()) else {
        return;
    };
    if let Some(spec) = grammar.options() {
        brace_fold(spec.intro_token(), spec.rbrace_token(), FoldKind::OptionsBlock, out);
    }
    if let Some(spec) = grammar.tokens_spec() {
        brace_fold(spec.intro_token(), spec.rbrace_token(), FoldKind::TokensBlock, out);
    }
    if let Some(spec) = grammar.channels_spec() {
        brace_fold(spec.intro_token(), spec.rbrace_token(), FoldKind::ChannelsBlock, out);
    }
}

/// The intro token text runs through the opening brace, so the fold hides
/// exactly the block contents plus the closing brace.
fn brace_fold(
    intro: Option<SyntaxToken>,
    rbrace: Option<SyntaxToken>,
    kind: FoldKind,
    out: &mut Vec<FoldingRange>,
) {
    let (Some(intro), Some(rbrace)) = (intro, rbrace) else {
        return;
    };
    let start = u32::from(intro.text_range().end());
    let end = u32::from(rbrace.text_range().end());
    if start >= end {
        return;
    }
    out.push(FoldingRange {
        span: TextSpan::new(start, end),
        kind,
    });
}

fn mode_folds(root: &SyntaxNode, out: &mut Vec<FoldingRange>) {
    for node in root.descendants() {
        let Some(mode) = ModeSpec::cast(node) else {
            continue;
        };
        let Some(semi) = first_direct_token(mode.syntax(), SyntaxKind::Semicolon) else {
            continue;
        };
        out.push(FoldingRange {
            span: TextSpan::new(
                u32::from(semi.text_range().start()),
                u32::from(mode.syntax().text_range().end()),
            ),
            kind: FoldKind::Mode,
        });
    }
}

fn first_direct_token(node: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxToken> {
    node.children_with_tokens()
        .filter_map(|element| element.into_token())
        .find(|token| token.kind() == kind)
}

fn last_direct_token(node: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxToken> {
    node.children_with_tokens()
        .filter_map(|element| element.into_token())
        .filter(|token| token.kind() == kind)
        .last()
}
