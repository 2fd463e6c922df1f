//! Editor-facing features over parsed grammar files.
//!
//! Every function in this crate is a pure query against a
//! [`magpie_syntax::GrammarParse`]: hosts parse once, then ask for fold
//! regions, outline items, highlighting classes, or rename edits and map the
//! resulting byte spans into whatever editor protocol they serve. Nothing
//! here touches lexer or parser state, so queries can run on any thread that
//! holds a clone of the tree.

mod folding;
mod highlight;
mod refs;
mod structure;

pub use folding::{folding_ranges, FoldKind, FoldingRange};
pub use highlight::{highlight_class, HighlightClass};
pub use refs::{find_rule_references, rename_rule, RuleReference, TextEdit};
pub use structure::{structure_items, StructureItem, StructureItemKind};

use magpie_syntax::{TextRange, TextSpan};

pub(crate) fn span_of(range: TextRange) -> TextSpan {
    TextSpan::new(range.start().into(), range.end().into())
}
