//! Re-parsing for lookahead and ambiguity visualization.
//!
//! Both entry points replay a finished parse with one decision pinned to
//! each alternative in turn and slice out the subtree around the decision
//! window, so a caller can show side by side what each alternative would
//! have produced.

use std::sync::Arc;

use crate::atn::Atn;
use crate::error::AtnResult;
use crate::parser::{DecisionOverride, ErrorPolicy, ParserInterpreter, ParserOptions};
use crate::profiler::{LookEvent, ParseInfo};
use crate::stream::TokenStream;
use crate::token::TokenBuffer;
use crate::tree::{InterpTree, NodeId};

/// One alternative's view of a decision window.
#[derive(Debug)]
pub struct LookaheadTree {
    /// Alternative that was forced, 1-based.
    pub alt: u16,
    pub tree: InterpTree,
    pub root: NodeId,
}

impl LookaheadTree {
    pub fn render(&self, atn: &Atn, buffer: &TokenBuffer) -> String {
        self.tree.render(self.root, atn, buffer)
    }
}

/// Re-parses once per alternative of `decision`, forcing the decision at
/// `at_index` and bailing at the first error. Each returned tree is cut
/// to the lookahead window: to the first error when the forced
/// alternative failed, otherwise to `window_stop`.
pub fn lookahead_trees(
    atn: &Arc<Atn>,
    buffer: &TokenBuffer,
    start_rule: u16,
    decision: u16,
    at_index: usize,
    window_stop: usize,
) -> AtnResult<Vec<LookaheadTree>> {
    let alt_count = atn.decision_alt_count(decision);
    let mut out = Vec::with_capacity(alt_count);
    for alt in 1..=alt_count as u16 {
        let opts = ParserOptions { profile: false, policy: ErrorPolicy::TrackAndBail };
        let mut parser = ParserInterpreter::new(Arc::clone(atn), opts);
        parser.set_override(Some(DecisionOverride { decision, at_index, alt }));
        let mut stream = TokenStream::new(buffer.clone());
        let mut run = parser.parse(&mut stream, start_rule)?;

        let mut stop = run.first_error_index.unwrap_or(window_stop) as u32;
        if let Some((_, hi)) = run.tree.token_interval(run.root) {
            stop = stop.min(hi);
        }
        let start = at_index as u32;
        let mut root = run.tree.subtree_enclosing(run.root, start, stop);
        if let Some(marked) = run.tree.find_override_root(run.root) {
            if run.tree.is_ancestor_of(marked, root) {
                root = marked;
            }
        }
        run.tree.strip_children_out_of_range(root, start, stop);
        out.push(LookaheadTree { alt, tree: run.tree, root });
    }
    Ok(out)
}

/// Re-parses once per conflicting alternative of an ambiguous decision
/// and returns the subtree spanning the ambiguous region, whole.
pub fn ambiguity_trees(
    atn: &Arc<Atn>,
    buffer: &TokenBuffer,
    start_rule: u16,
    decision: u16,
    alts: &[u16],
    start_index: usize,
    stop_index: usize,
) -> AtnResult<Vec<LookaheadTree>> {
    let mut out = Vec::with_capacity(alts.len());
    for &alt in alts {
        let opts = ParserOptions { profile: false, policy: ErrorPolicy::Recover };
        let mut parser = ParserInterpreter::new(Arc::clone(atn), opts);
        parser.set_override(Some(DecisionOverride { decision, at_index: start_index, alt }));
        let mut stream = TokenStream::new(buffer.clone());
        let run = parser.parse(&mut stream, start_rule)?;

        let mut root = run.tree.subtree_enclosing(run.root, start_index as u32, stop_index as u32);
        if let Some(marked) = run.tree.find_override_root(run.root) {
            if run.tree.is_ancestor_of(marked, root) {
                root = marked;
            }
        }
        out.push(LookaheadTree { alt, tree: run.tree, root });
    }
    Ok(out)
}

/// The profiled decision worth visualizing: the recorded lookahead
/// excursion with the greatest depth, earliest first on ties. Excursions
/// of a single symbol are routine and skipped.
pub fn deepest_look_event(info: &ParseInfo) -> Option<&LookEvent> {
    let mut best: Option<&LookEvent> = None;
    for d in &info.decisions {
        for ev in d.sll_max_look_event.iter().chain(d.ll_max_look_event.iter()) {
            if ev.depth <= 1 {
                continue;
            }
            let better = match best {
                None => true,
                Some(b) => {
                    ev.depth > b.depth || (ev.depth == b.depth && ev.start_index < b.start_index)
                }
            };
            if better {
                best = Some(ev);
            }
        }
    }
    best
}
