//! Adaptive two-phase alternative prediction.
//!
//! Every decision is first simulated with truncated call stacks: unknown
//! callers are approximated by fanning a completed rule out to all of its
//! static call sites. Steps through a decision are memoized in a small
//! per-decision DFA, so hot decisions settle into pure table walks. When
//! the truncated simulation cannot separate the survivors it is rerun with
//! the parser's exact invocation stack; a unique winner there is recorded
//! as a context sensitivity, a second conflict as an ambiguity resolved in
//! favor of the lowest alternative.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::atn::{Atn, StateId, StateKind, Transition};
use crate::token::{TokenBuffer, TokenType};

/// Call-stack approximation carried by a simulation config. `frames` is
/// bottom-up: the last entry is the innermost return state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Ctx {
    wildcard: bool,
    frames: Vec<StateId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Config {
    state: StateId,
    alt: u16,
    ctx: Ctx,
}

/// What a closed config set says about the decision so far.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Predict(u16),
    Conflict(Vec<u16>),
    Dead,
    Continue,
}

#[derive(Debug)]
struct DfaState {
    configs: Vec<Config>,
    step: Step,
}

/// Memoized simulation states and edges for one decision.
#[derive(Debug, Default)]
struct Dfa {
    start: Option<u32>,
    states: Vec<DfaState>,
    index: HashMap<(Vec<Config>, bool), u32>,
    edges: HashMap<(u32, TokenType), u32>,
}

impl Dfa {
    fn intern(&mut self, mut configs: Vec<Config>, at_eof: bool) -> u32 {
        configs.sort();
        configs.dedup();
        if let Some(&id) = self.index.get(&(configs.clone(), at_eof)) {
            return id;
        }
        let step = analyze(&configs, at_eof);
        let id = self.states.len() as u32;
        self.index.insert((configs.clone(), at_eof), id);
        self.states.push(DfaState { configs, step });
        id
    }
}

/// Result of predicting one decision.
#[derive(Debug, Clone)]
pub(crate) struct PredictOutcome {
    /// Winning alternative, 1-based; `None` when no alternative is viable.
    pub alt: Option<u16>,
    /// All surviving alternatives when the full-context phase still
    /// conflicted; empty otherwise.
    pub ambig_alts: Vec<u16>,
    pub context_sensitive: bool,
    pub used_ll: bool,
    pub sll_look: u64,
    pub ll_look: u64,
    pub sll_dfa_transitions: u64,
    pub sll_atn_transitions: u64,
    pub ll_atn_transitions: u64,
    /// Predicate edges crossed while computing closures; crossings on
    /// memoized edges are not re-counted.
    pub predicate_crossings: u64,
    /// Raw buffer index of the first symbol consulted.
    pub start_index: usize,
    /// Raw buffer index of the last symbol the deciding phase consulted.
    pub stop_index: usize,
}

impl PredictOutcome {
    pub fn ambiguous(&self) -> bool {
        !self.ambig_alts.is_empty()
    }
}

pub(crate) struct Predictor {
    dfas: Vec<Dfa>,
}

impl Predictor {
    pub fn new(decision_count: usize) -> Predictor {
        let mut dfas = Vec::with_capacity(decision_count);
        dfas.resize_with(decision_count, Dfa::default);
        Predictor { dfas }
    }

    pub fn dfa_size(&self, decision: u16) -> usize {
        self.dfas[decision as usize].states.len()
    }

    /// Predicts `decision` against the tokens at `start_raw` and beyond.
    /// `outer_follows` is the parser's live return-state chain, bottom-up.
    pub fn predict(
        &mut self,
        atn: &Atn,
        decision: u16,
        buf: &TokenBuffer,
        start_raw: usize,
        outer_follows: &[StateId],
    ) -> PredictOutcome {
        let mut preds = 0u64;
        let mut out = PredictOutcome {
            alt: None,
            ambig_alts: Vec::new(),
            context_sensitive: false,
            used_ll: false,
            sll_look: 0,
            ll_look: 0,
            sll_dfa_transitions: 0,
            sll_atn_transitions: 0,
            ll_atn_transitions: 0,
            predicate_crossings: 0,
            start_index: La::new(buf, start_raw).peek_raw(),
            stop_index: La::new(buf, start_raw).peek_raw(),
        };

        let conflict = {
            let dfa = &mut self.dfas[decision as usize];
            let mut cur = match dfa.start {
                Some(id) => id,
                None => {
                    let base = Ctx { wildcard: true, frames: Vec::new() };
                    let set = start_set(atn, decision, base, &mut preds);
                    let id = dfa.intern(set, false);
                    dfa.start = Some(id);
                    id
                }
            };
            let mut cursor = La::new(buf, start_raw);
            let mut look = 0u64;
            let mut stop = out.start_index;
            let conflict = loop {
                match dfa.states[cur as usize].step {
                    Step::Predict(alt) => {
                        out.alt = Some(alt);
                        break None;
                    }
                    Step::Conflict(ref alts) => break Some(alts.clone()),
                    Step::Dead => break None,
                    Step::Continue => {}
                }
                let (ty, raw) = cursor.next();
                look += 1;
                stop = raw;
                if let Some(&next) = dfa.edges.get(&(cur, ty)) {
                    out.sll_dfa_transitions += 1;
                    cur = next;
                } else {
                    out.sll_atn_transitions += 1;
                    let moved = move_set(atn, &dfa.states[cur as usize].configs.clone(), ty, &mut preds);
                    let next = dfa.intern(moved, ty.is_eof());
                    dfa.edges.insert((cur, ty), next);
                    cur = next;
                }
            };
            out.sll_look = look.max(1);
            out.stop_index = stop;
            conflict
        };

        if let Some(sll_alts) = conflict {
            // The truncated stacks could not separate these alternatives;
            // rerun against the exact invocation stack.
            out.used_ll = true;
            tracing::debug!(
                target: "magpie.interp",
                decision,
                alts = ?sll_alts,
                "full-context fallback"
            );
            let base = Ctx { wildcard: false, frames: outer_follows.to_vec() };
            let mut set = start_set(atn, decision, base, &mut preds);
            let mut at_eof = false;
            let mut cursor = La::new(buf, start_raw);
            let mut look = 0u64;
            let mut stop = out.start_index;
            loop {
                match analyze(&set, at_eof) {
                    Step::Predict(alt) => {
                        out.alt = Some(alt);
                        out.context_sensitive = true;
                        break;
                    }
                    Step::Conflict(alts) => {
                        out.alt = alts.first().copied();
                        out.ambig_alts = alts;
                        break;
                    }
                    Step::Dead => break,
                    Step::Continue => {}
                }
                let (ty, raw) = cursor.next();
                look += 1;
                stop = raw;
                at_eof = ty.is_eof();
                out.ll_atn_transitions += 1;
                set = move_set(atn, &set, ty, &mut preds);
            }
            out.ll_look = look.max(1);
            out.stop_index = stop.max(out.stop_index);
        }

        out.predicate_crossings = preds;
        out
    }
}

/// Closed config set for all alternatives of a decision under `base`.
fn start_set(atn: &Atn, decision: u16, base: Ctx, preds: &mut u64) -> Vec<Config> {
    let state = atn.state(atn.decision_state(decision));
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for (i, t) in state.transitions.iter().enumerate() {
        let cfg = Config { state: t.target(), alt: (i + 1) as u16, ctx: base.clone() };
        closure(atn, cfg, &mut out, &mut seen, preds);
    }
    out
}

/// Expands a config through epsilon edges, rule calls, and rule returns
/// until it rests on consuming states. A config at a rule stop with an
/// exhausted stack stays in the set as a completed-match marker.
fn closure(
    atn: &Atn,
    cfg: Config,
    out: &mut Vec<Config>,
    seen: &mut HashSet<Config>,
    preds: &mut u64,
) {
    if !seen.insert(cfg.clone()) {
        return;
    }
    let state = atn.state(cfg.state);
    if state.kind == StateKind::RuleStop {
        let mut popped = cfg.ctx.clone();
        if let Some(follow) = popped.frames.pop() {
            closure(atn, Config { state: follow, alt: cfg.alt, ctx: popped }, out, seen, preds);
        } else if cfg.ctx.wildcard {
            // Unknown caller: resume at every static call site, and keep
            // the stop config in case this rule was the entry point.
            for &follow in atn.followers(state.rule) {
                let next = Config { state: follow, alt: cfg.alt, ctx: cfg.ctx.clone() };
                closure(atn, next, out, seen, preds);
            }
            out.push(cfg);
        } else {
            out.push(cfg);
        }
        return;
    }
    let mut consuming = false;
    for t in &state.transitions {
        match t {
            Transition::Epsilon(target) => {
                closure(atn, Config { state: *target, alt: cfg.alt, ctx: cfg.ctx.clone() }, out, seen, preds);
            }
            Transition::Predicate { target, .. } => {
                *preds += 1;
                closure(atn, Config { state: *target, alt: cfg.alt, ctx: cfg.ctx.clone() }, out, seen, preds);
            }
            Transition::Rule { target, follow, .. } => {
                let mut ctx = cfg.ctx.clone();
                ctx.frames.push(*follow);
                closure(atn, Config { state: *target, alt: cfg.alt, ctx }, out, seen, preds);
            }
            _ => consuming = true,
        }
    }
    if consuming {
        out.push(cfg);
    }
}

/// Consumes `ty` from every config and closes the result. Completed-match
/// markers survive only an EOF step.
fn move_set(atn: &Atn, configs: &[Config], ty: TokenType, preds: &mut u64) -> Vec<Config> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for cfg in configs {
        let state = atn.state(cfg.state);
        if state.kind == StateKind::RuleStop {
            if ty.is_eof() && seen.insert(cfg.clone()) {
                out.push(cfg.clone());
            }
            continue;
        }
        for t in &state.transitions {
            if t.consumes_input() && t.matches(ty) {
                let next = Config { state: t.target(), alt: cfg.alt, ctx: cfg.ctx.clone() };
                closure(atn, next, &mut out, &mut seen, preds);
            }
        }
    }
    out
}

/// Tokens on which the parser can resume from `state` given its live
/// return-state chain. Drives panic-mode deletion in error recovery.
pub(crate) struct ResyncSet {
    configs: Vec<Config>,
}

pub(crate) fn resync_set(atn: &Atn, state: StateId, frames: &[StateId]) -> ResyncSet {
    let mut configs = Vec::new();
    let mut seen = HashSet::new();
    let mut preds = 0u64;
    let ctx = Ctx { wildcard: false, frames: frames.to_vec() };
    closure(atn, Config { state, alt: 1, ctx }, &mut configs, &mut seen, &mut preds);
    ResyncSet { configs }
}

impl ResyncSet {
    pub(crate) fn contains(&self, atn: &Atn, ty: TokenType) -> bool {
        for cfg in &self.configs {
            let state = atn.state(cfg.state);
            if state.kind == StateKind::RuleStop {
                if ty.is_eof() {
                    return true;
                }
                continue;
            }
            if state.transitions.iter().any(|t| t.consumes_input() && t.matches(ty)) {
                return true;
            }
        }
        false
    }
}

fn analyze(configs: &[Config], at_eof: bool) -> Step {
    let viable: BTreeSet<u16> = configs.iter().map(|c| c.alt).collect();
    match viable.len() {
        0 => return Step::Dead,
        1 => return Step::Predict(*viable.iter().next().unwrap()),
        _ => {}
    }
    if at_eof {
        // Input exhausted; nothing further can separate the survivors.
        return Step::Conflict(viable.into_iter().collect());
    }
    let mut groups: HashMap<(StateId, &Ctx), BTreeSet<u16>> = HashMap::new();
    for cfg in configs {
        groups.entry((cfg.state, &cfg.ctx)).or_default().insert(cfg.alt);
    }
    if groups.values().all(|alts| alts.len() > 1) {
        Step::Conflict(viable.into_iter().collect())
    } else {
        Step::Continue
    }
}

/// Lookahead cursor over the default channel; sticks at EOF.
struct La<'a> {
    buf: &'a TokenBuffer,
    raw: usize,
}

impl<'a> La<'a> {
    fn new(buf: &'a TokenBuffer, raw: usize) -> La<'a> {
        La { buf, raw }
    }

    fn peek_raw(&self) -> usize {
        let last = self.buf.len() - 1;
        let mut i = self.raw;
        while i < last && !self.buf.get(i).channel.is_default() {
            i += 1;
        }
        i.min(last)
    }

    fn next(&mut self) -> (TokenType, usize) {
        let i = self.peek_raw();
        let tok = *self.buf.get(i);
        if !tok.is_eof() {
            self.raw = i + 1;
        }
        (tok.ty, i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atn::{AtnBuilder, Elem};
    use crate::token::{Channel, TextSpan, Token};
    use pretty_assertions::assert_eq;

    fn buffer(types: &[u16]) -> TokenBuffer {
        let mut buf = TokenBuffer::new("".into());
        for (i, &ty) in types.iter().enumerate() {
            let at = i as u32;
            buf.push(Token::new(TokenType(ty), TextSpan::new(at, at + 1), Channel::DEFAULT));
        }
        buf.push(Token::new(
            TokenType::EOF,
            TextSpan::empty(types.len() as u32),
            Channel::DEFAULT,
        ));
        buf
    }

    const ID: u16 = 0;
    const DOT: u16 = 1;
    const LPAREN: u16 = 2;
    const RPAREN: u16 = 3;

    fn dotted_call_atn() -> Atn {
        let mut b = AtnBuilder::new::<Vec<String>, _>(vec!["ID".into(), "DOT".into(), "LPAREN".into(), "RPAREN".into()]);
        b.rule(
            "e",
            vec![
                vec![Elem::Token(TokenType(ID)), Elem::Token(TokenType(DOT)), Elem::Token(TokenType(ID))],
                vec![Elem::Token(TokenType(ID)), Elem::Token(TokenType(LPAREN)), Elem::Token(TokenType(RPAREN))],
            ],
        );
        b.build().unwrap()
    }

    #[test]
    fn resolves_after_two_tokens() {
        let atn = dotted_call_atn();
        let buf = buffer(&[ID, DOT, ID]);
        let mut p = Predictor::new(atn.decision_count());
        let out = p.predict(&atn, 0, &buf, 0, &[]);
        assert_eq!(out.alt, Some(1));
        assert_eq!(out.sll_look, 2);
        assert!(!out.used_ll);
        assert_eq!((out.start_index, out.stop_index), (0, 1));
    }

    #[test]
    fn repeat_predictions_walk_the_memo_table() {
        let atn = dotted_call_atn();
        let buf = buffer(&[ID, LPAREN, RPAREN]);
        let mut p = Predictor::new(atn.decision_count());
        let cold = p.predict(&atn, 0, &buf, 0, &[]);
        assert_eq!(cold.alt, Some(2));
        assert!(cold.sll_atn_transitions > 0);
        assert_eq!(cold.sll_dfa_transitions, 0);

        let warm = p.predict(&atn, 0, &buf, 0, &[]);
        assert_eq!(warm.alt, Some(2));
        assert_eq!(warm.sll_atn_transitions, 0);
        assert_eq!(warm.sll_dfa_transitions, 2);
        assert!(p.dfa_size(0) >= 3);
    }

    #[test]
    fn identical_alternatives_resolve_to_the_lowest() {
        const A: u16 = 0;
        let mut b = AtnBuilder::new::<Vec<String>, _>(vec!["A".into()]);
        b.rule(
            "r",
            vec![vec![Elem::Token(TokenType(A))], vec![Elem::Token(TokenType(A))]],
        );
        let atn = b.build().unwrap();
        let buf = buffer(&[A]);
        let mut p = Predictor::new(atn.decision_count());
        let out = p.predict(&atn, 0, &buf, 0, &[]);
        assert_eq!(out.alt, Some(1));
        assert!(out.used_ll, "conflict must be retried with full context");
        assert_eq!(out.ambig_alts, vec![1, 2]);
        assert!(!out.context_sensitive);
    }

    #[test]
    fn exact_stack_separates_what_truncated_stacks_cannot() {
        // s : a <eof> | b <eof> ;  a : r A q ;  b : r q ;  q : B ;
        // r : A | A A ;
        // On "A A B" inside `a`, the truncated phase mixes `b`'s call site
        // into `r`'s completions and conflicts at EOF; the exact stack
        // proves only alternative 1 of `r` can finish.
        const A: u16 = 0;
        const B: u16 = 1;
        let mut b = AtnBuilder::new::<Vec<String>, _>(vec!["A".into(), "B".into()]);
        b.rule(
            "s",
            vec![
                vec![Elem::Rule("a".into()), Elem::Token(TokenType::EOF)],
                vec![Elem::Rule("b".into()), Elem::Token(TokenType::EOF)],
            ],
        );
        b.rule(
            "a",
            vec![vec![Elem::Rule("r".into()), Elem::Token(TokenType(A)), Elem::Rule("q".into())]],
        );
        b.rule("b", vec![vec![Elem::Rule("r".into()), Elem::Rule("q".into())]]);
        b.rule("q", vec![vec![Elem::Token(TokenType(B))]]);
        b.rule(
            "r",
            vec![
                vec![Elem::Token(TokenType(A))],
                vec![Elem::Token(TokenType(A)), Elem::Token(TokenType(A))],
            ],
        );
        let atn = b.build().unwrap();

        let a = atn.rule_index("a").unwrap();
        let r = atn.rule_index("r").unwrap();
        let r_decision = atn.rule(r).entry_decision.unwrap();
        // Invocation stack for s(alt 1) -> a -> r, bottom-up.
        let outer = vec![atn.followers(a)[0], atn.followers(r)[0]];

        let buf = buffer(&[A, A, B]);
        let mut p = Predictor::new(atn.decision_count());
        let out = p.predict(&atn, r_decision, &buf, 0, &outer);
        assert_eq!(out.alt, Some(1));
        assert!(out.used_ll);
        assert!(out.context_sensitive);
        assert!(out.ambig_alts.is_empty());
        assert_eq!(out.sll_look, 4, "truncated phase conflicts only at EOF");
        assert_eq!(out.ll_look, 3);
    }

    #[test]
    fn dead_input_yields_no_alternative() {
        let atn = dotted_call_atn();
        let buf = buffer(&[DOT]);
        let mut p = Predictor::new(atn.decision_count());
        let out = p.predict(&atn, 0, &buf, 0, &[]);
        assert_eq!(out.alt, None);
        assert!(!out.used_ll);
    }

    #[test]
    fn hidden_tokens_are_invisible_to_lookahead() {
        let atn = dotted_call_atn();
        let mut buf = TokenBuffer::new("".into());
        buf.push(Token::new(TokenType(ID), TextSpan::new(0, 1), Channel::DEFAULT));
        buf.push(Token::new(TokenType(99), TextSpan::new(1, 2), Channel::HIDDEN));
        buf.push(Token::new(TokenType(DOT), TextSpan::new(2, 3), Channel::DEFAULT));
        buf.push(Token::new(TokenType(ID), TextSpan::new(3, 4), Channel::DEFAULT));
        buf.push(Token::new(TokenType::EOF, TextSpan::empty(4), Channel::DEFAULT));
        let mut p = Predictor::new(atn.decision_count());
        let out = p.predict(&atn, 0, &buf, 0, &[]);
        assert_eq!(out.alt, Some(1));
        // The deciding symbol is the DOT at raw index 2.
        assert_eq!((out.start_index, out.stop_index), (0, 2));
    }
}
