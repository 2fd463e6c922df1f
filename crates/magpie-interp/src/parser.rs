//! Interpretive parser over a built automaton.
//!
//! The machine walks states directly: linear states consume or call,
//! branch states ask the predictor, rule stops pop the invocation stack.
//! Trees come out as [`InterpTree`] arenas so callers can slice and
//! render them without touching the parser again.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::atn::{Atn, StateId, StateKind, Transition};
use crate::error::{AtnError, AtnResult, SyntaxError};
use crate::predict::{resync_set, PredictOutcome, Predictor};
use crate::profiler::{DecisionSite, LookEvent, ParseInfo, ProfileCollector};
use crate::stream::TokenStream;
use crate::token::{TextSpan, TokenType};
use crate::tree::{InterpTree, NodeId};

/// How the parser reacts to a token it cannot match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Repair and keep going: delete one extraneous token, synthesize one
    /// missing token, or fall back to panic-mode deletion.
    #[default]
    Recover,
    /// Record the offending token as an error leaf, remember where it
    /// happened, and abandon the parse. Used by lookahead re-parsing.
    TrackAndBail,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParserOptions {
    pub profile: bool,
    pub policy: ErrorPolicy,
}

/// Forces one decision to a fixed alternative when the parser reaches it
/// at exactly `at_index`. The rule node owning the decision is marked so
/// it can be found again in the finished tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionOverride {
    pub decision: u16,
    pub at_index: usize,
    pub alt: u16,
}

/// Noteworthy prediction outcomes surfaced to tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionEvent {
    Ambiguity {
        decision: u16,
        alts: Vec<u16>,
        start_index: usize,
        stop_index: usize,
        span: TextSpan,
    },
    ContextSensitivity {
        decision: u16,
        alt: u16,
        start_index: usize,
        stop_index: usize,
    },
    PredicateSkipped {
        decision: u16,
    },
}

/// Everything one parse produced.
#[derive(Debug)]
pub struct ParseRun {
    pub tree: InterpTree,
    pub root: NodeId,
    pub errors: Vec<SyntaxError>,
    /// Raw buffer index of the first offending token, if any.
    pub first_error_index: Option<usize>,
    pub events: Vec<PredictionEvent>,
    /// Present when the run was profiled.
    pub info: Option<ParseInfo>,
}

struct Frame {
    follow: StateId,
    node: NodeId,
}

pub struct ParserInterpreter {
    atn: Arc<Atn>,
    opts: ParserOptions,
    override_decision: Option<DecisionOverride>,
    predictor: Predictor,
}

impl ParserInterpreter {
    pub fn new(atn: Arc<Atn>, opts: ParserOptions) -> ParserInterpreter {
        let predictor = Predictor::new(atn.decision_count());
        ParserInterpreter { atn, opts, override_decision: None, predictor }
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    pub fn set_override(&mut self, ov: Option<DecisionOverride>) {
        self.override_decision = ov;
    }

    /// Parses `start_rule` from the stream's current position to the
    /// rule's end. Syntax errors are reported in the run, not as `Err`.
    pub fn parse(&mut self, stream: &mut TokenStream, start_rule: u16) -> AtnResult<ParseRun> {
        let atn = Arc::clone(&self.atn);
        if start_rule as usize >= atn.rules().len() {
            return Err(AtnError::UndefinedRule(format!("rule #{start_rule}")));
        }
        let profile = self.opts.profile;
        let policy = self.opts.policy;
        let override_decision = self.override_decision;

        let parse_started = profile.then(Instant::now);
        let mut collector = profile.then(|| ProfileCollector::new(atn.decision_count()));
        let mut events: Vec<PredictionEvent> = Vec::new();
        let mut errors: Vec<SyntaxError> = Vec::new();
        let mut first_error_index: Option<usize> = None;
        let mut warned_predicates: HashSet<u16> = HashSet::new();
        // Decisions reached since the last consumed token. A repeat means
        // the machine is spinning on a nullable loop.
        let mut visited_decisions: HashSet<(u16, usize)> = HashSet::new();

        let mut tree = InterpTree::new();
        let root = tree.add_rule(None, start_rule);
        let mut node = root;
        let mut frames: Vec<Frame> = Vec::new();
        let mut state = atn.rule(start_rule).start;

        'parse: loop {
            let st = atn.state(state);
            if st.kind == StateKind::RuleStop {
                match frames.pop() {
                    Some(frame) => {
                        node = frame.node;
                        state = frame.follow;
                    }
                    None => break 'parse,
                }
                continue;
            }

            if let Some(decision) = st.decision {
                let raw = stream.index();
                if !visited_decisions.insert((decision, raw)) {
                    panic!("decision {decision} did not advance at token index {raw}");
                }
                let forced = override_decision
                    .filter(|ov| ov.decision == decision && ov.at_index == raw)
                    .map(|ov| ov.alt);
                let alt = match forced {
                    Some(alt) => {
                        tree.mark_override_root(node);
                        Some(alt)
                    }
                    None => {
                        let la_span = stream.lt(1).span;
                        let outer: Vec<StateId> = frames.iter().map(|f| f.follow).collect();
                        let started = profile.then(Instant::now);
                        let outcome =
                            self.predictor.predict(&atn, decision, stream.buffer(), raw, &outer);
                        if let Some(c) = collector.as_mut() {
                            let elapsed =
                                started.map(|s| s.elapsed().as_nanos() as u64).unwrap_or(0);
                            record_outcome(c, &atn, st.rule, decision, la_span, &outcome, elapsed);
                        }
                        if outcome.predicate_crossings > 0 && warned_predicates.insert(decision) {
                            tracing::warn!(
                                target: "magpie.interp",
                                decision,
                                "semantic predicate ignored; interpretation treats it as true"
                            );
                            events.push(PredictionEvent::PredicateSkipped { decision });
                        }
                        if outcome.context_sensitive {
                            events.push(PredictionEvent::ContextSensitivity {
                                decision,
                                alt: outcome.alt.unwrap_or(0),
                                start_index: outcome.start_index,
                                stop_index: outcome.stop_index,
                            });
                        }
                        if outcome.ambiguous() {
                            let span = stream
                                .buffer()
                                .get(outcome.start_index)
                                .span
                                .cover(stream.buffer().get(outcome.stop_index).span);
                            tracing::debug!(
                                target: "magpie.interp",
                                decision,
                                alts = ?outcome.ambig_alts,
                                "ambiguous input"
                            );
                            events.push(PredictionEvent::Ambiguity {
                                decision,
                                alts: outcome.ambig_alts.clone(),
                                start_index: outcome.start_index,
                                stop_index: outcome.stop_index,
                                span,
                            });
                        }
                        outcome.alt
                    }
                };
                let alt = match alt {
                    Some(alt) => alt,
                    None => {
                        let la = *stream.lt(1);
                        errors.push(SyntaxError::new(
                            format!("no viable alternative at input '{}'", stream.text_of(&la)),
                            la.span,
                        ));
                        first_error_index.get_or_insert(la.index as usize);
                        match policy {
                            ErrorPolicy::TrackAndBail => {
                                tree.add_error(node, la.index);
                                stream.seek(stream.size() - 1);
                                break 'parse;
                            }
                            ErrorPolicy::Recover => {
                                let outer: Vec<StateId> =
                                    frames.iter().map(|f| f.follow).collect();
                                let set = resync_set(&atn, state, &outer);
                                loop {
                                    let cur = *stream.lt(1);
                                    if cur.is_eof() || set.contains(&atn, cur.ty) {
                                        break;
                                    }
                                    let tok = stream.consume();
                                    visited_decisions.clear();
                                    tree.add_error(node, tok.index);
                                }
                                state = atn.rule(st.rule).stop;
                            }
                        }
                        continue 'parse;
                    }
                };
                if atn.rule(st.rule).entry_decision == Some(decision) {
                    tree.set_outer_alt(node, alt);
                }
                state = st.transitions[(alt - 1) as usize].target();
                continue;
            }

            debug_assert_eq!(st.transitions.len(), 1, "non-branch states are linear");
            let t = &st.transitions[0];
            match t {
                Transition::Epsilon(target) | Transition::Predicate { target, .. } => {
                    state = *target;
                }
                Transition::Rule { rule, target, follow } => {
                    frames.push(Frame { follow: *follow, node });
                    node = tree.add_rule(Some(node), *rule);
                    state = *target;
                }
                _ => {
                    let la = *stream.lt(1);
                    if t.matches(la.ty) {
                        let tok = stream.consume();
                        visited_decisions.clear();
                        tree.add_token(node, tok.index);
                        state = t.target();
                        continue;
                    }
                    match policy {
                        ErrorPolicy::TrackAndBail => {
                            errors.push(SyntaxError::new(
                                format!(
                                    "mismatched input '{}' expecting {}",
                                    stream.text_of(&la),
                                    expected_desc(&atn, t)
                                ),
                                la.span,
                            ));
                            first_error_index.get_or_insert(la.index as usize);
                            tree.add_error(node, la.index);
                            stream.seek(stream.size() - 1);
                            break 'parse;
                        }
                        ErrorPolicy::Recover => {
                            if !la.is_eof() && t.matches(stream.la(2)) {
                                errors.push(SyntaxError::new(
                                    format!(
                                        "extraneous input '{}' expecting {}",
                                        stream.text_of(&la),
                                        expected_desc(&atn, t)
                                    ),
                                    la.span,
                                ));
                                first_error_index.get_or_insert(la.index as usize);
                                let bad = stream.consume();
                                visited_decisions.clear();
                                tree.add_error(node, bad.index);
                            } else if let Some(ty) = synthesizable(t) {
                                errors.push(SyntaxError::new(
                                    format!(
                                        "missing {} at '{}'",
                                        expected_desc(&atn, t),
                                        stream.text_of(&la)
                                    ),
                                    la.span,
                                ));
                                first_error_index.get_or_insert(la.index as usize);
                                tree.add_missing(node, ty);
                                state = t.target();
                            } else {
                                errors.push(SyntaxError::new(
                                    format!(
                                        "mismatched input '{}' expecting {}",
                                        stream.text_of(&la),
                                        expected_desc(&atn, t)
                                    ),
                                    la.span,
                                ));
                                first_error_index.get_or_insert(la.index as usize);
                                let outer: Vec<StateId> =
                                    frames.iter().map(|f| f.follow).collect();
                                let set = resync_set(&atn, state, &outer);
                                loop {
                                    let cur = *stream.lt(1);
                                    if cur.is_eof() || set.contains(&atn, cur.ty) {
                                        break;
                                    }
                                    let tok = stream.consume();
                                    visited_decisions.clear();
                                    tree.add_error(node, tok.index);
                                }
                                if !t.matches(stream.la(1)) {
                                    state = atn.rule(st.rule).stop;
                                }
                            }
                        }
                    }
                }
            }
        }

        let info = collector.map(|mut c| {
            for d in 0..atn.decision_count() {
                c.decision_mut(d as u16).dfa_size = self.predictor.dfa_size(d as u16);
            }
            let elapsed = parse_started.map(|s| s.elapsed().as_nanos() as u64).unwrap_or(0);
            let input_tokens = stream
                .buffer()
                .tokens()
                .iter()
                .filter(|t| t.channel.is_default() && !t.is_eof())
                .count();
            c.finish(elapsed, input_tokens)
        });

        Ok(ParseRun { tree, root, errors, first_error_index, events, info })
    }
}

fn record_outcome(
    c: &mut ProfileCollector,
    atn: &Atn,
    rule: u16,
    decision: u16,
    la_span: TextSpan,
    outcome: &PredictOutcome,
    elapsed_ns: u64,
) {
    c.site(decision, DecisionSite { rule, rule_name: atn.rule_name(rule).to_string(), span: la_span });
    let d = c.decision_mut(decision);
    d.invocations += 1;
    d.time_ns += elapsed_ns;
    d.sll_dfa_transitions += outcome.sll_dfa_transitions;
    d.sll_atn_transitions += outcome.sll_atn_transitions;
    d.ll_atn_transitions += outcome.ll_atn_transitions;
    d.predicate_evals += outcome.predicate_crossings;
    if outcome.used_ll {
        d.ll_fallbacks += 1;
    }
    if outcome.context_sensitive {
        d.context_sensitivities += 1;
    }
    if outcome.ambiguous() {
        d.ambiguities += 1;
    }
    if outcome.alt.is_none() {
        d.errors += 1;
    }
    let event = |depth: u64, full_context: bool| LookEvent {
        decision,
        depth,
        start_index: outcome.start_index,
        stop_index: outcome.stop_index,
        full_context,
    };
    c.record_look(event(outcome.sll_look, false));
    if outcome.used_ll {
        c.record_look(event(outcome.ll_look, true));
    }
}

fn expected_desc(atn: &Atn, t: &Transition) -> String {
    match t {
        Transition::Atom { ty, .. } => atn.token_name(*ty).to_string(),
        Transition::Set { set, .. } => {
            let names: Vec<&str> = set.iter().map(|ty| atn.token_name(ty)).collect();
            format!("{{{}}}", names.join(", "))
        }
        _ => "a token".to_string(),
    }
}

/// A token type recovery may fabricate for this edge, if any.
fn synthesizable(t: &Transition) -> Option<TokenType> {
    match t {
        Transition::Atom { ty, .. } => Some(*ty),
        Transition::Set { set, .. } => set.iter().next(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atn::{AtnBuilder, Elem};
    use crate::token::{Channel, Token, TokenBuffer};
    use pretty_assertions::assert_eq;

    const ID: u16 = 0;
    const DOT: u16 = 1;
    const LPAREN: u16 = 2;
    const RPAREN: u16 = 3;
    const SEMI: u16 = 4;
    const PLUS: u16 = 5;

    fn dotted() -> Arc<Atn> {
        let mut b = AtnBuilder::new(vec!["ID", "DOT", "LPAREN", "RPAREN", "SEMI", "PLUS"]);
        b.rule(
            "s",
            vec![vec![Elem::Rule("e".into()), Elem::Token(TokenType(SEMI)), Elem::Token(TokenType::EOF)]],
        );
        b.rule(
            "e",
            vec![
                vec![
                    Elem::Token(TokenType(ID)),
                    Elem::Token(TokenType(DOT)),
                    Elem::Token(TokenType(ID)),
                ],
                vec![
                    Elem::Token(TokenType(ID)),
                    Elem::Token(TokenType(LPAREN)),
                    Elem::Token(TokenType(RPAREN)),
                ],
            ],
        );
        Arc::new(b.build().unwrap())
    }

    fn stream(text: &str, spec: &[(u16, u32, u32)]) -> TokenStream {
        let mut buf = TokenBuffer::new(text.into());
        for &(ty, start, end) in spec {
            buf.push(Token::new(TokenType(ty), TextSpan::new(start, end), Channel::DEFAULT));
        }
        buf.push(Token::new(TokenType::EOF, TextSpan::empty(text.len() as u32), Channel::DEFAULT));
        TokenStream::new(buf)
    }

    fn dotted_stream() -> TokenStream {
        stream("a.b;", &[(ID, 0, 1), (DOT, 1, 2), (ID, 2, 3), (SEMI, 3, 4)])
    }

    #[test]
    fn builds_the_expected_tree() {
        let atn = dotted();
        let mut stream = dotted_stream();
        let mut parser = ParserInterpreter::new(Arc::clone(&atn), ParserOptions::default());
        let run = parser.parse(&mut stream, 0).unwrap();
        assert_eq!(run.tree.render(run.root, &atn, stream.buffer()), "(s (e:1 a . b) ; <EOF>)");
        assert!(run.errors.is_empty());
        assert_eq!(run.first_error_index, None);
        assert!(run.events.is_empty());
    }

    #[test]
    fn missing_token_is_synthesized() {
        let atn = dotted();
        let mut stream = stream("a.;", &[(ID, 0, 1), (DOT, 1, 2), (SEMI, 2, 3)]);
        let mut parser = ParserInterpreter::new(Arc::clone(&atn), ParserOptions::default());
        let run = parser.parse(&mut stream, 0).unwrap();
        assert_eq!(
            run.tree.render(run.root, &atn, stream.buffer()),
            "(s (e:1 a . <missing ID>) ; <EOF>)"
        );
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].message, "missing ID at ';'");
        assert_eq!(run.first_error_index, Some(2));
    }

    #[test]
    fn extraneous_token_is_deleted() {
        let atn = dotted();
        let mut stream = stream(
            "a.+b;",
            &[(ID, 0, 1), (DOT, 1, 2), (PLUS, 2, 3), (ID, 3, 4), (SEMI, 4, 5)],
        );
        let mut parser = ParserInterpreter::new(Arc::clone(&atn), ParserOptions::default());
        let run = parser.parse(&mut stream, 0).unwrap();
        assert_eq!(
            run.tree.render(run.root, &atn, stream.buffer()),
            "(s (e:1 a . <error +> b) ; <EOF>)"
        );
        assert_eq!(run.errors[0].message, "extraneous input '+' expecting ID");
        assert_eq!(run.first_error_index, Some(2));
    }

    #[test]
    fn no_viable_alternative_resynchronizes() {
        let atn = dotted();
        let mut stream = stream(";", &[(SEMI, 0, 1)]);
        let mut parser = ParserInterpreter::new(Arc::clone(&atn), ParserOptions::default());
        let run = parser.parse(&mut stream, 0).unwrap();
        assert_eq!(
            run.tree.render(run.root, &atn, stream.buffer()),
            "(s (e <error ;>) <missing SEMI> <EOF>)"
        );
        assert_eq!(run.errors.len(), 2);
        assert_eq!(run.errors[0].message, "no viable alternative at input ';'");
        assert_eq!(run.first_error_index, Some(0));
    }

    #[test]
    fn override_with_bailout_stops_at_first_error() {
        let atn = dotted();
        let mut stream = dotted_stream();
        let mut parser = ParserInterpreter::new(
            Arc::clone(&atn),
            ParserOptions { profile: false, policy: ErrorPolicy::TrackAndBail },
        );
        parser.set_override(Some(DecisionOverride { decision: 0, at_index: 0, alt: 2 }));
        let run = parser.parse(&mut stream, 0).unwrap();
        assert_eq!(run.first_error_index, Some(1));
        assert_eq!(run.errors[0].message, "mismatched input '.' expecting LPAREN");
        assert_eq!(run.tree.render(run.root, &atn, stream.buffer()), "(s (e:2 a <error .>))");
        let marked = run.tree.find_override_root(run.root).unwrap();
        assert_eq!(
            run.tree.render(marked, &atn, stream.buffer()),
            "(e:2 a <error .>)"
        );
    }

    #[test]
    fn ambiguity_resolves_to_lowest_alternative() {
        const A: u16 = 0;
        let mut b = AtnBuilder::new(vec!["A"]);
        b.rule("s", vec![vec![Elem::Rule("r".into()), Elem::Token(TokenType::EOF)]]);
        b.rule("r", vec![vec![Elem::Token(TokenType(A))], vec![Elem::Token(TokenType(A))]]);
        let atn = Arc::new(b.build().unwrap());
        let mut stream = stream("A", &[(A, 0, 1)]);
        let mut parser = ParserInterpreter::new(
            Arc::clone(&atn),
            ParserOptions { profile: true, policy: ErrorPolicy::Recover },
        );
        let run = parser.parse(&mut stream, 0).unwrap();
        assert_eq!(run.tree.render(run.root, &atn, stream.buffer()), "(s (r:1 A) <EOF>)");
        assert_eq!(
            run.events,
            vec![PredictionEvent::Ambiguity {
                decision: 0,
                alts: vec![1, 2],
                start_index: 0,
                stop_index: 0,
                span: TextSpan::new(0, 1),
            }]
        );
        let info = run.info.unwrap();
        assert_eq!(info.decision(0).ambiguities, 1);
        assert_eq!(info.decision(0).ll_fallbacks, 1);
        assert_eq!(info.total_ll_fallbacks(), 1);
    }

    #[test]
    fn profile_reports_lookahead_and_memoization() {
        let atn = dotted();
        let opts = ParserOptions { profile: true, policy: ErrorPolicy::Recover };
        let mut parser = ParserInterpreter::new(Arc::clone(&atn), opts);

        let mut s1 = dotted_stream();
        let cold = parser.parse(&mut s1, 0).unwrap().info.unwrap();
        let d = cold.decision(0);
        assert_eq!(d.invocations, 1);
        assert_eq!((d.sll_min_look, d.sll_max_look), (2, 2));
        let ev = d.sll_max_look_event.as_ref().unwrap();
        assert_eq!((ev.start_index, ev.stop_index, ev.full_context), (0, 1, false));
        assert_eq!(d.sll_atn_transitions, 2);
        assert_eq!(d.sll_dfa_transitions, 0);
        assert_eq!(d.errors, 0);
        assert_eq!(cold.input_tokens, 4);
        assert_eq!(cold.lookahead_burden(), 0.5);
        let site = cold.sites[0].as_ref().unwrap();
        assert_eq!(site.rule_name, "e");
        assert_eq!(site.span, TextSpan::new(0, 1));

        let mut s2 = dotted_stream();
        let warm = parser.parse(&mut s2, 0).unwrap().info.unwrap();
        let d = warm.decision(0);
        assert_eq!(d.sll_atn_transitions, 0);
        assert_eq!(d.sll_dfa_transitions, 2);
        assert!(d.dfa_size >= 3);
    }

    #[test]
    fn profiling_leaves_results_untouched() {
        let atn = dotted();
        let mut plain_parser = ParserInterpreter::new(Arc::clone(&atn), ParserOptions::default());
        let mut profiled_parser = ParserInterpreter::new(
            Arc::clone(&atn),
            ParserOptions { profile: true, policy: ErrorPolicy::Recover },
        );
        let mut s1 = stream("a.;", &[(ID, 0, 1), (DOT, 1, 2), (SEMI, 2, 3)]);
        let mut s2 = stream("a.;", &[(ID, 0, 1), (DOT, 1, 2), (SEMI, 2, 3)]);
        let plain = plain_parser.parse(&mut s1, 0).unwrap();
        let profiled = profiled_parser.parse(&mut s2, 0).unwrap();
        assert_eq!(
            plain.tree.render(plain.root, &atn, s1.buffer()),
            profiled.tree.render(profiled.root, &atn, s2.buffer())
        );
        assert_eq!(plain.errors, profiled.errors);
        assert_eq!(plain.first_error_index, profiled.first_error_index);
        assert!(plain.info.is_none());
        assert!(profiled.info.is_some());
    }

    #[test]
    #[should_panic(expected = "did not advance")]
    fn nullable_loop_is_detected() {
        const A: u16 = 0;
        let mut b = AtnBuilder::new(vec!["A"]);
        b.rule(
            "s",
            vec![vec![Elem::Star(vec![Elem::Opt(vec![Elem::Token(TokenType(A))])])]],
        );
        let atn = Arc::new(b.build().unwrap());
        let mut stream = stream("", &[]);
        let mut parser = ParserInterpreter::new(atn, ParserOptions::default());
        let _ = parser.parse(&mut stream, 0);
    }

    #[test]
    fn undefined_start_rule_is_rejected() {
        let atn = dotted();
        let mut stream = dotted_stream();
        let mut parser = ParserInterpreter::new(atn, ParserOptions::default());
        assert!(parser.parse(&mut stream, 9).is_err());
    }
}
