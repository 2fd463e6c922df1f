//! Automaton model for interpretive lexing and parsing.
//!
//! Compiled grammars arrive as already-built automata: the tool that turns
//! grammar text into these tables is an external concern. [`AtnBuilder`]
//! and [`LexerAtnBuilder`] are the assembly surface; they validate the
//! description up front so the interpreters can index states unchecked.

use std::collections::HashMap;

use crate::error::{AtnError, AtnResult};
use crate::token::TokenType;

pub type StateId = u32;

/// Mode 0 of every lexer automaton.
pub const DEFAULT_MODE: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Basic,
    RuleStart,
    RuleStop,
}

#[derive(Debug, Clone)]
pub struct AtnState {
    pub rule: u16,
    pub kind: StateKind,
    /// Set when this state is a branch point; its transitions are then
    /// all epsilon, one per alternative, in alternative order.
    pub decision: Option<u16>,
    pub transitions: Vec<Transition>,
}

/// Sorted, deduplicated token-type set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet(Vec<TokenType>);

impl TokenSet {
    pub fn new(mut types: Vec<TokenType>) -> TokenSet {
        types.sort();
        types.dedup();
        TokenSet(types)
    }

    pub fn contains(&self, ty: TokenType) -> bool {
        self.0.binary_search(&ty).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = TokenType> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone)]
pub enum Transition {
    Epsilon(StateId),
    Atom { ty: TokenType, target: StateId },
    Set { set: TokenSet, target: StateId },
    NotSet { set: TokenSet, target: StateId },
    /// Call `rule`; `target` is the rule's start state, `follow` the state
    /// to resume in once the rule returns.
    Rule { rule: u16, target: StateId, follow: StateId },
    Wildcard(StateId),
    /// Semantic predicate reference. Interpretation never evaluates the
    /// predicate; prediction treats the edge as epsilon and records the
    /// crossing.
    Predicate { index: u16, target: StateId },
}

impl Transition {
    pub fn target(&self) -> StateId {
        match *self {
            Transition::Epsilon(t)
            | Transition::Atom { target: t, .. }
            | Transition::Set { target: t, .. }
            | Transition::NotSet { target: t, .. }
            | Transition::Rule { target: t, .. }
            | Transition::Wildcard(t)
            | Transition::Predicate { target: t, .. } => t,
        }
    }

    /// Whether this edge consumes a token when taken.
    pub fn consumes_input(&self) -> bool {
        matches!(
            self,
            Transition::Atom { .. }
                | Transition::Set { .. }
                | Transition::NotSet { .. }
                | Transition::Wildcard(_)
        )
    }

    /// Whether this consuming edge matches `ty`. Wildcard and negated
    /// sets never match EOF; an explicit `Atom` on EOF does.
    pub fn matches(&self, ty: TokenType) -> bool {
        match self {
            Transition::Atom { ty: t, .. } => *t == ty,
            Transition::Set { set, .. } => set.contains(ty),
            Transition::NotSet { set, .. } => !ty.is_eof() && !ty.is_bad() && !set.contains(ty),
            Transition::Wildcard(_) => !ty.is_eof() && !ty.is_bad(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleInfo {
    pub name: String,
    pub start: StateId,
    pub stop: StateId,
    /// The decision choosing among this rule's top-level alternatives,
    /// when it has more than one. Resolving it fixes the invocation's
    /// outer alternative number.
    pub entry_decision: Option<u16>,
}

/// A parser automaton: states, rules, the decision table, and the token
/// vocabulary used for diagnostics and tree rendering.
#[derive(Debug, Clone)]
pub struct Atn {
    states: Vec<AtnState>,
    rules: Vec<RuleInfo>,
    decisions: Vec<StateId>,
    token_names: Vec<String>,
    /// Reverse call index: for each rule, the follow states of every call
    /// site. Prediction pops truncated stacks through this table.
    followers: Vec<Vec<StateId>>,
}

impl Atn {
    pub fn state(&self, id: StateId) -> &AtnState {
        &self.states[id as usize]
    }

    pub fn rules(&self) -> &[RuleInfo] {
        &self.rules
    }

    pub fn rule(&self, rule: u16) -> &RuleInfo {
        &self.rules[rule as usize]
    }

    pub fn rule_index(&self, name: &str) -> Option<u16> {
        self.rules.iter().position(|r| r.name == name).map(|i| i as u16)
    }

    pub fn rule_name(&self, rule: u16) -> &str {
        &self.rules[rule as usize].name
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    pub fn decision_state(&self, decision: u16) -> StateId {
        self.decisions[decision as usize]
    }

    pub fn decision_alt_count(&self, decision: u16) -> usize {
        self.state(self.decision_state(decision)).transitions.len()
    }

    pub fn followers(&self, rule: u16) -> &[StateId] {
        &self.followers[rule as usize]
    }

    pub fn token_name(&self, ty: TokenType) -> &str {
        if ty.is_eof() {
            return "<EOF>";
        }
        if ty.is_bad() {
            return "<bad>";
        }
        self.token_names.get(ty.0 as usize).map(String::as_str).unwrap_or("<unknown>")
    }
}

/// Alternative body element for [`AtnBuilder::rule`].
#[derive(Debug, Clone)]
pub enum Elem {
    Token(TokenType),
    Rule(String),
    Set(Vec<TokenType>),
    Not(Vec<TokenType>),
    Any,
    Opt(Vec<Elem>),
    Star(Vec<Elem>),
    Pred(u16),
}

/// Assembles a validated parser [`Atn`].
///
/// Left-recursive rule shapes are not expressible here; grammar
/// compilers rewrite those into loops before emitting an automaton, and
/// that rewrite happens upstream of this crate.
pub struct AtnBuilder {
    token_names: Vec<String>,
    rules: Vec<(String, Vec<Vec<Elem>>)>,
}

impl AtnBuilder {
    pub fn new<I, S>(token_names: I) -> AtnBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AtnBuilder { token_names: token_names.into_iter().map(Into::into).collect(), rules: Vec::new() }
    }

    pub fn rule(&mut self, name: impl Into<String>, alts: Vec<Vec<Elem>>) -> &mut AtnBuilder {
        self.rules.push((name.into(), alts));
        self
    }

    pub fn build(self) -> AtnResult<Atn> {
        if self.rules.is_empty() {
            return Err(AtnError::Empty);
        }
        let mut index: HashMap<String, u16> = HashMap::new();
        for (i, (name, alts)) in self.rules.iter().enumerate() {
            if index.insert(name.clone(), i as u16).is_some() {
                return Err(AtnError::DuplicateRule(name.clone()));
            }
            if alts.is_empty() {
                return Err(AtnError::EmptyRule(name.clone()));
            }
        }

        let mut b = Assembly {
            states: Vec::new(),
            decisions: Vec::new(),
            rule_index: &index,
            token_count: self.token_names.len(),
        };

        // Pre-allocate start/stop pairs so rule call edges resolve in one pass.
        let mut rules: Vec<RuleInfo> = Vec::with_capacity(self.rules.len());
        for (i, (name, _)) in self.rules.iter().enumerate() {
            let start = b.state(i as u16, StateKind::RuleStart);
            let stop = b.state(i as u16, StateKind::RuleStop);
            rules.push(RuleInfo { name: name.clone(), start, stop, entry_decision: None });
        }

        for (i, (_, alts)) in self.rules.into_iter().enumerate() {
            let rule = i as u16;
            let (start, stop) = (rules[i].start, rules[i].stop);
            if alts.len() == 1 {
                let end = b.chain(rule, start, &alts[0])?;
                b.epsilon(end, stop);
            } else {
                let decision = b.new_decision(rule);
                rules[i].entry_decision = Some(decision.1);
                b.epsilon(start, decision.0);
                for alt in &alts {
                    let alt_start = b.state(rule, StateKind::Basic);
                    b.push_alt(decision.0, alt_start);
                    let end = b.chain(rule, alt_start, alt)?;
                    b.epsilon(end, stop);
                }
            }
        }

        let mut followers = vec![Vec::new(); rules.len()];
        for state in &b.states {
            for t in &state.transitions {
                if let Transition::Rule { rule, follow, .. } = *t {
                    followers[rule as usize].push(follow);
                }
            }
        }

        Ok(Atn {
            states: b.states,
            rules,
            decisions: b.decisions,
            token_names: self.token_names,
            followers,
        })
    }
}

struct Assembly<'a> {
    states: Vec<AtnState>,
    decisions: Vec<StateId>,
    rule_index: &'a HashMap<String, u16>,
    token_count: usize,
}

impl Assembly<'_> {
    fn state(&mut self, rule: u16, kind: StateKind) -> StateId {
        let id = self.states.len() as StateId;
        self.states.push(AtnState { rule, kind, decision: None, transitions: Vec::new() });
        id
    }

    fn new_decision(&mut self, rule: u16) -> (StateId, u16) {
        let id = self.state(rule, StateKind::Basic);
        let decision = self.decisions.len() as u16;
        self.states[id as usize].decision = Some(decision);
        self.decisions.push(id);
        (id, decision)
    }

    fn epsilon(&mut self, from: StateId, to: StateId) {
        self.states[from as usize].transitions.push(Transition::Epsilon(to));
    }

    fn push_alt(&mut self, decision: StateId, to: StateId) {
        self.states[decision as usize].transitions.push(Transition::Epsilon(to));
    }

    fn check_type(&self, ty: TokenType) -> AtnResult<TokenType> {
        if !ty.is_eof() && !ty.is_bad() && ty.0 as usize >= self.token_count {
            return Err(AtnError::TokenOutOfRange(ty.0));
        }
        Ok(ty)
    }

    fn check_set(&self, types: &[TokenType]) -> AtnResult<TokenSet> {
        for ty in types {
            self.check_type(*ty)?;
        }
        Ok(TokenSet::new(types.to_vec()))
    }

    fn chain(&mut self, rule: u16, from: StateId, elems: &[Elem]) -> AtnResult<StateId> {
        let mut cur = from;
        for elem in elems {
            cur = self.element(rule, cur, elem)?;
        }
        Ok(cur)
    }

    fn element(&mut self, rule: u16, cur: StateId, elem: &Elem) -> AtnResult<StateId> {
        let next = match elem {
            Elem::Token(ty) => {
                let target = self.state(rule, StateKind::Basic);
                let ty = self.check_type(*ty)?;
                self.states[cur as usize].transitions.push(Transition::Atom { ty, target });
                target
            }
            Elem::Set(types) => {
                let target = self.state(rule, StateKind::Basic);
                let set = self.check_set(types)?;
                self.states[cur as usize].transitions.push(Transition::Set { set, target });
                target
            }
            Elem::Not(types) => {
                let target = self.state(rule, StateKind::Basic);
                let set = self.check_set(types)?;
                self.states[cur as usize].transitions.push(Transition::NotSet { set, target });
                target
            }
            Elem::Any => {
                let target = self.state(rule, StateKind::Basic);
                self.states[cur as usize].transitions.push(Transition::Wildcard(target));
                target
            }
            Elem::Pred(index) => {
                let target = self.state(rule, StateKind::Basic);
                self.states[cur as usize]
                    .transitions
                    .push(Transition::Predicate { index: *index, target });
                target
            }
            Elem::Rule(name) => {
                let callee = *self
                    .rule_index
                    .get(name.as_str())
                    .ok_or_else(|| AtnError::UndefinedRule(name.clone()))?;
                let follow = self.state(rule, StateKind::Basic);
                let target = self.rule_start(callee);
                self.states[cur as usize]
                    .transitions
                    .push(Transition::Rule { rule: callee, target, follow });
                follow
            }
            Elem::Opt(body) => {
                let (decision, _) = self.new_decision(rule);
                self.epsilon(cur, decision);
                let join = self.state(rule, StateKind::Basic);
                let body_start = self.state(rule, StateKind::Basic);
                self.push_alt(decision, body_start);
                let body_end = self.chain(rule, body_start, body)?;
                self.epsilon(body_end, join);
                self.push_alt(decision, join);
                join
            }
            Elem::Star(body) => {
                let (decision, _) = self.new_decision(rule);
                self.epsilon(cur, decision);
                let exit = self.state(rule, StateKind::Basic);
                let body_start = self.state(rule, StateKind::Basic);
                self.push_alt(decision, body_start);
                let body_end = self.chain(rule, body_start, body)?;
                self.epsilon(body_end, decision);
                self.push_alt(decision, exit);
                exit
            }
        };
        Ok(next)
    }

    fn rule_start(&self, rule: u16) -> StateId {
        // Start/stop pairs were allocated first, two states per rule.
        rule as StateId * 2
    }
}

// ---------------------------------------------------------------------------
// Lexer automaton
// ---------------------------------------------------------------------------

/// Character-class matcher: a set of inclusive ranges, possibly negated.
/// A negated empty set matches any character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharSet {
    ranges: Vec<(char, char)>,
    negated: bool,
}

impl CharSet {
    pub fn ranges(ranges: Vec<(char, char)>) -> CharSet {
        CharSet { ranges, negated: false }
    }

    pub fn negated(ranges: Vec<(char, char)>) -> CharSet {
        CharSet { ranges, negated: true }
    }

    pub fn single(c: char) -> CharSet {
        CharSet::ranges(vec![(c, c)])
    }

    pub fn any() -> CharSet {
        CharSet::negated(Vec::new())
    }

    pub fn contains(&self, c: char) -> bool {
        let inside = self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
        inside != self.negated
    }
}

#[derive(Debug, Clone)]
pub enum CharTransition {
    Epsilon(StateId),
    Sym { set: CharSet, target: StateId },
}

impl CharTransition {
    pub fn target(&self) -> StateId {
        match *self {
            CharTransition::Epsilon(t) | CharTransition::Sym { target: t, .. } => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LexerAtnState {
    pub transitions: Vec<CharTransition>,
}

/// Side effect executed when a lexer rule accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexerCommand {
    /// Demote the token to the hidden channel. The token is still
    /// emitted: hosts need every byte of the buffer tiled by tokens.
    Skip,
    Channel(u8),
    Type(TokenType),
    PushMode(u16),
    PopMode,
    Mode(u16),
}

#[derive(Debug, Clone)]
pub struct LexerRule {
    pub name: String,
    pub ty: TokenType,
    pub commands: Vec<LexerCommand>,
    pub start: StateId,
    pub accept: StateId,
}

#[derive(Debug, Clone)]
pub struct LexerMode {
    pub name: String,
    /// Rule ids in declaration order; earlier rules win length ties.
    pub rules: Vec<u16>,
}

/// A lexer automaton: one NFA per mode, maximal-munch simulation.
#[derive(Debug, Clone)]
pub struct LexerAtn {
    states: Vec<LexerAtnState>,
    rules: Vec<LexerRule>,
    modes: Vec<LexerMode>,
}

impl LexerAtn {
    pub fn state(&self, id: StateId) -> &LexerAtnState {
        &self.states[id as usize]
    }

    pub fn rule(&self, rule: u16) -> &LexerRule {
        &self.rules[rule as usize]
    }

    pub fn mode(&self, mode: u16) -> &LexerMode {
        &self.modes[mode as usize]
    }

    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }
}

/// Pattern element for [`LexerAtnBuilder::rule`].
#[derive(Debug, Clone)]
pub enum CharElem {
    Ch(char),
    Range(char, char),
    Set(Vec<(char, char)>),
    NotSet(Vec<(char, char)>),
    Any,
    Opt(Vec<CharElem>),
    Star(Vec<CharElem>),
    Plus(Vec<CharElem>),
}

/// `"abc"` as a sequence of single-character matches.
pub fn literal(text: &str) -> Vec<CharElem> {
    text.chars().map(CharElem::Ch).collect()
}

pub struct LexerAtnBuilder {
    modes: Vec<(String, Vec<(String, TokenType, Vec<CharElem>, Vec<LexerCommand>)>)>,
}

impl Default for LexerAtnBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LexerAtnBuilder {
    pub fn new() -> LexerAtnBuilder {
        LexerAtnBuilder { modes: vec![("DEFAULT_MODE".to_owned(), Vec::new())] }
    }

    pub fn mode(&mut self, name: impl Into<String>) -> u16 {
        self.modes.push((name.into(), Vec::new()));
        (self.modes.len() - 1) as u16
    }

    pub fn rule(
        &mut self,
        mode: u16,
        name: impl Into<String>,
        ty: TokenType,
        pattern: Vec<CharElem>,
        commands: Vec<LexerCommand>,
    ) -> &mut LexerAtnBuilder {
        self.modes[mode as usize].1.push((name.into(), ty, pattern, commands));
        self
    }

    pub fn build(self) -> AtnResult<LexerAtn> {
        let mode_count = self.modes.len() as u16;
        let mut states: Vec<LexerAtnState> = Vec::new();
        let mut rules: Vec<LexerRule> = Vec::new();
        let mut modes: Vec<LexerMode> = Vec::new();

        for (mode_name, mode_rules) in self.modes {
            let mut rule_ids = Vec::with_capacity(mode_rules.len());
            for (name, ty, pattern, commands) in mode_rules {
                if pattern.is_empty() || seq_nullable(&pattern) {
                    return Err(AtnError::NullableLexerRule(name));
                }
                for command in &commands {
                    match command {
                        LexerCommand::PushMode(m) | LexerCommand::Mode(m) if *m >= mode_count => {
                            return Err(AtnError::UndefinedMode(*m));
                        }
                        _ => {}
                    }
                }
                let start = new_char_state(&mut states);
                let accept = build_char_chain(&mut states, start, &pattern);
                rule_ids.push(rules.len() as u16);
                rules.push(LexerRule { name, ty, commands, start, accept });
            }
            modes.push(LexerMode { name: mode_name, rules: rule_ids });
        }

        if rules.is_empty() {
            return Err(AtnError::Empty);
        }
        Ok(LexerAtn { states, rules, modes })
    }
}

fn seq_nullable(seq: &[CharElem]) -> bool {
    seq.iter().all(|e| match e {
        CharElem::Opt(_) | CharElem::Star(_) => true,
        CharElem::Plus(body) => seq_nullable(body),
        _ => false,
    })
}

fn new_char_state(states: &mut Vec<LexerAtnState>) -> StateId {
    let id = states.len() as StateId;
    states.push(LexerAtnState { transitions: Vec::new() });
    id
}

fn build_char_chain(states: &mut Vec<LexerAtnState>, from: StateId, seq: &[CharElem]) -> StateId {
    let mut cur = from;
    for elem in seq {
        cur = build_char_elem(states, cur, elem);
    }
    cur
}

fn build_char_elem(states: &mut Vec<LexerAtnState>, cur: StateId, elem: &CharElem) -> StateId {
    let sym = |states: &mut Vec<LexerAtnState>, cur: StateId, set: CharSet| {
        let target = new_char_state(states);
        states[cur as usize].transitions.push(CharTransition::Sym { set, target });
        target
    };
    match elem {
        CharElem::Ch(c) => sym(states, cur, CharSet::single(*c)),
        CharElem::Range(lo, hi) => sym(states, cur, CharSet::ranges(vec![(*lo, *hi)])),
        CharElem::Set(ranges) => sym(states, cur, CharSet::ranges(ranges.clone())),
        CharElem::NotSet(ranges) => sym(states, cur, CharSet::negated(ranges.clone())),
        CharElem::Any => sym(states, cur, CharSet::any()),
        CharElem::Opt(body) => {
            let join = new_char_state(states);
            let body_end = build_char_chain(states, cur, body);
            states[body_end as usize].transitions.push(CharTransition::Epsilon(join));
            states[cur as usize].transitions.push(CharTransition::Epsilon(join));
            join
        }
        CharElem::Star(body) => {
            let head = new_char_state(states);
            let exit = new_char_state(states);
            states[cur as usize].transitions.push(CharTransition::Epsilon(head));
            let body_end = build_char_chain(states, head, body);
            states[body_end as usize].transitions.push(CharTransition::Epsilon(head));
            states[head as usize].transitions.push(CharTransition::Epsilon(exit));
            exit
        }
        CharElem::Plus(body) => {
            let body_end = build_char_chain(states, cur, body);
            let exit = new_char_state(states);
            states[body_end as usize].transitions.push(CharTransition::Epsilon(exit));
            // Loop back for one-or-more.
            let again = build_char_chain(states, body_end, body);
            states[again as usize].transitions.push(CharTransition::Epsilon(body_end));
            exit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: TokenType = TokenType(0);
    const B: TokenType = TokenType(1);

    #[test]
    fn rule_calls_resolve_and_followers_fill() {
        let mut b = AtnBuilder::new(["A", "B"]);
        b.rule("s", vec![vec![Elem::Rule("r".into()), Elem::Token(B)]]);
        b.rule("r", vec![vec![Elem::Token(A)], vec![Elem::Token(B)]]);
        let atn = b.build().unwrap();

        let r = atn.rule_index("r").unwrap();
        assert_eq!(atn.followers(r).len(), 1);
        assert_eq!(atn.rule(r).entry_decision, Some(0));
        assert_eq!(atn.decision_alt_count(0), 2);
        // Single-alt rules get no entry decision.
        let s = atn.rule_index("s").unwrap();
        assert_eq!(atn.rule(s).entry_decision, None);
    }

    #[test]
    fn undefined_rule_is_rejected() {
        let mut b = AtnBuilder::new(["A"]);
        b.rule("s", vec![vec![Elem::Rule("missing".into())]]);
        assert_eq!(b.build().unwrap_err(), AtnError::UndefinedRule("missing".into()));
    }

    #[test]
    fn token_out_of_vocabulary_is_rejected() {
        let mut b = AtnBuilder::new(["A"]);
        b.rule("s", vec![vec![Elem::Token(TokenType(7))]]);
        assert_eq!(b.build().unwrap_err(), AtnError::TokenOutOfRange(7));
    }

    #[test]
    fn nullable_lexer_rule_is_rejected() {
        let mut b = LexerAtnBuilder::new();
        b.rule(DEFAULT_MODE, "WS", TokenType(0), vec![CharElem::Star(vec![CharElem::Ch(' ')])], vec![]);
        assert_eq!(b.build().unwrap_err(), AtnError::NullableLexerRule("WS".into()));
    }

    #[test]
    fn lexer_mode_command_target_checked() {
        let mut b = LexerAtnBuilder::new();
        b.rule(
            DEFAULT_MODE,
            "OPEN",
            TokenType(0),
            literal("["),
            vec![LexerCommand::PushMode(3)],
        );
        assert_eq!(b.build().unwrap_err(), AtnError::UndefinedMode(3));
    }

    #[test]
    fn charset_negation() {
        let ws = CharSet::ranges(vec![(' ', ' '), ('\t', '\t')]);
        assert!(ws.contains(' '));
        assert!(!ws.contains('x'));
        let not_quote = CharSet::negated(vec![('\'', '\'')]);
        assert!(not_quote.contains('x'));
        assert!(!not_quote.contains('\''));
        assert!(CharSet::any().contains('\u{1F600}'));
    }
}
