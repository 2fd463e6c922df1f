//! The modal-lexer contract and the lexer interpreter.
//!
//! [`ModalLexer`] is the seam between any mode-stack scanner and the
//! editor adaptor layer: scanners expose their automaton position as a
//! [`ModeState`] snapshot and can be restarted from one mid-buffer.

use std::sync::Arc;

use crate::atn::{CharTransition, LexerAtn, LexerCommand, StateId, DEFAULT_MODE};
use crate::error::SyntaxError;
use crate::token::{Channel, TextSpan, Token, TokenBuffer, TokenType};

/// A scan window over an editor buffer. Offsets are absolute byte
/// positions into `text`, so tokens produced from a window line up with
/// tokens produced from a full scan.
#[derive(Debug, Clone)]
pub struct LexerInput {
    text: Arc<str>,
    start: usize,
    end: usize,
}

impl LexerInput {
    pub fn new(text: Arc<str>) -> LexerInput {
        let end = text.len();
        LexerInput { text, start: 0, end }
    }

    pub fn window(text: Arc<str>, start: usize, end: usize) -> LexerInput {
        assert!(start <= end && end <= text.len(), "window {start}..{end} out of bounds");
        assert!(text.is_char_boundary(start) && text.is_char_boundary(end));
        LexerInput { text, start, end }
    }

    pub fn text(&self) -> &Arc<str> {
        &self.text
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }
}

/// Automaton position of a modal scanner between two tokens: the current
/// mode, the pushed-mode stack, and one extra discriminator for scanners
/// whose behavior depends on more than the raw mode (the grammar scanner
/// dispatches `[` on whether it sits in a lexer or parser rule).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModeState {
    pub mode: u16,
    pub stack: Vec<u16>,
    pub context: u16,
}

impl ModeState {
    pub fn initial() -> ModeState {
        ModeState { mode: DEFAULT_MODE, stack: Vec::new(), context: 0 }
    }
}

impl Default for ModeState {
    fn default() -> Self {
        ModeState::initial()
    }
}

/// A scanner that can be stopped at any token boundary and restarted
/// there from a [`ModeState`] snapshot.
///
/// `next_token` returns an EOF-typed token once the window is exhausted
/// and keeps returning it; it never returns `None`, because even an empty
/// window yields the sentinel.
pub trait ModalLexer {
    fn start(&mut self, input: LexerInput, state: &ModeState);
    fn next_token(&mut self) -> Token;
    fn snapshot(&self) -> ModeState;
}

/// Case folding applied while matching (never to the stored text), for
/// grammars written against a single case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseTransform {
    #[default]
    None,
    Upper,
    Lower,
}

impl CaseTransform {
    fn fold(self, c: char) -> char {
        // Multi-char foldings would shift spans; leave those chars alone.
        let mut it: Box<dyn Iterator<Item = char>> = match self {
            CaseTransform::None => return c,
            CaseTransform::Upper => Box::new(c.to_uppercase()),
            CaseTransform::Lower => Box::new(c.to_lowercase()),
        };
        match (it.next(), it.next()) {
            (Some(f), None) => f,
            _ => c,
        }
    }
}

/// Maximal-munch NFA simulation over a [`LexerAtn`].
///
/// Longest match wins; ties go to the rule declared first in the current
/// mode. Unmatched input becomes a single bad token covering the whole
/// run of characters that cannot start any token, plus a diagnostic; the
/// scan then continues.
pub struct LexerInterpreter {
    atn: Arc<LexerAtn>,
    case: CaseTransform,
    text: Arc<str>,
    pos: usize,
    end: usize,
    mode: u16,
    stack: Vec<u16>,
    diagnostics: Vec<SyntaxError>,
}

impl LexerInterpreter {
    pub fn new(atn: Arc<LexerAtn>) -> LexerInterpreter {
        LexerInterpreter::with_case(atn, CaseTransform::None)
    }

    pub fn with_case(atn: Arc<LexerAtn>, case: CaseTransform) -> LexerInterpreter {
        LexerInterpreter {
            atn,
            case,
            text: Arc::from(""),
            pos: 0,
            end: 0,
            mode: DEFAULT_MODE,
            stack: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn take_diagnostics(&mut self) -> Vec<SyntaxError> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Run the whole window into a buffer, EOF token included.
    pub fn scan_all(&mut self) -> TokenBuffer {
        let mut buf = TokenBuffer::new(self.text.clone());
        loop {
            let tok = self.next_token();
            let eof = tok.is_eof();
            buf.push(tok);
            if eof {
                return buf;
            }
        }
    }

    fn closure(&self, seeds: impl IntoIterator<Item = (StateId, u16)>) -> Vec<(StateId, u16)> {
        let mut out: Vec<(StateId, u16)> = Vec::new();
        let mut work: Vec<(StateId, u16)> = seeds.into_iter().collect();
        while let Some((state, rule)) = work.pop() {
            if out.contains(&(state, rule)) {
                continue;
            }
            out.push((state, rule));
            for t in &self.atn.state(state).transitions {
                if let CharTransition::Epsilon(target) = t {
                    work.push((*target, rule));
                }
            }
        }
        out
    }

    fn mode_seeds(&self) -> Vec<(StateId, u16)> {
        self.atn
            .mode(self.mode)
            .rules
            .iter()
            .map(|&r| (self.atn.rule(r).start, r))
            .collect()
    }

    /// Best accepting rule among `configs`, honoring mode declaration order.
    fn accepting(&self, configs: &[(StateId, u16)]) -> Option<u16> {
        let mode = self.atn.mode(self.mode);
        mode.rules
            .iter()
            .copied()
            .find(|&r| configs.iter().any(|&(state, rule)| rule == r && state == self.atn.rule(r).accept))
    }

    fn can_start(&self, c: char) -> bool {
        let c = self.case.fold(c);
        self.closure(self.mode_seeds()).iter().any(|&(state, _)| {
            self.atn
                .state(state)
                .transitions
                .iter()
                .any(|t| matches!(t, CharTransition::Sym { set, .. } if set.contains(c)))
        })
    }

    fn apply_commands(&mut self, rule: u16, ty: &mut TokenType, channel: &mut Channel) {
        for command in self.atn.rule(rule).commands.clone() {
            match command {
                LexerCommand::Skip => *channel = Channel::HIDDEN,
                LexerCommand::Channel(c) => *channel = Channel(c),
                LexerCommand::Type(t) => *ty = t,
                LexerCommand::PushMode(m) => {
                    self.stack.push(self.mode);
                    self.mode = m;
                }
                LexerCommand::PopMode => match self.stack.pop() {
                    Some(m) => self.mode = m,
                    None => {
                        tracing::debug!(target = "magpie.interp", "popMode on empty stack, resetting to default");
                        self.mode = DEFAULT_MODE;
                    }
                },
                LexerCommand::Mode(m) => self.mode = m,
            }
        }
    }
}

impl ModalLexer for LexerInterpreter {
    fn start(&mut self, input: LexerInput, state: &ModeState) {
        self.pos = input.start();
        self.end = input.end();
        self.text = input.text().clone();
        self.mode = state.mode;
        self.stack = state.stack.clone();
        self.diagnostics.clear();
    }

    fn next_token(&mut self) -> Token {
        if self.pos >= self.end {
            return Token::new(
                TokenType::EOF,
                TextSpan::empty(self.pos as u32),
                Channel::DEFAULT,
            );
        }

        let start = self.pos;
        let mut configs = self.closure(self.mode_seeds());
        let mut best: Option<(u16, usize)> = None;
        let mut cursor = start;
        while cursor < self.end && !configs.is_empty() {
            let c = self.text[cursor..].chars().next().unwrap_or('\0');
            let folded = self.case.fold(c);
            let mut next: Vec<(StateId, u16)> = Vec::new();
            for &(state, rule) in &configs {
                for t in &self.atn.state(state).transitions {
                    if let CharTransition::Sym { set, target } = t {
                        if set.contains(folded) {
                            next.push((*target, rule));
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            cursor += c.len_utf8();
            configs = self.closure(next);
            if let Some(rule) = self.accepting(&configs) {
                best = Some((rule, cursor));
            }
        }

        if let Some((rule, match_end)) = best {
            let mut ty = self.atn.rule(rule).ty;
            let mut channel = Channel::DEFAULT;
            self.apply_commands(rule, &mut ty, &mut channel);
            self.pos = match_end;
            return Token::new(ty, TextSpan::new(start as u32, match_end as u32), channel);
        }

        // Unmatched input: cover the run of characters that cannot start
        // any token of the current mode, then resume normally.
        let first = self.text[start..].chars().next().unwrap_or('\0');
        let mut run_end = start + first.len_utf8();
        while run_end < self.end {
            let c = self.text[run_end..].chars().next().unwrap_or('\0');
            if self.can_start(c) {
                break;
            }
            run_end += c.len_utf8();
        }
        self.pos = run_end;
        let span = TextSpan::new(start as u32, run_end as u32);
        self.diagnostics.push(SyntaxError::new(
            format!("token recognition error at: '{}'", &self.text[start..run_end]),
            span,
        ));
        Token::new(TokenType::BAD, span, Channel::BAD)
    }

    fn snapshot(&self) -> ModeState {
        ModeState { mode: self.mode, stack: self.stack.clone(), context: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atn::{literal, CharElem, LexerAtnBuilder};
    use pretty_assertions::assert_eq;

    const ID: TokenType = TokenType(0);
    const INT: TokenType = TokenType(1);
    const EQ: TokenType = TokenType(2);
    const EQEQ: TokenType = TokenType(3);
    const WS: TokenType = TokenType(4);
    const STR: TokenType = TokenType(5);

    fn toy_lexer() -> LexerInterpreter {
        let mut b = LexerAtnBuilder::new();
        let string_mode = b.mode("STRING");
        b.rule(DEFAULT_MODE, "ID", ID, vec![CharElem::Plus(vec![CharElem::Range('a', 'z')])], vec![]);
        b.rule(DEFAULT_MODE, "INT", INT, vec![CharElem::Plus(vec![CharElem::Range('0', '9')])], vec![]);
        b.rule(DEFAULT_MODE, "EQEQ", EQEQ, literal("=="), vec![]);
        b.rule(DEFAULT_MODE, "EQ", EQ, literal("="), vec![]);
        b.rule(
            DEFAULT_MODE,
            "WS",
            WS,
            vec![CharElem::Plus(vec![CharElem::Set(vec![(' ', ' '), ('\t', '\t'), ('\n', '\n')])])],
            vec![LexerCommand::Skip],
        );
        b.rule(
            DEFAULT_MODE,
            "OPEN_STR",
            STR,
            literal("'"),
            vec![LexerCommand::PushMode(string_mode)],
        );
        b.rule(
            string_mode,
            "STR_CHARS",
            STR,
            vec![CharElem::Plus(vec![CharElem::NotSet(vec![('\'', '\'')])])],
            vec![],
        );
        b.rule(string_mode, "CLOSE_STR", STR, literal("'"), vec![LexerCommand::PopMode]);
        LexerInterpreter::new(Arc::new(b.build().unwrap()))
    }

    fn scan(lexer: &mut LexerInterpreter, text: &str) -> Vec<(TokenType, u32, u32, Channel)> {
        lexer.start(LexerInput::new(Arc::from(text)), &ModeState::initial());
        let buf = lexer.scan_all();
        buf.tokens().iter().map(|t| (t.ty, t.span.start, t.span.end, t.channel)).collect()
    }

    #[test]
    fn maximal_munch_prefers_longest() {
        let mut lexer = toy_lexer();
        let tokens = scan(&mut lexer, "a==1");
        assert_eq!(
            tokens,
            vec![
                (ID, 0, 1, Channel::DEFAULT),
                (EQEQ, 1, 3, Channel::DEFAULT),
                (INT, 3, 4, Channel::DEFAULT),
                (TokenType::EOF, 4, 4, Channel::DEFAULT),
            ]
        );
    }

    #[test]
    fn skip_demotes_to_hidden_but_keeps_the_token() {
        let mut lexer = toy_lexer();
        let tokens = scan(&mut lexer, "a 1");
        assert_eq!(
            tokens,
            vec![
                (ID, 0, 1, Channel::DEFAULT),
                (WS, 1, 2, Channel::HIDDEN),
                (INT, 2, 3, Channel::DEFAULT),
                (TokenType::EOF, 3, 3, Channel::DEFAULT),
            ]
        );
    }

    #[test]
    fn mode_stack_round_trip() {
        let mut lexer = toy_lexer();
        let tokens = scan(&mut lexer, "'ab'x");
        assert_eq!(
            tokens,
            vec![
                (STR, 0, 1, Channel::DEFAULT),
                (STR, 1, 3, Channel::DEFAULT),
                (STR, 3, 4, Channel::DEFAULT),
                (ID, 4, 5, Channel::DEFAULT),
                (TokenType::EOF, 5, 5, Channel::DEFAULT),
            ]
        );
        assert_eq!(lexer.snapshot(), ModeState::initial());
    }

    #[test]
    fn unmatched_run_becomes_one_bad_token() {
        let mut lexer = toy_lexer();
        let tokens = scan(&mut lexer, "a##%b");
        assert_eq!(
            tokens,
            vec![
                (ID, 0, 1, Channel::DEFAULT),
                (TokenType::BAD, 1, 4, Channel::BAD),
                (ID, 4, 5, Channel::DEFAULT),
                (TokenType::EOF, 5, 5, Channel::DEFAULT),
            ]
        );
        let diags = lexer.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "token recognition error at: '##%'");
        assert_eq!(diags[0].span, TextSpan::new(1, 4));
    }

    #[test]
    fn empty_window_yields_single_eof() {
        let mut lexer = toy_lexer();
        let tokens = scan(&mut lexer, "");
        assert_eq!(tokens, vec![(TokenType::EOF, 0, 0, Channel::DEFAULT)]);
    }

    #[test]
    fn window_restart_mid_buffer() {
        let mut lexer = toy_lexer();
        let text: Arc<str> = Arc::from("ab 12");
        lexer.start(LexerInput::new(text.clone()), &ModeState::initial());
        lexer.next_token();
        let state = lexer.snapshot();
        // Restart at the whitespace boundary with the captured state.
        lexer.start(LexerInput::window(text, 2, 5), &state);
        let tok = lexer.next_token();
        assert_eq!((tok.ty, tok.span.start, tok.span.end), (WS, 2, 3));
        let tok = lexer.next_token();
        assert_eq!((tok.ty, tok.span.start, tok.span.end), (INT, 3, 5));
    }

    #[test]
    fn case_folding_matches_without_touching_spans() {
        let mut b = LexerAtnBuilder::new();
        b.rule(DEFAULT_MODE, "KW", TokenType(0), literal("SELECT"), vec![]);
        let atn = Arc::new(b.build().unwrap());
        let mut lexer = LexerInterpreter::with_case(atn, CaseTransform::Upper);
        lexer.start(LexerInput::new(Arc::from("sElEcT")), &ModeState::initial());
        let tok = lexer.next_token();
        assert_eq!((tok.ty, tok.span.start, tok.span.end), (TokenType(0), 0, 6));
    }
}
