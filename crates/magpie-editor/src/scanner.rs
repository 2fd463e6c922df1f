//! Restartable scanner adaptor.
//!
//! Editor hosts re-highlight by restarting the lexer at an arbitrary token
//! boundary, handing back a small integer they stored for that boundary.
//! [`RestartableLexer`] adapts any [`ModalLexer`] to that contract: it
//! interns the automaton state at every boundary and can seed the lexer
//! from a previously returned continuation integer.

use std::sync::Arc;

use magpie_interp::{Channel, LexerInput, ModalLexer, TextSpan, Token, TokenType};

use crate::registry::{ElementKind, ElementKindSet};
use crate::state::{LexerState, StateTable};

/// How the adaptor surfaces tokens that matched no automaton path.
///
/// Scanning is identical in both configurations; only the channel of bad
/// tokens differs. Highlighting wants them on the visible channel so the
/// editor can paint the span; parsing wants them off the default channel so
/// the parser-facing stream never sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    bad_token_channel: Channel,
}

impl ScannerConfig {
    pub fn highlighting() -> ScannerConfig {
        ScannerConfig { bad_token_channel: Channel::DEFAULT }
    }

    pub fn parsing() -> ScannerConfig {
        ScannerConfig { bad_token_channel: Channel::BAD }
    }
}

/// Pull-based cursor over a buffer window with restartable state.
///
/// The state reported for a token is the automaton state at its *start*
/// boundary, captured just before the token is pulled from the lexer. A
/// scan seeded with that state at that offset reproduces the original
/// token and everything after it. Each adaptor owns its own [`StateTable`],
/// so continuation integers are only meaningful against the adaptor that
/// produced them.
#[derive(Debug)]
pub struct RestartableLexer<L: ModalLexer> {
    lexer: L,
    kinds: Arc<ElementKindSet>,
    config: ScannerConfig,
    table: StateTable,
    pending: LexerState,
    token: Token,
}

impl<L: ModalLexer> RestartableLexer<L> {
    pub fn new(lexer: L, kinds: Arc<ElementKindSet>, config: ScannerConfig) -> RestartableLexer<L> {
        let mut table = StateTable::new();
        let pending = LexerState::initial();
        // Continuation 0 must always decode to the initial state.
        table.intern(&pending);
        RestartableLexer {
            lexer,
            kinds,
            config,
            table,
            pending,
            token: Token::new(TokenType::EOF, TextSpan::empty(0), Channel::DEFAULT),
        }
    }

    /// Resets the lexer onto `input` and scans the first token.
    ///
    /// Offset 0 with continuation 0 means "beginning of file"; any other
    /// combination must round-trip through this adaptor's state table, and
    /// an integer the table never handed out panics.
    pub fn start(&mut self, input: LexerInput, continuation: u32) {
        let state = if input.start() == 0 && continuation == 0 {
            LexerState::initial()
        } else {
            tracing::trace!(
                target = "magpie.editor",
                offset = input.start(),
                continuation,
                "restarting scan mid-buffer"
            );
            self.table.get(continuation).clone()
        };
        self.lexer.start(input, state.mode_state());
        self.pending = state;
        self.token = self.scan_next();
    }

    /// Moves to the next token, capturing the automaton state at its start
    /// boundary first. The capture must happen before the pull: the state a
    /// later restart needs is the one *before* the token it will re-produce.
    pub fn advance(&mut self) {
        self.pending = LexerState::new(self.lexer.snapshot());
        self.token = self.scan_next();
    }

    fn scan_next(&mut self) -> Token {
        let mut token = self.lexer.next_token();
        if token.ty.is_bad() {
            token.channel = self.config.bad_token_channel;
        }
        token
    }

    /// Continuation integer for the current token's start boundary.
    pub fn state(&mut self) -> u32 {
        self.table.intern(&self.pending)
    }

    /// Element kind of the current token; `None` once the window is
    /// exhausted.
    pub fn token_type(&self) -> Option<ElementKind> {
        if self.token.is_eof() {
            return None;
        }
        Some(self.kinds.token(self.token.ty))
    }

    pub fn token_start(&self) -> usize {
        self.token.span.start as usize
    }

    /// Exclusive end offset of the current token.
    pub fn token_end(&self) -> usize {
        self.token.span.end as usize
    }

    /// The current token itself, for consumers that cache the raw stream.
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn table(&self) -> &StateTable {
        &self.table
    }

    pub fn lexer_mut(&mut self) -> &mut L {
        &mut self.lexer
    }
}
