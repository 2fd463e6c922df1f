//! Marker-based lossless tree builder.
//!
//! The host tokenizes eagerly, so the builder holds the whole token
//! sequence before parsing starts. Parsing then walks a cursor over the
//! cache, bracketing rule invocations with [`Marker`]s. Nothing touches the
//! green tree until [`TreeBuilder::finish`]: every operation is buffered as
//! an event, which is what makes [`TreeBuilder::rewind`] a cheap rollback
//! (truncate the event tail, reset the cursor). Hidden and bad tokens stay
//! in the cache and are flushed as leaves in front of the next visible
//! token, so the finished tree's text always equals the input.

use std::sync::Arc;

use magpie_interp::{Channel, TextSpan, Token, TokenType};
use rowan::{GreenNode, GreenNodeBuilder, Language};
use serde::{Deserialize, Serialize};

/// Recoverable syntax error accumulated during a parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    pub span: TextSpan,
}

/// One cached token: everything the builder needs to re-emit it as a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedToken {
    pub raw: TokenType,
    pub span: TextSpan,
    pub channel: Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    /// Placeholder for a marker that has not been completed yet.
    Pending { generation: u32 },
    Start { kind: rowan::SyntaxKind },
    Token { index: u32 },
    Finish,
}

/// Handle bracketing a future tree node.
///
/// Markers nest strictly: completing one while a later marker is still open
/// is a programming error and panics, as is touching a marker that a
/// [`TreeBuilder::rewind`] has invalidated.
#[derive(Debug)]
#[must_use = "markers must be completed or rewound"]
pub struct Marker {
    event: u32,
    cursor: u32,
    errors: u32,
    generation: u32,
}

impl Marker {
    /// Closes the marker, turning everything bracketed since [`TreeBuilder::mark`]
    /// into one `kind` node.
    pub fn complete<L: Language>(self, builder: &mut TreeBuilder<L>, kind: L::Kind) {
        builder.complete_marker(self, kind);
    }
}

/// Event-buffering tree builder over a pre-lexed token cache.
pub struct TreeBuilder<L: Language> {
    text: Arc<str>,
    cache: Vec<BufferedToken>,
    cursor: usize,
    events: Vec<Event>,
    errors: Vec<ParseError>,
    /// Pending marker event indices, in creation order.
    open: Vec<u32>,
    generation: u32,
    error_kind: L::Kind,
}

impl<L: Language> TreeBuilder<L> {
    pub fn new(text: Arc<str>, error_kind: L::Kind) -> TreeBuilder<L> {
        TreeBuilder {
            text,
            cache: Vec::new(),
            cursor: 0,
            events: Vec::new(),
            errors: Vec::new(),
            open: Vec::new(),
            generation: 0,
            error_kind,
        }
    }

    pub fn text(&self) -> &Arc<str> {
        &self.text
    }

    /// Appends one scanned token to the cache. The cache must tile the
    /// input and be complete before the first marker or advance.
    pub fn push_token(&mut self, token: Token) {
        assert!(self.events.is_empty(), "token cache must be filled before parsing begins");
        debug_assert!(!token.ty.is_eof(), "the EOF sentinel is not cached");
        let expected = self.cache.last().map(|t| t.span.end).unwrap_or(0);
        debug_assert_eq!(token.span.start, expected, "token cache must tile the input");
        self.cache.push(BufferedToken { raw: token.ty, span: token.span, channel: token.channel });
    }

    fn visible_from(&self, mut pos: usize) -> Option<usize> {
        while pos < self.cache.len() {
            if self.cache[pos].channel.is_default() {
                return Some(pos);
            }
            pos += 1;
        }
        None
    }

    fn kind_at(&self, index: usize) -> L::Kind {
        L::kind_from_raw(rowan::SyntaxKind(self.cache[index].raw.0))
    }

    /// Kind of the current visible token; `None` once only hidden tokens
    /// (or nothing) remain.
    pub fn current(&self) -> Option<L::Kind> {
        self.visible_from(self.cursor).map(|i| self.kind_at(i))
    }

    /// Kind of the `k`-th visible token after the current one (`nth(0)` is
    /// [`TreeBuilder::current`]).
    pub fn nth(&self, k: usize) -> Option<L::Kind> {
        let mut pos = self.cursor;
        let mut remaining = k;
        loop {
            pos = self.visible_from(pos)?;
            if remaining == 0 {
                return Some(self.kind_at(pos));
            }
            remaining -= 1;
            pos += 1;
        }
    }

    /// Span of the current visible token, or an empty span at the end of
    /// input.
    pub fn current_span(&self) -> TextSpan {
        match self.visible_from(self.cursor) {
            Some(i) => self.cache[i].span,
            None => TextSpan::empty(self.text.len() as u32),
        }
    }

    pub fn current_text(&self) -> &str {
        let span = self.current_span();
        &self.text[span.start as usize..span.end as usize]
    }

    /// Cache position of the cursor. Hidden tokens count, so this matches
    /// the raw token indices a replay stream reports.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Appends the current visible token as a leaf, flushing any hidden or
    /// bad run in front of it first.
    pub fn advance(&mut self) {
        let visible = match self.visible_from(self.cursor) {
            Some(i) => i,
            None => panic!("advance past the end of the token cache"),
        };
        while self.cursor <= visible {
            self.events.push(Event::Token { index: self.cursor as u32 });
            self.cursor += 1;
        }
    }

    pub(crate) fn raw_current(&self) -> Option<BufferedToken> {
        self.cache.get(self.cursor).copied()
    }

    /// Single-step advance used by the replay bridge: emits exactly one
    /// cache slot, hidden or not.
    pub(crate) fn raw_advance(&mut self) {
        debug_assert!(self.cursor < self.cache.len(), "raw advance past the cache");
        self.events.push(Event::Token { index: self.cursor as u32 });
        self.cursor += 1;
    }

    pub fn mark(&mut self) -> Marker {
        let event = self.events.len() as u32;
        self.events.push(Event::Pending { generation: self.generation });
        self.open.push(event);
        Marker {
            event,
            cursor: self.cursor as u32,
            errors: self.errors.len() as u32,
            generation: self.generation,
        }
    }

    fn check_live(&self, marker: &Marker) {
        let live = matches!(
            self.events.get(marker.event as usize),
            Some(Event::Pending { generation }) if *generation == marker.generation
        );
        if !live {
            panic!("marker was invalidated by a rewind");
        }
    }

    fn complete_marker(&mut self, marker: Marker, kind: L::Kind) {
        self.check_live(&marker);
        match self.open.last() {
            Some(&top) if top == marker.event => {
                self.open.pop();
            }
            _ => panic!("marker completed out of order (an inner marker is still open)"),
        }
        self.events[marker.event as usize] = Event::Start { kind: L::kind_to_raw(kind) };
        self.events.push(Event::Finish);
    }

    /// Rolls the builder back to where it was when `marker` was created:
    /// later events, errors and cursor movement are discarded, and markers
    /// created after `marker` become invalid.
    pub fn rewind(&mut self, marker: Marker) {
        self.check_live(&marker);
        while let Some(&top) = self.open.last() {
            if top < marker.event {
                break;
            }
            self.open.pop();
        }
        self.events.truncate(marker.event as usize);
        self.errors.truncate(marker.errors as usize);
        self.cursor = marker.cursor as usize;
        self.generation += 1;
    }

    /// Records an error at the current visible token without moving.
    pub fn error(&mut self, message: impl Into<String>) {
        let span = self.current_span();
        self.errors.push(ParseError { message: message.into(), span });
    }

    /// Closes `marker` as an error node and records `message` over the
    /// tokens it bracketed.
    pub fn error_node(&mut self, marker: Marker, message: impl Into<String>) {
        let start = marker.cursor as usize;
        let bracketed = &self.cache[start..self.cursor];
        let span = bracketed
            .iter()
            .filter(|t| t.channel.is_default())
            .map(|t| t.span)
            .reduce(|a, b| a.cover(b))
            .or_else(|| bracketed.iter().map(|t| t.span).reduce(|a, b| a.cover(b)))
            .unwrap_or_else(|| {
                let offset =
                    self.cache.get(start).map(|t| t.span.start).unwrap_or(self.text.len() as u32);
                TextSpan::empty(offset)
            });
        self.errors.push(ParseError { message: message.into(), span });
        let kind = self.error_kind;
        self.complete_marker(marker, kind);
    }

    /// Replays the buffered events through a green-node builder.
    ///
    /// The hidden run after the last visible token has no advance to flush
    /// it, so it is attached inside the root just before it closes. A
    /// well-formed parse leaves exactly one completed root marker; anything
    /// else is a driving bug and panics.
    pub fn finish(self) -> (GreenNode, Vec<ParseError>) {
        assert!(self.open.is_empty(), "a marker was never completed");
        assert!(!self.events.is_empty(), "finish without a root marker");

        let mut builder = GreenNodeBuilder::new();
        let mut depth = 0usize;
        let mut covered = 0u64;
        let total = self.events.len();
        for (i, event) in self.events.iter().enumerate() {
            match *event {
                Event::Pending { .. } => panic!("a marker was never completed"),
                Event::Start { kind } => {
                    if depth == 0 && i != 0 {
                        panic!("events outside the root node");
                    }
                    builder.start_node(kind);
                    depth += 1;
                }
                Event::Token { index } => {
                    if depth == 0 {
                        panic!("token event outside the root node");
                    }
                    covered += self.emit_token(&mut builder, index as usize);
                }
                Event::Finish => {
                    if depth == 0 {
                        panic!("unbalanced marker events");
                    }
                    if i + 1 == total {
                        for idx in self.cursor..self.cache.len() {
                            debug_assert!(
                                !self.cache[idx].channel.is_default(),
                                "visible token left behind by the parse"
                            );
                            covered += self.emit_token(&mut builder, idx);
                        }
                    }
                    builder.finish_node();
                    depth -= 1;
                }
            }
        }
        debug_assert_eq!(covered, self.text.len() as u64, "tree does not cover the input");
        (builder.finish(), self.errors)
    }

    fn emit_token(&self, builder: &mut GreenNodeBuilder<'static>, index: usize) -> u64 {
        let token = &self.cache[index];
        // Normalize through the language so raw sentinel types (bad tokens)
        // land on a kind the language actually defines.
        let kind = L::kind_to_raw(L::kind_from_raw(rowan::SyntaxKind(token.raw.0)));
        let text = &self.text[token.span.start as usize..token.span.end as usize];
        builder.token(kind, text);
        token.span.len() as u64
    }
}
