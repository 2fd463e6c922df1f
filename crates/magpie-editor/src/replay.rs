//! Token-replay bridge between the tree builder's cache and the
//! interpretive parser's buffered stream.
//!
//! The host tokenizes once, into the builder's cache. Parsers that want a
//! conventional stream (the automaton interpreter, the profiler) get one by
//! re-presenting those cached tokens instead of re-lexing: a
//! [`ReplaySource`] pulls them out one at a time, and [`capture_tokens`]
//! drains the whole cache into a [`TokenBuffer`] and rewinds the builder so
//! the tree-producing parse afterwards replays over the same tokens.

use magpie_interp::{Channel, TextSpan, Token, TokenBuffer, TokenType};
use rowan::Language;

use crate::builder::TreeBuilder;

/// Pulls already-cached tokens back out of a [`TreeBuilder`] one at a time.
pub struct ReplaySource<'a, L: Language> {
    builder: &'a mut TreeBuilder<L>,
}

impl<'a, L: Language> ReplaySource<'a, L> {
    pub fn new(builder: &'a mut TreeBuilder<L>) -> ReplaySource<'a, L> {
        ReplaySource { builder }
    }

    /// Wraps the builder's current cached token as a stream token and
    /// advances the builder cursor past it. Once the cache is exhausted
    /// this returns the EOF sentinel, repeatedly.
    pub fn next_token(&mut self) -> Token {
        match self.builder.raw_current() {
            Some(cached) => {
                self.builder.raw_advance();
                Token::new(cached.raw, cached.span, cached.channel)
            }
            None => {
                let end = self.builder.text().len() as u32;
                Token::new(TokenType::EOF, TextSpan::empty(end), Channel::DEFAULT)
            }
        }
    }
}

/// Captures the builder's token cache as an EOF-terminated buffer.
///
/// The cache is drained through a [`ReplaySource`], then the builder is
/// rewound to the pre-capture marker, so the parse that follows replays
/// over the same cache. Called with the cursor at the start of the cache
/// (the usual case), buffered token indices equal cache positions, which
/// keeps stream indices and builder cursor in agreement during lockstep
/// parsing.
pub fn capture_tokens<L: Language>(builder: &mut TreeBuilder<L>) -> TokenBuffer {
    let marker = builder.mark();
    let mut buf = TokenBuffer::new(builder.text().clone());
    let mut source = ReplaySource::new(builder);
    loop {
        let token = source.next_token();
        let eof = token.is_eof();
        buf.push(token);
        if eof {
            break;
        }
    }
    builder.rewind(marker);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_interp::TokenStream;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[repr(u16)]
    enum ReplayKind {
        Word,
        Space,
        Error,
        Root,
        __Last,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    enum ReplayLang {}

    impl Language for ReplayLang {
        type Kind = ReplayKind;

        fn kind_from_raw(raw: rowan::SyntaxKind) -> ReplayKind {
            if raw.0 < ReplayKind::__Last as u16 {
                // SAFETY: the numeric value is within the enum range.
                unsafe { std::mem::transmute::<u16, ReplayKind>(raw.0) }
            } else {
                ReplayKind::Error
            }
        }

        fn kind_to_raw(kind: ReplayKind) -> rowan::SyntaxKind {
            rowan::SyntaxKind(kind as u16)
        }
    }

    fn filled() -> TreeBuilder<ReplayLang> {
        let mut builder = TreeBuilder::new(Arc::from("ab cd"), ReplayKind::Error);
        let word = TokenType(ReplayKind::Word as u16);
        let space = TokenType(ReplayKind::Space as u16);
        builder.push_token(Token::new(word, TextSpan::new(0, 2), Channel::DEFAULT));
        builder.push_token(Token::new(space, TextSpan::new(2, 3), Channel::HIDDEN));
        builder.push_token(Token::new(word, TextSpan::new(3, 5), Channel::DEFAULT));
        builder
    }

    #[test]
    fn tokens_come_back_out_in_cache_order() {
        let mut builder = filled();
        let mut source = ReplaySource::new(&mut builder);
        let seq: Vec<_> = (0..5)
            .map(|_| source.next_token())
            .map(|t| (t.ty, t.span.start, t.span.end, t.channel))
            .collect();
        assert_eq!(
            seq,
            vec![
                (TokenType(ReplayKind::Word as u16), 0, 2, Channel::DEFAULT),
                (TokenType(ReplayKind::Space as u16), 2, 3, Channel::HIDDEN),
                (TokenType(ReplayKind::Word as u16), 3, 5, Channel::DEFAULT),
                (TokenType::EOF, 5, 5, Channel::DEFAULT),
                (TokenType::EOF, 5, 5, Channel::DEFAULT),
            ]
        );
    }

    #[test]
    fn capture_preserves_indices_and_rewinds_the_builder() {
        let mut builder = filled();
        let buf = capture_tokens(&mut builder);

        assert_eq!(builder.cursor(), 0);
        assert_eq!(buf.len(), 4);
        for (i, token) in buf.tokens().iter().enumerate() {
            assert_eq!(token.index as usize, i);
        }
        assert_eq!(buf.get(1).channel, Channel::HIDDEN);

        // The buffer is stream-ready and channel filtering works over it.
        let mut stream = TokenStream::new(buf);
        assert_eq!(stream.la(1), TokenType(ReplayKind::Word as u16));
        assert_eq!(stream.lt(2).index, 2);
        stream.consume();
        assert_eq!(stream.index(), 2);

        // The builder still parses over the same cache afterwards.
        let root = builder.mark();
        builder.advance();
        builder.advance();
        root.complete(&mut builder, ReplayKind::Root);
        let (green, errors) = builder.finish();
        assert_eq!(errors, vec![]);
        assert_eq!(rowan::SyntaxNode::<ReplayLang>::new_root(green).text().to_string(), "ab cd");
    }
}
