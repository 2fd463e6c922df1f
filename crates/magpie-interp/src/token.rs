use std::fmt;
use std::sync::Arc;

/// Byte range into an analyzed text, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TextSpan {
    pub start: u32,
    pub end: u32,
}

impl TextSpan {
    pub fn new(start: u32, end: u32) -> TextSpan {
        debug_assert!(start <= end, "inverted span {start}..{end}");
        TextSpan { start, end }
    }

    pub fn empty(offset: u32) -> TextSpan {
        TextSpan { start: offset, end: offset }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn cover(&self, other: TextSpan) -> TextSpan {
        TextSpan { start: self.start.min(other.start), end: self.end.max(other.end) }
    }

    pub fn contains_offset(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }
}

impl fmt::Display for TextSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Raw token type as assigned by a grammar's vocabulary.
///
/// The top of the `u16` range is reserved: [`TokenType::EOF`] for the
/// end-of-input sentinel and [`TokenType::BAD`] for cover tokens over
/// unmatched input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TokenType(pub u16);

impl TokenType {
    pub const EOF: TokenType = TokenType(u16::MAX);
    pub const BAD: TokenType = TokenType(u16::MAX - 1);

    pub fn is_eof(self) -> bool {
        self == TokenType::EOF
    }

    pub fn is_bad(self) -> bool {
        self == TokenType::BAD
    }
}

/// Token stream lane. The parser only ever reads [`Channel::DEFAULT`];
/// everything else is carried for editor tiling but never predicted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Channel(pub u8);

impl Channel {
    pub const DEFAULT: Channel = Channel(0);
    pub const HIDDEN: Channel = Channel(1);
    /// Cover tokens for unmatched input live here so the parser never
    /// sees them while the token tiling of the buffer stays complete.
    pub const BAD: Channel = Channel(2);

    pub fn is_default(self) -> bool {
        self == Channel::DEFAULT
    }
}

/// One scanned token. Text is not stored; it is sliced out of the owning
/// [`TokenBuffer`] on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub ty: TokenType,
    pub span: TextSpan,
    pub channel: Channel,
    /// Position in the owning buffer, assigned on push.
    pub index: u32,
}

impl Token {
    pub fn new(ty: TokenType, span: TextSpan, channel: Channel) -> Token {
        Token { ty, span, channel, index: 0 }
    }

    pub fn is_eof(&self) -> bool {
        self.ty.is_eof()
    }
}

/// The complete token sequence for one analyzed text, ending in exactly
/// one EOF token. Owns the text so token content can be resolved without
/// tying the buffer to a borrow.
#[derive(Debug, Clone)]
pub struct TokenBuffer {
    text: Arc<str>,
    tokens: Vec<Token>,
}

impl TokenBuffer {
    pub fn new(text: Arc<str>) -> TokenBuffer {
        TokenBuffer { text, tokens: Vec::new() }
    }

    pub fn push(&mut self, mut token: Token) -> u32 {
        let index = self.tokens.len() as u32;
        token.index = index;
        self.tokens.push(token);
        index
    }

    pub fn text(&self) -> &Arc<str> {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> &Token {
        &self.tokens[index]
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Text of the token at `index`. EOF yields `"<EOF>"` so renderings
    /// of automaton trees have something to print.
    pub fn token_text(&self, index: usize) -> &str {
        let tok = &self.tokens[index];
        if tok.is_eof() {
            return "<EOF>";
        }
        &self.text[tok.span.start as usize..tok.span.end as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_cover_and_contains() {
        let a = TextSpan::new(2, 5);
        let b = TextSpan::new(4, 9);
        assert_eq!(a.cover(b), TextSpan::new(2, 9));
        assert!(a.contains_offset(2));
        assert!(!a.contains_offset(5));
    }

    #[test]
    fn buffer_assigns_indices_and_resolves_text() {
        let mut buf = TokenBuffer::new("ab cd".into());
        buf.push(Token::new(TokenType(1), TextSpan::new(0, 2), Channel::DEFAULT));
        buf.push(Token::new(TokenType(2), TextSpan::new(2, 3), Channel::HIDDEN));
        buf.push(Token::new(TokenType(1), TextSpan::new(3, 5), Channel::DEFAULT));
        buf.push(Token::new(TokenType::EOF, TextSpan::empty(5), Channel::DEFAULT));
        assert_eq!(buf.get(2).index, 2);
        assert_eq!(buf.token_text(0), "ab");
        assert_eq!(buf.token_text(2), "cd");
        assert_eq!(buf.token_text(3), "<EOF>");
    }
}
