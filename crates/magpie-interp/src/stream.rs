use crate::token::{Token, TokenBuffer, TokenType};

/// Cursor over a [`TokenBuffer`] with channel-filtered lookahead.
///
/// Indices handed out by [`TokenStream::index`] and accepted by
/// [`TokenStream::seek`] are raw buffer positions, so off-channel tokens
/// keep their places; lookahead (`la`/`lt`) only ever sees the default
/// channel, which is the parser's view of the world.
#[derive(Debug, Clone)]
pub struct TokenStream {
    buf: TokenBuffer,
    pos: usize,
}

impl TokenStream {
    pub fn new(buf: TokenBuffer) -> TokenStream {
        assert!(
            buf.tokens().last().map(Token::is_eof).unwrap_or(false),
            "token buffer must end with EOF"
        );
        TokenStream { buf, pos: 0 }
    }

    pub fn buffer(&self) -> &TokenBuffer {
        &self.buf
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Raw index of the current (next visible) token.
    pub fn index(&self) -> usize {
        self.skip_forward(self.pos)
    }

    pub fn seek(&mut self, index: usize) {
        self.pos = index.min(self.buf.len() - 1);
    }

    /// Type of the `k`-th visible token; `k` is 1-based, `-1` looks at
    /// the previous visible token.
    pub fn la(&self, k: i32) -> TokenType {
        self.lt(k).ty
    }

    pub fn lt(&self, k: i32) -> &Token {
        match k {
            0 => panic!("lt(0) is meaningless"),
            k if k > 0 => {
                let mut i = self.skip_forward(self.pos);
                for _ in 1..k {
                    if self.buf.get(i).is_eof() {
                        break;
                    }
                    i = self.skip_forward(i + 1);
                }
                self.buf.get(i)
            }
            _ => {
                let mut remaining = -k as usize;
                let mut i = self.pos;
                loop {
                    if i == 0 {
                        panic!("lt({k}) before start of stream");
                    }
                    i -= 1;
                    if self.buf.get(i).channel.is_default() {
                        remaining -= 1;
                        if remaining == 0 {
                            return self.buf.get(i);
                        }
                    }
                }
            }
        }
    }

    /// Consume the current visible token and return it. Consuming at EOF
    /// is a no-op that keeps returning the sentinel.
    pub fn consume(&mut self) -> Token {
        let i = self.skip_forward(self.pos);
        let tok = *self.buf.get(i);
        if !tok.is_eof() {
            self.pos = i + 1;
        } else {
            self.pos = i;
        }
        tok
    }

    pub fn text_of(&self, token: &Token) -> &str {
        self.buf.token_text(token.index as usize)
    }

    fn skip_forward(&self, from: usize) -> usize {
        let mut i = from;
        loop {
            let tok = self.buf.get(i);
            if tok.channel.is_default() || tok.is_eof() {
                return i;
            }
            i += 1;
        }
    }
}
