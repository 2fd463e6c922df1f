//! Hand-written modal scanner for grammar files.
//!
//! The scanner implements [`ModalLexer`], so the restartable adaptor can
//! stop it at any token boundary and resume there from an interned state.
//! Two things make grammar files modal:
//! - `options {`, `tokens {` and `channels {` switch to block modes with a
//!   much smaller token set than the default mode's;
//! - `[` opens a character set inside a lexer rule but an argument action
//!   inside a parser rule, so the snapshot carries which kind of rule the
//!   scan sits in ([`ModeState::context`]).
//!
//! Actions `{...}` and argument actions `[...]` are scanned whole, braces
//! balanced, so hosts receive each embedded code block as a single token.

use std::sync::Arc;

use magpie_editor::{register_language, ElementKindSet, RestartableLexer, ScannerConfig};
use magpie_interp::{
    Channel, LexerInput, ModalLexer, ModeState, SyntaxError, TextSpan, Token, TokenType,
    DEFAULT_MODE,
};
use rowan::Language;

use crate::syntax_kind::{GrammarLanguage, SyntaxKind};

/// Block mode entered by `options {`.
pub(crate) const OPTIONS_MODE: u16 = 1;
/// Block mode entered by `tokens {`.
pub(crate) const TOKENS_MODE: u16 = 2;
/// Block mode entered by `channels {`.
pub(crate) const CHANNELS_MODE: u16 = 3;

/// [`ModeState::context`] values: which construct the scan sits in.
pub(crate) const CTX_NONE: u16 = 0;
pub(crate) const CTX_LEXER_RULE: u16 = 1;
pub(crate) const CTX_PARSER_RULE: u16 = 2;
pub(crate) const CTX_NAMED_ACTION: u16 = 3;

/// One token as reported by [`lex`]: kind plus byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrammarToken {
    pub kind: SyntaxKind,
    pub span: TextSpan,
}

impl GrammarToken {
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.span.start as usize..self.span.end as usize]
    }
}

/// Tokenizes `text` from the initial state, ending with one `Eof` token.
pub fn lex(text: &str) -> Vec<GrammarToken> {
    lex_with_errors(text).0
}

/// Like [`lex`], also returning the lexical diagnostics (unterminated
/// literals, unmatched characters).
pub fn lex_with_errors(text: &str) -> (Vec<GrammarToken>, Vec<SyntaxError>) {
    let mut lexer = GrammarLexer::new();
    lexer.start(LexerInput::new(Arc::from(text)), &ModeState::initial());
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let kind = if token.is_eof() {
            SyntaxKind::Eof
        } else {
            GrammarLanguage::kind_from_raw(rowan::SyntaxKind(token.ty.0))
        };
        tokens.push(GrammarToken { kind, span: token.span });
        if token.is_eof() {
            break;
        }
    }
    (tokens, lexer.take_diagnostics())
}

/// Element kinds for grammar files, registered once per process.
pub fn element_kinds() -> Arc<ElementKindSet> {
    let token_names = (0..SyntaxKind::Error as u16)
        .map(|raw| format!("{:?}", GrammarLanguage::kind_from_raw(rowan::SyntaxKind(raw))));
    let rule_names = (SyntaxKind::GrammarSpec as u16..SyntaxKind::__Last as u16)
        .map(|raw| format!("{:?}", GrammarLanguage::kind_from_raw(rowan::SyntaxKind(raw))));
    register_language("grammar", token_names, rule_names)
}

/// Restartable scanner over grammar files, ready for a host editor.
pub fn restartable_lexer(config: ScannerConfig) -> RestartableLexer<GrammarLexer> {
    RestartableLexer::new(GrammarLexer::new(), element_kinds(), config)
}

/// The grammar-language scanner. All per-buffer state lives in the fields
/// seeded by [`ModalLexer::start`]; everything a restart needs to resume
/// mid-buffer is exposed through [`ModalLexer::snapshot`].
pub struct GrammarLexer {
    text: Arc<str>,
    pos: usize,
    end: usize,
    mode: u16,
    stack: Vec<u16>,
    context: u16,
    errors: Vec<SyntaxError>,
}

impl GrammarLexer {
    pub fn new() -> GrammarLexer {
        GrammarLexer {
            text: Arc::from(""),
            pos: 0,
            end: 0,
            mode: DEFAULT_MODE,
            stack: Vec::new(),
            context: CTX_NONE,
            errors: Vec::new(),
        }
    }

    /// Diagnostics collected since [`ModalLexer::start`].
    pub fn take_diagnostics(&mut self) -> Vec<SyntaxError> {
        std::mem::take(&mut self.errors)
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(self.pos)
    }

    fn peek_at(&self, pos: usize) -> Option<char> {
        if pos >= self.end {
            return None;
        }
        self.text[pos..self.end].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_while(&mut self, mut pred: impl FnMut(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn push_mode(&mut self, mode: u16) {
        self.stack.push(self.mode);
        self.mode = mode;
    }

    fn pop_mode(&mut self) {
        // A stray `}` at the top level leaves the stack empty; fall back to
        // the default mode rather than wedging the scan.
        self.mode = self.stack.pop().unwrap_or(DEFAULT_MODE);
    }

    /// Builds the token and applies the context transitions that make `[`
    /// dispatch restartable: which kind of rule (or named action) the scan
    /// sits in is tracked across token boundaries.
    fn emit(&mut self, kind: SyntaxKind, start: usize) -> Token {
        match kind {
            SyntaxKind::TokenRef if self.mode == DEFAULT_MODE && self.context == CTX_NONE => {
                self.context = CTX_LEXER_RULE;
            }
            SyntaxKind::RuleRef if self.mode == DEFAULT_MODE && self.context == CTX_NONE => {
                self.context = CTX_PARSER_RULE;
            }
            SyntaxKind::At if self.context == CTX_NONE => {
                self.context = CTX_NAMED_ACTION;
            }
            SyntaxKind::Action | SyntaxKind::UnterminatedAction
                if self.context == CTX_NAMED_ACTION =>
            {
                self.context = CTX_NONE;
            }
            SyntaxKind::Semicolon if self.mode == DEFAULT_MODE => {
                self.context = CTX_NONE;
            }
            _ => {}
        }
        let span = TextSpan::new(start as u32, self.pos as u32);
        if kind == SyntaxKind::Error {
            return Token::new(TokenType::BAD, span, Channel::BAD);
        }
        let channel = if kind.is_trivia() { Channel::HIDDEN } else { Channel::DEFAULT };
        Token::new(TokenType(kind as u16), span, channel)
    }

    fn scan_in_default(&mut self, start: usize) -> SyntaxKind {
        let Some(c) = self.bump() else { return SyntaxKind::Error };
        match c {
            c if is_grammar_ws(c) => {
                self.eat_while(is_grammar_ws);
                SyntaxKind::Whitespace
            }
            '/' => self.scan_comment_or_bad(start),
            '\'' => self.scan_string(start),
            c if c.is_ascii_digit() => {
                self.eat_while(|c| c.is_ascii_digit());
                SyntaxKind::Int
            }
            c if is_ident_start(c) => self.scan_word(start),
            '[' => {
                if self.context == CTX_LEXER_RULE {
                    self.scan_char_set(start)
                } else {
                    self.scan_arg_action(start)
                }
            }
            '{' => self.scan_action(start),
            ':' => SyntaxKind::Colon,
            ';' => SyntaxKind::Semicolon,
            ',' => SyntaxKind::Comma,
            '(' => SyntaxKind::LParen,
            ')' => SyntaxKind::RParen,
            '}' => SyntaxKind::RBrace,
            '<' => SyntaxKind::Lt,
            '>' => SyntaxKind::Gt,
            '=' => SyntaxKind::Eq,
            '?' => SyntaxKind::Question,
            '*' => SyntaxKind::Star,
            '|' => SyntaxKind::Or,
            '$' => SyntaxKind::Dollar,
            '@' => SyntaxKind::At,
            '#' => SyntaxKind::Pound,
            '~' => SyntaxKind::Tilde,
            '-' => {
                if self.eat('>') {
                    SyntaxKind::Arrow
                } else {
                    self.scan_bad_run(start)
                }
            }
            '+' => {
                if self.eat('=') {
                    SyntaxKind::PlusEq
                } else {
                    SyntaxKind::Plus
                }
            }
            '.' => {
                if self.eat('.') {
                    SyntaxKind::DotDot
                } else {
                    SyntaxKind::Dot
                }
            }
            _ => self.scan_bad_run(start),
        }
    }

    fn scan_in_options(&mut self, start: usize) -> SyntaxKind {
        let Some(c) = self.bump() else { return SyntaxKind::Error };
        match c {
            c if is_grammar_ws(c) => {
                self.eat_while(is_grammar_ws);
                SyntaxKind::Whitespace
            }
            '/' => self.scan_comment_or_bad(start),
            '\'' => self.scan_string(start),
            c if c.is_ascii_digit() => {
                self.eat_while(|c| c.is_ascii_digit());
                SyntaxKind::Int
            }
            c if is_ident_start(c) => {
                self.eat_while(is_ident_continue);
                self.classify_ident(start)
            }
            '=' => SyntaxKind::Eq,
            '.' => SyntaxKind::Dot,
            ';' => SyntaxKind::Semicolon,
            '}' => {
                self.pop_mode();
                SyntaxKind::RBrace
            }
            _ => self.scan_bad_run(start),
        }
    }

    /// `tokens {...}` and `channels {...}`: identifiers separated by commas
    /// (the legacy `;` separator is still tokenized).
    fn scan_in_alias_block(&mut self, start: usize) -> SyntaxKind {
        let Some(c) = self.bump() else { return SyntaxKind::Error };
        match c {
            c if is_grammar_ws(c) => {
                self.eat_while(is_grammar_ws);
                SyntaxKind::Whitespace
            }
            '/' => self.scan_comment_or_bad(start),
            c if is_ident_start(c) => {
                self.eat_while(is_ident_continue);
                self.classify_ident(start)
            }
            ',' => SyntaxKind::Comma,
            ';' => SyntaxKind::Semicolon,
            '}' => {
                self.pop_mode();
                SyntaxKind::RBrace
            }
            _ => self.scan_bad_run(start),
        }
    }

    fn scan_word(&mut self, start: usize) -> SyntaxKind {
        self.eat_while(is_ident_continue);
        if let Some(kind) = SyntaxKind::from_keyword(&self.text[start..self.pos]) {
            return kind;
        }
        let block = match &self.text[start..self.pos] {
            "options" => Some((SyntaxKind::OptionsKw, OPTIONS_MODE)),
            "tokens" => Some((SyntaxKind::TokensKw, TOKENS_MODE)),
            "channels" => Some((SyntaxKind::ChannelsKw, CHANNELS_MODE)),
            _ => None,
        };
        if let Some((kind, mode)) = block {
            if let Some(after_brace) = self.brace_after(self.pos) {
                self.pos = after_brace;
                self.push_mode(mode);
                return kind;
            }
        }
        self.classify_ident(start)
    }

    /// End offset of a `{` reachable from `from` across whitespace only.
    /// `options` not followed by `{` is a plain identifier.
    fn brace_after(&self, from: usize) -> Option<usize> {
        let mut pos = from;
        while let Some(c) = self.peek_at(pos) {
            if is_grammar_ws(c) {
                pos += c.len_utf8();
            } else if c == '{' {
                return Some(pos + 1);
            } else {
                return None;
            }
        }
        None
    }

    fn classify_ident(&self, start: usize) -> SyntaxKind {
        match self.text[start..].chars().next() {
            Some(c) if c.is_uppercase() => SyntaxKind::TokenRef,
            _ => SyntaxKind::RuleRef,
        }
    }

    fn scan_comment_or_bad(&mut self, start: usize) -> SyntaxKind {
        if self.eat('/') {
            self.eat_while(|c| c != '\n' && c != '\r');
            return SyntaxKind::LineComment;
        }
        if self.eat('*') {
            let doc = self.peek() == Some('*');
            let mut closed = false;
            while let Some(c) = self.bump() {
                if c == '*' && self.eat('/') {
                    closed = true;
                    break;
                }
            }
            if !closed {
                self.errors.push(SyntaxError::new(
                    "unterminated block comment",
                    TextSpan::new(start as u32, self.pos as u32),
                ));
            }
            // `/**/` has no body and is a plain block comment.
            return if doc && !(closed && self.pos - start == 4) {
                SyntaxKind::DocComment
            } else {
                SyntaxKind::BlockComment
            };
        }
        self.scan_bad_run(start)
    }

    fn scan_string(&mut self, start: usize) -> SyntaxKind {
        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => break,
                Some('\\') => {
                    self.bump();
                    if !matches!(self.peek(), None | Some('\n') | Some('\r')) {
                        self.bump();
                    }
                }
                Some('\'') => {
                    self.bump();
                    return SyntaxKind::StringLiteral;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        self.errors.push(SyntaxError::new(
            "unterminated string literal",
            TextSpan::new(start as u32, self.pos as u32),
        ));
        SyntaxKind::UnterminatedString
    }

    /// `[...]` in a lexer rule. Character sets are single-line; a newline
    /// before the closing `]` ends the token early.
    fn scan_char_set(&mut self, start: usize) -> SyntaxKind {
        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => break,
                Some('\\') => {
                    self.bump();
                    if !matches!(self.peek(), None | Some('\n') | Some('\r')) {
                        self.bump();
                    }
                }
                Some(']') => {
                    self.bump();
                    return SyntaxKind::LexerCharSet;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        self.errors.push(SyntaxError::new(
            "unterminated character set",
            TextSpan::new(start as u32, self.pos as u32),
        ));
        SyntaxKind::UnterminatedCharSet
    }

    /// `[...]` outside lexer rules: target-language arguments, returns or
    /// locals. Brackets nest; quoted literals inside do not count.
    fn scan_arg_action(&mut self, start: usize) -> SyntaxKind {
        let mut depth = 1u32;
        while let Some(c) = self.bump() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return SyntaxKind::ArgAction;
                    }
                }
                '\'' | '"' => self.skip_quoted(c),
                _ => {}
            }
        }
        self.errors.push(SyntaxError::new(
            "unterminated argument action",
            TextSpan::new(start as u32, self.pos as u32),
        ));
        SyntaxKind::UnterminatedArgAction
    }

    /// `{...}` embedded action. Braces nest; quoted literals and comments
    /// inside the target code do not count toward nesting.
    fn scan_action(&mut self, start: usize) -> SyntaxKind {
        let mut depth = 1u32;
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return SyntaxKind::Action;
                    }
                }
                '\'' | '"' => self.skip_quoted(c),
                '/' => {
                    if self.eat('/') {
                        self.eat_while(|c| c != '\n' && c != '\r');
                    } else if self.eat('*') {
                        while let Some(c) = self.bump() {
                            if c == '*' && self.eat('/') {
                                break;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        self.errors.push(SyntaxError::new(
            "unterminated action",
            TextSpan::new(start as u32, self.pos as u32),
        ));
        SyntaxKind::UnterminatedAction
    }

    /// Skips a quoted target-language literal inside an action. Stops at a
    /// newline rather than swallowing the rest of the action when the
    /// literal is unterminated.
    fn skip_quoted(&mut self, quote: char) {
        while let Some(c) = self.peek() {
            match c {
                '\n' | '\r' => break,
                '\\' => {
                    self.bump();
                    if !matches!(self.peek(), None | Some('\n') | Some('\r')) {
                        self.bump();
                    }
                }
                c if c == quote => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Coalesces a run of characters that cannot start any token in the
    /// current mode into one bad token, mirroring the interpreter's
    /// recovery: one cover token, one diagnostic, scan continues after.
    fn scan_bad_run(&mut self, start: usize) -> SyntaxKind {
        while self.pos < self.end && !self.token_can_start_here() {
            self.bump();
        }
        self.errors.push(SyntaxError::new(
            format!("token recognition error at: '{}'", &self.text[start..self.pos]),
            TextSpan::new(start as u32, self.pos as u32),
        ));
        SyntaxKind::Error
    }

    fn token_can_start_here(&self) -> bool {
        let Some(c) = self.peek() else { return false };
        match self.mode {
            OPTIONS_MODE => {
                is_grammar_ws(c)
                    || is_ident_start(c)
                    || c.is_ascii_digit()
                    || matches!(c, '\'' | '=' | '.' | ';' | '}')
                    || self.comment_starts_here()
            }
            TOKENS_MODE | CHANNELS_MODE => {
                is_grammar_ws(c)
                    || is_ident_start(c)
                    || matches!(c, ',' | ';' | '}')
                    || self.comment_starts_here()
            }
            _ => {
                is_grammar_ws(c)
                    || is_ident_start(c)
                    || c.is_ascii_digit()
                    || matches!(
                        c,
                        '\'' | '[' | '{' | '}' | ':' | ';' | ',' | '(' | ')' | '<' | '>' | '='
                            | '?' | '*' | '+' | '|' | '$' | '.' | '@' | '#' | '~'
                    )
                    || (c == '-' && self.peek_at(self.pos + 1) == Some('>'))
                    || self.comment_starts_here()
            }
        }
    }

    fn comment_starts_here(&self) -> bool {
        self.peek() == Some('/') && matches!(self.peek_at(self.pos + 1), Some('/') | Some('*'))
    }
}

impl Default for GrammarLexer {
    fn default() -> Self {
        GrammarLexer::new()
    }
}

impl ModalLexer for GrammarLexer {
    fn start(&mut self, input: LexerInput, state: &ModeState) {
        self.pos = input.start();
        self.end = input.end();
        self.text = input.text().clone();
        self.mode = state.mode;
        self.stack = state.stack.clone();
        self.context = state.context;
        self.errors.clear();
    }

    fn next_token(&mut self) -> Token {
        if self.pos >= self.end {
            return Token::new(TokenType::EOF, TextSpan::empty(self.end as u32), Channel::DEFAULT);
        }
        let start = self.pos;
        let kind = match self.mode {
            OPTIONS_MODE => self.scan_in_options(start),
            TOKENS_MODE | CHANNELS_MODE => self.scan_in_alias_block(start),
            _ => self.scan_in_default(start),
        };
        self.emit(kind, start)
    }

    fn snapshot(&self) -> ModeState {
        ModeState { mode: self.mode, stack: self.stack.clone(), context: self.context }
    }
}

fn is_grammar_ws(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | '\u{0C}')
}

fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

fn is_ident_continue(c: char) -> bool {
    unicode_ident::is_xid_continue(c)
}
