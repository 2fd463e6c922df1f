//! Recursive-descent parser for grammar files.
//!
//! The parser runs over two views of the same token sequence kept in
//! lockstep: a [`TreeBuilder`] that owns the token cache and assembles the
//! lossless tree, and a [`TokenStream`] used for multi-token lookahead.
//! Both are filled from a single scan of the input, so every byte of the
//! source ends up in the tree exactly once, including whitespace, comments
//! and unrecognized-character runs.

use std::sync::Arc;

use magpie_editor::{capture_tokens, ParseError, TreeBuilder};
use magpie_interp::{LexerInput, ModalLexer, ModeState, TextSpan, TokenStream};
use rowan::GreenNode;
use text_size::{TextRange, TextSize};

use crate::lexer::GrammarLexer;
use crate::syntax_kind::{GrammarLanguage, SyntaxKind};

pub type SyntaxNode = rowan::SyntaxNode<GrammarLanguage>;
pub type SyntaxToken = rowan::SyntaxToken<GrammarLanguage>;
pub type SyntaxElement = rowan::SyntaxElement<GrammarLanguage>;

/// Result of parsing a grammar file: the green tree plus every
/// diagnostic collected along the way, lexical ones first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarParse {
    pub green: GreenNode,
    pub errors: Vec<ParseError>,
}

impl GrammarParse {
    /// Construct a fresh syntax node pointing at the root of the tree.
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    /// Find the token at the given byte offset.
    pub fn token_at_offset(&self, offset: u32) -> rowan::TokenAtOffset<SyntaxToken> {
        self.syntax().token_at_offset(TextSize::from(offset))
    }

    /// Find the smallest element covering the given span.
    pub fn covering_element(&self, span: TextSpan) -> SyntaxElement {
        self.syntax().covering_element(TextRange::new(
            TextSize::from(span.start),
            TextSize::from(span.end),
        ))
    }
}

/// Parse a grammar file into a lossless syntax tree.
///
/// Never fails: malformed input produces a tree that still covers the
/// whole text, with error nodes and diagnostics marking the bad parts.
pub fn parse(text: &str) -> GrammarParse {
    let shared: Arc<str> = Arc::from(text);

    let mut lexer = GrammarLexer::new();
    lexer.start(LexerInput::new(shared.clone()), &ModeState::initial());

    let mut builder = TreeBuilder::new(shared, SyntaxKind::Error);
    loop {
        let token = lexer.next_token();
        if token.is_eof() {
            break;
        }
        builder.push_token(token);
    }

    let mut errors: Vec<ParseError> = lexer
        .take_diagnostics()
        .into_iter()
        .map(|e| ParseError { message: e.message, span: e.span })
        .collect();

    let stream = TokenStream::new(capture_tokens(&mut builder));
    let parser = Parser { builder, stream };
    let (green, mut parse_errors) = parser.grammar_spec();
    errors.append(&mut parse_errors);

    tracing::debug!(
        target: "magpie.syntax",
        len = text.len(),
        errors = errors.len(),
        "parsed grammar file"
    );
    GrammarParse { green, errors }
}

struct Parser {
    builder: TreeBuilder<GrammarLanguage>,
    stream: TokenStream,
}

impl Parser {
    /// grammarSpec: grammarDecl (prequel | rule | mode)* EOF
    fn grammar_spec(mut self) -> (GreenNode, Vec<ParseError>) {
        let root = self.builder.mark();
        match self.builder.current() {
            Some(SyntaxKind::LexerKw | SyntaxKind::ParserKw | SyntaxKind::GrammarKw) => {
                self.grammar_decl();
            }
            _ => self.builder.error("expected a grammar declaration"),
        }
        while let Some(kind) = self.builder.current() {
            match kind {
                SyntaxKind::OptionsKw => self.options_spec(),
                SyntaxKind::TokensKw => self.tokens_spec(),
                SyntaxKind::ChannelsKw => self.channels_spec(),
                SyntaxKind::ImportKw => self.import_spec(),
                SyntaxKind::At => self.named_action(),
                SyntaxKind::ModeKw => self.mode_spec(),
                SyntaxKind::FragmentKw
                | SyntaxKind::PublicKw
                | SyntaxKind::PrivateKw
                | SyntaxKind::ProtectedKw
                | SyntaxKind::TokenRef => self.rule_spec(),
                SyntaxKind::RuleRef => self.parser_rule(),
                _ => self.recover_top_level(),
            }
        }
        root.complete(&mut self.builder, SyntaxKind::GrammarSpec);
        self.builder.finish()
    }

    /// grammarDecl: (`lexer` | `parser`)? `grammar` name `;`
    fn grammar_decl(&mut self) {
        let m = self.builder.mark();
        if matches!(
            self.builder.current(),
            Some(SyntaxKind::LexerKw | SyntaxKind::ParserKw)
        ) {
            self.bump();
        }
        self.expect(SyntaxKind::GrammarKw, "expected `grammar`");
        self.expect_name("expected a grammar name");
        self.expect(SyntaxKind::Semicolon, "expected `;` after the grammar name");
        m.complete(&mut self.builder, SyntaxKind::GrammarDecl);
    }

    /// optionsSpec: `options {` (option `;`)* `}`
    ///
    /// The scanner folds the opening brace into the intro token, so the
    /// body starts immediately after it.
    fn options_spec(&mut self) {
        let m = self.builder.mark();
        self.bump();
        while let Some(kind) = self.builder.current() {
            match kind {
                SyntaxKind::RBrace => break,
                SyntaxKind::TokenRef | SyntaxKind::RuleRef => self.option(),
                SyntaxKind::Semicolon => self.bump(),
                _ => self.error_and_bump("expected an option name"),
            }
        }
        self.expect(SyntaxKind::RBrace, "expected `}` to close `options`");
        m.complete(&mut self.builder, SyntaxKind::OptionsSpec);
    }

    /// option: name `=` optionValue `;`
    fn option(&mut self) {
        let m = self.builder.mark();
        self.bump();
        self.expect(SyntaxKind::Eq, "expected `=` after the option name");
        match self.builder.current() {
            Some(SyntaxKind::TokenRef | SyntaxKind::RuleRef) => {
                self.bump();
                // Dotted value, e.g. `superClass = org.example.Base;`.
                while self.at(SyntaxKind::Dot) {
                    self.bump();
                    self.expect_name("expected an identifier after `.`");
                }
            }
            Some(SyntaxKind::StringLiteral | SyntaxKind::UnterminatedString | SyntaxKind::Int) => {
                self.bump();
            }
            _ => self.builder.error("expected an option value"),
        }
        self.expect(SyntaxKind::Semicolon, "expected `;` after the option");
        m.complete(&mut self.builder, SyntaxKind::OptionSpec);
    }

    fn tokens_spec(&mut self) {
        self.alias_block(SyntaxKind::TokensSpec);
    }

    fn channels_spec(&mut self) {
        self.alias_block(SyntaxKind::ChannelsSpec);
    }

    /// tokensSpec | channelsSpec: intro name (`,` name)* `,`? `}`
    fn alias_block(&mut self, node: SyntaxKind) {
        let m = self.builder.mark();
        self.bump();
        while let Some(kind) = self.builder.current() {
            match kind {
                SyntaxKind::RBrace => break,
                SyntaxKind::TokenRef | SyntaxKind::RuleRef => self.bump(),
                SyntaxKind::Comma | SyntaxKind::Semicolon => self.bump(),
                _ => self.error_and_bump("expected a name"),
            }
        }
        self.expect(SyntaxKind::RBrace, "expected `}` to close the block");
        m.complete(&mut self.builder, node);
    }

    /// importSpec: `import` name (`=` name)? (`,` name (`=` name)?)* `;`
    fn import_spec(&mut self) {
        let m = self.builder.mark();
        self.bump();
        loop {
            self.expect_name("expected a grammar to import");
            if self.at(SyntaxKind::Eq) {
                self.bump();
                self.expect_name("expected a grammar name after `=`");
            }
            if self.at(SyntaxKind::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        self.expect(SyntaxKind::Semicolon, "expected `;` after `import`");
        m.complete(&mut self.builder, SyntaxKind::ImportSpec);
    }

    /// namedAction: `@` (scope `::`)? name actionBlock
    fn named_action(&mut self) {
        let m = self.builder.mark();
        self.bump();
        match self.builder.current() {
            Some(
                SyntaxKind::LexerKw
                | SyntaxKind::ParserKw
                | SyntaxKind::TokenRef
                | SyntaxKind::RuleRef,
            ) => self.bump(),
            _ => self.builder.error("expected an action name after `@`"),
        }
        if self.at(SyntaxKind::Colon) && self.nth(1) == Some(SyntaxKind::Colon) {
            self.bump();
            self.bump();
            self.expect_name("expected an action name after `::`");
        }
        self.expect_action("expected `{...}` after the action name");
        m.complete(&mut self.builder, SyntaxKind::NamedAction);
    }

    /// modeSpec: `mode` name `;` lexerRule*
    fn mode_spec(&mut self) {
        let m = self.builder.mark();
        self.bump();
        self.expect_name("expected a mode name");
        self.expect(SyntaxKind::Semicolon, "expected `;` after the mode name");
        while matches!(
            self.builder.current(),
            Some(SyntaxKind::FragmentKw | SyntaxKind::TokenRef)
        ) {
            self.lexer_rule();
        }
        m.complete(&mut self.builder, SyntaxKind::ModeSpec);
    }

    /// ruleSpec: modifiers, then a lexer or parser rule decided by the
    /// case of the first name after them.
    fn rule_spec(&mut self) {
        let mut n = 0;
        while matches!(
            self.nth(n),
            Some(
                SyntaxKind::FragmentKw
                    | SyntaxKind::PublicKw
                    | SyntaxKind::PrivateKw
                    | SyntaxKind::ProtectedKw
            )
        ) {
            n += 1;
        }
        if self.nth(n) == Some(SyntaxKind::RuleRef) {
            self.parser_rule();
        } else {
            self.lexer_rule();
        }
    }

    fn modifiers(&mut self) {
        while matches!(
            self.builder.current(),
            Some(
                SyntaxKind::FragmentKw
                    | SyntaxKind::PublicKw
                    | SyntaxKind::PrivateKw
                    | SyntaxKind::ProtectedKw
            )
        ) {
            self.bump();
        }
    }

    /// parserRule: modifiers? name argAction? `returns`? `throws`? `locals`?
    ///             (optionsSpec | namedAction)* `:` altList `;` exceptions
    fn parser_rule(&mut self) {
        let m = self.builder.mark();
        self.modifiers();
        self.expect(SyntaxKind::RuleRef, "expected a rule name");
        if self.at_arg_action() {
            self.bump();
        }
        if self.at(SyntaxKind::ReturnsKw) {
            self.bump();
            self.expect_arg_action("expected `[...]` after `returns`");
        }
        if self.at(SyntaxKind::ThrowsKw) {
            self.bump();
            self.expect_name("expected an exception name after `throws`");
            while self.at(SyntaxKind::Comma) {
                self.bump();
                self.expect_name("expected an exception name after `,`");
            }
        }
        if self.at(SyntaxKind::LocalsKw) {
            self.bump();
            self.expect_arg_action("expected `[...]` after `locals`");
        }
        while matches!(
            self.builder.current(),
            Some(SyntaxKind::OptionsKw | SyntaxKind::At)
        ) {
            if self.at(SyntaxKind::OptionsKw) {
                self.options_spec();
            } else {
                self.named_action();
            }
        }
        self.expect(SyntaxKind::Colon, "expected `:` before the rule body");
        self.alt_list();
        self.expect(SyntaxKind::Semicolon, "expected `;` after the rule body");
        self.exception_group();
        m.complete(&mut self.builder, SyntaxKind::ParserRule);
    }

    /// lexerRule: `fragment`? NAME optionsSpec? `:` altList `;`
    fn lexer_rule(&mut self) {
        let m = self.builder.mark();
        self.modifiers();
        self.expect(SyntaxKind::TokenRef, "expected a token name");
        if self.at(SyntaxKind::OptionsKw) {
            self.options_spec();
        }
        self.expect(SyntaxKind::Colon, "expected `:` before the rule body");
        self.alt_list();
        self.expect(SyntaxKind::Semicolon, "expected `;` after the rule body");
        m.complete(&mut self.builder, SyntaxKind::LexerRule);
    }

    /// catch / finally handlers after the closing `;` of a parser rule.
    fn exception_group(&mut self) {
        while self.at(SyntaxKind::CatchKw) {
            let m = self.builder.mark();
            self.bump();
            self.expect_arg_action("expected `[...]` after `catch`");
            self.expect_action("expected `{...}` after the catch argument");
            m.complete(&mut self.builder, SyntaxKind::ExceptionHandler);
        }
        if self.at(SyntaxKind::FinallyKw) {
            let m = self.builder.mark();
            self.bump();
            self.expect_action("expected `{...}` after `finally`");
            m.complete(&mut self.builder, SyntaxKind::ExceptionHandler);
        }
    }

    /// altList: alternative (`|` alternative)*
    fn alt_list(&mut self) {
        let m = self.builder.mark();
        self.alternative();
        while self.at(SyntaxKind::Or) {
            self.bump();
            self.alternative();
        }
        m.complete(&mut self.builder, SyntaxKind::AltList);
    }

    /// alternative: elementOptions? element* lexerCommands? (`#` label)?
    fn alternative(&mut self) {
        let m = self.builder.mark();
        if self.at(SyntaxKind::Lt) {
            self.element_options();
        }
        loop {
            match self.builder.current() {
                None => break,
                Some(
                    SyntaxKind::Or
                    | SyntaxKind::Semicolon
                    | SyntaxKind::RParen
                    | SyntaxKind::Arrow
                    | SyntaxKind::Pound,
                ) => break,
                // A name followed by `:` can only start the next rule;
                // don't swallow it when the closing `;` is missing.
                Some(SyntaxKind::TokenRef | SyntaxKind::RuleRef)
                    if self.nth(1) == Some(SyntaxKind::Colon) =>
                {
                    break
                }
                Some(_) => {
                    if !self.element() {
                        break;
                    }
                }
            }
        }
        if self.at(SyntaxKind::Arrow) {
            self.lexer_commands();
        }
        if self.at(SyntaxKind::Pound) {
            self.bump();
            self.expect_name("expected a label after `#`");
        }
        m.complete(&mut self.builder, SyntaxKind::Alternative);
    }

    /// element: (label (`=` | `+=`))? atom suffix?
    ///
    /// Returns false if the current token cannot start an element.
    fn element(&mut self) -> bool {
        if matches!(
            self.builder.current(),
            Some(SyntaxKind::TokenRef | SyntaxKind::RuleRef)
        ) && matches!(
            self.nth(1),
            Some(SyntaxKind::Eq | SyntaxKind::PlusEq)
        ) {
            self.bump();
            self.bump();
        }
        if !self.atom() {
            return false;
        }
        self.suffix();
        true
    }

    fn atom(&mut self) -> bool {
        match self.builder.current() {
            Some(SyntaxKind::TokenRef) => {
                self.bump();
                self.maybe_element_options();
                true
            }
            Some(SyntaxKind::RuleRef) => {
                self.bump();
                if self.at_arg_action() {
                    self.bump();
                }
                self.maybe_element_options();
                true
            }
            Some(SyntaxKind::StringLiteral | SyntaxKind::UnterminatedString) => {
                self.bump();
                if self.at(SyntaxKind::DotDot) {
                    self.bump();
                    if matches!(
                        self.builder.current(),
                        Some(SyntaxKind::StringLiteral | SyntaxKind::UnterminatedString)
                    ) {
                        self.bump();
                    } else {
                        self.builder.error("expected the upper bound of the range");
                    }
                }
                self.maybe_element_options();
                true
            }
            Some(SyntaxKind::LexerCharSet | SyntaxKind::UnterminatedCharSet) => {
                self.bump();
                true
            }
            Some(SyntaxKind::Dot) => {
                self.bump();
                self.maybe_element_options();
                true
            }
            Some(SyntaxKind::Tilde) => {
                self.bump();
                if !self.atom() {
                    self.builder.error("expected a set after `~`");
                }
                true
            }
            Some(SyntaxKind::LParen) => {
                self.block();
                true
            }
            Some(SyntaxKind::Action | SyntaxKind::UnterminatedAction) => {
                self.bump();
                // `{...}?` is a semantic predicate.
                if self.at(SyntaxKind::Question) {
                    self.bump();
                }
                true
            }
            Some(SyntaxKind::ArgAction | SyntaxKind::UnterminatedArgAction) => {
                self.bump();
                true
            }
            _ => false,
        }
    }

    /// `?`, `*` or `+`, each optionally followed by `?` for non-greedy.
    fn suffix(&mut self) {
        if matches!(
            self.builder.current(),
            Some(SyntaxKind::Question | SyntaxKind::Star | SyntaxKind::Plus)
        ) {
            self.bump();
            if self.at(SyntaxKind::Question) {
                self.bump();
            }
        }
    }

    /// block: `(` altList `)`
    fn block(&mut self) {
        let m = self.builder.mark();
        self.bump();
        self.alt_list();
        self.expect(SyntaxKind::RParen, "expected `)` to close the block");
        m.complete(&mut self.builder, SyntaxKind::Block);
    }

    /// lexerCommands: `->` command (`,` command)*
    fn lexer_commands(&mut self) {
        let m = self.builder.mark();
        self.bump();
        self.lexer_command();
        while self.at(SyntaxKind::Comma) {
            self.bump();
            self.lexer_command();
        }
        m.complete(&mut self.builder, SyntaxKind::LexerCommands);
    }

    /// lexerCommand: name (`(` (name | int) `)`)?
    fn lexer_command(&mut self) {
        let m = self.builder.mark();
        match self.builder.current() {
            Some(SyntaxKind::TokenRef | SyntaxKind::RuleRef | SyntaxKind::ModeKw) => self.bump(),
            _ => self.builder.error("expected a lexer command after `->`"),
        }
        if self.at(SyntaxKind::LParen) {
            self.bump();
            match self.builder.current() {
                Some(SyntaxKind::TokenRef | SyntaxKind::RuleRef | SyntaxKind::Int) => self.bump(),
                _ => self.builder.error("expected a command argument"),
            }
            self.expect(SyntaxKind::RParen, "expected `)` after the command argument");
        }
        m.complete(&mut self.builder, SyntaxKind::LexerCommand);
    }

    fn maybe_element_options(&mut self) {
        if self.at(SyntaxKind::Lt) {
            self.element_options();
        }
    }

    /// elementOptions: `<` ... `>`, kept flat; the contents carry no
    /// structure the IDE cares about.
    fn element_options(&mut self) {
        self.bump();
        while let Some(kind) = self.builder.current() {
            match kind {
                SyntaxKind::Gt | SyntaxKind::Semicolon => break,
                _ => self.bump(),
            }
        }
        self.expect(SyntaxKind::Gt, "expected `>` to close element options");
    }

    fn recover_top_level(&mut self) {
        let m = self.builder.mark();
        while let Some(kind) = self.builder.current() {
            if matches!(
                kind,
                SyntaxKind::OptionsKw
                    | SyntaxKind::TokensKw
                    | SyntaxKind::ChannelsKw
                    | SyntaxKind::ImportKw
                    | SyntaxKind::At
                    | SyntaxKind::ModeKw
                    | SyntaxKind::FragmentKw
                    | SyntaxKind::PublicKw
                    | SyntaxKind::PrivateKw
                    | SyntaxKind::ProtectedKw
                    | SyntaxKind::TokenRef
                    | SyntaxKind::RuleRef
            ) {
                break;
            }
            self.bump();
        }
        self.builder.error_node(m, "expected a rule definition");
    }

    fn at(&self, kind: SyntaxKind) -> bool {
        self.builder.current() == Some(kind)
    }

    fn at_arg_action(&self) -> bool {
        matches!(
            self.builder.current(),
            Some(SyntaxKind::ArgAction | SyntaxKind::UnterminatedArgAction)
        )
    }

    fn nth(&self, n: usize) -> Option<SyntaxKind> {
        self.builder.nth(n)
    }

    /// Consume the current visible token through both views.
    fn bump(&mut self) {
        debug_assert_eq!(
            self.builder.current_span(),
            self.stream.lt(1).span,
            "tree builder and token stream diverged"
        );
        self.stream.consume();
        self.builder.advance();
    }

    fn expect(&mut self, kind: SyntaxKind, message: &str) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            self.builder.error(message);
            false
        }
    }

    fn expect_name(&mut self, message: &str) {
        if matches!(
            self.builder.current(),
            Some(SyntaxKind::TokenRef | SyntaxKind::RuleRef)
        ) {
            self.bump();
        } else {
            self.builder.error(message);
        }
    }

    fn expect_action(&mut self, message: &str) {
        if matches!(
            self.builder.current(),
            Some(SyntaxKind::Action | SyntaxKind::UnterminatedAction)
        ) {
            self.bump();
        } else {
            self.builder.error(message);
        }
    }

    fn expect_arg_action(&mut self, message: &str) {
        if self.at_arg_action() {
            self.bump();
        } else {
            self.builder.error(message);
        }
    }

    /// Wrap the current token in an error node with the given message.
    fn error_and_bump(&mut self, message: &str) {
        let m = self.builder.mark();
        self.bump();
        self.builder.error_node(m, message);
    }
}
