//! Typed views over the raw syntax tree.
//!
//! Each wrapper owns a [`SyntaxNode`] of a known kind and exposes the
//! children an IDE feature actually asks for. Casting is free; the
//! wrappers hold no state beyond the node itself.

use crate::parser::{SyntaxNode, SyntaxToken};
use crate::syntax_kind::SyntaxKind;

pub trait AstNode: Sized {
    fn can_cast(kind: SyntaxKind) -> bool;
    fn cast(syntax: SyntaxNode) -> Option<Self>;
    fn syntax(&self) -> &SyntaxNode;
}

pub mod support {
    use crate::ast::AstNode;
    use crate::parser::{SyntaxNode, SyntaxToken};
    use crate::syntax_kind::SyntaxKind;

    pub fn child<N: AstNode>(node: &SyntaxNode) -> Option<N> {
        node.children().find_map(N::cast)
    }

    pub fn children<'a, N: AstNode + 'a>(node: &'a SyntaxNode) -> impl Iterator<Item = N> + 'a {
        node.children().filter_map(N::cast)
    }

    pub fn token(node: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxToken> {
        node.children_with_tokens()
            .filter_map(|it| it.into_token())
            .find(|tok| tok.kind() == kind)
    }

    /// Returns the first identifier-like token among the node's direct
    /// children. Rule and mode names sit in this position.
    pub fn ident_token(node: &SyntaxNode) -> Option<SyntaxToken> {
        ident_tokens(node).next()
    }

    pub fn ident_tokens(node: &SyntaxNode) -> impl Iterator<Item = SyntaxToken> + '_ {
        node.children_with_tokens()
            .filter_map(|it| it.into_token())
            .filter(|tok| tok.kind().is_identifier_like())
    }
}

macro_rules! ast_node {
    ($name:ident, $kind:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            syntax: SyntaxNode,
        }

        impl AstNode for $name {
            fn can_cast(kind: SyntaxKind) -> bool {
                kind == SyntaxKind::$kind
            }

            fn cast(syntax: SyntaxNode) -> Option<Self> {
                Self::can_cast(syntax.kind()).then_some(Self { syntax })
            }

            fn syntax(&self) -> &SyntaxNode {
                &self.syntax
            }
        }
    };
}

ast_node!(GrammarSpec, GrammarSpec);
ast_node!(GrammarDecl, GrammarDecl);
ast_node!(OptionsSpec, OptionsSpec);
ast_node!(OptionSpec, OptionSpec);
ast_node!(TokensSpec, TokensSpec);
ast_node!(ChannelsSpec, ChannelsSpec);
ast_node!(ImportSpec, ImportSpec);
ast_node!(NamedAction, NamedAction);
ast_node!(ModeSpec, ModeSpec);
ast_node!(ParserRule, ParserRule);
ast_node!(LexerRule, LexerRule);
ast_node!(AltList, AltList);
ast_node!(Alternative, Alternative);
ast_node!(Block, Block);
ast_node!(LexerCommands, LexerCommands);
ast_node!(LexerCommand, LexerCommand);
ast_node!(ExceptionHandler, ExceptionHandler);

impl GrammarSpec {
    pub fn decl(&self) -> Option<GrammarDecl> {
        support::child::<GrammarDecl>(&self.syntax)
    }

    pub fn options(&self) -> Option<OptionsSpec> {
        support::child::<OptionsSpec>(&self.syntax)
    }

    pub fn tokens_spec(&self) -> Option<TokensSpec> {
        support::child::<TokensSpec>(&self.syntax)
    }

    pub fn channels_spec(&self) -> Option<ChannelsSpec> {
        support::child::<ChannelsSpec>(&self.syntax)
    }

    pub fn imports(&self) -> impl Iterator<Item = ImportSpec> + '_ {
        support::children::<ImportSpec>(&self.syntax)
    }

    pub fn named_actions(&self) -> impl Iterator<Item = NamedAction> + '_ {
        support::children::<NamedAction>(&self.syntax)
    }

    /// Rules declared before the first `mode` directive.
    pub fn rules(&self) -> impl Iterator<Item = Rule> + '_ {
        support::children::<Rule>(&self.syntax)
    }

    pub fn modes(&self) -> impl Iterator<Item = ModeSpec> + '_ {
        support::children::<ModeSpec>(&self.syntax)
    }
}

impl GrammarDecl {
    pub fn name_token(&self) -> Option<SyntaxToken> {
        support::ident_token(&self.syntax)
    }

    pub fn is_lexer_grammar(&self) -> bool {
        support::token(&self.syntax, SyntaxKind::LexerKw).is_some()
    }

    pub fn is_parser_grammar(&self) -> bool {
        support::token(&self.syntax, SyntaxKind::ParserKw).is_some()
    }
}

impl OptionsSpec {
    pub fn options(&self) -> impl Iterator<Item = OptionSpec> + '_ {
        support::children::<OptionSpec>(&self.syntax)
    }

    /// The `options {` intro token.
    pub fn intro_token(&self) -> Option<SyntaxToken> {
        support::token(&self.syntax, SyntaxKind::OptionsKw)
    }

    pub fn rbrace_token(&self) -> Option<SyntaxToken> {
        support::token(&self.syntax, SyntaxKind::RBrace)
    }
}

impl OptionSpec {
    pub fn name_token(&self) -> Option<SyntaxToken> {
        support::ident_token(&self.syntax)
    }
}

impl TokensSpec {
    pub fn name_tokens(&self) -> impl Iterator<Item = SyntaxToken> + '_ {
        support::ident_tokens(&self.syntax)
    }

    pub fn intro_token(&self) -> Option<SyntaxToken> {
        support::token(&self.syntax, SyntaxKind::TokensKw)
    }

    pub fn rbrace_token(&self) -> Option<SyntaxToken> {
        support::token(&self.syntax, SyntaxKind::RBrace)
    }
}

impl ChannelsSpec {
    pub fn name_tokens(&self) -> impl Iterator<Item = SyntaxToken> + '_ {
        support::ident_tokens(&self.syntax)
    }

    pub fn intro_token(&self) -> Option<SyntaxToken> {
        support::token(&self.syntax, SyntaxKind::ChannelsKw)
    }

    pub fn rbrace_token(&self) -> Option<SyntaxToken> {
        support::token(&self.syntax, SyntaxKind::RBrace)
    }
}

impl ImportSpec {
    pub fn name_tokens(&self) -> impl Iterator<Item = SyntaxToken> + '_ {
        support::ident_tokens(&self.syntax)
    }
}

impl NamedAction {
    /// The action name, e.g. `members` in `@parser::members {...}`.
    pub fn name_token(&self) -> Option<SyntaxToken> {
        support::ident_tokens(&self.syntax).last()
    }

    pub fn action_token(&self) -> Option<SyntaxToken> {
        support::token(&self.syntax, SyntaxKind::Action)
            .or_else(|| support::token(&self.syntax, SyntaxKind::UnterminatedAction))
    }
}

impl ModeSpec {
    pub fn name_token(&self) -> Option<SyntaxToken> {
        support::ident_token(&self.syntax)
    }

    pub fn rules(&self) -> impl Iterator<Item = LexerRule> + '_ {
        support::children::<LexerRule>(&self.syntax)
    }
}

impl ParserRule {
    pub fn name_token(&self) -> Option<SyntaxToken> {
        support::ident_token(&self.syntax)
    }

    pub fn options(&self) -> Option<OptionsSpec> {
        support::child::<OptionsSpec>(&self.syntax)
    }

    pub fn alt_list(&self) -> Option<AltList> {
        support::child::<AltList>(&self.syntax)
    }

    pub fn exception_handlers(&self) -> impl Iterator<Item = ExceptionHandler> + '_ {
        support::children::<ExceptionHandler>(&self.syntax)
    }
}

impl LexerRule {
    pub fn name_token(&self) -> Option<SyntaxToken> {
        support::token(&self.syntax, SyntaxKind::TokenRef)
    }

    pub fn is_fragment(&self) -> bool {
        support::token(&self.syntax, SyntaxKind::FragmentKw).is_some()
    }

    pub fn options(&self) -> Option<OptionsSpec> {
        support::child::<OptionsSpec>(&self.syntax)
    }

    pub fn alt_list(&self) -> Option<AltList> {
        support::child::<AltList>(&self.syntax)
    }
}

impl AltList {
    pub fn alternatives(&self) -> impl Iterator<Item = Alternative> + '_ {
        support::children::<Alternative>(&self.syntax)
    }
}

impl Alternative {
    /// The `# label` name, when present.
    pub fn label_token(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(|it| it.into_token())
            .skip_while(|tok| tok.kind() != SyntaxKind::Pound)
            .find(|tok| tok.kind().is_identifier_like())
    }

    pub fn lexer_commands(&self) -> Option<LexerCommands> {
        support::child::<LexerCommands>(&self.syntax)
    }
}

impl Block {
    pub fn alt_list(&self) -> Option<AltList> {
        support::child::<AltList>(&self.syntax)
    }
}

impl LexerCommands {
    pub fn commands(&self) -> impl Iterator<Item = LexerCommand> + '_ {
        support::children::<LexerCommand>(&self.syntax)
    }
}

impl LexerCommand {
    /// The command itself, e.g. `skip` or `channel`. `mode` doubles as a
    /// command name, so the keyword token qualifies here too.
    pub fn name_token(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(|it| it.into_token())
            .find(|tok| tok.kind().is_identifier_like() || tok.kind() == SyntaxKind::ModeKw)
    }

    /// The parenthesized argument, e.g. `HIDDEN` in `channel(HIDDEN)`.
    pub fn argument_token(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(|it| it.into_token())
            .skip_while(|tok| tok.kind() != SyntaxKind::LParen)
            .find(|tok| tok.kind().is_identifier_like() || tok.kind() == SyntaxKind::Int)
    }
}

impl ExceptionHandler {
    pub fn is_finally(&self) -> bool {
        support::token(&self.syntax, SyntaxKind::FinallyKw).is_some()
    }

    pub fn action_token(&self) -> Option<SyntaxToken> {
        support::token(&self.syntax, SyntaxKind::Action)
            .or_else(|| support::token(&self.syntax, SyntaxKind::UnterminatedAction))
    }
}

/// Either kind of rule definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    ParserRule(ParserRule),
    LexerRule(LexerRule),
}

impl AstNode for Rule {
    fn can_cast(kind: SyntaxKind) -> bool {
        ParserRule::can_cast(kind) || LexerRule::can_cast(kind)
    }

    fn cast(syntax: SyntaxNode) -> Option<Self> {
        match syntax.kind() {
            SyntaxKind::ParserRule => ParserRule::cast(syntax).map(Self::ParserRule),
            SyntaxKind::LexerRule => LexerRule::cast(syntax).map(Self::LexerRule),
            _ => None,
        }
    }

    fn syntax(&self) -> &SyntaxNode {
        match self {
            Self::ParserRule(it) => it.syntax(),
            Self::LexerRule(it) => it.syntax(),
        }
    }
}

impl Rule {
    pub fn name_token(&self) -> Option<SyntaxToken> {
        match self {
            Self::ParserRule(it) => it.name_token(),
            Self::LexerRule(it) => it.name_token(),
        }
    }
}
