use rowan::Language;
use serde_repr::{Deserialize_repr, Serialize_repr};

use magpie_interp::TokenType;

/// Unified syntax kind for grammar files: tokens and AST nodes.
///
/// Token kinds come first so their discriminants double as the raw
/// [`TokenType`] values the scanner emits; node kinds follow, above the
/// token range. Keep the ordering stable — the element-kind registry and
/// the replay bridge both index by these values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize_repr, Deserialize_repr,
)]
#[repr(u16)]
pub enum SyntaxKind {
    // --- Trivia ---
    Whitespace,
    LineComment,
    BlockComment,
    DocComment,

    // --- Identifiers & literals ---
    /// Identifier starting with an upper-case letter: a token name.
    TokenRef,
    /// Identifier starting with a lower-case letter: a parser rule name.
    RuleRef,
    Int,
    StringLiteral,
    UnterminatedString,
    /// `[a-z0-9]` bracket set inside a lexer rule.
    LexerCharSet,
    UnterminatedCharSet,
    /// `{...}` embedded target-language action, braces balanced.
    Action,
    UnterminatedAction,
    /// `[...]` argument action inside a parser rule (args, returns, locals).
    ArgAction,
    UnterminatedArgAction,

    // --- Keywords ---
    GrammarKw,
    LexerKw,
    ParserKw,
    FragmentKw,
    ImportKw,
    ModeKw,
    ReturnsKw,
    LocalsKw,
    ThrowsKw,
    CatchKw,
    FinallyKw,
    PublicKw,
    PrivateKw,
    ProtectedKw,

    // --- Block-opening keywords (the token spans through the `{`) ---
    OptionsKw,
    TokensKw,
    ChannelsKw,

    // --- Punctuation ---
    Colon,
    Semicolon,
    Comma,
    LParen,
    RParen,
    RBrace,
    Arrow,
    Lt,
    Gt,
    Eq,
    PlusEq,
    Question,
    Star,
    Plus,
    Or,
    Dollar,
    DotDot,
    Dot,
    At,
    Pound,
    Tilde,

    // --- Special ---
    Error,
    Eof,

    // --- Nodes ---
    GrammarSpec,
    GrammarDecl,
    OptionsSpec,
    OptionSpec,
    TokensSpec,
    ChannelsSpec,
    ImportSpec,
    NamedAction,
    ModeSpec,
    ParserRule,
    LexerRule,
    AltList,
    Alternative,
    Block,
    LexerCommands,
    LexerCommand,
    ExceptionHandler,

    __Last,
}

impl SyntaxKind {
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            SyntaxKind::Whitespace
                | SyntaxKind::LineComment
                | SyntaxKind::BlockComment
                | SyntaxKind::DocComment
        )
    }

    pub fn is_comment(self) -> bool {
        matches!(
            self,
            SyntaxKind::LineComment | SyntaxKind::BlockComment | SyntaxKind::DocComment
        )
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            SyntaxKind::GrammarKw
                | SyntaxKind::LexerKw
                | SyntaxKind::ParserKw
                | SyntaxKind::FragmentKw
                | SyntaxKind::ImportKw
                | SyntaxKind::ModeKw
                | SyntaxKind::ReturnsKw
                | SyntaxKind::LocalsKw
                | SyntaxKind::ThrowsKw
                | SyntaxKind::CatchKw
                | SyntaxKind::FinallyKw
                | SyntaxKind::PublicKw
                | SyntaxKind::PrivateKw
                | SyntaxKind::ProtectedKw
        )
    }

    pub fn is_identifier_like(self) -> bool {
        matches!(self, SyntaxKind::TokenRef | SyntaxKind::RuleRef)
    }

    /// Tokens that open an `options`/`tokens`/`channels` block. The token
    /// text includes the opening brace.
    pub fn is_block_intro(self) -> bool {
        matches!(
            self,
            SyntaxKind::OptionsKw | SyntaxKind::TokensKw | SyntaxKind::ChannelsKw
        )
    }

    pub fn is_node(self) -> bool {
        self >= SyntaxKind::GrammarSpec && self < SyntaxKind::__Last
    }

    /// Keywords that stand alone; `options`/`tokens`/`channels` need brace
    /// lookahead and are handled by the scanner directly.
    pub fn from_keyword(text: &str) -> Option<SyntaxKind> {
        Some(match text {
            "grammar" => SyntaxKind::GrammarKw,
            "lexer" => SyntaxKind::LexerKw,
            "parser" => SyntaxKind::ParserKw,
            "fragment" => SyntaxKind::FragmentKw,
            "import" => SyntaxKind::ImportKw,
            "mode" => SyntaxKind::ModeKw,
            "returns" => SyntaxKind::ReturnsKw,
            "locals" => SyntaxKind::LocalsKw,
            "throws" => SyntaxKind::ThrowsKw,
            "catch" => SyntaxKind::CatchKw,
            "finally" => SyntaxKind::FinallyKw,
            "public" => SyntaxKind::PublicKw,
            "private" => SyntaxKind::PrivateKw,
            "protected" => SyntaxKind::ProtectedKw,
            _ => return None,
        })
    }

    pub fn raw_token(self) -> TokenType {
        debug_assert!(self < SyntaxKind::Error, "{self:?} is not a scanned token kind");
        TokenType(self as u16)
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> rowan::SyntaxKind {
        rowan::SyntaxKind(kind as u16)
    }
}

/// Rowan language marker for grammar files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GrammarLanguage {}

impl Language for GrammarLanguage {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> SyntaxKind {
        if raw.0 < SyntaxKind::__Last as u16 {
            // SAFETY: We've verified the numeric value is within the enum range.
            unsafe { std::mem::transmute::<u16, SyntaxKind>(raw.0) }
        } else {
            // The bad-token sentinel and anything else out of range land on
            // the error leaf kind.
            SyntaxKind::Error
        }
    }

    fn kind_to_raw(kind: SyntaxKind) -> rowan::SyntaxKind {
        kind.into()
    }
}
