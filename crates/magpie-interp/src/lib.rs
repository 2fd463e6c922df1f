//! Grammar interpretation runtime.
//!
//! Grammars arrive as prebuilt automata ([`AtnBuilder`], [`LexerAtnBuilder`])
//! and run without generated code:
//! - [`LexerInterpreter`]: mode-stack tokenizer implementing [`ModalLexer`],
//!   restartable from any captured [`ModeState`].
//! - [`ParserInterpreter`]: interpretive parser with adaptive two-phase
//!   prediction, pluggable error policies, and opt-in profiling
//!   ([`ParseInfo`]).
//! - [`lookahead_trees`] / [`ambiguity_trees`]: re-parse a finished run
//!   with one decision pinned per alternative, for visualization.

mod atn;
mod error;
mod lexer;
mod lookahead;
mod parser;
mod predict;
mod profiler;
mod stream;
mod token;
mod tree;

pub use atn::{
    Atn, AtnBuilder, AtnState, CharElem, CharSet, CharTransition, Elem, LexerAtn,
    LexerAtnBuilder, LexerAtnState, LexerCommand, LexerMode, LexerRule, RuleInfo, StateId,
    StateKind, TokenSet, Transition, DEFAULT_MODE,
};
pub use atn::literal;
pub use error::{AtnError, AtnResult, SyntaxError};
pub use lexer::{CaseTransform, LexerInput, LexerInterpreter, ModalLexer, ModeState};
pub use lookahead::{ambiguity_trees, deepest_look_event, lookahead_trees, LookaheadTree};
pub use parser::{
    DecisionOverride, ErrorPolicy, ParseRun, ParserInterpreter, ParserOptions, PredictionEvent,
};
pub use profiler::{DecisionInfo, DecisionSite, LookEvent, ParseInfo};
pub use stream::TokenStream;
pub use token::{Channel, TextSpan, Token, TokenBuffer, TokenType};
pub use tree::{InterpTree, NodeId, NodeKind};
