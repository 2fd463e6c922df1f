//! Editor-platform adaptors around the interpretive grammar runtime.
//!
//! Editor hosts drive languages through two narrow seams, and this crate
//! implements both over any [`magpie_interp::ModalLexer`]:
//!
//! - **Restartable scanning**: [`RestartableLexer`] tiles a buffer with
//!   tokens and reports a dense continuation integer per token boundary
//!   ([`StateTable`]), so highlighting can restart mid-buffer after an
//!   edit. Element types are process-global ids from the
//!   [`register_language`] registry.
//! - **Lossless tree building**: [`TreeBuilder`] buffers marker and token
//!   events over a pre-lexed cache and replays them into a
//!   `rowan::GreenNode` whose text equals the input exactly. The
//!   [`capture_tokens`] bridge re-presents the same cache as a buffered
//!   token stream for automaton-driven parsers, so lexing happens once.

mod builder;
mod registry;
mod replay;
mod scanner;
mod state;

pub use builder::{BufferedToken, Marker, ParseError, TreeBuilder};
pub use registry::{
    kind_info, language_name, register_language, ElementKind, ElementKindInfo, ElementKindSet,
    LanguageId, RawElement,
};
pub use replay::{capture_tokens, ReplaySource};
pub use scanner::{RestartableLexer, ScannerConfig};
pub use state::{LexerState, StateTable};
