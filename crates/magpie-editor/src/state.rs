//! Scanner continuation state and its dense interning table.
//!
//! Editor hosts persist "where was the lexer" as a small integer per token
//! boundary so highlighting can restart mid-buffer after an edit. A
//! [`LexerState`] captures everything a modal scanner needs to resume
//! (mode, pushed-mode stack, auxiliary context); a [`StateTable`] maps each
//! distinct state to a dense `u32` and back.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use magpie_interp::ModeState;

/// Immutable snapshot of a modal scanner's position between two tokens.
///
/// Equality is structural over all three fields; the hash is computed once
/// at construction because states are created on every token boundary and
/// probed against the interning table far more often than they are built.
#[derive(Debug, Clone)]
pub struct LexerState {
    mode_state: ModeState,
    hash: u64,
}

impl LexerState {
    pub fn new(mode_state: ModeState) -> LexerState {
        let mut hasher = DefaultHasher::new();
        mode_state.hash(&mut hasher);
        LexerState { hash: hasher.finish(), mode_state }
    }

    /// Default mode, empty stack, zero context: the state every scan of a
    /// fresh buffer starts in.
    pub fn initial() -> LexerState {
        LexerState::new(ModeState::initial())
    }

    pub fn mode(&self) -> u16 {
        self.mode_state.mode
    }

    pub fn stack(&self) -> &[u16] {
        &self.mode_state.stack
    }

    pub fn context(&self) -> u16 {
        self.mode_state.context
    }

    pub fn mode_state(&self) -> &ModeState {
        &self.mode_state
    }
}

impl PartialEq for LexerState {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.mode_state == other.mode_state
    }
}

impl Eq for LexerState {}

impl Hash for LexerState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Append-only bidirectional map from [`LexerState`] to a dense `u32`.
///
/// Indices are assigned in first-seen order starting at 0 and never change
/// meaning for the lifetime of the table. One table belongs to one scanner
/// adaptor; indices from different tables are not comparable.
#[derive(Debug, Default)]
pub struct StateTable {
    states: Vec<LexerState>,
    index: HashMap<LexerState, u32>,
}

impl StateTable {
    pub fn new() -> StateTable {
        StateTable::default()
    }

    /// Returns the dense index for `state`, assigning the next one on first
    /// sight. Idempotent for equal states.
    pub fn intern(&mut self, state: &LexerState) -> u32 {
        if let Some(&idx) = self.index.get(state) {
            return idx;
        }
        let idx = self.states.len() as u32;
        self.states.push(state.clone());
        self.index.insert(state.clone(), idx);
        idx
    }

    /// Reverse lookup. An index this table never handed out is a host
    /// programming error, not a recoverable condition.
    pub fn get(&self, index: u32) -> &LexerState {
        let len = self.states.len();
        self.states.get(index as usize).unwrap_or_else(|| {
            panic!("continuation {index} was never interned (table holds {len} states)")
        })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
