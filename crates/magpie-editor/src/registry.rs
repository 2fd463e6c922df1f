//! Process-global element-kind registry.
//!
//! Editor platforms keep one flat space of element types across all
//! registered languages. Kinds here are cheap copyable ids handed out
//! densely from a single counter; names and raw token/rule numbers live
//! behind the registry. Registration is idempotent per language name, so
//! several editors opening files of the same language concurrently all end
//! up with the same [`ElementKindSet`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use magpie_interp::TokenType;
use once_cell::sync::Lazy;

/// Interned language name. Resolve back with [`language_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LanguageId(u32);

/// Process-global id for one (language, token-or-rule) element type.
///
/// Ids never collide across languages and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKind(u32);

impl ElementKind {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// What an [`ElementKind`] stands for within its language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawElement {
    Token(TokenType),
    Rule(u16),
    Eof,
    BadToken,
}

/// Reverse record for an [`ElementKind`], cloned out of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementKindInfo {
    pub language: LanguageId,
    pub name: String,
    pub raw: RawElement,
}

/// Per-language element-kind tables.
///
/// `token` and `rule` are total over everything the language registered;
/// asking for an unregistered raw number is a programming error on the
/// caller's side and panics.
#[derive(Debug)]
pub struct ElementKindSet {
    language: LanguageId,
    tokens: Vec<ElementKind>,
    rules: Vec<ElementKind>,
    eof: ElementKind,
    bad: ElementKind,
}

impl ElementKindSet {
    pub fn language(&self) -> LanguageId {
        self.language
    }

    pub fn token(&self, ty: TokenType) -> ElementKind {
        if ty.is_eof() {
            return self.eof;
        }
        if ty.is_bad() {
            return self.bad;
        }
        match self.tokens.get(ty.0 as usize) {
            Some(&kind) => kind,
            None => panic!(
                "token type {} is not registered for this language ({} token kinds known)",
                ty.0,
                self.tokens.len()
            ),
        }
    }

    pub fn rule(&self, rule: u16) -> ElementKind {
        match self.rules.get(rule as usize) {
            Some(&kind) => kind,
            None => panic!(
                "rule {} is not registered for this language ({} rule kinds known)",
                rule,
                self.rules.len()
            ),
        }
    }

    pub fn eof(&self) -> ElementKind {
        self.eof
    }

    pub fn bad_token(&self) -> ElementKind {
        self.bad
    }

    pub fn token_kind_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn rule_kind_count(&self) -> usize {
        self.rules.len()
    }
}

#[derive(Default)]
struct Registry {
    languages: HashMap<String, Arc<ElementKindSet>>,
    language_names: Vec<String>,
    kinds: Vec<ElementKindInfo>,
}

impl Registry {
    fn alloc(&mut self, language: LanguageId, name: String, raw: RawElement) -> ElementKind {
        let kind = ElementKind(self.kinds.len() as u32);
        self.kinds.push(ElementKindInfo { language, name, raw });
        kind
    }
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::default()));

/// Registers (or re-fetches) the element kinds for one language.
///
/// The first call for a given `name` allocates one kind per token name, one
/// per rule name, plus the EOF and bad-token sentinels. Later calls with the
/// same name return the same set and ignore the name tables, so callers do
/// not need to coordinate first-use.
pub fn register_language<I, J, S, T>(name: &str, token_names: I, rule_names: J) -> Arc<ElementKindSet>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    J: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut registry = REGISTRY.lock().unwrap();
    if let Some(set) = registry.languages.get(name) {
        return Arc::clone(set);
    }

    let language = LanguageId(registry.language_names.len() as u32);
    registry.language_names.push(name.to_string());

    let tokens: Vec<ElementKind> = token_names
        .into_iter()
        .enumerate()
        .map(|(i, n)| registry.alloc(language, n.into(), RawElement::Token(TokenType(i as u16))))
        .collect();
    let rules: Vec<ElementKind> = rule_names
        .into_iter()
        .enumerate()
        .map(|(i, n)| registry.alloc(language, n.into(), RawElement::Rule(i as u16)))
        .collect();
    let eof = registry.alloc(language, "EOF".to_string(), RawElement::Eof);
    let bad = registry.alloc(language, "BAD_TOKEN".to_string(), RawElement::BadToken);

    tracing::debug!(
        target: "magpie.editor",
        language = name,
        tokens = tokens.len(),
        rules = rules.len(),
        "registered element kinds"
    );

    let set = Arc::new(ElementKindSet { language, tokens, rules, eof, bad });
    registry.languages.insert(name.to_string(), Arc::clone(&set));
    set
}

/// Reverse lookup for a kind previously handed out by [`register_language`].
pub fn kind_info(kind: ElementKind) -> Option<ElementKindInfo> {
    REGISTRY.lock().unwrap().kinds.get(kind.0 as usize).cloned()
}

pub fn language_name(language: LanguageId) -> Option<String> {
    REGISTRY.lock().unwrap().language_names.get(language.0 as usize).cloned()
}
