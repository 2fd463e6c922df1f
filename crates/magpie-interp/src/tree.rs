//! Arena parse trees produced by the parser interpreter.
//!
//! These are visualization trees, not the editor's syntax trees: interior
//! nodes carry the rule and its resolved outer alternative, leaves carry
//! token indices. Rendering follows the classic s-expression shape, e.g.
//! `(e:2 a <error .>)`.

use crate::atn::Atn;
use crate::token::{TokenBuffer, TokenType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Rule {
        rule: u16,
        /// Outermost alternative number chosen for this invocation;
        /// 0 when the rule has a single alternative.
        outer_alt: u16,
        /// Marks the node whose decision was forced by an override.
        override_root: bool,
    },
    /// Consumed token, by buffer index.
    Token(u32),
    /// Token consumed (or skipped over) during error recovery.
    Error(u32),
    /// Token the recovery pretended to see without consuming anything.
    Missing(TokenType),
    /// Placeholder for children cut away from a lookahead rendering.
    Elided,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct InterpTree {
    nodes: Vec<Node>,
}

impl InterpTree {
    pub fn new() -> InterpTree {
        InterpTree { nodes: Vec::new() }
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, parent, children: Vec::new() });
        if let Some(p) = parent {
            self.nodes[p.0 as usize].children.push(id);
        }
        id
    }

    pub fn add_rule(&mut self, parent: Option<NodeId>, rule: u16) -> NodeId {
        self.push(NodeKind::Rule { rule, outer_alt: 0, override_root: false }, parent)
    }

    pub fn add_token(&mut self, parent: NodeId, index: u32) -> NodeId {
        self.push(NodeKind::Token(index), Some(parent))
    }

    pub fn add_error(&mut self, parent: NodeId, index: u32) -> NodeId {
        self.push(NodeKind::Error(index), Some(parent))
    }

    pub fn add_missing(&mut self, parent: NodeId, ty: TokenType) -> NodeId {
        self.push(NodeKind::Missing(ty), Some(parent))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0 as usize].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0 as usize].parent
    }

    pub fn set_outer_alt(&mut self, id: NodeId, alt: u16) {
        match &mut self.nodes[id.0 as usize].kind {
            NodeKind::Rule { outer_alt, .. } => *outer_alt = alt,
            other => panic!("outer alt on non-rule node {other:?}"),
        }
    }

    pub fn mark_override_root(&mut self, id: NodeId) {
        match &mut self.nodes[id.0 as usize].kind {
            NodeKind::Rule { override_root, .. } => *override_root = true,
            other => panic!("override root on non-rule node {other:?}"),
        }
    }

    /// Strict ancestor test: a node is not its own ancestor.
    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = self.parent(node);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    pub fn find_override_root(&self, from: NodeId) -> Option<NodeId> {
        if matches!(self.kind(from), NodeKind::Rule { override_root: true, .. }) {
            return Some(from);
        }
        self.children(from).iter().find_map(|&c| self.find_override_root(c))
    }

    /// Min/max buffer indices of the real tokens under `id`, if any.
    /// Missing and elided leaves occupy no input.
    pub fn token_interval(&self, id: NodeId) -> Option<(u32, u32)> {
        match self.kind(id) {
            NodeKind::Token(i) | NodeKind::Error(i) => Some((*i, *i)),
            NodeKind::Missing(_) | NodeKind::Elided => None,
            NodeKind::Rule { .. } => {
                let mut interval: Option<(u32, u32)> = None;
                for &child in self.children(id) {
                    if let Some((lo, hi)) = self.token_interval(child) {
                        interval = Some(match interval {
                            None => (lo, hi),
                            Some((a, b)) => (a.min(lo), b.max(hi)),
                        });
                    }
                }
                interval
            }
        }
    }

    /// Deepest rule node whose token interval covers
    /// `start_index..=stop_index`.
    pub fn subtree_enclosing(&self, root: NodeId, start_index: u32, stop_index: u32) -> NodeId {
        let mut cur = root;
        'descend: loop {
            for &child in self.children(cur) {
                if !matches!(self.kind(child), NodeKind::Rule { .. }) {
                    continue;
                }
                if let Some((lo, hi)) = self.token_interval(child) {
                    if lo <= start_index && hi >= stop_index {
                        cur = child;
                        continue 'descend;
                    }
                }
            }
            return cur;
        }
    }

    /// Cut `node`'s direct children down to `start_index..=stop_index`:
    /// out-of-range leaves are dropped, out-of-range rule children become
    /// `…` placeholders unless they contain the override root.
    pub fn strip_children_out_of_range(&mut self, node: NodeId, start_index: u32, stop_index: u32) {
        let children = self.nodes[node.0 as usize].children.clone();
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            let out_of_range = match self.token_interval(child) {
                Some((lo, hi)) => hi < start_index || lo > stop_index,
                // Missing/elided leaves have no interval; keep them.
                None => false,
            };
            if !out_of_range {
                kept.push(child);
                continue;
            }
            match self.kind(child) {
                NodeKind::Rule { .. } => {
                    if self.find_override_root(child).is_some() {
                        kept.push(child);
                    } else {
                        let placeholder = NodeId(self.nodes.len() as u32);
                        self.nodes.push(Node {
                            kind: NodeKind::Elided,
                            parent: Some(node),
                            children: Vec::new(),
                        });
                        kept.push(placeholder);
                    }
                }
                _ => {}
            }
        }
        self.nodes[node.0 as usize].children = kept;
    }

    /// Render `id` in `(rule:alt child …)` form. Leaf-only nodes render
    /// as their text without parentheses.
    pub fn render(&self, id: NodeId, atn: &Atn, buffer: &TokenBuffer) -> String {
        match self.kind(id) {
            NodeKind::Token(i) => escape_ws(buffer.token_text(*i as usize)),
            NodeKind::Error(i) => format!("<error {}>", escape_ws(buffer.token_text(*i as usize))),
            NodeKind::Missing(ty) => format!("<missing {}>", atn.token_name(*ty)),
            NodeKind::Elided => "...".to_owned(),
            NodeKind::Rule { rule, outer_alt, .. } => {
                let mut label = atn.rule_name(*rule).to_owned();
                if *outer_alt != 0 {
                    label = format!("{label}:{outer_alt}");
                }
                if self.children(id).is_empty() {
                    return label;
                }
                let mut out = format!("({label}");
                for &child in self.children(id) {
                    out.push(' ');
                    out.push_str(&self.render(child, atn, buffer));
                }
                out.push(')');
                out
            }
        }
    }
}

fn escape_ws(text: &str) -> String {
    text.replace('\n', "\\n").replace('\r', "\\r").replace('\t', "\\t")
}
