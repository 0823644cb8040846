//! Generalized edit schemas.
//!
//! A schema is a before/after pair of skeleton patterns whose holes (slots)
//! stand for the subtrees that varied across training examples. Slots bound
//! by matching the before skeleton are inferable; slots that only occur in
//! the after skeleton need a generator.
mod abstractor;
mod matcher;

pub use abstractor::{HeadPosition, SchemaAbstractor, TrainingExample};
pub use matcher::{match_fragment, match_fragment_with};

use crate::error::{Error, Result};
use crate::tree::{Fragment, NodeClass, NodeSignature, SyntaxNode, Token};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

pub type SlotId = u32;

/// Slot id → bound fragment. Single slots always bind exactly one node.
pub type Bindings = BTreeMap<SlotId, Fragment>;

/// Skeleton tree with slot holes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "pattern")]
pub enum Pattern {
    Node {
        kind: String,
        class: NodeClass,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<Token>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ty: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<Pattern>,
    },
    Slot {
        id: SlotId,
    },
}

impl Pattern {
    /// Fixed skeleton for a concrete subtree.
    pub fn fixed(node: &SyntaxNode) -> Pattern {
        Pattern::Node {
            kind: node.kind.clone(),
            class: node.class,
            token: node.token.clone(),
            ty: node.ty.clone(),
            children: node.children.iter().map(|child| Pattern::fixed(child)).collect(),
        }
    }

    fn collect_slots(&self, out: &mut BTreeSet<SlotId>) {
        match self {
            Pattern::Slot { id } => {
                out.insert(*id);
            }
            Pattern::Node { children, .. } => {
                for child in children {
                    child.collect_slots(out);
                }
            }
        }
    }
}

/// What the schema knows about one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotInfo {
    pub signature: NodeSignature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<NodeClass>,
    /// Bound by matching the before skeleton; no generator needed.
    pub inferable: bool,
}

impl SlotInfo {
    pub fn accepts(&self, node: &SyntaxNode) -> bool {
        self.signature.accepts(node) && (self.class.is_none() || self.class == Some(node.class))
    }
}

/// Top-level shape of what a schema rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaShape {
    SingleExpr,
    ExprList,
    SingleStmt,
    StmtList,
}

impl SchemaShape {
    pub fn from_parts(class: NodeClass, list: bool) -> Self {
        match (class == NodeClass::Expr, list) {
            (true, false) => SchemaShape::SingleExpr,
            (true, true) => SchemaShape::ExprList,
            (false, false) => SchemaShape::SingleStmt,
            (false, true) => SchemaShape::StmtList,
        }
    }

    pub fn is_expr(self) -> bool {
        matches!(self, SchemaShape::SingleExpr | SchemaShape::ExprList)
    }

    pub fn is_list(self) -> bool {
        matches!(self, SchemaShape::ExprList | SchemaShape::StmtList)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformSchema {
    /// Node kinds the edit is permitted inside. Empty means anywhere.
    #[serde(default)]
    pub scope: BTreeSet<NodeSignature>,
    pub shape: SchemaShape,
    /// Rewrites declarations (class members) rather than code.
    #[serde(default)]
    pub class_shaped: bool,
    pub before: Vec<Pattern>,
    pub after: Vec<Pattern>,
    pub slots: BTreeMap<SlotId, SlotInfo>,
}

impl TransformSchema {
    /// Slots the after skeleton needs a generator for, in id order.
    pub fn generated_slots(&self) -> Vec<SlotId> {
        let mut referenced = BTreeSet::new();
        for pattern in &self.after {
            pattern.collect_slots(&mut referenced);
        }
        referenced
            .into_iter()
            .filter(|id| self.slots.get(id).is_some_and(|info| !info.inferable))
            .collect()
    }

    /// Before skeleton is one bare slot, so it matches on the slot signature alone.
    pub fn unanchored_slot(&self) -> Option<&SlotInfo> {
        match self.before.as_slice() {
            [Pattern::Slot { id }] => self.slots.get(id),
            _ => None,
        }
    }

    pub fn slot(&self, id: SlotId) -> Option<&SlotInfo> {
        self.slots.get(&id)
    }

    /// Copy of this schema with the after pattern at `path` replaced by one
    /// fresh generated slot. Generated slots only used inside the replaced
    /// subtree are dropped. Returns the copy and the new slot id.
    pub fn with_generated_head(
        &self,
        path: &[usize],
        signature: NodeSignature,
        class: Option<NodeClass>,
    ) -> Option<(TransformSchema, SlotId)> {
        let id = self.slots.keys().next_back().map_or(0, |last| last + 1);
        let mut schema = self.clone();
        let (first, rest) = path.split_first()?;
        let mut pattern = schema.after.get_mut(*first)?;
        for idx in rest {
            pattern = match pattern {
                Pattern::Node { children, .. } => children.get_mut(*idx)?,
                Pattern::Slot { .. } => return None,
            };
        }
        *pattern = Pattern::Slot { id };
        schema.slots.insert(
            id,
            SlotInfo {
                signature,
                class,
                inferable: false,
            },
        );
        let mut referenced = BTreeSet::new();
        for pattern in schema.before.iter().chain(&schema.after) {
            pattern.collect_slots(&mut referenced);
        }
        schema.slots.retain(|slot, _| referenced.contains(slot));
        schema.validate().ok()?;
        Some((schema, id))
    }

    /// Check the slot table against both skeletons.
    pub fn validate(&self) -> Result<()> {
        let mut before = BTreeSet::new();
        for pattern in &self.before {
            pattern.collect_slots(&mut before);
        }
        let mut after = BTreeSet::new();
        for pattern in &self.after {
            pattern.collect_slots(&mut after);
        }
        for id in before.iter().chain(after.iter()) {
            if !self.slots.contains_key(id) {
                return Err(Error::InvalidTransform(format!(
                    "slot {id} is referenced but not declared"
                )));
            }
        }
        for (id, info) in &self.slots {
            if info.inferable && !before.contains(id) {
                return Err(Error::InvalidTransform(format!(
                    "slot {id} is marked inferable but never bound by the before skeleton"
                )));
            }
            if !info.inferable && before.contains(id) {
                return Err(Error::InvalidTransform(format!(
                    "slot {id} is bound by the before skeleton but marked as generated"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Slot { id } => write!(f, "${id}"),
            Pattern::Node {
                kind,
                class,
                token,
                ty,
                children,
            } => {
                let leaf = SyntaxNode {
                    kind: kind.clone(),
                    class: *class,
                    token: token.clone(),
                    ty: ty.clone(),
                    children: Vec::new(),
                };
                if children.is_empty() {
                    return write!(f, "{leaf}");
                }
                let head = leaf.to_string();
                let head = head.trim_start_matches('(').trim_end_matches(')');
                write!(f, "({head}")?;
                for child in children {
                    write!(f, " {child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Space-separated rendering of a skeleton.
pub fn render_patterns(patterns: &[Pattern]) -> String {
    patterns
        .iter()
        .map(|pattern| pattern.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the fragment an after skeleton describes under `bindings`.
///
/// Returns `None` when a referenced slot is unbound.
pub fn instantiate(patterns: &[Pattern], bindings: &Bindings) -> Option<Fragment> {
    let mut out = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        match pattern {
            Pattern::Slot { id } => out.extend(bindings.get(id)?.iter().cloned()),
            Pattern::Node {
                kind,
                class,
                token,
                ty,
                children,
            } => {
                let children = instantiate(children, bindings)?;
                out.push(Arc::new(SyntaxNode {
                    kind: kind.clone(),
                    class: *class,
                    token: token.clone(),
                    ty: ty.clone(),
                    children,
                }));
            }
        }
    }
    Some(out)
}
