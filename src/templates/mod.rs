//! Hand-authored transforms.
//!
//! A rule spells out its before/after skeletons as small trees with slot
//! placeholders and declares what each slot accepts. `build` runs the pair
//! through the same abstractor corpus learning uses, so a rule yields the
//! same kind of transform a learned one does.
mod bundles;

pub use bundles::TemplateBundle;

use crate::error::{Error, Result};
use crate::generator::VarGenerator;
use crate::schema::{SchemaAbstractor, SchemaShape, SlotId};
use crate::site::Site;
use crate::transform::CodeTransform;
use crate::tree::{kinds, NodeClass, NodeSignature, SyntaxNode, Token};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Slot placeholder for skeleton construction.
pub fn hole(id: SlotId, class: NodeClass) -> SyntaxNode {
    SyntaxNode::new(kinds::PLACEHOLDER, class).with_token(Token::Literal(id.to_string()))
}

pub fn expr_hole(id: SlotId) -> SyntaxNode {
    hole(id, NodeClass::Expr)
}

pub fn stmt_hole(id: SlotId) -> SyntaxNode {
    hole(id, NodeClass::Stmt)
}

pub fn unary(op: &str, operand: SyntaxNode) -> SyntaxNode {
    SyntaxNode::new(kinds::UNARY, NodeClass::Expr)
        .with_token(Token::Operator(op.to_string()))
        .with_children(vec![Arc::new(operand)])
}

pub fn block(body: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::stmt(kinds::BLOCK, body)
}

pub fn if_then(cond: SyntaxNode, body: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::stmt(kinds::IF, vec![cond, block(body)])
}

pub fn return_void() -> SyntaxNode {
    SyntaxNode::stmt(kinds::RETURN, Vec::new())
}

#[derive(Debug, Clone)]
struct SlotSpec {
    signature: NodeSignature,
    class: Option<NodeClass>,
    generator: Option<VarGenerator>,
}

/// Builder for one hand-authored transform.
#[derive(Debug, Clone)]
pub struct TemplateRule {
    name: String,
    scope: Vec<NodeSignature>,
    shape: Option<SchemaShape>,
    class_shaped: bool,
    slots: BTreeMap<SlotId, SlotSpec>,
    before: Vec<SyntaxNode>,
    after: Vec<SyntaxNode>,
}

impl TemplateRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: Vec::new(),
            shape: None,
            class_shaped: false,
            slots: BTreeMap::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Restrict the rule to sites nested in a node of this kind. Repeatable.
    pub fn inside(mut self, kind: &str) -> Self {
        self.scope.push(NodeSignature::single(kind));
        self
    }

    /// Override the shape inferred from the before skeleton.
    pub fn shape(mut self, shape: SchemaShape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn class_shaped(mut self) -> Self {
        self.class_shaped = true;
        self
    }

    /// Declare a slot bound by the before skeleton.
    pub fn bound(mut self, id: SlotId, kind: &str, class: Option<NodeClass>) -> Self {
        self.slots.insert(
            id,
            SlotSpec {
                signature: NodeSignature::single(kind),
                class,
                generator: None,
            },
        );
        self
    }

    /// Declare a slot only the after skeleton uses, with its generator.
    pub fn generated(mut self, id: SlotId, kind: &str, generator: VarGenerator) -> Self {
        self.slots.insert(
            id,
            SlotSpec {
                signature: NodeSignature::single(kind),
                class: None,
                generator: Some(generator),
            },
        );
        self
    }

    pub fn before(mut self, nodes: Vec<SyntaxNode>) -> Self {
        self.before = nodes;
        self
    }

    pub fn after(mut self, nodes: Vec<SyntaxNode>) -> Self {
        self.after = nodes;
        self
    }

    pub fn build(&self) -> Result<CodeTransform> {
        let invalid = |message: String| Error::InvalidTransform(format!("{}: {message}", self.name));
        let site = Site::new(
            self.scope.clone(),
            self.before.iter().cloned().map(Arc::new).collect(),
        );
        let mut abstractor = SchemaAbstractor::new();
        abstractor.add_mapping(site, self.after.iter().cloned().map(Arc::new).collect());
        if !abstractor.generalize() {
            return Err(invalid("skeletons do not generalize".to_string()));
        }
        let mut schema = abstractor
            .schema()
            .cloned()
            .ok_or_else(|| invalid("no schema produced".to_string()))?;
        if let Some(shape) = self.shape {
            schema.shape = shape;
        }
        schema.class_shaped |= self.class_shaped;

        let mut generators = BTreeMap::new();
        for (id, decl) in &self.slots {
            let info = schema
                .slots
                .get_mut(id)
                .ok_or_else(|| invalid(format!("slot {id} is declared but never used")))?;
            info.signature = decl.signature.clone();
            info.class = decl.class;
            match (&decl.generator, info.inferable) {
                (Some(generator), false) => {
                    generators.insert(*id, generator.clone());
                }
                (None, true) => {}
                (Some(_), true) => {
                    return Err(invalid(format!("slot {id} is bound by the before skeleton")))
                }
                (None, false) => return Err(invalid(format!("slot {id} needs a generator"))),
            }
        }
        if let Some(id) = schema
            .generated_slots()
            .into_iter()
            .find(|id| !generators.contains_key(id))
        {
            return Err(invalid(format!("slot {id} needs a generator")));
        }
        CodeTransform::new(Arc::new(schema), generators).map_err(|err| invalid(err.to_string()))
    }
}
