//! Syntax tree model shared by the abstractor, generators, and localizer.
//!
//! Trees come from an external front end. The engine only relies on a node's
//! kind tag, a coarse class (expression, statement, declaration), an optional
//! leaf token, and an optional static type; everything else about the source
//! language stays on the other side of the interface.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Kind tags the built-in templates and the localizer recognize.
///
/// Front ends are expected to map their own node kinds onto these names for
/// the constructs listed here; any other kind string passes through opaquely.
pub mod kinds {
    pub const REF: &str = "ref";
    pub const LITERAL: &str = "literal";
    pub const NULL: &str = "null";
    pub const BINARY: &str = "binop";
    pub const UNARY: &str = "unop";
    pub const CAST: &str = "cast";
    pub const CALL: &str = "call";
    pub const BLOCK: &str = "block";
    pub const EXPR_STMT: &str = "expr_stmt";
    pub const IF: &str = "if";
    pub const SWITCH: &str = "switch";
    pub const FOR: &str = "for";
    pub const FOREACH: &str = "foreach";
    pub const WHILE: &str = "while";
    pub const DO: &str = "do";
    pub const TRY: &str = "try";
    pub const CATCH: &str = "catch";
    pub const THROW: &str = "throw";
    pub const RETURN: &str = "return";
    /// Template placeholder; never produced by a front end.
    pub const PLACEHOLDER: &str = "$slot";

    /// Conditional, exception-handling, or loop construct.
    pub fn is_control_flow(kind: &str) -> bool {
        matches!(
            kind,
            IF | SWITCH | FOR | FOREACH | WHILE | DO | TRY | CATCH
        )
    }
}

/// Coarse syntactic class of a node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    Expr,
    Stmt,
    Decl,
    Other,
}

/// Leaf payload of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "text")]
pub enum Token {
    Ident(String),
    Literal(String),
    Operator(String),
    Null,
}

/// Kind tag plus whether a position holds a homogeneous list of that kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeSignature {
    pub kind: String,
    #[serde(default)]
    pub is_collection: bool,
}

impl NodeSignature {
    /// Kind placeholder accepting any node.
    pub const ANY: &'static str = "*";

    pub fn single(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            is_collection: false,
        }
    }

    pub fn collection(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            is_collection: true,
        }
    }

    pub fn accepts(&self, node: &SyntaxNode) -> bool {
        self.kind == Self::ANY || self.kind == node.kind
    }
}

impl fmt::Display for NodeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_collection {
            write!(f, "[{}]", self.kind)
        } else {
            f.write_str(&self.kind)
        }
    }
}

/// Immutable syntax tree node. Children are shared handles, so cloning a
/// tree only copies the spine that changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: String,
    pub class: NodeClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Arc<SyntaxNode>>,
}

/// Ordered run of sibling nodes; the unit list-shaped schemas match.
pub type Fragment = Vec<Arc<SyntaxNode>>;

impl SyntaxNode {
    pub fn new(kind: impl Into<String>, class: NodeClass) -> Self {
        Self {
            kind: kind.into(),
            class,
            token: None,
            ty: None,
            children: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_ty(mut self, ty: impl Into<String>) -> Self {
        self.ty = Some(ty.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Arc<SyntaxNode>>) -> Self {
        self.children = children;
        self
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(kinds::REF, NodeClass::Expr).with_token(Token::Ident(name.into()))
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::new(kinds::LITERAL, NodeClass::Expr).with_token(Token::Literal(text.into()))
    }

    pub fn null() -> Self {
        Self::new(kinds::NULL, NodeClass::Expr).with_token(Token::Null)
    }

    pub fn binary(op: impl Into<String>, lhs: SyntaxNode, rhs: SyntaxNode) -> Self {
        Self::new(kinds::BINARY, NodeClass::Expr)
            .with_token(Token::Operator(op.into()))
            .with_children(vec![Arc::new(lhs), Arc::new(rhs)])
    }

    pub fn stmt(kind: impl Into<String>, children: Vec<SyntaxNode>) -> Self {
        Self::new(kind, NodeClass::Stmt).with_children(children.into_iter().map(Arc::new).collect())
    }

    /// Identifier carried by a reference leaf.
    pub fn ident(&self) -> Option<&str> {
        match &self.token {
            Some(Token::Ident(name)) if self.children.is_empty() => Some(name),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Everything but the children agrees, and arity matches.
    pub fn same_head(&self, other: &SyntaxNode) -> bool {
        self.kind == other.kind
            && self.class == other.class
            && self.token == other.token
            && self.ty == other.ty
            && self.children.len() == other.children.len()
    }

    /// True when this node or any descendant satisfies `pred`.
    pub fn any(&self, pred: &dyn Fn(&SyntaxNode) -> bool) -> bool {
        pred(self) || self.children.iter().any(|child| child.any(pred))
    }

    /// Copy of the whole tree with no storage shared with `self`.
    pub fn deep_clone(&self) -> SyntaxNode {
        SyntaxNode {
            kind: self.kind.clone(),
            class: self.class,
            token: self.token.clone(),
            ty: self.ty.clone(),
            children: self
                .children
                .iter()
                .map(|child| Arc::new(child.deep_clone()))
                .collect(),
        }
    }
}

/// Pre-order list of every subtree under `roots`, structurally deduplicated
/// (first occurrence wins).
pub fn distinct_subtrees(roots: &[Arc<SyntaxNode>]) -> Vec<Arc<SyntaxNode>> {
    let mut seen: HashSet<Arc<SyntaxNode>> = HashSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<Arc<SyntaxNode>> = roots.iter().rev().cloned().collect();
    while let Some(node) = stack.pop() {
        for child in node.children.iter().rev() {
            stack.push(Arc::clone(child));
        }
        if seen.insert(Arc::clone(&node)) {
            out.push(node);
        }
    }
    out
}

impl fmt::Display for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let leaf = match &self.token {
            Some(Token::Ident(name)) => Some(name.clone()),
            Some(Token::Literal(text)) => Some(text.clone()),
            Some(Token::Operator(op)) => Some(format!("{op:?}")),
            Some(Token::Null) => Some("null".to_string()),
            None => None,
        };
        if self.children.is_empty() {
            return match leaf {
                Some(leaf) if self.kind == kinds::REF || self.kind == kinds::LITERAL => {
                    f.write_str(&leaf)
                }
                Some(leaf) => write!(f, "({} {})", self.kind, leaf),
                None => write!(f, "({})", self.kind),
            };
        }
        write!(f, "({}", self.kind)?;
        if let Some(leaf) = leaf {
            write!(f, " {leaf}")?;
        }
        for child in &self.children {
            write!(f, " {child}")?;
        }
        f.write_str(")")
    }
}

/// Space-separated rendering of a fragment.
pub fn render_fragment(fragment: &[Arc<SyntaxNode>]) -> String {
    fragment
        .iter()
        .map(|node| node.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_ignores_sharing() {
        let a = SyntaxNode::binary("<", SyntaxNode::reference("i"), SyntaxNode::reference("n"));
        let b = a.deep_clone();
        assert_eq!(a, b);
        assert!(!Arc::ptr_eq(&a.children[0], &b.children[0]));
    }

    #[test]
    fn distinct_subtrees_is_preorder_and_deduplicated() {
        let expr = SyntaxNode::binary("+", SyntaxNode::reference("x"), SyntaxNode::reference("x"));
        let subtrees = distinct_subtrees(&[Arc::new(expr.clone())]);
        assert_eq!(subtrees.len(), 2);
        assert_eq!(*subtrees[0], expr);
        assert_eq!(subtrees[1].ident(), Some("x"));
    }

    #[test]
    fn renders_compact_sexpr() {
        let expr = SyntaxNode::binary("<=", SyntaxNode::reference("i"), SyntaxNode::literal("0"));
        assert_eq!(expr.to_string(), "(binop \"<=\" i 0)");
    }

    #[test]
    fn control_flow_kinds() {
        assert!(kinds::is_control_flow(kinds::WHILE));
        assert!(kinds::is_control_flow(kinds::CATCH));
        assert!(!kinds::is_control_flow(kinds::RETURN));
    }
}
