//! Defect sites: the target fragment plus what generators may draw from.
use crate::tree::{Fragment, NodeSignature, SyntaxNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Where a variable is visible relative to the site.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Declared before the site.
    Before,
    /// Declared after the site in the same scope.
    After,
    /// Bound by the construct at the site itself (loop variable, catch parameter).
    Binding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    pub visibility: Visibility,
}

/// A location the engine tries transforms against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Site {
    /// Enclosing-scope signatures, outermost first.
    #[serde(default)]
    pub scope: Vec<NodeSignature>,
    pub target: Fragment,
    /// Enclosing region copy-style generators may reuse subtrees from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Arc<SyntaxNode>>,
    #[serde(default)]
    pub variables: Vec<VariableInfo>,
}

impl Site {
    /// Site whose variables are the identifiers referenced in `target`.
    pub fn new(scope: Vec<NodeSignature>, target: Fragment) -> Self {
        let variables = referenced_variables(&target);
        Self {
            scope,
            target,
            context: None,
            variables,
        }
    }

    pub fn with_context(mut self, context: Arc<SyntaxNode>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_variables(mut self, variables: Vec<VariableInfo>) -> Self {
        self.variables = variables;
        self
    }

    /// Roots generators search for reusable subtrees.
    pub fn context_roots(&self) -> Fragment {
        match &self.context {
            Some(context) => vec![Arc::clone(context)],
            None => self.target.clone(),
        }
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|var| var.name == name)
    }
}

fn referenced_variables(target: &[Arc<SyntaxNode>]) -> Vec<VariableInfo> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<&Arc<SyntaxNode>> = target.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if let Some(name) = node.ident() {
            if seen.insert(name.to_string()) {
                out.push(VariableInfo {
                    name: name.to_string(),
                    ty: node.ty.clone(),
                    visibility: Visibility::Before,
                });
            }
        }
        stack.extend(node.children.iter().rev());
    }
    out
}
