use super::{GeneratorLimits, Observation};
use crate::schema::Bindings;
use crate::site::Site;
use crate::tree::{distinct_subtrees, kinds, NodeClass, NodeSignature, SyntaxNode, Token};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Where one child of the invariant shape is drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSource {
    pub kind: String,
    /// Fill from in-scope variables instead of context subtrees.
    #[serde(default)]
    pub references: bool,
}

/// Keeps the root shape every observation shared and re-fills its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeGenerator {
    pub kind: String,
    pub class: NodeClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    pub children: Vec<ChildSource>,
    pub max_elements: usize,
}

impl ShapeGenerator {
    pub(super) fn learn(observations: &[Observation<'_>], limits: GeneratorLimits) -> Option<Self> {
        let (first, rest) = observations.split_first()?;
        let head = first.value;
        if head.is_leaf() || !rest.iter().all(|obs| obs.value.same_head(head)) {
            return None;
        }
        let children = (0..head.children.len())
            .map(|idx| {
                let kind = &head.children[idx].kind;
                let shared = rest
                    .iter()
                    .all(|obs| obs.value.children[idx].kind == *kind);
                if shared {
                    ChildSource {
                        kind: kind.clone(),
                        references: kind == kinds::REF,
                    }
                } else {
                    ChildSource {
                        kind: NodeSignature::ANY.to_string(),
                        references: false,
                    }
                }
            })
            .collect();
        Some(Self {
            kind: head.kind.clone(),
            class: head.class,
            token: head.token.clone(),
            ty: head.ty.clone(),
            children,
            max_elements: limits.max_elements,
        })
    }

    /// Targets a transform whose whole after side is this shape may rewrite:
    /// nodes of the same root kind and class.
    pub fn accepts_target(&self, node: &SyntaxNode) -> bool {
        node.kind == self.kind && node.class == self.class
    }

    fn options(&self, site: &Site, bindings: &Bindings) -> Vec<Vec<Arc<SyntaxNode>>> {
        let mut roots: Vec<Arc<SyntaxNode>> = bindings.values().flatten().cloned().collect();
        roots.extend(site.context_roots());
        let subtrees = distinct_subtrees(&roots);
        self.children
            .iter()
            .map(|source| {
                if source.references {
                    let mut seen = BTreeSet::new();
                    site.variables
                        .iter()
                        .filter(|var| seen.insert(var.name.as_str()))
                        .map(|var| {
                            let node = SyntaxNode::reference(var.name.clone());
                            Arc::new(match &var.ty {
                                Some(ty) => node.with_ty(ty.clone()),
                                None => node,
                            })
                        })
                        .collect()
                } else {
                    let signature = NodeSignature::single(source.kind.clone());
                    subtrees
                        .iter()
                        .filter(|node| signature.accepts(node))
                        .cloned()
                        .collect()
                }
            })
            .collect()
    }

    /// Product of per-child option counts; unknown when a child position
    /// accepts any kind.
    pub fn estimate_cost(&self, site: &Site, bindings: &Bindings) -> Option<u64> {
        if self.children.iter().any(|child| child.kind == NodeSignature::ANY) {
            return None;
        }
        let product = self
            .options(site, bindings)
            .iter()
            .try_fold(1u64, |acc, opts| acc.checked_mul(opts.len() as u64))?;
        Some(product.min(self.max_elements as u64))
    }

    pub fn generate(&self, site: &Site, bindings: &Bindings) -> Vec<Arc<SyntaxNode>> {
        let options = self.options(site, bindings);
        if options.iter().any(Vec::is_empty) {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut cursor = vec![0usize; options.len()];
        while out.len() < self.max_elements {
            let children = cursor
                .iter()
                .zip(&options)
                .map(|(idx, opts)| Arc::clone(&opts[*idx]))
                .collect();
            out.push(Arc::new(SyntaxNode {
                kind: self.kind.clone(),
                class: self.class,
                token: self.token.clone(),
                ty: self.ty.clone(),
                children,
            }));
            // Last child varies fastest.
            let mut pos = cursor.len();
            loop {
                if pos == 0 {
                    return out;
                }
                pos -= 1;
                cursor[pos] += 1;
                if cursor[pos] < options[pos].len() {
                    break;
                }
                cursor[pos] = 0;
            }
        }
        out
    }
}
