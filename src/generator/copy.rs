use super::{shared_kind_and_ty, type_compatible, GeneratorLimits, Observation};
use crate::schema::Bindings;
use crate::site::Site;
use crate::tree::{distinct_subtrees, NodeSignature, SyntaxNode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reuses a subtree that already exists near the site: first anything the
/// before skeleton bound, then the enclosing context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyGenerator {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    pub max_elements: usize,
}

impl CopyGenerator {
    pub(super) fn learn(observations: &[Observation<'_>], limits: GeneratorLimits) -> Option<Self> {
        let (kind, ty) = shared_kind_and_ty(observations);
        Some(Self {
            kind: kind.unwrap_or_else(|| NodeSignature::ANY.to_string()),
            ty,
            max_elements: limits.max_elements,
        })
    }

    fn pool(&self, site: &Site, bindings: &Bindings) -> Vec<Arc<SyntaxNode>> {
        let mut roots: Vec<Arc<SyntaxNode>> = bindings.values().flatten().cloned().collect();
        roots.extend(site.context_roots());
        let signature = NodeSignature::single(self.kind.clone());
        distinct_subtrees(&roots)
            .into_iter()
            .filter(|node| signature.accepts(node))
            .filter(|node| type_compatible(self.ty.as_deref(), node.ty.as_deref()))
            .take(self.max_elements)
            .collect()
    }

    pub fn estimate_cost(&self, site: &Site, bindings: &Bindings) -> Option<u64> {
        Some(self.pool(site, bindings).len() as u64)
    }

    pub fn generate(&self, site: &Site, bindings: &Bindings) -> Vec<Arc<SyntaxNode>> {
        self.pool(site, bindings)
    }
}
