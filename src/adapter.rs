//! Applies one transform at one site.
//!
//! An adapter is created per attempt and owns everything that attempt
//! mutates: the before bindings, the per-slot candidate lists, the odometer
//! cursor, and the clone cache. Drop it when the attempt ends.
use crate::oracle::TypeOracle;
use crate::schema::{instantiate, match_fragment, match_fragment_with, Bindings, SlotId};
use crate::site::Site;
use crate::transform::CodeTransform;
use crate::tree::{Fragment, NodeClass, NodeSignature, SyntaxNode};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of cost estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cost {
    Bounded(u64),
    /// Unknown per-slot cost, or the product crossed the ceiling.
    TooExpensive,
}

pub struct TransformAdapter<'a> {
    transform: &'a CodeTransform,
    cost_ceiling: u64,
    site: Option<&'a Site>,
    bindings: Bindings,
    options: Vec<(SlotId, Vec<Arc<SyntaxNode>>)>,
    cursor: Vec<usize>,
    total: u64,
    emitted: u64,
    clone_cache: Option<HashMap<Arc<SyntaxNode>, Arc<SyntaxNode>>>,
}

impl<'a> TransformAdapter<'a> {
    pub fn new(transform: &'a CodeTransform, cost_ceiling: u64) -> Self {
        Self {
            transform,
            cost_ceiling,
            site: None,
            bindings: Bindings::new(),
            options: Vec::new(),
            cursor: Vec::new(),
            total: 0,
            emitted: 0,
            clone_cache: None,
        }
    }

    pub fn transform(&self) -> &'a CodeTransform {
        self.transform
    }

    /// Does the transform's scope set admit a site nested in `scope`?
    pub fn check_inside(&self, scope: &[NodeSignature]) -> bool {
        let allowed = &self.transform.schema().scope;
        allowed.is_empty() || scope.iter().any(|signature| allowed.contains(signature))
    }

    /// Shape gate, then skeleton match. On success the adapter is bound to
    /// `site` for the remaining calls.
    pub fn apply_to(&mut self, site: &'a Site) -> bool {
        self.site = None;
        self.bindings.clear();
        self.options.clear();
        self.total = 0;
        self.emitted = 0;

        let transform = self.transform;
        let schema = transform.schema();
        let target = &site.target;
        if target.is_empty() || (!schema.shape.is_list() && target.len() != 1) {
            return false;
        }
        let shape_ok = if schema.class_shaped {
            target.iter().all(|node| node.class == NodeClass::Decl)
        } else if schema.shape.is_expr() {
            target.iter().all(|node| node.class != NodeClass::Stmt)
        } else {
            target.iter().all(|node| node.class != NodeClass::Expr)
        };
        if !shape_ok {
            return false;
        }
        if let Some(shape) = transform.trait_only() {
            if !target.iter().all(|node| shape.accepts_target(node)) {
                return false;
            }
        }
        if let Some(slot) = schema.unanchored_slot() {
            if !target.iter().all(|node| slot.accepts(node)) {
                return false;
            }
        }
        match match_fragment(&schema.before, target, &schema.slots) {
            Some(bindings) => {
                self.site = Some(site);
                self.bindings = bindings;
                true
            }
            None => false,
        }
    }

    /// Bindings produced by the last successful `apply_to`.
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Product of per-slot estimates against the ceiling. Must be checked
    /// before [`prepare_generate`](Self::prepare_generate).
    pub fn estimate_cost(&self) -> Cost {
        let Some(site) = self.site else {
            return Cost::Bounded(0);
        };
        let mut product: u64 = 1;
        for generator in self.transform.generators().values() {
            let Some(cost) = generator.estimate_cost(site, &self.bindings) else {
                return Cost::TooExpensive;
            };
            match product.checked_mul(cost) {
                Some(next) if next <= self.cost_ceiling => product = next,
                _ => return Cost::TooExpensive,
            }
        }
        Cost::Bounded(product)
    }

    /// Materialize every slot's candidates and reset the cursor. Returns the
    /// number of `generate_one` calls that will yield a candidate; zero when
    /// the real product exceeds the ceiling.
    pub fn prepare_generate(&mut self, use_clone_cache: bool) -> u64 {
        self.options.clear();
        self.cursor.clear();
        self.total = 0;
        self.emitted = 0;
        self.clone_cache = use_clone_cache.then(HashMap::new);
        let Some(site) = self.site else {
            return 0;
        };

        let transform = self.transform;
        let mut total: u64 = 1;
        for (slot, generator) in transform.generators() {
            let candidates = generator.generate(site, &self.bindings);
            match total.checked_mul(candidates.len() as u64) {
                Some(next) if next <= self.cost_ceiling => total = next,
                _ => {
                    tracing::debug!(slot, "candidate product exceeds cost ceiling");
                    self.options.clear();
                    return 0;
                }
            }
            self.options.push((*slot, candidates));
        }
        self.cursor = vec![0; self.options.len()];
        self.total = total;
        total
    }

    /// Next candidate in odometer order; the lowest slot id turns fastest.
    pub fn generate_one(&mut self) -> Option<Fragment> {
        if self.emitted >= self.total {
            return None;
        }
        let mut bindings = self.bindings.clone();
        for ((slot, candidates), idx) in self.options.iter().zip(&self.cursor) {
            bindings.insert(*slot, vec![Arc::clone(&candidates[*idx])]);
        }
        let spliced = instantiate(&self.transform.schema().after, &bindings)?;
        let fresh = spliced
            .iter()
            .map(|node| match self.clone_cache.as_mut() {
                Some(cache) => clone_cached(node, cache),
                None => Arc::new(node.deep_clone()),
            })
            .collect();

        for (pos, (_, candidates)) in self.options.iter().enumerate() {
            self.cursor[pos] += 1;
            if self.cursor[pos] < candidates.len() {
                break;
            }
            self.cursor[pos] = 0;
        }
        self.emitted += 1;
        Some(fresh)
    }

    pub fn pass_typecheck(&self, oracle: &dyn TypeOracle, candidate: &[Arc<SyntaxNode>]) -> bool {
        match self.site {
            Some(site) => oracle.check(site, candidate),
            None => false,
        }
    }

    /// Could this transform, at the bound site, have produced `fixed`?
    pub fn covers(&self, fixed: &[Arc<SyntaxNode>]) -> bool {
        let Some(site) = self.site else {
            return false;
        };
        let schema = self.transform.schema();
        let Some(full) =
            match_fragment_with(&schema.after, fixed, &schema.slots, self.bindings.clone())
        else {
            return false;
        };
        self.transform
            .generators()
            .iter()
            .all(|(slot, generator)| match full.get(slot).map(Vec::as_slice) {
                Some([value]) => generator.covers(site, value, &self.bindings),
                _ => false,
            })
    }
}

/// Deep copy that reuses one clone per structurally distinct subtree.
fn clone_cached(
    node: &Arc<SyntaxNode>,
    cache: &mut HashMap<Arc<SyntaxNode>, Arc<SyntaxNode>>,
) -> Arc<SyntaxNode> {
    if let Some(hit) = cache.get(node) {
        return Arc::clone(hit);
    }
    let children = node
        .children
        .iter()
        .map(|child| clone_cached(child, cache))
        .collect();
    let copy = Arc::new(SyntaxNode {
        kind: node.kind.clone(),
        class: node.class,
        token: node.token.clone(),
        ty: node.ty.clone(),
        children,
    });
    cache.insert(Arc::clone(node), Arc::clone(&copy));
    copy
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
