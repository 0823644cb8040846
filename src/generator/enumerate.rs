use super::{type_compatible, GeneratorLimits, Observation};
use crate::site::Site;
use crate::tree::{kinds, NodeClass, SyntaxNode, Token};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Binary operator the search may combine operands with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatorForm {
    pub kind: String,
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
}

impl OperatorForm {
    fn apply(&self, lhs: &Arc<SyntaxNode>, rhs: &Arc<SyntaxNode>) -> SyntaxNode {
        SyntaxNode {
            kind: self.kind.clone(),
            class: NodeClass::Expr,
            token: Some(Token::Operator(self.op.clone())),
            ty: self.ty.clone(),
            children: vec![Arc::clone(lhs), Arc::clone(rhs)],
        }
    }
}

/// Breadth-first search over small expressions.
///
/// Level 0 holds the atoms: in-scope references, the allowed literals,
/// `null` when permitted, and casts of references when a cast type is set.
/// Level `k` combines every ordered operand pair drawn from earlier levels
/// (at least one operand from level `k - 1`) with every operator form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerateGenerator {
    /// Type filter for reference atoms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atom_ty: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<SyntaxNode>,
    #[serde(default)]
    pub allow_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operators: Vec<OperatorForm>,
    pub max_elements: usize,
    /// Operator nesting levels explored beyond the atoms.
    pub max_depth: usize,
}

impl EnumerateGenerator {
    pub(super) fn learn(observations: &[Observation<'_>], limits: GeneratorLimits) -> Option<Self> {
        let mut learned = Learned::default();
        let mut depth = 0;
        for obs in observations {
            if obs.value.class != NodeClass::Expr {
                return None;
            }
            depth = depth.max(learned.visit(obs.value)?);
        }
        if depth > limits.max_depth || learned.casts.len() > 1 {
            return None;
        }
        let atom_ty = match learned.ref_tys.split_first() {
            Some((Some(first), rest)) if rest.iter().all(|ty| ty.as_ref() == Some(first)) => {
                Some(first.clone())
            }
            _ => None,
        };
        Some(Self {
            atom_ty,
            literals: learned.literals,
            allow_null: learned.null,
            cast: learned.casts.into_iter().next(),
            operators: learned.operators.into_iter().collect(),
            max_elements: limits.max_elements,
            max_depth: depth,
        })
    }

    fn atoms(&self, site: &Site) -> Vec<Arc<SyntaxNode>> {
        let mut seen = BTreeSet::new();
        let refs: Vec<Arc<SyntaxNode>> = site
            .variables
            .iter()
            .filter(|var| type_compatible(self.atom_ty.as_deref(), var.ty.as_deref()))
            .filter(|var| seen.insert(var.name.as_str()))
            .map(|var| {
                let node = SyntaxNode::reference(var.name.clone());
                Arc::new(match &var.ty {
                    Some(ty) => node.with_ty(ty.clone()),
                    None => node,
                })
            })
            .collect();
        let mut atoms = refs.clone();
        atoms.extend(self.literals.iter().cloned().map(Arc::new));
        if self.allow_null {
            atoms.push(Arc::new(SyntaxNode::null()));
        }
        if let Some(cast) = &self.cast {
            atoms.extend(refs.iter().map(|node| {
                Arc::new(
                    SyntaxNode::new(kinds::CAST, NodeClass::Expr)
                        .with_ty(cast.clone())
                        .with_children(vec![Arc::clone(node)]),
                )
            }));
        }
        atoms
    }

    pub fn estimate_cost(&self, site: &Site) -> Option<u64> {
        let atoms = self.atoms(site).len() as u64;
        let ops = self.operators.len() as u64;
        let cap = self.max_elements as u64;
        let mut before_prev: u64 = 0;
        let mut through_prev = atoms;
        for _ in 0..self.max_depth {
            if through_prev >= cap {
                break;
            }
            let pairs = through_prev
                .saturating_mul(through_prev)
                .saturating_sub(before_prev.saturating_mul(before_prev));
            before_prev = through_prev;
            through_prev = through_prev.saturating_add(ops.saturating_mul(pairs));
        }
        Some(through_prev.min(cap))
    }

    pub fn generate(&self, site: &Site) -> Vec<Arc<SyntaxNode>> {
        let mut out = self.atoms(site);
        out.truncate(self.max_elements);
        let mut level_start = 0;
        for _ in 0..self.max_depth {
            if out.len() >= self.max_elements {
                break;
            }
            let level_end = out.len();
            'level: for form in &self.operators {
                for lhs in 0..level_end {
                    for rhs in 0..level_end {
                        if lhs < level_start && rhs < level_start {
                            continue;
                        }
                        let node = form.apply(&out[lhs], &out[rhs]);
                        out.push(Arc::new(node));
                        if out.len() >= self.max_elements {
                            break 'level;
                        }
                    }
                }
            }
            level_start = level_end;
        }
        out
    }
}

#[derive(Default)]
struct Learned {
    ref_tys: Vec<Option<String>>,
    literals: Vec<SyntaxNode>,
    null: bool,
    casts: BTreeSet<String>,
    operators: BTreeSet<OperatorForm>,
}

impl Learned {
    /// Operator nesting depth of `node`, or `None` if it is outside the
    /// expression language this strategy searches.
    fn visit(&mut self, node: &SyntaxNode) -> Option<usize> {
        if node.ident().is_some() {
            self.ref_tys.push(node.ty.clone());
            return Some(0);
        }
        if node.kind == kinds::NULL && node.is_leaf() {
            self.null = true;
            return Some(0);
        }
        if matches!(node.token, Some(Token::Literal(_))) && node.is_leaf() {
            if !self.literals.contains(node) {
                self.literals.push(node.clone());
            }
            return Some(0);
        }
        if node.kind == kinds::CAST {
            let cast = node.ty.clone()?;
            let [inner] = node.children.as_slice() else {
                return None;
            };
            inner.ident()?;
            self.ref_tys.push(inner.ty.clone());
            self.casts.insert(cast);
            return Some(0);
        }
        match (&node.token, node.children.as_slice()) {
            (Some(Token::Operator(op)), [lhs, rhs]) => {
                self.operators.insert(OperatorForm {
                    kind: node.kind.clone(),
                    op: op.clone(),
                    ty: node.ty.clone(),
                });
                let depth = self.visit(lhs)?.max(self.visit(rhs)?);
                Some(depth + 1)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Bindings;

    fn site(names: &[&str]) -> Site {
        let target = names
            .iter()
            .map(|name| Arc::new(SyntaxNode::reference(*name)))
            .collect();
        Site::new(Vec::new(), target)
    }

    fn learn_from(site: &Site, value: &SyntaxNode, limits: GeneratorLimits) -> EnumerateGenerator {
        let bindings = Bindings::new();
        let obs = [Observation {
            site,
            bindings: &bindings,
            value,
        }];
        EnumerateGenerator::learn(&obs, limits).expect("learnable")
    }

    #[test]
    fn learns_operator_and_literal_from_observation() {
        let site = site(&["i", "n"]);
        let value = SyntaxNode::binary("-", SyntaxNode::reference("n"), SyntaxNode::literal("1"));
        let generator = learn_from(&site, &value, GeneratorLimits::default());
        assert_eq!(generator.max_depth, 1);
        assert_eq!(generator.literals, vec![SyntaxNode::literal("1")]);
        let candidates = generator.generate(&site);
        assert!(candidates.iter().any(|node| node.as_ref() == &value));
        // 3 atoms plus 9 ordered pairs under one operator.
        assert_eq!(candidates.len(), 12);
        assert_eq!(generator.estimate_cost(&site), Some(12));
    }

    #[test]
    fn cost_is_monotone_in_element_bound() {
        let site = site(&["a", "b", "c"]);
        let value = SyntaxNode::binary(
            "+",
            SyntaxNode::binary("+", SyntaxNode::reference("a"), SyntaxNode::reference("b")),
            SyntaxNode::reference("c"),
        );
        let mut generator = learn_from(&site, &value, GeneratorLimits::default());
        let mut last = u64::MAX;
        for bound in [1000, 100, 40, 12, 3, 1, 0] {
            generator.max_elements = bound;
            let cost = generator.estimate_cost(&site).expect("known cost");
            assert!(cost <= last, "bound {bound} raised cost to {cost}");
            assert_eq!(cost as usize, generator.generate(&site).len());
            last = cost;
        }
    }

    #[test]
    fn rejects_values_outside_expression_language() {
        let site = site(&["x"]);
        let call = SyntaxNode::new("call", NodeClass::Expr)
            .with_children(vec![Arc::new(SyntaxNode::reference("x"))]);
        let bindings = Bindings::new();
        let obs = [Observation {
            site: &site,
            bindings: &bindings,
            value: &call,
        }];
        assert!(EnumerateGenerator::learn(&obs, GeneratorLimits::default()).is_none());
    }

    #[test]
    fn nesting_beyond_depth_limit_is_not_viable() {
        let site = site(&["x"]);
        let value = SyntaxNode::binary(
            "+",
            SyntaxNode::binary("+", SyntaxNode::reference("x"), SyntaxNode::literal("1")),
            SyntaxNode::literal("1"),
        );
        let bindings = Bindings::new();
        let obs = [Observation {
            site: &site,
            bindings: &bindings,
            value: &value,
        }];
        let limits = GeneratorLimits {
            max_elements: 64,
            max_depth: 1,
        };
        assert!(EnumerateGenerator::learn(&obs, limits).is_none());
    }
}
