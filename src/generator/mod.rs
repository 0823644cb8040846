//! Per-slot candidate producers.
//!
//! The strategy set is closed, so generators are one tagged enum rather than
//! trait objects. Each variant carries its own bounds; nothing here reads
//! global configuration.
mod copy;
mod enumerate;
mod reference;
mod shape;

pub use copy::CopyGenerator;
pub use enumerate::{EnumerateGenerator, OperatorForm};
pub use reference::ReferenceGenerator;
pub use shape::{ChildSource, ShapeGenerator};

use crate::schema::Bindings;
use crate::site::Site;
use crate::tree::SyntaxNode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Strategy tags in learning priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Enumerate,
    Copy,
    Reference,
    Trait,
}

impl GeneratorKind {
    pub const PRIORITY: [GeneratorKind; 4] = [
        GeneratorKind::Enumerate,
        GeneratorKind::Copy,
        GeneratorKind::Reference,
        GeneratorKind::Trait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GeneratorKind::Enumerate => "enumerate",
            GeneratorKind::Copy => "copy",
            GeneratorKind::Reference => "reference",
            GeneratorKind::Trait => "trait",
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds stamped onto every learned generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorLimits {
    pub max_elements: usize,
    pub max_depth: usize,
}

impl Default for GeneratorLimits {
    fn default() -> Self {
        Self {
            max_elements: 64,
            max_depth: 2,
        }
    }
}

/// One training site's view of a slot: where it was, what the before
/// skeleton bound there, and the value the after side needed.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub site: &'a Site,
    pub bindings: &'a Bindings,
    pub value: &'a SyntaxNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum VarGenerator {
    Enumerate(EnumerateGenerator),
    Copy(CopyGenerator),
    Reference(ReferenceGenerator),
    Trait(ShapeGenerator),
}

impl VarGenerator {
    /// Build a generator of `kind` that reproduces every observation, or
    /// `None` when the strategy cannot.
    pub fn learn(
        kind: GeneratorKind,
        observations: &[Observation<'_>],
        limits: GeneratorLimits,
    ) -> Option<VarGenerator> {
        if observations.is_empty() {
            return None;
        }
        let candidate = match kind {
            GeneratorKind::Enumerate => {
                VarGenerator::Enumerate(EnumerateGenerator::learn(observations, limits)?)
            }
            GeneratorKind::Copy => VarGenerator::Copy(CopyGenerator::learn(observations, limits)?),
            GeneratorKind::Reference => {
                VarGenerator::Reference(ReferenceGenerator::learn(observations, limits)?)
            }
            GeneratorKind::Trait => VarGenerator::Trait(ShapeGenerator::learn(observations, limits)?),
        };
        observations
            .iter()
            .all(|obs| candidate.covers(obs.site, obs.value, obs.bindings))
            .then_some(candidate)
    }

    /// Every strategy that reproduces the observations, in priority order.
    pub fn learn_all(observations: &[Observation<'_>], limits: GeneratorLimits) -> Vec<VarGenerator> {
        GeneratorKind::PRIORITY
            .iter()
            .filter_map(|kind| VarGenerator::learn(*kind, observations, limits))
            .collect()
    }

    pub fn kind(&self) -> GeneratorKind {
        match self {
            VarGenerator::Enumerate(_) => GeneratorKind::Enumerate,
            VarGenerator::Copy(_) => GeneratorKind::Copy,
            VarGenerator::Reference(_) => GeneratorKind::Reference,
            VarGenerator::Trait(_) => GeneratorKind::Trait,
        }
    }

    /// Number of candidates `generate` would return, or `None` when unknown.
    pub fn estimate_cost(&self, site: &Site, bindings: &Bindings) -> Option<u64> {
        match self {
            VarGenerator::Enumerate(inner) => inner.estimate_cost(site),
            VarGenerator::Copy(inner) => inner.estimate_cost(site, bindings),
            VarGenerator::Reference(inner) => inner.estimate_cost(site),
            VarGenerator::Trait(inner) => inner.estimate_cost(site, bindings),
        }
    }

    /// Ordered, duplicate-free candidates at `site`.
    pub fn generate(&self, site: &Site, bindings: &Bindings) -> Vec<Arc<SyntaxNode>> {
        match self {
            VarGenerator::Enumerate(inner) => inner.generate(site),
            VarGenerator::Copy(inner) => inner.generate(site, bindings),
            VarGenerator::Reference(inner) => inner.generate(site),
            VarGenerator::Trait(inner) => inner.generate(site, bindings),
        }
    }

    /// Could this generator have produced `value` at `site`?
    pub fn covers(&self, site: &Site, value: &SyntaxNode, bindings: &Bindings) -> bool {
        match self {
            VarGenerator::Reference(inner) => inner.covers(site, value),
            _ => self
                .generate(site, bindings)
                .iter()
                .any(|candidate| candidate.as_ref() == value),
        }
    }
}

/// Kind and type every observed value agrees on.
pub(crate) fn shared_kind_and_ty(observations: &[Observation<'_>]) -> (Option<String>, Option<String>) {
    let Some((first, rest)) = observations.split_first() else {
        return (None, None);
    };
    let kind = rest
        .iter()
        .all(|obs| obs.value.kind == first.value.kind)
        .then(|| first.value.kind.clone());
    let ty = match &first.value.ty {
        Some(ty) if rest.iter().all(|obs| obs.value.ty.as_ref() == Some(ty)) => Some(ty.clone()),
        _ => None,
    };
    (kind, ty)
}

/// Expected-type filter shared by the strategies: untyped nodes always pass.
pub(crate) fn type_compatible(expected: Option<&str>, actual: Option<&str>) -> bool {
    match (expected, actual) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => true,
    }
}
