use super::{shared_kind_and_ty, type_compatible, GeneratorLimits, Observation};
use crate::site::{Site, VariableInfo, Visibility};
use crate::tree::SyntaxNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Binds the slot to an in-scope variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceGenerator {
    /// `None` admits every in-scope variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    pub max_elements: usize,
}

impl ReferenceGenerator {
    /// Picks the narrowest visibility that still covers every observation.
    pub(super) fn learn(observations: &[Observation<'_>], limits: GeneratorLimits) -> Option<Self> {
        if observations.iter().any(|obs| obs.value.ident().is_none()) {
            return None;
        }
        let (_, ty) = shared_kind_and_ty(observations);
        [
            Some(Visibility::Binding),
            Some(Visibility::Before),
            Some(Visibility::After),
            None,
        ]
        .into_iter()
        .map(|visibility| Self {
            visibility,
            ty: ty.clone(),
            max_elements: limits.max_elements,
        })
        .find(|generator| {
            observations
                .iter()
                .all(|obs| generator.covers(obs.site, obs.value))
        })
    }

    fn visible<'a>(&'a self, site: &'a Site) -> impl Iterator<Item = &'a VariableInfo> + 'a {
        let mut seen = BTreeSet::new();
        site.variables
            .iter()
            .filter(move |var| self.visibility.is_none() || self.visibility == Some(var.visibility))
            .filter(move |var| type_compatible(self.ty.as_deref(), var.ty.as_deref()))
            .filter(move |var| seen.insert(var.name.as_str()))
            .take(self.max_elements)
    }

    pub fn estimate_cost(&self, site: &Site) -> Option<u64> {
        Some(self.visible(site).count() as u64)
    }

    pub fn generate(&self, site: &Site) -> Vec<Arc<SyntaxNode>> {
        self.visible(site)
            .map(|var| {
                let node = SyntaxNode::reference(var.name.clone());
                Arc::new(match &var.ty {
                    Some(ty) => node.with_ty(ty.clone()),
                    None => node,
                })
            })
            .collect()
    }

    pub fn covers(&self, site: &Site, value: &SyntaxNode) -> bool {
        let Some(name) = value.ident() else {
            return false;
        };
        self.visible(site)
            .any(|var| var.name == name && var.ty == value.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Bindings;

    fn site() -> Site {
        let var = |name: &str, visibility| VariableInfo {
            name: name.to_string(),
            ty: None,
            visibility,
        };
        Site::new(Vec::new(), vec![Arc::new(SyntaxNode::reference("x"))]).with_variables(vec![
            var("item", Visibility::Binding),
            var("count", Visibility::Before),
            var("total", Visibility::Before),
            var("later", Visibility::After),
        ])
    }

    #[test]
    fn learning_picks_narrowest_visibility() {
        let site = site();
        let bindings = Bindings::new();
        let value = SyntaxNode::reference("total");
        let obs = [Observation {
            site: &site,
            bindings: &bindings,
            value: &value,
        }];
        let generator =
            ReferenceGenerator::learn(&obs, GeneratorLimits::default()).expect("learnable");
        assert_eq!(generator.visibility, Some(Visibility::Before));
        let names: Vec<String> = generator
            .generate(&site)
            .iter()
            .filter_map(|node| node.ident().map(str::to_string))
            .collect();
        assert_eq!(names, vec!["count", "total"]);
    }

    #[test]
    fn unrestricted_visibility_sees_everything() {
        let site = site();
        let generator = ReferenceGenerator {
            visibility: None,
            ty: None,
            max_elements: 3,
        };
        assert_eq!(generator.estimate_cost(&site), Some(3));
        assert!(!generator.covers(&site, &SyntaxNode::reference("later")));
        assert!(generator.covers(&site, &SyntaxNode::reference("item")));
    }
}
