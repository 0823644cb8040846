//! Training-pair diffing into one shared schema.
//!
//! All examples are anti-unified at once: positions where every example
//! agrees become skeleton, positions that vary become slots. The after side
//! is unified the same way, except that a position whose per-example values
//! equal an existing before-slot reuses that slot, which makes it inferable.
use super::{Bindings, Pattern, SchemaShape, SlotId, SlotInfo, TransformSchema};
use crate::site::Site;
use crate::tree::{kinds, Fragment, NodeClass, NodeSignature, SyntaxNode, Token};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One recorded (before, after) pair. The before fragment is the site target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingExample {
    pub site: Site,
    pub after: Fragment,
}

/// An after-side position where every example shares the root label but the
/// subtree still needs a generator somewhere below it. A single generator
/// producing the whole subtree is an alternative to the per-leaf slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadPosition {
    /// Child indices from the after skeleton's top level down to the node.
    pub path: Vec<usize>,
    /// The subtree each example had there.
    pub values: Vec<Arc<SyntaxNode>>,
}

#[derive(Debug, Default)]
pub struct SchemaAbstractor {
    examples: Vec<TrainingExample>,
    schema: Option<TransformSchema>,
    bindings: Vec<Bindings>,
    heads: Vec<HeadPosition>,
}

impl SchemaAbstractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one training example; the site carries the scope set and the
    /// before fragment.
    pub fn add_mapping(&mut self, site: Site, after: Fragment) {
        self.examples.push(TrainingExample { site, after });
        self.schema = None;
        self.bindings.clear();
        self.heads.clear();
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn schema(&self) -> Option<&TransformSchema> {
        self.schema.as_ref()
    }

    /// Per-example slot bindings, parallel to [`examples`](Self::examples).
    pub fn bindings(&self) -> &[Bindings] {
        &self.bindings
    }

    /// Shared-head after positions that contain a generated slot, outermost
    /// first. Empty until `generalize` succeeds.
    pub fn heads(&self) -> &[HeadPosition] {
        &self.heads
    }

    pub fn clear(&mut self) {
        self.examples.clear();
        self.schema = None;
        self.bindings.clear();
        self.heads.clear();
    }

    /// Diff every recorded pair into one schema. Returns false when the
    /// examples cannot share a schema (none recorded, or expression and
    /// statement edits mixed).
    pub fn generalize(&mut self) -> bool {
        self.schema = None;
        self.bindings.clear();
        self.heads.clear();
        let Some((shape, class_shaped)) = infer_shape(&self.examples) else {
            return false;
        };

        let mut unifier = AntiUnifier::new(self.examples.len(), reserved_ids(&self.examples));
        let befores: Vec<&[Arc<SyntaxNode>]> = self
            .examples
            .iter()
            .map(|example| example.site.target.as_slice())
            .collect();
        let before = unifier.unify_seq(&befores, false);
        unifier.linkable = unifier.values.keys().copied().collect();
        let before_placeholders = std::mem::take(&mut unifier.placeholders);

        let afters: Vec<&[Arc<SyntaxNode>]> = self
            .examples
            .iter()
            .map(|example| example.after.as_slice())
            .collect();
        let after = unifier.unify_seq(&afters, true);

        let before_ids: BTreeSet<SlotId> = unifier
            .linkable
            .iter()
            .copied()
            .chain(before_placeholders.iter().copied())
            .collect();
        let mut slots = BTreeMap::new();
        for (id, (signature, class)) in &unifier.slots {
            slots.insert(
                *id,
                SlotInfo {
                    signature: signature.clone(),
                    class: *class,
                    inferable: before_ids.contains(id),
                },
            );
        }
        for id in before_placeholders.iter().chain(unifier.placeholders.iter()) {
            slots.entry(*id).or_insert_with(|| SlotInfo {
                signature: NodeSignature::single(NodeSignature::ANY),
                class: None,
                inferable: before_ids.contains(id),
            });
        }

        let scope = self
            .examples
            .iter()
            .flat_map(|example| example.site.scope.iter().cloned())
            .collect();
        let schema = TransformSchema {
            scope,
            shape,
            class_shaped,
            before,
            after,
            slots,
        };
        if let Err(err) = schema.validate() {
            tracing::debug!(error = %err, "generalized schema failed validation");
            return false;
        }

        self.bindings = (0..self.examples.len())
            .map(|idx| {
                unifier
                    .values
                    .iter()
                    .map(|(id, values)| (*id, values[idx].clone()))
                    .collect()
            })
            .collect();
        let generated: BTreeSet<SlotId> = schema.generated_slots().into_iter().collect();
        self.heads = unifier
            .heads
            .into_iter()
            .filter(|(_, pattern)| {
                let mut below = BTreeSet::new();
                pattern.collect_slots(&mut below);
                !below.is_disjoint(&generated)
            })
            .map(|(head, _)| head)
            .collect();
        tracing::debug!(
            examples = self.examples.len(),
            slots = schema.slots.len(),
            generated = generated.len(),
            heads = self.heads.len(),
            "generalized training pairs"
        );
        self.schema = Some(schema);
        true
    }
}

fn infer_shape(examples: &[TrainingExample]) -> Option<(SchemaShape, bool)> {
    if examples.is_empty() {
        return None;
    }
    let anchor = |example: &TrainingExample| {
        example
            .site
            .target
            .first()
            .or_else(|| example.after.first())
            .map(|node| node.class)
    };
    let mut classes = examples.iter().filter_map(anchor);
    let class = classes.next()?;
    let is_expr = class == NodeClass::Expr;
    if classes.any(|other| (other == NodeClass::Expr) != is_expr) {
        return None;
    }
    let list = examples.iter().any(|example| example.site.target.len() != 1);
    Some((SchemaShape::from_parts(class, list), class == NodeClass::Decl))
}

fn placeholder_id(node: &SyntaxNode) -> Option<SlotId> {
    if node.kind != kinds::PLACEHOLDER {
        return None;
    }
    match &node.token {
        Some(Token::Literal(text)) => text.parse().ok(),
        _ => None,
    }
}

fn reserved_ids(examples: &[TrainingExample]) -> BTreeSet<SlotId> {
    let mut ids = BTreeSet::new();
    for example in examples {
        for node in example.site.target.iter().chain(example.after.iter()) {
            collect_placeholders(node, &mut ids);
        }
    }
    ids
}

fn collect_placeholders(node: &SyntaxNode, out: &mut BTreeSet<SlotId>) {
    if let Some(id) = placeholder_id(node) {
        out.insert(id);
    }
    for child in &node.children {
        collect_placeholders(child, out);
    }
}

struct AntiUnifier {
    examples: usize,
    next_id: SlotId,
    reserved: BTreeSet<SlotId>,
    slots: BTreeMap<SlotId, (NodeSignature, Option<NodeClass>)>,
    /// Per-example value of every slot created by unification.
    values: BTreeMap<SlotId, Vec<Fragment>>,
    /// Before-side slots the after side may reuse.
    linkable: Vec<SlotId>,
    /// Placeholder ids met during the current side.
    placeholders: BTreeSet<SlotId>,
    /// Child-index path of the node being unified.
    path: Vec<usize>,
    /// After-side shared-head positions with the pattern built there.
    heads: Vec<(HeadPosition, Pattern)>,
}

impl AntiUnifier {
    fn new(examples: usize, reserved: BTreeSet<SlotId>) -> Self {
        Self {
            examples,
            next_id: 0,
            reserved,
            slots: BTreeMap::new(),
            values: BTreeMap::new(),
            linkable: Vec::new(),
            placeholders: BTreeSet::new(),
            path: Vec::new(),
            heads: Vec::new(),
        }
    }

    fn unify_seq(&mut self, seqs: &[&[Arc<SyntaxNode>]], linking: bool) -> Vec<Pattern> {
        let Some(first) = seqs.first() else {
            return Vec::new();
        };
        if seqs.iter().all(|seq| seq.len() == first.len()) {
            return (0..first.len())
                .map(|idx| {
                    let column: Vec<&Arc<SyntaxNode>> = seqs.iter().map(|seq| &seq[idx]).collect();
                    self.path.push(idx);
                    let pattern = self.unify_node(&column, linking);
                    self.path.pop();
                    pattern
                })
                .collect();
        }

        let min_len = seqs.iter().map(|seq| seq.len()).min().unwrap_or(0);
        let prefix = (0..min_len)
            .take_while(|&idx| seqs.iter().all(|seq| seq[idx] == first[idx]))
            .count();
        let suffix = (0..min_len - prefix)
            .take_while(|&back| {
                seqs.iter()
                    .all(|seq| seq[seq.len() - 1 - back] == first[first.len() - 1 - back])
            })
            .count();

        let mut out: Vec<Pattern> = first[..prefix].iter().map(|node| self.lift(node)).collect();
        let middles: Vec<Fragment> = seqs
            .iter()
            .map(|seq| seq[prefix..seq.len() - suffix].to_vec())
            .collect();
        let linked = if linking {
            self.find_linked(&middles)
        } else {
            None
        };
        let id = match linked {
            Some(id) => id,
            None => {
                let members: Vec<&Arc<SyntaxNode>> = middles.iter().flatten().collect();
                let signature = NodeSignature::collection(shared_kind(&members));
                let class = shared_class(&members);
                self.new_slot(signature, class, middles)
            }
        };
        out.push(Pattern::Slot { id });
        out.extend(
            first[first.len() - suffix..]
                .iter()
                .map(|node| self.lift(node)),
        );
        out
    }

    fn unify_node(&mut self, column: &[&Arc<SyntaxNode>], linking: bool) -> Pattern {
        let first = column[0];
        if column.iter().all(|node| *node == first) {
            return self.lift(first);
        }
        let values: Vec<Fragment> = column.iter().map(|node| vec![Arc::clone(node)]).collect();
        if linking {
            if let Some(id) = self.find_linked(&values) {
                return Pattern::Slot { id };
            }
        }
        let same_label = column.iter().all(|node| {
            node.kind == first.kind
                && node.class == first.class
                && node.token == first.token
                && node.ty == first.ty
        });
        let has_placeholder = column.iter().any(|node| placeholder_id(node).is_some());
        if same_label && !has_placeholder {
            let seqs: Vec<&[Arc<SyntaxNode>]> =
                column.iter().map(|node| node.children.as_slice()).collect();
            let at = self.heads.len();
            let path = self.path.clone();
            let pattern = Pattern::Node {
                kind: first.kind.clone(),
                class: first.class,
                token: first.token.clone(),
                ty: first.ty.clone(),
                children: self.unify_seq(&seqs, linking),
            };
            if linking {
                let head = HeadPosition {
                    path,
                    values: column.iter().map(|node| Arc::clone(*node)).collect(),
                };
                self.heads.insert(at, (head, pattern.clone()));
            }
            return pattern;
        }
        let signature = NodeSignature::single(shared_kind(column));
        let class = shared_class(column);
        Pattern::Slot {
            id: self.new_slot(signature, class, values),
        }
    }

    fn lift(&mut self, node: &SyntaxNode) -> Pattern {
        if let Some(id) = placeholder_id(node) {
            self.placeholders.insert(id);
            return Pattern::Slot { id };
        }
        Pattern::Node {
            kind: node.kind.clone(),
            class: node.class,
            token: node.token.clone(),
            ty: node.ty.clone(),
            children: node.children.iter().map(|child| self.lift(child)).collect(),
        }
    }

    fn find_linked(&self, values: &[Fragment]) -> Option<SlotId> {
        self.linkable
            .iter()
            .copied()
            .find(|id| self.values.get(id).is_some_and(|bound| bound.as_slice() == values))
    }

    fn new_slot(
        &mut self,
        signature: NodeSignature,
        class: Option<NodeClass>,
        values: Vec<Fragment>,
    ) -> SlotId {
        debug_assert_eq!(values.len(), self.examples);
        while self.reserved.contains(&self.next_id) {
            self.next_id += 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.slots.insert(id, (signature, class));
        self.values.insert(id, values);
        id
    }
}

fn shared_kind(nodes: &[&Arc<SyntaxNode>]) -> String {
    match nodes.split_first() {
        Some((first, rest)) if rest.iter().all(|node| node.kind == first.kind) => {
            first.kind.clone()
        }
        _ => NodeSignature::ANY.to_string(),
    }
}

fn shared_class(nodes: &[&Arc<SyntaxNode>]) -> Option<NodeClass> {
    let (first, rest) = nodes.split_first()?;
    rest.iter()
        .all(|node| node.class == first.class)
        .then_some(first.class)
}

#[cfg(test)]
#[path = "abstractor_tests.rs"]
mod tests;
