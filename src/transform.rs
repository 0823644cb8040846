//! Concrete transforms and the abstraction driver that learns them.
use crate::error::{Error, Result};
use crate::generator::{GeneratorKind, GeneratorLimits, Observation, ShapeGenerator, VarGenerator};
use crate::schema::{
    Bindings, HeadPosition, Pattern, SchemaAbstractor, SlotId, TrainingExample, TransformSchema,
};
use crate::site::Site;
use crate::tree::{Fragment, NodeSignature, SyntaxNode};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A schema with one generator per generated slot. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTransform {
    schema: Arc<TransformSchema>,
    generators: BTreeMap<SlotId, VarGenerator>,
}

impl CodeTransform {
    pub fn new(
        schema: Arc<TransformSchema>,
        generators: BTreeMap<SlotId, VarGenerator>,
    ) -> Result<Self> {
        schema.validate()?;
        let generated = schema.generated_slots();
        if let Some(missing) = generated.iter().find(|id| !generators.contains_key(id)) {
            return Err(Error::InvalidTransform(format!(
                "slot {missing} has no generator"
            )));
        }
        if let Some(extra) = generators.keys().find(|id| !generated.contains(id)) {
            return Err(Error::InvalidTransform(format!(
                "generator assigned to slot {extra}, which is not a generated slot"
            )));
        }
        Ok(Self { schema, generators })
    }

    pub fn schema(&self) -> &TransformSchema {
        &self.schema
    }

    pub fn generators(&self) -> &BTreeMap<SlotId, VarGenerator> {
        &self.generators
    }

    pub fn generator(&self, slot: SlotId) -> Option<&VarGenerator> {
        self.generators.get(&slot)
    }

    /// The shape generator when the whole after side is one Trait slot.
    pub fn trait_only(&self) -> Option<&ShapeGenerator> {
        match self.schema.after.as_slice() {
            [Pattern::Slot { id }] => match self.generators.get(id) {
                Some(VarGenerator::Trait(shape)) => Some(shape),
                _ => None,
            },
            _ => None,
        }
    }

    /// One-line summary used by `inspect` output and logs.
    pub fn describe(&self) -> String {
        let before = crate::schema::render_patterns(&self.schema.before);
        let after = crate::schema::render_patterns(&self.schema.after);
        let generators = self
            .generators
            .iter()
            .map(|(id, generator)| format!("${id}={}", generator.kind()))
            .collect::<Vec<_>>();
        if generators.is_empty() {
            format!("{before} => {after}")
        } else {
            format!("{before} => {after} [{}]", generators.join(", "))
        }
    }
}

/// One schema the training pairs generalize to, with every viable generator
/// per generated slot in priority order.
#[derive(Debug, Clone)]
pub struct LearnedSchema {
    schema: Arc<TransformSchema>,
    candidates: BTreeMap<SlotId, Vec<VarGenerator>>,
}

impl LearnedSchema {
    pub fn schema(&self) -> &Arc<TransformSchema> {
        &self.schema
    }

    pub fn slot_generators(&self) -> &BTreeMap<SlotId, Vec<VarGenerator>> {
        &self.candidates
    }

    fn num_transforms(&self) -> u64 {
        self.candidates
            .values()
            .fold(1u64, |acc, viable| acc.saturating_mul(viable.len() as u64))
    }

    /// Depth-first walk over the per-slot generator choices, slots in id
    /// order with the last slot varying fastest.
    pub fn transforms(&self) -> TransformIter<'_> {
        TransformIter {
            schema: Arc::clone(&self.schema),
            slots: self
                .candidates
                .iter()
                .map(|(id, viable)| (*id, viable.as_slice()))
                .collect(),
            cursor: vec![0; self.candidates.len()],
            done: false,
        }
    }
}

/// Learns transforms from training pairs.
///
/// The per-leaf schema comes first. Each after-side position whose root is
/// shared by every example but which still needs generating below adds a
/// coarser schema where one Trait generator rebuilds the whole subtree.
#[derive(Debug)]
pub struct TransformAbstractor {
    abstractor: SchemaAbstractor,
    limits: GeneratorLimits,
    learned: Vec<LearnedSchema>,
}

impl TransformAbstractor {
    pub fn new(limits: GeneratorLimits) -> Self {
        Self {
            abstractor: SchemaAbstractor::new(),
            limits,
            learned: Vec::new(),
        }
    }

    pub fn add_mapping(&mut self, site: Site, after: Fragment) {
        self.abstractor.add_mapping(site, after);
        self.learned.clear();
    }

    /// Build the schemas and pick generators. Fails, dropping every recorded
    /// example, when no schema can reproduce all of its training pairs.
    pub fn generalize(&mut self) -> bool {
        self.learned.clear();
        if !self.abstractor.generalize() {
            self.clear();
            return false;
        }
        let learned = match self.abstractor.schema() {
            Some(schema) => self.learn_schemas(schema),
            None => Vec::new(),
        };
        if learned.is_empty() {
            self.clear();
            return false;
        }
        self.learned = learned;
        true
    }

    fn learn_schemas(&self, schema: &TransformSchema) -> Vec<LearnedSchema> {
        let examples = self.abstractor.examples();
        let values = self.abstractor.bindings();
        // Generators only ever see what matching the before skeleton binds.
        let bindings: Vec<Bindings> = values
            .iter()
            .map(|bound| {
                bound
                    .iter()
                    .filter(|(id, _)| schema.slot(**id).is_some_and(|info| info.inferable))
                    .map(|(id, fragment)| (*id, fragment.clone()))
                    .collect()
            })
            .collect();

        let mut viable = BTreeMap::new();
        for slot in schema.generated_slots() {
            let observed: Option<Vec<&SyntaxNode>> = values
                .iter()
                .map(|bound| match bound.get(&slot).map(Vec::as_slice) {
                    Some([value]) => Some(value.as_ref()),
                    _ => None,
                })
                .collect();
            let generators = observed
                .map(|observed| {
                    let observations = observations(examples, &bindings, &observed);
                    VarGenerator::learn_all(&observations, self.limits)
                })
                .unwrap_or_default();
            if generators.is_empty() {
                tracing::debug!(slot, examples = examples.len(), "no viable generator for slot");
            } else {
                tracing::debug!(
                    slot,
                    viable = generators.len(),
                    first = %generators[0].kind(),
                    "selected slot generators"
                );
            }
            viable.insert(slot, generators);
        }

        let mut learned = Vec::new();
        if viable.values().all(|generators| !generators.is_empty()) {
            learned.push(LearnedSchema {
                schema: Arc::new(schema.clone()),
                candidates: viable.clone(),
            });
        }
        for head in self.abstractor.heads() {
            if let Some(coarse) = self.learn_head(schema, head, &viable, &bindings) {
                learned.push(coarse);
            }
        }
        learned
    }

    /// Coarse schema for one shared-head position, when a Trait generator
    /// rebuilds every example's subtree there.
    fn learn_head(
        &self,
        schema: &TransformSchema,
        head: &HeadPosition,
        viable: &BTreeMap<SlotId, Vec<VarGenerator>>,
        bindings: &[Bindings],
    ) -> Option<LearnedSchema> {
        let root = head.values.first()?;
        let (coarse, id) = schema.with_generated_head(
            &head.path,
            NodeSignature::single(root.kind.clone()),
            Some(root.class),
        )?;
        let examples = self.abstractor.examples();
        let observed: Vec<&SyntaxNode> = head.values.iter().map(Arc::as_ref).collect();
        let shape = VarGenerator::learn(
            GeneratorKind::Trait,
            &observations(examples, bindings, &observed),
            self.limits,
        )?;

        let mut candidates = BTreeMap::new();
        for slot in coarse.generated_slots() {
            if slot == id {
                candidates.insert(slot, vec![shape.clone()]);
            } else {
                let generators = viable.get(&slot).filter(|generators| !generators.is_empty())?;
                candidates.insert(slot, generators.clone());
            }
        }
        let learned = LearnedSchema {
            schema: Arc::new(coarse),
            candidates,
        };
        // A trait-only schema must still accept its own training targets.
        let sample = learned.transforms().next()?;
        if let Some(shape) = sample.trait_only() {
            let targets_fit = examples
                .iter()
                .all(|example| example.site.target.iter().all(|node| shape.accepts_target(node)));
            if !targets_fit {
                return None;
            }
        }
        tracing::debug!(path = ?head.path, slot = id, "added shared-head trait schema");
        Some(learned)
    }

    /// Primary schema: the per-leaf one when it is viable.
    pub fn schema(&self) -> Option<&Arc<TransformSchema>> {
        self.learned.first().map(LearnedSchema::schema)
    }

    pub fn learned(&self) -> &[LearnedSchema] {
        &self.learned
    }

    /// Number of transforms [`generators`](Self::generators) yields; zero
    /// before a successful `generalize`.
    pub fn num_generators(&self) -> u64 {
        self.learned
            .iter()
            .fold(0u64, |acc, learned| acc.saturating_add(learned.num_transforms()))
    }

    /// Lazily materialize one transform per generator combination, schema by
    /// schema.
    pub fn generators(&self) -> impl Iterator<Item = CodeTransform> + '_ {
        self.learned.iter().flat_map(LearnedSchema::transforms)
    }

    pub fn clear(&mut self) {
        self.abstractor.clear();
        self.learned.clear();
    }
}

fn observations<'a>(
    examples: &'a [TrainingExample],
    bindings: &'a [Bindings],
    values: &[&'a SyntaxNode],
) -> Vec<Observation<'a>> {
    examples
        .iter()
        .zip(bindings)
        .zip(values.iter().copied())
        .map(|((example, bindings), value)| Observation {
            site: &example.site,
            bindings,
            value,
        })
        .collect()
}

/// Depth-first walk over the per-slot generator choices of one schema.
pub struct TransformIter<'a> {
    schema: Arc<TransformSchema>,
    slots: Vec<(SlotId, &'a [VarGenerator])>,
    cursor: Vec<usize>,
    done: bool,
}

impl Iterator for TransformIter<'_> {
    type Item = CodeTransform;

    fn next(&mut self) -> Option<CodeTransform> {
        if self.done {
            return None;
        }
        let generators = self
            .slots
            .iter()
            .zip(&self.cursor)
            .map(|((id, viable), idx)| (*id, viable[*idx].clone()))
            .collect();

        self.done = true;
        for pos in (0..self.cursor.len()).rev() {
            self.cursor[pos] += 1;
            if self.cursor[pos] < self.slots[pos].1.len() {
                self.done = false;
                break;
            }
            self.cursor[pos] = 0;
        }
        Some(CodeTransform {
            schema: Arc::clone(&self.schema),
            generators,
        })
    }
}
