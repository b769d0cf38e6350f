//! Observation walker: recursive instance traversal producing fact rows.
//!
//! Rows are coded with the same chain discipline as the compiler: the concept
//! code hashes the ancestor-class chain from a configured root entry down to
//! the instance's declared type, and modifier chains re-root at that type and
//! grow by one predicate identifier per traversal step. Batches bound memory
//! only; batch size never changes the emitted rows.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    basecode::{Basecoder, CodeChain, NO_MODIFIER},
    config::{ContextField, PipelineConfig, ScalarKind},
    context::{ContextAccumulator, ContextFrame},
    error::OntostarError,
    graph::{EdgeOut, GraphNode, Iri, LiteralValue, TripleStore},
    policy::FilterPolicy,
};

/// A scalar observation value with its resolved kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    pub kind: ScalarKind,
    pub value: String,
}

/// One fact row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub concept_code: String,
    /// [`NO_MODIFIER`] for the row describing the concept itself.
    pub modifier_code: String,
    pub instance_num: u64,
    pub context: ContextFrame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<TypedValue>,
}

/// First batch creates the output target, the rest append to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushMode {
    Create,
    Append,
}

/// Batch consumer. Flush is a synchronous boundary: the walker does not
/// start the next batch until the call returns.
pub trait ObservationSink {
    fn flush(&mut self, batch: &[ObservationRow], mode: FlushMode) -> Result<(), OntostarError>;
}

/// In-memory sink used by tests and small runs. The mutex keeps the sink
/// shareable across worker threads walking independent entry classes.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<ObservationRow>>,
    flushes: Mutex<Vec<(FlushMode, usize)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn rows(&self) -> Vec<ObservationRow> {
        self.rows.lock().clone()
    }

    /// Flush log: mode and row count of each batch, in flush order.
    pub fn flushes(&self) -> Vec<(FlushMode, usize)> {
        self.flushes.lock().clone()
    }
}

impl ObservationSink for MemorySink {
    fn flush(&mut self, batch: &[ObservationRow], mode: FlushMode) -> Result<(), OntostarError> {
        self.flushes.lock().push((mode, batch.len()));
        self.rows.lock().extend_from_slice(batch);
        Ok(())
    }
}

/// Run counters reported after a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkSummary {
    pub instances_visited: usize,
    pub instances_skipped: usize,
    pub rows_emitted: usize,
    pub batches_flushed: usize,
    pub dead_end_dereferences: usize,
}

pub struct ObservationWalker<'a, S: TripleStore + ?Sized> {
    store: &'a S,
    config: &'a PipelineConfig,
    policy: FilterPolicy,
    coder: Basecoder,
    accumulator: ContextAccumulator,
    instance_counters: BTreeMap<Iri, u64>,
    summary: WalkSummary,
}

impl<'a, S: TripleStore + ?Sized> ObservationWalker<'a, S> {
    pub fn new(store: &'a S, config: &'a PipelineConfig) -> Self {
        ObservationWalker {
            store,
            config,
            policy: FilterPolicy::from_config(config),
            coder: config.basecoder(),
            accumulator: ContextAccumulator::from_config(config),
            instance_counters: BTreeMap::new(),
            summary: WalkSummary::default(),
        }
    }

    pub fn accumulator(&self) -> &ContextAccumulator {
        &self.accumulator
    }

    /// Walk every instance of every entry class, flushing rows to the sink
    /// in batches of the configured size. The walker stays usable afterwards
    /// so callers can export the accumulated alias tables.
    pub fn run(&mut self, sink: &mut dyn ObservationSink) -> Result<WalkSummary, OntostarError> {
        let batch_size = self.config.batch_size.max(1);
        let mut buffer: Vec<ObservationRow> = Vec::new();
        let mut flushed_any = false;

        for class in self.entry_classes() {
            for instance in self.store.subjects_of_type(&class) {
                let rows = self.walk_instance(&instance, &class)?;
                self.summary.rows_emitted += rows.len();
                buffer.extend(rows);
                while buffer.len() >= batch_size {
                    let batch: Vec<ObservationRow> = buffer.drain(..batch_size).collect();
                    self.flush(sink, &batch, &mut flushed_any)?;
                }
            }
        }
        if !buffer.is_empty() {
            let batch = std::mem::take(&mut buffer);
            self.flush(sink, &batch, &mut flushed_any)?;
        }

        self.summary.dead_end_dereferences = self.accumulator.dead_ends();
        info!(
            instances = self.summary.instances_visited,
            skipped = self.summary.instances_skipped,
            rows = self.summary.rows_emitted,
            "Observation walk finished"
        );
        Ok(self.summary)
    }

    fn flush(
        &mut self,
        sink: &mut dyn ObservationSink,
        batch: &[ObservationRow],
        flushed_any: &mut bool,
    ) -> Result<(), OntostarError> {
        let mode = if *flushed_any {
            FlushMode::Append
        } else {
            FlushMode::Create
        };
        sink.flush(batch, mode)?;
        *flushed_any = true;
        self.summary.batches_flushed += 1;
        Ok(())
    }

    /// Entry classes: the configured roots plus their subclass closure,
    /// minus valueset holders (their instances are catalog members, not
    /// observations).
    fn entry_classes(&self) -> Vec<Iri> {
        let mut classes: Vec<Iri> = Vec::new();
        let mut cursor = 0;
        classes.extend(self.config.root_entries.iter().cloned());
        while cursor < classes.len() {
            let current = classes[cursor].clone();
            cursor += 1;
            for subclass in self
                .store
                .subjects_with_object(&self.config.predicates.subclass, &current)
            {
                if !classes.contains(&subclass) {
                    classes.push(subclass);
                }
            }
        }
        classes
            .into_iter()
            .filter(|class| !self.is_valueset_holder(class))
            .collect()
    }

    /// Rows for one top-level instance. An instance missing mandatory
    /// context is skipped with a warning and produces nothing.
    fn walk_instance(
        &mut self,
        instance: &Iri,
        class: &Iri,
    ) -> Result<Vec<ObservationRow>, OntostarError> {
        let Some(class_chain) = self.class_chain(class) else {
            warn!("Instance {instance} typed outside the configured hierarchy; skipped");
            self.summary.instances_skipped += 1;
            return Ok(Vec::new());
        };
        let concept_code = self.coder.code(&class_chain);

        let edges = self.store.children_of(instance);
        let (clean, frame) = self
            .accumulator
            .digest(self.store, &edges, &ContextFrame::new());
        let missing = frame.missing_mandatory(self.config.mandatory_fields());
        if !missing.is_empty() {
            warn!("Instance {instance} skipped: missing mandatory context {missing:?}");
            self.summary.instances_skipped += 1;
            return Ok(Vec::new());
        }

        let counter = self.instance_counters.entry(class.clone()).or_insert(0);
        *counter += 1;
        let instance_num = *counter;
        let mut frame = frame;
        frame.set(ContextField::InstanceNum, instance_num.to_string());

        self.summary.instances_visited += 1;
        let mut rows = Vec::new();
        self.walk_node(
            NO_MODIFIER.to_string(),
            clean,
            CodeChain::root(class.clone()),
            frame,
            &concept_code,
            instance_num,
            &mut rows,
        )?;
        Ok(rows)
    }

    /// Emit the row for one node (absorbing its literal edges into the row
    /// value) and recurse into its resource edges.
    #[allow(clippy::too_many_arguments)]
    fn walk_node(
        &mut self,
        modifier_code: String,
        edges: Vec<EdgeOut>,
        chain: CodeChain,
        frame: ContextFrame,
        concept_code: &str,
        instance_num: u64,
        rows: &mut Vec<ObservationRow>,
    ) -> Result<(), OntostarError> {
        let mut absorbed: Option<TypedValue> = None;
        let mut descents: Vec<(Iri, Iri)> = Vec::new();

        for edge in edges {
            if self.is_structural(&edge.predicate) {
                continue;
            }
            match edge.object {
                GraphNode::Literal(lit) => {
                    let value = self.typed_value(&lit, &edge.predicate)?;
                    if absorbed.is_some() {
                        warn!(
                            "Node already carries a value; ignoring second literal via {}",
                            edge.predicate
                        );
                        continue;
                    }
                    absorbed = Some(value);
                }
                GraphNode::Resource(resource) => {
                    if self.policy.is_blacklisted(&resource) {
                        continue;
                    }
                    descents.push((edge.predicate, resource));
                }
            }
        }

        rows.push(ObservationRow {
            concept_code: concept_code.to_string(),
            modifier_code,
            instance_num,
            context: frame.clone(),
            value: absorbed,
        });

        for (predicate, resource) in descents {
            let extended = chain.extended(predicate.clone());
            if let Some(row) =
                self.path_end_row(&predicate, &resource, &extended, &frame, concept_code, instance_num)?
            {
                rows.push(row);
                continue;
            }
            let child_edges = self.store.children_of(&resource);
            let (clean, child_frame) = self.accumulator.digest(self.store, &child_edges, &frame);
            let code = self.coder.code(&extended);
            self.walk_node(
                code,
                clean,
                extended,
                child_frame,
                concept_code,
                instance_num,
                rows,
            )?;
        }
        Ok(())
    }

    /// Row for a resource target that terminates the traversal: a declared
    /// valueset member, a coded wrapper object, or a foreign terminology
    /// node with nothing expandable beyond its type and label.
    fn path_end_row(
        &self,
        predicate: &Iri,
        resource: &Iri,
        chain: &CodeChain,
        frame: &ContextFrame,
        concept_code: &str,
        instance_num: u64,
    ) -> Result<Option<ObservationRow>, OntostarError> {
        let row_base = |modifier_code: String, value: Option<TypedValue>| ObservationRow {
            concept_code: concept_code.to_string(),
            modifier_code,
            instance_num,
            context: frame.clone(),
            value,
        };

        if let Some(declared) = self.store.type_of(resource) {
            if self.is_valueset_holder(&declared) {
                let code = self.coder.code(&chain.extended(resource.clone()));
                let name = self.short_name(resource);
                return Ok(Some(row_base(
                    code,
                    Some(TypedValue {
                        kind: ScalarKind::Text,
                        value: name,
                    }),
                )));
            }
            if let Some(mapping) = &self.config.code_class {
                if declared == mapping.class {
                    let mapping = mapping.clone();
                    return Ok(Some(self.coded_row(&mapping, resource, chain, row_base)));
                }
            }
        }

        if !self.config.is_project(resource) {
            let expandable = self
                .store
                .children_of(resource)
                .into_iter()
                .any(|edge| !self.is_structural(&edge.predicate));
            if !expandable {
                debug!("Foreign terminology leaf {resource}");
                let code = match self.terminology_lineage(predicate, resource) {
                    Some(lineage) => {
                        let mut extended = chain.clone();
                        for node in lineage {
                            extended = extended.extended(node);
                        }
                        self.coder.code(&extended)
                    }
                    // Muted or unanchored node: the bare property chain is
                    // the join key, matching the collapsed catalog leaf.
                    None => self.coder.code(chain),
                };
                return Ok(Some(row_base(
                    code,
                    Some(TypedValue {
                        kind: ScalarKind::Text,
                        value: resource.local_name().to_string(),
                    }),
                )));
            }
            // A foreign node with real payload is walked like any other;
            // the consistency checker reports codes the catalog never
            // compiled because of muting.
            debug!("Descending into foreign node {resource} via {predicate}");
        }
        Ok(None)
    }

    /// Open a coded wrapper object. When the coding system is locally known
    /// the `tag:code` token is folded into the hash so raw terminology text
    /// never reaches the fact table; otherwise the token rides along as a
    /// free-text value.
    fn coded_row<F>(
        &self,
        mapping: &crate::config::CodeClassMapping,
        resource: &Iri,
        chain: &CodeChain,
        row_base: F,
    ) -> ObservationRow
    where
        F: FnOnce(String, Option<TypedValue>) -> ObservationRow,
    {
        let system = self
            .scalar_of(resource, &mapping.system_predicate)
            .unwrap_or_default();
        let code = self
            .scalar_of(resource, &mapping.code_predicate)
            .or_else(|| {
                mapping
                    .name_predicate
                    .as_ref()
                    .and_then(|pred| self.scalar_of(resource, pred))
            })
            .unwrap_or_default();

        match self.config.coding_system_tag(&system) {
            Some(tag) => {
                let token = format!("{tag}:{code}");
                row_base(self.coder.code_with_value(chain, &token), None)
            }
            None => {
                warn!("Unknown coding system '{system}'; emitting free-text value");
                row_base(
                    self.coder.code(chain),
                    Some(TypedValue {
                        kind: ScalarKind::Text,
                        value: code,
                    }),
                )
            }
        }
    }

    /// Superclass lineage from a declared, unmuted range of `predicate` down
    /// to `resource`, top first. The catalog extends modifier chains through
    /// the same identifiers when it expands a terminology tree. `None` when
    /// the node climbs to a muted range, or never reaches a declared range.
    fn terminology_lineage(&self, predicate: &Iri, resource: &Iri) -> Option<Vec<Iri>> {
        let ranges: Vec<Iri> = self
            .store
            .objects_of(predicate, &self.config.predicates.range)
            .into_iter()
            .filter_map(|object| object.as_resource().cloned())
            .collect();
        let muted = self.policy.muted_ranges(&ranges);

        let mut lineage = vec![resource.clone()];
        let mut current = resource.clone();
        while !ranges.contains(&current) {
            let parent = self
                .store
                .objects_of(&current, &self.config.predicates.subclass)
                .into_iter()
                .filter_map(|object| object.as_resource().cloned())
                .find(|parent| !self.config.is_project(parent))?;
            if lineage.contains(&parent) {
                return None;
            }
            lineage.push(parent.clone());
            current = parent;
        }
        if muted.contains(&current) {
            return None;
        }
        lineage.reverse();
        Some(lineage)
    }

    /// Ancestor-class chain from a configured root entry down to `class`,
    /// or `None` when the class never reaches a root.
    fn class_chain(&self, class: &Iri) -> Option<CodeChain> {
        let mut lineage = vec![class.clone()];
        let mut current = class.clone();
        while !self.config.root_entries.contains(&current) {
            let parent = self
                .store
                .objects_of(&current, &self.config.predicates.subclass)
                .into_iter()
                .filter_map(|object| object.as_resource().cloned())
                .find(|parent| {
                    *parent != self.config.valueset_marker && self.config.is_project(parent)
                })?;
            lineage.push(parent.clone());
            current = parent;
        }
        lineage.reverse();
        Some(CodeChain::from_iris(lineage))
    }

    fn typed_value(
        &self,
        literal: &LiteralValue,
        property: &Iri,
    ) -> Result<TypedValue, OntostarError> {
        let kind = match &literal.datatype {
            // Untyped literals default to text.
            None => ScalarKind::Text,
            Some(datatype) => self.config.scalar_kind(Some(datatype)).ok_or_else(|| {
                OntostarError::ScalarKind {
                    datatype: datatype.to_string(),
                    property: property.to_string(),
                }
            })?,
        };
        Ok(TypedValue {
            kind,
            value: literal.lexical.clone(),
        })
    }

    fn scalar_of(&self, node: &Iri, predicate: &Iri) -> Option<String> {
        match self.store.value_of(node, predicate)? {
            GraphNode::Literal(lit) => Some(lit.lexical),
            GraphNode::Resource(iri) => Some(iri.local_name().to_string()),
        }
    }

    fn is_structural(&self, predicate: &Iri) -> bool {
        let predicates = &self.config.predicates;
        *predicate == predicates.rdf_type
            || *predicate == predicates.label
            || *predicate == predicates.comment
            || *predicate == predicates.subclass
    }

    fn is_valueset_holder(&self, class: &Iri) -> bool {
        self.store
            .objects_of(class, &self.config.predicates.subclass)
            .iter()
            .any(|object| object.as_resource() == Some(&self.config.valueset_marker))
    }

    fn short_name(&self, iri: &Iri) -> String {
        match self.store.value_of(iri, &self.config.predicates.label) {
            Some(GraphNode::Literal(lit)) => lit.lexical,
            _ => iri.local_name().to_string(),
        }
    }
}
