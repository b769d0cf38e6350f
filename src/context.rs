//! Inheritable traversal context: the frame of patient/encounter/provider
//! style fields carried down an instance branch, and the accumulator that
//! digests graph edges into it.
//!
//! Frames are copied before being handed to a child branch, never mutated in
//! place and re-read by a sibling.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use enumset::EnumSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::{ContextField, ContextFieldMapping, PipelineConfig},
    graph::{EdgeOut, GraphNode, Iri, TripleStore},
};

/// One branch's context values. Cheap to clone; cloning is the
/// copy-on-write discipline for sibling isolation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFrame(BTreeMap<ContextField, String>);

impl ContextFrame {
    pub fn new() -> Self {
        ContextFrame::default()
    }

    pub fn get(&self, field: ContextField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn set(&mut self, field: ContextField, value: String) {
        self.0.insert(field, value);
    }

    /// A field holding an empty string counts as unpopulated.
    pub fn populated(&self, field: ContextField) -> bool {
        self.get(field).map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Mandatory fields still missing from this frame.
    pub fn missing_mandatory(&self, mandatory: EnumSet<ContextField>) -> EnumSet<ContextField> {
        mandatory
            .iter()
            .filter(|field| !self.populated(*field))
            .collect()
    }

    /// Three-way merge with named precedence: `local` wins over
    /// `inherited_weak`, which wins over `inherited_strong`.
    pub fn merged(
        local: &ContextFrame,
        inherited_weak: &ContextFrame,
        inherited_strong: &ContextFrame,
    ) -> ContextFrame {
        let mut out = inherited_strong.clone();
        for (field, value) in &inherited_weak.0 {
            out.0.insert(*field, value.clone());
        }
        for (field, value) in &local.0 {
            out.0.insert(*field, value.clone());
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContextField, &str)> {
        self.0.iter().map(|(field, value)| (*field, value.as_str()))
    }
}

/// Replaces wide source identifiers with small sequential aliases, one
/// numbering sequence per field. The same source value always maps to the
/// same alias within a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasRegistry {
    tables: BTreeMap<ContextField, BTreeMap<String, u64>>,
}

impl AliasRegistry {
    pub fn alias(&mut self, field: ContextField, value: &str) -> String {
        let table = self.tables.entry(field).or_default();
        let next = table.len() as u64 + 1;
        let id = *table.entry(value.to_string()).or_insert(next);
        id.to_string()
    }

    /// Source value → alias pairs for one field, for dimension-table export.
    pub fn entries(&self, field: ContextField) -> Vec<(&str, u64)> {
        self.tables
            .get(&field)
            .map(|table| {
                table
                    .iter()
                    .map(|(value, id)| (value.as_str(), *id))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Digests instance edges into context frames per the configured field
/// mappings.
#[derive(Debug, Clone)]
pub struct ContextAccumulator {
    mappings: Vec<ContextFieldMapping>,
    generalize_dates: bool,
    aliases: AliasRegistry,
    dead_ends: usize,
}

impl ContextAccumulator {
    pub fn from_config(config: &PipelineConfig) -> Self {
        ContextAccumulator {
            mappings: config.context_fields.clone(),
            generalize_dates: config.generalize_dates,
            aliases: AliasRegistry::default(),
            dead_ends: 0,
        }
    }

    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    /// Count of dereference chains that hit a dead end so far.
    pub fn dead_ends(&self) -> usize {
        self.dead_ends
    }

    /// Split `edges` into context updates and pass-through edges. Matched
    /// edges are always consumed, even when the inherited frame keeps its
    /// value; letting them through would re-emit context carriers as
    /// observation modifiers.
    pub fn digest<S: TripleStore + ?Sized>(
        &mut self,
        store: &S,
        edges: &[EdgeOut],
        inherited: &ContextFrame,
    ) -> (Vec<EdgeOut>, ContextFrame) {
        let mut frame = inherited.clone();
        let mut clean = Vec::with_capacity(edges.len());
        for edge in edges {
            let Some(mapping) = self
                .mappings
                .iter()
                .find(|mapping| mapping.predicate == edge.predicate)
                .cloned()
            else {
                clean.push(edge.clone());
                continue;
            };
            if frame.populated(mapping.field) && !mapping.overwrite {
                debug!(
                    field = ?mapping.field,
                    "Inherited context wins over {}", edge.predicate
                );
                continue;
            }
            let value = self.extract(store, &edge.object, &mapping);
            frame.set(mapping.field, value);
        }
        (clean, frame)
    }

    /// Follow the mapping's dereference chain from the edge target down to a
    /// scalar. A dead end yields an empty string.
    fn extract<S: TripleStore + ?Sized>(
        &mut self,
        store: &S,
        object: &GraphNode,
        mapping: &ContextFieldMapping,
    ) -> String {
        let mut current = object.clone();
        for predicate in &mapping.extract {
            let Some(resource) = current.as_resource() else {
                return self.dead_end(mapping, predicate);
            };
            match store.value_of(resource, predicate) {
                Some(next) => current = next,
                None => return self.dead_end(mapping, predicate),
            }
        }
        let raw = match &current {
            GraphNode::Literal(lit) => lit.lexical.clone(),
            GraphNode::Resource(iri) => iri.local_name().to_string(),
        };
        let value = if mapping.field == ContextField::StartDate {
            self.normalize_date(&raw)
        } else {
            raw
        };
        if mapping.aliased {
            self.aliases.alias(mapping.field, &value)
        } else {
            value
        }
    }

    fn dead_end(&mut self, mapping: &ContextFieldMapping, predicate: &Iri) -> String {
        self.dead_ends += 1;
        warn!(
            field = ?mapping.field,
            "Dead-end context dereference through {predicate}; using empty value"
        );
        String::new()
    }

    /// Normalize any recognized temporal lexical form to
    /// `YYYY-MM-DD 00:00:00`. Unrecognized forms pass through unchanged with
    /// a warning.
    fn normalize_date(&self, raw: &str) -> String {
        let date = parse_date(raw);
        let Some(date) = date else {
            warn!("Unparseable date value '{raw}' kept verbatim");
            return raw.to_string();
        };
        let date = if self.generalize_dates {
            // De-identification: snap to January 1st of the year.
            NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
        } else {
            date
        };
        format!("{} 00:00:00", date.format("%Y-%m-%d"))
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LiteralValue, MemoryStore};
    use test_log::test;

    fn mapping(
        field: ContextField,
        predicate: &str,
        overwrite: bool,
        extract: &[&str],
        aliased: bool,
    ) -> ContextFieldMapping {
        ContextFieldMapping {
            field,
            predicate: Iri::new(predicate),
            overwrite,
            extract: extract.iter().map(|s| Iri::new(*s)).collect(),
            mandatory: false,
            aliased,
        }
    }

    fn accumulator(mappings: Vec<ContextFieldMapping>, generalize: bool) -> ContextAccumulator {
        ContextAccumulator {
            mappings,
            generalize_dates: generalize,
            aliases: AliasRegistry::default(),
            dead_ends: 0,
        }
    }

    fn literal_edge(predicate: &str, lexical: &str) -> EdgeOut {
        EdgeOut {
            predicate: Iri::new(predicate),
            object: GraphNode::Literal(LiteralValue::new(lexical, None)),
        }
    }

    #[test]
    fn matched_edges_are_consumed_and_set_fields() {
        let store = MemoryStore::new();
        let mut acc = accumulator(
            vec![mapping(ContextField::Patient, "ex:has-patient", false, &[], false)],
            false,
        );
        let edges = vec![
            literal_edge("ex:has-patient", "p-77"),
            literal_edge("ex:has-code", "C50"),
        ];
        let (clean, frame) = acc.digest(&store, &edges, &ContextFrame::new());
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].predicate, Iri::new("ex:has-code"));
        assert_eq!(frame.get(ContextField::Patient), Some("p-77"));
    }

    #[test]
    fn overwrite_flag_gates_replacement() {
        let store = MemoryStore::new();
        let mut acc = accumulator(
            vec![
                mapping(ContextField::Patient, "ex:has-patient", false, &[], false),
                mapping(ContextField::Unit, "ex:has-unit", true, &[], false),
            ],
            false,
        );
        let mut inherited = ContextFrame::new();
        inherited.set(ContextField::Patient, "outer".to_string());
        inherited.set(ContextField::Unit, "outer-unit".to_string());

        let edges = vec![
            literal_edge("ex:has-patient", "inner"),
            literal_edge("ex:has-unit", "mg"),
        ];
        let (clean, frame) = acc.digest(&store, &edges, &inherited);
        // Both edges consumed even though patient kept its inherited value.
        assert!(clean.is_empty());
        assert_eq!(frame.get(ContextField::Patient), Some("outer"));
        assert_eq!(frame.get(ContextField::Unit), Some("mg"));
    }

    #[test]
    fn extraction_follows_dereference_chains() {
        let mut store = MemoryStore::new();
        store.insert_resource("ex:obs1", "ex:has-subject", "ex:wrapper1");
        store.insert_literal("ex:wrapper1", "ex:identifier", "patient-9", None);

        let mut acc = accumulator(
            vec![mapping(
                ContextField::Patient,
                "ex:has-subject",
                false,
                &["ex:identifier"],
                false,
            )],
            false,
        );
        let edges = store.children_of(&Iri::new("ex:obs1"));
        let (_, frame) = acc.digest(&store, &edges, &ContextFrame::new());
        assert_eq!(frame.get(ContextField::Patient), Some("patient-9"));
        assert_eq!(acc.dead_ends(), 0);
    }

    #[test]
    fn dead_end_dereference_yields_empty_string() {
        let mut store = MemoryStore::new();
        store.insert_resource("ex:obs1", "ex:has-subject", "ex:wrapper1");
        // wrapper1 has no identifier triple.

        let mut acc = accumulator(
            vec![mapping(
                ContextField::Patient,
                "ex:has-subject",
                false,
                &["ex:identifier"],
                false,
            )],
            false,
        );
        let edges = store.children_of(&Iri::new("ex:obs1"));
        let (_, frame) = acc.digest(&store, &edges, &ContextFrame::new());
        assert_eq!(frame.get(ContextField::Patient), Some(""));
        assert!(!frame.populated(ContextField::Patient));
        assert_eq!(acc.dead_ends(), 1);
    }

    #[test]
    fn dates_normalize_and_optionally_generalize() {
        let store = MemoryStore::new();
        let mappings = vec![mapping(
            ContextField::StartDate,
            "ex:has-date",
            true,
            &[],
            false,
        )];

        let mut acc = accumulator(mappings.clone(), false);
        let edges = vec![literal_edge("ex:has-date", "2021-05-10T14:30:00")];
        let (_, frame) = acc.digest(&store, &edges, &ContextFrame::new());
        assert_eq!(
            frame.get(ContextField::StartDate),
            Some("2021-05-10 00:00:00")
        );

        let mut acc = accumulator(mappings, true);
        let (_, frame) = acc.digest(&store, &edges, &ContextFrame::new());
        assert_eq!(
            frame.get(ContextField::StartDate),
            Some("2021-01-01 00:00:00")
        );
    }

    #[test]
    fn aliases_are_sequential_and_stable() {
        let mut registry = AliasRegistry::default();
        assert_eq!(registry.alias(ContextField::Patient, "alice"), "1");
        assert_eq!(registry.alias(ContextField::Patient, "bob"), "2");
        assert_eq!(registry.alias(ContextField::Patient, "alice"), "1");
        // Per-field numbering is independent.
        assert_eq!(registry.alias(ContextField::Encounter, "visit-1"), "1");
    }

    #[test]
    fn merge_precedence_is_local_then_weak_then_strong() {
        let mut strong = ContextFrame::new();
        strong.set(ContextField::Patient, "strong".to_string());
        strong.set(ContextField::Unit, "strong-unit".to_string());
        strong.set(ContextField::Provider, "strong-provider".to_string());
        let mut weak = ContextFrame::new();
        weak.set(ContextField::Patient, "weak".to_string());
        weak.set(ContextField::Unit, "weak-unit".to_string());
        let mut local = ContextFrame::new();
        local.set(ContextField::Patient, "local".to_string());

        let merged = ContextFrame::merged(&local, &weak, &strong);
        assert_eq!(merged.get(ContextField::Patient), Some("local"));
        assert_eq!(merged.get(ContextField::Unit), Some("weak-unit"));
        assert_eq!(merged.get(ContextField::Provider), Some("strong-provider"));
    }

    #[test]
    fn sibling_frames_do_not_leak_overrides() {
        let store = MemoryStore::new();
        let mappings = vec![mapping(ContextField::Unit, "ex:has-unit", true, &[], false)];
        let parent = ContextFrame::new();

        let mut acc = accumulator(mappings, false);
        let (_, left) = acc.digest(
            &store,
            &[literal_edge("ex:has-unit", "mg")],
            &parent,
        );
        let (_, right) = acc.digest(
            &store,
            &[literal_edge("ex:has-unit", "ml")],
            &parent,
        );
        assert_eq!(left.get(ContextField::Unit), Some("mg"));
        assert_eq!(right.get(ContextField::Unit), Some("ml"));
        assert_eq!(parent.get(ContextField::Unit), None);
    }
}
