//! Run configuration.
//!
//! One immutable [`PipelineConfig`] value is deserialized from a TOML
//! document before a run and passed by reference into every traversal. There
//! is no process-global filter state: the policy objects in
//! [`crate::policy`] and [`crate::context`] are constructed from this value
//! once at startup.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::read_to_string,
    path::Path,
};

use enumset::{EnumSet, EnumSetType};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{basecode::Basecoder, error::OntostarError, graph::Iri};

/// Scalar kind a datatype identifier resolves to.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Text,
    Number,
    Date,
}

impl ScalarKind {
    /// Single-letter value-type code carried by catalog and fact rows.
    pub fn value_type_code(&self) -> &'static str {
        match self {
            ScalarKind::Text => "T",
            ScalarKind::Number => "N",
            ScalarKind::Date => "D",
        }
    }
}

/// Inheritable context slots propagated down a traversal branch.
#[derive(EnumSetType, Debug, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    Provider,
    Patient,
    Encounter,
    StartDate,
    Unit,
    InstanceNum,
}

/// Binds a predicate to a context field, with its overwrite policy and the
/// dereference chain reaching the scalar value inside wrapper objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFieldMapping {
    pub field: ContextField,
    pub predicate: Iri,
    #[serde(default)]
    pub overwrite: bool,
    /// Predicates dereferenced in order from the edge target down to the
    /// scalar. Empty means the edge object itself is the value.
    #[serde(default)]
    pub extract: Vec<Iri>,
    #[serde(default)]
    pub mandatory: bool,
    /// Context values get replaced by small sequential aliases when set
    /// (fact tables reject arbitrarily wide identifiers).
    #[serde(default)]
    pub aliased: bool,
}

/// An explicit keep-exception to the drop-set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UndropException {
    pub dropped: Iri,
    pub parent: Iri,
}

/// Structural predicates of the ontology dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateTable {
    #[serde(default = "default_subclass")]
    pub subclass: Iri,
    #[serde(default = "default_subproperty")]
    pub subproperty: Iri,
    #[serde(default = "default_domain")]
    pub domain: Iri,
    #[serde(default = "default_range")]
    pub range: Iri,
    #[serde(default = "default_rdf_type")]
    pub rdf_type: Iri,
    #[serde(default = "default_label")]
    pub label: Iri,
    #[serde(default = "default_comment")]
    pub comment: Iri,
}

fn default_subclass() -> Iri {
    Iri::new("http://www.w3.org/2000/01/rdf-schema#subClassOf")
}
fn default_subproperty() -> Iri {
    Iri::new("http://www.w3.org/2000/01/rdf-schema#subPropertyOf")
}
fn default_domain() -> Iri {
    Iri::new("http://www.w3.org/2000/01/rdf-schema#domain")
}
fn default_range() -> Iri {
    Iri::new("http://www.w3.org/2000/01/rdf-schema#range")
}
fn default_rdf_type() -> Iri {
    Iri::new(crate::graph::RDF_TYPE)
}
fn default_label() -> Iri {
    Iri::new("http://www.w3.org/2000/01/rdf-schema#label")
}
fn default_comment() -> Iri {
    Iri::new("http://www.w3.org/2000/01/rdf-schema#comment")
}

impl Default for PredicateTable {
    fn default() -> Self {
        PredicateTable {
            subclass: default_subclass(),
            subproperty: default_subproperty(),
            domain: default_domain(),
            range: default_range(),
            rdf_type: default_rdf_type(),
            label: default_label(),
            comment: default_comment(),
        }
    }
}

/// How coded wrapper objects (external terminology codes carried inside a
/// dedicated class) are opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeClassMapping {
    /// Type identifier of the wrapper class.
    pub class: Iri,
    /// Predicate holding the coding-system name.
    pub system_predicate: Iri,
    /// Predicate holding the code identifier.
    pub code_predicate: Iri,
    /// Fallback predicate when the code identifier is absent.
    #[serde(default)]
    pub name_predicate: Option<Iri>,
}

fn default_basecode_cap() -> usize {
    Basecoder::DEFAULT_CAP
}

fn default_batch_size() -> usize {
    512
}

/// Immutable inputs of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Display name of the ontology release, used for the root catalog row.
    pub ontology_name: String,
    /// Root of every concept path, e.g. `\SPHN\`.
    pub root_prefix: String,
    /// Namespace prefix of project-owned identifiers. Anything outside it is
    /// an external terminology node.
    pub project_namespace: String,
    /// Concept identifiers compiled as hierarchy entry points, and whose
    /// instance closures the walker visits.
    pub root_entries: Vec<Iri>,
    #[serde(default)]
    pub predicates: PredicateTable,
    /// A concept is a closed valueset when it subclasses this marker.
    pub valueset_marker: Iri,
    /// Terminology namespace prefixes driving range muting.
    #[serde(default)]
    pub terminology_namespaces: Vec<String>,
    #[serde(default)]
    pub blacklist: BTreeSet<Iri>,
    #[serde(default)]
    pub drop_set: BTreeSet<Iri>,
    #[serde(default)]
    pub undrop: Vec<UndropException>,
    #[serde(default)]
    pub context_fields: Vec<ContextFieldMapping>,
    /// Datatype identifier → scalar kind, consulted before the builtin XSD
    /// table.
    #[serde(default)]
    pub value_kinds: BTreeMap<String, ScalarKind>,
    /// Known coding systems: matching token → short tag used in
    /// `tag:code` value suffixes.
    #[serde(default)]
    pub coding_systems: BTreeMap<String, String>,
    #[serde(default)]
    pub code_class: Option<CodeClassMapping>,
    /// Predicates whose modifier rows are hidden from hierarchy browsers
    /// (raw unit/date carriers).
    #[serde(default)]
    pub hidden_predicates: BTreeSet<Iri>,
    #[serde(default = "default_basecode_cap")]
    pub basecode_cap: usize,
    /// Disables terminology-sibling muting: always expand ranges fully.
    #[serde(default)]
    pub always_deep: bool,
    /// Snap all dates to January 1st of their year (de-identification).
    #[serde(default)]
    pub generalize_dates: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

static BUILTIN_VALUE_KINDS: Lazy<BTreeMap<&'static str, ScalarKind>> = Lazy::new(|| {
    BTreeMap::from([
        ("http://www.w3.org/2001/XMLSchema#string", ScalarKind::Text),
        ("http://www.w3.org/2001/XMLSchema#token", ScalarKind::Text),
        ("http://www.w3.org/2001/XMLSchema#anyURI", ScalarKind::Text),
        ("http://www.w3.org/2001/XMLSchema#int", ScalarKind::Number),
        (
            "http://www.w3.org/2001/XMLSchema#integer",
            ScalarKind::Number,
        ),
        ("http://www.w3.org/2001/XMLSchema#long", ScalarKind::Number),
        (
            "http://www.w3.org/2001/XMLSchema#double",
            ScalarKind::Number,
        ),
        ("http://www.w3.org/2001/XMLSchema#float", ScalarKind::Number),
        (
            "http://www.w3.org/2001/XMLSchema#decimal",
            ScalarKind::Number,
        ),
        ("http://www.w3.org/2001/XMLSchema#date", ScalarKind::Date),
        (
            "http://www.w3.org/2001/XMLSchema#dateTime",
            ScalarKind::Date,
        ),
    ])
});

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, OntostarError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OntostarError> {
        tracing::debug!("Reading pipeline config from {:?}", path.as_ref());
        let content = read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn is_project(&self, iri: &Iri) -> bool {
        iri.in_namespace(&self.project_namespace)
    }

    pub fn basecoder(&self) -> Basecoder {
        Basecoder::new(self.basecode_cap)
    }

    /// Scalar kind for a literal datatype: the run table first, then the
    /// builtin XSD defaults. `None` for untyped literals and unknown
    /// datatypes; callers decide whether that is fatal.
    pub fn scalar_kind(&self, datatype: Option<&Iri>) -> Option<ScalarKind> {
        let datatype = datatype?;
        self.value_kinds
            .get(datatype.as_str())
            .copied()
            .or_else(|| BUILTIN_VALUE_KINDS.get(datatype.as_str()).copied())
    }

    /// Scalar kind for a property range identifier (DatatypeLeaf detection).
    pub fn scalar_kind_of_range(&self, range: &Iri) -> Option<ScalarKind> {
        self.scalar_kind(Some(range))
    }

    pub fn context_mapping(&self, predicate: &Iri) -> Option<&ContextFieldMapping> {
        self.context_fields
            .iter()
            .find(|mapping| mapping.predicate == *predicate)
    }

    pub fn mandatory_fields(&self) -> EnumSet<ContextField> {
        self.context_fields
            .iter()
            .filter(|mapping| mapping.mandatory)
            .map(|mapping| mapping.field)
            .collect()
    }

    /// Short tag of a locally known coding system, matched by token
    /// containment like the original terminology lookup.
    pub fn coding_system_tag(&self, system: &str) -> Option<&str> {
        if system.is_empty() {
            return None;
        }
        self.coding_systems
            .iter()
            .find(|(token, _)| system.contains(token.as_str()))
            .map(|(_, tag)| tag.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const MINIMAL: &str = r#"
        ontology_name = "DEMO"
        root_prefix = "\\DEMO\\"
        project_namespace = "http://example.org/onto/"
        root_entries = ["http://example.org/onto/Event"]
        valueset_marker = "http://example.org/onto/Valueset"

        [[context_fields]]
        field = "patient"
        predicate = "http://example.org/onto/has-patient"
        mandatory = true
        aliased = true
    "#;

    #[test]
    fn minimal_document_round_trips() {
        let config = PipelineConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.basecode_cap, Basecoder::DEFAULT_CAP);
        assert_eq!(config.batch_size, 512);
        assert!(!config.always_deep);
        assert_eq!(config.mandatory_fields(), EnumSet::only(ContextField::Patient));
        assert!(config.is_project(&Iri::new("http://example.org/onto/Event")));
        assert!(!config.is_project(&Iri::new("http://terminology.example/icd/C50")));
    }

    #[test]
    fn builtin_xsd_kinds_apply_when_table_is_silent() {
        let config = PipelineConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(
            config.scalar_kind(Some(&Iri::new("http://www.w3.org/2001/XMLSchema#double"))),
            Some(ScalarKind::Number)
        );
        assert_eq!(
            config.scalar_kind(Some(&Iri::new("http://example.org/unknown"))),
            None
        );
        assert_eq!(config.scalar_kind(None), None);
    }
}
