//! Triple-store interface and the petgraph-backed in-memory reference store.
//!
//! The compiler and the walker only talk to [`TripleStore`]. [`MemoryStore`]
//! is the reference implementation used by tests and small pipelines; a
//! production deployment can substitute any backend that answers the same
//! queries.

use std::collections::BTreeMap;

use petgraph::{graph::NodeIndex, visit::EdgeRef, Direction};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Default `rdf:type` predicate used by [`MemoryStore`].
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// A graph identifier. Kept as an opaque string: ontology identifiers are not
/// always parseable URLs and the pipelines never need their structure beyond
/// prefix matching and the local-name suffix.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Iri(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Suffix after the last `#`, `/` or `:`, used as the short display name
    /// when no label triple exists.
    pub fn local_name(&self) -> &str {
        let cut = self
            .0
            .rfind(|c| c == '#' || c == '/' || c == ':')
            .map(|idx| idx + 1)
            .unwrap_or(0);
        &self.0[cut..]
    }

    pub fn in_namespace(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(prefix)
    }
}

impl Display for Iri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Iri(value.to_string())
    }
}

impl From<String> for Iri {
    fn from(value: String) -> Self {
        Iri(value)
    }
}

/// A literal object: lexical form plus its optional datatype identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LiteralValue {
    pub lexical: String,
    pub datatype: Option<Iri>,
}

impl LiteralValue {
    pub fn new<S: Into<String>>(lexical: S, datatype: Option<Iri>) -> Self {
        LiteralValue {
            lexical: lexical.into(),
            datatype,
        }
    }
}

/// A node of the graph, resolved to its variant once when first visited
/// rather than re-inspected at every call site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GraphNode {
    Resource(Iri),
    Literal(LiteralValue),
}

impl GraphNode {
    pub fn as_resource(&self) -> Option<&Iri> {
        match self {
            GraphNode::Resource(iri) => Some(iri),
            GraphNode::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&LiteralValue> {
        match self {
            GraphNode::Resource(_) => None,
            GraphNode::Literal(lit) => Some(lit),
        }
    }
}

/// One outgoing edge of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeOut {
    pub predicate: Iri,
    pub object: GraphNode,
}

/// Read-only query surface consumed by both pipelines.
///
/// Union/blank-node range constructs are the store's concern: `objects_of`
/// must answer with the already-expanded member list.
pub trait TripleStore {
    /// Outgoing edges of a resource, in insertion order.
    fn children_of(&self, node: &Iri) -> Vec<EdgeOut>;

    /// All objects of `(node, predicate)`, in insertion order.
    fn objects_of(&self, node: &Iri, predicate: &Iri) -> Vec<GraphNode>;

    /// First object of `(node, predicate)`.
    fn value_of(&self, node: &Iri, predicate: &Iri) -> Option<GraphNode> {
        self.objects_of(node, predicate).into_iter().next()
    }

    /// Declared type of a resource.
    fn type_of(&self, node: &Iri) -> Option<Iri>;

    /// Instances declared with the given type, in insertion order.
    fn subjects_of_type(&self, type_iri: &Iri) -> Vec<Iri>;

    /// Subjects holding `(predicate, object)`; subclass, sub-property and
    /// domain lookups run through this.
    fn subjects_with_object(&self, predicate: &Iri, object: &Iri) -> Vec<Iri>;
}

/// In-memory labeled directed graph over [`petgraph::Graph`], with a
/// side table interning resource identifiers to node indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStore {
    graph: petgraph::Graph<GraphNode, Iri>,
    index: BTreeMap<Iri, NodeIndex>,
    type_predicate: Iri,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            graph: petgraph::Graph::new(),
            index: BTreeMap::new(),
            type_predicate: Iri::new(RDF_TYPE),
        }
    }

    /// Use a non-standard type predicate (the default is `rdf:type`).
    pub fn with_type_predicate(type_predicate: Iri) -> Self {
        MemoryStore {
            type_predicate,
            ..MemoryStore::new()
        }
    }

    pub fn len(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }

    fn resource_index(&mut self, iri: &Iri) -> NodeIndex {
        if let Some(idx) = self.index.get(iri) {
            return *idx;
        }
        let idx = self.graph.add_node(GraphNode::Resource(iri.clone()));
        self.index.insert(iri.clone(), idx);
        idx
    }

    /// Insert one triple. Literal objects are not interned: every literal
    /// occurrence is its own node.
    pub fn insert(&mut self, subject: &str, predicate: &str, object: GraphNode) {
        let subject_idx = self.resource_index(&Iri::new(subject));
        let object_idx = match &object {
            GraphNode::Resource(iri) => self.resource_index(iri),
            GraphNode::Literal(_) => self.graph.add_node(object.clone()),
        };
        self.graph
            .add_edge(subject_idx, object_idx, Iri::new(predicate));
    }

    pub fn insert_resource(&mut self, subject: &str, predicate: &str, object: &str) {
        self.insert(subject, predicate, GraphNode::Resource(Iri::new(object)));
    }

    pub fn insert_literal(
        &mut self,
        subject: &str,
        predicate: &str,
        lexical: &str,
        datatype: Option<&str>,
    ) {
        self.insert(
            subject,
            predicate,
            GraphNode::Literal(LiteralValue::new(lexical, datatype.map(Iri::new))),
        );
    }
}

impl TripleStore for MemoryStore {
    fn children_of(&self, node: &Iri) -> Vec<EdgeOut> {
        let Some(idx) = self.index.get(node) else {
            return Vec::new();
        };
        // petgraph yields outgoing edges newest-first; reverse for
        // insertion order.
        let mut edges = self
            .graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|edge| EdgeOut {
                predicate: edge.weight().clone(),
                object: self.graph[edge.target()].clone(),
            })
            .collect::<Vec<_>>();
        edges.reverse();
        edges
    }

    fn objects_of(&self, node: &Iri, predicate: &Iri) -> Vec<GraphNode> {
        self.children_of(node)
            .into_iter()
            .filter(|edge| edge.predicate == *predicate)
            .map(|edge| edge.object)
            .collect()
    }

    fn type_of(&self, node: &Iri) -> Option<Iri> {
        self.value_of(node, &self.type_predicate)
            .and_then(|object| object.as_resource().cloned())
    }

    fn subjects_of_type(&self, type_iri: &Iri) -> Vec<Iri> {
        self.subjects_with_object(&self.type_predicate, type_iri)
    }

    fn subjects_with_object(&self, predicate: &Iri, object: &Iri) -> Vec<Iri> {
        let Some(idx) = self.index.get(object) else {
            return Vec::new();
        };
        let mut subjects = self
            .graph
            .edges_directed(*idx, Direction::Incoming)
            .filter(|edge| edge.weight() == predicate)
            .filter_map(|edge| self.graph[edge.source()].as_resource().cloned())
            .collect::<Vec<_>>();
        subjects.reverse();
        subjects
    }
}
