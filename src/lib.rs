//! # ontostar
//!
//! A Rust library compiling class/property ontology graphs into hierarchical
//! relational catalogs, and walking instance data graphs into fact rows that
//! join against those catalogs.
//!
//! ## Overview
//!
//! ontostar contains two independent recursive graph traversals that must
//! stay mutually consistent:
//!
//! - the **ontology compiler** descends a schema-level graph (classes,
//!   properties, subclass/sub-property relations) and emits a **catalog** of
//!   concept and modifier dimension rows, and
//! - the **observation walker** descends instance-level graphs and emits
//!   **fact rows** whose join keys are derived by the same deterministic,
//!   content-addressed **basecode** scheme the compiler used.
//!
//! Every code referenced by a fact row must exist in the catalog; the
//! [`consistency`] module reports the set difference after a run.
//!
//! ### Key Features
//!
//! - **Content-addressed join keys**: identical identifier chains hash to
//!   identical basecodes across two independent traversals of different
//!   graphs
//! - **Terminology-sibling muting**: external coded vocabularies appearing
//!   on multiple sibling ranges collapse to leaves instead of exploding
//!   every branch
//! - **Drop/undrop filtering**: configured drop-sets with explicit
//!   `(dropped, parent)` keep-exceptions
//! - **Value absorption**: scalar-ranged properties fold into their parent
//!   row's value-type metadata instead of becoming rows of their own
//! - **Inheritable context**: patient/encounter/provider/date/unit fields
//!   propagate down instance branches copy-on-write, with per-field
//!   overwrite policy and optional date generalization
//! - **Bounded batches**: fact rows flush in fixed-size batches whose
//!   boundaries never change the emitted content
//!
//! ## Architecture
//!
//! Leaf-first dependency order:
//!
//! - **[`graph`]**: the [`graph::TripleStore`] query trait and the
//!   petgraph-backed [`graph::MemoryStore`] reference implementation
//! - **[`basecode`]**: identifier chains and the hashing
//!   [`basecode::Basecoder`]
//! - **[`paths`]**: memoized hierarchical path resolution
//! - **[`policy`]**: blacklist/drop/undrop/muting decisions
//! - **[`config`]**: the immutable per-run [`config::PipelineConfig`]
//! - **[`catalog`]**: catalog rows and their uniqueness bookkeeping
//! - **[`compiler`]**: ontology traversal producing a [`catalog::Catalog`]
//! - **[`context`]**: inheritable context frames and edge digestion
//! - **[`walker`]**: instance traversal producing
//!   [`walker::ObservationRow`] batches
//! - **[`consistency`]**: catalog/fact-stream cross check
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ontostar::{
//!     compiler::OntologyCompiler,
//!     config::PipelineConfig,
//!     consistency,
//!     graph::MemoryStore,
//!     walker::{MemorySink, ObservationWalker},
//! };
//!
//! fn main() -> Result<(), ontostar::OntostarError> {
//!     let config = PipelineConfig::load("pipeline.toml")?;
//!     let store = MemoryStore::new(); // populated from your graph source
//!
//!     // Compile the ontology into catalog rows.
//!     let (catalog, compile_summary) = OntologyCompiler::new(&store, &config).compile()?;
//!     println!("{} catalog rows", catalog.len());
//!
//!     // Walk instance data into fact rows.
//!     let mut sink = MemorySink::new();
//!     let walk_summary = ObservationWalker::new(&store, &config).run(&mut sink)?;
//!     println!(
//!         "{} rows from {} instances ({} skipped)",
//!         walk_summary.rows_emitted, walk_summary.instances_visited,
//!         walk_summary.instances_skipped,
//!     );
//!
//!     // Every referenced code should resolve against the catalog.
//!     let report = consistency::check(&catalog, &sink.rows());
//!     assert!(report.is_clean());
//!     let _ = compile_summary;
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Basecode chains
//!
//! A basecode hashes an ordered identifier chain, each identifier terminated
//! by `\`. Chains re-root at the concept owning a modifier tree, so a
//! property declared on an abstract ancestor codes identically under every
//! concrete descendant using it. The walker rebuilds the same chains from
//! instance types and edge predicates, which is what makes the catalog and
//! the fact stream joinable without any shared state.
//!
//! ### Catalog shape
//!
//! Concepts with subclasses become directory rows; leaf concepts expand
//! their applicable properties into a modifier tree rooted at `\`. Closed
//! valuesets expand into one leaf row per enumerated member. Scalar-ranged
//! properties never become rows: their kind is absorbed into the parent
//! row's value-type metadata, and absorbing a second kind at the same parent
//! aborts the run.
//!
//! ### Context frames
//!
//! The walker digests configured context predicates out of each node's edge
//! set into a [`context::ContextFrame`] before recursing. Frames are cloned
//! per branch; sibling branches never observe each other's overrides.
//!
//! ## Module Guide
//!
//! Start with [`config::PipelineConfig`] and [`compiler::OntologyCompiler`],
//! then [`walker::ObservationWalker`] for the data side. [`graph`] documents
//! the store queries a custom backend must answer.

pub mod basecode;
pub mod catalog;
pub mod compiler;
pub mod config;
pub mod consistency;
pub mod context;
pub mod error;
pub mod graph;
pub mod paths;
pub mod policy;
#[cfg(test)]
mod tests;
pub mod walker;

pub use error::*;
