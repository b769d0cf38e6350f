//! Content-addressed basecode generation.
//!
//! A basecode is the join key between the catalog tables and the fact table.
//! It is computed from ontology identifiers only, so the catalog compiler and
//! the observation walker can derive identical codes from two independent
//! traversals of different graphs. Codes are never shown to users; the only
//! requirements are uniqueness per described node and cross-pipeline
//! determinism.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::graph::Iri;

/// Separator terminating every identifier inside the hashed concatenation,
/// and separating segments of catalog paths.
pub const PATH_SEP: &str = "\\";

/// Sentinel modifier code for the fact row describing the concept itself.
pub const NO_MODIFIER: &str = "@";

/// Ordered identifier chain from the nearest logical owner down to the node
/// being coded. Chains are extended by value so sibling branches never
/// observe each other's suffixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChain(Vec<Iri>);

impl CodeChain {
    pub fn root(iri: Iri) -> Self {
        CodeChain(vec![iri])
    }

    pub fn from_iris<I: IntoIterator<Item = Iri>>(iris: I) -> Self {
        CodeChain(iris.into_iter().collect())
    }

    /// A copy of this chain with one more identifier appended.
    pub fn extended(&self, iri: Iri) -> Self {
        let mut next = self.clone();
        next.0.push(iri);
        next
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The hashed concatenation: every identifier terminated by [`PATH_SEP`].
    pub fn joined(&self) -> String {
        let mut out = String::new();
        for iri in &self.0 {
            out.push_str(iri.as_str());
            if !iri.as_str().ends_with(PATH_SEP) {
                out.push_str(PATH_SEP);
            }
        }
        out
    }
}

/// Basecode generator. `debug` skips hashing and returns the raw
/// concatenation for human inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basecoder {
    cap: usize,
    debug: bool,
}

impl Basecoder {
    pub const DEFAULT_CAP: usize = 50;

    pub fn new(cap: usize) -> Self {
        Basecoder { cap, debug: false }
    }

    pub fn debug(cap: usize) -> Self {
        Basecoder { cap, debug: true }
    }

    /// Code for a bare identifier chain. An empty chain hashes the empty
    /// string; callers treat that code as invalid.
    pub fn code(&self, chain: &CodeChain) -> String {
        self.reduce(chain.joined())
    }

    /// Code for a chain terminated by a value suffix (valueset member name,
    /// `system:code` token). A leading separator on the value is stripped so
    /// the suffix sits directly after the chain's final separator.
    pub fn code_with_value(&self, chain: &CodeChain, value: &str) -> String {
        let value = value.strip_prefix(PATH_SEP).unwrap_or(value);
        let mut to_hash = chain.joined();
        to_hash.push_str(value);
        self.reduce(to_hash)
    }

    fn reduce(&self, to_hash: String) -> String {
        if self.debug {
            return to_hash;
        }
        let digest = hex::encode(Sha256::digest(to_hash.as_bytes()));
        digest[..self.cap.min(digest.len())].to_string()
    }
}

impl Default for Basecoder {
    fn default() -> Self {
        Basecoder::new(Basecoder::DEFAULT_CAP)
    }
}
