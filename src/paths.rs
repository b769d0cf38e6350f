//! Hierarchical catalog path resolution.
//!
//! Paths are display-oriented (short names, not identifiers) and distinct
//! from basecodes: two catalog rows never share a `(path, basecode)` pair,
//! and modifier paths are rooted independently of the concept they apply to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::basecode::PATH_SEP;

/// Memoizing resolver for one path root. Concept resolvers are rooted at the
/// configured release prefix; modifier resolvers at the parent-agnostic
/// [`PATH_SEP`]. Parent links are assigned once, top-down, so cycles cannot
/// form and memoized entries never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResolver {
    root_prefix: String,
    cache: BTreeMap<Vec<String>, String>,
}

impl PathResolver {
    /// Resolver for concept paths. The prefix is normalized to start and end
    /// with the separator.
    pub fn new(root_prefix: &str) -> Self {
        let trimmed = root_prefix.trim_matches('\\');
        let root_prefix = if trimmed.is_empty() {
            PATH_SEP.to_string()
        } else {
            format!("{PATH_SEP}{trimmed}{PATH_SEP}")
        };
        PathResolver {
            root_prefix,
            cache: BTreeMap::new(),
        }
    }

    /// Resolver for modifier paths, always rooted at `\`.
    pub fn modifier_root() -> Self {
        PathResolver::new("")
    }

    pub fn root_prefix(&self) -> &str {
        &self.root_prefix
    }

    /// Path for a chain of short names below the root. Every path ends with
    /// the separator; resolution is memoized per chain and idempotent.
    pub fn resolve(&mut self, names: &[String]) -> String {
        if names.is_empty() {
            return self.root_prefix.clone();
        }
        if let Some(cached) = self.cache.get(names) {
            return cached.clone();
        }
        let parent = self.resolve(&names[..names.len() - 1]);
        let path = format!("{}{}{}", parent, names[names.len() - 1], PATH_SEP);
        self.cache.insert(names.to_vec(), path.clone());
        path
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

/// Hierarchy level bookkeeping: the root prefix sits at level 0, each
/// resolved segment below it adds one.
pub fn level(path: &str) -> usize {
    path.matches(PATH_SEP).count().saturating_sub(2)
}
