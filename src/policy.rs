//! Node filtering: blacklist, drop/undrop exceptions and terminology-sibling
//! muting.
//!
//! The policy is a value object built once from [`crate::config`] and passed
//! by reference into both traversals; there is no process-global filter
//! state to mutate.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{config::PipelineConfig, graph::Iri};

/// What a traversal does with a candidate child node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Recurse into the node's children.
    Expand,
    /// Keep the node as a childless leaf; its own subtree is not explored.
    Mute,
    /// Discard the node entirely.
    Drop,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterPolicy {
    blacklist: BTreeSet<Iri>,
    drop_set: BTreeSet<Iri>,
    undrop: BTreeSet<(Iri, Iri)>,
    terminology_namespaces: Vec<String>,
    always_deep: bool,
}

impl FilterPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        FilterPolicy {
            blacklist: config.blacklist.clone(),
            drop_set: config.drop_set.clone(),
            undrop: config
                .undrop
                .iter()
                .map(|exception| (exception.dropped.clone(), exception.parent.clone()))
                .collect(),
            terminology_namespaces: config.terminology_namespaces.clone(),
            always_deep: config.always_deep,
        }
    }

    pub fn is_blacklisted(&self, iri: &Iri) -> bool {
        self.blacklist.contains(iri)
    }

    /// Drop rule: the candidate's identifier, or any of its direct children's
    /// identifiers, matches the drop-set, unless an explicit
    /// `(dropped, parent)` exception keeps it.
    pub fn drops(&self, candidate: &Iri, children: &[Iri], parent: &Iri) -> bool {
        let hit = self.drop_set.contains(candidate)
            || children.iter().any(|child| self.drop_set.contains(child));
        if !hit {
            return false;
        }
        !self
            .undrop
            .contains(&(candidate.clone(), parent.clone()))
    }

    /// Terminology namespace prefix the identifier falls under, if any.
    pub fn terminology_prefix_of<'a>(&'a self, iri: &Iri) -> Option<&'a str> {
        self.terminology_namespaces
            .iter()
            .map(String::as_str)
            .find(|prefix| iri.in_namespace(prefix))
    }

    /// Sibling-muting rule for the ranges of one ObjectLink property: every
    /// terminology prefix represented twice or more has all its members
    /// muted. A lone representative of a prefix is never muted, and the
    /// always-deep override disables muting entirely.
    pub fn muted_ranges(&self, ranges: &[Iri]) -> BTreeSet<Iri> {
        if self.always_deep {
            return BTreeSet::new();
        }
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for range in ranges {
            if let Some(prefix) = self.terminology_prefix_of(range) {
                *counts.entry(prefix).or_default() += 1;
            }
        }
        ranges
            .iter()
            .filter(|range| {
                self.terminology_prefix_of(range)
                    .map(|prefix| counts[prefix] >= 2)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Verdict for one range of a property owned by `parent`.
    pub fn verdict(&self, candidate: &Iri, parent: &Iri, muted: &BTreeSet<Iri>) -> Verdict {
        if self.is_blacklisted(candidate) || self.drops(candidate, &[], parent) {
            Verdict::Drop
        } else if muted.contains(candidate) {
            Verdict::Mute
        } else {
            Verdict::Expand
        }
    }
}
