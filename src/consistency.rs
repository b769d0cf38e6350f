//! Cross-pipeline consistency check: every code referenced by a fact row
//! must exist in the catalog. Reported, never fatal; catalog compilation and
//! data extraction commonly run as separate jobs against independently
//! versioned ontology snapshots.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    basecode::NO_MODIFIER,
    catalog::{Catalog, TableTarget},
    walker::ObservationRow,
};

/// One code used by the fact stream but never defined by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnresolvedCode {
    pub table: TableTarget,
    pub code: String,
}

/// Consistency report for one catalog/fact-stream pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub unresolved: Vec<UnresolvedCode>,
    pub referenced_concepts: usize,
    pub referenced_modifiers: usize,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Render for an external log/report writer.
    pub fn to_json(&self) -> Result<String, crate::error::OntostarError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Set difference of referenced versus defined codes, per table.
pub fn check(catalog: &Catalog, rows: &[ObservationRow]) -> ConsistencyReport {
    let mut referenced_concepts: BTreeSet<&str> = BTreeSet::new();
    let mut referenced_modifiers: BTreeSet<&str> = BTreeSet::new();
    for row in rows {
        referenced_concepts.insert(row.concept_code.as_str());
        if row.modifier_code != NO_MODIFIER {
            referenced_modifiers.insert(row.modifier_code.as_str());
        }
    }

    let defined_concepts = catalog.codes(TableTarget::Concept);
    let defined_modifiers = catalog.codes(TableTarget::Modifier);

    let mut unresolved: Vec<UnresolvedCode> = referenced_concepts
        .iter()
        .filter(|code| !defined_concepts.contains(**code))
        .map(|code| UnresolvedCode {
            table: TableTarget::Concept,
            code: code.to_string(),
        })
        .collect();
    unresolved.extend(
        referenced_modifiers
            .iter()
            .filter(|code| !defined_modifiers.contains(**code))
            .map(|code| UnresolvedCode {
                table: TableTarget::Modifier,
                code: code.to_string(),
            }),
    );

    if !unresolved.is_empty() {
        warn!(
            count = unresolved.len(),
            "Fact rows reference codes absent from the catalog"
        );
    }
    ConsistencyReport {
        unresolved,
        referenced_concepts: referenced_concepts.len(),
        referenced_modifiers: referenced_modifiers.len(),
    }
}
