//! The relational catalog: rows produced by the ontology compiler and the
//! uniqueness bookkeeping that guards them.
//!
//! Rows are plain serializable records. The [`Catalog`] container enforces
//! the one structural invariant the downstream schema cannot express itself:
//! no two rows may share a `(path, basecode)` pair.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    basecode::PATH_SEP,
    config::ScalarKind,
    error::OntostarError,
    paths::level,
};

/// Which catalog table a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableTarget {
    /// Concept hierarchy rows, rooted at the release prefix.
    Concept,
    /// Modifier rows, rooted at `\` and bound to concepts via applied paths.
    Modifier,
}

/// Hierarchy-browser rendering hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualAttr {
    Folder,
    Leaf,
    /// Present in the fact stream but not shown in browsers (raw unit and
    /// date carriers).
    Hidden,
}

impl VisualAttr {
    /// Two-letter rendering code of the downstream schema.
    pub fn code(&self, table: TableTarget) -> &'static str {
        match (table, self) {
            (TableTarget::Concept, VisualAttr::Folder) => "FA",
            (TableTarget::Concept, VisualAttr::Leaf) => "LA",
            (TableTarget::Concept, VisualAttr::Hidden) => "LH",
            (TableTarget::Modifier, VisualAttr::Folder) => "DA",
            (TableTarget::Modifier, VisualAttr::Leaf) => "RA",
            (TableTarget::Modifier, VisualAttr::Hidden) => "RH",
        }
    }
}

/// Scalar expectation a row carries when a literal-valued property was
/// absorbed into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueTypeMeta {
    pub kind: ScalarKind,
    /// Identifier of the absorbed property, kept for conflict reporting.
    pub property: crate::graph::Iri,
}

/// One row of the compiled catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub table: TableTarget,
    pub path: String,
    pub basecode: String,
    /// Human-readable short name (label when present, local name otherwise).
    pub name: String,
    pub visual_attr: VisualAttr,
    /// Concept-path pattern a modifier row applies to; `"@"` for concept
    /// rows.
    pub applied_path: String,
    pub level: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_meta: Option<ValueTypeMeta>,
}

impl CatalogRow {
    pub fn concept(path: String, basecode: String, name: String, visual_attr: VisualAttr) -> Self {
        let level = level(&path);
        CatalogRow {
            table: TableTarget::Concept,
            path,
            basecode,
            name,
            visual_attr,
            applied_path: crate::basecode::NO_MODIFIER.to_string(),
            level,
            tooltip: None,
            value_meta: None,
        }
    }

    pub fn modifier(
        path: String,
        basecode: String,
        name: String,
        visual_attr: VisualAttr,
        applied_path: String,
    ) -> Self {
        let level = level(&path);
        CatalogRow {
            table: TableTarget::Modifier,
            path,
            basecode,
            name,
            visual_attr,
            applied_path,
            level,
            tooltip: None,
            value_meta: None,
        }
    }

    pub fn with_tooltip(mut self, tooltip: Option<String>) -> Self {
        self.tooltip = tooltip;
        self
    }

    pub fn with_value_meta(mut self, value_meta: Option<ValueTypeMeta>) -> Self {
        self.value_meta = value_meta;
        self
    }
}

/// Compiled catalog with its uniqueness index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    rows: Vec<CatalogRow>,
    index: BTreeSet<(String, String)>,
    concept_paths: BTreeSet<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Append a row, rejecting `(path, basecode)` duplicates. A collision
    /// means two distinct ontology nodes reduced to the same coordinates,
    /// which would silently merge their facts downstream.
    pub fn push(&mut self, row: CatalogRow) -> Result<(), OntostarError> {
        let key = (row.path.clone(), row.basecode.clone());
        if !self.index.insert(key) {
            return Err(OntostarError::Collision {
                path: row.path,
                basecode: row.basecode,
            });
        }
        if row.table == TableTarget::Concept {
            self.concept_paths.insert(row.path.clone());
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[CatalogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn concept_rows(&self) -> impl Iterator<Item = &CatalogRow> {
        self.rows
            .iter()
            .filter(|row| row.table == TableTarget::Concept)
    }

    pub fn modifier_rows(&self) -> impl Iterator<Item = &CatalogRow> {
        self.rows
            .iter()
            .filter(|row| row.table == TableTarget::Modifier)
    }

    /// Basecodes of one table, for consistency checking.
    pub fn codes(&self, table: TableTarget) -> BTreeSet<&str> {
        self.rows
            .iter()
            .filter(|row| row.table == table)
            .map(|row| row.basecode.as_str())
            .collect()
    }

    /// Every modifier row must apply to a concept path the catalog actually
    /// contains. Run after compilation; a failure is a compiler bug, not a
    /// data problem.
    pub fn validate_applied_paths(&self) -> Result<(), OntostarError> {
        for row in self.modifier_rows() {
            let pattern = row
                .applied_path
                .strip_suffix('%')
                .unwrap_or(&row.applied_path);
            let applies = self
                .concept_paths
                .iter()
                .any(|path| path.starts_with(pattern));
            if !applies {
                return Err(OntostarError::UnappliedModifier(format!(
                    "modifier {} applies to no concept path (pattern {})",
                    row.path, row.applied_path
                )));
            }
        }
        Ok(())
    }

    /// Applied-path pattern for modifiers of the concept at `concept_path`:
    /// the path plus a trailing `%` wildcard so sub-concepts inherit them.
    pub fn applied_pattern(concept_path: &str) -> String {
        debug_assert!(concept_path.ends_with(PATH_SEP));
        format!("{concept_path}%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn concept(path: &str, code: &str) -> CatalogRow {
        CatalogRow::concept(
            path.to_string(),
            code.to_string(),
            "x".to_string(),
            VisualAttr::Leaf,
        )
    }

    #[test]
    fn duplicate_coordinates_are_rejected() {
        let mut catalog = Catalog::new();
        catalog.push(concept("\\DEMO\\A\\", "c1")).unwrap();
        // Same path under a different code is fine.
        catalog.push(concept("\\DEMO\\A\\", "c2")).unwrap();
        // Same code under a different path is fine.
        catalog.push(concept("\\DEMO\\B\\", "c1")).unwrap();
        let err = catalog.push(concept("\\DEMO\\A\\", "c1")).unwrap_err();
        assert!(matches!(err, OntostarError::Collision { .. }));
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn applied_paths_must_hit_a_concept() {
        let mut catalog = Catalog::new();
        catalog.push(concept("\\DEMO\\Event\\", "c1")).unwrap();
        catalog
            .push(CatalogRow::modifier(
                "\\code\\".to_string(),
                "m1".to_string(),
                "code".to_string(),
                VisualAttr::Leaf,
                Catalog::applied_pattern("\\DEMO\\Event\\"),
            ))
            .unwrap();
        catalog.validate_applied_paths().unwrap();

        catalog
            .push(CatalogRow::modifier(
                "\\orphan\\".to_string(),
                "m2".to_string(),
                "orphan".to_string(),
                VisualAttr::Leaf,
                Catalog::applied_pattern("\\DEMO\\Gone\\"),
            ))
            .unwrap();
        assert!(matches!(
            catalog.validate_applied_paths(),
            Err(OntostarError::UnappliedModifier(_))
        ));
    }

    #[test]
    fn levels_follow_path_depth() {
        let row = concept("\\DEMO\\Event\\Diagnosis\\", "c1");
        assert_eq!(row.level, 2);
        let modifier = CatalogRow::modifier(
            "\\code\\system\\".to_string(),
            "m1".to_string(),
            "system".to_string(),
            VisualAttr::Leaf,
            "\\DEMO\\Event\\%".to_string(),
        );
        assert_eq!(modifier.level, 1);
    }

    #[test]
    fn visual_attr_codes_depend_on_table() {
        assert_eq!(VisualAttr::Folder.code(TableTarget::Concept), "FA");
        assert_eq!(VisualAttr::Leaf.code(TableTarget::Modifier), "RA");
        assert_eq!(VisualAttr::Hidden.code(TableTarget::Modifier), "RH");
    }
}
