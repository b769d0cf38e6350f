//! Ontology compiler: recursive concept and property discovery producing the
//! relational catalog.
//!
//! The traversal is depth-first from each configured root entry. Concepts
//! with subclasses become directory rows and recursion continues into the
//! subclasses; leaf concepts have their applicable properties expanded into
//! a modifier tree. Basecode chains re-root at the concept owning a modifier
//! tree, so a property declared on an abstract ancestor codes identically
//! under every concrete descendant that uses it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    basecode::{Basecoder, CodeChain},
    catalog::{Catalog, CatalogRow, ValueTypeMeta, VisualAttr},
    config::PipelineConfig,
    error::OntostarError,
    graph::{GraphNode, Iri, TripleStore},
    paths::PathResolver,
    policy::{FilterPolicy, Verdict},
};

/// Run counters reported after compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileSummary {
    pub concept_rows: usize,
    pub modifier_rows: usize,
    pub valueset_members: usize,
    pub absorbed_values: usize,
    pub omitted_properties: usize,
    pub muted_ranges: usize,
    pub dropped_nodes: usize,
}

pub struct OntologyCompiler<'a, S: TripleStore + ?Sized> {
    store: &'a S,
    config: &'a PipelineConfig,
    policy: FilterPolicy,
    coder: Basecoder,
    concept_paths: PathResolver,
    modifier_paths: PathResolver,
    summary: CompileSummary,
}

impl<'a, S: TripleStore + ?Sized> OntologyCompiler<'a, S> {
    pub fn new(store: &'a S, config: &'a PipelineConfig) -> Self {
        OntologyCompiler {
            store,
            config,
            policy: FilterPolicy::from_config(config),
            coder: config.basecoder(),
            concept_paths: PathResolver::new(&config.root_prefix),
            modifier_paths: PathResolver::modifier_root(),
            summary: CompileSummary::default(),
        }
    }

    /// Compile every configured root entry into one catalog.
    pub fn compile(mut self) -> Result<(Catalog, CompileSummary), OntostarError> {
        let mut catalog = Catalog::new();
        let root_code = self
            .coder
            .code(&CodeChain::root(Iri::new(&self.config.ontology_name)));
        catalog.push(CatalogRow::concept(
            self.concept_paths.root_prefix().to_string(),
            root_code,
            self.config.ontology_name.clone(),
            VisualAttr::Folder,
        ))?;

        for root in self.config.root_entries.clone() {
            self.compile_concept(&mut catalog, &root, &[], &CodeChain::default())?;
        }
        catalog.validate_applied_paths()?;

        self.summary.concept_rows = catalog.concept_rows().count();
        self.summary.modifier_rows = catalog.modifier_rows().count();
        info!(
            concepts = self.summary.concept_rows,
            modifiers = self.summary.modifier_rows,
            "Catalog compiled"
        );
        Ok((catalog, self.summary))
    }

    fn compile_concept(
        &mut self,
        catalog: &mut Catalog,
        concept: &Iri,
        ancestor_names: &[String],
        ancestor_chain: &CodeChain,
    ) -> Result<(), OntostarError> {
        if self.policy.is_blacklisted(concept) {
            self.summary.dropped_nodes += 1;
            return Ok(());
        }
        let name = self.short_name(concept);
        let mut names = ancestor_names.to_vec();
        names.push(name.clone());
        let chain = ancestor_chain.extended(concept.clone());
        let path = self.concept_paths.resolve(&names);
        let tooltip = self.comment_of(concept);

        if self.is_valueset_holder(concept) {
            catalog.push(
                CatalogRow::concept(
                    path.clone(),
                    self.coder.code(&chain),
                    name,
                    VisualAttr::Folder,
                )
                .with_tooltip(tooltip),
            )?;
            self.push_valueset_members(catalog, concept, &names, &chain, |path, code, name| {
                CatalogRow::concept(path, code, name, VisualAttr::Leaf)
            })?;
            return Ok(());
        }

        let subclasses = self.kept_subclasses(concept);
        if !subclasses.is_empty() {
            // Directory row only; modifier expansion happens at the leaves.
            catalog.push(
                CatalogRow::concept(
                    path.clone(),
                    self.coder.code(&chain),
                    name,
                    VisualAttr::Folder,
                )
                .with_tooltip(tooltip),
            )?;
            for subclass in subclasses {
                self.compile_concept(catalog, &subclass, &names, &chain)?;
            }
            return Ok(());
        }

        // Leaf concept: expand its modifier tree, re-rooting both the path
        // and the code chain at the concept itself.
        let applied = Catalog::applied_pattern(&path);
        let modifier_chain = CodeChain::root(concept.clone());
        let mut concept_meta: Option<ValueTypeMeta> = None;
        let mut modifier_rows = Vec::new();
        for property in self.most_specific_properties(concept) {
            modifier_rows.extend(self.expand_property(
                concept,
                &property,
                &[],
                &modifier_chain,
                &applied,
                &path,
                &mut concept_meta,
            )?);
        }

        catalog.push(
            CatalogRow::concept(path, self.coder.code(&chain), name, VisualAttr::Leaf)
                .with_tooltip(tooltip)
                .with_value_meta(concept_meta),
        )?;
        for row in modifier_rows {
            catalog.push(row)?;
        }
        Ok(())
    }

    /// Expand one property into its modifier row plus descendants. A
    /// scalar-ranged property produces no row of its own: its kind is
    /// absorbed into `parent_meta`, and a second absorption at the same
    /// parent is fatal.
    #[allow(clippy::too_many_arguments)]
    fn expand_property(
        &mut self,
        owner: &Iri,
        property: &Iri,
        ancestor_names: &[String],
        ancestor_chain: &CodeChain,
        applied: &str,
        parent_path: &str,
        parent_meta: &mut Option<ValueTypeMeta>,
    ) -> Result<Vec<CatalogRow>, OntostarError> {
        let ranges = self.ranges_of(property);

        if let Some(kind) = ranges
            .iter()
            .find_map(|range| self.config.scalar_kind_of_range(range))
        {
            if let Some(existing) = parent_meta {
                return Err(OntostarError::ValueTypeConflict {
                    path: parent_path.to_string(),
                    existing: existing.kind,
                    incoming: kind,
                    property: property.to_string(),
                });
            }
            *parent_meta = Some(ValueTypeMeta {
                kind,
                property: property.clone(),
            });
            self.summary.absorbed_values += 1;
            return Ok(Vec::new());
        }

        let muted = self.policy.muted_ranges(&ranges);
        let mut survivors = Vec::new();
        for range in &ranges {
            match self.policy.verdict(range, owner, &muted) {
                Verdict::Drop => {
                    self.summary.dropped_nodes += 1;
                }
                verdict => survivors.push((range.clone(), verdict)),
            }
        }
        if survivors.is_empty() {
            if !ranges.is_empty() {
                debug!("Property {property} omitted: every range dropped");
                self.summary.omitted_properties += 1;
            } else {
                warn!("Property {property} omitted: no declared range");
                self.summary.omitted_properties += 1;
            }
            return Ok(Vec::new());
        }

        let name = self.short_name(property);
        let mut names = ancestor_names.to_vec();
        names.push(name.clone());
        let chain = ancestor_chain.extended(property.clone());
        let path = self.modifier_paths.resolve(&names);

        let mut own_meta: Option<ValueTypeMeta> = None;
        let mut children = Vec::new();
        for (range, verdict) in survivors {
            match verdict {
                Verdict::Mute => {
                    self.summary.muted_ranges += 1;
                }
                Verdict::Expand if self.is_valueset_holder(&range) => {
                    let mut members = Vec::new();
                    self.collect_valueset_members(&range, &names, &chain, applied, &mut members);
                    children.extend(members);
                }
                Verdict::Expand if self.config.is_project(&range) => {
                    for sub_property in self.most_specific_properties(&range) {
                        children.extend(self.expand_property(
                            &range,
                            &sub_property,
                            &names,
                            &chain,
                            applied,
                            &path,
                            &mut own_meta,
                        )?);
                    }
                }
                Verdict::Expand => {
                    // Unmuted terminology range: expand its subclass tree.
                    children.extend(self.expand_terminology(&range, &names, &chain, applied));
                }
                Verdict::Drop => unreachable!("dropped ranges were filtered above"),
            }
        }

        let visual = if self.config.hidden_predicates.contains(property) {
            VisualAttr::Hidden
        } else if children.is_empty() {
            VisualAttr::Leaf
        } else {
            VisualAttr::Folder
        };
        let row = CatalogRow::modifier(
            path,
            self.coder.code(&chain),
            name,
            visual,
            applied.to_string(),
        )
        .with_tooltip(self.comment_of(property))
        .with_value_meta(own_meta);

        let mut rows = vec![row];
        rows.extend(children);
        Ok(rows)
    }

    /// Rows for an unmuted terminology node and its subclass tree. The
    /// chains extend through the terminology identifiers themselves, so the
    /// walker can rebuild the same codes by climbing an instance node's
    /// superclass lineage back to the declared range.
    fn expand_terminology(
        &mut self,
        node: &Iri,
        ancestor_names: &[String],
        ancestor_chain: &CodeChain,
        applied: &str,
    ) -> Vec<CatalogRow> {
        let name = self.short_name(node);
        let mut names = ancestor_names.to_vec();
        names.push(name.clone());
        let chain = ancestor_chain.extended(node.clone());
        let path = self.modifier_paths.resolve(&names);

        let mut children = Vec::new();
        for subclass in self
            .store
            .subjects_with_object(&self.config.predicates.subclass, node)
        {
            if self.policy.is_blacklisted(&subclass) {
                self.summary.dropped_nodes += 1;
                continue;
            }
            let grandchildren = self
                .store
                .subjects_with_object(&self.config.predicates.subclass, &subclass);
            if self.policy.drops(&subclass, &grandchildren, node) {
                self.summary.dropped_nodes += 1;
                continue;
            }
            children.extend(self.expand_terminology(&subclass, &names, &chain, applied));
        }

        let visual = if children.is_empty() {
            VisualAttr::Leaf
        } else {
            VisualAttr::Folder
        };
        let mut rows = vec![CatalogRow::modifier(
            path,
            self.coder.code(&chain),
            name,
            visual,
            applied.to_string(),
        )];
        rows.extend(children);
        rows
    }

    fn push_valueset_members<F>(
        &mut self,
        catalog: &mut Catalog,
        holder: &Iri,
        ancestor_names: &[String],
        ancestor_chain: &CodeChain,
        make: F,
    ) -> Result<(), OntostarError>
    where
        F: Fn(String, String, String) -> CatalogRow,
    {
        for member in self.store.subjects_of_type(holder) {
            let name = self.short_name(&member);
            let mut names = ancestor_names.to_vec();
            names.push(name.clone());
            let path = self.concept_paths.resolve(&names);
            let code = self.coder.code(&ancestor_chain.extended(member.clone()));
            catalog.push(make(path, code, name))?;
            self.summary.valueset_members += 1;
        }
        Ok(())
    }

    fn collect_valueset_members(
        &mut self,
        holder: &Iri,
        ancestor_names: &[String],
        ancestor_chain: &CodeChain,
        applied: &str,
        out: &mut Vec<CatalogRow>,
    ) {
        for member in self.store.subjects_of_type(holder) {
            let name = self.short_name(&member);
            let mut names = ancestor_names.to_vec();
            names.push(name.clone());
            let path = self.modifier_paths.resolve(&names);
            let code = self.coder.code(&ancestor_chain.extended(member.clone()));
            out.push(CatalogRow::modifier(
                path,
                code,
                name,
                VisualAttr::Leaf,
                applied.to_string(),
            ));
            self.summary.valueset_members += 1;
        }
    }

    /// Subclasses surviving the blacklist and drop rules.
    fn kept_subclasses(&mut self, concept: &Iri) -> Vec<Iri> {
        let subclasses = self
            .store
            .subjects_with_object(&self.config.predicates.subclass, concept);
        let mut kept = Vec::new();
        for subclass in subclasses {
            if self.policy.is_blacklisted(&subclass) {
                self.summary.dropped_nodes += 1;
                continue;
            }
            let grandchildren = self
                .store
                .subjects_with_object(&self.config.predicates.subclass, &subclass);
            if self.policy.drops(&subclass, &grandchildren, concept) {
                debug!("Dropping {subclass} under {concept}");
                self.summary.dropped_nodes += 1;
                continue;
            }
            kept.push(subclass);
        }
        kept
    }

    /// Properties applicable to a concept: those declared with the concept or
    /// any of its project-owned ancestors as domain, minus any property
    /// subsumed by a more specific sub-property in the same set.
    fn most_specific_properties(&self, concept: &Iri) -> Vec<Iri> {
        let mut candidates: Vec<Iri> = Vec::new();
        for class in self.superclass_closure(concept) {
            for property in self
                .store
                .subjects_with_object(&self.config.predicates.domain, &class)
            {
                if !candidates.contains(&property) && !self.policy.is_blacklisted(&property) {
                    candidates.push(property);
                }
            }
        }

        let mut subsumed = Vec::new();
        for candidate in &candidates {
            for ancestor in self.superproperty_closure(candidate) {
                if ancestor != *candidate && candidates.contains(&ancestor) {
                    subsumed.push(ancestor);
                }
            }
        }
        candidates
            .into_iter()
            .filter(|candidate| !subsumed.contains(candidate))
            .collect()
    }

    /// The concept plus its project-owned superclasses, nearest first. Stops
    /// at the valueset marker and at foreign classes.
    fn superclass_closure(&self, concept: &Iri) -> Vec<Iri> {
        let mut closure = vec![concept.clone()];
        let mut cursor = 0;
        while cursor < closure.len() {
            let current = closure[cursor].clone();
            cursor += 1;
            for object in self
                .store
                .objects_of(&current, &self.config.predicates.subclass)
            {
                let Some(parent) = object.as_resource() else {
                    continue;
                };
                if *parent == self.config.valueset_marker || !self.config.is_project(parent) {
                    continue;
                }
                if !closure.contains(parent) {
                    closure.push(parent.clone());
                }
            }
        }
        closure
    }

    fn superproperty_closure(&self, property: &Iri) -> Vec<Iri> {
        let mut closure = vec![property.clone()];
        let mut cursor = 0;
        while cursor < closure.len() {
            let current = closure[cursor].clone();
            cursor += 1;
            for object in self
                .store
                .objects_of(&current, &self.config.predicates.subproperty)
            {
                if let Some(parent) = object.as_resource() {
                    if !closure.contains(parent) {
                        closure.push(parent.clone());
                    }
                }
            }
        }
        closure
    }

    fn ranges_of(&self, property: &Iri) -> Vec<Iri> {
        self.store
            .objects_of(property, &self.config.predicates.range)
            .into_iter()
            .filter_map(|object| object.as_resource().cloned())
            .collect()
    }

    fn is_valueset_holder(&self, concept: &Iri) -> bool {
        self.store
            .objects_of(concept, &self.config.predicates.subclass)
            .iter()
            .any(|object| object.as_resource() == Some(&self.config.valueset_marker))
    }

    fn short_name(&self, iri: &Iri) -> String {
        match self.store.value_of(iri, &self.config.predicates.label) {
            Some(GraphNode::Literal(lit)) => lit.lexical,
            _ => iri.local_name().to_string(),
        }
    }

    fn comment_of(&self, iri: &Iri) -> Option<String> {
        match self.store.value_of(iri, &self.config.predicates.comment) {
            Some(GraphNode::Literal(lit)) => Some(lit.lexical),
            _ => None,
        }
    }
}
