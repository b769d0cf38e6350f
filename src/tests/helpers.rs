//! Shared fixtures for compiler and walker testing: a small clinical-flavored
//! ontology with a terminology pair, a valueset, a sub-property chain and an
//! absorbed scalar, plus instance data conforming to it.

use crate::{config::PipelineConfig, graph::MemoryStore};

pub const ONTO: &str = "http://example.org/onto/";
pub const DATA: &str = "http://example.org/data/";
pub const ICD: &str = "http://term.example/icd/";

pub const RDFS_SUBCLASS: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
pub const RDFS_SUBPROPERTY: &str = "http://www.w3.org/2000/01/rdf-schema#subPropertyOf";
pub const RDFS_DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
pub const RDFS_RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn onto(name: &str) -> String {
    format!("{ONTO}{name}")
}

pub fn data(name: &str) -> String {
    format!("{DATA}{name}")
}

const DEMO_TOML: &str = r#"
ontology_name = "DEMO"
root_prefix = "\\DEMO\\"
project_namespace = "http://example.org/onto/"
root_entries = ["http://example.org/onto/Event"]
valueset_marker = "http://example.org/onto/Valueset"
terminology_namespaces = ["http://term.example/icd/"]

[[context_fields]]
field = "patient"
predicate = "http://example.org/onto/has-patient"
mandatory = true
aliased = true

[[context_fields]]
field = "start_date"
predicate = "http://example.org/onto/has-date"
overwrite = true
"#;

pub fn demo_config() -> PipelineConfig {
    PipelineConfig::from_toml_str(DEMO_TOML).expect("demo config parses")
}

/// Schema-level fixture:
///
/// ```text
/// Event
/// ├── Diagnosis   has-icd → icd:ChapterA | icd:ChapterB   (muted pair)
/// │               has-severity → Severity valueset {mild, severe}
/// └── LabResult   has-sample ⊑ has-related → Sample { has-volume: double }
/// Event.has-note: string (absorbed by both leaf concepts)
/// ```
pub fn ontology_store() -> MemoryStore {
    init_logging();
    let mut store = MemoryStore::new();

    store.insert_resource(&onto("Diagnosis"), RDFS_SUBCLASS, &onto("Event"));
    store.insert_resource(&onto("LabResult"), RDFS_SUBCLASS, &onto("Event"));
    store.insert_resource(&onto("Severity"), RDFS_SUBCLASS, &onto("Valueset"));

    store.insert_resource(&onto("has-note"), RDFS_DOMAIN, &onto("Event"));
    store.insert_resource(&onto("has-note"), RDFS_RANGE, XSD_STRING);

    store.insert_resource(&onto("has-icd"), RDFS_DOMAIN, &onto("Diagnosis"));
    store.insert_resource(&onto("has-icd"), RDFS_RANGE, &format!("{ICD}ChapterA"));
    store.insert_resource(&onto("has-icd"), RDFS_RANGE, &format!("{ICD}ChapterB"));

    store.insert_resource(&onto("has-severity"), RDFS_DOMAIN, &onto("Diagnosis"));
    store.insert_resource(&onto("has-severity"), RDFS_RANGE, &onto("Severity"));

    store.insert_resource(&onto("has-related"), RDFS_DOMAIN, &onto("LabResult"));
    store.insert_resource(&onto("has-related"), RDFS_RANGE, &onto("Sample"));
    store.insert_resource(&onto("has-sample"), RDFS_DOMAIN, &onto("LabResult"));
    store.insert_resource(&onto("has-sample"), RDFS_RANGE, &onto("Sample"));
    store.insert_resource(&onto("has-sample"), RDFS_SUBPROPERTY, &onto("has-related"));

    store.insert_resource(&onto("has-volume"), RDFS_DOMAIN, &onto("Sample"));
    store.insert_resource(&onto("has-volume"), RDFS_RANGE, XSD_DOUBLE);

    store.insert_resource(&onto("sev-mild"), crate::graph::RDF_TYPE, &onto("Severity"));
    store.insert_literal(&onto("sev-mild"), RDFS_LABEL, "mild", None);
    store.insert_resource(&onto("sev-severe"), crate::graph::RDF_TYPE, &onto("Severity"));
    store.insert_literal(&onto("sev-severe"), RDFS_LABEL, "severe", None);

    store
}

/// Ontology plus instance data: one complete diagnosis, one diagnosis missing
/// its mandatory patient, and one lab result with a nested sample.
pub fn demo_store() -> MemoryStore {
    let mut store = ontology_store();

    let d1 = data("d1");
    store.insert_resource(&d1, crate::graph::RDF_TYPE, &onto("Diagnosis"));
    store.insert_literal(&d1, &onto("has-patient"), "alice", None);
    store.insert_literal(&d1, &onto("has-date"), "2021-05-10", None);
    store.insert_literal(&d1, &onto("has-note"), "hello", None);
    store.insert_resource(&d1, &onto("has-severity"), &onto("sev-mild"));
    store.insert_resource(&d1, &onto("has-icd"), &format!("{ICD}C50"));

    // d2 never sets has-patient and must be skipped.
    let d2 = data("d2");
    store.insert_resource(&d2, crate::graph::RDF_TYPE, &onto("Diagnosis"));
    store.insert_literal(&d2, &onto("has-note"), "orphan", None);

    let l1 = data("l1");
    let s1 = data("s1");
    store.insert_resource(&l1, crate::graph::RDF_TYPE, &onto("LabResult"));
    store.insert_literal(&l1, &onto("has-patient"), "bob", None);
    store.insert_resource(&l1, &onto("has-sample"), &s1);
    store.insert_literal(&s1, &onto("has-volume"), "5.5", Some(XSD_DOUBLE));

    store
}
