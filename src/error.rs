use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ScalarKind;

/// Crate-wide error type.
///
/// Configuration defects and structural invariant violations abort a run;
/// data-quality problems never surface here; they are logged and counted in
/// the run summaries instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum OntostarError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No scalar kind mapped for datatype '{datatype}' reached through '{property}'")]
    ScalarKind { datatype: String, property: String },
    #[error("Catalog collision: path '{path}' and basecode '{basecode}' emitted twice")]
    Collision { path: String, basecode: String },
    #[error(
        "'{path}' already absorbed a {existing:?} value type; cannot absorb \
         {incoming:?} from '{property}'"
    )]
    ValueTypeConflict {
        path: String,
        existing: ScalarKind,
        incoming: ScalarKind,
        property: String,
    },
    #[error("Modifier applied path '{0}' does not resolve to a concept row")]
    UnappliedModifier(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Observation sink error: {0}")]
    Sink(String),
}

impl From<io::Error> for OntostarError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => OntostarError::NotFound(format!("{x}")),
            _ => OntostarError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<toml::de::Error> for OntostarError {
    fn from(src: toml::de::Error) -> OntostarError {
        OntostarError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for OntostarError {
    fn from(src: toml::ser::Error) -> OntostarError {
        OntostarError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<serde_json::Error> for OntostarError {
    fn from(src: serde_json::Error) -> OntostarError {
        OntostarError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}
