//! Manifest-level error types.

use std::path::PathBuf;

use thiserror::Error;

/// A single duplicate-key offense found by the pre-parse scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
    pub line: usize,
    pub key: String,
}

/// Errors produced while loading or querying a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Step 1: the raw text re-declares a key within the same object scope.
    #[error("manifest contains duplicate keys: {0:?}")]
    DuplicateKeys(Vec<DuplicateKey>),

    #[error("failed to parse manifest JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Step 3: one or more names don't match `^[A-Za-z0-9_]+$`.
    #[error("manifest contains invalid names: {0:?}")]
    InvalidNames(Vec<String>),

    /// Step 4: the same name appears under more than one of
    /// tasks/workflows/jobs.
    #[error("manifest contains duplicate names across tasks/workflows/jobs: {0:?}")]
    DuplicateNames(Vec<String>),

    /// A step's `name` equals its `reference`.
    #[error("step '{step}' references itself (name == reference)")]
    SelfReferentialStep { step: String },

    #[error("no {kind} named '{name}' in the manifest")]
    NotFound { kind: &'static str, name: String },
}
