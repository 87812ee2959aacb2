//! crates/ps_io/src/lib.rs
//! I/O crate: everything that touches files or bytes lives here.
//!
//! - `loader`: project.json → `Params`, units.json → raw records, input digests.
//! - `manifest`: optional manifest naming both inputs (offline paths only).
//! - `canonical_json` / `hasher`: canonical bytes, SHA-256, `RES:`/`RUN:` ids.
//! - `host`: JSON-backed host adapter (`RecordSource` + `MetricSink`).

#![forbid(unsafe_code)]

use thiserror::Error;

/// Unified error for ps_io.
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (open, create_dir_all, rename, fsync).
    #[error("io/path error: {0}")]
    Path(String),

    /// JSON serialization/deserialization errors with a JSON Pointer hint.
    #[error("json error at {pointer}: {msg}")]
    Json { pointer: String, msg: String },

    /// Hashing-related errors (digest shape, canonicalization).
    #[error("hash error: {0}")]
    Hash(String),

    /// Manifest shape, offline policy or digest mismatch.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Loaded configuration failed domain checks.
    #[error("invalid: {0}")]
    Invalid(String),
}

pub type IoResult<T> = Result<T, IoError>;

/* ---------------- From conversions (used by file modules) ---------------- */

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        // serde_json keeps line/column, not a pointer; report at root.
        IoError::Json {
            pointer: "/".to_string(),
            msg: e.to_string(),
        }
    }
}

impl From<manifest::ManifestError> for IoError {
    fn from(e: manifest::ManifestError) -> Self {
        IoError::Manifest(e.to_string())
    }
}

impl From<ps_core::CoreError> for IoError {
    fn from(e: ps_core::CoreError) -> Self {
        IoError::Invalid(e.to_string())
    }
}

/* ---------------- Public modules ---------------- */

pub mod canonical_json;
pub mod hasher;
pub mod host;
pub mod loader;
pub mod manifest;

/* ---------------- Public prelude ----------------
   Lightweight re-exports so downstream crates can do:
     use ps_io::prelude::*;
------------------------------------------------- */

pub mod prelude {
    pub use crate::{IoError, IoResult};

    pub use crate::canonical_json::{to_canonical_bytes, write_canonical_file};
    pub use crate::hasher::{res_id_from_canonical, run_id_from_canonical, sha256_canonical, sha256_hex};
    pub use crate::host::{HostError, JsonHost};
    pub use crate::loader::{load_from_manifest, load_from_paths, InputDigests, LoadedInputs};
}
