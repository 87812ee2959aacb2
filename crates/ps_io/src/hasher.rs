//! crates/ps_io/src/hasher.rs
//!
//! Deterministic hashing and ID builders for canonical artifacts.
//!
//! - Canonical JSON hashing: UTF-8, **sorted object keys**, array order preserved.
//! - IDs derive from canonical bytes only: `RES:<hex>` (result), `RUN:<hex>` (run record).
//!   No timestamps enter an id, so identical inputs give identical ids.
//! - Hex digests are **lowercase**.
//!
//! Use `sha256_canonical(..)` for JSON values/structs and `sha256_hex(..)` /
//! `sha256_file(..)` for raw bytes.

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical_json::{to_canonical_bytes, to_canonical_json_bytes};
use crate::IoResult;

/* ---------------------------------- Helpers ---------------------------------- */

/// True for a lowercase 64-char hex string.
pub fn is_lower_hex_64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/* ------------------------------- Raw hashing ------------------------------- */

/// SHA-256 over raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 over a reader stream (raw, not canonicalized).
pub fn sha256_stream<R: Read>(reader: &mut R) -> IoResult<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 over a file's raw bytes.
pub fn sha256_file(path: &Path) -> IoResult<String> {
    let f = File::open(path)?;
    let mut r = BufReader::new(f);
    sha256_stream(&mut r)
}

/* ---------------------------- Canonical hashing ---------------------------- */

/// SHA-256 over canonical JSON bytes of any serializable value.
pub fn sha256_canonical<T: Serialize>(value: &T) -> IoResult<String> {
    Ok(sha256_hex(&to_canonical_bytes(value)?))
}

/// SHA-256 over an already-parsed JSON value.
pub fn sha256_canonical_value(v: &Value) -> IoResult<String> {
    Ok(sha256_hex(&to_canonical_json_bytes(v)?))
}

/* ---------------------------- Artifact ID builders ---------------------------- */

/// `RES:<hex>` for result.json.
pub fn res_id_from_canonical<T: Serialize>(value: &T) -> IoResult<String> {
    Ok(format!("RES:{}", sha256_canonical(value)?))
}

/// `RUN:<hex>` for run_record.json (hash of the record without its own id).
pub fn run_id_from_canonical<T: Serialize>(value: &T) -> IoResult<String> {
    Ok(format!("RUN:{}", sha256_canonical(value)?))
}
