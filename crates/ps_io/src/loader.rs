//! Loader: read local JSON inputs (manifest → project → units) and return a
//! typed `LoadedInputs` for the pipeline. No network I/O.
//!
//! - project.json deserializes straight into `Params` (every knob defaulted)
//!   and is checked with `validate_domains`.
//! - units.json is `{ "units": [...], "rooms": [...] }` of raw host records;
//!   typing and classification happen in the pipeline, not here.
//! - Digests are computed over canonical JSON bytes of each input.

#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use ps_core::adapter::{RoomRecord, UnitRecord, VecSource};
use ps_core::variables::{self, Params};

use crate::{hasher, manifest, IoError, IoResult};

// ----------------------------- Wire-facing types -----------------------------

/// units.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnitsFile {
    pub units: Vec<UnitRecord>,
    pub rooms: Vec<RoomRecord>,
}

impl From<UnitsFile> for VecSource {
    fn from(f: UnitsFile) -> Self {
        VecSource { units: f.units, rooms: f.rooms }
    }
}

/// sha256 (canonical bytes) of the two inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDigests {
    pub units_sha256: String,
    pub project_sha256: String,
}

/// Loaded, validated inputs.
#[derive(Debug, Clone)]
pub struct LoadedInputs {
    pub params: Params,
    pub source: VecSource,
    pub digests: InputDigests,
}

// ----------------------------- Orchestration -----------------------------

/// Load from a manifest file (paths relative to the manifest's directory).
pub fn load_from_manifest(path: &Path) -> IoResult<LoadedInputs> {
    let resolved = manifest::load_and_resolve(path)?;
    load_from_paths(&resolved.units_path, &resolved.project_path)
}

/// Load units.json + project.json.
pub fn load_from_paths(units_path: &Path, project_path: &Path) -> IoResult<LoadedInputs> {
    let project_v = read_json_value(project_path)?;
    let units_v = read_json_value(units_path)?;

    let params = params_from_value(project_v.clone())?;
    let units = units_from_value(units_v.clone())?;

    let digests = InputDigests {
        units_sha256: hasher::sha256_canonical_value(&units_v)?,
        project_sha256: hasher::sha256_canonical_value(&project_v)?,
    };
    debug!(
        units = units.units.len(),
        rooms = units.rooms.len(),
        plots = params.plots.len(),
        "inputs loaded"
    );
    Ok(LoadedInputs { params, source: units.into(), digests })
}

// ----------------------------- Targeted loaders -----------------------------

pub fn load_params(path: &Path) -> IoResult<Params> {
    params_from_value(read_json_value(path)?)
}

pub fn load_units(path: &Path) -> IoResult<UnitsFile> {
    units_from_value(read_json_value(path)?)
}

fn params_from_value(v: Value) -> IoResult<Params> {
    let params: Params = serde_json::from_value(v).map_err(|e| IoError::Json {
        pointer: "/project".into(),
        msg: e.to_string(),
    })?;
    variables::validate_domains(&params)?;
    Ok(params)
}

fn units_from_value(v: Value) -> IoResult<UnitsFile> {
    serde_json::from_value(v).map_err(|e| IoError::Json {
        pointer: "/units".into(),
        msg: e.to_string(),
    })
}

/// Read a file and parse it as JSON.
pub fn read_json_value(path: &Path) -> IoResult<Value> {
    let bytes = fs::read(path).map_err(|e| IoError::Path(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), bytes = bytes.len(), "read");
    serde_json::from_slice(&bytes).map_err(|e| IoError::Json {
        pointer: "/".into(),
        msg: format!("{}: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn loads_minimal_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let project = write(dir.path(), "project.json", r#"{"plots":[{"label":"UPI 1","area":400.0}]}"#);
        let units = write(
            dir.path(),
            "units.json",
            r#"{"units":[{"element":7,"number":"1","name":"Flat","plot":"UPI 1","group":"A",
                "category":"ОБЩА ЧАСТ","location":"НАДЗЕМНА","entrance":"A","area":107.64}]}"#,
        );
        let loaded = load_from_paths(&units, &project).unwrap();
        assert_eq!(loaded.params.plots.len(), 1);
        assert_eq!(loaded.source.units.len(), 1);
        assert!(loaded.source.rooms.is_empty());
        assert_eq!(loaded.source.units[0].category.as_deref(), Some("ОБЩА ЧАСТ"));
        assert!(hasher::is_lower_hex_64(&loaded.digests.units_sha256));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_domains() {
        let dir = tempfile::tempdir().unwrap();
        let units = write(dir.path(), "units.json", r#"{"units":[],"extra":1}"#);
        assert!(matches!(load_units(&units), Err(IoError::Json { .. })));

        let project = write(dir.path(), "project.json", r#"{"area_convert":0}"#);
        assert!(matches!(load_params(&project), Err(IoError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_a_path_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_params(&dir.path().join("nope.json")), Err(IoError::Path(_))));
    }
}
