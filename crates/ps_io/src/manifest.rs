// crates/ps_io/src/manifest.rs
//
// Manifest: one small JSON file naming the two inputs of a run.
// - Paths only (relative to the manifest's directory, or absolute).
// - Offline-only: any path with a scheme ("://", "http:", "https:") is rejected.
// - Optional sha256 digests (lowercase 64-hex) are verified over the
//   canonical JSON bytes of each input, so whitespace and key order do not matter.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canonical_json::to_canonical_json_bytes;
use crate::hasher::{is_lower_hex_64, sha256_hex};

/// External manifest accepted by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub units_path: String,
    pub project_path: String,
    #[serde(default)]
    pub inputs_sha256: Option<ManifestDigests>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestDigests {
    #[serde(default)]
    pub units_path: Option<String>,
    #[serde(default)]
    pub project_path: Option<String>,
}

/// Paths resolved against the manifest's directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedManifest {
    pub units_path: PathBuf,
    pub project_path: PathBuf,
    pub digests: Option<ManifestDigests>,
}

#[derive(Debug)]
pub enum ManifestError {
    Empty(&'static str),
    UrlPath(&'static str, String),
    Io(&'static str, String),
    NotAFile(&'static str, String),
    Parse(String),
    /// Bad hex format / shape (not a mismatch).
    DigestShape(&'static str, String),
    /// Provided digest doesn't match the computed canonical sha256.
    DigestMismatch(&'static str, String),
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ManifestError::*;
        match self {
            Empty(k) => write!(f, "field must not be empty: {}", k),
            UrlPath(k, v) => write!(f, "path must be offline (no scheme) for {}: {}", k, v),
            Io(k, v) => write!(f, "cannot access {}: {}", k, v),
            NotAFile(k, v) => write!(f, "path is not a file for {}: {}", k, v),
            Parse(v) => write!(f, "cannot parse manifest: {}", v),
            DigestShape(k, v) => write!(f, "invalid sha256 format for {}: {}", k, v),
            DigestMismatch(k, v) => write!(f, "sha256 mismatch for {}: {}", k, v),
        }
    }
}
impl std::error::Error for ManifestError {}

// ---------- helpers (pure) ----------

#[inline]
fn has_any_scheme(s: &str) -> bool {
    s.contains("://") || s.starts_with("http:") || s.starts_with("https:")
}

#[inline]
fn join_under(base: &Path, rel: &str) -> PathBuf {
    let p = Path::new(rel);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn offline_check(label: &'static str, path: &str) -> Result<(), ManifestError> {
    if path.trim().is_empty() {
        return Err(ManifestError::Empty(label));
    }
    if has_any_scheme(path) {
        return Err(ManifestError::UrlPath(label, path.to_string()));
    }
    Ok(())
}

fn must_exist_file(label: &'static str, p: &Path) -> Result<(), ManifestError> {
    let md = fs::metadata(p).map_err(|e| ManifestError::Io(label, format!("{} ({e})", p.display())))?;
    if !md.is_file() {
        return Err(ManifestError::NotAFile(label, p.display().to_string()));
    }
    Ok(())
}

// ---------- validation / resolution ----------

/// Shape and offline checks. No I/O.
pub fn validate_manifest(man: &Manifest) -> Result<(), ManifestError> {
    offline_check("units_path", &man.units_path)?;
    offline_check("project_path", &man.project_path)?;
    if let Some(d) = &man.inputs_sha256 {
        for (label, h) in [("units_path", &d.units_path), ("project_path", &d.project_path)] {
            if let Some(h) = h {
                if !is_lower_hex_64(h) {
                    return Err(ManifestError::DigestShape(label, h.clone()));
                }
            }
        }
    }
    Ok(())
}

/// Join paths under `base_dir` and check both inputs are existing files.
pub fn resolve_paths(base_dir: &Path, man: &Manifest) -> Result<ResolvedManifest, ManifestError> {
    let units = join_under(base_dir, &man.units_path);
    let project = join_under(base_dir, &man.project_path);
    must_exist_file("units_path", &units)?;
    must_exist_file("project_path", &project)?;
    Ok(ResolvedManifest {
        units_path: units,
        project_path: project,
        digests: man.inputs_sha256.clone(),
    })
}

/// Read + parse + validate a manifest file.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let bytes = fs::read(path).map_err(|e| ManifestError::Io("manifest", format!("{} ({e})", path.display())))?;
    let man: Manifest = serde_json::from_slice(&bytes).map_err(|e| ManifestError::Parse(e.to_string()))?;
    validate_manifest(&man)?;
    debug!(path = %path.display(), "manifest loaded");
    Ok(man)
}

/// Canonical-JSON sha256 of a file's content.
pub fn canonical_file_digest(p: &Path) -> Result<String, ManifestError> {
    let bytes = fs::read(p).map_err(|e| ManifestError::Io("read", format!("{} ({e})", p.display())))?;
    let v: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| ManifestError::Io("parse", format!("{} ({e})", p.display())))?;
    let canon = to_canonical_json_bytes(&v).map_err(|e| ManifestError::Io("canonicalize", e.to_string()))?;
    Ok(sha256_hex(&canon))
}

/// Verify any provided digests. `Ok(())` when none were given.
pub fn verify_digests(resolved: &ResolvedManifest) -> Result<(), ManifestError> {
    let Some(d) = &resolved.digests else { return Ok(()) };
    let checks = [
        ("units_path", &resolved.units_path, &d.units_path),
        ("project_path", &resolved.project_path, &d.project_path),
    ];
    for (label, path, expect) in checks {
        if let Some(expect) = expect {
            let got = canonical_file_digest(path)?;
            if &got != expect {
                return Err(ManifestError::DigestMismatch(label, format!("expected={} got={}", expect, got)));
            }
        }
    }
    Ok(())
}

/// Load → validate → resolve (relative to the manifest's directory) → verify.
pub fn load_and_resolve(path: &Path) -> Result<ResolvedManifest, ManifestError> {
    let man = load_manifest(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let resolved = resolve_paths(base, &man)?;
    verify_digests(&resolved)?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn man(units: &str, project: &str) -> Manifest {
        Manifest { units_path: units.into(), project_path: project.into(), inputs_sha256: None }
    }

    #[test]
    fn rejects_urls_and_empty_paths() {
        assert!(matches!(
            validate_manifest(&man("https://x/units.json", "p.json")),
            Err(ManifestError::UrlPath("units_path", _))
        ));
        assert!(matches!(validate_manifest(&man("u.json", " ")), Err(ManifestError::Empty("project_path"))));
    }

    #[test]
    fn rejects_bad_digest_shape() {
        let mut m = man("u.json", "p.json");
        m.inputs_sha256 = Some(ManifestDigests { units_path: Some("ABC".into()), project_path: None });
        assert!(matches!(validate_manifest(&m), Err(ManifestError::DigestShape("units_path", _))));
    }

    #[test]
    fn digests_are_over_canonical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("units.json"), "{ \"rooms\": [],\n  \"units\": [] }").unwrap();
        std::fs::write(dir.path().join("project.json"), "{}").unwrap();
        let good = sha256_hex(br#"{"rooms":[],"units":[]}"#);

        let manifest = serde_json::json!({
            "units_path": "units.json",
            "project_path": "project.json",
            "inputs_sha256": { "units_path": good }
        });
        let mpath = dir.path().join("manifest.json");
        std::fs::write(&mpath, manifest.to_string()).unwrap();
        let resolved = load_and_resolve(&mpath).unwrap();
        assert_eq!(resolved.units_path, dir.path().join("units.json"));

        let bad = serde_json::json!({
            "units_path": "units.json",
            "project_path": "project.json",
            "inputs_sha256": { "project_path": good }
        });
        std::fs::write(&mpath, bad.to_string()).unwrap();
        assert!(matches!(load_and_resolve(&mpath), Err(ManifestError::DigestMismatch("project_path", _))));
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolve_paths(dir.path(), &man("nope.json", "nope2.json"));
        assert!(matches!(r, Err(ManifestError::Io("units_path", _))));
    }
}
