// crates/ps_cli/src/args.rs
//
// Offline CLI argument surface.
// - No networked paths (reject any scheme:// like http/https/file)
// - Exactly one of: --manifest  XOR  (--units + --project)
// - Output: --out dir (created on demand)
// - --validate-only runs the structural checks and writes nothing

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use clap::Parser;

/// Parsed CLI arguments (raw).
#[derive(Debug, Parser, Clone)]
#[command(
    name = "plotshare",
    disable_help_subcommand = true,
    about = "Offline, deterministic apportionment of common and land shares"
)]
pub struct Args {
    /// Manifest JSON naming units.json and project.json (exclusive with --units/--project).
    #[arg(long, conflicts_with_all = ["units", "project"])]
    pub manifest: Option<PathBuf>,

    /// units.json path (raw host records).
    #[arg(long)]
    pub units: Option<PathBuf>,
    /// project.json path (plots, coefficients, conversion knobs).
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Output directory (default: current directory).
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Load and run the structural checks only; no artifacts are written.
    #[arg(long)]
    pub validate_only: bool,

    /// Treat any Error-severity diagnostic as a failed run.
    #[arg(long)]
    pub strict: bool,

    /// Only errors on stderr.
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Debug-level logging.
    #[arg(long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

/// Errors surfaced by argument validation.
#[derive(Debug)]
pub enum CliError {
    Missing(&'static str),
    NonLocalPath(String),
    NotFound(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use CliError::*;
        match self {
            Missing(s) => write!(f, "missing required flag: {s}"),
            NonLocalPath(p) => write!(f, "path must be local file (no scheme): {p}"),
            NotFound(p) => write!(f, "file not found: {p}"),
        }
    }
}
impl std::error::Error for CliError {}

/// Where the inputs come from, once validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Inputs {
    Manifest(PathBuf),
    Files { units: PathBuf, project: PathBuf },
}

impl Args {
    pub fn inputs(&self) -> Result<Inputs, CliError> {
        match (&self.manifest, &self.units, &self.project) {
            (Some(m), _, _) => Ok(Inputs::Manifest(m.clone())),
            (None, Some(u), Some(p)) => Ok(Inputs::Files { units: u.clone(), project: p.clone() }),
            (None, None, _) => Err(CliError::Missing("--units (or --manifest)")),
            (None, Some(_), None) => Err(CliError::Missing("--project")),
        }
    }

    /// Log filter directive implied by the verbosity flags.
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

/// Entry point used by main.rs
pub fn parse_and_validate() -> Result<Args, CliError> {
    validate(Args::parse())
}

pub fn validate(mut args: Args) -> Result<Args, CliError> {
    for p in iter_all_paths(&args) {
        ensure_local_path(p)?;
    }
    match args.inputs()? {
        Inputs::Manifest(m) => ensure_local_exists(&m, "--manifest")?,
        Inputs::Files { units, project } => {
            ensure_local_exists(&units, "--units")?;
            ensure_local_exists(&project, "--project")?;
        }
    }
    args.manifest = args.manifest.take().map(|p| normalize_path(&p));
    args.units = args.units.take().map(|p| normalize_path(&p));
    args.project = args.project.take().map(|p| normalize_path(&p));
    args.out = normalize_path(&args.out);
    Ok(args)
}

#[inline]
fn has_scheme(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.contains("://") || lower.starts_with("http:") || lower.starts_with("https:") || lower.starts_with("file:")
}

#[inline]
fn ensure_local_path(p: &Path) -> Result<(), CliError> {
    if let Some(s) = p.to_str() {
        if has_scheme(s) {
            return Err(CliError::NonLocalPath(s.to_string()));
        }
    }
    Ok(())
}

fn iter_all_paths(args: &Args) -> impl Iterator<Item = &Path> {
    [args.manifest.as_deref(), args.units.as_deref(), args.project.as_deref(), Some(args.out.as_path())]
        .into_iter()
        .flatten()
}

fn ensure_local_exists(p: &Path, label: &'static str) -> Result<(), CliError> {
    let meta = fs::metadata(p).map_err(|_| CliError::NotFound(format!("{label} {}", p.display())))?;
    if !meta.is_file() {
        return Err(CliError::NotFound(format!("{label} {}", p.display())));
    }
    Ok(())
}

/// Absolute path; falls back to CWD-relative when the path does not exist yet.
fn normalize_path(p: &Path) -> PathBuf {
    fs::canonicalize(p).unwrap_or_else(|_| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(p)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("plotshare").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn manifest_conflicts_with_explicit_files() {
        let r = Args::try_parse_from(["plotshare", "--manifest", "m.json", "--units", "u.json"]);
        assert!(r.is_err());
    }

    #[test]
    fn explicit_mode_needs_both_files() {
        assert!(matches!(parse(&["--units", "u.json"]).inputs(), Err(CliError::Missing("--project"))));
        assert!(matches!(parse(&[]).inputs(), Err(CliError::Missing(_))));
        assert_eq!(
            parse(&["--units", "u.json", "--project", "p.json"]).inputs().unwrap(),
            Inputs::Files { units: "u.json".into(), project: "p.json".into() }
        );
    }

    #[test]
    fn verbosity_maps_to_level() {
        assert_eq!(parse(&[]).default_log_level(), "warn");
        assert_eq!(parse(&["--quiet"]).default_log_level(), "error");
        assert_eq!(parse(&["--verbose"]).default_log_level(), "debug");
        assert!(Args::try_parse_from(["plotshare", "--quiet", "--verbose"]).is_err());
    }

    #[test]
    fn ensure_local_path_rejects_schemes() {
        assert!(ensure_local_path(Path::new("http://x")).is_err());
        assert!(ensure_local_path(Path::new("file://C:/x.json")).is_err());
        assert!(ensure_local_path(Path::new("/tmp/units.json")).is_ok());
    }

    #[test]
    fn missing_files_are_reported() {
        let r = validate(parse(&["--units", "/nope/u.json", "--project", "/nope/p.json"]));
        assert!(matches!(r, Err(CliError::NotFound(m)) if m.starts_with("--units")));
    }

    #[test]
    fn normalize_path_returns_absolute() {
        assert!(normalize_path(Path::new("does/not/exist.txt")).is_absolute());
    }
}
