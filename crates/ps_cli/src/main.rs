// crates/ps_cli/src/main.rs
//
// plotshare: load inputs → run the engine → write result.json,
// run_record.json and writeback.json into --out.
// Exit codes are stable for scripts; see `exitcodes`.

mod args;

mod exitcodes {
    pub const OK: i32 = 0;
    /// Bad flags, unreadable/invalid inputs, or (with --strict / --validate-only) Error diagnostics.
    pub const VALIDATION: i32 = 2;
    /// A calculator stage failed to commit; artifacts are still written.
    pub const HALTED: i32 = 3;
    pub const IO: i32 = 4;
}

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use args::{parse_and_validate as parse_cli, Args, Inputs};

use ps_io::host::JsonHost;
use ps_io::{canonical_json, loader};
use ps_pipeline::{build_artifacts, write_back, DiagnosticReport, EngineMeta, PipelineError, RunOutput};

/// Central error type for CLI → exit-code mapping.
#[derive(Debug)]
enum MainError {
    /// Input shape, manifest, domain checks, or diagnostics under --strict.
    Validation(String),
    /// Stage commit failure inside the engine.
    Halted(String),
    /// Read/write/path errors, sink write-back, artifact hashing.
    Io(String),
}

impl std::fmt::Display for MainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MainError::Validation(m) => write!(f, "validation: {m}"),
            MainError::Halted(m) => write!(f, "halted: {m}"),
            MainError::Io(m) => write!(f, "io: {m}"),
        }
    }
}

fn main() -> ExitCode {
    let args = match parse_cli() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("plotshare: error: {e}");
            return ExitCode::from(exitcodes::VALIDATION as u8);
        }
    };
    init_logging(&args);

    let outcome = if args.validate_only { validate_only(&args) } else { run_once(&args) };
    let rc = match outcome {
        Ok(()) => exitcodes::OK,
        Err(e) => {
            eprintln!("plotshare: {e}");
            map_error(&e)
        }
    };
    ExitCode::from(rc as u8)
}

/// stderr subscriber. --quiet/--verbose win over PLOTSHARE_LOG, which wins over RUST_LOG.
fn init_logging(args: &Args) {
    let level = args.default_log_level();
    let filter = if args.quiet || args.verbose {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_env("PLOTSHARE_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(level))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let installed = if args.log_json { builder.json().try_init() } else { builder.try_init() };
    if installed.is_err() {
        eprintln!("plotshare: logging already initialized");
    }
}

fn map_error(e: &MainError) -> i32 {
    use exitcodes::*;
    match e {
        MainError::Validation(_) => VALIDATION,
        MainError::Halted(_) => HALTED,
        MainError::Io(_) => IO,
    }
}

fn map_io_err(e: ps_io::IoError) -> MainError {
    use ps_io::IoError::*;
    match e {
        Json { pointer, msg } => MainError::Validation(format!("json {pointer}: {msg}")),
        Manifest(m) => MainError::Validation(format!("manifest: {m}")),
        Invalid(m) => MainError::Validation(format!("invalid: {m}")),
        Hash(m) => MainError::Io(format!("hash: {m}")),
        Path(m) => MainError::Io(format!("path: {m}")),
    }
}

fn map_pipeline_err(e: PipelineError) -> MainError {
    match e {
        PipelineError::Io(m) | PipelineError::Build(m) => MainError::Io(m),
        PipelineError::Sink(m) => MainError::Io(format!("write-back: {m}")),
    }
}

fn load(args: &Args) -> Result<loader::LoadedInputs, MainError> {
    let inputs = args.inputs().map_err(|e| MainError::Validation(e.to_string()))?;
    let loaded = match inputs {
        Inputs::Manifest(m) => loader::load_from_manifest(&m),
        Inputs::Files { units, project } => loader::load_from_paths(&units, &project),
    };
    loaded.map_err(map_io_err)
}

fn summary_line(report: &DiagnosticReport) -> String {
    format!("{} errors, {} warnings", report.errors(), report.warnings())
}

/// Structural checks only; nothing is written.
fn validate_only(args: &Args) -> Result<(), MainError> {
    let loaded = load(args)?;
    let report = ps_pipeline::check(&loaded.source, &loaded.params);
    if !args.quiet {
        eprintln!("validate-only: {}", summary_line(&report));
    }
    if report.pass {
        Ok(())
    } else {
        Err(MainError::Validation(format!("{} structural errors", report.errors())))
    }
}

fn run_once(args: &Args) -> Result<(), MainError> {
    let loaded = load(args)?;
    let engine = EngineMeta::current();
    info!(version = %engine.version, build = %engine.build, "plotshare starting");

    let out = ps_pipeline::run(&loaded.source, &loaded.params);
    let artifacts = build_artifacts(&out, &loaded.params, Some(&loaded.digests), &engine).map_err(map_pipeline_err)?;

    let mut host = JsonHost::new(loaded.source.clone());
    let written = write_back(&out, &loaded.params, &mut host).map_err(map_pipeline_err)?;
    debug!(written, "values handed to the host");

    fs::create_dir_all(&args.out).map_err(|e| MainError::Io(format!("mkdir {}: {e}", args.out.display())))?;
    write_artifact(&args.out, "result.json", &artifacts.result)?;
    write_artifact(&args.out, "run_record.json", &artifacts.run_record)?;
    write_artifact(&args.out, "writeback.json", &host.writeback())?;

    if !args.quiet {
        eprintln!("run: {} → {}", artifacts.result.id, args.out.display());
        eprintln!("run: {}", summary_line(&out.report));
    }
    verdict(&out, args.strict)
}

fn write_artifact<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), MainError> {
    canonical_json::write_canonical_file(&dir.join(name), value).map_err(|e| MainError::Io(format!("write {name}: {e}")))
}

/// Exit status for a finished run: halts first, then --strict diagnostics.
fn verdict(out: &RunOutput, strict: bool) -> Result<(), MainError> {
    if let Some(stage) = out.halted_at {
        return Err(MainError::Halted(format!("stage {stage} failed to commit")));
    }
    if strict && !out.report.pass {
        return Err(MainError::Validation(format!("{} error diagnostics (--strict)", out.report.errors())));
    }
    Ok(())
}
