//! ps_pipeline: deterministic pipeline surface
//! (load → validate → coefficients → registry → gross → resolve → C1/C2 →
//! common % → common area → special → total → permit % → land → redistribute
//! → property common % → rooms → aggregates → result / run record).
//!
//! The engine itself is I/O-free: it reads a `RecordSource` and hands final
//! values to a `MetricSink`. Hashing of artifacts goes through `ps_io`, the
//! arithmetic through `ps_algo`.
//!
//! Contract:
//! - Every metric stage writes through a `UnitOfWork`; a stage either
//!   commits all of its writes or none. A failed commit rolls the stage back,
//!   is reported as `Stage.CommitFailed` and halts the remaining metric
//!   stages. Earlier committed stages stay valid.
//! - `run` never fails; findings go to the diagnostic report.

#![forbid(unsafe_code)]

use serde::Serialize;
use tracing::{debug, error, info, info_span};

use ps_core::adapter::{MetricSink, RecordSource};
use ps_core::entities::{Metrics, RoomShare, SpatialUnit};
use ps_core::rounding::{host_area_to_m2, m2_to_host_area};
use ps_core::variables::Params;
use ps_io::loader::InputDigests;

pub mod aggregate;
pub mod build_result;
pub mod build_run_record;
pub mod calculate;
pub mod coefficients;
pub mod load;
pub mod redistribute;
pub mod registry;
pub mod resolve;
pub mod rooms;
pub mod special_common;
pub mod uow;
pub mod validate;

pub use aggregate::{GroupAggregate, PlotAggregate};
pub use build_result::ResultDoc;
pub use build_run_record::RunRecordDoc;
pub use redistribute::ScopeOutcome;
pub use registry::Registry;
pub use uow::{CommitError, Stage, StageRecord, UnitOfWork};
pub use validate::{Diagnostic, DiagnosticReport, EntityRef, Severity};

/// Engine identifiers echoed into the run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineMeta {
    pub vendor: String,
    pub name: String,
    pub version: String,
    pub build: String,
}

impl EngineMeta {
    pub fn current() -> Self {
        EngineMeta {
            vendor: "plotshare".into(),
            name: "ps_engine".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            build: option_env!("PLOTSHARE_BUILD").unwrap_or("dev").into(),
        }
    }
}

/// Failures outside the engine (sink write-back, artifact hashing).
#[derive(Debug)]
pub enum PipelineError {
    Io(String),
    Sink(String),
    Build(String),
}

impl core::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PipelineError::Io(m) => write!(f, "io: {m}"),
            PipelineError::Sink(m) => write!(f, "write-back: {m}"),
            PipelineError::Build(m) => write!(f, "build: {m}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ps_io::IoError> for PipelineError {
    fn from(e: ps_io::IoError) -> Self {
        match e {
            ps_io::IoError::Hash(m) => PipelineError::Build(format!("hash: {m}")),
            ps_io::IoError::Json { pointer, msg } => PipelineError::Build(format!("json {pointer}: {msg}")),
            other => PipelineError::Io(other.to_string()),
        }
    }
}

// ---------------------------- Stage context ----------------------------

/// Read-only view shared by every metric stage.
#[derive(Debug, Clone, Copy)]
pub struct StageCtx<'a> {
    pub params: &'a Params,
    pub units: &'a [SpatialUnit],
    pub registry: &'a Registry,
}

impl StageCtx<'_> {
    /// Own area in m² (2 decimals).
    pub fn area_m2(&self, i: usize) -> f64 {
        host_area_to_m2(self.units[i].raw_area, self.params.area_convert)
    }

    pub fn eligible(&self, i: usize) -> bool {
        registry::is_eligible(&self.units[i], self.params)
    }

    pub fn eligible_members(&self, members: &[usize]) -> Vec<usize> {
        members.iter().copied().filter(|&m| self.eligible(m)).collect()
    }

    pub fn in_land_group(&self, i: usize) -> bool {
        registry::in_land_group(&self.units[i], self.params)
    }

    pub fn in_land_scope(&self, i: usize) -> bool {
        registry::in_land_scope(&self.units[i], self.params)
    }
}

// ---------------------------- Run ----------------------------

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    /// Typed units, input order; `metrics` is parallel to it.
    pub units: Vec<SpatialUnit>,
    pub metrics: Vec<Metrics>,
    /// Records LOAD could not type.
    pub skipped: usize,
    pub registry: Registry,
    pub rooms: Vec<RoomShare>,
    pub aggregates: Vec<PlotAggregate>,
    pub report: DiagnosticReport,
    pub stages: Vec<StageRecord>,
    pub redistributions: Vec<ScopeOutcome>,
    pub halted_at: Option<Stage>,
}

impl RunOutput {
    /// Metrics of the first registered unit numbered `number`.
    pub fn metrics_of(&self, number: &str) -> Option<&Metrics> {
        self.registry
            .members()
            .find(|&i| self.units[i].number.as_str() == number)
            .map(|i| &self.metrics[i])
    }
}

struct Runner<'a> {
    ctx: StageCtx<'a>,
    uow: UnitOfWork,
    report: DiagnosticReport,
    halted_at: Option<Stage>,
}

impl Runner<'_> {
    fn attempt<F>(&mut self, stage: Stage, f: F) -> Result<(), CommitError>
    where
        F: FnOnce(&StageCtx<'_>, &mut UnitOfWork, &mut DiagnosticReport) -> Result<(), CommitError>,
    {
        self.uow.begin(stage)?;
        f(&self.ctx, &mut self.uow, &mut self.report)?;
        self.uow.commit()?;
        Ok(())
    }

    fn stage<F>(&mut self, stage: Stage, f: F)
    where
        F: FnOnce(&StageCtx<'_>, &mut UnitOfWork, &mut DiagnosticReport) -> Result<(), CommitError>,
    {
        if let Some(halted) = self.halted_at {
            debug!(stage = %stage, halted = %halted, "stage skipped");
            return;
        }
        let _s = info_span!("stage", stage = stage.name()).entered();
        if let Err(e) = self.attempt(stage, f) {
            self.uow.rollback();
            error!(stage = %stage, error = %e, "stage rolled back; halting");
            self.report.push(Diagnostic::error(stage, "Stage.CommitFailed", EntityRef::Root, e.to_string()));
            self.halted_at = Some(stage);
        }
    }
}

/// Run the whole engine over a source.
pub fn run<S: RecordSource + ?Sized>(source: &S, params: &Params) -> RunOutput {
    let mut report = DiagnosticReport::default();

    let mut data = {
        let _s = info_span!("stage", stage = Stage::Load.name()).entered();
        load::load(source, params, &mut report)
    };
    {
        let _s = info_span!("stage", stage = Stage::Validate.name()).entered();
        validate::validate(&data, params, &mut report);
    }
    {
        let _s = info_span!("stage", stage = Stage::Coefficients.name()).entered();
        coefficients::assign(&mut data.units, &params.coefficients, params.override_coefficients);
    }
    let registry = {
        let _s = info_span!("stage", stage = Stage::Registry.name()).entered();
        registry::build(&data, params, &mut report)
    };

    let ctx = StageCtx { params, units: &data.units, registry: &registry };
    let mut runner = Runner { ctx, uow: UnitOfWork::new(data.units.len()), report, halted_at: None };
    let mut redistributions: Vec<ScopeOutcome> = Vec::new();

    runner.stage(Stage::Gross, calculate::gross_area);
    runner.stage(Stage::Resolve, resolve::resolve_primary);
    runner.stage(Stage::PriceCoefficient, calculate::price_coefficient);
    runner.stage(Stage::CommonPercent, calculate::common_percent);
    runner.stage(Stage::CommonArea, calculate::common_area);
    runner.stage(Stage::SpecialCommonArea, special_common::special_common_area);
    runner.stage(Stage::TotalArea, calculate::total_area);
    runner.stage(Stage::BuildingPermit, calculate::building_permit);
    runner.stage(Stage::Land, calculate::land);
    runner.stage(
        Stage::Redistribute,
        |ctx, uow, report| redistribute::redistribute_all(ctx, uow, report, &mut redistributions),
    );
    runner.stage(Stage::PropertyCommonPercent, calculate::property_common_percent);

    let Runner { uow, mut report, halted_at, .. } = runner;
    let (metrics, stages) = uow.into_parts();

    let rooms = if halted_at.is_none() {
        let _s = info_span!("stage", stage = Stage::Rooms.name()).entered();
        rooms::allocate(&ctx, &metrics, &data.rooms, &mut report, &mut redistributions)
    } else {
        Vec::new()
    };
    let aggregates = {
        let _s = info_span!("stage", stage = Stage::Aggregates.name()).entered();
        aggregate::compute(&ctx, &metrics)
    };
    report.finish();

    info!(
        units = data.units.len(),
        rooms = rooms.len(),
        errors = report.errors(),
        warnings = report.warnings(),
        halted = halted_at.map_or("no", |s| s.name()),
        "run complete"
    );

    RunOutput {
        units: data.units,
        metrics,
        skipped: data.skipped.len(),
        registry,
        rooms,
        aggregates,
        report,
        stages,
        redistributions,
        halted_at,
    }
}

/// Structural checks only (LOAD, VALIDATE, REGISTRY); no metric is computed.
pub fn check<S: RecordSource + ?Sized>(source: &S, params: &Params) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();
    let data = load::load(source, params, &mut report);
    validate::validate(&data, params, &mut report);
    registry::build(&data, params, &mut report);
    report.finish();
    debug!(errors = report.errors(), warnings = report.warnings(), "check complete");
    report
}

// ---------------------------- Write-back ----------------------------

fn share_in_host_units(share: &RoomShare, conv: f64) -> RoomShare {
    let area = |v: Option<f64>| v.map(|m2| m2_to_host_area(m2, conv));
    RoomShare {
        common_area: area(share.common_area),
        special_common_area: area(share.special_common_area),
        common_total: area(share.common_total),
        total_area: area(share.total_area),
        land_area: area(share.land_area),
        ..share.clone()
    }
}

/// Hand every registered unit's metrics and every room share to `sink`,
/// areas converted to host units. Returns the number of values written.
pub fn write_back<K: MetricSink + ?Sized>(out: &RunOutput, params: &Params, sink: &mut K) -> Result<usize, PipelineError> {
    let conv = params.area_convert;
    let mut written = 0usize;
    for i in out.registry.members() {
        let u = &out.units[i];
        for field in ps_core::entities::MetricField::ALL {
            let v = out.metrics[i].get(field);
            let v = if field.is_area() { m2_to_host_area(v, conv) } else { v };
            sink.set_metric(u.element, field, v)
                .map_err(|e| PipelineError::Sink(format!("unit {}: {e}", u.number)))?;
            written += 1;
        }
    }
    for share in &out.rooms {
        sink.set_room_share(share.element, &share_in_host_units(share, conv))
            .map_err(|e| PipelineError::Sink(format!("room {}: {e}", share.room)))?;
        written += 1;
    }
    debug!(written, "write-back complete");
    Ok(written)
}

// ---------------------------- Artifacts ----------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Artifacts {
    pub result: ResultDoc,
    pub run_record: RunRecordDoc,
}

pub fn build_artifacts(
    out: &RunOutput,
    params: &Params,
    inputs: Option<&InputDigests>,
    engine: &EngineMeta,
) -> Result<Artifacts, PipelineError> {
    let result = build_result::build_result(out)?;
    let run_record = build_run_record::build_run_record(out, &result, params, inputs, engine)?;
    Ok(Artifacts { result, run_record })
}
