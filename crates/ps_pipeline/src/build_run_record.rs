//! BUILD_RUN_RECORD: provenance of one run.
//!
//! Echoes the engine identity, input digests, the params digest, the result
//! id and digest, the stage commit log and the redistribution log. The id is
//! `RUN:<sha256>` of the record without its id; no timestamp is recorded, so
//! identical inputs give an identical record.

use serde::Serialize;

use ps_core::variables::Params;
use ps_io::hasher;
use ps_io::loader::InputDigests;

use crate::build_result::ResultDoc;
use crate::redistribute::ScopeOutcome;
use crate::uow::{Stage, StageRecord};
use crate::{EngineMeta, PipelineError, RunOutput};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutputs {
    pub result_id: String,
    pub result_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub units: usize,
    pub in_scope: usize,
    pub missing: usize,
    pub rooms: usize,
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecordBody {
    pub engine: EngineMeta,
    pub inputs: Option<InputDigests>,
    pub params_sha256: String,
    pub outputs: RunOutputs,
    pub stages: Vec<StageRecord>,
    pub redistributions: Vec<ScopeOutcome>,
    pub halted_at: Option<Stage>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecordDoc {
    pub id: String,
    #[serde(flatten)]
    pub body: RunRecordBody,
}

pub fn build_run_record(
    out: &RunOutput,
    result: &ResultDoc,
    params: &Params,
    inputs: Option<&InputDigests>,
    engine: &EngineMeta,
) -> Result<RunRecordDoc, PipelineError> {
    let body = RunRecordBody {
        engine: engine.clone(),
        inputs: inputs.cloned(),
        params_sha256: hasher::sha256_canonical(params)?,
        outputs: RunOutputs {
            result_id: result.id.clone(),
            result_sha256: hasher::sha256_canonical(result)?,
        },
        stages: out.stages.clone(),
        redistributions: out.redistributions.clone(),
        halted_at: out.halted_at,
        summary: RunSummary {
            units: out.units.len() + out.skipped,
            in_scope: out.registry.members().count(),
            missing: out.registry.missing.len(),
            rooms: out.rooms.len(),
            errors: out.report.errors(),
            warnings: out.report.warnings(),
        },
    };
    let id = hasher::run_id_from_canonical(&body)?;
    Ok(RunRecordDoc { id, body })
}
