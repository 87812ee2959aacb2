//! BUILD_RESULT: the result document (`RES:<sha256>` over its canonical bytes
//! without the id).
//!
//! Units are listed in registry order, rooms by room number, diagnostics in
//! report order. Nothing here depends on wall-clock time or paths.

use serde::Serialize;

use ps_core::entities::{Category, ElementId, LevelRef, LocationClass, Metrics, RoomShare};
use ps_core::ids::{GroupKey, PlotName, PrimaryLink, UnitNumber};
use ps_io::hasher;

use crate::aggregate::PlotAggregate;
use crate::uow::Stage;
use crate::validate::Diagnostic;
use crate::{PipelineError, RunOutput};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRow {
    pub element: ElementId,
    pub number: UnitNumber,
    pub name: String,
    pub plot: PlotName,
    pub group: GroupKey,
    pub category: Category,
    pub location: LocationClass,
    pub entrance: String,
    pub level: Option<LevelRef>,
    pub primary: PrimaryLink,
    pub multiplier: Option<f64>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultBody {
    pub units: Vec<UnitRow>,
    pub rooms: Vec<RoomShare>,
    pub plots: Vec<PlotAggregate>,
    pub missing: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub halted_at: Option<Stage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultDoc {
    pub id: String,
    #[serde(flatten)]
    pub body: ResultBody,
}

pub fn build_result(out: &RunOutput) -> Result<ResultDoc, PipelineError> {
    let units = out
        .registry
        .members()
        .map(|i| {
            let u = &out.units[i];
            UnitRow {
                element: u.element,
                number: u.number.clone(),
                name: u.name.clone(),
                plot: u.plot.clone(),
                group: u.group.clone(),
                category: u.category,
                location: u.location,
                entrance: u.entrance.clone(),
                level: u.level.clone(),
                primary: u.primary_link.clone(),
                multiplier: u.multiplier,
                metrics: out.metrics[i],
            }
        })
        .collect();

    let body = ResultBody {
        units,
        rooms: out.rooms.clone(),
        plots: out.aggregates.clone(),
        missing: out.registry.missing.clone(),
        diagnostics: out.report.issues.clone(),
        halted_at: out.halted_at,
    };
    let id = hasher::res_id_from_canonical(&body)?;
    Ok(ResultDoc { id, body })
}
