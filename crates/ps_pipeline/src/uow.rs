//! crates/ps_pipeline/src/uow.rs
//! Stage-scoped unit of work over the metric table.
//!
//! Contract:
//! - `begin(stage)` opens a working copy of the committed metrics; every
//!   `set` goes to the working copy only.
//! - `commit()` checks every staged value is finite, then swaps the working
//!   copy in. `rollback()` (or a failed commit) discards it, so the next
//!   stage only ever sees committed values.
//! - Every begin ends in exactly one log entry (committed or rolled back).

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use ps_core::entities::{MetricField, Metrics};

/// Pipeline stages in execution order (the derived `Ord` is that order).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Validate,
    Coefficients,
    Registry,
    Gross,
    Resolve,
    PriceCoefficient,
    CommonPercent,
    CommonArea,
    SpecialCommonArea,
    TotalArea,
    BuildingPermit,
    Land,
    Redistribute,
    PropertyCommonPercent,
    Rooms,
    Aggregates,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Validate => "validate",
            Stage::Coefficients => "coefficients",
            Stage::Registry => "registry",
            Stage::Gross => "gross",
            Stage::Resolve => "resolve",
            Stage::PriceCoefficient => "price_coefficient",
            Stage::CommonPercent => "common_percent",
            Stage::CommonArea => "common_area",
            Stage::SpecialCommonArea => "special_common_area",
            Stage::TotalArea => "total_area",
            Stage::BuildingPermit => "building_permit",
            Stage::Land => "land",
            Stage::Redistribute => "redistribute",
            Stage::PropertyCommonPercent => "property_common_percent",
            Stage::Rooms => "rooms",
            Stage::Aggregates => "aggregates",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommitError {
    #[error("stage {stage}: non-finite {field} staged for unit #{unit} ({value})")]
    NonFinite { stage: Stage, unit: usize, field: MetricField, value: f64 },
    #[error("unit index {unit} out of range (table has {len} rows)")]
    UnknownUnit { unit: usize, len: usize },
    #[error("no stage is open")]
    NoOpenStage,
    #[error("stage {0} is still open")]
    StageOpen(Stage),
}

/// One line of the stage commit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub committed: bool,
    pub writes: usize,
}

#[derive(Debug, Clone)]
struct Open {
    stage: Stage,
    working: Vec<Metrics>,
    writes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    committed: Vec<Metrics>,
    open: Option<Open>,
    log: Vec<StageRecord>,
}

impl UnitOfWork {
    /// A zeroed metric table for `len` units.
    pub fn new(len: usize) -> Self {
        Self { committed: vec![Metrics::default(); len], open: None, log: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn begin(&mut self, stage: Stage) -> Result<(), CommitError> {
        if let Some(open) = &self.open {
            return Err(CommitError::StageOpen(open.stage));
        }
        self.open = Some(Open { stage, working: self.committed.clone(), writes: 0 });
        Ok(())
    }

    /// Current value: staged if a stage is open, committed otherwise.
    /// Unknown indices read as 0.
    pub fn get(&self, unit: usize, field: MetricField) -> f64 {
        let rows = match &self.open {
            Some(open) => &open.working,
            None => &self.committed,
        };
        rows.get(unit).map_or(0.0, |m| m.get(field))
    }

    pub fn set(&mut self, unit: usize, field: MetricField, value: f64) -> Result<(), CommitError> {
        let len = self.committed.len();
        let open = self.open.as_mut().ok_or(CommitError::NoOpenStage)?;
        let row = open.working.get_mut(unit).ok_or(CommitError::UnknownUnit { unit, len })?;
        row.set(field, value);
        open.writes += 1;
        Ok(())
    }

    /// Validate and publish the staged writes. On error the stage stays open;
    /// the caller rolls it back.
    pub fn commit(&mut self) -> Result<StageRecord, CommitError> {
        let open = self.open.as_ref().ok_or(CommitError::NoOpenStage)?;
        for (unit, row) in open.working.iter().enumerate() {
            for field in MetricField::ALL {
                let value = row.get(field);
                if !value.is_finite() {
                    return Err(CommitError::NonFinite { stage: open.stage, unit, field, value });
                }
            }
        }
        let Some(open) = self.open.take() else {
            return Err(CommitError::NoOpenStage);
        };
        self.committed = open.working;
        let rec = StageRecord { stage: open.stage, committed: true, writes: open.writes };
        debug!(stage = %rec.stage, writes = rec.writes, "stage committed");
        self.log.push(rec);
        Ok(rec)
    }

    /// Discard the staged writes. No-op when nothing is open.
    pub fn rollback(&mut self) {
        if let Some(open) = self.open.take() {
            debug!(stage = %open.stage, writes = open.writes, "stage rolled back");
            self.log.push(StageRecord { stage: open.stage, committed: false, writes: open.writes });
        }
    }

    pub fn committed(&self) -> &[Metrics] {
        &self.committed
    }

    pub fn log(&self) -> &[StageRecord] {
        &self.log
    }

    pub fn into_parts(mut self) -> (Vec<Metrics>, Vec<StageRecord>) {
        self.rollback();
        (self.committed, self.log)
    }
}
