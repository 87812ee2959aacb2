//! crates/ps_pipeline/src/redistribute.rs
//! Surplus redistribution over the pipeline's scopes, per plot:
//! - building permit %: eligible units, target 100;
//! - land % + area: eligible and land-scope units, target 100 / plot area;
//! - per simple group (not land, not excluded): common % + area (target 100 /
//!   group common total) and special common area (target group special total).
//!
//! Buckets group units of equal gross area, largest first; ties keep
//! registry order. Totals are recomputed at the end so
//! `total = gross + common + special` still holds after corrections.

use serde::Serialize;
use tracing::debug;

use ps_algo::surplus::{
    redistribute, redistribute_linked, redistribute_nonzero, BucketArena, LinkedOutcome, LinkedTarget, Outcome,
    Resolution,
};
use ps_core::determinism::stable_sort_desc_by;
use ps_core::entities::MetricField;

use crate::calculate::{group_totals, total_of};
use crate::registry::PlotScope;
use crate::uow::{CommitError, Stage, UnitOfWork};
use crate::validate::{Diagnostic, DiagnosticReport, EntityRef};
use crate::StageCtx;

/// One line of the redistribution log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeOutcome {
    pub plot: String,
    pub group: Option<String>,
    /// Parent unit, for adjacent-room scopes.
    pub unit: Option<String>,
    pub metric: &'static str,
    pub members: usize,
    pub passes: u32,
    pub adjusted_steps: u32,
    pub residual: f64,
    pub converged: bool,
}

/// Units of one scope ordered for bucketing, with their bucket arena.
struct Scope {
    order: Vec<usize>,
    arena: BucketArena,
}

impl Scope {
    fn new(uow: &UnitOfWork, mut members: Vec<usize>) -> Self {
        stable_sort_desc_by(&mut members, |m| uow.get(m, MetricField::GrossArea));
        let positions: Vec<usize> = (0..members.len()).collect();
        let arena = BucketArena::group_by(&positions, |k| uow.get(members[k], MetricField::GrossArea).to_bits());
        Scope { order: members, arena }
    }

    fn read(&self, uow: &UnitOfWork, field: MetricField) -> Vec<f64> {
        self.order.iter().map(|&m| uow.get(m, field)).collect()
    }

    fn write(&self, uow: &mut UnitOfWork, field: MetricField, values: &[f64]) -> Result<(), CommitError> {
        for (&m, &v) in self.order.iter().zip(values) {
            uow.set(m, field, v)?;
        }
        Ok(())
    }
}

struct Logger<'r> {
    plot: &'r PlotScope,
    report: &'r mut DiagnosticReport,
    log: &'r mut Vec<ScopeOutcome>,
}

impl Logger<'_> {
    fn record(&mut self, ctx: &StageCtx<'_>, group: Option<String>, metric: &'static str, scope: &Scope, o: Outcome) {
        debug!(
            plot = %self.plot.name,
            group = group.as_deref().unwrap_or("-"),
            metric,
            passes = o.passes,
            steps = o.adjusted_steps,
            converged = o.converged,
            "redistributed"
        );
        if !o.converged {
            let rep = scope.order.first().map(|&m| &ctx.units[m]);
            let where_ = match &group {
                Some(g) => EntityRef::Group { plot: self.plot.name.to_string(), group: g.clone() },
                None => EntityRef::Plot { plot: self.plot.name.to_string() },
            };
            self.report.push(Diagnostic::warning(
                Stage::Redistribute,
                "Surplus.NotConverged",
                where_,
                format!(
                    "{metric}: residual {} after {} passes (first unit {})",
                    o.residual,
                    o.passes,
                    rep.map_or_else(|| "-".to_string(), |u| u.number.to_string())
                ),
            ));
        }
        self.log.push(ScopeOutcome {
            plot: self.plot.name.to_string(),
            group,
            unit: None,
            metric,
            members: scope.order.len(),
            passes: o.passes,
            adjusted_steps: o.adjusted_steps,
            residual: o.residual,
            converged: o.converged,
        });
    }

    fn record_linked(
        &mut self,
        ctx: &StageCtx<'_>,
        group: Option<String>,
        metrics: (&'static str, &'static str),
        scope: &Scope,
        o: LinkedOutcome,
    ) {
        self.record(ctx, group.clone(), metrics.0, scope, o.percent);
        self.record(ctx, group, metrics.1, scope, o.area);
    }
}

fn linked(
    uow: &mut UnitOfWork,
    scope: &Scope,
    fields: (MetricField, MetricField),
    target: LinkedTarget,
    max_passes: u32,
) -> Result<LinkedOutcome, CommitError> {
    let mut percents = scope.read(uow, fields.0);
    let mut areas = scope.read(uow, fields.1);
    let o = redistribute_linked(&mut percents, &mut areas, &scope.arena, target, max_passes);
    scope.write(uow, fields.0, &percents)?;
    scope.write(uow, fields.1, &areas)?;
    Ok(o)
}

pub fn redistribute_all(
    ctx: &StageCtx<'_>,
    uow: &mut UnitOfWork,
    report: &mut DiagnosticReport,
    log: &mut Vec<ScopeOutcome>,
) -> Result<(), CommitError> {
    let limits = ctx.params.pass_limits;
    for plot in &ctx.registry.plots {
        let all: Vec<usize> = plot.members().collect();
        let eligible = ctx.eligible_members(&all);
        let mut logger = Logger { plot, report: &mut *report, log: &mut *log };

        // Building permit %.
        if !eligible.is_empty() {
            let scope = Scope::new(uow, eligible.clone());
            let mut values = scope.read(uow, MetricField::BuildingPermitPercent);
            let o = redistribute(&mut values, &scope.arena, 100.0, Resolution::Percent, limits.percent);
            scope.write(uow, MetricField::BuildingPermitPercent, &values)?;
            logger.record(ctx, None, "building_permit_percent", &scope, o);
        }

        // Land % + area.
        if let Some(plot_area) = plot.area {
            let members: Vec<usize> =
                all.iter().copied().filter(|&m| ctx.eligible(m) || ctx.in_land_scope(m)).collect();
            if !members.is_empty() {
                let scope = Scope::new(uow, members);
                let target = LinkedTarget { percent: 100.0, basis: Resolution::Area.round(plot_area) };
                let o = linked(uow, &scope, (MetricField::LandPercent, MetricField::LandArea), target, limits.linked)?;
                logger.record_linked(ctx, None, ("land_percent", "land_area"), &scope, o);
            }
        }

        // Per group: common % + area, special common area.
        let totals = group_totals(ctx, plot);
        for (g, t) in plot.groups.iter().zip(&totals) {
            let Some(name) = g.key.as_simple() else { continue };
            if g.key.is_named(&ctx.params.land_group) || ctx.params.is_excluded_group(name.as_str()) {
                continue;
            }
            let members = ctx.eligible_members(&g.members);
            if members.is_empty() {
                continue;
            }
            let group = Some(g.key.to_string());
            let scope = Scope::new(uow, members);

            let target = LinkedTarget { percent: 100.0, basis: t.common };
            let o = linked(uow, &scope, (MetricField::CommonPercent, MetricField::CommonArea), target, limits.linked)?;
            logger.record_linked(ctx, group.clone(), ("common_percent", "common_area"), &scope, o);

            if t.special != 0.0 {
                let mut values = scope.read(uow, MetricField::SpecialCommonArea);
                let o = redistribute_nonzero(&mut values, &scope.arena, t.special, Resolution::Area, limits.special);
                scope.write(uow, MetricField::SpecialCommonArea, &values)?;
                logger.record(ctx, group, "special_common_area", &scope, o);
            }
        }

        for &m in &eligible {
            let total = total_of(uow, m);
            uow.set(m, MetricField::TotalArea, total)?;
        }
    }
    Ok(())
}
