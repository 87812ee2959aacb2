//! AGGREGATES: per-plot and per-(plot, group) sums of the committed metrics.
//!
//! Areas are m², summed then rounded to 2 decimals. Percentage sums are the
//! achieved totals after redistribution (3 decimals), so a reader can check
//! them against 100 directly.

use serde::Serialize;

use ps_core::entities::{Category, LocationClass, Metrics};
use ps_core::ids::{GroupKey, PlotName};
use ps_core::rounding::{round_area, round_pct};

use crate::calculate::group_totals;
use crate::StageCtx;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAggregate {
    pub group: GroupKey,
    pub individual: f64,
    /// Authoritative common total (after composite spread).
    pub common: f64,
    pub common_special: f64,
    pub common_all: f64,
    pub building_permit_percent: f64,
    pub common_percent: f64,
    pub common_area: f64,
    pub land_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotAggregate {
    pub plot: PlotName,
    pub plot_area: Option<f64>,
    pub build: f64,
    pub total_build: f64,
    pub underground: f64,
    pub individual: f64,
    pub common: f64,
    pub common_special: f64,
    pub land: f64,
    pub groups: Vec<GroupAggregate>,
}

pub fn compute(ctx: &StageCtx<'_>, metrics: &[Metrics]) -> Vec<PlotAggregate> {
    let mut out = Vec::with_capacity(ctx.registry.plots.len());
    for plot in &ctx.registry.plots {
        let sum_area = |pred: &dyn Fn(usize) -> bool| round_area(plot.members().filter(|&m| pred(m)).map(|m| ctx.area_m2(m)).sum());
        let sum_gross = |pred: &dyn Fn(usize) -> bool| round_area(plot.members().filter(|&m| pred(m)).map(|m| metrics[m].gross_area).sum());

        let location = |m: usize| ctx.units[m].location;
        let common = |m: usize| ctx.units[m].category == Category::CommonArea;

        let totals = group_totals(ctx, plot);
        let groups = plot
            .groups
            .iter()
            .zip(&totals)
            .map(|(g, t)| {
                let eligible = ctx.eligible_members(&g.members);
                let sum = |f: fn(&Metrics) -> f64| eligible.iter().map(|&m| f(&metrics[m])).sum::<f64>();
                GroupAggregate {
                    group: g.key.clone(),
                    individual: round_area(sum(|m| m.gross_area)),
                    common: t.common,
                    common_special: t.special,
                    common_all: round_area(t.common + t.special),
                    building_permit_percent: round_pct(sum(|m| m.building_permit_percent)),
                    common_percent: round_pct(sum(|m| m.common_percent)),
                    common_area: round_area(sum(|m| m.common_area)),
                    land_percent: round_pct(sum(|m| m.land_percent)),
                }
            })
            .collect();

        out.push(PlotAggregate {
            plot: plot.name.clone(),
            plot_area: plot.area,
            build: sum_area(&|m| location(m) == LocationClass::GroundLevel),
            total_build: sum_area(&|m| location(m).is_built()),
            underground: sum_area(&|m| location(m).is_underground()),
            individual: sum_gross(&|m| ctx.eligible(m)),
            common: sum_area(&|m| common(m)),
            common_special: sum_area(&|m| common(m) && ctx.units[m].is_subordinate()),
            land: sum_gross(&|m| ctx.in_land_group(m)),
            groups,
        });
    }
    out
}
