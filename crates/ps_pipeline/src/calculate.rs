//! crates/ps_pipeline/src/calculate.rs
//! Metric calculators, one function per stage, run in this order:
//! gross → (resolve) → C1/C2 → common % → common area → (special) → total →
//! building permit % → land % and area → (redistribute) → property common %.
//!
//! Contract:
//! - Percentages are 3-decimal, areas 2-decimal, both half away from zero.
//! - A zero denominator never divides: the affected values stay 0 and a
//!   `Calc.ZeroBasis` warning names the scope.
//! - Only eligible individual units receive C1/C2 and the share metrics;
//!   land-scope units additionally receive land metrics.

use serde::Serialize;
use tracing::debug;

use ps_core::entities::{Category, MetricField};
use ps_core::rounding::{area_share, percent_of, round_area, round_pct};

use crate::registry::PlotScope;
use crate::uow::{CommitError, Stage, UnitOfWork};
use crate::validate::{Diagnostic, DiagnosticReport, EntityRef};
use crate::StageCtx;

// ----- Authoritative group totals -----

/// Common-area totals of one group (m²).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GroupTotals {
    /// CommonArea units without a primary link, plus any composite spread.
    pub common: f64,
    /// CommonArea units with a primary link.
    pub special: f64,
}

/// Totals for every group of `plot`, parallel to `plot.groups`.
///
/// A composite group ("A+B") spreads its own common total over its bases:
/// `remaining = plot common − Σ composite totals`,
/// `ratio = round3(base / remaining)`, `base += round3(composite × ratio)`,
/// applied composite by composite, base by base.
pub fn group_totals(ctx: &StageCtx<'_>, plot: &PlotScope) -> Vec<GroupTotals> {
    let mut totals: Vec<GroupTotals> = plot
        .groups
        .iter()
        .map(|g| {
            let mut t = GroupTotals::default();
            for &m in &g.members {
                let u = &ctx.units[m];
                if u.category != Category::CommonArea {
                    continue;
                }
                if u.is_subordinate() {
                    t.special += ctx.area_m2(m);
                } else {
                    t.common += ctx.area_m2(m);
                }
            }
            t
        })
        .collect();

    let plot_common: f64 = totals.iter().map(|t| t.common + t.special).sum();
    let composite_sum: f64 = plot
        .groups
        .iter()
        .zip(&totals)
        .filter(|(g, _)| g.key.is_composite())
        .map(|(_, t)| t.common)
        .sum();

    if composite_sum != 0.0 {
        let remaining = plot_common - composite_sum;
        for (gi, g) in plot.groups.iter().enumerate() {
            if !g.key.is_composite() {
                continue;
            }
            let composite = totals[gi].common;
            for base in g.key.bases() {
                let Some(bi) = plot.groups.iter().position(|b| b.key.is_named(base.as_str())) else {
                    debug!(plot = %plot.name, group = %g.key, base = %base, "composite base not present");
                    continue;
                };
                let ratio = if remaining == 0.0 { 0.0 } else { round_pct(totals[bi].common / remaining) };
                totals[bi].common += round_pct(composite * ratio);
            }
        }
    }

    for t in &mut totals {
        t.common = round_area(t.common);
        t.special = round_area(t.special);
    }
    totals
}

fn zero_basis(stage: Stage, where_: EntityRef, what: &str, report: &mut DiagnosticReport) {
    report.push(Diagnostic::warning(
        stage,
        "Calc.ZeroBasis",
        where_,
        format!("{what} is zero; shares left at 0"),
    ));
}

fn plot_ref(plot: &PlotScope) -> EntityRef {
    EntityRef::Plot { plot: plot.name.to_string() }
}

fn group_ref(plot: &PlotScope, gi: usize) -> EntityRef {
    EntityRef::Group { plot: plot.name.to_string(), group: plot.groups[gi].key.to_string() }
}

fn sum_field(uow: &UnitOfWork, members: &[usize], field: MetricField) -> f64 {
    members.iter().map(|&m| uow.get(m, field)).sum()
}

// ----- Stages -----

/// gross = round2(raw / AREA_CONVERT). Resolution adds subordinates next.
pub fn gross_area(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, _report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for i in ctx.registry.members() {
        uow.set(i, MetricField::GrossArea, ctx.area_m2(i))?;
    }
    Ok(())
}

/// C1/C2 = gross × multiplier, eligible units only.
pub fn price_coefficient(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, _report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for i in ctx.registry.members().filter(|&i| ctx.eligible(i)) {
        let multiplier = ctx.units[i].multiplier.unwrap_or(ctx.params.coefficients.standard);
        let c = uow.get(i, MetricField::GrossArea) * multiplier;
        uow.set(i, MetricField::PriceCoefficient, c)?;
    }
    Ok(())
}

/// Own C1/C2 over the group's Σ C1/C2.
pub fn common_percent(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for plot in &ctx.registry.plots {
        for (gi, g) in plot.groups.iter().enumerate() {
            let members = ctx.eligible_members(&g.members);
            if members.is_empty() {
                continue;
            }
            let sum = sum_field(uow, &members, MetricField::PriceCoefficient);
            if sum == 0.0 {
                zero_basis(Stage::CommonPercent, group_ref(plot, gi), "group C1/C2 sum", report);
            }
            for &m in &members {
                let pct = percent_of(uow.get(m, MetricField::PriceCoefficient), sum);
                uow.set(m, MetricField::CommonPercent, pct)?;
            }
        }
    }
    Ok(())
}

/// Share of the group's authoritative common total.
pub fn common_area(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, _report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for plot in &ctx.registry.plots {
        let totals = group_totals(ctx, plot);
        for (g, t) in plot.groups.iter().zip(&totals) {
            for m in ctx.eligible_members(&g.members) {
                let area = area_share(uow.get(m, MetricField::CommonPercent), t.common);
                uow.set(m, MetricField::CommonArea, area)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn total_of(uow: &UnitOfWork, i: usize) -> f64 {
    round_area(
        uow.get(i, MetricField::GrossArea)
            + uow.get(i, MetricField::CommonArea)
            + uow.get(i, MetricField::SpecialCommonArea),
    )
}

/// total = gross + common + special.
pub fn total_area(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, _report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for i in ctx.registry.members().filter(|&i| ctx.eligible(i)) {
        let total = total_of(uow, i);
        uow.set(i, MetricField::TotalArea, total)?;
    }
    Ok(())
}

/// Own C1/C2 over the plot's Σ C1/C2.
pub fn building_permit(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for plot in &ctx.registry.plots {
        let members = ctx.eligible_members(&plot.members().collect::<Vec<_>>());
        if members.is_empty() {
            continue;
        }
        let sum = sum_field(uow, &members, MetricField::PriceCoefficient);
        if sum == 0.0 {
            zero_basis(Stage::BuildingPermit, plot_ref(plot), "plot C1/C2 sum", report);
        }
        for &m in &members {
            let pct = percent_of(uow.get(m, MetricField::PriceCoefficient), sum);
            uow.set(m, MetricField::BuildingPermitPercent, pct)?;
        }
    }
    Ok(())
}

/// Land (RLP) percentage and area.
///
/// Land-scope units take `round3(100 × gross / plot area)` directly; the sum
/// of those is the land reduction. Eligible units share what is left:
/// `round3((C1C2 × 100 / Σ C1C2) × (100 − reduction) / 100)`.
pub fn land(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for plot in &ctx.registry.plots {
        let all: Vec<usize> = plot.members().collect();
        let eligible = ctx.eligible_members(&all);
        let land_units: Vec<usize> = all.iter().copied().filter(|&m| ctx.in_land_scope(m)).collect();
        if eligible.is_empty() && land_units.is_empty() {
            continue;
        }
        let Some(plot_area) = plot.area else {
            zero_basis(Stage::Land, plot_ref(plot), "registered plot area", report);
            continue;
        };

        let mut reduction = 0.0;
        for &m in &land_units {
            let pct = round_pct(100.0 * uow.get(m, MetricField::GrossArea) / plot_area);
            reduction += pct;
            uow.set(m, MetricField::LandPercent, pct)?;
        }

        let sum = sum_field(uow, &eligible, MetricField::PriceCoefficient);
        if sum == 0.0 && !eligible.is_empty() {
            zero_basis(Stage::Land, plot_ref(plot), "plot C1/C2 sum", report);
        }
        for &m in &eligible {
            let pct = if sum == 0.0 {
                0.0
            } else {
                let c = uow.get(m, MetricField::PriceCoefficient);
                round_pct((c * 100.0 / sum) * (100.0 - reduction) / 100.0)
            };
            uow.set(m, MetricField::LandPercent, pct)?;
        }

        for m in land_units.into_iter().chain(eligible) {
            let pct = uow.get(m, MetricField::LandPercent);
            if pct != 0.0 {
                uow.set(m, MetricField::LandArea, area_share(pct, plot_area))?;
            }
        }
    }
    Ok(())
}

/// Common area as a share of the unit's total, after redistribution.
pub fn property_common_percent(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, _report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for i in ctx.registry.members().filter(|&i| ctx.eligible(i)) {
        let pct = percent_of(uow.get(i, MetricField::CommonArea), uow.get(i, MetricField::TotalArea));
        uow.set(i, MetricField::PropertyCommonPercent, pct)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::Dataset;
    use crate::registry;
    use ps_core::entities::{LocationClass, SpatialUnit};
    use ps_core::rounding::AREA_CONVERT;
    use ps_core::variables::Params;

    fn unit(element: i64, group: &str, category: Category, link: &str, m2: f64) -> SpatialUnit {
        SpatialUnit {
            element,
            number: element.to_string().parse().unwrap(),
            name: "x".into(),
            plot: "P".parse().unwrap(),
            group: group.parse().unwrap(),
            category,
            location: LocationClass::AboveGround,
            entrance: "A".into(),
            level: None,
            raw_area: m2 * AREA_CONVERT,
            primary_link: link.parse().unwrap(),
            multiplier: Some(1.0),
        }
    }

    fn totals(units: Vec<SpatialUnit>) -> Vec<GroupTotals> {
        let params = Params::default();
        let data = Dataset { units, ..Dataset::default() };
        let mut report = DiagnosticReport::default();
        let reg = registry::build(&data, &params, &mut report);
        let ctx = StageCtx { params: &params, units: &data.units, registry: &reg };
        group_totals(&ctx, &reg.plots[0])
    }

    #[test]
    fn common_and_special_totals_per_group() {
        let t = totals(vec![
            unit(1, "A", Category::IndividualUnit, "", 50.0),
            unit(2, "A", Category::CommonArea, "", 10.0),
            unit(3, "A", Category::CommonArea, "1", 4.0),
            unit(4, "B", Category::CommonArea, "", 6.0),
        ]);
        assert_eq!(t[0], GroupTotals { common: 10.0, special: 4.0 });
        assert_eq!(t[1], GroupTotals { common: 6.0, special: 0.0 });
    }

    #[test]
    fn composite_group_spreads_over_its_bases() {
        // plot common = 30 + 10 + 10 = 50; remaining = 50 − 10 = 40
        // A: ratio 0.75 → +7.5; B: ratio 0.25 → +2.5
        let t = totals(vec![
            unit(1, "A", Category::CommonArea, "", 30.0),
            unit(2, "B", Category::CommonArea, "", 10.0),
            unit(3, "A+B", Category::CommonArea, "", 10.0),
        ]);
        assert_eq!(t[0].common, 37.5);
        assert_eq!(t[1].common, 12.5);
        assert_eq!(t[2].common, 10.0);
    }
}
