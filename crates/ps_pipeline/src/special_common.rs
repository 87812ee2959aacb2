//! Special common area: a CommonArea unit linked to owning units is split
//! among those owners by their C1/C2 share.
//!
//! Every registered unit's special area is reset to 0 first, so a rerun
//! never accumulates on top of a previous one. Parents are looked up in the
//! CommonArea unit's own plot+group only.

use ps_algo::split::{proportional_split, SplitError};
use ps_core::entities::{Category, MetricField};
use ps_core::rounding::round_area;

use crate::uow::{CommitError, Stage, UnitOfWork};
use crate::validate::{Diagnostic, DiagnosticReport, EntityRef};
use crate::StageCtx;

pub fn special_common_area(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for i in ctx.registry.members() {
        uow.set(i, MetricField::SpecialCommonArea, 0.0)?;
    }

    for i in ctx.registry.members() {
        let u = &ctx.units[i];
        if u.category != Category::CommonArea || !u.is_subordinate() {
            continue;
        }

        let mut parents: Vec<usize> = Vec::new();
        for p in u.primary_link.parents().iter().filter(|p| **p != u.number) {
            let found = ctx.registry.find_in_group(ctx.units, &u.plot, &u.group, p);
            if found.is_empty() {
                report.push(Diagnostic::warning(
                    Stage::SpecialCommonArea,
                    "Special.ParentMissing",
                    EntityRef::unit(u),
                    format!("common area {} / {} names missing owner {}", u.number, u.element, p),
                ));
            }
            for j in found {
                if j != i && !parents.contains(&j) {
                    parents.push(j);
                }
            }
        }
        if parents.is_empty() {
            continue;
        }

        let weights: Vec<f64> = parents.iter().map(|&j| uow.get(j, MetricField::PriceCoefficient)).collect();
        match proportional_split(&weights, ctx.area_m2(i)) {
            Ok(shares) => {
                for (&j, share) in parents.iter().zip(shares) {
                    let v = round_area(uow.get(j, MetricField::SpecialCommonArea) + share.area);
                    uow.set(j, MetricField::SpecialCommonArea, v)?;
                }
            }
            Err(e @ (SplitError::ZeroBasis | SplitError::NonFinite)) => {
                report.push(Diagnostic::warning(
                    Stage::SpecialCommonArea,
                    "Calc.ZeroBasis",
                    EntityRef::unit(u),
                    format!("common area {} not allocated: owners' {e}", u.number),
                ));
            }
        }
    }
    Ok(())
}
