//! Primary-area resolver: subordinate IndividualUnits add their own area to
//! the gross area of the unit(s) they belong to.
//!
//! - Regular subordinates look for parents inside their own plot+group.
//! - Land-group subordinates look everywhere (land parents may sit in another
//!   group or plot).
//! - Self-references are skipped (validation reports them); unresolved
//!   parents are reported in one diagnostic per subordinate.

use ps_core::entities::{Category, MetricField};
use ps_core::rounding::round_area;

use crate::uow::{CommitError, Stage, UnitOfWork};
use crate::validate::{Diagnostic, DiagnosticReport, EntityRef};
use crate::StageCtx;

pub fn resolve_primary(ctx: &StageCtx<'_>, uow: &mut UnitOfWork, report: &mut DiagnosticReport) -> Result<(), CommitError> {
    for i in ctx.registry.members() {
        let u = &ctx.units[i];
        if !u.is_subordinate() || u.category != Category::IndividualUnit {
            continue;
        }
        let area = ctx.area_m2(i);
        let land = ctx.in_land_group(i);

        let mut missing: Vec<&str> = Vec::new();
        for parent in u.primary_link.parents().iter().filter(|p| **p != u.number) {
            let found = if land {
                ctx.registry.find_anywhere(ctx.units, parent)
            } else {
                ctx.registry.find_in_group(ctx.units, &u.plot, &u.group, parent)
            };
            if found.is_empty() {
                missing.push(parent.as_str());
                continue;
            }
            for j in found.into_iter().filter(|&j| j != i && ctx.units[j].category == Category::IndividualUnit) {
                let gross = round_area(uow.get(j, MetricField::GrossArea) + area);
                uow.set(j, MetricField::GrossArea, gross)?;
            }
        }
        if !missing.is_empty() {
            report.push(Diagnostic::warning(
                Stage::Resolve,
                "Resolve.ParentMissing",
                EntityRef::unit(u),
                format!(
                    "Area {} / {} is subordinate to nonexistent number {}",
                    u.number,
                    u.element,
                    missing.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculate;
    use crate::load::Dataset;
    use crate::registry;
    use ps_core::entities::{LocationClass, PlotRegistration, SpatialUnit};
    use ps_core::rounding::AREA_CONVERT;
    use ps_core::variables::Params;

    fn unit(element: i64, plot: &str, group: &str, link: &str, m2: f64) -> SpatialUnit {
        SpatialUnit {
            element,
            number: element.to_string().parse().unwrap(),
            name: "x".into(),
            plot: plot.parse().unwrap(),
            group: group.parse().unwrap(),
            category: Category::IndividualUnit,
            location: LocationClass::AboveGround,
            entrance: "A".into(),
            level: None,
            raw_area: m2 * AREA_CONVERT,
            primary_link: link.parse().unwrap(),
            multiplier: Some(1.0),
        }
    }

    fn resolve(units: Vec<SpatialUnit>) -> (Vec<f64>, DiagnosticReport) {
        let params = Params {
            plots: vec![
                PlotRegistration { label: "P1".parse().unwrap(), area: 500.0 },
                PlotRegistration { label: "P2".parse().unwrap(), area: 500.0 },
            ],
            ..Params::default()
        };
        let data = Dataset { units, ..Dataset::default() };
        let mut report = DiagnosticReport::default();
        let reg = registry::build(&data, &params, &mut report);
        let ctx = StageCtx { params: &params, units: &data.units, registry: &reg };

        let mut uow = UnitOfWork::new(data.units.len());
        uow.begin(Stage::Gross).unwrap();
        calculate::gross_area(&ctx, &mut uow, &mut report).unwrap();
        uow.commit().unwrap();
        uow.begin(Stage::Resolve).unwrap();
        resolve_primary(&ctx, &mut uow, &mut report).unwrap();
        uow.commit().unwrap();

        let gross = (0..data.units.len()).map(|i| uow.get(i, MetricField::GrossArea)).collect();
        (gross, report)
    }

    #[test]
    fn unresolved_parents_are_reported_once_per_subordinate() {
        let (gross, report) = resolve(vec![unit(1, "P1", "A", "", 40.0), unit(2, "P1", "A", "98+1+99", 10.0)]);
        assert_eq!(gross[0], 50.0);
        let missing: Vec<_> = report.with_code("Resolve.ParentMissing").collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].message.ends_with("nonexistent number 98, 99"), "{}", missing[0].message);
    }

    #[test]
    fn land_subordinate_finds_its_parent_in_another_plot() {
        let (gross, report) = resolve(vec![
            unit(1, "P1", "A", "", 40.0),
            unit(2, "P2", "ЗЕМЯ", "1", 20.0),
            unit(3, "P2", "B", "1", 5.0),
        ]);
        assert_eq!(gross[0], 60.0);
        // A regular subordinate only searches its own plot+group.
        assert_eq!(report.with_code("Resolve.ParentMissing").count(), 1);
    }
}
