//! crates/ps_pipeline/src/registry.rs
//! Unit registry: plots → groups → units, in first-appearance order.
//!
//! Contract:
//! - Units with zero raw area join the missing-data list, together with the
//!   records LOAD could not type; they stay out of every calculation scope.
//! - Each plot carries its registered area (matched by label); a plot with
//!   no registration gets `Registry.PlotUnregistered`.
//! - Classification helpers (land, excluded, eligible) live here so every
//!   stage answers those questions the same way.

use tracing::debug;

use ps_core::entities::{Category, SpatialUnit};
use ps_core::ids::{GroupKey, PlotName, UnitNumber};
use ps_core::rounding::host_area_to_m2;
use ps_core::variables::Params;

use crate::load::Dataset;
use crate::uow::Stage;
use crate::validate::{Diagnostic, DiagnosticReport, EntityRef};

#[derive(Debug, Clone, PartialEq)]
pub struct GroupScope {
    pub key: GroupKey,
    /// Unit indices, input order.
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotScope {
    pub name: PlotName,
    /// Registered area (m²), if a registration matches.
    pub area: Option<f64>,
    pub groups: Vec<GroupScope>,
}

impl PlotScope {
    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        self.groups.iter().flat_map(|g| g.members.iter().copied())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    pub plots: Vec<PlotScope>,
    /// Missing-data records, `"{id} {number} {name} {area_m2}"`.
    pub missing: Vec<String>,
}

impl Registry {
    /// Every registered unit, plot by plot, group by group.
    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        self.plots.iter().flat_map(|p| p.members())
    }

    pub fn contains(&self, unit: usize) -> bool {
        self.members().any(|m| m == unit)
    }

    pub fn group(&self, plot: &PlotName, key: &GroupKey) -> Option<&GroupScope> {
        self.plots
            .iter()
            .find(|p| &p.name == plot)
            .and_then(|p| p.groups.iter().find(|g| &g.key == key))
    }

    /// Units numbered `number` inside one plot+group.
    pub fn find_in_group(&self, units: &[SpatialUnit], plot: &PlotName, key: &GroupKey, number: &UnitNumber) -> Vec<usize> {
        self.group(plot, key)
            .map(|g| g.members.iter().copied().filter(|&m| units[m].number == *number).collect())
            .unwrap_or_default()
    }

    /// Units numbered `number` anywhere in the registry.
    pub fn find_anywhere(&self, units: &[SpatialUnit], number: &UnitNumber) -> Vec<usize> {
        self.members().filter(|&m| units[m].number == *number).collect()
    }
}

pub fn build(data: &Dataset, params: &Params, report: &mut DiagnosticReport) -> Registry {
    let mut reg = Registry {
        plots: Vec::new(),
        missing: data.skipped.iter().map(|s| s.missing_text()).collect(),
    };

    for (i, u) in data.units.iter().enumerate() {
        if u.raw_area == 0.0 {
            reg.missing.push(format!(
                "{} {} {} {}",
                u.element,
                u.number,
                u.name,
                host_area_to_m2(u.raw_area, params.area_convert)
            ));
            continue;
        }
        let plot_idx = match reg.plots.iter().position(|p| p.name == u.plot) {
            Some(p) => p,
            None => {
                reg.plots.push(PlotScope {
                    name: u.plot.clone(),
                    area: params.plot_area(u.plot.as_str()),
                    groups: Vec::new(),
                });
                reg.plots.len() - 1
            }
        };
        let plot = &mut reg.plots[plot_idx];
        match plot.groups.iter_mut().find(|g| g.key == u.group) {
            Some(g) => g.members.push(i),
            None => plot.groups.push(GroupScope { key: u.group.clone(), members: vec![i] }),
        }
    }

    for p in reg.plots.iter().filter(|p| p.area.is_none()) {
        report.push(Diagnostic::warning(
            Stage::Registry,
            "Registry.PlotUnregistered",
            EntityRef::Plot { plot: p.name.to_string() },
            format!("plot {} matches none of the registered plot areas; land metrics stay 0", p.name),
        ));
    }

    debug!(plots = reg.plots.len(), missing = reg.missing.len(), "registry built");
    reg
}

// ----- Classification -----

pub fn in_land_group(u: &SpatialUnit, params: &Params) -> bool {
    u.group.is_named(&params.land_group)
}

pub fn in_excluded_group(u: &SpatialUnit, params: &Params) -> bool {
    u.group.as_simple().is_some_and(|g| params.is_excluded_group(g.as_str()))
}

/// IndividualUnit, no primary link, simple group that is neither the land
/// group nor an excluded group.
pub fn is_eligible(u: &SpatialUnit, params: &Params) -> bool {
    u.category == Category::IndividualUnit
        && !u.is_subordinate()
        && !u.group.is_composite()
        && !in_land_group(u, params)
        && !in_excluded_group(u, params)
}

/// Land-group unit that takes a direct share of the plot area.
pub fn in_land_scope(u: &SpatialUnit, params: &Params) -> bool {
    in_land_group(u, params)
        && !matches!(u.category, Category::CommonArea | Category::ExcludedFromCommon)
        && !(u.category == Category::IndividualUnit && u.is_subordinate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::entities::{LocationClass, PlotRegistration};
    use ps_core::ids::PrimaryLink;

    fn unit(element: i64, number: &str, plot: &str, group: &str, area: f64) -> SpatialUnit {
        SpatialUnit {
            element,
            number: number.parse().unwrap(),
            name: "Flat".into(),
            plot: plot.parse().unwrap(),
            group: group.parse().unwrap(),
            category: Category::IndividualUnit,
            location: LocationClass::AboveGround,
            entrance: "A".into(),
            level: None,
            raw_area: area,
            primary_link: PrimaryLink::default(),
            multiplier: None,
        }
    }

    #[test]
    fn groups_follow_first_appearance() {
        let data = Dataset {
            units: vec![
                unit(1, "1", "P2", "B", 10.0),
                unit(2, "2", "P1", "A", 10.0),
                unit(3, "3", "P2", "A", 10.0),
                unit(4, "4", "P2", "B", 0.0),
                unit(5, "5", "P2", "B", 10.0),
            ],
            ..Dataset::default()
        };
        let params = Params {
            plots: vec![PlotRegistration { label: "p1".parse().unwrap(), area: 300.0 }],
            ..Params::default()
        };
        let mut report = DiagnosticReport::default();
        let reg = build(&data, &params, &mut report);

        let names: Vec<_> = reg.plots.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["P2", "P1"]);
        assert_eq!(reg.plots[0].groups[0].members, vec![0, 4]);
        assert_eq!(reg.plots[0].groups[1].members, vec![2]);
        assert_eq!(reg.plots[1].area, Some(300.0));
        assert_eq!(reg.missing, vec!["4 4 Flat 0".to_string()]);
        assert!(!reg.contains(3));
        assert_eq!(report.with_code("Registry.PlotUnregistered").count(), 1);
        assert_eq!(reg.find_anywhere(&data.units, &"3".parse().unwrap()), vec![2]);
    }

    #[test]
    fn eligibility_rules() {
        let params = Params::default();
        assert!(is_eligible(&unit(1, "1", "P", "A", 1.0), &params));
        assert!(!is_eligible(&unit(1, "1", "P", "A+B", 1.0), &params));
        assert!(!is_eligible(&unit(1, "1", "P", "земя", 1.0), &params));
        assert!(!is_eligible(&unit(1, "1", "P", "ТРАФ", 1.0), &params));

        let mut sub = unit(2, "2", "P", "ЗЕМЯ", 1.0);
        sub.primary_link = "1".parse().unwrap();
        assert!(!is_eligible(&sub, &params));
        assert!(!in_land_scope(&sub, &params));
        sub.category = Category::NotApplicable;
        assert!(in_land_scope(&sub, &params));
    }
}
