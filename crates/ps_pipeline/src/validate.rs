//! crates/ps_pipeline/src/validate.rs
//! Diagnostics model and structural validation of the loaded dataset.
//!
//! Nothing here is fatal: every finding becomes a `Diagnostic` and the run
//! continues. The report is sorted stably (stage, code, entity, message) so
//! two runs over the same input produce byte-identical diagnostics.

use core::cmp::Ordering;
use core::fmt;

use serde::Serialize;
use tracing::warn;

use ps_core::entities::{Category, ElementId, LocationClass, SpatialUnit};
use ps_core::ids::UnitNumber;
use ps_core::variables::Params;

use crate::load::Dataset;
use crate::registry;
use crate::uow::Stage;

/// Issue severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Where the issue occurred (kept small & deterministic).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRef {
    Root,
    Param { name: &'static str },
    Plot { plot: String },
    Group { plot: String, group: String },
    Unit { element: ElementId, number: String },
    Room { element: ElementId, number: String },
}

impl EntityRef {
    pub fn unit(u: &SpatialUnit) -> Self {
        EntityRef::Unit { element: u.element, number: u.number.to_string() }
    }

    pub fn group(u: &SpatialUnit) -> Self {
        EntityRef::Group { plot: u.plot.to_string(), group: u.group.to_string() }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Root => f.write_str("root"),
            EntityRef::Param { name } => write!(f, "param {name}"),
            EntityRef::Plot { plot } => write!(f, "plot {plot}"),
            EntityRef::Group { plot, group } => write!(f, "plot {plot} / group {group}"),
            EntityRef::Unit { element, number } => write!(f, "unit {number} ({element})"),
            EntityRef::Room { element, number } => write!(f, "room {number} ({element})"),
        }
    }
}

/// One finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    #[serde(rename = "where")]
    pub where_: EntityRef,
}

impl Diagnostic {
    pub fn error(stage: Stage, code: &'static str, where_: EntityRef, message: impl Into<String>) -> Self {
        Diagnostic { stage, severity: Severity::Error, code, message: message.into(), where_ }
    }

    pub fn warning(stage: Stage, code: &'static str, where_: EntityRef, message: impl Into<String>) -> Self {
        Diagnostic { stage, severity: Severity::Warning, code, message: message.into(), where_ }
    }
}

/// Deterministic report: pass = (no Error); ordering is stable once finished.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub pass: bool,
    pub issues: Vec<Diagnostic>,
}

impl DiagnosticReport {
    pub fn push(&mut self, d: Diagnostic) {
        warn!(stage = %d.stage, code = d.code, at = %d.where_, "{}", d.message);
        self.issues.push(d);
    }

    /// Sort and settle `pass`.
    pub fn finish(&mut self) {
        sort_issues_stably(&mut self.issues);
        self.pass = !self.issues.iter().any(|i| i.severity == Severity::Error);
    }

    pub fn errors(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn warnings(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }

    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.issues.iter().filter(move |i| i.code == code)
    }
}

fn sort_issues_stably(issues: &mut [Diagnostic]) {
    issues.sort_by(|a, b| match a.stage.cmp(&b.stage) {
        Ordering::Equal => match a.code.cmp(b.code) {
            Ordering::Equal => match a.where_.cmp(&b.where_) {
                Ordering::Equal => a.message.cmp(&b.message),
                o => o,
            },
            o => o,
        },
        o => o,
    });
}

// ------------------------------------------------------------------------------------------------
// Structural checks
// ------------------------------------------------------------------------------------------------

/// Run every unit-level check over the loaded units.
pub fn validate(data: &Dataset, params: &Params, report: &mut DiagnosticReport) {
    let units = &data.units;
    for (i, u) in units.iter().enumerate() {
        check_category(u, params, report);
        check_plot(u, params, report);
        check_duplicate(units, i, report);
        check_links(units, u, report);
    }
}

fn check_category(u: &SpatialUnit, params: &Params, report: &mut DiagnosticReport) {
    if u.category != Category::NotApplicable {
        return;
    }
    if !registry::in_land_group(u, params) && !registry::in_excluded_group(u, params) {
        report.push(Diagnostic::error(
            Stage::Validate,
            "Unit.CategoryGroup",
            EntityRef::unit(u),
            format!("unit {} is not applicable but sits in group {}", u.number, u.group),
        ));
    }
    if u.location != LocationClass::NotApplicable {
        report.push(Diagnostic::error(
            Stage::Validate,
            "Unit.CategoryLocation",
            EntityRef::unit(u),
            format!("unit {} is not applicable but located {}", u.number, u.location),
        ));
    }
}

fn check_plot(u: &SpatialUnit, params: &Params, report: &mut DiagnosticReport) {
    if params.plot_area(u.plot.as_str()).is_none() {
        report.push(Diagnostic::warning(
            Stage::Validate,
            "Unit.PlotUnknown",
            EntityRef::unit(u),
            format!("plot {} of unit {} has no registered area", u.plot, u.number),
        ));
    }
}

fn check_duplicate(units: &[SpatialUnit], i: usize, report: &mut DiagnosticReport) {
    let u = &units[i];
    if units[..i].iter().any(|prev| prev.plot == u.plot && prev.number == u.number) {
        report.push(Diagnostic::error(
            Stage::Validate,
            "Unit.DuplicateNumber",
            EntityRef::unit(u),
            format!("number {} appears more than once in plot {}", u.number, u.plot),
        ));
    }
}

fn check_links(units: &[SpatialUnit], u: &SpatialUnit, report: &mut DiagnosticReport) {
    if !u.is_subordinate() {
        return;
    }
    if u.primary_link.contains(&u.number) {
        report.push(Diagnostic::error(
            Stage::Validate,
            "Unit.SelfReference",
            EntityRef::unit(u),
            format!("unit {} lists itself as its primary unit", u.number),
        ));
    }

    let others = u.primary_link.parents().iter().filter(|p| **p != u.number);
    let mut dangling: Vec<&UnitNumber> = Vec::new();
    let mut cross: Vec<&UnitNumber> = Vec::new();
    for p in others {
        let mut found = units.iter().filter(|c| c.number == *p).peekable();
        if found.peek().is_none() {
            dangling.push(p);
            continue;
        }
        let same_group = found.any(|c| c.plot == u.plot && c.group == u.group);
        if u.category == Category::CommonArea && !same_group {
            cross.push(p);
        }
    }

    if !dangling.is_empty() {
        report.push(Diagnostic::error(
            Stage::Validate,
            "Unit.DanglingLink",
            EntityRef::unit(u),
            format!("unit {} is subordinate to nonexistent number(s) {}", u.number, join(&dangling)),
        ));
    }
    if !cross.is_empty() {
        report.push(Diagnostic::error(
            Stage::Validate,
            "Unit.CommonCrossGroup",
            EntityRef::unit(u),
            format!(
                "common area {} in group {} links to {} outside its group",
                u.number,
                u.group,
                join(&cross)
            ),
        ));
    }
}

fn join(numbers: &[&UnitNumber]) -> String {
    numbers.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::entities::PlotRegistration;
    use ps_core::ids::PrimaryLink;

    fn unit(element: i64, number: &str, group: &str, category: Category, link: &str) -> SpatialUnit {
        SpatialUnit {
            element,
            number: number.parse().unwrap(),
            name: format!("unit {number}"),
            plot: "UPI 1".parse().unwrap(),
            group: group.parse().unwrap(),
            category,
            location: LocationClass::AboveGround,
            entrance: "A".into(),
            level: None,
            raw_area: 100.0,
            primary_link: link.parse::<PrimaryLink>().unwrap(),
            multiplier: None,
        }
    }

    fn params() -> Params {
        Params {
            plots: vec![PlotRegistration { label: "UPI 1".parse().unwrap(), area: 500.0 }],
            ..Params::default()
        }
    }

    fn run(units: Vec<SpatialUnit>) -> DiagnosticReport {
        let data = Dataset { units, ..Dataset::default() };
        let mut report = DiagnosticReport::default();
        validate(&data, &params(), &mut report);
        report.finish();
        report
    }

    fn codes(r: &DiagnosticReport) -> Vec<&'static str> {
        r.issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn clean_dataset_passes() {
        let r = run(vec![
            unit(1, "1", "A", Category::IndividualUnit, ""),
            unit(2, "2", "A", Category::CommonArea, "1"),
        ]);
        assert!(r.pass);
        assert!(r.issues.is_empty());
    }

    #[test]
    fn self_reference_and_dangling_links_are_reported() {
        let r = run(vec![
            unit(1, "1", "A", Category::IndividualUnit, ""),
            unit(2, "2", "A", Category::IndividualUnit, "2"),
            unit(3, "3", "A", Category::IndividualUnit, "1+99"),
        ]);
        assert_eq!(codes(&r), vec!["Unit.DanglingLink", "Unit.SelfReference"]);
        assert!(!r.pass);
        assert!(r.issues[0].message.contains("99"));
    }

    #[test]
    fn common_area_must_stay_in_its_group() {
        let r = run(vec![
            unit(1, "1", "A", Category::IndividualUnit, ""),
            unit(2, "2", "B", Category::CommonArea, "1"),
        ]);
        assert_eq!(codes(&r), vec!["Unit.CommonCrossGroup"]);
    }

    #[test]
    fn classification_and_duplicates() {
        let mut na = unit(3, "Z1", "A", Category::NotApplicable, "");
        na.location = LocationClass::GroundLevel;
        let mut stray = unit(4, "9", "A", Category::IndividualUnit, "");
        stray.plot = "UPI 9".parse().unwrap();
        let r = run(vec![
            unit(1, "1", "A", Category::IndividualUnit, ""),
            unit(2, "1", "A", Category::IndividualUnit, ""),
            na,
            stray,
        ]);
        assert_eq!(
            codes(&r),
            vec!["Unit.CategoryGroup", "Unit.CategoryLocation", "Unit.DuplicateNumber", "Unit.PlotUnknown"]
        );
        assert_eq!(r.errors(), 3);
        assert_eq!(r.warnings(), 1);
    }

    #[test]
    fn land_group_allows_not_applicable() {
        let mut land = unit(5, "Z1", "ЗЕМЯ", Category::NotApplicable, "");
        land.location = LocationClass::NotApplicable;
        assert!(run(vec![land]).issues.is_empty());
    }

    #[test]
    fn sorting_is_by_stage_then_code_then_entity() {
        let mut r = DiagnosticReport::default();
        let u = |n: &str| EntityRef::Unit { element: 1, number: n.into() };
        r.push(Diagnostic::warning(Stage::Redistribute, "Surplus.NotConverged", EntityRef::Root, "x"));
        r.push(Diagnostic::error(Stage::Validate, "Unit.SelfReference", u("2"), "b"));
        r.push(Diagnostic::error(Stage::Validate, "Unit.SelfReference", u("1"), "a"));
        r.push(Diagnostic::warning(Stage::Load, "Unit.MissingField", EntityRef::Root, "m"));
        r.finish();
        let msgs: Vec<_> = r.issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(msgs, vec!["m", "a", "b", "x"]);
    }
}
