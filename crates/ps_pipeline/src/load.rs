//! crates/ps_pipeline/src/load.rs
//! LOAD: turn raw host records into typed units and rooms.
//!
//! - Token parsing happens here and only here.
//! - A unit missing its number, plot, group or category (or carrying a value
//!   that does not parse) is not dropped silently: it is recorded as a
//!   `SkippedRecord` and reported as `Unit.MissingField`.
//! - A missing entrance defaults to "A" and a missing location to
//!   NotApplicable; both are reported as warnings and the unit is kept.

use core::str::FromStr;

use tracing::debug;

use ps_core::adapter::{RecordSource, RoomRecord, UnitRecord};
use ps_core::entities::{
    normalize_entrance, AdjacentRoom, ElementId, LevelRef, LocationClass, SpatialUnit, DEFAULT_ENTRANCE,
};
use ps_core::ids::PrimaryLink;
use ps_core::rounding::{host_area_to_m2, host_length_to_cm};
use ps_core::variables::Params;

use crate::uow::Stage;
use crate::validate::{Diagnostic, DiagnosticReport, EntityRef};

/// A unit record that could not be typed; kept for the missing-data list.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub element: ElementId,
    pub number: String,
    pub name: String,
    pub area_m2: f64,
}

impl SkippedRecord {
    /// `"{id} {number} {name} {area_m2}"`
    pub fn missing_text(&self) -> String {
        format!("{} {} {} {}", self.element, self.number, self.name, self.area_m2)
    }
}

/// Typed input of one run, in host order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub units: Vec<SpatialUnit>,
    pub rooms: Vec<AdjacentRoom>,
    pub skipped: Vec<SkippedRecord>,
}

pub fn load<S: RecordSource + ?Sized>(source: &S, params: &Params, report: &mut DiagnosticReport) -> Dataset {
    let mut data = Dataset::default();

    for rec in source.unit_records() {
        match unit_from_record(&rec, params, report) {
            Some(u) => data.units.push(u),
            None => data.skipped.push(SkippedRecord {
                element: rec.element,
                number: rec.number.as_deref().map(str::trim).unwrap_or("-").to_string(),
                name: rec.name.trim().to_string(),
                area_m2: if rec.area.is_finite() { host_area_to_m2(rec.area, params.area_convert) } else { 0.0 },
            }),
        }
    }

    for rec in source.room_records() {
        if let Some(r) = room_from_record(&rec, report) {
            data.rooms.push(r);
        }
    }

    debug!(
        units = data.units.len(),
        rooms = data.rooms.len(),
        skipped = data.skipped.len(),
        "records loaded"
    );
    data
}

/// Parse a required attribute; a miss is noted in `problems`.
fn required<T: FromStr>(raw: &Option<String>, field: &str, problems: &mut Vec<String>) -> Option<T> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => {
            problems.push(format!("missing {field}"));
            None
        }
        Some(s) => match s.parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                problems.push(format!("unrecognized {field} {s:?}"));
                None
            }
        },
    }
}

fn unit_entity(rec: &UnitRecord) -> EntityRef {
    EntityRef::Unit {
        element: rec.element,
        number: rec.number.as_deref().unwrap_or("").trim().to_string(),
    }
}

fn unit_from_record(rec: &UnitRecord, params: &Params, report: &mut DiagnosticReport) -> Option<SpatialUnit> {
    let mut problems: Vec<String> = Vec::new();

    let number = required(&rec.number, "number", &mut problems);
    let plot = required(&rec.plot, "plot", &mut problems);
    let group = required(&rec.group, "group", &mut problems);
    let category = required(&rec.category, "category", &mut problems);

    let primary_link = match rec.primary.as_deref() {
        None => PrimaryLink::default(),
        Some(s) => s.parse::<PrimaryLink>().unwrap_or_else(|_| {
            problems.push(format!("unparsable primary link {s:?}"));
            PrimaryLink::default()
        }),
    };
    if !rec.area.is_finite() || rec.area < 0.0 {
        problems.push(format!("invalid area {}", rec.area));
    }

    // Defaulted, not fatal.
    let mut defaulted: Vec<&str> = Vec::new();
    let location = match rec.location.as_deref().map(str::trim) {
        None | Some("") => {
            defaulted.push("location");
            Some(LocationClass::NotApplicable)
        }
        Some(s) => s.parse::<LocationClass>().ok().or_else(|| {
            problems.push(format!("unrecognized location {s:?}"));
            None
        }),
    };
    let entrance = match rec.entrance.as_deref().map(str::trim) {
        None | Some("") => {
            defaulted.push("entrance");
            DEFAULT_ENTRANCE.to_string()
        }
        Some(s) => normalize_entrance(s),
    };

    if !problems.is_empty() {
        report.push(Diagnostic::error(
            Stage::Load,
            "Unit.MissingField",
            unit_entity(rec),
            format!("element {} skipped: {}", rec.element, problems.join(", ")),
        ));
        return None;
    }
    if !defaulted.is_empty() {
        report.push(Diagnostic::warning(
            Stage::Load,
            "Unit.MissingField",
            unit_entity(rec),
            format!("element {} has no {}; defaulted", rec.element, defaulted.join(" or ")),
        ));
    }

    let level = rec.level.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(|name| LevelRef {
        name: name.to_string(),
        elevation_cm: host_length_to_cm(rec.elevation.unwrap_or(0.0), params.length_convert),
    });

    Some(SpatialUnit {
        element: rec.element,
        number: number?,
        name: rec.name.trim().to_string(),
        plot: plot?,
        group: group?,
        category: category?,
        location: location?,
        entrance,
        level,
        raw_area: rec.area,
        primary_link,
        multiplier: rec.coefficient.filter(|c| *c != 0.0),
    })
}

fn room_from_record(rec: &RoomRecord, report: &mut DiagnosticReport) -> Option<AdjacentRoom> {
    let parent = match rec.primary.as_deref().map(str::trim) {
        None | Some("") => {
            debug!(element = rec.element, "room without a primary unit ignored");
            return None;
        }
        Some(s) => s.parse().ok(),
    };
    let number = rec.number.as_deref().and_then(|s| s.parse().ok());
    let where_ = EntityRef::Room {
        element: rec.element,
        number: rec.number.as_deref().unwrap_or("").trim().to_string(),
    };
    match (number, parent) {
        (Some(number), Some(parent)) if rec.area.is_finite() && rec.area >= 0.0 => Some(AdjacentRoom {
            element: rec.element,
            number,
            name: rec.name.trim().to_string(),
            raw_area: rec.area,
            parent,
        }),
        _ => {
            report.push(Diagnostic::warning(
                Stage::Load,
                "Unit.MissingField",
                where_,
                format!("room element {} skipped: bad number, primary unit or area", rec.element),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::adapter::VecSource;
    use ps_core::entities::Category;

    fn rec(element: i64, number: Option<&str>) -> UnitRecord {
        UnitRecord {
            element,
            number: number.map(Into::into),
            name: " Apartment ".into(),
            plot: Some("UPI 1".into()),
            group: Some("A".into()),
            category: Some("САМОСТОЯТЕЛЕН ОБЕКТ".into()),
            location: Some("НАДЗЕМНА".into()),
            entrance: Some("НЕПРИЛОЖИМО".into()),
            level: Some("L1".into()),
            elevation: Some(10.0),
            area: 538.19552083548,
            primary: None,
            coefficient: Some(0.0),
        }
    }

    fn load_units(units: Vec<UnitRecord>) -> (Dataset, DiagnosticReport) {
        let mut report = DiagnosticReport::default();
        let data = load(&VecSource { units, rooms: Vec::new() }, &Params::default(), &mut report);
        (data, report)
    }

    #[test]
    fn types_a_complete_record() {
        let (data, report) = load_units(vec![rec(1, Some("1"))]);
        assert!(report.issues.is_empty());
        let u = &data.units[0];
        assert_eq!(u.category, Category::IndividualUnit);
        assert_eq!(u.entrance, "A");
        assert_eq!(u.name, "Apartment");
        assert_eq!(u.level.as_ref().map(|l| l.elevation_cm), Some(305.0));
        assert_eq!(u.multiplier, None);
    }

    #[test]
    fn missing_required_fields_route_to_skipped() {
        let mut bad = rec(2, None);
        bad.category = Some("shop".into());
        let (data, report) = load_units(vec![bad]);
        assert!(data.units.is_empty());
        assert_eq!(data.skipped.len(), 1);
        assert_eq!(data.skipped[0].missing_text(), "2 - Apartment 50");
        let d = &report.issues[0];
        assert_eq!(d.code, "Unit.MissingField");
        assert!(d.message.contains("missing number"));
        assert!(d.message.contains("unrecognized category"));
    }

    #[test]
    fn missing_entrance_defaults_with_a_warning() {
        let mut r = rec(3, Some("3"));
        r.entrance = None;
        r.location = None;
        let (data, report) = load_units(vec![r]);
        assert_eq!(data.units[0].entrance, "A");
        assert_eq!(data.units[0].location, LocationClass::NotApplicable);
        assert_eq!(report.warnings(), 1);
    }

    #[test]
    fn rooms_need_a_primary_unit() {
        let rooms = vec![
            RoomRecord { element: 10, number: Some("P1".into()), name: "Parking".into(), area: 5.0, primary: Some("1".into()) },
            RoomRecord { element: 11, number: Some("P2".into()), name: "Parking".into(), area: 5.0, primary: None },
            RoomRecord { element: 12, number: None, name: "Parking".into(), area: 5.0, primary: Some("1".into()) },
        ];
        let mut report = DiagnosticReport::default();
        let data = load(&VecSource { units: Vec::new(), rooms }, &Params::default(), &mut report);
        assert_eq!(data.rooms.len(), 1);
        assert_eq!(data.rooms[0].parent.as_str(), "1");
        assert_eq!(report.with_code("Unit.MissingField").count(), 1);
    }
}
