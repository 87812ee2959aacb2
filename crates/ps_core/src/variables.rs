//! variables.rs: Project configuration (`Params`) with safe defaults.
//!
//! Every knob has a default so a minimal project file only lists the plot
//! registrations. `validate_domains` enforces ranges before a run starts.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entities::PlotRegistration;
use crate::errors::CoreError;
use crate::rounding::{AREA_CONVERT, LENGTH_CONVERT};

// ------------ Fixed-point correction bounds ------------

/// Maximum round-robin passes of the percentage-only redistribution.
pub const MAX_PASSES_PERCENT: u32 = 10;
/// Maximum passes of the percentage+area redistribution (each half).
pub const MAX_PASSES_LINKED: u32 = 5;
/// Maximum passes of the special-common-area redistribution.
pub const MAX_PASSES_SPECIAL: u32 = 5;
/// Maximum passes of each adjacent-room share redistribution.
pub const MAX_PASSES_ROOMS: u32 = 10;

/// Up to three (label, area) plot registrations per project.
pub const MAX_PLOT_REGISTRATIONS: usize = 3;

/// Default group names with special meaning.
pub const DEFAULT_LAND_GROUP: &str = "ЗЕМЯ";
pub const DEFAULT_EXCLUDED_GROUP: &str = "ТРАФ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct PassLimits {
    pub percent: u32,
    pub linked: u32,
    pub special: u32,
    pub rooms: u32,
}

impl Default for PassLimits {
    fn default() -> Self {
        Self {
            percent: MAX_PASSES_PERCENT,
            linked: MAX_PASSES_LINKED,
            special: MAX_PASSES_SPECIAL,
            rooms: MAX_PASSES_ROOMS,
        }
    }
}

/// Price multiplier table. A unit whose name contains one of the markers
/// (case-insensitive) gets the matching multiplier; others get `standard`.
/// Storage markers are checked before garage markers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CoefficientTable {
    pub standard: f64,
    pub garage: f64,
    pub storage: f64,
    pub garage_markers: Vec<String>,
    pub storage_markers: Vec<String>,
}

impl Default for CoefficientTable {
    fn default() -> Self {
        Self {
            standard: 1.0,
            garage: 0.8,
            storage: 0.3,
            garage_markers: vec!["гараж".into(), "паркинг".into(), "garage".into(), "parking".into()],
            storage_markers: vec!["склад".into(), "мазе".into(), "storage".into(), "cellar".into()],
        }
    }
}

impl CoefficientTable {
    /// Multiplier for a unit name.
    pub fn for_name(&self, name: &str) -> f64 {
        let lower = name.to_lowercase();
        if self.storage_markers.iter().any(|m| lower.contains(&m.to_lowercase())) {
            self.storage
        } else if self.garage_markers.iter().any(|m| lower.contains(&m.to_lowercase())) {
            self.garage
        } else {
            self.standard
        }
    }
}

/// Project-level configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct Params {
    /// Host ft² per m².
    pub area_convert: f64,
    /// Host cm per ft.
    pub length_convert: f64,
    pub plots: Vec<PlotRegistration>,
    pub coefficients: CoefficientTable,
    /// Reassign default multipliers even where the host already has one.
    pub override_coefficients: bool,
    pub land_group: String,
    /// Groups kept out of group-level redistribution (transformer rooms, ...).
    pub excluded_groups: Vec<String>,
    pub pass_limits: PassLimits,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            area_convert: AREA_CONVERT,
            length_convert: LENGTH_CONVERT,
            plots: Vec::new(),
            coefficients: CoefficientTable::default(),
            override_coefficients: false,
            land_group: DEFAULT_LAND_GROUP.to_string(),
            excluded_groups: vec![DEFAULT_EXCLUDED_GROUP.to_string()],
            pass_limits: PassLimits::default(),
        }
    }
}

impl Params {
    /// Registered area for a plot label, if any.
    pub fn plot_area(&self, label: &str) -> Option<f64> {
        self.plots
            .iter()
            .find(|p| p.label.eq_ignore_case(label))
            .map(|p| p.area)
    }

    pub fn is_excluded_group(&self, name: &str) -> bool {
        let n = name.trim().to_lowercase();
        self.excluded_groups.iter().any(|g| g.trim().to_lowercase() == n)
    }
}

fn positive_finite(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Range and consistency checks on a loaded `Params`.
pub fn validate_domains(p: &Params) -> Result<(), CoreError> {
    if !positive_finite(p.area_convert) {
        return Err(CoreError::DomainOutOfRange("area_convert"));
    }
    if !positive_finite(p.length_convert) {
        return Err(CoreError::DomainOutOfRange("length_convert"));
    }
    if p.plots.len() > MAX_PLOT_REGISTRATIONS {
        return Err(CoreError::DomainOutOfRange("plots (at most 3 registrations)"));
    }
    for (i, reg) in p.plots.iter().enumerate() {
        if !positive_finite(reg.area) {
            return Err(CoreError::DomainOutOfRange("plots[].area"));
        }
        if p.plots[..i].iter().any(|prev| prev.label.eq_ignore_case(reg.label.as_str())) {
            return Err(CoreError::DomainOutOfRange("plots[].label (duplicate)"));
        }
    }
    let c = &p.coefficients;
    for v in [c.standard, c.garage, c.storage] {
        if !positive_finite(v) {
            return Err(CoreError::DomainOutOfRange("coefficients"));
        }
    }
    if p.land_group.trim().is_empty() {
        return Err(CoreError::DomainOutOfRange("land_group"));
    }
    let l = &p.pass_limits;
    if [l.percent, l.linked, l.special, l.rooms].contains(&0) {
        return Err(CoreError::DomainOutOfRange("pass_limits"));
    }
    Ok(())
}
