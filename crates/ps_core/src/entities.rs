//! crates/ps_core/src/entities.rs
//! Domain entities: spatial units, adjacent rooms, plot registrations and the
//! derived metric table.
//!
//! Units carry only host-supplied attributes; derived metrics live in a
//! separate `Metrics` row per unit so a stage can stage/commit them as a batch.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::CoreError;
use crate::ids::{GroupKey, PlotName, PrimaryLink, UnitNumber};

/// Host element id (opaque, echoed back on write-back).
pub type ElementId = i64;

/// Enum with a canonical wire token plus accepted host spellings.
/// Matching is trimmed and case-insensitive.
macro_rules! token_enum {
    ($(#[$meta:meta])* $name:ident, $err:ident => {
        $($variant:ident = $token:literal $(| $alias:literal)*),+ $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn token(&self) -> &'static str {
                match self {
                    $($name::$variant => $token,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.token()) }
        }

        impl FromStr for $name {
            type Err = CoreError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let t = s.trim().to_lowercase();
                $(
                    if t == $token $(|| t == $alias.to_lowercase())* {
                        return Ok($name::$variant);
                    }
                )+
                Err(CoreError::$err(s.to_string()))
            }
        }

        #[cfg(feature = "serde")]
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(self.token())
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

token_enum!(
    /// Ownership category of a spatial unit.
    Category, InvalidCategory => {
        IndividualUnit = "individual_unit" | "IndividualUnit" | "САМОСТОЯТЕЛЕН ОБЕКТ",
        CommonArea = "common_area" | "CommonArea" | "ОБЩА ЧАСТ",
        ExcludedFromCommon = "excluded_from_common" | "ExcludedFromCommon" | "ИЗКЛЮЧЕНА ОТ ОЧ",
        NotApplicable = "not_applicable" | "NotApplicable" | "НЕПРИЛОЖИМО",
    }
);

token_enum!(
    /// Vertical position of a unit relative to the terrain.
    LocationClass, InvalidLocation => {
        AboveGround = "above_ground" | "AboveGround" | "НАДЗЕМНА",
        GroundLevel = "ground_level" | "GroundLevel" | "НАЗЕМНА",
        SemiBelowGround = "semi_below_ground" | "SemiBelowGround" | "ПОЛУПОДЗЕМНА",
        BelowGround = "below_ground" | "BelowGround" | "ПОДЗЕМНА",
        NotApplicable = "not_applicable" | "NotApplicable" | "НЕПРИЛОЖИМО",
    }
);

impl LocationClass {
    pub fn is_underground(&self) -> bool {
        matches!(self, LocationClass::BelowGround | LocationClass::SemiBelowGround)
    }

    pub fn is_built(&self) -> bool {
        matches!(self, LocationClass::AboveGround | LocationClass::GroundLevel)
    }
}

/// Entrance tag used when the host marks the entrance as not applicable.
pub const DEFAULT_ENTRANCE: &str = "A";

/// Normalize a host entrance tag: "not applicable" spellings map to `"A"`.
pub fn normalize_entrance(raw: &str) -> String {
    let t = raw.trim();
    if t.eq_ignore_ascii_case("not_applicable") || t.to_lowercase() == "неприложимо" {
        DEFAULT_ENTRANCE.to_string()
    } else {
        t.to_string()
    }
}

/// Level reference with elevation already converted to centimetres.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LevelRef {
    pub name: String,
    pub elevation_cm: f64,
}

/// One apportionable area entity.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpatialUnit {
    pub element: ElementId,
    pub number: UnitNumber,
    pub name: String,
    pub plot: PlotName,
    pub group: GroupKey,
    pub category: Category,
    pub location: LocationClass,
    pub entrance: String,
    pub level: Option<LevelRef>,
    /// Measured area in host units (ft²).
    pub raw_area: f64,
    pub primary_link: PrimaryLink,
    /// Price multiplier (C1/C2 = gross × multiplier). `None` until assigned.
    pub multiplier: Option<f64>,
}

impl SpatialUnit {
    pub fn is_subordinate(&self) -> bool {
        !self.primary_link.is_empty()
    }
}

/// Room linked to a parent unit (parking places, storage cells, ...).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdjacentRoom {
    pub element: ElementId,
    pub number: UnitNumber,
    pub name: String,
    /// Measured area in host units (ft²).
    pub raw_area: f64,
    pub parent: UnitNumber,
}

/// Registered (authoritative) plot area in m².
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlotRegistration {
    pub label: PlotName,
    pub area: f64,
}

// ----- Derived metrics -----

/// Every derived attribute the engine writes, by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MetricField {
    GrossArea,
    PriceCoefficient,
    CommonPercent,
    CommonArea,
    SpecialCommonArea,
    TotalArea,
    BuildingPermitPercent,
    LandPercent,
    LandArea,
    PropertyCommonPercent,
}

impl MetricField {
    pub const ALL: [MetricField; 10] = [
        MetricField::GrossArea,
        MetricField::PriceCoefficient,
        MetricField::CommonPercent,
        MetricField::CommonArea,
        MetricField::SpecialCommonArea,
        MetricField::TotalArea,
        MetricField::BuildingPermitPercent,
        MetricField::LandPercent,
        MetricField::LandArea,
        MetricField::PropertyCommonPercent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricField::GrossArea => "gross_area",
            MetricField::PriceCoefficient => "price_coefficient",
            MetricField::CommonPercent => "common_percent",
            MetricField::CommonArea => "common_area",
            MetricField::SpecialCommonArea => "special_common_area",
            MetricField::TotalArea => "total_area",
            MetricField::BuildingPermitPercent => "building_permit_percent",
            MetricField::LandPercent => "land_percent",
            MetricField::LandArea => "land_area",
            MetricField::PropertyCommonPercent => "property_common_percent",
        }
    }

    /// Area-valued fields are converted to host units on write-back.
    pub fn is_area(&self) -> bool {
        matches!(
            self,
            MetricField::GrossArea
                | MetricField::CommonArea
                | MetricField::SpecialCommonArea
                | MetricField::TotalArea
                | MetricField::LandArea
        )
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Derived metrics of one unit. Areas in m², percentages in %.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Metrics {
    pub gross_area: f64,
    pub price_coefficient: f64,
    pub common_percent: f64,
    pub common_area: f64,
    pub special_common_area: f64,
    pub total_area: f64,
    pub building_permit_percent: f64,
    pub land_percent: f64,
    pub land_area: f64,
    pub property_common_percent: f64,
}

impl Metrics {
    pub fn get(&self, field: MetricField) -> f64 {
        match field {
            MetricField::GrossArea => self.gross_area,
            MetricField::PriceCoefficient => self.price_coefficient,
            MetricField::CommonPercent => self.common_percent,
            MetricField::CommonArea => self.common_area,
            MetricField::SpecialCommonArea => self.special_common_area,
            MetricField::TotalArea => self.total_area,
            MetricField::BuildingPermitPercent => self.building_permit_percent,
            MetricField::LandPercent => self.land_percent,
            MetricField::LandArea => self.land_area,
            MetricField::PropertyCommonPercent => self.property_common_percent,
        }
    }

    pub fn set(&mut self, field: MetricField, value: f64) {
        let slot = match field {
            MetricField::GrossArea => &mut self.gross_area,
            MetricField::PriceCoefficient => &mut self.price_coefficient,
            MetricField::CommonPercent => &mut self.common_percent,
            MetricField::CommonArea => &mut self.common_area,
            MetricField::SpecialCommonArea => &mut self.special_common_area,
            MetricField::TotalArea => &mut self.total_area,
            MetricField::BuildingPermitPercent => &mut self.building_permit_percent,
            MetricField::LandPercent => &mut self.land_percent,
            MetricField::LandArea => &mut self.land_area,
            MetricField::PropertyCommonPercent => &mut self.property_common_percent,
        };
        *slot = value;
    }
}

/// Flattened share of a parent unit held by one adjacent room.
/// `None` is the explicit "absent" marker for a computed exact zero.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoomShare {
    pub room: UnitNumber,
    pub element: ElementId,
    pub parent: UnitNumber,
    pub percent: Option<f64>,
    pub common_percent: Option<f64>,
    pub common_area: Option<f64>,
    pub special_common_area: Option<f64>,
    pub common_total: Option<f64>,
    pub total_area: Option<f64>,
    pub building_permit_percent: Option<f64>,
    pub land_percent: Option<f64>,
    pub land_area: Option<f64>,
}
