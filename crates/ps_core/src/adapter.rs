//! Host adapter surface.
//!
//! The engine never touches the host object model. A host exposes its raw
//! records through `RecordSource` (untyped strings, host units) and accepts
//! final values through `MetricSink` (one typed setter per named attribute).
//! Area values handed to the sink are already converted to host units.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entities::{ElementId, MetricField, RoomShare};

/// Raw unit record as the host reports it. Missing attributes are `None`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct UnitRecord {
    pub element: ElementId,
    pub number: Option<String>,
    pub name: String,
    pub plot: Option<String>,
    pub group: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub entrance: Option<String>,
    pub level: Option<String>,
    /// Level elevation in host units (ft).
    pub elevation: Option<f64>,
    /// Measured area in host units (ft²).
    pub area: f64,
    /// Parent numbers, `+`-joined.
    pub primary: Option<String>,
    /// Price multiplier, if the host already carries one.
    pub coefficient: Option<f64>,
}

/// Raw room record; `primary` names the parent unit number.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct RoomRecord {
    pub element: ElementId,
    pub number: Option<String>,
    pub name: String,
    pub area: f64,
    pub primary: Option<String>,
}

/// Typed getters over the host's raw records, in host order.
pub trait RecordSource {
    fn unit_records(&self) -> Vec<UnitRecord>;
    fn room_records(&self) -> Vec<RoomRecord>;
}

/// Write-back target for final values.
pub trait MetricSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn set_metric(&mut self, element: ElementId, field: MetricField, value: f64) -> Result<(), Self::Error>;

    fn set_room_share(&mut self, element: ElementId, share: &RoomShare) -> Result<(), Self::Error>;
}

/// In-memory source, handy for hosts that already hold plain records.
#[derive(Clone, Debug, Default)]
pub struct VecSource {
    pub units: Vec<UnitRecord>,
    pub rooms: Vec<RoomRecord>,
}

impl RecordSource for VecSource {
    fn unit_records(&self) -> Vec<UnitRecord> {
        self.units.clone()
    }

    fn room_records(&self) -> Vec<RoomRecord> {
        self.rooms.clone()
    }
}
