//! JSON-backed host: serves raw records from a units file and records every
//! value written back, keyed by element id, in write order.
//!
//! The written values are in host units (areas already converted by the
//! caller), so `writeback.json` is what a host tool would store.

use serde::Serialize;
use thiserror::Error;

use ps_core::adapter::{MetricSink, RecordSource, RoomRecord, UnitRecord, VecSource};
use ps_core::determinism::InsertionMap;
use ps_core::entities::{ElementId, MetricField, RoomShare};

#[derive(Debug, Error, PartialEq)]
pub enum HostError {
    #[error("no unit with element id {0}")]
    UnknownUnit(ElementId),
    #[error("no room with element id {0}")]
    UnknownRoom(ElementId),
    #[error("refusing to store non-finite {field} on element {element}")]
    NonFinite { element: ElementId, field: MetricField },
}

/// Values written to one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WrittenUnit {
    pub element: ElementId,
    pub values: Vec<(MetricField, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenRoom {
    pub element: ElementId,
    pub share: RoomShare,
}

/// Snapshot of everything written, ready for serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Writeback {
    pub units: Vec<WrittenUnit>,
    pub rooms: Vec<WrittenRoom>,
}

#[derive(Debug, Clone, Default)]
pub struct JsonHost {
    source: VecSource,
    units: InsertionMap<ElementId, Vec<(MetricField, f64)>>,
    rooms: InsertionMap<ElementId, RoomShare>,
}

impl JsonHost {
    pub fn new(source: VecSource) -> Self {
        Self { source, ..Self::default() }
    }

    /// Last value written for a unit field.
    pub fn metric(&self, element: ElementId, field: MetricField) -> Option<f64> {
        self.units
            .get(&element)
            .and_then(|vals| vals.iter().rev().find(|(f, _)| *f == field).map(|(_, v)| *v))
    }

    pub fn room_share(&self, element: ElementId) -> Option<&RoomShare> {
        self.rooms.get(&element)
    }

    pub fn writeback(&self) -> Writeback {
        Writeback {
            units: self
                .units
                .iter()
                .map(|(element, values)| WrittenUnit { element: *element, values: values.clone() })
                .collect(),
            rooms: self
                .rooms
                .iter()
                .map(|(element, share)| WrittenRoom { element: *element, share: share.clone() })
                .collect(),
        }
    }
}

impl RecordSource for JsonHost {
    fn unit_records(&self) -> Vec<UnitRecord> {
        self.source.unit_records()
    }

    fn room_records(&self) -> Vec<RoomRecord> {
        self.source.room_records()
    }
}

impl MetricSink for JsonHost {
    type Error = HostError;

    fn set_metric(&mut self, element: ElementId, field: MetricField, value: f64) -> Result<(), HostError> {
        if !self.source.units.iter().any(|u| u.element == element) {
            return Err(HostError::UnknownUnit(element));
        }
        if !value.is_finite() {
            return Err(HostError::NonFinite { element, field });
        }
        let vals = self.units.entry_or_insert_with(element, Vec::new);
        match vals.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => vals.push((field, value)),
        }
        Ok(())
    }

    fn set_room_share(&mut self, element: ElementId, share: &RoomShare) -> Result<(), HostError> {
        if !self.source.rooms.iter().any(|r| r.element == element) {
            return Err(HostError::UnknownRoom(element));
        }
        *self.rooms.entry_or_insert_with(element, || share.clone()) = share.clone();
        Ok(())
    }
}
