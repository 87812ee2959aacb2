//! Adjacent-room shares of a parent unit's metrics.
//!
//! Contract:
//! - Rooms are bucketed by `round3(host area)`; equal-sized rooms move together.
//! - Room percentage = `round3(room_m2 × 100 / parent gross)`, redistributed to 100.
//! - Every parent metric is split by that percentage, then redistributed back
//!   to the parent's value (percent metrics at 0.001, area metrics at 0.01).
//! - Room total area = `round2(room_m2) + combined common share`, computed last.
//!
//! Determinism:
//! - Output is in input order; callers sort by room number when flattening.

use ps_core::rounding::{round_area, round_pct, round_to};

use crate::surplus::{redistribute, BucketArena, Outcome, Resolution};

/// The parent's final values (m² for areas).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParentMetrics {
    pub gross_area: f64,
    pub common_percent: f64,
    pub common_area: f64,
    pub special_common_area: f64,
    pub building_permit_percent: f64,
    pub land_percent: f64,
    pub land_area: f64,
}

impl ParentMetrics {
    pub fn common_total(&self) -> f64 {
        round_area(self.common_area + self.special_common_area)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomInput {
    /// Raw host area; only used for bucketing.
    pub area_host: f64,
    pub area_m2: f64,
}

/// Computed shares of one room (exact zeros are kept; flattening decides on absence).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoomValues {
    pub percent: f64,
    pub common_percent: f64,
    pub common_area: f64,
    pub special_common_area: f64,
    pub common_total: f64,
    pub total_area: f64,
    pub building_permit_percent: f64,
    pub land_percent: f64,
    pub land_area: f64,
}

/// Redistribution result for one share metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricOutcome {
    pub metric: &'static str,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomAllocation {
    pub rooms: Vec<RoomValues>,
    pub outcomes: Vec<MetricOutcome>,
}

impl RoomAllocation {
    pub fn unconverged(&self) -> impl Iterator<Item = &MetricOutcome> {
        self.outcomes.iter().filter(|o| !o.outcome.converged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    /// Parent gross area is zero or non-finite.
    ZeroParentGross,
    NoRooms,
}

impl core::fmt::Display for RoomError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RoomError::ZeroParentGross => write!(f, "parent gross area is zero"),
            RoomError::NoRooms => write!(f, "no rooms to allocate"),
        }
    }
}

impl std::error::Error for RoomError {}

// ----- Share columns -----

type Getter = fn(&RoomValues) -> f64;
type Setter = fn(&mut RoomValues, f64);

struct Column {
    metric: &'static str,
    res: Resolution,
    target: fn(&ParentMetrics) -> f64,
    get: Getter,
    set: Setter,
}

const COLUMNS: [Column; 7] = [
    Column {
        metric: "common_percent",
        res: Resolution::Percent,
        target: |p| p.common_percent,
        get: |r| r.common_percent,
        set: |r, v| r.common_percent = v,
    },
    Column {
        metric: "building_permit_percent",
        res: Resolution::Percent,
        target: |p| p.building_permit_percent,
        get: |r| r.building_permit_percent,
        set: |r, v| r.building_permit_percent = v,
    },
    Column {
        metric: "land_percent",
        res: Resolution::Percent,
        target: |p| p.land_percent,
        get: |r| r.land_percent,
        set: |r, v| r.land_percent = v,
    },
    Column {
        metric: "common_area",
        res: Resolution::Area,
        target: |p| p.common_area,
        get: |r| r.common_area,
        set: |r, v| r.common_area = v,
    },
    Column {
        metric: "special_common_area",
        res: Resolution::Area,
        target: |p| p.special_common_area,
        get: |r| r.special_common_area,
        set: |r, v| r.special_common_area = v,
    },
    Column {
        metric: "common_total",
        res: Resolution::Area,
        target: ParentMetrics::common_total,
        get: |r| r.common_total,
        set: |r, v| r.common_total = v,
    },
    Column {
        metric: "land_area",
        res: Resolution::Area,
        target: |p| p.land_area,
        get: |r| r.land_area,
        set: |r, v| r.land_area = v,
    },
];

fn run_column(rooms: &mut [RoomValues], arena: &BucketArena, col: &Column, target: f64, max_passes: u32) -> Outcome {
    let mut values: Vec<f64> = rooms.iter().map(col.get).collect();
    let outcome = redistribute(&mut values, arena, target, col.res, max_passes);
    for (room, v) in rooms.iter_mut().zip(values) {
        (col.set)(room, v);
    }
    outcome
}

/// Split a parent's metrics over its rooms.
pub fn allocate_rooms(
    parent: &ParentMetrics,
    rooms: &[RoomInput],
    max_passes: u32,
) -> Result<RoomAllocation, RoomError> {
    if rooms.is_empty() {
        return Err(RoomError::NoRooms);
    }
    if !parent.gross_area.is_finite() || parent.gross_area == 0.0 {
        return Err(RoomError::ZeroParentGross);
    }

    let order: Vec<usize> = (0..rooms.len()).collect();
    let arena = BucketArena::group_by(&order, |i| round_to(rooms[i].area_host, 3));
    let mut outcomes = Vec::with_capacity(1 + COLUMNS.len());

    // Room percentages of the parent, forced to 100.
    let mut percents: Vec<f64> = rooms
        .iter()
        .map(|r| round_pct(r.area_m2 * 100.0 / parent.gross_area))
        .collect();
    let outcome = redistribute(&mut percents, &arena, 100.0, Resolution::Percent, max_passes);
    outcomes.push(MetricOutcome { metric: "percent", outcome });

    let common_total = parent.common_total();
    let mut out: Vec<RoomValues> = percents
        .iter()
        .map(|&p| RoomValues {
            percent: p,
            common_percent: round_pct(p * parent.common_percent / 100.0),
            common_area: round_area(p * parent.common_area / 100.0),
            special_common_area: round_area(p * parent.special_common_area / 100.0),
            common_total: round_area(p * common_total / 100.0),
            total_area: 0.0,
            building_permit_percent: round_pct(p * parent.building_permit_percent / 100.0),
            land_percent: round_pct(p * parent.land_percent / 100.0),
            land_area: round_area(p * parent.land_area / 100.0),
        })
        .collect();

    for col in &COLUMNS {
        let outcome = run_column(&mut out, &arena, col, (col.target)(parent), max_passes);
        outcomes.push(MetricOutcome { metric: col.metric, outcome });
    }

    for (values, room) in out.iter_mut().zip(rooms) {
        values.total_area = round_area(round_area(room.area_m2) + values.common_total);
    }

    Ok(RoomAllocation { rooms: out, outcomes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::variables::MAX_PASSES_ROOMS;

    fn room(m2: f64) -> RoomInput {
        RoomInput { area_host: m2 * 10.0, area_m2: m2 }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn two_room_groups_split_the_parent() {
        let parent = ParentMetrics {
            gross_area: 50.0,
            common_percent: 5.0,
            common_area: 10.0,
            special_common_area: 0.0,
            building_permit_percent: 20.0,
            land_percent: 10.0,
            land_area: 30.0,
        };
        let rooms = [room(12.0), room(12.0), room(12.0), room(7.0), room(7.0)];
        let alloc = allocate_rooms(&parent, &rooms, MAX_PASSES_ROOMS).unwrap();

        let pct: Vec<f64> = alloc.rooms.iter().map(|r| r.percent).collect();
        assert_eq!(pct, vec![24.0, 24.0, 24.0, 14.0, 14.0]);
        let group_a: f64 = pct[..3].iter().sum();
        let group_b: f64 = pct[3..].iter().sum();
        assert!(close(group_a, 72.0) && close(group_b, 28.0));

        let total: f64 = alloc.rooms.iter().map(|r| r.total_area).sum();
        assert!(close(total, 60.0), "room totals sum to the parent total, got {total}");
        let common: f64 = alloc.rooms.iter().map(|r| r.common_area).sum();
        assert!(close(common, 10.0));
        assert_eq!(alloc.rooms[0].special_common_area, 0.0);
        assert_eq!(alloc.unconverged().count(), 0);
    }

    #[test]
    fn equal_rooms_form_one_bucket() {
        let parent = ParentMetrics { gross_area: 50.0, common_area: 5.0, ..Default::default() };
        let rooms = [room(10.0); 5];
        let alloc = allocate_rooms(&parent, &rooms, MAX_PASSES_ROOMS).unwrap();
        assert!(alloc.rooms.iter().all(|r| r.percent == 20.0 && r.common_area == 1.0));
        assert!(alloc.rooms.iter().all(|r| r.total_area == 11.0));
    }

    #[test]
    fn odd_residue_moves_a_singleton_bucket() {
        // the slightly larger room sits alone in its bucket and takes the odd step
        let parent = ParentMetrics { gross_area: 30.0, common_area: 1.0, ..Default::default() };
        let rooms = [room(10.0), room(10.0), room(10.000_1)];
        let alloc = allocate_rooms(&parent, &rooms, MAX_PASSES_ROOMS).unwrap();
        let pct_sum: f64 = alloc.rooms.iter().map(|r| r.percent).sum();
        assert!(close(pct_sum, 100.0));
        assert_eq!(alloc.rooms[2].percent, 33.334);
        let area_sum: f64 = alloc.rooms.iter().map(|r| r.common_area).sum();
        assert!(close(area_sum, 1.0));
    }

    #[test]
    fn unreachable_residue_is_reported() {
        let parent = ParentMetrics { gross_area: 30.0, common_area: 1.0, ..Default::default() };
        let rooms = [room(10.0); 3];
        let alloc = allocate_rooms(&parent, &rooms, MAX_PASSES_ROOMS).unwrap();
        let failed: Vec<&str> = alloc.unconverged().map(|o| o.metric).collect();
        assert!(failed.contains(&"percent"));
        assert!(alloc.rooms.iter().all(|r| r.percent == 33.333));
    }

    #[test]
    fn zero_parent_and_no_rooms() {
        let parent = ParentMetrics::default();
        assert_eq!(allocate_rooms(&parent, &[room(1.0)], 10), Err(RoomError::ZeroParentGross));
        let parent = ParentMetrics { gross_area: 1.0, ..Default::default() };
        assert_eq!(allocate_rooms(&parent, &[], 10), Err(RoomError::NoRooms));
    }
}
