//! ADJACENT ROOMS: split each parent unit's final metrics over its rooms and
//! flatten the result into one `RoomShare` per room, sorted by room number.
//!
//! Runs on committed metrics only and writes nothing back to the metric table.
//! A room's parent is looked up by number over every plot; when more than one
//! plot holds that number the first registered match is used and
//! `Rooms.ParentAmbiguous` is reported.

use tracing::debug;

use ps_algo::rooms::{allocate_rooms, ParentMetrics, RoomError, RoomInput, RoomValues};
use ps_core::determinism::InsertionMap;
use ps_core::entities::{AdjacentRoom, Category, Metrics, RoomShare};
use ps_core::rounding::{host_area_to_m2, round_area};

use crate::redistribute::ScopeOutcome;
use crate::uow::Stage;
use crate::validate::{Diagnostic, DiagnosticReport, EntityRef};
use crate::StageCtx;

/// Exact zero → absent.
fn present(v: f64) -> Option<f64> {
    (v != 0.0).then_some(v)
}

fn flatten(room: &AdjacentRoom, v: &RoomValues) -> RoomShare {
    RoomShare {
        room: room.number.clone(),
        element: room.element,
        parent: room.parent.clone(),
        percent: present(v.percent),
        common_percent: present(v.common_percent),
        common_area: present(v.common_area),
        special_common_area: present(v.special_common_area),
        common_total: present(v.common_total),
        total_area: present(v.total_area),
        building_permit_percent: present(v.building_permit_percent),
        land_percent: present(v.land_percent),
        land_area: present(v.land_area),
    }
}

fn parent_metrics(m: &Metrics) -> ParentMetrics {
    ParentMetrics {
        gross_area: m.gross_area,
        common_percent: m.common_percent,
        common_area: m.common_area,
        special_common_area: m.special_common_area,
        building_permit_percent: m.building_permit_percent,
        land_percent: m.land_percent,
        land_area: m.land_area,
    }
}

pub fn allocate(
    ctx: &StageCtx<'_>,
    metrics: &[Metrics],
    rooms: &[AdjacentRoom],
    report: &mut DiagnosticReport,
    log: &mut Vec<ScopeOutcome>,
) -> Vec<RoomShare> {
    let conv = ctx.params.area_convert;

    // parent unit index → room indices, first-seen order
    let mut by_parent: InsertionMap<usize, Vec<usize>> = InsertionMap::new();
    for (ri, room) in rooms.iter().enumerate() {
        let candidates: Vec<usize> = ctx
            .registry
            .members()
            .filter(|&m| ctx.units[m].number == room.parent && ctx.units[m].category == Category::IndividualUnit)
            .collect();
        let where_ = || EntityRef::Room { element: room.element, number: room.number.to_string() };
        match candidates.as_slice() {
            [] => report.push(Diagnostic::warning(
                Stage::Rooms,
                "Rooms.ParentMissing",
                where_(),
                format!("room {} names unknown unit {}", room.number, room.parent),
            )),
            [p, rest @ ..] => {
                if !rest.is_empty() {
                    let plots: Vec<String> = candidates.iter().map(|&c| ctx.units[c].plot.to_string()).collect();
                    report.push(Diagnostic::warning(
                        Stage::Rooms,
                        "Rooms.ParentAmbiguous",
                        where_(),
                        format!(
                            "room {} names unit {}, found in plots {}; using plot {}",
                            room.number,
                            room.parent,
                            plots.join(", "),
                            ctx.units[*p].plot
                        ),
                    ));
                }
                by_parent.entry_or_insert_with(*p, Vec::new).push(ri);
            }
        }
    }

    let mut out: Vec<RoomShare> = Vec::new();
    for (&p, members) in by_parent.iter() {
        let parent = &ctx.units[p];
        let inputs: Vec<RoomInput> = members
            .iter()
            .map(|&ri| RoomInput { area_host: rooms[ri].raw_area, area_m2: host_area_to_m2(rooms[ri].raw_area, conv) })
            .collect();

        let gross = metrics[p].gross_area;
        let room_sum = round_area(inputs.iter().map(|r| r.area_m2).sum::<f64>());
        if (room_sum - gross).abs() >= 0.005 {
            report.push(Diagnostic::warning(
                Stage::Rooms,
                "Rooms.AreaMismatch",
                EntityRef::unit(parent),
                format!("rooms of unit {} add up to {room_sum} m², unit area is {gross} m²", parent.number),
            ));
        }

        let alloc = match allocate_rooms(&parent_metrics(&metrics[p]), &inputs, ctx.params.pass_limits.rooms) {
            Ok(a) => a,
            Err(e @ (RoomError::ZeroParentGross | RoomError::NoRooms)) => {
                report.push(Diagnostic::warning(
                    Stage::Rooms,
                    "Calc.ZeroBasis",
                    EntityRef::unit(parent),
                    format!("rooms of unit {} not allocated: {e}", parent.number),
                ));
                continue;
            }
        };

        for mo in &alloc.outcomes {
            let o = mo.outcome;
            if !o.converged {
                report.push(Diagnostic::warning(
                    Stage::Rooms,
                    "Surplus.NotConverged",
                    EntityRef::unit(parent),
                    format!("room {}: residual {} after {} passes (unit {})", mo.metric, o.residual, o.passes, parent.number),
                ));
            }
            log.push(ScopeOutcome {
                plot: parent.plot.to_string(),
                group: Some(parent.group.to_string()),
                unit: Some(parent.number.to_string()),
                metric: mo.metric,
                members: members.len(),
                passes: o.passes,
                adjusted_steps: o.adjusted_steps,
                residual: o.residual,
                converged: o.converged,
            });
        }

        out.extend(members.iter().zip(&alloc.rooms).map(|(&ri, v)| flatten(&rooms[ri], v)));
    }

    out.sort_by(|a, b| a.room.cmp(&b.room).then(a.element.cmp(&b.element)));
    debug!(parents = by_parent.len(), rooms = out.len(), "room shares allocated");
    out
}
