//! COEFFICIENTS: give every unit a price multiplier before C1/C2 is computed.
//!
//! Units without one (absent or 0, already folded to `None` by LOAD) get the
//! table default for their name; `override_all` reassigns every unit.

use tracing::debug;

use ps_core::entities::SpatialUnit;
use ps_core::variables::CoefficientTable;

/// Returns how many units were (re)assigned.
pub fn assign(units: &mut [SpatialUnit], table: &CoefficientTable, override_all: bool) -> usize {
    let mut assigned = 0;
    for u in units.iter_mut() {
        if override_all || u.multiplier.is_none() {
            u.multiplier = Some(table.for_name(&u.name));
            assigned += 1;
        }
    }
    debug!(assigned, override_all, "coefficients assigned");
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::entities::{Category, LocationClass};

    fn unit(name: &str, multiplier: Option<f64>) -> SpatialUnit {
        SpatialUnit {
            element: 1,
            number: "1".parse().unwrap(),
            name: name.into(),
            plot: "P".parse().unwrap(),
            group: "A".parse().unwrap(),
            category: Category::IndividualUnit,
            location: LocationClass::BelowGround,
            entrance: "A".into(),
            level: None,
            raw_area: 1.0,
            primary_link: Default::default(),
            multiplier,
        }
    }

    #[test]
    fn defaults_fill_gaps_only() {
        let mut units = vec![unit("Гараж 1", None), unit("Мазе 2", Some(0.5)), unit("Flat", None)];
        let n = assign(&mut units, &CoefficientTable::default(), false);
        assert_eq!(n, 2);
        let got: Vec<_> = units.iter().map(|u| u.multiplier).collect();
        assert_eq!(got, vec![Some(0.8), Some(0.5), Some(1.0)]);
    }

    #[test]
    fn override_reassigns_everything() {
        let mut units = vec![unit("Мазе 2", Some(0.5))];
        assign(&mut units, &CoefficientTable::default(), true);
        assert_eq!(units[0].multiplier, Some(0.3));
    }
}
