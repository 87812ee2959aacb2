//! Rounding, resolution steps and host-unit conversion.
//!
//! Contract:
//! - Every rounding is half-away-from-zero at a fixed number of decimals.
//! - Percentages carry 3 decimals (step 0.001); areas carry 2 (step 0.01).
//! - Host geometry arrives in square feet / feet and is converted only at the
//!   boundary (ingestion and write-back).

/// Square feet per square metre.
pub const AREA_CONVERT: f64 = 10.7639104167096;
/// Centimetres per foot.
pub const LENGTH_CONVERT: f64 = 30.48;

pub const PERCENT_DECIMALS: u32 = 3;
pub const AREA_DECIMALS: u32 = 2;

/// Smallest representable percentage correction.
pub const PERCENT_STEP: f64 = 0.001;
/// Smallest representable area correction (m²).
pub const AREA_STEP: f64 = 0.01;

/// Round half away from zero at `decimals` places.
#[inline]
pub fn round_to(x: f64, decimals: u32) -> f64 {
    let p = 10f64.powi(decimals as i32);
    let r = (x * p).round() / p;
    // avoid handing out -0.0
    if r == 0.0 { 0.0 } else { r }
}

#[inline]
pub fn round_pct(x: f64) -> f64 {
    round_to(x, PERCENT_DECIMALS)
}

#[inline]
pub fn round_area(x: f64) -> f64 {
    round_to(x, AREA_DECIMALS)
}

/// Host area (ft²) → m², rounded to 2 decimals.
#[inline]
pub fn host_area_to_m2(raw: f64, area_convert: f64) -> f64 {
    round_area(raw / area_convert)
}

/// m² → host area (ft²). Not rounded: the host stores full precision.
#[inline]
pub fn m2_to_host_area(m2: f64, area_convert: f64) -> f64 {
    m2 * area_convert
}

/// Host length (ft) → cm, rounded to whole centimetres.
#[inline]
pub fn host_length_to_cm(raw: f64, length_convert: f64) -> f64 {
    round_to(raw * length_convert, 0)
}

/// `part / whole * 100` rounded to 3 decimals; 0 when `whole` is 0.
#[inline]
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole == 0.0 { 0.0 } else { round_pct(part * 100.0 / whole) }
}

/// `pct / 100 * total` rounded to 2 decimals.
#[inline]
pub fn area_share(pct: f64, total: f64) -> f64 {
    round_area(pct * total / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(0.5, 0), 1.0);
        assert_eq!(round_to(-0.5, 0), -1.0);
        assert_eq!(round_pct(0.0625), 0.063);
        assert_eq!(round_pct(-0.0625), -0.063);
        assert_eq!(round_pct(-0.0004), 0.0);
        assert_eq!(round_area(12.344), 12.34);
    }

    #[test]
    fn negative_zero_is_normalized() {
        assert!(round_pct(-0.0001).is_sign_positive());
    }

    #[test]
    fn conversion_uses_fixed_coefficients() {
        assert_eq!(host_area_to_m2(AREA_CONVERT * 50.0, AREA_CONVERT), 50.0);
        assert_eq!(host_length_to_cm(10.0, LENGTH_CONVERT), 305.0);
        let back = m2_to_host_area(50.0, AREA_CONVERT);
        assert!((back - 538.19552083548).abs() < 1e-9);
    }

    #[test]
    fn shares_guard_zero_basis() {
        assert_eq!(percent_of(5.0, 0.0), 0.0);
        assert_eq!(percent_of(40.0, 100.0), 40.0);
        assert_eq!(area_share(60.0, 100.0), 60.0);
    }
}
