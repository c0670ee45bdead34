//
// ddwdome - Digital Dome Works (DDW) dome controller driver
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Tick/degree conversion.
//!
//! The DDW controller reports rotation as raw encoder ticks; one full dome
//! revolution corresponds to the `DTICKS` calibration value from the INF
//! record. The number of degrees in a full circle is a parameter because some
//! firmware revisions map a revolution to 359 degrees rather than 360.
//!

/// Converts raw encoder ticks to degrees of azimuth.
///
/// `steps_per_rev` must be non-zero (it comes from the `DTICKS` field of a
/// parsed INF record; the driver never converts before having one).
pub fn ticks_to_degrees(ticks: f64, steps_per_rev: u32, circle_degrees: f64) -> f64 {
    (circle_degrees / steps_per_rev as f64) * ticks
}

/// Inverse of [`ticks_to_degrees`].
pub fn degrees_to_ticks(degrees: f64, steps_per_rev: u32, circle_degrees: f64) -> f64 {
    degrees * steps_per_rev as f64 / circle_degrees
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_full_revolution_conversion_yields_full_circle() {
        for steps_per_rev in [1u32, 7, 701, 10000].iter() {
            assert_eq!(360.0, ticks_to_degrees(*steps_per_rev as f64, *steps_per_rev, 360.0));
        }
    }

    #[test]
    fn given_zero_ticks_conversion_yields_zero() {
        assert_eq!(0.0, ticks_to_degrees(0.0, 701, 360.0));
    }

    #[test]
    fn given_sample_inf_values_azimuth_matches() {
        let az = ticks_to_degrees(527.0, 701, 360.0);
        assert!((az - 270.64).abs() < 0.01);
    }

    #[test]
    fn given_359_degree_circle_conversion_uses_it() {
        assert_eq!(359.0, ticks_to_degrees(701.0, 701, 359.0));
    }

    #[test]
    fn given_round_trip_value_is_preserved() {
        let ticks = degrees_to_ticks(ticks_to_degrees(350.0, 701, 360.0), 701, 360.0);
        assert!((ticks - 350.0).abs() < 1.0e-9);
    }
}
