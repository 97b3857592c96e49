//! Spherical geometry on geodetic coordinates.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two GPS coordinates, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from point 1 to point 2, normalized to [0, 360).
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Signed shortest difference from `from` to `to`, in [-180, 180].
pub fn angle_diff_deg(from: f64, to: f64) -> f64 {
    let mut diff = to - from;
    while diff > 180.0 {
        diff -= 360.0;
    }
    while diff < -180.0 {
        diff += 360.0;
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn haversine_of_identical_points_is_zero() {
        assert!(haversine_m(-22.7, -47.6, -22.7, -47.6).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_m(-22.0, -47.6, -23.0, -47.6);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn bearing_points_north_and_east() {
        let north = bearing_deg(-22.7, -47.6, -22.6, -47.6);
        assert!(north.abs() < 1e-6 || (north - 360.0).abs() < 1e-6);

        let east = bearing_deg(0.0, -47.6, 0.0, -47.5);
        assert!((east - 90.0).abs() < 1e-6);
    }

    #[test]
    fn angle_diff_ignores_full_turns() {
        for k in [-3_i32, -1, 0, 1, 4] {
            let shifted = 45.0 + f64::from(k) * 360.0;
            assert!(angle_diff_deg(45.0, shifted).abs() < 1e-9);
        }
    }

    #[test]
    fn angle_diff_wraps_the_short_way() {
        assert!((angle_diff_deg(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((angle_diff_deg(10.0, 350.0) + 20.0).abs() < 1e-9);
        // Exactly opposite headings resolve to +180.
        assert!((angle_diff_deg(0.0, 180.0) - 180.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn haversine_is_symmetric(
            lat1 in -80.0_f64..80.0, lon1 in -179.0_f64..179.0,
            lat2 in -80.0_f64..80.0, lon2 in -179.0_f64..179.0,
        ) {
            let ab = haversine_m(lat1, lon1, lat2, lon2);
            let ba = haversine_m(lat2, lon2, lat1, lon1);
            prop_assert!((ab - ba).abs() < 1e-6 * (1.0 + ab));
        }

        #[test]
        fn angle_diff_stays_in_range(a in -720.0_f64..720.0, b in -720.0_f64..720.0) {
            let d = angle_diff_deg(a, b);
            prop_assert!((-180.0..=180.0).contains(&d));
        }

        #[test]
        fn bearing_is_normalized(
            lat1 in -80.0_f64..80.0, lon1 in -179.0_f64..179.0,
            lat2 in -80.0_f64..80.0, lon2 in -179.0_f64..179.0,
        ) {
            let b = bearing_deg(lat1, lon1, lat2, lon2);
            prop_assert!((0.0..360.0).contains(&b));
        }
    }
}
