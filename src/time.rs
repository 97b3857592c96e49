use chrono::{DateTime, Utc};

pub type Timestamp = DateTime<Utc>;

/// Signed elapsed seconds from `earlier` to `later`.
pub fn seconds_between(later: &Timestamp, earlier: &Timestamp) -> f64 {
    later.signed_duration_since(*earlier).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_seconds_are_signed() {
        let t0: Timestamp = "2026-03-01T12:00:00Z".parse().unwrap();
        let t1: Timestamp = "2026-03-01T12:00:10Z".parse().unwrap();

        assert!((seconds_between(&t1, &t0) - 10.0).abs() < f64::EPSILON);
        assert!((seconds_between(&t0, &t1) + 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn trailing_z_parses_as_utc() {
        let t: Timestamp = "2026-03-01T12:00:00Z".parse().unwrap();
        assert_eq!(t.timezone(), Utc);
    }
}
