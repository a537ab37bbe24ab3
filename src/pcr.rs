//! PCR arithmetic.
//!
//! PCR values here are the 33-bit base counter at 90 kHz. The counter wraps
//! roughly every 26.5 hours, so ordering is only meaningful under the
//! assumption that two compared values lie within half the modulus of each
//! other (about 13.27 hours).

use chrono::{DateTime, Utc};

/// Exclusive upper bound of the 33-bit PCR base counter.
pub const PCR_UPPER_BOUND: i64 = 1 << 33;

/// PCR base ticks per millisecond (90 kHz).
pub const PCR_TICKS_PER_MS: i64 = 90;

/// Compare two PCR values taking the wrap-around into account.
///
/// The sign of the result orders `lhs` against `rhs`; zero means equal.
/// Correct while the true interval between the values is less than half of
/// [`PCR_UPPER_BOUND`].
pub fn compare_pcr(lhs: i64, rhs: i64) -> i64 {
    let a = lhs - rhs;
    let b = lhs - (PCR_UPPER_BOUND + rhs);
    if a.abs() < b.abs() {
        a
    } else {
        b
    }
}

/// Project a wall-clock instant onto the PCR axis.
///
/// `clock_pcr` is the PCR observed at `clock_time`; the result is normalized
/// into `[0, PCR_UPPER_BOUND)`.
pub fn time_to_pcr(time: DateTime<Utc>, clock_time: DateTime<Utc>, clock_pcr: i64) -> i64 {
    let ms = (time - clock_time).num_milliseconds();
    let mut pcr = clock_pcr + ms * PCR_TICKS_PER_MS;
    while pcr < 0 {
        pcr += PCR_UPPER_BOUND;
    }
    pcr % PCR_UPPER_BOUND
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_compare_equal() {
        assert_eq!(compare_pcr(0, 0), 0);
        assert_eq!(compare_pcr(1234, 1234), 0);
    }

    #[test]
    fn test_compare_plain_ordering() {
        assert!(compare_pcr(100, 50) > 0);
        assert!(compare_pcr(50, 100) < 0);
    }

    #[test]
    fn test_compare_antisymmetric() {
        for &(a, b) in &[(0i64, 1i64), (90_000, 0), (10, PCR_UPPER_BOUND - 10)] {
            let forward = compare_pcr(a, b);
            let backward = compare_pcr(b, a);
            assert_eq!(forward.signum(), -backward.signum(), "({}, {})", a, b);
        }
    }

    #[test]
    fn test_compare_across_wrap() {
        // 10 is "after" UPPER-10 under the half-modulus assumption.
        assert!(compare_pcr(10, PCR_UPPER_BOUND - 10) > 0);
        assert!(compare_pcr(PCR_UPPER_BOUND - 10, 10) < 0);
    }

    #[test]
    fn test_time_to_pcr_identity() {
        let t = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(time_to_pcr(t, t, 0), 0);
        assert_eq!(time_to_pcr(t, t, 12345), 12345);
        assert_eq!(time_to_pcr(t, t, PCR_UPPER_BOUND + 7), 7);
    }

    #[test]
    fn test_time_to_pcr_90_ticks_per_ms() {
        let clock = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        for offset_ms in [-12 * 3600 * 1000i64, -1, 0, 1, 12 * 3600 * 1000] {
            let t = clock + chrono::Duration::milliseconds(offset_ms);
            let a = time_to_pcr(t, clock, 500_000);
            let b = time_to_pcr(t + chrono::Duration::milliseconds(1), clock, 500_000);
            assert_eq!((b - a).rem_euclid(PCR_UPPER_BOUND), 90, "at {} ms", offset_ms);
        }
    }

    #[test]
    fn test_time_to_pcr_underflow_wraps() {
        let clock = Utc.with_ymd_and_hms(2021, 1, 1, 3, 0, 0).unwrap();
        // Two hours before the reference with clock_pcr = 0.
        let t = Utc.with_ymd_and_hms(2021, 1, 1, 1, 0, 0).unwrap();
        let expected = PCR_UPPER_BOUND - 2 * 3600 * 1000 * PCR_TICKS_PER_MS;
        assert_eq!(time_to_pcr(t, clock, 0), expected);
    }
}
