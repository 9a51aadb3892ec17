//! OLE date (`VT_DATE`) conversion.
//!
//! An OLE date is a 64-bit float counting days since 1899-12-30 UTC, with
//! the fractional part representing the time of day as a fraction of 24
//! hours.

use chrono::{DateTime, LocalResult, TimeZone, Utc};

/// Days between the OLE epoch (1899-12-30) and the Unix epoch
/// (1970-01-01), as used by the reference converter.
const EPOCH_DIFFERENCE_DAYS: f64 = 25569.0;

/// Seconds in a day.
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Convert a UTC instant to its OLE date representation.
#[must_use]
pub fn datetime_to_vnt_date(dt: DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 / SECONDS_PER_DAY + EPOCH_DIFFERENCE_DAYS
}

/// Convert an OLE date back to a UTC instant.
///
/// Sub-second precision is discarded: the reference implementation rounds
/// through whole-second Unix timestamps, and this keeps `encode(decode(x))`
/// stable for the timestamps this protocol actually carries.
#[must_use]
pub fn vnt_date_to_datetime(vnt_date: f64) -> DateTime<Utc> {
    let unix_seconds = ((vnt_date - EPOCH_DIFFERENCE_DAYS) * SECONDS_PER_DAY).round() as i64;
    match Utc.timestamp_opt(unix_seconds, 0) {
        LocalResult::Single(dt) => dt,
        // `timestamp_opt` only rejects values outside the representable
        // range; there is no meaningful "closest" instant to fall back to.
        LocalResult::None | LocalResult::Ambiguous(..) => DateTime::<Utc>::MIN_UTC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unix_epoch_is_25569() {
        let unix_epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(datetime_to_vnt_date(unix_epoch), 25569.0);
    }

    #[test]
    fn vnt_date_25569_is_unix_epoch() {
        assert_eq!(vnt_date_to_datetime(25569.0), Utc.timestamp_opt(0, 0).unwrap());
    }

    #[test]
    fn half_day_is_noon() {
        let noon = Utc.timestamp_opt(12 * 3600, 0).unwrap();
        assert_eq!(datetime_to_vnt_date(noon), 25569.5);
        assert_eq!(vnt_date_to_datetime(25569.5), noon);
    }
}
