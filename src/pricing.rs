//! Date-range pricing.
//!
//! All day-count and total-price math lives here so every call site agrees
//! on the rounding policy: a booking always costs at least one day, even
//! when start and end fall on the same date.

use chrono::NaiveDate;
use serde::Serialize;

/// Minor units (cents) per major currency unit.
pub const MINOR_UNIT_FACTOR: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceQuote {
    pub days: i64,
    pub total_price: f64,
}

/// Computes the billable day count and total for a date range at the given
/// per-day rate. Prices stay in major units (dollars); conversion to cents
/// happens only at the payment-processor boundary via [`to_minor_units`].
pub fn quote(start_date: NaiveDate, end_date: NaiveDate, day_price: f64) -> PriceQuote {
    let days = (end_date - start_date).num_days().max(1);
    PriceQuote {
        days,
        total_price: days as f64 * day_price,
    }
}

/// Converts a major-unit total to integer minor units, rounding half away
/// from zero. Applied once, right before the checkout API call.
pub fn to_minor_units(total_price: f64) -> i64 {
    (total_price * MINOR_UNIT_FACTOR).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn three_day_booking_at_100_costs_300() {
        let q = quote(date("2025-06-01"), date("2025-06-04"), 100.0);
        assert_eq!(q.days, 3);
        assert_eq!(q.total_price, 300.0);
        assert_eq!(to_minor_units(q.total_price), 30000);
    }

    #[test]
    fn same_day_booking_floors_to_one_day() {
        let q = quote(date("2025-06-01"), date("2025-06-01"), 80.0);
        assert_eq!(q.days, 1);
        assert_eq!(q.total_price, 80.0);
    }

    #[test]
    fn single_night_is_one_day() {
        let q = quote(date("2025-06-01"), date("2025-06-02"), 49.99);
        assert_eq!(q.days, 1);
        assert_eq!(to_minor_units(q.total_price), 4999);
    }

    #[test]
    fn zero_rate_yields_zero_total() {
        let q = quote(date("2025-06-01"), date("2025-06-08"), 0.0);
        assert_eq!(q.days, 7);
        assert_eq!(q.total_price, 0.0);
        assert_eq!(to_minor_units(q.total_price), 0);
    }

    #[test]
    fn minor_units_round_half_up() {
        assert_eq!(to_minor_units(10.005), 1001);
        assert_eq!(to_minor_units(10.004), 1000);
    }

    proptest! {
        // For any valid range and rate: total == days * rate and days >= 1.
        #[test]
        fn total_is_days_times_rate(offset in 0i64..3650, span in 1i64..365, rate in 0.0f64..10_000.0) {
            let start = date("2025-01-01") + chrono::Duration::days(offset);
            let end = start + chrono::Duration::days(span);
            let q = quote(start, end, rate);
            prop_assert!(q.days >= 1);
            prop_assert_eq!(q.days, span);
            prop_assert_eq!(q.total_price, q.days as f64 * rate);
        }
    }
}
