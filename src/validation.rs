//! Structural and temporal validation of booking intents.
//!
//! Validation is purely local: it never consults existing reservations, so
//! double-booking prevention is out of scope here. The return value maps
//! field names to human-readable messages; an empty map means valid. The
//! check is side-effect free and cheap enough to run on every keystroke.

use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub type FieldErrors = BTreeMap<&'static str, String>;

/// A user's not-yet-paid request to reserve a venue for a date range.
/// Dates stay as strings until validation parses them, so malformed input
/// surfaces as a field error rather than a deserialization failure.
#[derive(Debug, Clone)]
pub struct BookingIntent {
    pub name: String,
    pub phone: String,
    pub start_date: String,
    pub end_date: String,
}

impl BookingIntent {
    /// Validates against today's date; returns field-level errors, empty when valid.
    pub fn validate(&self, today: NaiveDate) -> FieldErrors {
        let mut errors = FieldErrors::new();

        if self.name.trim().len() < 2 {
            errors.insert("name", "Name is required".to_string());
        }

        if !is_valid_phone(&self.phone) {
            errors.insert("phone", "Invalid phone number".to_string());
        }

        let start = match self.parse_date(&self.start_date) {
            Some(d) => Some(d),
            None => {
                errors.insert("startDate", "Start date is required".to_string());
                None
            }
        };
        let end = match self.parse_date(&self.end_date) {
            Some(d) => Some(d),
            None => {
                errors.insert("endDate", "End date is required".to_string());
                None
            }
        };

        if let Some(start) = start {
            if start < today {
                errors.insert("startDate", "Start date cannot be in the past".to_string());
            }
            if let Some(end) = end {
                if end <= start {
                    errors.insert("endDate", "End date must be after start date".to_string());
                }
            }
        }

        errors
    }

    /// Both dates, parsed. Only meaningful after a successful `validate`.
    pub fn dates(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.parse_date(&self.start_date)?, self.parse_date(&self.end_date)?))
    }

    fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
    }
}

// Optional leading '+', then 7-15 ASCII digits.
fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && (7..=15).contains(&digits.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::parse_from_str("2025-06-01", DATE_FORMAT).unwrap()
    }

    fn intent(name: &str, phone: &str, start: &str, end: &str) -> BookingIntent {
        BookingIntent {
            name: name.to_string(),
            phone: phone.to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
        }
    }

    #[test]
    fn accepts_a_well_formed_intent() {
        let errors = intent("Alice", "+12025550123", "2025-06-01", "2025-06-04").validate(today());
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn rejects_past_start_date() {
        let errors = intent("Alice", "+12025550123", "2025-05-31", "2025-06-04").validate(today());
        assert_eq!(
            errors.get("startDate").map(String::as_str),
            Some("Start date cannot be in the past")
        );
    }

    #[test]
    fn rejects_end_not_after_start() {
        for end in ["2025-06-03", "2025-06-01"] {
            let errors = intent("Alice", "1234567", "2025-06-03", end).validate(today());
            assert_eq!(
                errors.get("endDate").map(String::as_str),
                Some("End date must be after start date"),
                "end = {end}"
            );
        }
    }

    #[test]
    fn rejects_short_name() {
        let errors = intent("A", "1234567", "2025-06-02", "2025-06-04").validate(today());
        assert!(errors.contains_key("name"));
    }

    #[test]
    fn rejects_bad_phone_numbers() {
        for phone in ["123456", "1234567890123456", "+12a34567", "", "+"] {
            let errors = intent("Alice", phone, "2025-06-02", "2025-06-04").validate(today());
            assert!(errors.contains_key("phone"), "phone {phone:?} should fail");
        }
    }

    #[test]
    fn accepts_phone_without_plus() {
        let errors = intent("Alice", "2025550123", "2025-06-02", "2025-06-04").validate(today());
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_dates_report_both_fields() {
        let errors = intent("Alice", "1234567", "", "not-a-date").validate(today());
        assert!(errors.contains_key("startDate"));
        assert!(errors.contains_key("endDate"));
    }

    #[test]
    fn validation_is_repeatable() {
        let i = intent("Alice", "1234567", "2025-06-02", "2025-06-04");
        assert_eq!(i.validate(today()), i.validate(today()));
    }
}
