//! Date-of-birth parsing and age derivation

use crate::error::ValidationError;
use chrono::{DateTime, Local, NaiveDate};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d %m %Y"];

/// Parse a date of birth from any of the accepted input shapes
///
/// Accepts `yyyy-MM-dd`, `dd-MM-yyyy`, `dd/MM/yyyy`, `dd MM yyyy`, and
/// RFC 3339 timestamps (the date part is kept).
pub fn parse_date_of_birth(text: &str) -> Result<NaiveDate, ValidationError> {
    let text = text.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(date);
        }
    }

    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.date_naive())
        .map_err(|e| ValidationError::InvalidDate(format!("{text} ({e})")))
}

/// Whole years elapsed between `date_of_birth` and `today`
///
/// Returns 0 when `date_of_birth` lies after `today`.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> u32 {
    today.years_since(date_of_birth).unwrap_or(0)
}

/// The local calendar date
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
