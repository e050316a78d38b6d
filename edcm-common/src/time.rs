//! Date utilities
//!
//! Source data arrives with day-first dates (`02-01-2024` is 2 January).
//! Everything sent to the target uses ISO `YYYY-MM-DD`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

/// Day-first and ISO date layouts, tried in order
const DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d%b%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%m-%y",
    "%d/%m/%y",
];

/// Time suffixes accepted after any date layout
const TIME_SUFFIXES: &[&str] = &[" %H:%M:%S", " %H:%M", "T%H:%M:%S", "T%H:%M:%S%.f"];

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a date or datetime string using the day-first convention
///
/// Returns `None` when no known layout matches.
pub fn parse_day_first_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if plausible_year(format, date) {
                return Some(date);
            }
        }
    }

    for format in DATE_FORMATS {
        for suffix in TIME_SUFFIXES {
            let layout = format!("{}{}", format, suffix);
            if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, &layout) {
                let date = datetime.date();
                if plausible_year(format, date) {
                    return Some(date);
                }
            }
        }
    }

    None
}

/// Format a date as ISO `YYYY-MM-DD`
pub fn format_iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// `%Y` happily reads "24" as year 24; leave two-digit years to the `%y` layouts.
fn plausible_year(format: &str, date: NaiveDate) -> bool {
    !format.contains("%Y") || date.year() >= 1000
}
