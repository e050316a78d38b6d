//! Item value normalization
//!
//! Converts a raw record value into the string the target expects:
//! - integral numbers lose any fractional part (`5.0` → `"5"`)
//! - other numbers use their shortest decimal form
//! - date or datetime text (day-first) becomes ISO `YYYY-MM-DD`
//! - anything else is trimmed

use crate::models::records::ItemValue;
use edcm_common::time::{format_iso_date, parse_day_first_date};

/// Largest magnitude at which every integral f64 still fits in i64
const I64_SAFE: f64 = 9_007_199_254_740_992.0;

/// Normalize a value for submission
///
/// Returns `None` for null markers and values that are blank after trimming.
pub fn normalize_value(value: &ItemValue) -> Option<String> {
    if value.is_null() {
        return None;
    }

    let normalized = match value {
        ItemValue::Bool(b) => b.to_string(),
        ItemValue::Integer(i) => i.to_string(),
        ItemValue::Float(f) => normalize_float(*f),
        ItemValue::Text(text) => normalize_text(text),
    };

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn normalize_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < I64_SAFE {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    match parse_day_first_date(trimmed) {
        Some(date) => format_iso_date(date),
        None => trimmed.to_string(),
    }
}
