// 🧹 Value Normalizer - unit labels, float noise, amounts and dates
//
// Pure functions only. Spreadsheet engines leave artifacts like
// 0.30000000000000004 or -1.4e-14 in computed cells; everything numeric goes
// through `normalize_numeric` before it reaches a financial total.

use crate::grid::Cell;
use chrono::{DateTime, Duration, NaiveDate};

/// Compound unit labels and the short code they collapse to.
const UNIT_MAPPINGS: &[(&str, &str)] = &[
    ("BTL-BOTTLES", "BTL"),
    ("PCS-PIECES", "PCS"),
    ("BOX-BOXES", "BOX"),
    ("JAR-JARS", "JAR"),
    ("PKT-PACKETS", "PKT"),
];

/// Magnitudes below this are spreadsheet noise around zero.
const ZERO_EPSILON: f64 = 1e-10;

/// Collapse a compound unit label to its short code.
///
/// Unknown labels pass through verbatim.
pub fn standardize_unit(raw: &str) -> String {
    for (long_form, short_form) in UNIT_MAPPINGS {
        if raw.contains(long_form) {
            return short_form.to_string();
        }
    }
    raw.to_string()
}

/// Snap near-zero values to 0.0 and round everything else to 2 decimals.
pub fn round_amount(value: f64) -> f64 {
    if value.abs() < ZERO_EPSILON {
        return 0.0;
    }
    let rounded = (value * 100.0).round() / 100.0;
    // -0.004 rounds to -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Cell-level form of [`round_amount`]: non-numeric cells are returned as-is.
pub fn normalize_numeric(value: Cell) -> Cell {
    match value {
        Cell::Number(n) => Cell::Number(round_amount(n)),
        other => other,
    }
}

/// Read an amount out of text, tolerating thousands separators and a
/// trailing percent sign. Unparsable text is `None`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Excel serial day number (1900 date system) to a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Parse a date from the formats seen in stock sheets.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }

    // "2024-01-05 00:00:00" and similar
    text.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Date out of a grid cell: text in a known format or an Excel serial.
pub fn cell_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Number(serial) => excel_serial_to_date(*serial),
        Cell::Text(text) => parse_date(text),
        Cell::Empty => None,
    }
}
