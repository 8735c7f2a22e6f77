//! Row normalization: raw record to canonical measurement.
//!
//! The normalizer never fails. Unrecognized columns are dropped, values that
//! don't coerce to a number are dropped, and an unusable timestamp falls back
//! to the current time. Validation happens afterwards in
//! [`Validator`](crate::validate::Validator).

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::models::{CanonicalField, CanonicalMeasurement, RawRecord, RawValue};
use crate::resolver::{UnitHint, VariableResolver};
use crate::units::{f_to_c, fraction_to_percent, pa_to_hpa, round3};

// ---

/// Timestamp columns in priority order. Earlier aliases win.
pub const TIMESTAMP_ALIASES: [&str; 5] = ["time", "timestamp", "ts", "datetime", "date"];

/// Columns that are never treated as measurements.
const RESERVED_FIELDS: [&str; 4] = ["sensor_id", "sensor", "lat", "lon"];

pub const UNKNOWN_SENSOR: &str = "unknown";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f %z"];

pub struct RowNormalizer {
    resolver: Arc<VariableResolver>,
}

impl RowNormalizer {
    // ---
    pub fn new(resolver: Arc<VariableResolver>) -> Self {
        Self { resolver }
    }

    /// Normalize one row. Flags are left empty.
    pub fn normalize(&self, raw: RawRecord) -> CanonicalMeasurement {
        // ---
        let timestamp = parse_timestamp(&raw).unwrap_or_else(Utc::now);
        let sensor_id = resolve_sensor_id(&raw);
        let mut measurement = CanonicalMeasurement::empty(sensor_id, timestamp, RawRecord::new());

        for (name, value) in raw.iter() {
            if is_reserved(name) || value.is_missing() {
                continue;
            }
            let Some((field, hint)) = self.resolver.resolve(name) else {
                tracing::trace!("Dropping unrecognized field '{}'", name);
                continue;
            };
            let Some(number) = value.as_f64() else {
                tracing::debug!("Dropping non-numeric value {:?} for '{}'", value, name);
                continue;
            };
            // Later aliases of the same quantity overwrite earlier ones.
            measurement.set(field, Some(convert(field, hint, number)));
        }

        measurement.raw_payload = raw;
        measurement
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS
        .iter()
        .chain(TIMESTAMP_ALIASES.iter())
        .any(|r| r.eq_ignore_ascii_case(name))
}

/// Apply the unit conversion for one canonical field.
pub fn convert(field: CanonicalField, hint: Option<UnitHint>, value: f64) -> f64 {
    // ---
    match field {
        CanonicalField::Temperature if hint == Some(UnitHint::Fahrenheit) => f_to_c(value),
        CanonicalField::Pressure if hint == Some(UnitHint::Pascal) => pa_to_hpa(value),
        CanonicalField::Humidity if (0.0..=1.0).contains(&value) => fraction_to_percent(value),
        _ => round3(value),
    }
}

/// `sensor_id`, else `sensor`, else [`UNKNOWN_SENSOR`]. Blank values fall through.
pub fn resolve_sensor_id(raw: &RawRecord) -> String {
    // ---
    ["sensor_id", "sensor"]
        .iter()
        .filter_map(|name| raw.get_ignore_case(name))
        .filter_map(RawValue::as_text)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_SENSOR.to_string())
}

/// First alias that is present and parses. `None` if no alias yields a timestamp.
pub fn parse_timestamp(raw: &RawRecord) -> Option<DateTime<Utc>> {
    // ---
    TIMESTAMP_ALIASES.iter().find_map(|alias| {
        let value = raw.get_ignore_case(alias)?;
        let parsed = parse_timestamp_value(value);
        if parsed.is_none() && !value.is_missing() {
            tracing::debug!("Unparseable timestamp in '{}': {:?}", alias, value);
        }
        parsed
    })
}

/// Parse a single timestamp cell as a UTC instant.
///
/// Numbers are Unix epoch seconds. Text without an offset is taken as UTC.
pub fn parse_timestamp_value(value: &RawValue) -> Option<DateTime<Utc>> {
    // ---
    let text = match value {
        RawValue::Missing => return None,
        RawValue::Number(secs) => return epoch_seconds(*secs),
        RawValue::Text(s) => s.trim(),
    };
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    text.parse::<f64>().ok().and_then(epoch_seconds)
}

fn epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    // ---
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}
