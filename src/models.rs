//! Data models for the ingestion pipeline.
//!
//! A [`RawRecord`] is one input row exactly as read. The normalizer turns it
//! into a [`CanonicalMeasurement`], the validator attaches
//! [`ValidationFlag`]s, and the store persists the result.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

// ---

/// A single scalar cell of an input row.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    // ---
    /// Sentinel for an absent or null cell.
    Missing,
    Number(f64),
    Text(String),
}

impl RawValue {
    // ---
    pub fn is_missing(&self) -> bool {
        matches!(self, RawValue::Missing)
    }

    /// Numeric coercion. Text is trimmed and parsed; non-finite values yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        // ---
        let value = match self {
            RawValue::Missing => return None,
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// Textual form used for identifiers. Integral numbers print without a fraction.
    pub fn as_text(&self) -> Option<String> {
        // ---
        match self {
            RawValue::Missing => None,
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            RawValue::Number(n) => Some(n.to_string()),
            RawValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl Serialize for RawValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // ---
        match self {
            RawValue::Missing => serializer.serialize_none(),
            RawValue::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            RawValue::Number(_) => serializer.serialize_none(),
            RawValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// One input row: field names and values in their original column order.
///
/// Duplicate field names are kept; order matters for last-write-wins
/// resolution in the normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, RawValue)>,
}

impl RawRecord {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<RawValue>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Builder form of [`RawRecord::push`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Case-insensitive lookup of the first field with this name.
    pub fn get_ignore_case(&self, name: &str) -> Option<&RawValue> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Serialize for RawRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // ---
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// The five canonical measurement quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    // ---
    /// Degrees Celsius.
    Temperature,
    /// Percent.
    Humidity,
    /// Hectopascal.
    Pressure,
    /// W/m².
    SolarRadiation,
    /// m/s.
    WindSpeed,
}

impl CanonicalField {
    // ---
    pub const ALL: [CanonicalField; 5] = [
        CanonicalField::Temperature,
        CanonicalField::Humidity,
        CanonicalField::Pressure,
        CanonicalField::SolarRadiation,
        CanonicalField::WindSpeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Temperature => "temperature",
            CanonicalField::Humidity => "humidity",
            CanonicalField::Pressure => "pressure",
            CanonicalField::SolarRadiation => "solar_radiation",
            CanonicalField::WindSpeed => "wind_speed",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        CanonicalField::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown canonical field '{}'", s))
    }
}

/// Kind of data-quality concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagKind {
    Range,
    Consistency,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::Range => "RANGE",
            FlagKind::Consistency => "CONSISTENCY",
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory flag attached to a measurement. Never blocks persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFlag {
    pub kind: FlagKind,
    pub description: String,
}

impl ValidationFlag {
    pub fn new(kind: FlagKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

/// A reading in canonical units, ready for validation and persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMeasurement {
    // ---
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub solar_radiation: Option<f64>,
    pub wind_speed: Option<f64>,
    pub raw_payload: RawRecord,
    pub validation_flags: Vec<ValidationFlag>,
}

impl CanonicalMeasurement {
    // ---
    /// A measurement with every canonical field null and no flags.
    pub fn empty(sensor_id: impl Into<String>, timestamp: DateTime<Utc>, raw: RawRecord) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            temperature: None,
            humidity: None,
            pressure: None,
            solar_radiation: None,
            wind_speed: None,
            raw_payload: raw,
            validation_flags: Vec::new(),
        }
    }

    pub fn get(&self, field: CanonicalField) -> Option<f64> {
        match field {
            CanonicalField::Temperature => self.temperature,
            CanonicalField::Humidity => self.humidity,
            CanonicalField::Pressure => self.pressure,
            CanonicalField::SolarRadiation => self.solar_radiation,
            CanonicalField::WindSpeed => self.wind_speed,
        }
    }

    pub fn set(&mut self, field: CanonicalField, value: Option<f64>) {
        let slot = match field {
            CanonicalField::Temperature => &mut self.temperature,
            CanonicalField::Humidity => &mut self.humidity,
            CanonicalField::Pressure => &mut self.pressure,
            CanonicalField::SolarRadiation => &mut self.solar_radiation,
            CanonicalField::WindSpeed => &mut self.wind_speed,
        };
        *slot = value;
    }

    /// True when no canonical field carries a value.
    pub fn is_blank(&self) -> bool {
        CanonicalField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Attach the validator's flags. The measurement is not modified afterwards.
    pub fn with_flags(mut self, flags: Vec<ValidationFlag>) -> Self {
        self.validation_flags = flags;
        self
    }

    pub fn count_flags(&self, kind: FlagKind) -> usize {
        self.validation_flags.iter().filter(|f| f.kind == kind).count()
    }
}

/// The most recent persisted reading for a sensor, used as the consistency baseline.
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct PriorReading {
    // ---
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PriorReading {
    pub fn get(&self, field: CanonicalField) -> Option<f64> {
        match field {
            CanonicalField::Temperature => self.temperature,
            CanonicalField::Humidity => self.humidity,
            CanonicalField::Pressure => self.pressure,
            _ => None,
        }
    }
}
