//! Plausibility and consistency checks for canonical measurements.
//!
//! Two independent checks run on every candidate:
//! - range: each non-null field against a fixed physical interval
//! - consistency: temperature, humidity and pressure against the sensor's
//!   most recent stored reading
//!
//! Both only produce [`ValidationFlag`]s. Nothing here rejects a write.

use crate::models::{CanonicalField, CanonicalMeasurement, FlagKind, PriorReading, ValidationFlag};

// ---

/// Inclusive plausibility interval per canonical field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

pub fn plausible_range(field: CanonicalField) -> Range {
    // ---
    let (low, high) = match field {
        CanonicalField::Temperature => (-60.0, 60.0),
        CanonicalField::Humidity => (0.0, 100.0),
        CanonicalField::Pressure => (300.0, 1100.0),
        CanonicalField::SolarRadiation => (0.0, 2000.0),
        CanonicalField::WindSpeed => (0.0, 100.0),
    };
    Range { low, high }
}

/// Maximum change from the prior reading before a consistency flag is raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsistencyThresholds {
    pub temperature: f64,
    pub humidity: f64,
    /// `None` disables the pressure comparison.
    pub pressure: Option<f64>,
}

impl Default for ConsistencyThresholds {
    fn default() -> Self {
        Self {
            temperature: 10.0,
            humidity: 30.0,
            pressure: Some(50.0),
        }
    }
}

impl ConsistencyThresholds {
    fn for_field(&self, field: CanonicalField) -> Option<f64> {
        match field {
            CanonicalField::Temperature => Some(self.temperature),
            CanonicalField::Humidity => Some(self.humidity),
            CanonicalField::Pressure => self.pressure,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    thresholds: ConsistencyThresholds,
}

impl Validator {
    // ---
    pub fn new(thresholds: ConsistencyThresholds) -> Self {
        Self { thresholds }
    }

    /// Range flags first, then consistency flags.
    pub fn validate(
        &self,
        candidate: &CanonicalMeasurement,
        prior: Option<&PriorReading>,
    ) -> Vec<ValidationFlag> {
        // ---
        let mut flags = range_flags(candidate);
        if let Some(prior) = prior {
            flags.extend(self.consistency_flags(candidate, prior));
        }
        flags
    }

    /// Compare against the prior reading. Skipped entirely when the prior has no timestamp.
    pub fn consistency_flags(
        &self,
        candidate: &CanonicalMeasurement,
        prior: &PriorReading,
    ) -> Vec<ValidationFlag> {
        // ---
        if prior.timestamp.is_none() {
            return Vec::new();
        }

        CanonicalField::ALL
            .iter()
            .filter_map(|&field| {
                let threshold = self.thresholds.for_field(field)?;
                let new = candidate.get(field)?;
                let old = prior.get(field)?;
                let delta = (new - old).abs();
                (delta > threshold).then(|| {
                    ValidationFlag::new(
                        FlagKind::Consistency,
                        format!(
                            "{} change {} vs {} (delta {} > {})",
                            field,
                            new,
                            old,
                            crate::units::round3(delta),
                            threshold
                        ),
                    )
                })
            })
            .collect()
    }
}

/// Flag every non-null field outside its plausibility interval.
pub fn range_flags(candidate: &CanonicalMeasurement) -> Vec<ValidationFlag> {
    // ---
    CanonicalField::ALL
        .iter()
        .filter_map(|&field| {
            let value = candidate.get(field)?;
            let Range { low, high } = plausible_range(field);
            let violated = if value < low {
                format!("below minimum {}", low)
            } else if value > high {
                format!("above maximum {}", high)
            } else {
                return None;
            };
            Some(ValidationFlag::new(
                FlagKind::Range,
                format!("{}={} out of range [{}, {}]: {}", field, value, low, high, violated),
            ))
        })
        .collect()
}
