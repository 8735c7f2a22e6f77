//! Batch driver: raw rows in, persisted measurements out.
//!
//! Rows are processed one at a time in input order. For each row:
//! 1. normalize (resolver + unit conversion)
//! 2. read the sensor's latest stored reading
//! 3. validate against ranges and that reading
//! 4. persist measurement and flags in one unit of work
//!
//! The history read and the write are not locked together, so a concurrent
//! writer can move the baseline between steps 2 and 4.

use std::fmt;

use crate::error::Result;
use crate::models::{CanonicalMeasurement, FlagKind, RawRecord};
use crate::normalize::RowNormalizer;
use crate::store::MeasurementStore;
use crate::validate::Validator;

// ---

/// What to do when a row fails to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnRowError {
    /// Stop the batch and return the error.
    #[default]
    Abort,
    /// Log, count, and continue with the next row.
    Continue,
}

/// Counters for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    // ---
    pub rows_read: usize,
    pub rows_persisted: usize,
    pub rows_without_fields: usize,
    pub range_flags: usize,
    pub consistency_flags: usize,
    pub rows_failed: usize,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.rows_failed == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        writeln!(f, "Ingestion summary:")?;
        writeln!(f, "  rows read          : {}", self.rows_read)?;
        writeln!(f, "  rows persisted     : {}", self.rows_persisted)?;
        writeln!(f, "  rows w/o fields    : {}", self.rows_without_fields)?;
        writeln!(f, "  RANGE flags        : {}", self.range_flags)?;
        writeln!(f, "  CONSISTENCY flags  : {}", self.consistency_flags)?;
        write!(f, "  rows failed        : {}", self.rows_failed)
    }
}

pub struct Pipeline<S> {
    normalizer: RowNormalizer,
    validator: Validator,
    store: S,
    procedure_version: String,
}

impl<S: MeasurementStore> Pipeline<S> {
    // ---
    pub fn new(
        normalizer: RowNormalizer,
        validator: Validator,
        store: S,
        procedure_version: impl Into<String>,
    ) -> Self {
        Self {
            normalizer,
            validator,
            store,
            procedure_version: procedure_version.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Normalize and validate one row without persisting it.
    pub async fn prepare(&self, raw: RawRecord) -> Result<CanonicalMeasurement> {
        // ---
        let candidate = self.normalizer.normalize(raw);
        let prior = self.store.latest_for_sensor(&candidate.sensor_id).await?;
        let flags = self.validator.validate(&candidate, prior.as_ref());
        Ok(candidate.with_flags(flags))
    }

    /// Normalize, validate and persist one row.
    pub async fn ingest_row(&self, raw: RawRecord) -> Result<CanonicalMeasurement> {
        // ---
        let measurement = self.prepare(raw).await?;
        self.store
            .persist(&measurement, &self.procedure_version)
            .await?;
        Ok(measurement)
    }

    /// Ingest rows in order. `on_row` sees every persisted measurement.
    pub async fn run_batch<I, F>(
        &self,
        rows: I,
        policy: OnRowError,
        mut on_row: F,
    ) -> Result<BatchReport>
    where
        I: IntoIterator<Item = RawRecord>,
        F: FnMut(&CanonicalMeasurement),
    {
        // ---
        let mut report = BatchReport::default();

        for (index, raw) in rows.into_iter().enumerate() {
            report.rows_read += 1;

            match self.ingest_row(raw).await {
                Ok(measurement) => {
                    report.rows_persisted += 1;
                    if measurement.is_blank() {
                        report.rows_without_fields += 1;
                    }
                    report.range_flags += measurement.count_flags(FlagKind::Range);
                    report.consistency_flags += measurement.count_flags(FlagKind::Consistency);
                    on_row(&measurement);
                }
                Err(e) if policy == OnRowError::Continue => {
                    tracing::error!("Row {} failed, continuing: {}", index + 1, e);
                    report.rows_failed += 1;
                }
                Err(e) => {
                    tracing::error!("Row {} failed, aborting batch: {}", index + 1, e);
                    return Err(e);
                }
            }
        }

        tracing::info!(
            "Batch complete: {} read, {} persisted, {} failed",
            report.rows_read,
            report.rows_persisted,
            report.rows_failed
        );
        Ok(report)
    }
}
