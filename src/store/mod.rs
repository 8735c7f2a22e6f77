//! Storage sink for validated measurements.
//!
//! The pipeline talks to storage only through [`MeasurementStore`]:
//! - a point-read of the most recent reading for a sensor
//! - an atomic persist of one measurement (sensor ensure, upsert keyed by
//!   `(sensor_id, timestamp)`, flag inserts)
//!
//! [`PgStore`] is the production implementation. [`MemoryStore`] keeps the
//! same semantics in process and backs dry runs and tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CanonicalMeasurement, PriorReading};

mod memory;
mod postgres;

pub use memory::{MemoryStore, StoredMeasurement};
pub use postgres::PgStore;

// ---

#[async_trait]
pub trait MeasurementStore: Send + Sync {
    // ---
    /// Most recent stored reading for `sensor_id`, by descending timestamp.
    async fn latest_for_sensor(&self, sensor_id: &str) -> Result<Option<PriorReading>>;

    /// Persist one measurement and its flags as a single unit of work.
    ///
    /// Creates the sensor with placeholder metadata if it is unknown, inserts
    /// or overwrites the measurement for `(sensor_id, timestamp)`, then
    /// appends every flag. Flags from earlier ingestions of the same key are
    /// kept. Returns the measurement's identity key.
    async fn persist(&self, measurement: &CanonicalMeasurement, procedure_version: &str)
        -> Result<i64>;
}
