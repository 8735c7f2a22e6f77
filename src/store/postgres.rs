//! Postgres-backed measurement store.
//!
//! Each call to [`PgStore::persist`] runs in its own transaction. If any
//! statement fails the transaction is dropped (rolled back), the failure is
//! logged with the sensor and timestamp, and the error is returned to the
//! caller. Nothing is retried here.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use super::MeasurementStore;
use crate::error::{IngestError, Result};
use crate::models::{CanonicalMeasurement, PriorReading, ValidationFlag};

// ---

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn persist_in_tx(
        &self,
        measurement: &CanonicalMeasurement,
        procedure_version: &str,
    ) -> std::result::Result<i64, sqlx::Error> {
        // ---
        let mut tx = self.pool.begin().await?;

        ensure_sensor(&mut tx, &measurement.sensor_id).await?;
        let measurement_id = upsert_measurement(&mut tx, measurement, procedure_version).await?;
        for flag in &measurement.validation_flags {
            insert_flag(&mut tx, measurement_id, flag).await?;
        }

        tx.commit().await?;
        Ok(measurement_id)
    }
}

#[async_trait]
impl MeasurementStore for PgStore {
    // ---
    async fn latest_for_sensor(&self, sensor_id: &str) -> Result<Option<PriorReading>> {
        // ---
        let prior = sqlx::query_as::<_, PriorReading>(
            r#"
            SELECT temperature, humidity, pressure, "timestamp"
            FROM measurement
            WHERE sensor_id = $1
            ORDER BY "timestamp" DESC
            LIMIT 1
            "#,
        )
        .bind(sensor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(prior)
    }

    async fn persist(
        &self,
        measurement: &CanonicalMeasurement,
        procedure_version: &str,
    ) -> Result<i64> {
        // ---
        match self.persist_in_tx(measurement, procedure_version).await {
            Ok(measurement_id) => {
                tracing::debug!(
                    "Persisted measurement {} for sensor '{}' at {} ({} flags)",
                    measurement_id,
                    measurement.sensor_id,
                    measurement.timestamp,
                    measurement.validation_flags.len()
                );
                Ok(measurement_id)
            }
            Err(e) => {
                tracing::error!(
                    "Rolled back measurement for sensor '{}' at {}: {:?}",
                    measurement.sensor_id,
                    measurement.timestamp,
                    e
                );
                Err(IngestError::Persistence {
                    sensor_id: measurement.sensor_id.clone(),
                    timestamp: measurement.timestamp,
                    source: e,
                })
            }
        }
    }
}

/// Create the sensor with placeholder metadata unless it exists. Safe under concurrent callers.
async fn ensure_sensor(
    tx: &mut Transaction<'_, Postgres>,
    sensor_id: &str,
) -> std::result::Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO sensor (sensor_id, name, model, manufacturer)
        VALUES ($1, $2, NULL, NULL)
        ON CONFLICT (sensor_id) DO NOTHING
        "#,
    )
    .bind(sensor_id)
    .bind(format!("Sensor {}", sensor_id))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Insert or overwrite by `(sensor_id, timestamp)` and return the row's id.
///
/// `RETURNING` yields the id on both the insert and the update path.
async fn upsert_measurement(
    tx: &mut Transaction<'_, Postgres>,
    m: &CanonicalMeasurement,
    procedure_version: &str,
) -> std::result::Result<i64, sqlx::Error> {
    // ---
    let (measurement_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO measurement (
            sensor_id, "timestamp",
            temperature, humidity, pressure, solar_radiation, wind_speed,
            procedure_version, raw_payload
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (sensor_id, "timestamp") DO UPDATE SET
            temperature     = EXCLUDED.temperature,
            humidity        = EXCLUDED.humidity,
            pressure        = EXCLUDED.pressure,
            solar_radiation = EXCLUDED.solar_radiation,
            wind_speed      = EXCLUDED.wind_speed,
            raw_payload     = EXCLUDED.raw_payload,
            ingest_ts       = now()
        RETURNING measurement_id
        "#,
    )
    .bind(&m.sensor_id)
    .bind(m.timestamp)
    .bind(m.temperature)
    .bind(m.humidity)
    .bind(m.pressure)
    .bind(m.solar_radiation)
    .bind(m.wind_speed)
    .bind(procedure_version)
    .bind(Json(&m.raw_payload))
    .fetch_one(&mut **tx)
    .await?;

    Ok(measurement_id)
}

/// Append a flag. Earlier flags for the same measurement are never touched.
async fn insert_flag(
    tx: &mut Transaction<'_, Postgres>,
    measurement_id: i64,
    flag: &ValidationFlag,
) -> std::result::Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO validation_flag (measurement_id, kind, description)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(measurement_id)
    .bind(flag.kind.as_str())
    .bind(&flag.description)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
