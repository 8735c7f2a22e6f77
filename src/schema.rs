//! Database schema bootstrap for `sensorflow-ingest`.
//!
//! Ensures the ingestion tables exist before the first row is written.
//! Applied once on startup from `main.rs`. This is not a migration system:
//! existing tables are never altered.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the schema if missing (idempotent).
///
/// Tables:
/// - `sensor` – identity records, auto-created on first mention
/// - `measurement` – canonical readings, unique on `(sensor_id, timestamp)`
/// - `validation_flag` – append-only advisory flags per measurement
/// - `variable_synonym` – the institution synonym dictionary
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor (
            sensor_id    TEXT PRIMARY KEY,
            name         TEXT,
            model        TEXT,
            manufacturer TEXT,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurement (
            measurement_id    BIGSERIAL PRIMARY KEY,
            sensor_id         TEXT             NOT NULL REFERENCES sensor (sensor_id),
            "timestamp"       TIMESTAMPTZ      NOT NULL,
            temperature       DOUBLE PRECISION,
            humidity          DOUBLE PRECISION,
            pressure          DOUBLE PRECISION,
            solar_radiation   DOUBLE PRECISION,
            wind_speed        DOUBLE PRECISION,
            procedure_version TEXT,
            raw_payload       JSONB            NOT NULL DEFAULT '{}'::jsonb,
            created_at        TIMESTAMPTZ      NOT NULL DEFAULT now(),
            ingest_ts         TIMESTAMPTZ      NOT NULL DEFAULT now(),
            UNIQUE (sensor_id, "timestamp")
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS validation_flag (
            flag_id        BIGSERIAL PRIMARY KEY,
            measurement_id BIGINT      NOT NULL
                           REFERENCES measurement (measurement_id) ON DELETE CASCADE,
            kind           TEXT        NOT NULL,
            description    TEXT        NOT NULL,
            created_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS variable_synonym (
            synonym        TEXT PRIMARY KEY,
            canonical_name TEXT NOT NULL,
            unit_hint      TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Flag lookups by measurement
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_validation_flag_measurement_id
            ON validation_flag (measurement_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
