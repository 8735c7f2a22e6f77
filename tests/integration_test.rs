//! Round trip against a live PostgreSQL.
//!
//! Skipped unless `DATABASE_URL` is set. Each test uses a fresh sensor id so
//! runs don't interfere with each other or with existing data.
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use sensorflow_ingest::normalize::RowNormalizer;
use sensorflow_ingest::pipeline::Pipeline;
use sensorflow_ingest::resolver::VariableResolver;
use sensorflow_ingest::schema::create_schema;
use sensorflow_ingest::store::{MeasurementStore, PgStore};
use sensorflow_ingest::validate::Validator;
use sensorflow_ingest::{
    CanonicalMeasurement, FlagKind, IngestError, RawRecord, ValidationFlag,
};

async fn connect() -> Result<Option<PgPool>> {
    // ---
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return Ok(None);
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
    create_schema(&pool).await?;
    Ok(Some(pool))
}

fn pipeline(pool: &PgPool) -> Pipeline<PgStore> {
    Pipeline::new(
        RowNormalizer::new(Arc::new(VariableResolver::fallback_only())),
        Validator::default(),
        PgStore::new(pool.clone()),
        "test",
    )
}

#[tokio::test]
async fn reingest_overwrites_values_and_accumulates_flags() -> Result<()> {
    // ---
    let Some(pool) = connect().await? else {
        return Ok(());
    };
    let sensor = format!("it-{}", Uuid::new_v4());
    let p = pipeline(&pool);

    let first = RawRecord::new()
        .with("sensor_id", sensor.as_str())
        .with("time", "2025-03-26T18:45:00Z")
        .with("temp", 500.0);
    let second = RawRecord::new()
        .with("sensor_id", sensor.as_str())
        .with("time", "2025-03-26T18:45:00Z")
        .with("temp", 21.0);

    let m1 = p.ingest_row(first).await?;
    let m2 = p.ingest_row(second).await?;
    assert_eq!(m1.count_flags(FlagKind::Range), 1);
    assert_eq!(m2.count_flags(FlagKind::Consistency), 1);

    let rows: Vec<(i64, Option<f64>)> = sqlx::query_as(
        r#"SELECT measurement_id, temperature FROM measurement WHERE sensor_id = $1"#,
    )
    .bind(&sensor)
    .fetch_all(&pool)
    .await?;
    assert_eq!(rows.len(), 1, "exactly one stored measurement");
    assert_eq!(rows[0].1, Some(21.0));

    let kinds: Vec<(String,)> = sqlx::query_as(
        "SELECT kind FROM validation_flag WHERE measurement_id = $1 ORDER BY flag_id",
    )
    .bind(rows[0].0)
    .fetch_all(&pool)
    .await?;
    let kinds: Vec<&str> = kinds.iter().map(|(k,)| k.as_str()).collect();
    assert_eq!(kinds, vec!["RANGE", "CONSISTENCY"]);

    let (name,): (Option<String>,) = sqlx::query_as("SELECT name FROM sensor WHERE sensor_id = $1")
        .bind(&sensor)
        .fetch_one(&pool)
        .await?;
    assert_eq!(name, Some(format!("Sensor {}", sensor)));

    Ok(())
}

#[tokio::test]
async fn latest_for_sensor_reads_most_recent() -> Result<()> {
    // ---
    let Some(pool) = connect().await? else {
        return Ok(());
    };
    let sensor = format!("it-{}", Uuid::new_v4());
    let p = pipeline(&pool);

    for (time, temp) in [("2025-03-26T18:50:00Z", 19.5), ("2025-03-26T18:40:00Z", 18.0)] {
        let row = RawRecord::new()
            .with("sensor_id", sensor.as_str())
            .with("time", time)
            .with("temp", temp);
        p.ingest_row(row).await?;
    }

    let latest = p.store().latest_for_sensor(&sensor).await?.expect("prior reading");
    let expected: DateTime<Utc> = "2025-03-26T18:50:00Z".parse()?;
    assert_eq!(latest.timestamp, Some(expected));
    assert_eq!(latest.temperature, Some(19.5));

    assert!(p.store().latest_for_sensor("it-never-seen").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_upsert_leaves_no_sensor_or_measurement() -> Result<()> {
    // ---
    let Some(pool) = connect().await? else {
        return Ok(());
    };
    let sensor = format!("it-{}", Uuid::new_v4());
    let store = PgStore::new(pool.clone());

    // JSONB rejects NUL, so the measurement upsert fails after the sensor insert ran.
    let raw = RawRecord::new()
        .with("sensor_id", sensor.as_str())
        .with("note", "bad\u{0}byte");
    let timestamp: DateTime<Utc> = "2025-03-26T19:00:00Z".parse()?;
    let mut m = CanonicalMeasurement::empty(sensor.as_str(), timestamp, raw)
        .with_flags(vec![ValidationFlag::new(FlagKind::Range, "temperature out of range")]);
    m.temperature = Some(99.0);

    let err = store.persist(&m, "test").await.unwrap_err();
    assert!(
        matches!(err, IngestError::Persistence { ref sensor_id, .. } if *sensor_id == sensor)
    );

    let (sensors,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sensor WHERE sensor_id = $1")
        .bind(&sensor)
        .fetch_one(&pool)
        .await?;
    let (measurements,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM measurement WHERE sensor_id = $1")
            .bind(&sensor)
            .fetch_one(&pool)
            .await?;
    assert_eq!(sensors, 0, "sensor insert rolled back");
    assert_eq!(measurements, 0, "no measurement stored");
    Ok(())
}
