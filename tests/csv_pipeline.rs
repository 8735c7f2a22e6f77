//! End-to-end: CSV file through normalization and validation into the
//! in-memory store.
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use sensorflow_ingest::ingest::read_csv;
use sensorflow_ingest::normalize::RowNormalizer;
use sensorflow_ingest::pipeline::{OnRowError, Pipeline};
use sensorflow_ingest::resolver::{Overlay, VariableResolver};
use sensorflow_ingest::store::MemoryStore;
use sensorflow_ingest::validate::Validator;
use sensorflow_ingest::{CanonicalField, FlagKind};

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[tokio::test]
async fn mixed_vocabulary_file() -> Result<()> {
    // ---
    let mut file = NamedTempFile::new()?;
    writeln!(file, "sensor_id,time,lat,lon,Temp_F,hum,pressure,rad,wind,colour")?;
    writeln!(file, "st-1,2025-03-26T18:00:00Z,46.52,6.56,77,0.5,100000,650.5,3.2,red")?;
    writeln!(file, "st-1,2025-03-26T18:10:00Z,46.52,6.56,104,0.45,101300,NA,,red")?;
    writeln!(file, "st-2,2025-03-26T18:00:00Z,46.50,6.60,,,,,,blue")?;
    writeln!(file, "st-1,2025-03-26T18:20:00Z,46.52,6.56,1000,55,99000,,,red")?;

    let rows = read_csv(file.path())?;
    let pipeline = Pipeline::new(
        RowNormalizer::new(Arc::new(VariableResolver::fallback_only())),
        Validator::default(),
        MemoryStore::new(),
        "v1",
    );

    let mut seen = Vec::new();
    let report = pipeline
        .run_batch(rows, OnRowError::Abort, |m| seen.push(m.clone()))
        .await?;

    assert_eq!(report.rows_read, 4);
    assert_eq!(report.rows_persisted, 4);
    assert_eq!(report.rows_without_fields, 1);

    // Row 1: everything converted
    let m = &seen[0];
    assert_eq!(m.sensor_id, "st-1");
    assert_eq!(m.temperature, Some(25.0));
    assert_eq!(m.humidity, Some(50.0));
    assert_eq!(m.pressure, Some(1000.0));
    assert_eq!(m.solar_radiation, Some(650.5));
    assert_eq!(m.wind_speed, Some(3.2));
    assert!(m.validation_flags.is_empty());

    // Row 2: 104°F = 40°C, a 15° jump
    let m = &seen[1];
    assert_eq!(m.temperature, Some(40.0));
    assert_eq!(m.solar_radiation, None);
    assert_eq!(m.count_flags(FlagKind::Consistency), 1);

    // Row 3: blank, new sensor, no flags
    assert!(seen[2].is_blank());
    assert!(seen[2].validation_flags.is_empty());

    // Row 4: 1000°F is out of range and a jump; 55% humidity stays 55%
    let m = &seen[3];
    assert_eq!(m.humidity, Some(55.0));
    assert_eq!(m.pressure, Some(990.0));
    assert_eq!(m.count_flags(FlagKind::Range), 1);
    assert_eq!(m.count_flags(FlagKind::Consistency), 1);

    let stored = pipeline
        .store()
        .measurement("st-1", ts("2025-03-26T18:20:00Z"))
        .await
        .expect("stored row");
    assert_eq!(stored.procedure_version, "v1");
    assert_eq!(pipeline.store().measurement_count().await, 4);
    assert_eq!(pipeline.store().sensor_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn overlay_vocabulary_takes_priority() -> Result<()> {
    // ---
    let mut file = NamedTempFile::new()?;
    writeln!(file, "sensor,timestamp,pressure,lufttemp_f,feuchte")?;
    writeln!(file, "x9,2025-01-01 00:00:00,1013.2,50,0.8")?;

    let mut overlay = Overlay::new();
    overlay.insert("pressure", CanonicalField::Pressure, None);
    overlay.insert("lufttemp_f", CanonicalField::Temperature, None);
    overlay.insert("feuchte", CanonicalField::Humidity, None);

    let pipeline = Pipeline::new(
        RowNormalizer::new(Arc::new(VariableResolver::new(overlay))),
        Validator::default(),
        MemoryStore::new(),
        "v1",
    );

    let m = pipeline.ingest_row(read_csv(file.path())?.remove(0)).await?;

    assert_eq!(m.sensor_id, "x9");
    assert_eq!(m.timestamp, ts("2025-01-01T00:00:00Z"));
    // Overlay "pressure" has no Pascal hint, so the value is already hPa.
    assert_eq!(m.pressure, Some(1013.2));
    assert_eq!(m.temperature, Some(10.0));
    assert_eq!(m.humidity, Some(80.0));
    Ok(())
}
