//! In-process store with the same upsert and flag semantics as Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::MeasurementStore;
use crate::error::Result;
use crate::models::{CanonicalMeasurement, PriorReading, RawRecord, ValidationFlag};

// ---

/// A measurement row as held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMeasurement {
    // ---
    pub measurement_id: i64,
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub solar_radiation: Option<f64>,
    pub wind_speed: Option<f64>,
    pub procedure_version: String,
    pub raw_payload: RawRecord,
    pub created_at: DateTime<Utc>,
    pub ingest_ts: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    sensors: HashMap<String, String>,
    measurements: Vec<StoredMeasurement>,
    flags: Vec<(i64, ValidationFlag)>,
    next_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn measurement(
        &self,
        sensor_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<StoredMeasurement> {
        // ---
        let tables = self.tables.lock().await;
        tables
            .measurements
            .iter()
            .find(|m| m.sensor_id == sensor_id && m.timestamp == timestamp)
            .cloned()
    }

    pub async fn measurement_count(&self) -> usize {
        self.tables.lock().await.measurements.len()
    }

    /// Every flag recorded for a measurement, oldest first.
    pub async fn flags_for(&self, measurement_id: i64) -> Vec<ValidationFlag> {
        // ---
        let tables = self.tables.lock().await;
        tables
            .flags
            .iter()
            .filter(|(id, _)| *id == measurement_id)
            .map(|(_, flag)| flag.clone())
            .collect()
    }

    /// Display name of a known sensor.
    pub async fn sensor_name(&self, sensor_id: &str) -> Option<String> {
        self.tables.lock().await.sensors.get(sensor_id).cloned()
    }

    pub async fn sensor_count(&self) -> usize {
        self.tables.lock().await.sensors.len()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    // ---
    async fn latest_for_sensor(&self, sensor_id: &str) -> Result<Option<PriorReading>> {
        // ---
        let tables = self.tables.lock().await;
        Ok(tables
            .measurements
            .iter()
            .filter(|m| m.sensor_id == sensor_id)
            .max_by_key(|m| m.timestamp)
            .map(|m| PriorReading {
                temperature: m.temperature,
                humidity: m.humidity,
                pressure: m.pressure,
                timestamp: Some(m.timestamp),
            }))
    }

    async fn persist(
        &self,
        measurement: &CanonicalMeasurement,
        procedure_version: &str,
    ) -> Result<i64> {
        // ---
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let now = Utc::now();

        tables
            .sensors
            .entry(measurement.sensor_id.clone())
            .or_insert_with(|| format!("Sensor {}", measurement.sensor_id));

        let existing = tables
            .measurements
            .iter_mut()
            .find(|m| m.sensor_id == measurement.sensor_id && m.timestamp == measurement.timestamp);

        let measurement_id = match existing {
            Some(row) => {
                // Identity, creation time and procedure version are left alone.
                row.temperature = measurement.temperature;
                row.humidity = measurement.humidity;
                row.pressure = measurement.pressure;
                row.solar_radiation = measurement.solar_radiation;
                row.wind_speed = measurement.wind_speed;
                row.raw_payload = measurement.raw_payload.clone();
                row.ingest_ts = now;
                row.measurement_id
            }
            None => {
                tables.next_id += 1;
                let measurement_id = tables.next_id;
                tables.measurements.push(StoredMeasurement {
                    measurement_id,
                    sensor_id: measurement.sensor_id.clone(),
                    timestamp: measurement.timestamp,
                    temperature: measurement.temperature,
                    humidity: measurement.humidity,
                    pressure: measurement.pressure,
                    solar_radiation: measurement.solar_radiation,
                    wind_speed: measurement.wind_speed,
                    procedure_version: procedure_version.to_string(),
                    raw_payload: measurement.raw_payload.clone(),
                    created_at: now,
                    ingest_ts: now,
                });
                measurement_id
            }
        };

        for flag in &measurement.validation_flags {
            tables.flags.push((measurement_id, flag.clone()));
        }

        Ok(measurement_id)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::FlagKind;
    use chrono::TimeZone;

    fn reading(sensor: &str, minute: u32, temperature: f64) -> CanonicalMeasurement {
        // ---
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, minute, 0).unwrap();
        let raw = RawRecord::new().with("temp", temperature);
        let mut m = CanonicalMeasurement::empty(sensor, ts, raw);
        m.temperature = Some(temperature);
        m
    }

    #[test]
    fn test_upsert_overwrites_and_flags_accumulate() {
        // ---
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let first = reading("s1", 0, 20.0)
                .with_flags(vec![ValidationFlag::new(FlagKind::Range, "first")]);
            let second = reading("s1", 0, 21.5)
                .with_flags(vec![ValidationFlag::new(FlagKind::Consistency, "second")]);

            let id1 = store.persist(&first, "v1").await.unwrap();
            let id2 = store.persist(&second, "v2").await.unwrap();

            assert_eq!(id1, id2);
            assert_eq!(store.measurement_count().await, 1);

            let stored = store.measurement("s1", first.timestamp).await.unwrap();
            assert_eq!(stored.temperature, Some(21.5));
            assert_eq!(stored.procedure_version, "v1");
            assert_eq!(stored.raw_payload, second.raw_payload);
            assert!(stored.ingest_ts >= stored.created_at);

            let flags = store.flags_for(id1).await;
            assert_eq!(flags.len(), 2);
            assert_eq!(flags[0].description, "first");
            assert_eq!(flags[1].description, "second");
        });
    }

    #[test]
    fn test_sensor_created_once() {
        // ---
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            store.persist(&reading("s7", 0, 1.0), "v1").await.unwrap();
            store.persist(&reading("s7", 1, 2.0), "v1").await.unwrap();

            assert_eq!(store.sensor_count().await, 1);
            assert_eq!(store.sensor_name("s7").await.as_deref(), Some("Sensor s7"));
        });
    }

    #[test]
    fn test_latest_for_sensor_orders_by_timestamp() {
        // ---
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            assert_eq!(store.latest_for_sensor("s1").await.unwrap(), None);

            store.persist(&reading("s1", 10, 15.0), "v1").await.unwrap();
            store.persist(&reading("s1", 5, 12.0), "v1").await.unwrap();
            store.persist(&reading("s2", 30, 40.0), "v1").await.unwrap();

            let latest = store.latest_for_sensor("s1").await.unwrap().unwrap();
            assert_eq!(latest.temperature, Some(15.0));
            assert_eq!(
                latest.timestamp,
                Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 10, 0).unwrap())
            );
        });
    }
}
