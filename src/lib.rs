//! Sensor reading ingestion: CSV rows are normalized into canonical units,
//! checked for plausibility and consistency, and upserted into Postgres.
//!
//! Data flow, leaves first:
//! - [`units`] – unit conversions
//! - [`resolver`] – column name to canonical field
//! - [`normalize`] – raw row to [`CanonicalMeasurement`]
//! - [`validate`] – range and history flags
//! - [`store`] – idempotent persistence
//! - [`pipeline`] – batch driver tying the above together

pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod units;
pub mod validate;

pub use config::Config;
pub use error::{IngestError, Result};
pub use models::{
    CanonicalField, CanonicalMeasurement, FlagKind, RawRecord, RawValue, ValidationFlag,
};
