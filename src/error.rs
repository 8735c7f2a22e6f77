//! Error types for the ingestion library.
//!
//! Only structural failures live here. Out-of-range or inconsistent data is
//! reported as a [`ValidationFlag`](crate::models::ValidationFlag), and
//! unrecognized columns or unparseable timestamps are not errors at all.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    // ---
    #[error("Input file not found: {}", path.display())]
    MissingInputFile { path: PathBuf },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dictionary error: {0}")]
    Dictionary(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to persist measurement for sensor '{sensor_id}' at {timestamp}: {source}")]
    Persistence {
        sensor_id: String,
        timestamp: DateTime<Utc>,
        #[source]
        source: sqlx::Error,
    },
}
