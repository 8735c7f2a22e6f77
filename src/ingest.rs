//! CSV input: decoding and conversion of rows into [`RawRecord`]s.
//!
//! Files are decoded as UTF-8 (a BOM is stripped); if that fails the bytes
//! are decoded as Latin-1, one byte per code point. Cells are kept verbatim
//! as text, apart from the usual NA markers which become [`RawValue::Missing`].
//! Only header names are trimmed.

use std::path::Path;

use encoding_rs::UTF_8;

use crate::error::{IngestError, Result};
use crate::models::{RawRecord, RawValue};

// ---

/// Cell values treated as missing (after trimming).
pub const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Read every row of a CSV file.
///
/// Returns [`IngestError::MissingInputFile`] before reading anything if the
/// path does not exist.
pub fn read_csv(path: &Path) -> Result<Vec<RawRecord>> {
    // ---
    if !path.exists() {
        return Err(IngestError::MissingInputFile {
            path: path.to_path_buf(),
        });
    }

    let bytes = std::fs::read(path)?;
    let text = decode(&bytes);
    let records = parse_csv(&text)?;

    tracing::info!("Read {} rows from {}", records.len(), path.display());
    Ok(records)
}

/// UTF-8 first, Latin-1 on malformed input.
pub fn decode(bytes: &[u8]) -> String {
    // ---
    let (text, malformed) = UTF_8.decode_with_bom_removal(bytes);
    if !malformed {
        return text.into_owned();
    }

    tracing::warn!("Input is not valid UTF-8, decoding as Latin-1");
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Parse CSV text with a header row. Short rows are padded with missing values.
pub fn parse_csv(text: &str) -> Result<Vec<RawRecord>> {
    // ---
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: RawRecord = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), cell_value(row.get(i))))
            .collect();
        records.push(record);
    }
    Ok(records)
}

fn cell_value(cell: Option<&str>) -> RawValue {
    // ---
    match cell {
        Some(text) if !MISSING_MARKERS.contains(&text.trim()) => RawValue::Text(text.to_string()),
        _ => RawValue::Missing,
    }
}
