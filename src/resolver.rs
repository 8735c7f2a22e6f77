//! Variable resolution: arbitrary column names to canonical fields.
//!
//! Lookup is two-tier. An [`Overlay`] of institution-specific synonyms is
//! consulted first; the built-in static table is the fallback. The overlay
//! is loaded once by the caller (from the `variable_synonym` table and/or a
//! dictionary CSV) and handed to [`VariableResolver::new`] as an immutable
//! snapshot. A resolver built with [`VariableResolver::fallback_only`]
//! still works, just without institution vocabulary.
//!
//! Overlay entries may carry an explicit unit hint. When they don't, a hint
//! is guessed from the synonym spelling, scoped by the entry's canonical
//! field:
//! - temperature: Fahrenheit if the synonym contains `f`
//! - pressure: Pascal if the synonym contains `pa` or is exactly `p`
//! - anything else: no hint
//!
//! The guess is best-effort. `"surface_pa_f"` mapped to pressure gets Pascal,
//! mapped to temperature gets Fahrenheit.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use sqlx::PgPool;

use crate::error::{IngestError, Result};
use crate::models::CanonicalField;

// ---

/// Unit a source column is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitHint {
    // ---
    Celsius,
    Fahrenheit,
    Pascal,
    Hectopascal,
    Percent,
    WattsPerSquareMetre,
    MetresPerSecond,
}

impl UnitHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitHint::Celsius => "c",
            UnitHint::Fahrenheit => "f",
            UnitHint::Pascal => "pa",
            UnitHint::Hectopascal => "hpa",
            UnitHint::Percent => "percent",
            UnitHint::WattsPerSquareMetre => "w_m2",
            UnitHint::MetresPerSecond => "m_s",
        }
    }
}

impl fmt::Display for UnitHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitHint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "celsius" | "degc" => Ok(UnitHint::Celsius),
            "f" | "fahrenheit" | "degf" => Ok(UnitHint::Fahrenheit),
            "pa" | "pascal" => Ok(UnitHint::Pascal),
            "hpa" | "hectopascal" | "mbar" => Ok(UnitHint::Hectopascal),
            "percent" | "%" => Ok(UnitHint::Percent),
            "w_m2" | "w/m2" => Ok(UnitHint::WattsPerSquareMetre),
            "m_s" | "m/s" => Ok(UnitHint::MetresPerSecond),
            other => Err(format!("unknown unit hint '{}'", other)),
        }
    }
}

/// Built-in synonyms used when the overlay has no entry.
const STATIC_TABLE: &[(&str, CanonicalField, UnitHint)] = &[
    ("temp_f", CanonicalField::Temperature, UnitHint::Fahrenheit),
    ("temp", CanonicalField::Temperature, UnitHint::Celsius),
    ("t", CanonicalField::Temperature, UnitHint::Celsius),
    ("temperature", CanonicalField::Temperature, UnitHint::Celsius),
    ("h", CanonicalField::Humidity, UnitHint::Percent),
    ("hum", CanonicalField::Humidity, UnitHint::Percent),
    ("humidity", CanonicalField::Humidity, UnitHint::Percent),
    ("p", CanonicalField::Pressure, UnitHint::Pascal),
    ("pa", CanonicalField::Pressure, UnitHint::Pascal),
    ("pressure", CanonicalField::Pressure, UnitHint::Pascal),
    ("radiacion", CanonicalField::SolarRadiation, UnitHint::WattsPerSquareMetre),
    ("rad", CanonicalField::SolarRadiation, UnitHint::WattsPerSquareMetre),
    ("solar_radiation", CanonicalField::SolarRadiation, UnitHint::WattsPerSquareMetre),
    ("wind_speed", CanonicalField::WindSpeed, UnitHint::MetresPerSecond),
    ("wind", CanonicalField::WindSpeed, UnitHint::MetresPerSecond),
];

/// One overlay entry: the canonical field and an optional explicit hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayEntry {
    pub field: CanonicalField,
    pub hint: Option<UnitHint>,
}

/// Institution-specific synonym dictionary, keyed by lowercase synonym.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    entries: HashMap<String, OverlayEntry>,
}

impl Overlay {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry. Later inserts win.
    pub fn insert(&mut self, synonym: &str, field: CanonicalField, hint: Option<UnitHint>) {
        self.entries
            .insert(synonym.trim().to_lowercase(), OverlayEntry { field, hint });
    }

    /// Merge `other` into `self`; entries of `other` win on identical synonyms.
    pub fn extend(&mut self, other: Overlay) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, synonym: &str) -> Option<&OverlayEntry> {
        self.entries.get(synonym)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert from loosely typed dictionary columns, skipping rows that don't parse.
    fn insert_raw(&mut self, synonym: &str, canonical: &str, hint: Option<&str>, source: &str) {
        // ---
        let field = match canonical.parse::<CanonicalField>() {
            Ok(field) => field,
            Err(e) => {
                tracing::warn!("Skipping {} synonym '{}': {}", source, synonym, e);
                return;
            }
        };
        let hint = match hint.map(str::trim).filter(|h| !h.is_empty()) {
            None => None,
            Some(h) => match h.parse::<UnitHint>() {
                Ok(hint) => Some(hint),
                Err(e) => {
                    tracing::warn!("Ignoring hint for {} synonym '{}': {}", source, synonym, e);
                    None
                }
            },
        };
        self.insert(synonym, field, hint);
    }

    /// Read the `variable_synonym` table.
    pub async fn load_from_db(pool: &PgPool) -> Result<Self> {
        // ---
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT synonym, canonical_name, unit_hint FROM variable_synonym",
        )
        .fetch_all(pool)
        .await?;

        let mut overlay = Overlay::new();
        for (synonym, canonical, hint) in &rows {
            overlay.insert_raw(synonym, canonical, hint.as_deref(), "database");
        }
        tracing::debug!("Loaded {} synonyms from database", overlay.len());
        Ok(overlay)
    }

    /// Read a dictionary CSV with columns `synonym,canonical_name[,unit_hint]`.
    ///
    /// The header row is optional and is recognized by its first two names.
    pub fn load_from_csv(path: &Path) -> Result<Self> {
        // ---
        if !path.exists() {
            return Err(IngestError::Dictionary(format!(
                "dictionary file not found: {}",
                path.display()
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .has_headers(false)
            .from_path(path)?;

        let mut overlay = Overlay::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            if index == 0 && is_dictionary_header(&record) {
                continue;
            }
            let (Some(synonym), Some(canonical)) = (record.get(0), record.get(1)) else {
                return Err(IngestError::Dictionary(format!(
                    "{}: line {} needs at least synonym and canonical_name",
                    path.display(),
                    record.position().map_or(0, |p| p.line())
                )));
            };
            overlay.insert_raw(synonym, canonical, record.get(2), "dictionary file");
        }
        tracing::debug!(
            "Loaded {} synonyms from {}",
            overlay.len(),
            path.display()
        );
        Ok(overlay)
    }
}

fn is_dictionary_header(record: &csv::StringRecord) -> bool {
    // ---
    matches!(
        (record.get(0), record.get(1)),
        (Some(first), Some(second))
            if first.eq_ignore_ascii_case("synonym")
                && second.eq_ignore_ascii_case("canonical_name")
    )
}

/// Resolves input field names to `(canonical field, unit hint)`.
#[derive(Debug, Clone, Default)]
pub struct VariableResolver {
    overlay: Overlay,
}

impl VariableResolver {
    // ---
    pub fn new(overlay: Overlay) -> Self {
        Self { overlay }
    }

    /// A resolver backed by the static table alone.
    pub fn fallback_only() -> Self {
        Self::default()
    }

    /// Build a resolver from the available dictionary sources.
    ///
    /// A database that can't be read degrades to the remaining sources with a
    /// single warning. A dictionary file that can't be read is an error, since
    /// it was asked for explicitly. File entries win over database entries.
    pub async fn load(pool: Option<&PgPool>, dictionary: Option<&Path>) -> Result<Self> {
        // ---
        let mut overlay = Overlay::new();

        if let Some(pool) = pool {
            match Overlay::load_from_db(pool).await {
                Ok(db_overlay) => overlay.extend(db_overlay),
                Err(e) => tracing::warn!(
                    "Synonym dictionary unavailable, using built-in synonyms only: {}",
                    e
                ),
            }
        }
        if let Some(path) = dictionary {
            overlay.extend(Overlay::load_from_csv(path)?);
        }

        tracing::info!("Variable resolver ready with {} overlay synonyms", overlay.len());
        Ok(Self::new(overlay))
    }

    pub fn overlay_len(&self) -> usize {
        self.overlay.len()
    }

    /// Resolve a field name, case-insensitively. Unknown names yield `None`.
    pub fn resolve(&self, name: &str) -> Option<(CanonicalField, Option<UnitHint>)> {
        // ---
        let key = name.trim().to_lowercase();

        if let Some(entry) = self.overlay.get(&key) {
            let hint = entry.hint.or_else(|| infer_hint(&key, entry.field));
            return Some((entry.field, hint));
        }

        STATIC_TABLE
            .iter()
            .find(|(synonym, _, _)| *synonym == key)
            .map(|(_, field, hint)| (*field, Some(*hint)))
    }
}

/// Guess a unit from the synonym spelling. Only temperature and pressure get a guess.
fn infer_hint(synonym: &str, field: CanonicalField) -> Option<UnitHint> {
    // ---
    match field {
        CanonicalField::Temperature if synonym.contains('f') => Some(UnitHint::Fahrenheit),
        CanonicalField::Pressure if synonym.contains("pa") || synonym == "p" => {
            Some(UnitHint::Pascal)
        }
        _ => None,
    }
}
