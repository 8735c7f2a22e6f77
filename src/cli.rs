//! Command-line surface and batch orchestration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::ingest;
use crate::normalize::RowNormalizer;
use crate::pipeline::{BatchReport, OnRowError, Pipeline};
use crate::resolver::VariableResolver;
use crate::schema;
use crate::store::{MemoryStore, PgStore};
use crate::validate::Validator;

// ---

#[derive(Parser, Debug)]
#[command(name = "sensorflow-ingest")]
#[command(about = "Normalize, validate and store sensor readings from a CSV file")]
#[command(version)]
pub struct Cli {
    // ---
    #[arg(help = "CSV file to ingest")]
    pub input: PathBuf,

    #[arg(long, help = "Normalize and validate only; print records as JSON lines")]
    pub dry_run: bool,

    #[arg(
        long,
        value_name = "CSV",
        help = "Synonym dictionary file: synonym,canonical_name[,unit_hint] rows, header optional"
    )]
    pub dictionary: Option<PathBuf>,

    #[arg(long, help = "Do not read the variable_synonym table")]
    pub no_db_dictionary: bool,

    #[arg(
        long,
        help = "Provenance tag stored with each measurement [default: PROCEDURE_VERSION or v1]"
    )]
    pub procedure_version: Option<String>,

    #[arg(long, help = "Continue with the next row when a row fails to persist")]
    pub keep_going: bool,

    #[arg(long, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    fn row_policy(&self) -> OnRowError {
        if self.keep_going {
            OnRowError::Continue
        } else {
            OnRowError::Abort
        }
    }
}

/// Run one batch inside an `ingest` span tagged with a fresh run id.
pub async fn run(cli: Cli, cfg: Config) -> Result<BatchReport> {
    // ---
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("ingest", %run_id, input = %cli.input.display());
    run_batch(cli, cfg).instrument(span).await
}

/// The input file is read before any database work starts.
async fn run_batch(cli: Cli, cfg: Config) -> Result<BatchReport> {
    // ---
    let rows = ingest::read_csv(&cli.input)?;

    let procedure_version = cli
        .procedure_version
        .clone()
        .unwrap_or_else(|| cfg.procedure_version.clone());
    let validator = Validator::new(cfg.consistency_thresholds());
    let policy = cli.row_policy();

    if cli.dry_run {
        tracing::info!("Dry run: nothing will be written to the database");
        let resolver = VariableResolver::load(None, cli.dictionary.as_deref()).await?;
        let normalizer = RowNormalizer::new(Arc::new(resolver));
        let pipeline = Pipeline::new(normalizer, validator, MemoryStore::new(), procedure_version);

        let report = pipeline.run_batch(rows, policy, print_json_line).await?;
        return Ok(report);
    }

    let db_url = cfg.require_db_url()?;
    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let db_dictionary = (!cli.no_db_dictionary).then_some(&pool);
    let resolver = VariableResolver::load(db_dictionary, cli.dictionary.as_deref()).await?;
    let normalizer = RowNormalizer::new(Arc::new(resolver));
    let store = PgStore::new(pool.clone());
    let pipeline = Pipeline::new(normalizer, validator, store, procedure_version);

    let report = pipeline.run_batch(rows, policy, |_| {}).await?;
    pool.close().await;
    Ok(report)
}

fn print_json_line(measurement: &crate::models::CanonicalMeasurement) {
    // ---
    match serde_json::to_string(measurement) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(
            "Could not render measurement for sensor '{}': {}",
            measurement.sensor_id,
            e
        ),
    }
}
