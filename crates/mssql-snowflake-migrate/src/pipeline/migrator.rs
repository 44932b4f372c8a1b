//! Table migrator: one job, start to finish.

use std::time::Instant;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::core::schema::{to_destination_specs, DestinationColumnSpec, ExtractedSchema, SchemaFidelity};
use crate::core::traits::{
    BulkAppend, DestinationConnection, QueryResult, SourceConnection, SourceConnector,
    DEFAULT_BATCH_SIZE,
};
use crate::error::Result;
use crate::source::schema::extract_columns;
use crate::target::ddl::create_or_replace_table;

use super::job::{JobStage, MigrationOutcome, TableJob};

/// Destination placement and load settings shared by every job of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratorConfig {
    /// Destination database.
    pub database: String,

    /// Destination schema.
    pub schema: String,

    /// Rows per bulk-load batch.
    pub batch_size: usize,

    /// Empty the destination table before loading.
    pub overwrite: bool,
}

impl MigratorConfig {
    pub fn new(database: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            overwrite: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            database: config.destination.database.clone(),
            schema: config.destination.schema.clone(),
            batch_size: config.migration.batch_size,
            overwrite: config.migration.overwrite,
        }
    }
}

/// What a job would create, without touching the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlan {
    pub job: TableJob,
    pub columns: Vec<DestinationColumnSpec>,
    pub fidelity: SchemaFidelity,
    pub ddl: String,
}

/// Runs table jobs against a source connector and a borrowed destination
/// session.
#[derive(Debug, Clone)]
pub struct TableMigrator {
    config: MigratorConfig,
}

impl TableMigrator {
    pub fn new(config: MigratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Migrate one table. Never returns an error: every failure is folded
    /// into the outcome, and `destination` is left open for the next job.
    pub async fn migrate(
        &self,
        source: &dyn SourceConnector,
        destination: &mut dyn DestinationConnection,
        job: &TableJob,
    ) -> MigrationOutcome {
        let span = info_span!("table", source = %job.source, destination = %job.destination);
        let started = Instant::now();
        self.run_job(source, destination, job)
            .instrument(span)
            .await
            .with_duration(started.elapsed())
    }

    async fn run_job(
        &self,
        source: &dyn SourceConnector,
        destination: &mut dyn DestinationConnection,
        job: &TableJob,
    ) -> MigrationOutcome {
        info!("Extracting {}", job.source);
        let select = format!("SELECT * FROM {}", job.source);
        let (result, schema) = match self.extract(source, job, &select).await {
            Ok(extracted) => extracted,
            Err(e) => {
                error!("{}: source extraction failed: {}", job.source, e);
                return MigrationOutcome::failed(
                    job.clone(),
                    JobStage::Extracting,
                    format!("source extraction failed: {}", e),
                );
            }
        };
        info!(
            "Extracted {} rows, {} columns from {}",
            result.rows.len(),
            result.columns.len(),
            job.source
        );

        debug!("{}: translating schema", job.source);
        let specs = to_destination_specs(&schema.columns);
        let fidelity = Some(schema.fidelity.clone());

        if result.rows.is_empty() {
            info!("{} is empty, skipping create and load", job.source);
            return MigrationOutcome::succeeded(job.clone(), 0, JobStage::SchemaTranslating)
                .with_fidelity(fidelity);
        }

        let ddl = create_or_replace_table(
            &self.config.database,
            &self.config.schema,
            &job.destination,
            &specs,
        );
        debug!("DDL for {}:\n{}", job.destination, ddl);
        info!("Recreating {}.{}.{}", self.config.database, self.config.schema, job.destination);

        if let Err(e) = destination.execute(&ddl).await {
            error!("{}: create table failed: {}", job.destination, e);
            return MigrationOutcome::failed(job.clone(), JobStage::Recreating, e.to_string())
                .with_fidelity(fidelity);
        }

        info!(
            "Loading {} rows into {} (batch_size={}, overwrite={})",
            result.rows.len(),
            job.destination,
            self.config.batch_size,
            self.config.overwrite
        );
        let columns = schema.column_names();
        let request = BulkAppend {
            database: &self.config.database,
            schema: &self.config.schema,
            table: &job.destination,
            columns: &columns,
            rows: &result.rows,
            batch_size: self.config.batch_size,
            overwrite: self.config.overwrite,
        };

        match destination.bulk_append(&request).await {
            Ok(load) if load.success => {
                info!(
                    "Loaded {} rows into {} in {} batches",
                    load.rows_written, job.destination, load.batches
                );
                MigrationOutcome::succeeded(job.clone(), load.rows_written, JobStage::Loading)
                    .with_fidelity(fidelity)
            }
            Ok(load) => {
                let reason = format!(
                    "bulk load incomplete: {} of {} rows written",
                    load.rows_written,
                    result.rows.len()
                );
                error!("{}: {}", job.destination, reason);
                MigrationOutcome::failed(job.clone(), JobStage::Loading, reason)
                    .with_fidelity(fidelity)
            }
            Err(e) => {
                error!("{}: {}", job.destination, e);
                MigrationOutcome::failed(job.clone(), JobStage::Loading, e.to_string())
                    .with_fidelity(fidelity)
            }
        }
    }

    /// Build the DDL a job would run, reading only result-set metadata.
    pub async fn plan(&self, source: &dyn SourceConnector, job: &TableJob) -> Result<TablePlan> {
        let select = format!("SELECT TOP 0 * FROM {}", job.source);
        let (_, schema) = self.extract(source, job, &select).await?;
        let columns = to_destination_specs(&schema.columns);
        let ddl = create_or_replace_table(
            &self.config.database,
            &self.config.schema,
            &job.destination,
            &columns,
        );
        Ok(TablePlan {
            job: job.clone(),
            columns,
            fidelity: schema.fidelity,
            ddl,
        })
    }

    /// Open a job-scoped source connection, run `select` and resolve the
    /// column metadata. The connection is closed on every path.
    async fn extract(
        &self,
        source: &dyn SourceConnector,
        job: &TableJob,
        select: &str,
    ) -> Result<(QueryResult, ExtractedSchema)> {
        let mut conn = source.connect().await?;
        let extracted = extract_with(conn.as_mut(), job, select).await;
        if let Err(e) = conn.close().await {
            warn!("{}: closing source connection failed: {}", job.source, e);
        }
        extracted
    }
}

async fn extract_with(
    conn: &mut dyn SourceConnection,
    job: &TableJob,
    select: &str,
) -> Result<(QueryResult, ExtractedSchema)> {
    let result = conn.query(select, &[]).await?;
    let schema = extract_columns(conn, &job.source, &result.columns).await;
    Ok((result, schema))
}
