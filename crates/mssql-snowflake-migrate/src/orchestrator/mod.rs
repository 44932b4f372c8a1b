//! Migration orchestrator - main workflow coordinator.
//!
//! Owns the one destination session of a run and lends it to the table
//! migrator job by job. Source connections are opened per job by the
//! migrator itself.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::traits::{DestinationConnector, SourceConnector};
use crate::error::{MigrateError, Result};
use crate::pipeline::{MigrationOutcome, MigratorConfig, TableJob, TableMigrator, TablePlan};
use crate::source::MssqlConnector;
use crate::target::SnowflakeConnector;

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceConnector>,
    destination: Arc<dyn DestinationConnector>,
    migrator: TableMigrator,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: `completed`, `completed_with_failures` or `failed`.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Tables in the worklist.
    pub tables_total: usize,

    /// Tables that finished successfully.
    pub tables_succeeded: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Rows written across all tables.
    pub rows_loaded: u64,

    /// SHA256 of the configuration used.
    pub config_hash: String,

    /// One outcome per job, in worklist order.
    pub outcomes: Vec<MigrationOutcome>,

    /// Run-level failure; no job ran when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl RunReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Source names of the failed jobs.
    pub fn failed_tables(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded)
            .map(|o| o.job.source.clone())
            .collect()
    }

    /// The error the run as a whole maps to, if any.
    pub fn error(&self) -> Option<MigrateError> {
        if let Some(fatal) = &self.fatal {
            return Some(MigrateError::DestinationConnection(fatal.clone()));
        }
        let failed = self.failed_tables();
        if failed.is_empty() {
            None
        } else {
            Some(MigrateError::TablesFailed(failed))
        }
    }
}

/// Connectivity check result.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub destination_connected: bool,
    pub destination_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_error: Option<String>,

    /// The first failure as raised, source before destination.
    #[serde(skip)]
    failure: Option<MigrateError>,
}

impl HealthCheckResult {
    /// The error an unhealthy check maps to, if any.
    pub fn into_error(self) -> Option<MigrateError> {
        self.failure
    }
}

impl Orchestrator {
    /// Create an orchestrator with the MSSQL and Snowflake connectors.
    pub fn new(config: Config) -> Result<Self> {
        let source = MssqlConnector::new(config.source.clone())?;
        let destination = SnowflakeConnector::new(config.destination.clone())?;
        Ok(Self::with_connectors(
            config,
            Arc::new(source),
            Arc::new(destination),
        ))
    }

    /// Create an orchestrator over arbitrary connectors.
    pub fn with_connectors(
        config: Config,
        source: Arc<dyn SourceConnector>,
        destination: Arc<dyn DestinationConnector>,
    ) -> Self {
        let migrator = TableMigrator::new(MigratorConfig::from_config(&config));
        Self {
            config,
            source,
            destination,
            migrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Migrate `jobs` in order on one shared destination session.
    ///
    /// A failed job never stops the run. If the session cannot be opened,
    /// no job runs and the report carries the reason in `fatal`.
    pub async fn run(&self, jobs: &[TableJob]) -> RunReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting migration run: {} ({} tables)", run_id, jobs.len());

        let mut outcomes = Vec::with_capacity(jobs.len());
        let mut fatal = None;

        match self.destination.connect().await {
            Ok(mut destination) => {
                for (idx, job) in jobs.iter().enumerate() {
                    info!("[{}/{}] {}", idx + 1, jobs.len(), job);
                    let outcome = self
                        .migrator
                        .migrate(self.source.as_ref(), destination.as_mut(), job)
                        .await;
                    outcomes.push(outcome);
                }

                if let Err(e) = destination.close().await {
                    warn!("Closing destination session failed: {}", e);
                }
            }
            Err(e) => {
                error!("Could not open destination session: {}", e);
                fatal = Some(e.to_string());
            }
        }

        let report = self.report(run_id, started_at, started, jobs.len(), outcomes, fatal);
        info!(
            "Run {} {}: {}/{} tables, {} rows in {:.2}s",
            report.run_id,
            report.status,
            report.tables_succeeded,
            report.tables_total,
            report.rows_loaded,
            report.duration_seconds
        );
        report
    }

    /// Migrate every table in the configuration.
    pub async fn run_all(&self) -> RunReport {
        self.run(&self.config.migration.tables).await
    }

    fn report(
        &self,
        run_id: String,
        started_at: DateTime<Utc>,
        started: Instant,
        tables_total: usize,
        outcomes: Vec<MigrationOutcome>,
        fatal: Option<String>,
    ) -> RunReport {
        let tables_succeeded = outcomes.iter().filter(|o| o.succeeded).count();
        let tables_failed = outcomes.len() - tables_succeeded;
        let status = if fatal.is_some() {
            "failed"
        } else if tables_failed > 0 {
            "completed_with_failures"
        } else {
            "completed"
        };

        RunReport {
            run_id,
            status: status.to_string(),
            duration_seconds: started.elapsed().as_secs_f64(),
            started_at,
            completed_at: Utc::now(),
            tables_total,
            tables_succeeded,
            tables_failed,
            rows_loaded: outcomes.iter().map(|o| o.rows_loaded).sum(),
            config_hash: self.config.hash(),
            outcomes,
            fatal,
        }
    }

    /// Resolve the DDL each job would run, without touching the destination.
    ///
    /// One entry per job, in order; a job whose source cannot be read
    /// carries its error and does not hide the others.
    pub async fn plan(&self, jobs: &[TableJob]) -> Vec<(TableJob, Result<TablePlan>)> {
        let mut plans = Vec::with_capacity(jobs.len());
        for job in jobs {
            let plan = self.migrator.plan(self.source.as_ref(), job).await;
            if let Err(e) = &plan {
                warn!("{}: cannot plan: {}", job.source, e);
            }
            plans.push((job.clone(), plan));
        }
        plans
    }

    /// Open and close one source connection and one destination session.
    pub async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let source_result = match self.source.connect().await {
            Ok(mut conn) => conn.close().await,
            Err(e) => Err(e),
        };
        let source_latency_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let destination_result = match self.destination.connect().await {
            Ok(mut conn) => conn.close().await,
            Err(e) => Err(e),
        };
        let destination_latency_ms = started.elapsed().as_millis() as u64;

        HealthCheckResult {
            healthy: source_result.is_ok() && destination_result.is_ok(),
            source_connected: source_result.is_ok(),
            source_latency_ms,
            source_error: source_result.as_ref().err().map(|e| e.to_string()),
            destination_connected: destination_result.is_ok(),
            destination_latency_ms,
            destination_error: destination_result.as_ref().err().map(|e| e.to_string()),
            failure: source_result.err().or(destination_result.err()),
        }
    }
}
