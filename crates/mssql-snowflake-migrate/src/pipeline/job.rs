//! Table job (Command pattern) and its per-table outcome.
//!
//! A [`TableJob`] names one source table and the destination table it is
//! copied into. The migrator turns each job into exactly one
//! [`MigrationOutcome`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::schema::SchemaFidelity;

/// One entry of the migration worklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableJob {
    /// Qualified source table, e.g. `[Data_Lab].[dbo].[wf_pwr_kpi]`.
    pub source: String,

    /// Destination table name inside the configured database and schema.
    pub destination: String,
}

impl TableJob {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for TableJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Stages a table job moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Extracting,
    SchemaTranslating,
    Recreating,
    Loading,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Extracting => "extracting",
            JobStage::SchemaTranslating => "schema_translating",
            JobStage::Recreating => "recreating",
            JobStage::Loading => "loading",
        };
        f.write_str(name)
    }
}

/// Result of migrating one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    /// The job this outcome belongs to.
    pub job: TableJob,

    /// Rows written to the destination (0 on failure or empty source).
    pub rows_loaded: u64,

    /// Whether the job completed.
    pub succeeded: bool,

    /// Why the job failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Last stage entered before the job finished.
    pub stage_reached: JobStage,

    /// Where the destination column types came from, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fidelity: Option<SchemaFidelity>,

    /// Wall-clock time spent on the job.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl MigrationOutcome {
    pub fn succeeded(job: TableJob, rows_loaded: u64, stage_reached: JobStage) -> Self {
        Self {
            job,
            rows_loaded,
            succeeded: true,
            failure_reason: None,
            stage_reached,
            fidelity: None,
            duration: Duration::ZERO,
        }
    }

    pub fn failed(job: TableJob, stage_reached: JobStage, reason: impl Into<String>) -> Self {
        Self {
            job,
            rows_loaded: 0,
            succeeded: false,
            failure_reason: Some(reason.into()),
            stage_reached,
            fidelity: None,
            duration: Duration::ZERO,
        }
    }

    pub fn with_fidelity(mut self, fidelity: Option<SchemaFidelity>) -> Self {
        self.fidelity = fidelity;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Serialize a [`Duration`] as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
