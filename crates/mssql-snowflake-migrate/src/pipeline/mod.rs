//! Per-table migration pipeline.
//!
//! - [`TableJob`]: Command pattern, one worklist entry
//! - [`TableMigrator`]: runs one job through
//!   extract → translate schema → create or replace → bulk load
//! - [`MigrationOutcome`]: what happened to one job
//!
//! A job failure is contained here: every error the migrator hits becomes a
//! failed outcome, never an `Err` that would stop the run.

mod job;
mod migrator;

pub use job::{JobStage, MigrationOutcome, TableJob};
pub use migrator::{MigratorConfig, TableMigrator, TablePlan};
