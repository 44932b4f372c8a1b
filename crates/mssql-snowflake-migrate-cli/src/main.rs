//! mssql-snowflake-migrate CLI - replicate SQL Server tables into Snowflake.

use clap::{Parser, Subcommand};
use mssql_snowflake_migrate::{Config, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-snowflake-migrate")]
#[command(about = "Replicate SQL Server tables into Snowflake")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the configured tables
    Run {
        /// Only migrate this source table (repeatable)
        #[arg(long = "table", value_name = "SOURCE")]
        tables: Vec<String>,
    },

    /// Show the CREATE TABLE statements a run would execute
    Plan {
        /// Only plan this source table (repeatable)
        #[arg(long = "table", value_name = "SOURCE")]
        tables: Vec<String>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { tables } => {
            let jobs = config.selected_tables(&tables);
            if jobs.is_empty() {
                return Err(MigrateError::Config(format!(
                    "no configured table matches {:?}",
                    tables
                )));
            }

            let orchestrator = Orchestrator::new(config)?;
            let report = orchestrator.run(&jobs).await;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nMigration {}", report.status.replace('_', " "));
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!(
                    "  Tables: {}/{}",
                    report.tables_succeeded, report.tables_total
                );
                println!("  Rows: {}", report.rows_loaded);
                for outcome in &report.outcomes {
                    match &outcome.failure_reason {
                        None => println!(
                            "  OK     {} ({} rows)",
                            outcome.job, outcome.rows_loaded
                        ),
                        Some(reason) => println!(
                            "  FAILED {} at {}: {}",
                            outcome.job, outcome.stage_reached, reason
                        ),
                    }
                }
                if let Some(fatal) = &report.fatal {
                    println!("  Fatal: {}", fatal);
                }
            }

            if let Some(err) = report.error() {
                return Err(err);
            }
        }

        Commands::Plan { tables } => {
            let jobs = config.selected_tables(&tables);
            if jobs.is_empty() {
                return Err(MigrateError::Config(format!(
                    "no configured table matches {:?}",
                    tables
                )));
            }

            let orchestrator = Orchestrator::new(config)?;
            let plans = orchestrator.plan(&jobs).await;

            if cli.output_json {
                let json: Vec<_> = plans
                    .iter()
                    .map(|(job, plan)| match plan {
                        Ok(p) => serde_json::json!({
                            "source": job.source,
                            "destination": job.destination,
                            "fidelity": p.fidelity,
                            "columns": p.columns,
                            "ddl": p.ddl,
                        }),
                        Err(e) => serde_json::json!({
                            "source": job.source,
                            "destination": job.destination,
                            "error": e.to_string(),
                        }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                for (job, plan) in &plans {
                    println!("-- {}", job);
                    match plan {
                        Ok(p) => {
                            if p.fidelity.is_degraded() {
                                println!("-- schema fidelity: {:?}", p.fidelity);
                            }
                            println!("{};\n", p.ddl);
                        }
                        Err(e) => println!("-- FAILED: {}\n", e),
                    }
                }
            }

            let failed: Vec<String> = plans
                .iter()
                .filter(|(_, plan)| plan.is_err())
                .map(|(job, _)| job.source.clone())
                .collect();
            if !failed.is_empty() {
                return Err(MigrateError::TablesFailed(failed));
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MSSQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Destination (Snowflake): {} ({}ms)",
                    if result.destination_connected { "OK" } else { "FAILED" },
                    result.destination_latency_ms
                );
                if let Some(ref err) = result.destination_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if let Some(err) = result.into_error() {
                return Err(err);
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}
