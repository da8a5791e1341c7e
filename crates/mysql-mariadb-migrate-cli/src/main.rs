//! mysql-mariadb-migrate CLI - Batch table migration from MySQL to MariaDB.

use clap::{Parser, Subcommand};
use mysql_mariadb_migrate::{
    Catalog, Config, MigrateError, MigrationSummary, Orchestrator, OutcomeStatus,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mysql-mariadb-migrate")]
#[command(about = "Batch table migration from MySQL to MariaDB")]
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
    /// Migrate every table of a catalog
    Run {
        /// Path to YAML table catalog
        #[arg(long, default_value = "tables.yaml")]
        catalog: PathBuf,

        /// Override number of workers
        #[arg(long)]
        workers: Option<usize>,

        /// Dry run: validate and show plan without transferring data
        #[arg(long)]
        dry_run: bool,
    },

    /// Test database connections
    HealthCheck,

    /// Load and validate the configuration file
    CheckConfig,
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

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::CheckConfig => {
            if cli.output_json {
                let report = serde_json::json!({
                    "valid": true,
                    "source": format!("{}:{}/{}", config.source.host, config.source.port, config.source.database),
                    "target": format!("{}:{}/{}", config.target.host, config.target.port, config.target.database),
                    "fingerprint": config.fingerprint(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Configuration OK: {}", cli.config.display());
                println!("  Source: {}:{}/{}", config.source.host, config.source.port, config.source.database);
                println!("  Target: {}:{}/{}", config.target.host, config.target.port, config.target.database);
                println!("  Batch size: {}", config.migration.transaction_size);
            }
        }

        Commands::Run {
            catalog,
            workers,
            dry_run,
        } => {
            if let Some(w) = workers {
                config.migration.workers = Some(w);
            }
            if dry_run {
                config.migration.dry_run = true;
            }
            config.validate()?;
            let config = config.with_auto_tuning();

            let catalog = Catalog::load(&catalog)?;
            info!("Loaded {} tables from catalog", catalog.len());

            let orchestrator = Orchestrator::from_config(config)?;
            let summary = orchestrator.run(catalog.into_tables()).await;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                print_summary(&summary, dry_run);
            }

            if !summary.is_success() {
                return Err(MigrateError::transfer(
                    summary.failed_tables.join(", "),
                    format!("{} of {} tables failed", summary.tables_failed, summary.tables_total),
                ));
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::from_config(config)?;
            let result = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (MariaDB): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::pool("Health check failed", "health-check"));
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &MigrationSummary, dry_run: bool) {
    let status_msg = if dry_run { "Dry run completed!" } else { "Migration completed!" };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", summary.run_id);
    println!("  Duration: {:.2}s", summary.duration_seconds);
    println!(
        "  Tables: {} migrated, {} skipped, {} failed (of {})",
        summary.tables_migrated, summary.tables_skipped, summary.tables_failed, summary.tables_total
    );
    println!("  Rows: {}", summary.rows_migrated);
    if summary.rows_lost > 0 {
        println!("  Rows lost: {}", summary.rows_lost);
    }
    println!("  Throughput: {} rows/sec", summary.rows_per_second);

    for outcome in summary.tables.iter().filter(|o| o.status == OutcomeStatus::Aborted) {
        println!(
            "  Failed: {} - {}",
            outcome.table,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Keep stdout for progress lines and the summary
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
