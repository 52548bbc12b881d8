mod metrics;
mod schema;
mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sellerdash_core::{ReportType, TypeRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sellerdash-cli")]
#[command(about = "Seller report ingestion and metrics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Ingest a Seller Central CSV export
    Upload {
        /// business, advertising, inventory or returns
        #[arg(long)]
        report_type: ReportType,
        /// Id of the user submitting the file
        #[arg(long)]
        submitter: i64,
        /// Path to the CSV file
        path: PathBuf,
    },
    /// List a submitter's uploads, newest first
    History {
        #[arg(long)]
        submitter: i64,
        /// Maximum number of uploads to show (1-200)
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Evaluate metrics over a store's persisted rows
    Metrics {
        #[arg(long)]
        report_type: ReportType,
        #[arg(long)]
        store: i64,
        /// First day of the range (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Last day of the range, inclusive
        #[arg(long)]
        to: NaiveDate,
        /// Metric id; repeat for several. Defaults to the report type's catalog.
        #[arg(long = "metric")]
        metrics: Vec<String>,
        /// Also evaluate the preceding period and flag drops
        #[arg(long)]
        compare_previous: bool,
    },
    /// Print the expected CSV columns for a report type
    Schema {
        #[arg(long)]
        report_type: ReportType,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // `schema` only reads the built-in registry, so it runs without a
    // database or configuration.
    if let Some(Commands::Schema { report_type }) = &cli.command {
        init_tracing("info")?;
        let registry = TypeRegistry::default();
        return schema::run_schema(&registry, *report_type);
    }

    let Some(command) = cli.command else {
        println!("sellerdash-cli: run with --help to list commands");
        return Ok(());
    };

    let config = sellerdash_core::load_app_config()?;
    init_tracing(&config.log_level)?;

    let pool_config = sellerdash_db::PoolConfig::from_app_config(&config);
    let pool = sellerdash_db::connect_pool(&config.database_url, pool_config).await?;
    let registry = Arc::new(TypeRegistry::standard(&config.returns_policy()));

    match command {
        Commands::Db { command } => match command {
            DbCommands::Migrate => {
                let applied = sellerdash_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
            DbCommands::Ping => {
                sellerdash_db::ping(&pool).await?;
                println!("database reachable");
            }
        },
        Commands::Upload {
            report_type,
            submitter,
            path,
        } => {
            upload::run_upload(&pool, &config, registry, report_type, submitter, &path).await?;
        }
        Commands::History { submitter, limit } => {
            upload::run_history(&pool, &config, registry, submitter, limit).await?;
        }
        Commands::Metrics {
            report_type,
            store,
            from,
            to,
            metrics: metric_ids,
            compare_previous,
        } => {
            let request = metrics::MetricsRequest {
                report_type,
                store_id: store,
                from,
                to,
                metric_ids,
                compare_previous,
            };
            metrics::run_metrics(&pool, registry, &request).await?;
        }
        Commands::Schema { .. } => {}
    }

    Ok(())
}

fn init_tracing(fallback_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests;
