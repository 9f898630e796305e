mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trendbot_core::{JobName, Source};
use trendbot_orchestrator::TrendBot;

#[derive(Debug, Parser)]
#[command(name = "trendbot")]
#[command(about = "Collect, analyse, and publish technology trends")]
struct Cli {
    /// Print JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sweep the trend sources once
    Collect {
        /// Restrict the sweep to these sources (comma-separated)
        #[arg(long = "source", value_delimiter = ',')]
        sources: Vec<Source>,

        /// Maximum items to request per source
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Analyse the items observed in the last N hours
    Analyze {
        /// Window length; defaults to TRENDBOT_ANALYSIS_HOURS_BACK
        #[arg(long)]
        hours_back: Option<u32>,
    },
    /// Publish the most recent eligible analysis
    Publish,
    /// Collect, analyse, then publish
    Cycle,
    /// Show job states, last outcomes, and recent receipts
    Status,
    /// Run one scheduled job now
    RunNow {
        /// collection, analysis, publishing, or cleanup
        job: JobName,
    },
    /// Start the scheduler and run until interrupted
    Run,
    /// Delete stored data older than the retention window
    Cleanup {
        /// Retention in days; defaults to TRENDBOT_RETENTION_DAYS
        #[arg(long)]
        days: Option<u32>,
    },
    /// Print a markdown report of the latest analysis
    Report {
        /// Item window when no analysis exists yet
        #[arg(long)]
        hours_back: Option<u32>,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
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

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = trendbot_core::load_app_config_from_env()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pool_config = trendbot_db::PoolConfig::from_app_config(&config);
    let pool = trendbot_db::connect_pool(&config.database_url, pool_config).await?;

    if let Commands::Db { command } = command {
        return match command {
            DbCommands::Migrate => {
                let applied = trendbot_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
                Ok(())
            }
            DbCommands::Ping => {
                trendbot_db::ping(&pool).await?;
                println!("database reachable at {}", config.database_url);
                Ok(())
            }
        };
    }

    trendbot_db::run_migrations(&pool).await?;
    let bot = TrendBot::from_config(pool, &config)?;
    let json = cli.json;

    match command {
        Commands::Collect { sources, limit } => {
            commands::run_collect(&bot, sources, limit, json).await
        }
        Commands::Analyze { hours_back } => {
            let hours_back = hours_back.unwrap_or(config.analysis_hours_back);
            commands::run_analyze(&bot, hours_back, json).await
        }
        Commands::Publish => commands::run_publish(&bot, json).await,
        Commands::Cycle => commands::run_cycle(&bot, json).await,
        Commands::Status => commands::run_status(&bot, json).await,
        Commands::RunNow { job } => commands::run_job_now(&bot, job, json).await,
        Commands::Run => run_scheduler(&bot).await,
        Commands::Cleanup { days } => {
            commands::run_cleanup(&bot, days.unwrap_or(config.retention_days), json).await
        }
        Commands::Report { hours_back } => {
            let hours_back = hours_back.unwrap_or(config.analysis_hours_back);
            commands::run_report(&bot, hours_back, json).await
        }
        Commands::Db { .. } => Ok(()),
    }
}

/// Run the timer loop until SIGINT/SIGTERM, then drain running jobs.
async fn run_scheduler(bot: &TrendBot) -> anyhow::Result<()> {
    bot.start_scheduled_operation().await?;
    println!("scheduler running; press ctrl-c to stop");
    shutdown_signal().await;
    bot.stop().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping scheduler");
}

#[cfg(test)]
mod tests;
