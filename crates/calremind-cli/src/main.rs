use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use calremind_calendar::CalendarSource;
use calremind_core::{load_config, read_config, send_test_notification, CalremindConfig};
use calremind_scheduler::run_until_cancelled;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod runtime;

use runtime::{build_calendar, build_engine, build_gateway, open_ledger};

#[derive(Parser)]
#[command(name = "calremind", version, about = "Calendar reminder daemon")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.calremind",
        help = "Config root directory (contains config/, credentials/ and data/)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run reminder cycles until interrupted")]
    Start,
    #[command(about = "Run a single reminder cycle")]
    Once,
    #[command(about = "Send a test notification through every channel")]
    Test,
    #[command(about = "Authorize calendar access")]
    Auth,
    #[command(about = "Validate the config file")]
    Validate,
    #[command(about = "Show delivered reminder statistics")]
    Stats,
}

fn expand_home(path: PathBuf) -> PathBuf {
    if !path.starts_with("~") {
        return path;
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(path.strip_prefix("~").unwrap_or(&path)),
        None => path,
    }
}

fn init_logging(root: &Path, level: &str) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "calremind.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = expand_home(cli.config_root);

    // Only the log level is needed here; errors resurface per command.
    let level = read_config(&root)
        .map(|c| c.log.level)
        .unwrap_or_else(|_| "info".to_string());
    let _guard = init_logging(&root, &level)?;

    match cli.command {
        Commands::Validate => {
            let config = load_config(&root)?;
            let gateway = build_gateway(&config.channels)?;
            println!(
                "Config valid. provider {:?} ({}), channels {:?}, check every {} min, lookahead {}h.",
                config.llm.provider,
                config.llm.model,
                gateway.channel_names(),
                config.reminders.check_interval_minutes,
                config.reminders.lookahead_hours,
            );
        }
        Commands::Start => {
            let config = load_config(&root)?;
            run_daemon(&config).await?;
        }
        Commands::Once => {
            let config = load_config(&root)?;
            let assembly = build_engine(&config)?;
            assembly.calendar.authenticate().await?;
            let report = assembly.engine.run_cycle_at(chrono::Utc::now()).await?;
            println!(
                "Cycle done: {} events, {} reminders sent, {} skipped, {} failed.",
                report.events_seen,
                report.reminders_sent,
                report.reminders_skipped,
                report.delivery_failures + report.event_failures,
            );
            println!("{}", assembly.ledger.stats().await?);
        }
        Commands::Test => {
            let config = load_config(&root)?;
            let gateway = build_gateway(&config.channels)?;
            if !send_test_notification(&gateway, chrono::Local::now()).await {
                bail!("test notification was not delivered by any channel");
            }
            println!("Test notification sent via {:?}.", gateway.channel_names());
        }
        Commands::Auth => {
            let config = read_config(&root)?;
            let calendar = build_calendar(&config.calendar)?;
            calendar.authenticate().await?;
            println!(
                "Calendar access authorized; token saved to {}.",
                config.calendar.token_path.display()
            );
        }
        Commands::Stats => {
            let config = read_config(&root)?;
            let ledger = open_ledger(&config.storage)?;
            println!("{}", ledger.stats().await?);
            for sent in ledger.recent(10).await? {
                println!(
                    "  {}  {} (fired {})",
                    sent.sent_at.format("%Y-%m-%d %H:%M"),
                    sent.event_title,
                    sent.fire_at.format("%Y-%m-%d %H:%M"),
                );
            }
        }
    }

    Ok(())
}

async fn run_daemon(config: &CalremindConfig) -> Result<()> {
    let assembly = build_engine(config)?;
    assembly.calendar.authenticate().await?;

    let interval = Duration::from_secs(u64::from(config.reminders.check_interval_minutes) * 60);
    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, stopping after the current cycle...");
        }
        shutdown.cancel();
    });

    tracing::info!(
        "calremind started: checking every {} min",
        config.reminders.check_interval_minutes
    );
    let cycles = run_until_cancelled(&assembly.engine, interval, token).await;
    tracing::info!("calremind stopped after {cycles} cycles");
    Ok(())
}
