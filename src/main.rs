//! TeleRAG - Telegram channel question answering bot
//!
//! Users register public Telegram channels as sources and ask questions; the
//! service indexes the channels' posts and answers from the closest ones.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use config::{LogFormat, LoggingConfig};
use telerag::{config, services::TeleRagService, utils::rotating_file::RotatingFileWriter, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    // Check for --help flag
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    // Check for --version flag
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("TeleRAG {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Check for --clear-database flag
    if args.iter().any(|arg| arg == "--clear-database") {
        let config = AppConfig::load_unvalidated().unwrap_or_default();
        return clear_database(&config);
    }

    // Check for --check-config flag
    if args.iter().any(|arg| arg == "--check-config") {
        return check_config();
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must be kept alive for the duration of the program
    // to ensure log messages are flushed to files
    let _log_guard = init_logging(&config);

    info!("TeleRAG {} starting up", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded successfully");

    ensure_data_directory(&config)?;

    let mut service = TeleRagService::new(config);
    service.start().await?;
    service.idle().await
}

/// Initialize the logging/tracing infrastructure
fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use config::LogTarget;
    use tracing_subscriber::{prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let log_config = &config.logging;

    let target = match (&log_config.target, create_file_writer(log_config)) {
        (LogTarget::Console, _) => None,
        (_, Ok(file)) => Some(file),
        (_, Err(e)) => {
            eprintln!("Warning: file logging disabled: {:#}", e);
            None
        }
    };

    match (target, &log_config.target) {
        (None, _) => {
            let subscriber = tracing_subscriber::registry().with(env_filter);
            init_console_logging(subscriber, &log_config.format);
            None
        }
        (Some((writer, guard)), LogTarget::File) => {
            let subscriber = tracing_subscriber::registry().with(env_filter);
            init_file_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
        (Some((writer, guard)), _) => {
            let subscriber = tracing_subscriber::registry().with(env_filter);
            init_both_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
    }
}

/// Create a non-blocking writer over the session log file
fn create_file_writer(
    log_config: &LoggingConfig,
) -> Result<(
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
)> {
    let policy = log_config.rotation_policy()?;
    let file = RotatingFileWriter::new(&log_config.log_dir, &log_config.log_prefix, policy)?;
    Ok(tracing_appender::non_blocking(file))
}

/// Initialize console-only logging
fn init_console_logging<S>(subscriber: S, format: &LogFormat)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(fmt::layer().compact().with_target(false))
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .init();
        }
    }
}

/// Initialize file-only logging
fn init_file_logging<S>(
    subscriber: S,
    format: &LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_target(true).with_writer(writer))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
        }
    }
}

/// Initialize both console and file logging
fn init_both_logging<S>(
    subscriber: S,
    format: &LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_target(true)) // Console
                .with(fmt::layer().json().with_target(true).with_writer(writer)) // File
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(fmt::layer().compact().with_target(false)) // Console
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                ) // File
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(fmt::layer().with_target(true)) // Console
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(writer),
                ) // File
                .init();
        }
    }
}

/// Ensure the directory of the SQLite file exists
fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    if let Some(path) = config.database.sqlite_path() {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
                info!("Created data directory: {:?}", parent);
            }
        }
    }
    Ok(())
}

/// Remove the SQLite database file and the local vector store directory
fn clear_database(config: &AppConfig) -> Result<()> {
    if let Some(path) = config.database.sqlite_path() {
        remove_path(&path)?;
    }
    if let Some(dir) = &config.vector_store.data_dir {
        remove_path(dir)?;
    }
    println!("Cleanup finished.");
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path).with_context(|| format!("Failed to remove {:?}", path))?;
        println!("Removed directory {:?}", path);
    } else if path.exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to remove {:?}", path))?;
        println!("Removed file {:?}", path);
    }
    Ok(())
}

/// Load and validate the configuration, then print a summary
fn check_config() -> Result<()> {
    let config = AppConfig::load().context("Configuration is invalid")?;
    println!("Configuration OK");
    println!("  server:        {}:{}", config.server.host, config.server.port);
    println!("  database:      {}", config.database.url);
    println!("  vector store:  {:?}", config.vector_store.backend);
    println!("  embedding:     {:?} ({})", config.embedding.provider, config.embedding.model);
    println!("  llm:           {} at {}", config.llm.model, config.llm.base_url);
    println!("  channel feed:  {}", config.scraper.feed_url);
    Ok(())
}

/// Print help message
fn print_help() {
    println!(
        r#"TeleRAG {}

USAGE:
    telerag [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --check-config          Load and validate the configuration, then exit
    --clear-database        Delete the SQLite database file and the local
                            vector store directory, then exit

ENVIRONMENT:
    TELERAG_CONFIG          Path to configuration file (default: config.yaml)
    TELEGRAM_BOT_TOKEN      Bot API token
    LLM_API_KEY             API key of the chat completion provider
    DATABASE_URL            SQLite database URL

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by TELERAG_CONFIG environment variable
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/telerag/config.yaml
    5. <user config dir>/telerag/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
