//! Arfa - logs what AI coding agents send to and receive from LLM APIs.
//!
//! - `arfa proxy` runs the interception proxy and writes classified entries
//! - `arfa report` renders session reports from a written log

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use arfa_app::report::{read_entries, render, ReportOptions};
use arfa_app::sink::JsonlSink;
use arfa_core::Formatter;
use arfa_proxy::{CaManager, LogSink, ProxyConfig, ProxyServer, SessionIdentity};
use clap::{Parser, Subcommand};
use directories::BaseDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Arfa - LLM traffic logging for AI coding agents
#[derive(Parser, Debug)]
#[command(name = "arfa", version, about)]
struct Args {
    /// Enable debug logging (also logs to the console)
    #[arg(long, global = true)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the interception proxy
    Proxy {
        /// Session id stamped onto entries
        #[arg(long, default_value = "")]
        session_id: String,

        /// Agent name, e.g. claude-code
        #[arg(long, default_value = "")]
        client_name: String,

        /// Agent version
        #[arg(long, default_value = "")]
        client_version: String,

        /// Append entries to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Directory holding the CA certificate and key
        #[arg(long)]
        ca_dir: Option<PathBuf>,
    },

    /// Render session reports from a JSONL log
    Report {
        /// Log file written by `arfa proxy`
        file: PathBuf,

        /// Only report this session
        #[arg(long)]
        session: Option<String>,

        /// Use plain text labels
        #[arg(long)]
        no_emoji: bool,

        /// Truncate content to this many characters (0 = no limit)
        #[arg(long, default_value_t = 500)]
        max_content: usize,

        /// Print session summaries as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".arfa").join("logs"))
}

/// Initialize logging with file rotation.
///
/// The console layer writes to stderr so it never mixes with JSONL on stdout.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("arfa={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("arfa")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                if args.debug {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stderr))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

async fn run_proxy(
    session: SessionIdentity,
    output: Option<PathBuf>,
    ca_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let sink: Arc<dyn LogSink> = match &output {
        Some(path) => Arc::new(JsonlSink::append_to(path)?),
        None => Arc::new(JsonlSink::stdout()),
    };

    let ca_manager = match ca_dir {
        Some(dir) => CaManager::new(dir),
        None => CaManager::with_default_dir().context("Failed to resolve CA directory")?,
    };
    let config = ProxyConfig::from_ca_manager(ca_manager).with_session(session);

    let mut server = ProxyServer::new(config, sink);
    server.start().await.context("Failed to start proxy")?;

    if let Some(url) = server.proxy_url() {
        eprintln!("Proxy listening on {}", url);
    }
    eprintln!("CA certificate: {}", server.ca_cert_path().display());
    eprintln!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutdown requested");
    server.shutdown().await?;
    Ok(())
}

fn run_report(file: PathBuf, formatter: Formatter, options: ReportOptions) -> anyhow::Result<()> {
    let entries = read_entries(&file)?;
    if entries.is_empty() {
        eprintln!("No entries in {}", file.display());
        return Ok(());
    }

    println!("{}", render(entries, &formatter, &options)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    tracing::debug!("Args: {:?}", args);

    match args.command {
        Command::Proxy {
            session_id,
            client_name,
            client_version,
            output,
            ca_dir,
        } => {
            let session = SessionIdentity::new(session_id, client_name, client_version);
            run_proxy(session, output, ca_dir).await
        }
        Command::Report {
            file,
            session,
            no_emoji,
            max_content,
            json,
        } => {
            let formatter = Formatter::new()
                .with_emoji(!no_emoji)
                .with_max_content_length(max_content);
            run_report(file, formatter, ReportOptions { session, json })
        }
    }
}
