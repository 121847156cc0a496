//! CLI entrypoint and subcommand orchestration.

mod app;
mod command;
mod config;
#[cfg(test)]
mod test_support;

use std::io::Write;

use chat::SendOutcome;
use clap::{Parser, Subcommand};
use proto::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{App, Flow};
use crate::command::{Command, parse_command};
use crate::config::Config;

/// Top-level command-line arguments for the parley application.
#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Terminal chat client for OpenRouter-compatible models", version = "0.1.0")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Enable debug logging to ~/.parley/logs/debug.log
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// CLI subcommands available in the application.
#[derive(Subcommand)]
enum Commands {
    /// Start the interactive chat (default when no subcommand is given)
    Chat {
        /// Open this session id instead of a fresh one
        #[arg(short = 's', long)]
        session: Option<String>,
    },

    /// Send a single message and print the reply
    Send {
        /// Message text
        text: String,

        /// Session id to record the exchange under
        #[arg(short = 's', long)]
        session: Option<String>,
    },

    /// List available models
    Models {
        /// Only show models whose id or name contains this text
        query: Option<String>,

        /// Ignore the cached list and fetch again
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Console logs go to stderr so they never interleave with the transcript.
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>;

    if cli.debug {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let log_dir = std::path::PathBuf::from(home).join(".parley").join("logs");
        std::fs::create_dir_all(&log_dir).ok();
        let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        _file_guard = Some(guard);

        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter);
        let file = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .with_filter(EnvFilter::new("debug,hyper_util=info,rustls=info,reqwest=info"));
        tracing_subscriber::registry()
            .with(console)
            .with(file)
            .init();
        info!(version = env!("CARGO_PKG_VERSION"), "parley debug session started");
    } else {
        _file_guard = None;
        fmt()
            .with_env_filter(console_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Failed to load config: {e}. Using defaults.");
        Config::default()
    });

    match cli.command.unwrap_or(Commands::Chat { session: None }) {
        Commands::Chat { session } => run_chat(&config, session).await,
        Commands::Send { text, session } => run_send(&config, text, session).await,
        Commands::Models { query, refresh } => run_models(&config, query, refresh).await,
    }
}

/// Interactive REPL over stdin lines.
async fn run_chat(config: &Config, session: Option<String>) -> anyhow::Result<()> {
    let mut app = App::from_config(config)?;
    if let Some(id) = session {
        app.switch_to(SessionId::from(id));
    }

    let mut out = std::io::stdout();
    writeln!(out, "Session {}. Type /help for commands.", app.current())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };
        if app.handle(command, &mut out).await? == Flow::Quit {
            break;
        }
    }
    Ok(())
}

async fn run_send(config: &Config, text: String, session: Option<String>) -> anyhow::Result<()> {
    let mut app = App::from_config(config)?;
    if let Some(id) = session {
        app.switch_to(SessionId::from(id));
    }

    match app.pipeline().send(app.current(), &text).await? {
        SendOutcome::Delivered(reply) => {
            println!("{}", reply.text);
            Ok(())
        }
        SendOutcome::Failed(err) => Err(err.into()),
        SendOutcome::Discarded => anyhow::bail!("reply discarded"),
    }
}

async fn run_models(config: &Config, query: Option<String>, refresh: bool) -> anyhow::Result<()> {
    let mut app = App::from_config(config)?;
    if refresh {
        app.refresh_models();
    }
    let mut out = std::io::stdout();
    app.handle(Command::Models(query), &mut out).await?;
    Ok(())
}
