//! askrelay CLI - relay chat questions to a hosted AI endpoint.

use askrelay::api::{create_router_with_state, AppState};
use askrelay::config::{Config, LogVerbosity};
use askrelay::dispatcher::{DispatchRequest, Dispatcher};
use askrelay::roles::RATE_WINDOW;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "askrelay")]
#[command(about = "Rate-limited relay between chat users and a hosted AI endpoint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Log verbosity level (overrides the config file)
        #[arg(short, long, value_enum)]
        log_level: Option<LogLevel>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Send one question and print the reply
    Ask {
        /// User id the request is accounted to
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Model key (see `/models`)
        #[arg(short, long)]
        model: Option<String>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// The question
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    Minimal,
    Compact,
    Verbose,
}

impl From<LogLevel> for LogVerbosity {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Minimal => LogVerbosity::Minimal,
            LogLevel::Compact => LogVerbosity::Compact,
            LogLevel::Verbose => LogVerbosity::Verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, log_level, config }) => {
            init_tracing(tracing::Level::INFO);
            run_server(port, log_level, config).await?;
        }
        Some(Commands::Ask { user, model, config, text }) => {
            init_tracing(tracing::Level::WARN);
            run_ask(user, model, config, text.join(" ")).await?;
        }
        Some(Commands::Config { path }) => {
            show_config(path)?;
        }
        None => {
            // Default: run server
            init_tracing(tracing::Level::INFO);
            run_server(None, None, None).await?;
        }
    }

    Ok(())
}

fn init_tracing(level: tracing::Level) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config.with_env_overrides())
}

async fn run_server(
    port_override: Option<u16>,
    log_level: Option<LogLevel>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(level) = log_level {
        config.app.log_verbosity = level.into();
    }

    let dispatcher = Arc::new(Dispatcher::from_config(&config)?);
    let app = create_router_with_state(AppState::new(Arc::clone(&dispatcher)));
    let sweeper = dispatcher.spawn_limiter_sweep(RATE_WINDOW);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    let addr = listener.local_addr()?;

    match config.app.log_verbosity {
        LogVerbosity::Minimal => {
            println!("askrelay:{}", addr.port());
        }
        LogVerbosity::Compact => {
            println!("→ askrelay starting on http://{}", addr);
            println!("→ Upstream: {}", config.upstream.base_url);
        }
        LogVerbosity::Verbose => {
            println!("────────────────────────────────────────");
            println!("askrelay v{}", env!("CARGO_PKG_VERSION"));
            println!("────────────────────────────────────────");
            println!("Relay:      http://{}", addr);
            println!("Ask:        http://{}/v1/ask", addr);
            println!("Health:     http://{}/health", addr);
            println!("Upstream:   {}", config.upstream.base_url);
            println!("Models:     {}", dispatcher.registry().keys().join(", "));
            println!("Admins:     {}", dispatcher.roles().admin_count());
            println!("────────────────────────────────────────");
            println!("Log Level:  {:?}", config.app.log_verbosity);
            println!("────────────────────────────────────────");
        }
    }

    tracing::info!("Relay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    println!("\nRelay stopped.");
    Ok(())
}

async fn run_ask(
    user: String,
    model: Option<String>,
    config_path: Option<PathBuf>,
    text: String,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let dispatcher = Dispatcher::from_config(&config)?;

    let reply = dispatcher
        .dispatch(DispatchRequest::new(user, model.as_deref(), text))
        .await;

    if !reply.is_delivered() {
        anyhow::bail!(reply.text);
    }
    println!("{}", reply.text);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn show_config(show_path: bool) -> anyhow::Result<()> {
    if show_path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    let config = Config::load()?.with_env_overrides();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
