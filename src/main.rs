use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adea::anomaly::AnomalyDetector;
use adea::api::{self, AppState};
use adea::chat::{self, OpenAiAssistant};
use adea::config::Config;
use adea::db::Database;
use adea::models::{LogLevel, LogQuery};
use adea::render::render_log_table;

#[derive(Parser)]
#[command(name = "adea")]
#[command(about = "AI-powered assistant for debugging and monitoring data pipelines")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (default)
    Serve {
        /// Address to bind, overrides the configuration
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides the configuration
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Chat with the assistant in the terminal
    Chat,
    /// Show recent pipeline logs
    Logs {
        #[arg(long)]
        pipeline: Option<String>,

        /// INFO, WARNING, ERROR or CRITICAL
        #[arg(long, value_parser = parse_level)]
        level: Option<LogLevel>,

        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Train the detector and list anomalous logs
    Anomalies,
    /// Insert sample pipeline logs
    Seed,
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::from_str(&s.to_uppercase())
        .ok_or_else(|| format!("invalid level '{}', expected INFO/WARNING/ERROR/CRITICAL", s))
}

/// Server logs go to stdout; CLI commands log to stderr so their output stays clean.
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "adea=info,audit=info,tower_http=info".into()),
    );

    if use_stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let db = match &config.database.path {
        Some(path) => Database::open(path.clone())?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let serving = matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(!serving);

    let mut config = Config::load(cli.config.as_deref())?;
    let db = open_database(&config)?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, db).await?;
        }
        Commands::Chat => {
            let assistant = OpenAiAssistant::new(&config.openai);
            let stdin = std::io::stdin();
            chat::run_repl(
                &assistant,
                &config.query_log_path(),
                stdin.lock(),
                std::io::stdout(),
            )
            .await?;
        }
        Commands::Logs {
            pipeline,
            level,
            limit,
        } => {
            let logs = db.fetch_logs(&LogQuery {
                limit,
                pipeline,
                level,
            })?;
            if logs.is_empty() {
                println!("No logs found with the current filters.");
            } else {
                print!("{}", render_log_table("Pipeline Logs", &logs));
            }
        }
        Commands::Anomalies => {
            let detector = AnomalyDetector::new(db, &config.anomaly);
            detector.train_model()?;
            let anomalies = detector.detect_anomalies(None)?;
            if anomalies.is_empty() {
                println!("No anomalies detected!");
            } else {
                println!("Detected {} anomalies:", anomalies.len());
                print!("{}", render_log_table("Detected Anomalies", &anomalies));
            }
        }
        Commands::Seed => {
            let logs = db.insert_sample_logs()?;
            println!("Inserted {} sample logs.", logs.len());
        }
    }

    Ok(())
}

async fn serve(config: Config, db: Database) -> anyhow::Result<()> {
    let state = AppState::from_config(&config, db)?;

    if !state.security.auth_enabled() {
        tracing::warn!("No auth.password or auth.api_key configured; protected routes are open");
    }
    if let Err(e) = state.detector.train_model() {
        tracing::error!("Error training anomaly detection model: {:#}", e);
    }

    spawn_housekeeping(&state, config.cache_ttl().max(Duration::from_secs(60)));

    let app = api::create_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("ADEA API listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

/// Periodically evict expired cache entries, tokens and rate-limit windows.
fn spawn_housekeeping(state: &AppState, every: Duration) {
    let cache = state.cache.clone();
    let security = state.security.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!("Purged {} expired cache entries", purged);
            }
            security.tokens.cleanup();
            if let Some(limiter) = &security.rate_limiter {
                limiter.cleanup();
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
