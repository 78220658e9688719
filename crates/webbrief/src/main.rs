use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use webbrief::api::{self, AppState};
use webbrief_local::{aggregator_from_settings, config, run_with_deadline, Settings};

#[derive(Parser, Debug)]
#[command(name = "webbrief")]
#[command(about = "Search the web for a query and summarize what it finds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one query through the pipeline and print the result (json).
    Search(SearchCmd),
    /// Serve the HTTP API (`POST /api/search`, `GET /healthz`).
    Serve(ServeCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// The search query.
    #[arg(long)]
    query: String,
    /// Print the full run report (outcome, highlights, timings) instead of just the result.
    #[arg(long, default_value_t = false)]
    report: bool,
    /// Wall-clock budget in milliseconds (defaults to WEBBRIEF_REQUEST_BUDGET_MS).
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    /// Listen address (defaults to WEBBRIEF_BIND, else 0.0.0.0:$PORT).
    #[arg(long)]
    bind: Option<String>,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing() {
    // Logs go to stderr so stdout stays clean for JSON output.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webbrief=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let loaded = config::load_env_file_from_env();
    if loaded > 0 {
        tracing::debug!(vars = loaded, "loaded env file");
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Search(args) => {
            if args.query.trim().is_empty() {
                anyhow::bail!("Query parameter is required");
            }
            let settings = Settings::from_env();
            let budget =
                Duration::from_millis(args.timeout_ms.unwrap_or(settings.request_budget_ms));
            let aggregator = Arc::new(
                aggregator_from_settings(&settings).context("failed to build the pipeline")?,
            );
            let report = run_with_deadline(aggregator, &args.query, budget).await;
            let out = if args.report {
                serde_json::to_string(&report)?
            } else {
                serde_json::to_string(&report.result)?
            };
            println!("{out}");
        }
        Commands::Serve(args) => {
            let settings = Settings::from_env();
            let state = Arc::new(AppState {
                aggregator: Arc::new(
                    aggregator_from_settings(&settings).context("failed to build the pipeline")?,
                ),
                budget: Duration::from_millis(settings.request_budget_ms),
            });
            let addr = args.bind.unwrap_or_else(config::bind_from_env);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            tracing::info!(addr = %addr, "webbrief API listening");
            axum::serve(listener, api::router(state)).await?;
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "webbrief",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("webbrief {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }

    Ok(())
}
