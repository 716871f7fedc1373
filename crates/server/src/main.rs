use anyhow::{Context, Result};
use churn_core::config::{self, AppConfig};
use churn_core::pipeline::{self, IngestContext};
use churn_core::FilterCriteria;
use clap::{Args, Parser, Subcommand};
use server::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use storage::{clients, connect, migrate};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => run_serve(cfg, bind).await,
        Commands::Ingest { archive } => run_ingest(cfg, archive).await,
        Commands::Predict { filters, upload } => run_predict(cfg, filters, upload).await,
        Commands::Clients => run_clients(cfg).await,
    }
}

#[derive(Parser)]
#[command(name = "churn-server")]
#[command(about = "Client churn scoring backend", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long, env = "CHURN_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve {
        /// Listen address, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Unpack a ZIP bundle and print its distinct cities
    Ingest {
        /// Path to the archive
        archive: PathBuf,
    },
    /// Score clients against an uploaded bundle and store the matches
    Predict {
        #[command(flatten)]
        filters: FilterArgs,
        /// Upload id; defaults to the most recent upload
        #[arg(long)]
        upload: Option<String>,
    },
    /// Print every stored client
    Clients,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    is_msp: Option<String>,
    #[arg(long)]
    company_size: Option<String>,
    #[arg(long)]
    city_actual: Option<String>,
    #[arg(long)]
    city_legal: Option<String>,
    #[arg(long)]
    shipper: Option<String>,
    #[arg(long)]
    consignee: Option<String>,
}

impl From<FilterArgs> for FilterCriteria {
    fn from(args: FilterArgs) -> Self {
        FilterCriteria {
            is_msp: args.is_msp,
            company_size: args.company_size,
            city_actual: args.city_actual,
            city_legal: args.city_legal,
            shipper: args.shipper,
            consignee: args.consignee,
        }
    }
}

async fn build_context(cfg: AppConfig) -> Result<IngestContext> {
    let pool = connect(&cfg.database.path).await.context("db connect")?;
    migrate(&pool).await.context("db migrate")?;

    let registry = pipeline::build_registry(&cfg)?;
    let gateway = registry
        .predictor(None)
        .with_context(|| format!("prediction provider `{}`", cfg.gateway.provider))?;
    info!(provider = %cfg.gateway.provider, available = ?registry.names(), "prediction gateway ready");

    Ok(IngestContext::new(pool, gateway, Arc::new(cfg))?)
}

async fn run_serve(cfg: AppConfig, bind: Option<String>) -> Result<()> {
    let addr = bind.unwrap_or_else(|| cfg.server.bind.clone());
    info!(
        "Starting churn-server v{} (uploads under {})",
        env!("CARGO_PKG_VERSION"),
        cfg.storage.uploads_root().display()
    );
    let ctx = build_context(cfg).await?;
    let app = build_router(AppState::new(ctx));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_ingest(cfg: AppConfig, archive: PathBuf) -> Result<()> {
    let bytes = tokio::fs::read(&archive)
        .await
        .with_context(|| format!("read {}", archive.display()))?;
    let ctx = build_context(cfg).await?;
    let report = pipeline::scan_upload(&ctx, bytes).await?;
    let out = serde_json::json!({
        "upload": report.upload.id,
        "cities": report.cities,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run_predict(cfg: AppConfig, filters: FilterArgs, upload: Option<String>) -> Result<()> {
    let ctx = build_context(cfg).await?;
    let bundle = pipeline::resolve_bundle(&ctx, upload.as_deref()).await?;
    let report = pipeline::run_listing(&ctx, filters.into(), bundle.as_ref()).await?;
    let out = serde_json::json!({
        "clients": report.clients,
        "unmatched": report.unmatched,
        "failures": report.failures,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run_clients(cfg: AppConfig) -> Result<()> {
    let pool = connect(&cfg.database.path).await.context("db connect")?;
    migrate(&pool).await.context("db migrate")?;
    let all = clients::list(&pool).await?;
    println!("{}", serde_json::to_string_pretty(&all)?);
    Ok(())
}
