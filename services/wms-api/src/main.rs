//! Map service API server.
//!
//! Loads the layer configuration, keeps styles fresh by polling their files
//! and serves a JSON API describing layers and styles.

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use wms_api::{router, state::AppState};

#[derive(Parser, Debug)]
#[command(name = "wms-api")]
#[command(about = "Map service layer and style API server")]
struct Args {
    /// Layer configuration file
    #[arg(short, long, env = "LAYERS_CONFIG", default_value = "config/layers.yaml")]
    config: PathBuf,

    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// PostgreSQL database holding stored styles
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Schema of the styling tables
    #[arg(long, env = "STYLES_SCHEMA", default_value = "public")]
    schema: String,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Some(threads) = env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
    {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))?;
    Ok(())
}

async fn async_main(args: Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(config = %args.config.display(), "Starting map service API server");

    let state = Arc::new(AppState::new(&args.config, args.database_url.as_deref(), &args.schema).await?);
    let app = router(state);

    let addr: SocketAddr = args.listen.parse()?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
