use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use waybank::session::SWEEP_INTERVAL;
use waybank::{api, init_db, Config, DefiLlamaSource, Repository, YieldSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let repo = Arc::new(Repository::new(pool));
    let source: Arc<dyn YieldSource> =
        Arc::new(DefiLlamaSource::new(config.yields_api_url.clone()));

    let state = api::AppState::new(repo, config, source);

    // Background jobs
    state.sessions.clone().spawn_sweeper(SWEEP_INTERVAL);
    state.scheduler.clone().spawn();

    let app = api::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
