use anyhow::Context;
use matchday::api;
use matchday::challenge_manager::ChallengeManager;
use matchday::config::AppConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,matchday=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load().context("failed to load configuration")?;

    let manager = match &config.database_path {
        Some(path) => ChallengeManager::with_db(path)
            .with_context(|| format!("failed to open database at {path}"))?,
        None => {
            tracing::warn!("MATCHDAY_DATABASE_PATH not set, state will not survive a restart");
            ChallengeManager::new()
        }
    };

    let sweeper = manager.spawn_expiry_sweeper(config.sweep_interval());
    let app = api::router(manager);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "matchday server listening");

    axum::serve(listener, app).await.context("server error")?;
    sweeper.abort();
    Ok(())
}
