use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use myacademics::api::router;
use myacademics::config::AppConfig;
use myacademics::db;
use myacademics::shutdown;
use myacademics::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = db::connect(&config.database_url, 5).await?;

    let state = AppState::new(pool, config.queue_concurrency, config.presence_ttl);
    let queue = state.queue.clone();
    let app = router(state);

    info!("listening on http://{}", config.bind_addr);
    info!(
        "calculation queue concurrency: {}, cursor ttl: {:?}",
        config.queue_concurrency, config.presence_ttl
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::drain_on(tokio::signal::ctrl_c(), queue))
        .await?;

    info!("server stopped");

    Ok(())
}
