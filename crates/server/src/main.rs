mod api;
mod app_config;
mod router;
mod session;
mod state;

use tracing::info;

/// Build shared state and start the HTTP server.
async fn serve(config: parley_core::Config) -> anyhow::Result<()> {
    config.log_summary();

    let state = app_config::build_state(&config)?;
    let app = router::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://localhost:{}", config.server.port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    parley_core::config::load_dotenv();
    let config = parley_core::Config::from_env();
    serve(config).await
}
