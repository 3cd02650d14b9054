use tokio::net::TcpListener;
use tracing::info;
use competitor_monitor::{
    config::Config,
    api::routes::create_router,
    logging,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;
    logging::init()?;

    let server_addr = config.server_addr;
    let app_state = AppState::from_config(config)?;
    info!(
        analyzer = app_state.analyzer.name(),
        history = %app_state.history.path().display(),
        "Starting server on {}",
        server_addr
    );

    let app = create_router(app_state);
    let listener = TcpListener::bind(server_addr).await?;

    info!("Listening on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
