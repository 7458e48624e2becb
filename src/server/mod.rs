pub mod handlers;
pub mod types;

pub use handlers::AppState;

use crate::{Result, config::Config, service::ClassifierService};
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub fn router(state: AppState, cors: bool) -> Router {
    let app = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict))
        .route("/classify", post(handlers::classify))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Loads the model bundle, then binds and serves. The listener is never
/// bound if the bundle fails to load.
pub async fn run(config: Config) -> Result<()> {
    let classifier = ClassifierService::from_config(&config.model).await?;

    let app_state = AppState::new(config.model.path.clone(), classifier);
    let app = router(app_state, config.server.cors);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
