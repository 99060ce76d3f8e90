mod errors;
pub mod handlers;

pub use errors::AppError;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::Pipeline;

/// Shared application state accessible by all handlers.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Expose `GET /debug/states`. Development only.
    pub debug_endpoints: bool,
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>, max_body: usize) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::index))
        .route("/form", get(handlers::form_page).post(handlers::submit_form))
        .route(
            "/coding-test/{token}",
            get(handlers::view_coding_test).post(handlers::submit_coding_test),
        )
        .route(
            "/tech-interview/{token}",
            get(handlers::view_tech_interview).post(handlers::submit_tech_interview),
        )
        .route(
            "/hr-interview/{token}",
            get(handlers::view_hr_interview).post(handlers::submit_hr_interview),
        )
        .route("/offer-letter/{token}", get(handlers::offer_letter))
        .route("/health", get(handlers::health));

    if state.debug_endpoints {
        app = app.route("/debug/states", get(handlers::debug_states));
    }

    app.layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(host: &str, port: u16, state: Arc<AppState>, max_body: usize) -> Result<()> {
    if state.debug_endpoints {
        warn!("Debug endpoints are enabled; /debug/states exposes every candidate record");
    }
    let app = router(state, max_body);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("HirePipe server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
