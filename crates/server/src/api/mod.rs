//! API module wiring the HTTP endpoints together.
//!
//! - `oauth2` - Authorization server and first-party session endpoints
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod health;
pub mod openapi;

pub use health::MISC_TAG;

use crate::AppResources;
use crate::oauth2::{self, OAuth2State, session_key};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the application router with its middleware and API docs.
pub fn app(state: OAuth2State) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(oauth2::router(state))
        .routes(routes!(health::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip_all)]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let config = resources.config.clone();
    let cookie_key = session_key(&config.session_secret);
    let state = OAuth2State::new(resources.db, resources.cipher, cookie_key, &config);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "Server running");
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
