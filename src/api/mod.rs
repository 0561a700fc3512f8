//! HTTP adapter: routes and handlers mapping request paths to core
//! operations.

pub mod health;
pub mod resolve;
pub mod well_known;

use crate::context::AppContext;
use crate::error::ErrorResponse;
use crate::rate_limit::rate_limit_middleware;
use axum::{
    http::{Method, StatusCode},
    middleware,
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the public router.
pub fn router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    // Only the resolve endpoint is rate limited.
    let resolve_routes = Router::new()
        .route("/_cryptalias/resolve/:ticker/:alias", get(resolve::resolve))
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/healthz", get(health::healthz))
        .route(
            "/.well-known/cryptalias/configuration",
            get(well_known::configuration),
        )
        .route("/.well-known/cryptalias/keys", get(well_known::keys))
        .route("/.well-known/cryptalias/status", get(well_known::status))
        .merge(resolve_routes)
        .with_state(ctx)
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "NotFound".to_string(),
            message: "endpoint not found".to_string(),
        }),
    )
}
