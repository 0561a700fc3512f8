//! Liveness endpoint intended for container health checks.

use crate::context::AppContext;
use crate::documents::{HealthDocument, VERSION};
use axum::{extract::State, Json};
use chrono::Utc;

/// Always returns 200 while the process is up; the body reports domain
/// health observed by the verifier.
pub async fn healthz(State(ctx): State<AppContext>) -> Json<HealthDocument> {
    let unhealthy = ctx
        .statuses
        .list()
        .iter()
        .filter(|status| !status.healthy)
        .count();

    Json(HealthDocument {
        status: "ok".to_string(),
        version: VERSION,
        time: Utc::now(),
        overall_ok: unhealthy == 0,
        unhealthy_domains: unhealthy,
    })
}
