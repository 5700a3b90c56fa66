use crate::{
    credentials::{RefreshStatus, TokenStore},
    GIT_COMMIT_HASH,
};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    /// `present` once a token has been acquired, `absent` before that.
    token: String,
    /// Unix seconds of the last successful refresh.
    last_refresh: Option<u64>,
    /// Refresh ticks that exhausted every attempt since the last success.
    consecutive_refresh_failures: u32,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "An upstream token is available", body = Health),
        (status = 503, description = "No upstream token has been acquired yet", body = Health)
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(
    store: Extension<TokenStore>,
    status: Extension<RefreshStatus>,
) -> impl IntoResponse {
    let token_present = store.0.is_present();

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        token: if token_present { "present" } else { "absent" }.to_string(),
        last_refresh: status.0.last_success_unix(),
        consecutive_refresh_failures: status.0.consecutive_failures(),
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            error!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    if token_present {
        debug!("Upstream token is available");
        (StatusCode::OK, headers, Json(health))
    } else {
        debug!("Upstream token is not available");
        (StatusCode::SERVICE_UNAVAILABLE, headers, Json(health))
    }
}
