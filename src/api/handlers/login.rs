use crate::credentials::{HttpTokenAcquirer, TokenAcquirer};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    secret: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("secret", &"***")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    token: String,
}

/// One-off login exchange with a caller supplied secret.
///
/// The token is handed back to the caller only; the gateway keeps using the one its
/// refresh task acquired.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token issued by the upstream", body = LoginResponse),
        (status = 400, description = "The upstream refused the secret or returned no usable token")
    ),
    security(("api_key" = [])),
    tag = "auth"
)]
pub async fn login(
    Extension(acquirer): Extension<HttpTokenAcquirer>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let secret = SecretString::from(request.secret);

    match acquirer.login(&secret).await {
        Ok(token) => {
            info!("Manual login succeeded");
            (
                StatusCode::OK,
                Json(LoginResponse {
                    token: token.expose().to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Manual login failed: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": e.to_string() })),
            )
                .into_response()
        }
    }
}
