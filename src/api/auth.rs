use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutRequest {
    /// The access token to invalidate
    pub token: String,
    /// Remaining natural lifetime of the token in seconds; the ledger
    /// entry expires together with the token
    pub expires_in_secs: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub revoked: bool,
}

/// Revoke a token ahead of its natural expiry
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Token revoked until its natural expiry", body = LogoutResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    Json(request): Json<LogoutRequest>,
) -> Json<LogoutResponse> {
    state
        .revocations
        .revoke(&request.token, request.expires_in_secs)
        .await;
    Json(LogoutResponse { revoked: true })
}
