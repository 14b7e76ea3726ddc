//! Account administration

use axum::extract::State;
use axum::routing::put;
use axum::Router;
use identity_integrity::User;
use serde::Deserialize;

use super::government::VerifyRequest;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, AuthenticatedCaller};
use crate::response::ApiResponse;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/government/{id}/verify", put(verify_official))
        .route("/admin/users/{id}/active", put(set_active))
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

async fn verify_official(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(request): ApiJson<VerifyRequest>,
) -> ApiResult<ApiResponse<User>> {
    let user = state
        .auth
        .verify_government_official(&caller, user_id, request.decision, request.notes)
        .await?;
    Ok(ApiResponse::ok(user).message("Verification recorded"))
}

async fn set_active(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(request): ApiJson<ActiveRequest>,
) -> ApiResult<ApiResponse<User>> {
    let user = state.auth.set_active(&caller, user_id, request.active).await?;
    let message = if request.active { "Account activated" } else { "Account deactivated" };
    Ok(ApiResponse::ok(user).message(message))
}
