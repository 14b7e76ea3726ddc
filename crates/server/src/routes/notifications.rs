use axum::extract::State;
use axum::routing::{get, put};
use axum::Router;
use carelink_shared::notifications::{self, Notification};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extract::{ApiPath, ApiQuery, AuthenticatedCaller};
use crate::response::ApiResponse;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/{id}/read", put(mark_read))
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

async fn list(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> ApiResult<ApiResponse<Vec<Notification>>> {
    let items = notifications::list_notifications(&state.ctx, &caller, query.unread_only).await?;
    Ok(ApiResponse::ok(items))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<ApiResponse<()>> {
    notifications::mark_read(&state.ctx, &caller, id).await?;
    Ok(ApiResponse::ok(()).message("Notification marked as read"))
}
