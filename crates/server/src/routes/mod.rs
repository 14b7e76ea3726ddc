//! Route table for `/api/v1`

mod admin;
mod appointments;
mod auth;
mod government;
mod notifications;
mod records;

use axum::Router;
use carelink_shared::PaginationInput;

use crate::AppState;

pub fn api() -> Router<AppState> {
    Router::new()
        .merge(auth::routes())
        .merge(appointments::routes())
        .merge(records::routes())
        .merge(government::routes())
        .merge(admin::routes())
        .merge(notifications::routes())
}

/// Pagination from optional `offset`/`limit` query fields
pub(crate) fn page(offset: Option<usize>, limit: Option<usize>) -> PaginationInput {
    let default = PaginationInput::default();
    PaginationInput {
        offset: offset.unwrap_or(default.offset),
        limit: limit.unwrap_or(default.limit),
    }
}
