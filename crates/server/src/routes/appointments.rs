//! Booking and the appointment lifecycle

use axum::extract::State;
use axum::routing::{get, put};
use axum::Router;
use carelink_shared::PaginatedResult;
use chrono::{DateTime, NaiveDate, Utc};
use scheduling_integrity::{Appointment, AppointmentFilter, AppointmentStatus, BookAppointmentInput};
use serde::Deserialize;

use super::page;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthenticatedCaller};
use crate::response::ApiResponse;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list).post(book))
        .route("/appointments/available-slots", get(available_slots))
        .route("/appointments/{id}", get(show))
        .route("/appointments/{id}/confirm", put(confirm))
        .route("/appointments/{id}/complete", put(complete))
        .route("/appointments/{id}/cancel", put(cancel))
        .route("/appointments/{id}/reschedule", put(reschedule))
        .route("/appointments/{id}/no-show", put(no_show))
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQuery {
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: i64,
    pub date: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub appointment_date: DateTime<Utc>,
}

async fn book(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiJson(input): ApiJson<BookAppointmentInput>,
) -> ApiResult<ApiResponse<Appointment>> {
    let appointment = scheduling::book(&state.ctx, &caller, input).await?;
    Ok(ApiResponse::created("Appointment booked", appointment))
}

async fn list(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(query): ApiQuery<AppointmentQuery>,
) -> ApiResult<ApiResponse<PaginatedResult<Appointment>>> {
    let filter = AppointmentFilter {
        status: query.status,
        from: query.from,
        to: query.to,
    };
    let pagination = page(query.offset, query.limit);
    let appointments = scheduling::list(&state.ctx, &caller, &filter, &pagination).await?;
    Ok(ApiResponse::ok(appointments))
}

async fn available_slots(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(query): ApiQuery<SlotQuery>,
) -> ApiResult<ApiResponse<Vec<DateTime<Utc>>>> {
    let slots = scheduling::available_slots(&state.ctx, &caller, query.doctor_id, query.date).await?;
    Ok(ApiResponse::ok(slots))
}

async fn show(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<ApiResponse<Appointment>> {
    Ok(ApiResponse::ok(scheduling::get(&state.ctx, &caller, id).await?))
}

async fn confirm(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<ApiResponse<Appointment>> {
    let appointment = scheduling::confirm(&state.ctx, &caller, id).await?;
    Ok(ApiResponse::ok(appointment).message("Appointment confirmed"))
}

async fn complete(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<CompleteRequest>,
) -> ApiResult<ApiResponse<Appointment>> {
    let appointment = scheduling::complete(&state.ctx, &caller, id, request.notes).await?;
    Ok(ApiResponse::ok(appointment).message("Appointment completed"))
}

async fn cancel(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<CancelRequest>,
) -> ApiResult<ApiResponse<Appointment>> {
    let appointment = scheduling::cancel(&state.ctx, &caller, id, request.reason).await?;
    Ok(ApiResponse::ok(appointment).message("Appointment cancelled"))
}

async fn reschedule(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<RescheduleRequest>,
) -> ApiResult<ApiResponse<Appointment>> {
    let appointment = scheduling::reschedule(&state.ctx, &caller, id, request.appointment_date).await?;
    Ok(ApiResponse::ok(appointment).message("Appointment rescheduled"))
}

async fn no_show(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<ApiResponse<Appointment>> {
    let appointment = scheduling::mark_no_show(&state.ctx, &caller, id).await?;
    Ok(ApiResponse::ok(appointment).message("Appointment marked as no-show"))
}
