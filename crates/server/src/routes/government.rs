//! Aggregate views and doctor verification for government accounts

use axum::extract::State;
use axum::routing::{get, put};
use axum::Router;
use carelink_shared::{AuditLogEntry, PaginatedResult, PaginationInput};
use identity_integrity::{PendingDoctor, User, VerificationDecision};
use reporting::{MetricPoint, MetricStatistics, Overview, PeriodReport, ReportPeriod, Surveillance};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthenticatedCaller};
use crate::response::ApiResponse;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/government/dashboard", get(dashboard))
        .route("/government/surveillance", get(surveillance))
        .route("/government/health-metrics", get(health_metrics))
        .route("/government/health-metrics/series", get(metric_series))
        .route("/government/report", get(report))
        .route("/government/audit-logs", get(audit_logs))
        .route("/government/doctors/pending", get(pending_doctors))
        .route("/government/doctors/{id}/verify", put(verify_doctor))
}

/// Reviewer decision body shared with the admin routes
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub decision: VerificationDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub period: ReportPeriod,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeriesQuery {
    pub metric_type: Option<String>,
    pub days: Option<i64>,
}

async fn dashboard(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<ApiResponse<Overview>> {
    Ok(ApiResponse::ok(reporting::overview(&state.ctx, &caller).await?))
}

async fn surveillance(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<ApiResponse<Surveillance>> {
    Ok(ApiResponse::ok(reporting::disease_surveillance(&state.ctx, &caller).await?))
}

async fn health_metrics(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<ApiResponse<MetricStatistics>> {
    Ok(ApiResponse::ok(reporting::metric_statistics(&state.ctx, &caller).await?))
}

async fn metric_series(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(query): ApiQuery<SeriesQuery>,
) -> ApiResult<ApiResponse<Vec<MetricPoint>>> {
    let points =
        reporting::metric_series(&state.ctx, &caller, query.metric_type.as_deref(), query.days).await?;
    Ok(ApiResponse::ok(points))
}

async fn report(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResult<ApiResponse<PeriodReport>> {
    let report = reporting::generate_report(&state.ctx, &caller, query.period).await?;
    Ok(ApiResponse::ok(report).message("Report generated"))
}

async fn audit_logs(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(pagination): ApiQuery<PaginationInput>,
) -> ApiResult<ApiResponse<PaginatedResult<AuditLogEntry>>> {
    Ok(ApiResponse::ok(reporting::audit_log(&state.ctx, &caller, &pagination).await?))
}

async fn pending_doctors(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<ApiResponse<Vec<PendingDoctor>>> {
    Ok(ApiResponse::ok(state.auth.pending_verifications(&caller).await?))
}

async fn verify_doctor(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(doctor_id): ApiPath<i64>,
    ApiJson(request): ApiJson<VerifyRequest>,
) -> ApiResult<ApiResponse<User>> {
    let user = state
        .auth
        .verify_doctor(&caller, doctor_id, request.decision, request.notes)
        .await?;
    Ok(ApiResponse::ok(user).message("Verification recorded"))
}
