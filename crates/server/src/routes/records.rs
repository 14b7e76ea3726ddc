//! Medical records and health metrics

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use carelink_shared::{PaginatedResult, PaginationInput};
use records_integrity::{CreateMetricInput, CreateRecordInput, HealthMetric, MedicalRecord};
use serde::Deserialize;

use super::page;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthenticatedCaller};
use crate::response::ApiResponse;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/patients/{id}/records", get(list_records).post(add_record))
        .route("/patients/{id}/metrics", get(patient_metrics))
        .route("/metrics", get(own_metrics).post(add_metric))
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricQuery {
    pub metric_type: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

async fn add_record(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(patient_id): ApiPath<i64>,
    ApiJson(input): ApiJson<CreateRecordInput>,
) -> ApiResult<ApiResponse<MedicalRecord>> {
    let record = records::add_record(&state.ctx, &caller, patient_id, input).await?;
    Ok(ApiResponse::created("Medical record created", record))
}

async fn list_records(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(patient_id): ApiPath<i64>,
    ApiQuery(pagination): ApiQuery<PaginationInput>,
) -> ApiResult<ApiResponse<PaginatedResult<MedicalRecord>>> {
    let records = records::list_records(&state.ctx, &caller, patient_id, &pagination).await?;
    Ok(ApiResponse::ok(records))
}

async fn patient_metrics(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiPath(patient_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<MetricQuery>,
) -> ApiResult<ApiResponse<PaginatedResult<HealthMetric>>> {
    let pagination = page(query.offset, query.limit);
    let metrics = records::list_metrics(
        &state.ctx,
        &caller,
        patient_id,
        query.metric_type.as_deref(),
        &pagination,
    )
    .await?;
    Ok(ApiResponse::ok(metrics))
}

async fn own_metrics(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(query): ApiQuery<MetricQuery>,
) -> ApiResult<ApiResponse<PaginatedResult<HealthMetric>>> {
    let pagination = page(query.offset, query.limit);
    let metrics = records::list_metrics(
        &state.ctx,
        &caller,
        caller.user_id,
        query.metric_type.as_deref(),
        &pagination,
    )
    .await?;
    Ok(ApiResponse::ok(metrics))
}

async fn add_metric(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiJson(input): ApiJson<CreateMetricInput>,
) -> ApiResult<ApiResponse<HealthMetric>> {
    let metric = records::add_metric(&state.ctx, &caller, input).await?;
    Ok(ApiResponse::created("Health metric recorded", metric))
}
