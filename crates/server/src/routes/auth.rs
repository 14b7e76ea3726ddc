//! Registration, login and the caller's own account

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use carelink_shared::{PaginatedResult, PaginationInput};
use identity::Session;
use identity_integrity::{
    DoctorListing, DoctorProfileInput, GovernmentProfileInput, LoginInput, PatientProfileInput,
    ProfileInput, RegisterInput, UpdateProfileInput, User, UserProfile,
};
use reporting::DashboardStats;
use scheduling_integrity::DoctorPatient;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery, AuthenticatedCaller, ClientAddr};
use crate::response::ApiResponse;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/patient/signup", post(patient_signup))
        .route("/auth/doctor/signup", post(doctor_signup))
        .route("/auth/government/signup", post(government_signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/me", get(me).put(update_me))
        .route("/doctors", get(list_doctors))
        .route("/doctors/patients", get(doctor_patients))
        .route("/stats", get(stats))
}

/// Account fields plus the role-specific profile, all at the top level
#[derive(Debug, Deserialize)]
pub struct SignupRequest<P> {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub profile: P,
}

impl<P> SignupRequest<P> {
    fn into_input(self, profile: impl FnOnce(P) -> ProfileInput) -> RegisterInput {
        RegisterInput {
            email: self.email,
            password: self.password,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            profile: profile(self.profile),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DoctorQuery {
    pub specialization: Option<String>,
}

async fn patient_signup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignupRequest<PatientProfileInput>>,
) -> ApiResult<ApiResponse<User>> {
    let user = state.auth.register(request.into_input(ProfileInput::Patient)).await?;
    Ok(ApiResponse::created("Patient registered successfully", user))
}

async fn doctor_signup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignupRequest<DoctorProfileInput>>,
) -> ApiResult<ApiResponse<User>> {
    let user = state.auth.register(request.into_input(ProfileInput::Doctor)).await?;
    Ok(ApiResponse::created(
        "Doctor registered; the account can sign in once verified",
        user,
    ))
}

async fn government_signup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignupRequest<GovernmentProfileInput>>,
) -> ApiResult<ApiResponse<User>> {
    let user = state.auth.register(request.into_input(ProfileInput::Government)).await?;
    Ok(ApiResponse::created(
        "Government official registered; the account can sign in once verified",
        user,
    ))
}

async fn login(
    State(state): State<AppState>,
    ClientAddr(source): ClientAddr,
    ApiJson(input): ApiJson<LoginInput>,
) -> ApiResult<ApiResponse<Session>> {
    let session = state.auth.login(input, &source).await?;
    Ok(ApiResponse::ok(session).message("Login successful"))
}

async fn refresh(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> ApiResult<ApiResponse<Session>> {
    let session = state.auth.refresh(&request.refresh_token).await?;
    Ok(ApiResponse::ok(session))
}

async fn me(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<ApiResponse<UserProfile>> {
    Ok(ApiResponse::ok(state.auth.profile(&caller).await?))
}

async fn update_me(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiJson(input): ApiJson<UpdateProfileInput>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let profile = state.auth.update_profile(&caller, input).await?;
    Ok(ApiResponse::ok(profile).message("Profile updated successfully"))
}

async fn list_doctors(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(query): ApiQuery<DoctorQuery>,
) -> ApiResult<ApiResponse<Vec<DoctorListing>>> {
    let doctors = state
        .auth
        .list_doctors(&caller, query.specialization.as_deref())
        .await?;
    Ok(ApiResponse::ok(doctors))
}

async fn doctor_patients(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(pagination): ApiQuery<PaginationInput>,
) -> ApiResult<ApiResponse<PaginatedResult<DoctorPatient>>> {
    let patients = scheduling::doctor_patients(&state.ctx, &caller, &pagination).await?;
    Ok(ApiResponse::ok(patients))
}

async fn stats(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<ApiResponse<DashboardStats>> {
    Ok(ApiResponse::ok(reporting::dashboard_stats(&state.ctx, &caller).await?))
}
