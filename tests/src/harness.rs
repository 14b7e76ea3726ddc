//! Test harness: a fresh database, a controllable clock and a bootstrapped
//! administrator.

use std::path::Path;
use std::sync::Arc;

use carelink_shared::{Caller, Database, FixedClock, HealthResult, Role, ServiceContext};
use chrono::{DateTime, NaiveDate, Utc};
use identity::{AuthConfig, AuthService, Session};
use identity_integrity::{
    DoctorProfileInput, GovernmentProfileInput, LoginInput, PatientProfileInput, ProfileInput,
    RegisterInput, VerificationDecision,
};

pub const PASSWORD: &str = "Sunrise#2024x";

pub struct Harness {
    pub ctx: ServiceContext,
    pub clock: Arc<FixedClock>,
    pub auth: AuthService,
    admin: Caller,
}

impl Harness {
    pub async fn start(now: DateTime<Utc>) -> HealthResult<Self> {
        Self::with_database(Database::in_memory().await?, now).await
    }

    /// File-backed WAL database with a pool of several connections, as the
    /// server runs it
    pub async fn on_disk(path: &Path, now: DateTime<Utc>) -> HealthResult<Self> {
        let url = format!("sqlite://{}", path.display());
        Self::with_database(Database::connect(&url, 8).await?, now).await
    }

    async fn with_database(db: Database, now: DateTime<Utc>) -> HealthResult<Self> {
        db.migrate().await?;
        let clock = Arc::new(FixedClock::new(now));
        let ctx = ServiceContext::new(db, clock.clone());

        let mut config = AuthConfig::new("scenario-secret-0123456789abcdef");
        config.hash_iterations = 1_000;
        let auth = AuthService::new(ctx.clone(), &config);

        let admin = auth
            .bootstrap_admin("root@example.com", PASSWORD, "Root", "Admin")
            .await?;

        Ok(Self {
            ctx,
            clock,
            auth,
            admin: Caller::new(admin.id, Role::Admin),
        })
    }

    pub fn admin(&self) -> Caller {
        self.admin
    }

    pub async fn register_patient(&self, email: &str) -> HealthResult<Caller> {
        let user = self
            .auth
            .register(account(
                email,
                ProfileInput::Patient(PatientProfileInput {
                    date_of_birth: NaiveDate::from_ymd_opt(1985, 7, 14),
                    ..Default::default()
                }),
            ))
            .await?;
        Ok(Caller::new(user.id, user.role))
    }

    /// Registered but still pending verification
    pub async fn register_doctor(&self, email: &str, license: &str) -> HealthResult<i64> {
        let user = self
            .auth
            .register(account(
                email,
                ProfileInput::Doctor(DoctorProfileInput {
                    license_number: license.to_string(),
                    specialization: "General Practice".to_string(),
                    qualification: Some("MBBS".to_string()),
                    experience_years: Some(12),
                    hospital_affiliation: None,
                }),
            ))
            .await?;
        Ok(user.id)
    }

    pub async fn verified_doctor(&self, email: &str, license: &str) -> HealthResult<Caller> {
        let id = self.register_doctor(email, license).await?;
        self.auth
            .verify_doctor(&self.admin, id, VerificationDecision::Approve, None)
            .await?;
        Ok(Caller::new(id, Role::Doctor))
    }

    pub async fn register_official(&self, email: &str, employee_id: &str) -> HealthResult<i64> {
        let user = self
            .auth
            .register(account(
                email,
                ProfileInput::Government(GovernmentProfileInput {
                    employee_id: employee_id.to_string(),
                    department: "Public Health".to_string(),
                    position: None,
                }),
            ))
            .await?;
        Ok(user.id)
    }

    pub async fn verified_official(&self, email: &str, employee_id: &str) -> HealthResult<Caller> {
        let id = self.register_official(email, employee_id).await?;
        self.auth
            .verify_government_official(&self.admin, id, VerificationDecision::Approve, None)
            .await?;
        Ok(Caller::new(id, Role::Government))
    }

    pub async fn login(&self, email: &str, role: Role, source: &str) -> HealthResult<Session> {
        self.login_with(email, PASSWORD, role, source).await
    }

    pub async fn login_with(&self, email: &str, password: &str, role: Role, source: &str) -> HealthResult<Session> {
        self.auth
            .login(
                LoginInput {
                    email: email.to_string(),
                    password: password.to_string(),
                    role,
                },
                source,
            )
            .await
    }
}

fn account(email: &str, profile: ProfileInput) -> RegisterInput {
    RegisterInput {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        phone: Some("+15551234567".to_string()),
        profile,
    }
}
