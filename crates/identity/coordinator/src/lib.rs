//! Identity Coordinator
//!
//! Registration, login, token refresh, self-service profile edits and the
//! administrative account operations (verification, activation, admin
//! bootstrap).
//!
//! Login reserves an attempt with the per-source rate limiter before
//! credentials are looked at. Doctor and government accounts cannot
//! authenticate until a reviewer has verified them.

pub mod password;
pub mod rate_limit;
pub mod tokens;

use carelink_shared::audit::{self, AuditEvent};
use carelink_shared::notifications::notify;
use carelink_shared::{
    ensure_valid, Caller, HealthError, HealthResult, Permission, Role, ServiceContext,
};
use chrono::Duration;
use health_validation::{validate_email, validate_password_strength};
use identity_integrity::*;
use serde::{Deserialize, Serialize};

pub use password::PasswordHasher;
pub use rate_limit::{AttemptStore, InMemoryAttemptStore, RateLimitConfig, RateLimiter};
pub use tokens::{Claims, TokenKind, TokenPair, TokenService};

const USER_COLUMNS: &str = "id, email, password_hash, role, first_name, last_name, phone, \
     is_active, verification_status, created_at, updated_at";

/// Settings for the authentication service
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub hash_iterations: u32,
    pub rate_limit: RateLimitConfig,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_ttl: Duration::hours(24),
            refresh_ttl: Duration::days(7),
            hash_iterations: password::DEFAULT_ITERATIONS,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Result of a successful login or refresh
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

pub struct AuthService<S: AttemptStore = InMemoryAttemptStore> {
    ctx: ServiceContext,
    hasher: PasswordHasher,
    tokens: TokenService,
    limiter: RateLimiter<S>,
}

impl AuthService<InMemoryAttemptStore> {
    pub fn new(ctx: ServiceContext, config: &AuthConfig) -> Self {
        Self::with_store(ctx, config, InMemoryAttemptStore::new())
    }
}

impl<S: AttemptStore> AuthService<S> {
    pub fn with_store(ctx: ServiceContext, config: &AuthConfig, store: S) -> Self {
        let tokens = TokenService::new(
            config.jwt_secret.as_bytes(),
            config.access_ttl,
            config.refresh_ttl,
            ctx.clock.clone(),
        );
        let limiter = RateLimiter::new(store, config.rate_limit, ctx.clock.clone());
        Self {
            hasher: PasswordHasher::new(config.hash_iterations),
            tokens,
            limiter,
            ctx,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    // ==================== REGISTRATION ====================

    /// Register a patient, doctor or government account
    pub async fn register(&self, input: RegisterInput) -> HealthResult<User> {
        let now = self.ctx.clock.now();
        ensure_valid(validate_registration(&input, now.date_naive()))?;

        let role = input.profile.role();
        let email = normalize_email(&input.email);
        let password_hash = self.hash_password(input.password.clone()).await?;

        let mut tx = self.ctx.db.begin_write().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(HealthError::Conflict("Email already registered".to_string()));
        }

        match &input.profile {
            ProfileInput::Doctor(doctor) => {
                let taken: Option<i64> =
                    sqlx::query_scalar("SELECT user_id FROM doctors WHERE license_number = ?")
                        .bind(health_validation::normalize_license_number(&doctor.license_number))
                        .fetch_optional(&mut *tx)
                        .await?;
                if taken.is_some() {
                    return Err(HealthError::Conflict("License number already registered".to_string()));
                }
            }
            ProfileInput::Government(official) => {
                let taken: Option<i64> =
                    sqlx::query_scalar("SELECT user_id FROM government_officials WHERE employee_id = ?")
                        .bind(official.employee_id.trim())
                        .fetch_optional(&mut *tx)
                        .await?;
                if taken.is_some() {
                    return Err(HealthError::Conflict("Employee ID already registered".to_string()));
                }
            }
            ProfileInput::Patient(_) => {}
        }

        let user_id = sqlx::query(
            "INSERT INTO users (email, password_hash, role, first_name, last_name, phone, is_active, verification_status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(&email)
        .bind(&password_hash)
        .bind(role)
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(input.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()))
        .bind(VerificationStatus::initial_for(role))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        match &input.profile {
            ProfileInput::Patient(patient) => {
                sqlx::query(
                    "INSERT INTO patients (user_id, date_of_birth, gender, blood_type, emergency_contact_name, emergency_contact_phone, address, allergies, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(user_id)
                .bind(patient.date_of_birth)
                .bind(&patient.gender)
                .bind(patient.blood_type.as_ref().map(|b| b.trim().to_uppercase()))
                .bind(&patient.emergency_contact_name)
                .bind(&patient.emergency_contact_phone)
                .bind(&patient.address)
                .bind(&patient.allergies)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            ProfileInput::Doctor(doctor) => {
                sqlx::query(
                    "INSERT INTO doctors (user_id, license_number, specialization, qualification, experience_years, hospital_affiliation, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(user_id)
                .bind(health_validation::normalize_license_number(&doctor.license_number))
                .bind(doctor.specialization.trim())
                .bind(&doctor.qualification)
                .bind(doctor.experience_years)
                .bind(&doctor.hospital_affiliation)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            ProfileInput::Government(official) => {
                sqlx::query(
                    "INSERT INTO government_officials (user_id, employee_id, department, position, updated_at)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(user_id)
                .bind(official.employee_id.trim())
                .bind(official.department.trim())
                .bind(&official.position)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        audit::record(
            &mut *tx,
            AuditEvent::new("user_registered")
                .by(user_id)
                .on("user", user_id)
                .details(format!("role={}", role)),
            now,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id, role = %role, "user registered");
        self.user_by_id(user_id).await
    }

    /// Create the initial administrator if it does not exist yet
    pub async fn bootstrap_admin(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> HealthResult<User> {
        let email = normalize_email(email);
        let mut result = validate_email(&email);
        result.merge(validate_password_strength(password));
        result.merge(validate_names(first_name, last_name));
        ensure_valid(result)?;

        if let Some(existing) = self.find_by_email(&email).await? {
            if existing.role != Role::Admin {
                return Err(HealthError::Conflict(
                    "Bootstrap email belongs to a non-admin account".to_string(),
                ));
            }
            tracing::debug!(user_id = existing.id, "admin already present");
            return Ok(existing.into());
        }

        let now = self.ctx.clock.now();
        let password_hash = self.hash_password(password.to_string()).await?;
        let mut tx = self.ctx.db.begin_write().await?;

        let user_id = sqlx::query(
            "INSERT INTO users (email, password_hash, role, first_name, last_name, is_active, verification_status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(&email)
        .bind(&password_hash)
        .bind(Role::Admin)
        .bind(first_name.trim())
        .bind(last_name.trim())
        .bind(VerificationStatus::NotRequired)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        audit::record(&mut *tx, AuditEvent::new("admin_bootstrapped").on("user", user_id), now).await?;
        tx.commit().await?;

        tracing::info!(user_id, "bootstrap admin created");
        self.user_by_id(user_id).await
    }

    // ==================== AUTHENTICATION ====================

    /// Authenticate with email, password and the role being logged in as
    pub async fn login(&self, input: LoginInput, source: &str) -> HealthResult<Session> {
        let attempt = self.limiter.begin(source)?;

        let email = normalize_email(&input.email);
        let record = self.find_by_email(&email).await?;

        let record = match record {
            Some(record) if record.role == input.role => {
                let hash = record.password_hash.clone();
                if self.verify_password(input.password, hash).await? {
                    Some(record)
                } else {
                    None
                }
            }
            _ => None,
        };

        let Some(record) = record else {
            // The reserved attempt stays in the window as a failure
            audit::record(
                self.ctx.db.pool(),
                AuditEvent::new("login_failed")
                    .details(format!("email={} role={}", email, input.role))
                    .from_ip(Some(source)),
                self.ctx.clock.now(),
            )
            .await?;
            tracing::info!(source, role = %input.role, "login failed");
            return Err(HealthError::Authentication("Invalid email or password".to_string()));
        };
        self.limiter.release(source, attempt);

        ensure_can_authenticate(&record)?;

        let tokens = self.tokens.issue_pair(record.id, record.role)?;
        audit::record(
            self.ctx.db.pool(),
            AuditEvent::new("login").by(record.id).from_ip(Some(source)),
            self.ctx.clock.now(),
        )
        .await?;

        tracing::info!(user_id = record.id, role = %record.role, "login succeeded");
        Ok(Session {
            user: record.into(),
            tokens,
        })
    }

    /// Exchange a refresh token for a fresh token pair
    pub async fn refresh(&self, refresh_token: &str) -> HealthResult<Session> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        let caller = claims.caller()?;

        let record = self
            .find_by_id(caller.user_id)
            .await?
            .ok_or_else(|| HealthError::Authentication("Account no longer exists".to_string()))?;
        ensure_can_authenticate(&record)?;

        let tokens = self.tokens.issue_pair(record.id, record.role)?;
        Ok(Session {
            user: record.into(),
            tokens,
        })
    }

    /// Resolve a bearer access token to the caller it represents
    ///
    /// The account must still exist and be active.
    pub async fn authenticate(&self, access_token: &str) -> HealthResult<Caller> {
        let claims = self.tokens.verify(access_token, TokenKind::Access)?;
        let caller = claims.caller()?;

        let active: Option<(bool, Role)> =
            sqlx::query_as("SELECT is_active, role FROM users WHERE id = ?")
                .bind(caller.user_id)
                .fetch_optional(self.ctx.db.pool())
                .await?;

        match active {
            Some((true, role)) if role == caller.role => Ok(caller),
            Some((false, _)) => Err(HealthError::Authentication("Account is deactivated".to_string())),
            _ => Err(HealthError::Authentication("Invalid token".to_string())),
        }
    }

    // ==================== ACCOUNT ADMINISTRATION ====================

    /// Approve or reject a doctor's registration
    pub async fn verify_doctor(
        &self,
        caller: &Caller,
        doctor_id: i64,
        decision: VerificationDecision,
        notes: Option<String>,
    ) -> HealthResult<User> {
        caller.require(Permission::VerifyDoctors)?;
        self.review_account(caller, doctor_id, Role::Doctor, decision, notes).await
    }

    /// Approve or reject a government official's registration
    pub async fn verify_government_official(
        &self,
        caller: &Caller,
        user_id: i64,
        decision: VerificationDecision,
        notes: Option<String>,
    ) -> HealthResult<User> {
        caller.require(Permission::ManageUsers)?;
        self.review_account(caller, user_id, Role::Government, decision, notes).await
    }

    async fn review_account(
        &self,
        caller: &Caller,
        user_id: i64,
        role: Role,
        decision: VerificationDecision,
        notes: Option<String>,
    ) -> HealthResult<User> {
        let profile_table = match role {
            Role::Doctor => "doctors",
            Role::Government => "government_officials",
            Role::Patient | Role::Admin => {
                return Err(HealthError::BusinessRule(format!(
                    "{} accounts do not require verification",
                    role
                )))
            }
        };

        let now = self.ctx.clock.now();
        let status = decision.resulting_status();
        let mut tx = self.ctx.db.begin_write().await?;

        let updated = sqlx::query(
            "UPDATE users SET verification_status = ?, updated_at = ? WHERE id = ? AND role = ?",
        )
        .bind(status)
        .bind(now)
        .bind(user_id)
        .bind(role)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(HealthError::NotFound(format!("{} account not found", role)));
        }

        sqlx::query(&format!(
            "UPDATE {} SET verification_notes = ?, verified_by = ?, verified_at = ?, updated_at = ? WHERE user_id = ?",
            profile_table
        ))
        .bind(&notes)
        .bind(caller.user_id)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let (action, title, message) = match decision {
            VerificationDecision::Approve => (
                "account_verified",
                "Account verified",
                "Your account has been verified. You can now log in.",
            ),
            VerificationDecision::Reject => (
                "account_rejected",
                "Verification rejected",
                "Your account verification was rejected. Contact support for details.",
            ),
        };

        let mut event = AuditEvent::new(action).by(caller.user_id).on("user", user_id);
        if let Some(notes) = &notes {
            event = event.details(notes.clone());
        }
        audit::record(&mut *tx, event, now).await?;
        notify(&mut *tx, user_id, title, message, now).await?;

        tx.commit().await?;

        tracing::info!(reviewer = caller.user_id, user_id, role = %role, ?decision, "account reviewed");
        self.user_by_id(user_id).await
    }

    /// Activate or deactivate an account
    pub async fn set_active(&self, caller: &Caller, user_id: i64, active: bool) -> HealthResult<User> {
        caller.require(Permission::ManageUsers)?;
        if user_id == caller.user_id && !active {
            return Err(HealthError::BusinessRule(
                "Administrators cannot deactivate their own account".to_string(),
            ));
        }

        let now = self.ctx.clock.now();
        let mut tx = self.ctx.db.begin_write().await?;

        let updated = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(HealthError::NotFound("User not found".to_string()));
        }

        let action = if active { "user_activated" } else { "user_deactivated" };
        audit::record(&mut *tx, AuditEvent::new(action).by(caller.user_id).on("user", user_id), now).await?;
        tx.commit().await?;

        self.user_by_id(user_id).await
    }

    // ==================== PROFILE ====================

    /// Edit the caller's own names, phone and role profile
    ///
    /// Email, role, license and employee id are fixed after registration.
    pub async fn update_profile(&self, caller: &Caller, input: UpdateProfileInput) -> HealthResult<UserProfile> {
        caller.require(caller.role.edit_profile_permission())?;

        let now = self.ctx.clock.now();
        ensure_valid(validate_profile_update(&input, now.date_naive()))?;
        if let Some(details) = &input.details {
            if details.role() != caller.role {
                return Err(HealthError::validation(format!(
                    "A {} account cannot carry {} profile details",
                    caller.role,
                    details.role()
                )));
            }
        }

        let mut tx = self.ctx.db.begin_write().await?;

        let current = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(caller.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| HealthError::NotFound("User not found".to_string()))?;

        let first_name = input.first_name.as_deref().map(str::trim).unwrap_or(current.first_name.as_str());
        let last_name = input.last_name.as_deref().map(str::trim).unwrap_or(current.last_name.as_str());
        // A blank phone clears the stored number
        let phone = match &input.phone {
            Some(phone) => Some(phone.trim()).filter(|p| !p.is_empty()),
            None => current.phone.as_deref(),
        };

        sqlx::query("UPDATE users SET first_name = ?, last_name = ?, phone = ?, updated_at = ? WHERE id = ?")
            .bind(first_name)
            .bind(last_name)
            .bind(phone)
            .bind(now)
            .bind(caller.user_id)
            .execute(&mut *tx)
            .await?;

        match &input.details {
            Some(ProfileUpdate::Patient(patient)) => {
                sqlx::query(
                    "UPDATE patients SET date_of_birth = COALESCE(?, date_of_birth), gender = COALESCE(?, gender),
                         blood_type = COALESCE(?, blood_type), emergency_contact_name = COALESCE(?, emergency_contact_name),
                         emergency_contact_phone = COALESCE(?, emergency_contact_phone), address = COALESCE(?, address),
                         allergies = COALESCE(?, allergies), updated_at = ?
                     WHERE user_id = ?",
                )
                .bind(patient.date_of_birth)
                .bind(&patient.gender)
                .bind(patient.blood_type.as_ref().map(|b| b.trim().to_uppercase()))
                .bind(&patient.emergency_contact_name)
                .bind(&patient.emergency_contact_phone)
                .bind(&patient.address)
                .bind(&patient.allergies)
                .bind(now)
                .bind(caller.user_id)
                .execute(&mut *tx)
                .await?;
            }
            Some(ProfileUpdate::Doctor(doctor)) => {
                sqlx::query(
                    "UPDATE doctors SET specialization = COALESCE(?, specialization), qualification = COALESCE(?, qualification),
                         experience_years = COALESCE(?, experience_years), hospital_affiliation = COALESCE(?, hospital_affiliation),
                         updated_at = ?
                     WHERE user_id = ?",
                )
                .bind(doctor.specialization.as_deref().map(str::trim))
                .bind(&doctor.qualification)
                .bind(doctor.experience_years)
                .bind(&doctor.hospital_affiliation)
                .bind(now)
                .bind(caller.user_id)
                .execute(&mut *tx)
                .await?;
            }
            None => {}
        }

        audit::record(
            &mut *tx,
            AuditEvent::new("profile_updated").by(caller.user_id).on("user", caller.user_id),
            now,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(user_id = caller.user_id, role = %caller.role, "profile updated");
        self.profile(caller).await
    }

    // ==================== QUERIES ====================

    /// The caller's account and role profile
    pub async fn profile(&self, caller: &Caller) -> HealthResult<UserProfile> {
        if let Some(permission) = caller.role.view_profile_permission() {
            caller.require(permission)?;
        }
        let user = self.user_by_id(caller.user_id).await?;
        let pool = self.ctx.db.pool();

        let profile = match user.role {
            Role::Patient => sqlx::query_as::<_, PatientProfile>(
                "SELECT user_id, date_of_birth, gender, blood_type, emergency_contact_name, emergency_contact_phone, address, allergies
                 FROM patients WHERE user_id = ?",
            )
            .bind(user.id)
            .fetch_optional(pool)
            .await?
            .map(RoleProfile::Patient),
            Role::Doctor => sqlx::query_as::<_, DoctorProfile>(
                "SELECT user_id, license_number, specialization, qualification, experience_years, hospital_affiliation, verification_notes, verified_by, verified_at
                 FROM doctors WHERE user_id = ?",
            )
            .bind(user.id)
            .fetch_optional(pool)
            .await?
            .map(RoleProfile::Doctor),
            Role::Government => sqlx::query_as::<_, GovernmentProfile>(
                "SELECT user_id, employee_id, department, position, verification_notes, verified_by, verified_at
                 FROM government_officials WHERE user_id = ?",
            )
            .bind(user.id)
            .fetch_optional(pool)
            .await?
            .map(RoleProfile::Government),
            Role::Admin => None,
        };

        Ok(UserProfile { user, profile })
    }

    /// Verified, active doctors, optionally filtered by specialization
    pub async fn list_doctors(
        &self,
        caller: &Caller,
        specialization: Option<&str>,
    ) -> HealthResult<Vec<DoctorListing>> {
        caller.require(Permission::ViewDoctors)?;

        let pattern = specialization
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let doctors = sqlx::query_as::<_, DoctorListing>(
            "SELECT u.id, u.first_name, u.last_name, d.specialization, d.qualification, d.experience_years, d.hospital_affiliation
             FROM doctors d JOIN users u ON u.id = d.user_id
             WHERE u.is_active = 1 AND u.verification_status = 'verified'
               AND (? IS NULL OR d.specialization LIKE ?)
             ORDER BY u.last_name, u.first_name",
        )
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(self.ctx.db.pool())
        .await?;
        Ok(doctors)
    }

    /// Doctor registrations awaiting review
    pub async fn pending_verifications(&self, caller: &Caller) -> HealthResult<Vec<PendingDoctor>> {
        caller.require(Permission::ViewAllDoctors)?;

        let pending = sqlx::query_as::<_, PendingDoctor>(
            "SELECT u.id, u.email, u.first_name, u.last_name, d.license_number, d.specialization, u.created_at
             FROM doctors d JOIN users u ON u.id = d.user_id
             WHERE u.verification_status = 'pending'
             ORDER BY u.created_at, u.id",
        )
        .fetch_all(self.ctx.db.pool())
        .await?;
        Ok(pending)
    }

    // ==================== HELPERS ====================

    async fn find_by_email(&self, email: &str) -> HealthResult<Option<UserRecord>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(self.ctx.db.pool())
        .await?;
        Ok(record)
    }

    async fn find_by_id(&self, user_id: i64) -> HealthResult<Option<UserRecord>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.ctx.db.pool())
        .await?;
        Ok(record)
    }

    async fn user_by_id(&self, user_id: i64) -> HealthResult<User> {
        self.find_by_id(user_id)
            .await?
            .map(User::from)
            .ok_or_else(|| HealthError::NotFound("User not found".to_string()))
    }

    // PBKDF2 is CPU-bound; keep it off the async workers.
    async fn hash_password(&self, password: String) -> HealthResult<String> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| HealthError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    async fn verify_password(&self, password: String, stored: String) -> HealthResult<bool> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| HealthError::Internal(format!("Password verification task failed: {}", e)))
    }
}

/// Account state checks shared by login and refresh
fn ensure_can_authenticate(record: &UserRecord) -> HealthResult<()> {
    if !record.is_active {
        return Err(HealthError::Authentication("Account is deactivated".to_string()));
    }
    match record.verification_status {
        VerificationStatus::NotRequired | VerificationStatus::Verified => Ok(()),
        VerificationStatus::Pending => Err(HealthError::BusinessRule(
            "Account is pending verification".to_string(),
        )),
        VerificationStatus::Rejected => Err(HealthError::BusinessRule(
            "Account verification was rejected".to_string(),
        )),
    }
}
