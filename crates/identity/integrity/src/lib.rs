//! Identity Integrity
//!
//! Entry types for user accounts and their role-specific profiles, plus
//! the pure validation applied before anything is written.
//!
//! Profile rows are keyed by the owning user id, so a doctor's id and a
//! patient's id are always user ids.

use carelink_shared::Role;
use chrono::{DateTime, NaiveDate, Utc};
use health_validation::{
    validate_email, validate_employee_id, validate_license_number, validate_max_length,
    validate_password_strength, validate_phone, validate_required, ValidationErrorCode,
    ValidationResult,
};
use serde::{Deserialize, Serialize};

/// Accepted ABO/Rh blood groups
pub const BLOOD_TYPES: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

/// Upper bound on a doctor's stated experience
pub const MAX_EXPERIENCE_YEARS: i64 = 70;

// ==================== ENTRY TYPES ====================

/// Approval state gating doctor and government logins
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VerificationStatus {
    NotRequired,
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    /// Status a freshly registered account of this role starts in
    pub fn initial_for(role: Role) -> Self {
        if role.requires_verification() {
            VerificationStatus::Pending
        } else {
            VerificationStatus::NotRequired
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationStatus::NotRequired | VerificationStatus::Verified)
    }
}

/// Full account row, including the password hash
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub verification_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account as exposed outside the identity service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub verification_status: VerificationStatus,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            is_verified: record.verification_status.is_verified(),
            id: record.id,
            email: record.email,
            role: record.role,
            first_name: record.first_name,
            last_name: record.last_name,
            phone: record.phone,
            is_active: record.is_active,
            verification_status: record.verification_status,
            created_at: record.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct PatientProfile {
    pub user_id: i64,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub address: Option<String>,
    pub allergies: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct DoctorProfile {
    pub user_id: i64,
    pub license_number: String,
    pub specialization: String,
    pub qualification: Option<String>,
    pub experience_years: Option<i64>,
    pub hospital_affiliation: Option<String>,
    pub verification_notes: Option<String>,
    pub verified_by: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct GovernmentProfile {
    pub user_id: i64,
    pub employee_id: String,
    pub department: String,
    pub position: Option<String>,
    pub verification_notes: Option<String>,
    pub verified_by: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// The single role-specific profile an account owns
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleProfile {
    Patient(PatientProfile),
    Doctor(DoctorProfile),
    Government(GovernmentProfile),
}

/// Account plus its profile
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user: User,
    pub profile: Option<RoleProfile>,
}

/// Public directory entry for a verified doctor
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct DoctorListing {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    pub qualification: Option<String>,
    pub experience_years: Option<i64>,
    pub hospital_affiliation: Option<String>,
}

/// Doctor account awaiting review
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct PendingDoctor {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub license_number: String,
    pub specialization: String,
    pub created_at: DateTime<Utc>,
}

// ==================== INPUTS ====================

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientProfileInput {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub address: Option<String>,
    pub allergies: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfileInput {
    pub license_number: String,
    pub specialization: String,
    pub qualification: Option<String>,
    pub experience_years: Option<i64>,
    pub hospital_affiliation: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GovernmentProfileInput {
    pub employee_id: String,
    pub department: String,
    pub position: Option<String>,
}

/// Role-specific registration data; the variant decides the account role
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ProfileInput {
    Patient(PatientProfileInput),
    Doctor(DoctorProfileInput),
    Government(GovernmentProfileInput),
}

impl ProfileInput {
    pub fn role(&self) -> Role {
        match self {
            ProfileInput::Patient(_) => Role::Patient,
            ProfileInput::Doctor(_) => Role::Doctor,
            ProfileInput::Government(_) => Role::Government,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub profile: ProfileInput,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Doctor fields an account holder may change; the license stays fixed
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfileUpdate {
    pub specialization: Option<String>,
    pub qualification: Option<String>,
    pub experience_years: Option<i64>,
    pub hospital_affiliation: Option<String>,
}

/// Role-specific part of a profile edit
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ProfileUpdate {
    Patient(PatientProfileInput),
    Doctor(DoctorProfileUpdate),
}

impl ProfileUpdate {
    pub fn role(&self) -> Role {
        match self {
            ProfileUpdate::Patient(_) => Role::Patient,
            ProfileUpdate::Doctor(_) => Role::Doctor,
        }
    }
}

/// Edit of the caller's own account. Absent fields keep their value.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub details: Option<ProfileUpdate>,
}

/// Reviewer decision on a pending account
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
    Approve,
    Reject,
}

impl VerificationDecision {
    pub fn resulting_status(&self) -> VerificationStatus {
        match self {
            VerificationDecision::Approve => VerificationStatus::Verified,
            VerificationDecision::Reject => VerificationStatus::Rejected,
        }
    }
}

// ==================== VALIDATION ====================

/// Normalize an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate everything a registration carries
pub fn validate_registration(input: &RegisterInput, today: NaiveDate) -> ValidationResult {
    let mut result = validate_email(&normalize_email(&input.email));
    result.merge(validate_password_strength(&input.password));
    result.merge(validate_names(&input.first_name, &input.last_name));

    if let Some(phone) = non_blank(&input.phone) {
        result.merge(validate_phone(phone));
    }

    match &input.profile {
        ProfileInput::Patient(patient) => result.merge(validate_patient_profile(patient, today)),
        ProfileInput::Doctor(doctor) => result.merge(validate_doctor_profile(doctor)),
        ProfileInput::Government(official) => result.merge(validate_government_profile(official)),
    }

    result
}

pub fn validate_names(first_name: &str, last_name: &str) -> ValidationResult {
    let mut result = validate_required(first_name, "first_name");
    result.merge(validate_required(last_name, "last_name"));
    result.merge(validate_max_length(first_name, 50, "first_name"));
    result.merge(validate_max_length(last_name, 50, "last_name"));
    result
}

pub fn validate_patient_profile(input: &PatientProfileInput, today: NaiveDate) -> ValidationResult {
    let mut result = ValidationResult::new();

    if let Some(dob) = input.date_of_birth {
        if dob > today {
            result.add_error(
                "date_of_birth",
                "Date of birth cannot be in the future",
                ValidationErrorCode::OutOfRange,
            );
        }
    }

    if let Some(blood_type) = non_blank(&input.blood_type) {
        if !BLOOD_TYPES.contains(&blood_type.to_uppercase().as_str()) {
            result.add_error(
                "blood_type",
                "Blood type must be one of A+, A-, B+, B-, AB+, AB-, O+, O-",
                ValidationErrorCode::InvalidFormat,
            );
        }
    }

    if let Some(phone) = non_blank(&input.emergency_contact_phone) {
        for mut error in validate_phone(phone).errors {
            error.field = "emergency_contact_phone".to_string();
            result.errors.push(error);
        }
    }

    if let Some(gender) = &input.gender {
        result.merge(validate_max_length(gender, 10, "gender"));
    }
    if let Some(name) = &input.emergency_contact_name {
        result.merge(validate_max_length(name, 100, "emergency_contact_name"));
    }

    result
}

pub fn validate_doctor_profile(input: &DoctorProfileInput) -> ValidationResult {
    let mut result = validate_license_number(&input.license_number);
    result.merge(validate_required(&input.specialization, "specialization"));
    result.merge(validate_max_length(&input.specialization, 100, "specialization"));

    if let Some(years) = input.experience_years {
        result.merge(validate_experience_years(years));
    }

    result
}

pub fn validate_government_profile(input: &GovernmentProfileInput) -> ValidationResult {
    let mut result = validate_employee_id(&input.employee_id);
    result.merge(validate_required(&input.department, "department"));
    result.merge(validate_max_length(&input.department, 100, "department"));
    result
}

/// Validate the fields a profile edit carries
pub fn validate_profile_update(input: &UpdateProfileInput, today: NaiveDate) -> ValidationResult {
    let mut result = ValidationResult::new();

    for (value, field) in [(&input.first_name, "first_name"), (&input.last_name, "last_name")] {
        if let Some(name) = value {
            result.merge(validate_required(name, field));
            result.merge(validate_max_length(name, 50, field));
        }
    }

    if let Some(phone) = non_blank(&input.phone) {
        result.merge(validate_phone(phone));
    }

    match &input.details {
        Some(ProfileUpdate::Patient(patient)) => result.merge(validate_patient_profile(patient, today)),
        Some(ProfileUpdate::Doctor(doctor)) => result.merge(validate_doctor_update(doctor)),
        None => {}
    }

    result
}

fn validate_doctor_update(input: &DoctorProfileUpdate) -> ValidationResult {
    let mut result = ValidationResult::new();

    if let Some(specialization) = &input.specialization {
        result.merge(validate_required(specialization, "specialization"));
        result.merge(validate_max_length(specialization, 100, "specialization"));
    }

    if let Some(years) = input.experience_years {
        result.merge(validate_experience_years(years));
    }

    result
}

fn validate_experience_years(years: i64) -> ValidationResult {
    let mut result = ValidationResult::new();
    if !(0..=MAX_EXPERIENCE_YEARS).contains(&years) {
        result.add_error(
            "experience_years",
            &format!("Experience must be between 0 and {} years", MAX_EXPERIENCE_YEARS),
            ValidationErrorCode::OutOfRange,
        );
    }
    result
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
