//! CareLink Input Validation
//!
//! Pure validators for everything that crosses the API boundary before it
//! reaches a coordinator:
//! - Account credentials (email format, password strength)
//! - Contact details (phone numbers)
//! - Professional identifiers (medical license numbers, government employee IDs)
//! - Generic required/length checks used by the entry validators
//!
//! Every validator returns a [`ValidationResult`] so callers can accumulate
//! errors across fields and report them together.

use serde::{Deserialize, Serialize};

/// Minimum password length accepted at registration
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Maximum password length accepted at registration
pub const PASSWORD_MAX_LENGTH: usize = 128;

/// Maximum stored email length
pub const EMAIL_MAX_LENGTH: usize = 120;

/// Characters that satisfy the "special character" password rule
pub const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Substrings that make a password trivially guessable
pub const COMMON_PASSWORD_PATTERNS: [&str; 4] = ["123456", "password", "qwerty", "abc123"];

/// Validation error with detailed context
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub code: ValidationErrorCode,
}

/// Specific validation error codes for programmatic handling
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorCode {
    Required,
    InvalidFormat,
    OutOfRange,
    TooLong,
    TooShort,
    InvalidCharacters,
    DuplicateValue,
    InvalidReference,
    WeakPassword,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result that can accumulate multiple errors
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add_error(&mut self, field: &str, message: &str, code: ValidationErrorCode) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
            code,
        });
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    /// Whether any error carries the given code
    pub fn has_code(&self, code: ValidationErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// One-line summary suitable for a response message
    pub fn summary(&self) -> String {
        match self.errors.as_slice() {
            [] => "Validation passed".to_string(),
            [only] => only.message.clone(),
            [first, rest @ ..] => format!("{} (and {} more)", first.message, rest.len()),
        }
    }
}

/// Require a non-blank value
pub fn validate_required(value: &str, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    if value.trim().is_empty() {
        result.add_error(field, &format!("{} is required", field), ValidationErrorCode::Required);
    }
    result
}

/// Require at most `max` characters
pub fn validate_max_length(value: &str, max: usize, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    if value.chars().count() > max {
        result.add_error(
            field,
            &format!("{} cannot exceed {} characters", field, max),
            ValidationErrorCode::TooLong,
        );
    }
    result
}

/// Validate an email address
///
/// Accepts `local@domain.tld` where the local part uses letters, digits and
/// `._%+-`, the domain uses letters, digits, dots and hyphens, and the final
/// label is at least two letters.
pub fn validate_email(email: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    if email.is_empty() {
        result.add_error("email", "Email is required", ValidationErrorCode::Required);
        return result;
    }

    if email.len() > EMAIL_MAX_LENGTH {
        result.add_error(
            "email",
            &format!("Email cannot exceed {} characters", EMAIL_MAX_LENGTH),
            ValidationErrorCode::TooLong,
        );
    }

    let Some((local, domain)) = email.split_once('@') else {
        result.add_error("email", "Invalid email format", ValidationErrorCode::InvalidFormat);
        return result;
    };

    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));

    let domain_ok = match domain.rsplit_once('.') {
        Some((host, tld)) => {
            !host.is_empty()
                && host
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
                && tld.len() >= 2
                && tld.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    };

    if !local_ok || !domain_ok {
        result.add_error("email", "Invalid email format", ValidationErrorCode::InvalidFormat);
    }

    result
}

/// Validate password strength
///
/// Password must be:
/// - 8-128 characters long
/// - Mixed case with at least one digit and one special character
/// - Free of common patterns such as `password` or `123456`
pub fn validate_password_strength(password: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let length = password.chars().count();

    if length < PASSWORD_MIN_LENGTH {
        result.add_error(
            "password",
            &format!("Password must be at least {} characters long", PASSWORD_MIN_LENGTH),
            ValidationErrorCode::TooShort,
        );
        return result;
    }

    if length > PASSWORD_MAX_LENGTH {
        result.add_error(
            "password",
            &format!("Password must not exceed {} characters", PASSWORD_MAX_LENGTH),
            ValidationErrorCode::TooLong,
        );
        return result;
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        result.add_error(
            "password",
            "Password must contain at least one uppercase letter",
            ValidationErrorCode::WeakPassword,
        );
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        result.add_error(
            "password",
            "Password must contain at least one lowercase letter",
            ValidationErrorCode::WeakPassword,
        );
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        result.add_error(
            "password",
            "Password must contain at least one number",
            ValidationErrorCode::WeakPassword,
        );
    }

    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        result.add_error(
            "password",
            "Password must contain at least one special character",
            ValidationErrorCode::WeakPassword,
        );
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORD_PATTERNS.iter().any(|p| lowered.contains(p)) {
        result.add_error(
            "password",
            "Password contains common patterns",
            ValidationErrorCode::WeakPassword,
        );
    }

    result
}

/// Validate a phone number
///
/// Formatting characters are ignored; what remains must be an optional
/// leading `+` followed by a 10-digit national number (optionally prefixed
/// with `1`) or an E.164 number of up to 15 digits.
pub fn validate_phone(phone: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    let cleaned: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    let well_formed = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
    let national = digits.len() == 10 || (digits.len() == 11 && digits.starts_with('1'));
    let international = (2..=15).contains(&digits.len()) && !digits.starts_with('0');

    if !well_formed || !(national || international) {
        result.add_error("phone", "Invalid phone number format", ValidationErrorCode::InvalidFormat);
    }

    result
}

/// Normalize a medical license number for storage and comparison
pub fn normalize_license_number(license_number: &str) -> String {
    license_number.trim().to_uppercase()
}

/// Validate a medical license number (6-20 alphanumeric characters)
pub fn validate_license_number(license_number: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let normalized = normalize_license_number(license_number);

    if normalized.is_empty() {
        result.add_error("license_number", "License number is required", ValidationErrorCode::Required);
        return result;
    }

    if normalized.len() < 6 {
        result.add_error(
            "license_number",
            "License number must be at least 6 characters",
            ValidationErrorCode::TooShort,
        );
    }

    if normalized.len() > 20 {
        result.add_error(
            "license_number",
            "License number cannot exceed 20 characters",
            ValidationErrorCode::TooLong,
        );
    }

    if !normalized.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        result.add_error(
            "license_number",
            "License number can only contain letters and numbers",
            ValidationErrorCode::InvalidCharacters,
        );
    }

    result
}

/// Validate a government employee ID (3-50 letters, digits or hyphens)
pub fn validate_employee_id(employee_id: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let trimmed = employee_id.trim();

    if trimmed.is_empty() {
        result.add_error("employee_id", "Employee ID is required", ValidationErrorCode::Required);
        return result;
    }

    if trimmed.len() < 3 {
        result.add_error("employee_id", "Employee ID must be at least 3 characters", ValidationErrorCode::TooShort);
    }

    if trimmed.len() > 50 {
        result.add_error("employee_id", "Employee ID cannot exceed 50 characters", ValidationErrorCode::TooLong);
    }

    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        result.add_error(
            "employee_id",
            "Employee ID can only contain letters, numbers, and hyphens",
            ValidationErrorCode::InvalidCharacters,
        );
    }

    result
}
