//! Common types used across services

use health_validation::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};

/// Input for paginated queries
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PaginationInput {
    pub offset: usize,
    pub limit: usize,
}

impl PaginationInput {
    pub const MAX_LIMIT: usize = 100;

    pub fn validate(&self) -> HealthResult<()> {
        if self.limit > Self::MAX_LIMIT {
            return Err(HealthError::validation(format!(
                "Limit cannot exceed {}",
                Self::MAX_LIMIT
            )));
        }
        if self.limit == 0 {
            return Err(HealthError::validation("Limit must be greater than 0"));
        }
        if i64::try_from(self.offset).is_err() {
            return Err(HealthError::validation(format!(
                "Offset cannot exceed {}",
                i64::MAX
            )));
        }
        Ok(())
    }

    /// SQLite bind values for LIMIT/OFFSET
    pub fn sql_bounds(&self) -> (i64, i64) {
        (
            i64::try_from(self.limit).unwrap_or(i64::MAX),
            i64::try_from(self.offset).unwrap_or(i64::MAX),
        )
    }
}

impl Default for PaginationInput {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// Result wrapper for paginated queries
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: usize, pagination: &PaginationInput) -> Self {
        Self {
            has_more: pagination.offset.saturating_add(items.len()) < total,
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        }
    }

    pub fn empty(pagination: &PaginationInput) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            offset: pagination.offset,
            limit: pagination.limit,
            has_more: false,
        }
    }
}

/// Standard error types for consistent error handling
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<ValidationError>,
    },
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BusinessRule(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type HealthResult<T> = Result<T, HealthError>;

impl HealthError {
    /// Validation failure without field-level detail
    pub fn validation(message: impl Into<String>) -> Self {
        HealthError::Validation {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Short machine-readable name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            HealthError::Validation { .. } => "validation_error",
            HealthError::Authentication(_) => "authentication_error",
            HealthError::Authorization(_) => "authorization_error",
            HealthError::NotFound(_) => "not_found",
            HealthError::Conflict(_) => "conflict",
            HealthError::BusinessRule(_) => "business_rule_violation",
            HealthError::RateLimited(_) => "rate_limit_exceeded",
            HealthError::Database(_) => "database_error",
            HealthError::Internal(_) => "internal_error",
        }
    }
}

impl From<sqlx::Error> for HealthError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .map(|db_err| db_err.is_unique_violation())
            .unwrap_or(false);
        if unique_violation {
            HealthError::Conflict("Resource already exists".to_string())
        } else {
            HealthError::Database(err)
        }
    }
}

impl From<ValidationResult> for HealthError {
    fn from(result: ValidationResult) -> Self {
        HealthError::Validation {
            message: result.summary(),
            errors: result.errors,
        }
    }
}

/// Turn an accumulated validation result into an error when it failed
pub fn ensure_valid(result: ValidationResult) -> HealthResult<()> {
    if result.is_valid() {
        Ok(())
    } else {
        Err(result.into())
    }
}
