//! Records Integrity
//!
//! Entry types for clinician-authored medical records and patient-reported
//! health metrics, with the validation applied before they are stored.

use chrono::{DateTime, Utc};
use health_validation::{validate_max_length, validate_required, ValidationErrorCode, ValidationResult};
use serde::{Deserialize, Serialize};

pub const DIAGNOSIS_MAX_LENGTH: usize = 200;
pub const FREE_TEXT_MAX_LENGTH: usize = 5000;
pub const METRIC_TYPE_MAX_LENGTH: usize = 50;
pub const METRIC_VALUE_MAX_LENGTH: usize = 50;
pub const METRIC_UNIT_MAX_LENGTH: usize = 20;

/// Medical record written by a doctor
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct MedicalRecord {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub appointment_id: Option<i64>,
    pub diagnosis: String,
    pub treatment: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub record_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Patient-reported measurement
///
/// Values are free text (`120/80`, `72`, `normal`); only values that parse
/// as numbers take part in averages.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct HealthMetric {
    pub id: i64,
    pub patient_id: i64,
    pub metric_type: String,
    pub value: String,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl HealthMetric {
    pub fn numeric_value(&self) -> Option<f64> {
        parse_numeric(&self.value)
    }
}

/// Parse a metric value as a finite number
pub fn parse_numeric(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateRecordInput {
    pub appointment_id: Option<i64>,
    pub diagnosis: String,
    pub treatment: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub record_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateMetricInput {
    pub metric_type: String,
    pub value: String,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Metric types are compared case-insensitively
pub fn normalize_metric_type(metric_type: &str) -> String {
    metric_type.trim().to_lowercase().replace(' ', "_")
}

pub fn validate_record_input(input: &CreateRecordInput, now: DateTime<Utc>) -> ValidationResult {
    let mut result = validate_required(&input.diagnosis, "diagnosis");
    result.merge(validate_max_length(&input.diagnosis, DIAGNOSIS_MAX_LENGTH, "diagnosis"));

    for (value, field) in [
        (&input.treatment, "treatment"),
        (&input.prescription, "prescription"),
        (&input.notes, "notes"),
    ] {
        if let Some(text) = value {
            result.merge(validate_max_length(text, FREE_TEXT_MAX_LENGTH, field));
        }
    }

    if let Some(date) = input.record_date {
        if date > now {
            result.add_error("record_date", "Record date cannot be in the future", ValidationErrorCode::OutOfRange);
        }
    }

    result
}

pub fn validate_metric_input(input: &CreateMetricInput, now: DateTime<Utc>) -> ValidationResult {
    let mut result = validate_required(&input.metric_type, "metric_type");
    result.merge(validate_max_length(&input.metric_type, METRIC_TYPE_MAX_LENGTH, "metric_type"));
    result.merge(validate_required(&input.value, "value"));
    result.merge(validate_max_length(&input.value, METRIC_VALUE_MAX_LENGTH, "value"));

    if let Some(unit) = &input.unit {
        result.merge(validate_max_length(unit, METRIC_UNIT_MAX_LENGTH, "unit"));
    }
    if let Some(notes) = &input.notes {
        result.merge(validate_max_length(notes, FREE_TEXT_MAX_LENGTH, "notes"));
    }

    if let Some(at) = input.recorded_at {
        if at > now {
            result.add_error("recorded_at", "Measurement time cannot be in the future", ValidationErrorCode::OutOfRange);
        }
    }

    result
}
