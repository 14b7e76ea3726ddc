//! Scheduling Integrity
//!
//! Appointment entry types, the status state machine and the pure checks
//! that run before a booking touches the database:
//! - Booking input validation (future time, duration bounds, reason)
//! - Interval overlap between appointments of one doctor
//! - The fixed daily slot grid used for availability

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SubsecRound, Utc};
use health_validation::{validate_max_length, validate_required, ValidationErrorCode, ValidationResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATION_MINUTES: i64 = 30;
pub const MIN_DURATION_MINUTES: i64 = 15;
pub const MAX_DURATION_MINUTES: i64 = 240;

/// Length of one bookable slot in the availability grid
pub const SLOT_MINUTES: i64 = 30;
/// Consulting day, UTC
pub const DAY_START_HOUR: u32 = 9;
pub const DAY_END_HOUR: u32 = 17;

pub const REASON_MAX_LENGTH: usize = 500;

// ==================== STATE MACHINE ====================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// Allowed transitions
    ///
    /// scheduled -> confirmed | cancelled
    /// confirmed -> completed | cancelled | no_show
    ///
    /// Returning to scheduled happens only through [`Self::rescheduled`].
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Scheduled, Confirmed)
                | (Scheduled, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (Confirmed, NoShow)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Status after the start time moves
    ///
    /// scheduled | confirmed -> scheduled, so the doctor confirms the new
    /// time. Terminal appointments cannot move.
    pub fn rescheduled(&self) -> Option<AppointmentStatus> {
        match self {
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed => Some(AppointmentStatus::Scheduled),
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => None,
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject a transition the state machine does not allow
pub fn validate_transition(from: AppointmentStatus, to: AppointmentStatus) -> ValidationResult {
    let mut result = ValidationResult::new();
    if !from.can_transition_to(to) {
        result.add_error(
            "status",
            &format!("Cannot change appointment from {} to {}", from, to),
            ValidationErrorCode::InvalidReference,
        );
    }
    result
}

// ==================== ENTRY TYPES ====================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub appointment_date: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn involves(&self, user_id: i64) -> bool {
        self.patient_id == user_id || self.doctor_id == user_id
    }

    /// The other party to the appointment
    pub fn counterparty_of(&self, user_id: i64) -> i64 {
        if self.patient_id == user_id {
            self.doctor_id
        } else {
            self.patient_id
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BookAppointmentInput {
    pub doctor_id: i64,
    pub appointment_date: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub reason: String,
}

impl BookAppointmentInput {
    pub fn duration(&self) -> i64 {
        self.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.appointment_date.trunc_subsecs(0)
    }
}

/// Optional narrowing for appointment listings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// A patient seen by a doctor
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct DoctorPatient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub appointment_count: i64,
    pub last_appointment: DateTime<Utc>,
}

// ==================== VALIDATION ====================

pub fn validate_booking(input: &BookAppointmentInput, now: DateTime<Utc>) -> ValidationResult {
    let mut result = validate_appointment_time(input.start(), now);
    result.merge(validate_duration(input.duration()));
    result.merge(validate_required(&input.reason, "reason"));
    result.merge(validate_max_length(&input.reason, REASON_MAX_LENGTH, "reason"));
    result
}

/// The appointment must start strictly after `now`
pub fn validate_appointment_time(start: DateTime<Utc>, now: DateTime<Utc>) -> ValidationResult {
    let mut result = ValidationResult::new();
    if start <= now {
        result.add_error(
            "appointment_date",
            "Appointment must be scheduled in the future",
            ValidationErrorCode::OutOfRange,
        );
    }
    result
}

pub fn validate_duration(minutes: i64) -> ValidationResult {
    let mut result = ValidationResult::new();
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        result.add_error(
            "duration_minutes",
            &format!(
                "Duration must be between {} and {} minutes",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            ),
            ValidationErrorCode::OutOfRange,
        );
    }
    result
}

// ==================== TIME ARITHMETIC ====================

/// Whether two half-open intervals `[start, start + minutes)` intersect
pub fn overlaps(a_start: DateTime<Utc>, a_minutes: i64, b_start: DateTime<Utc>, b_minutes: i64) -> bool {
    let a_end = a_start + Duration::minutes(a_minutes);
    let b_end = b_start + Duration::minutes(b_minutes);
    a_start < b_end && b_start < a_end
}

/// Earliest start that could still overlap an interval beginning at `start`
pub fn conflict_window_start(start: DateTime<Utc>) -> DateTime<Utc> {
    start - Duration::minutes(MAX_DURATION_MINUTES)
}

/// Start times of the slot grid for one day
pub fn day_slots(date: NaiveDate) -> Vec<DateTime<Utc>> {
    let Some(open) = NaiveTime::from_hms_opt(DAY_START_HOUR, 0, 0) else {
        return Vec::new();
    };
    let first = date.and_time(open).and_utc();
    let slots_per_day = (i64::from(DAY_END_HOUR - DAY_START_HOUR) * 60) / SLOT_MINUTES;
    (0..slots_per_day)
        .map(|i| first + Duration::minutes(i * SLOT_MINUTES))
        .collect()
}

/// Slots of the grid that are in the future and free of every busy interval
pub fn free_slots(
    date: NaiveDate,
    now: DateTime<Utc>,
    busy: &[(DateTime<Utc>, i64)],
) -> Vec<DateTime<Utc>> {
    day_slots(date)
        .into_iter()
        .filter(|slot| *slot > now)
        .filter(|slot| {
            !busy
                .iter()
                .any(|(start, minutes)| overlaps(*slot, SLOT_MINUTES, *start, *minutes))
        })
        .collect()
}
