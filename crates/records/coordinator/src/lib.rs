//! Records Coordinator
//!
//! Medical records and health metrics. Access follows the care
//! relationship:
//! - Patients read their own data and write their own metrics
//! - Doctors read and write records only for patients they have an
//!   appointment with
//! - Government accounts see aggregates only, never individual records
//!
//! Every read of a patient's data is written to the audit trail.

use carelink_shared::audit::{self, AuditEvent};
use carelink_shared::notifications::notify;
use carelink_shared::{
    ensure_valid, Caller, HealthError, HealthResult, PaginatedResult, PaginationInput, Permission,
    Role, ServiceContext,
};
use records_integrity::*;
use sqlx::SqliteConnection;

const RECORD_COLUMNS: &str = "id, patient_id, doctor_id, appointment_id, diagnosis, treatment, \
     prescription, notes, record_date, created_at";

const METRIC_COLUMNS: &str = "id, patient_id, metric_type, value, unit, notes, recorded_at";

// ==================== MEDICAL RECORDS ====================

/// Doctor writes a record for a patient they have seen
pub async fn add_record(
    ctx: &ServiceContext,
    caller: &Caller,
    patient_id: i64,
    input: CreateRecordInput,
) -> HealthResult<MedicalRecord> {
    caller.require(Permission::CreateMedicalRecord)?;

    let now = ctx.clock.now();
    ensure_valid(validate_record_input(&input, now))?;

    let mut tx = ctx.db.begin_write().await?;
    ensure_patient_exists(&mut tx, patient_id).await?;

    if !has_care_relationship(&mut tx, caller.user_id, patient_id).await? {
        tracing::warn!(doctor_id = caller.user_id, patient_id, "record write without care relationship");
        return Err(HealthError::Authorization(
            "You can only create records for your patients".to_string(),
        ));
    }

    if let Some(appointment_id) = input.appointment_id {
        let parties: Option<(i64, i64)> =
            sqlx::query_as("SELECT doctor_id, patient_id FROM appointments WHERE id = ?")
                .bind(appointment_id)
                .fetch_optional(&mut *tx)
                .await?;
        if parties != Some((caller.user_id, patient_id)) {
            return Err(HealthError::validation(
                "Appointment does not belong to this doctor and patient",
            ));
        }
    }

    let id = sqlx::query(
        "INSERT INTO medical_records (patient_id, doctor_id, appointment_id, diagnosis, treatment, prescription, notes, record_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(patient_id)
    .bind(caller.user_id)
    .bind(input.appointment_id)
    .bind(input.diagnosis.trim())
    .bind(&input.treatment)
    .bind(&input.prescription)
    .bind(&input.notes)
    .bind(input.record_date.unwrap_or(now))
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    audit::record(
        &mut *tx,
        AuditEvent::new("medical_record_created")
            .by(caller.user_id)
            .on("medical_record", id)
            .details(format!("patient={}", patient_id)),
        now,
    )
    .await?;
    notify(
        &mut *tx,
        patient_id,
        "New medical record",
        "Your doctor has added a new medical record",
        now,
    )
    .await?;

    let record = sqlx::query_as::<_, MedicalRecord>(&format!(
        "SELECT {} FROM medical_records WHERE id = ?",
        RECORD_COLUMNS
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(record_id = id, doctor_id = caller.user_id, patient_id, "medical record created");
    Ok(record)
}

/// A patient's medical records, newest first
pub async fn list_records(
    ctx: &ServiceContext,
    caller: &Caller,
    patient_id: i64,
    pagination: &PaginationInput,
) -> HealthResult<PaginatedResult<MedicalRecord>> {
    pagination.validate()?;
    let mut conn = ctx.db.pool().acquire().await?;
    ensure_can_read_patient(&mut conn, caller, patient_id).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM medical_records WHERE patient_id = ?")
        .bind(patient_id)
        .fetch_one(&mut *conn)
        .await?;

    let (limit, offset) = pagination.sql_bounds();
    let records = sqlx::query_as::<_, MedicalRecord>(&format!(
        "SELECT {} FROM medical_records WHERE patient_id = ? ORDER BY record_date DESC, id DESC LIMIT ? OFFSET ?",
        RECORD_COLUMNS
    ))
    .bind(patient_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    audit::record(
        &mut *conn,
        AuditEvent::new("medical_records_viewed")
            .by(caller.user_id)
            .on("patient", patient_id),
        ctx.clock.now(),
    )
    .await?;

    Ok(PaginatedResult::new(records, total as usize, pagination))
}

// ==================== HEALTH METRICS ====================

/// Patient records a measurement on their own profile
pub async fn add_metric(
    ctx: &ServiceContext,
    caller: &Caller,
    input: CreateMetricInput,
) -> HealthResult<HealthMetric> {
    caller.require(Permission::AddHealthMetrics)?;

    let now = ctx.clock.now();
    ensure_valid(validate_metric_input(&input, now))?;

    let mut tx = ctx.db.begin_write().await?;
    let is_patient: Option<i64> = sqlx::query_scalar("SELECT user_id FROM patients WHERE user_id = ?")
        .bind(caller.user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if is_patient.is_none() {
        return Err(HealthError::BusinessRule(
            "Only patients can record health metrics".to_string(),
        ));
    }

    let metric_type = normalize_metric_type(&input.metric_type);
    let id = sqlx::query(
        "INSERT INTO health_metrics (patient_id, metric_type, value, unit, notes, recorded_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(caller.user_id)
    .bind(&metric_type)
    .bind(input.value.trim())
    .bind(&input.unit)
    .bind(&input.notes)
    .bind(input.recorded_at.unwrap_or(now))
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    audit::record(
        &mut *tx,
        AuditEvent::new("health_metric_added")
            .by(caller.user_id)
            .on("health_metric", id)
            .details(metric_type.clone()),
        now,
    )
    .await?;

    let metric = sqlx::query_as::<_, HealthMetric>(&format!(
        "SELECT {} FROM health_metrics WHERE id = ?",
        METRIC_COLUMNS
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::debug!(metric_id = id, patient_id = caller.user_id, %metric_type, "health metric recorded");
    Ok(metric)
}

/// A patient's metrics, newest first, optionally of one type
pub async fn list_metrics(
    ctx: &ServiceContext,
    caller: &Caller,
    patient_id: i64,
    metric_type: Option<&str>,
    pagination: &PaginationInput,
) -> HealthResult<PaginatedResult<HealthMetric>> {
    pagination.validate()?;
    let mut conn = ctx.db.pool().acquire().await?;
    ensure_can_read_patient(&mut conn, caller, patient_id).await?;

    let metric_type = metric_type
        .map(normalize_metric_type)
        .filter(|t| !t.is_empty());

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM health_metrics WHERE patient_id = ? AND (? IS NULL OR metric_type = ?)",
    )
    .bind(patient_id)
    .bind(&metric_type)
    .bind(&metric_type)
    .fetch_one(&mut *conn)
    .await?;

    let (limit, offset) = pagination.sql_bounds();
    let metrics = sqlx::query_as::<_, HealthMetric>(&format!(
        "SELECT {} FROM health_metrics
         WHERE patient_id = ? AND (? IS NULL OR metric_type = ?)
         ORDER BY recorded_at DESC, id DESC LIMIT ? OFFSET ?",
        METRIC_COLUMNS
    ))
    .bind(patient_id)
    .bind(&metric_type)
    .bind(&metric_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    if caller.user_id != patient_id {
        audit::record(
            &mut *conn,
            AuditEvent::new("health_metrics_viewed")
                .by(caller.user_id)
                .on("patient", patient_id),
            ctx.clock.now(),
        )
        .await?;
    }

    Ok(PaginatedResult::new(metrics, total as usize, pagination))
}

// ==================== ACCESS ====================

async fn ensure_patient_exists(conn: &mut SqliteConnection, patient_id: i64) -> HealthResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT user_id FROM patients WHERE user_id = ?")
        .bind(patient_id)
        .fetch_optional(&mut *conn)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| HealthError::NotFound("Patient not found".to_string()))
}

/// Whether the doctor has at least one appointment with the patient
async fn has_care_relationship(
    conn: &mut SqliteConnection,
    doctor_id: i64,
    patient_id: i64,
) -> HealthResult<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM appointments WHERE doctor_id = ? AND patient_id = ? LIMIT 1",
    )
    .bind(doctor_id)
    .bind(patient_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

async fn ensure_can_read_patient(
    conn: &mut SqliteConnection,
    caller: &Caller,
    patient_id: i64,
) -> HealthResult<()> {
    match caller.role {
        Role::Patient => {
            caller.require(Permission::ViewOwnMedicalRecords)?;
            if caller.user_id != patient_id {
                return Err(HealthError::Authorization(
                    "Patients can only view their own records".to_string(),
                ));
            }
            Ok(())
        }
        Role::Doctor => {
            caller.require(Permission::ViewPatientRecords)?;
            ensure_patient_exists(conn, patient_id).await?;
            if !has_care_relationship(conn, caller.user_id, patient_id).await? {
                tracing::warn!(doctor_id = caller.user_id, patient_id, "record read without care relationship");
                return Err(HealthError::Authorization(
                    "You can only view records of your patients".to_string(),
                ));
            }
            Ok(())
        }
        Role::Admin => ensure_patient_exists(conn, patient_id).await,
        Role::Government => Err(HealthError::Authorization(
            "Government accounts only see aggregate statistics".to_string(),
        )),
    }
}
