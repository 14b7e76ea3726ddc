//! Scheduling Coordinator
//!
//! Booking, the appointment lifecycle and availability queries.
//!
//! Booking and rescheduling run in one `BEGIN IMMEDIATE` transaction that
//! also writes the doctor's row. SQLite allows a single writer, so concurrent
//! bookings queue on the write lock before any overlap check reads.

use carelink_shared::audit::{self, AuditEvent};
use carelink_shared::notifications::notify;
use carelink_shared::{
    ensure_valid, Caller, HealthError, HealthResult, PaginatedResult, PaginationInput, Permission,
    Role, ServiceContext,
};
use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use identity_integrity::VerificationStatus;
use scheduling_integrity::*;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, appointment_date, duration_minutes, \
     status, reason, notes, created_at, updated_at";

// ==================== BOOKING ====================

/// Book an appointment with a verified doctor
pub async fn book(
    ctx: &ServiceContext,
    caller: &Caller,
    input: BookAppointmentInput,
) -> HealthResult<Appointment> {
    caller.require(Permission::BookAppointment)?;

    let now = ctx.clock.now();
    ensure_valid(validate_booking(&input, now))?;
    let start = input.start();
    let duration = input.duration();

    let mut tx = ctx.db.begin_write().await?;

    let is_patient: Option<i64> = sqlx::query_scalar("SELECT user_id FROM patients WHERE user_id = ?")
        .bind(caller.user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if is_patient.is_none() {
        return Err(HealthError::BusinessRule(
            "Only patients can book appointments".to_string(),
        ));
    }

    lock_doctor(&mut tx, input.doctor_id).await?;
    ensure_doctor_bookable(&mut tx, input.doctor_id).await?;
    ensure_no_overlap(&mut tx, input.doctor_id, start, duration, None).await?;

    let id = sqlx::query(
        "INSERT INTO appointments (patient_id, doctor_id, appointment_date, duration_minutes, status, reason, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(caller.user_id)
    .bind(input.doctor_id)
    .bind(start)
    .bind(duration)
    .bind(AppointmentStatus::Scheduled)
    .bind(input.reason.trim())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    audit::record(
        &mut *tx,
        AuditEvent::new("appointment_booked")
            .by(caller.user_id)
            .on("appointment", id)
            .details(format!("doctor={} at={}", input.doctor_id, start.to_rfc3339())),
        now,
    )
    .await?;
    notify(
        &mut *tx,
        input.doctor_id,
        "New appointment",
        &format!("A new appointment has been booked for {}", start.format("%Y-%m-%d %H:%M UTC")),
        now,
    )
    .await?;

    let appointment = fetch(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(appointment_id = id, patient_id = caller.user_id, doctor_id = input.doctor_id, %start, "appointment booked");
    Ok(appointment)
}

/// Move an appointment to a new start time
///
/// Allowed from scheduled or confirmed; the appointment goes back to
/// scheduled so the doctor confirms the new time.
pub async fn reschedule(
    ctx: &ServiceContext,
    caller: &Caller,
    appointment_id: i64,
    new_date: DateTime<Utc>,
) -> HealthResult<Appointment> {
    let now = ctx.clock.now();
    let new_start = new_date.trunc_subsecs(0);
    ensure_valid(validate_appointment_time(new_start, now))?;

    let mut tx = ctx.db.begin_write().await?;
    let current = fetch_owned(&mut tx, caller, appointment_id).await?;

    let next = current.status.rescheduled().ok_or_else(|| {
        HealthError::validation(format!("Cannot reschedule a {} appointment", current.status))
    })?;

    lock_doctor(&mut tx, current.doctor_id).await?;
    ensure_no_overlap(
        &mut tx,
        current.doctor_id,
        new_start,
        current.duration_minutes,
        Some(current.id),
    )
    .await?;

    sqlx::query("UPDATE appointments SET appointment_date = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(new_start)
        .bind(next)
        .bind(now)
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;

    audit::record(
        &mut *tx,
        AuditEvent::new("appointment_rescheduled")
            .by(caller.user_id)
            .on("appointment", appointment_id)
            .details(format!(
                "from={} to={}",
                current.appointment_date.to_rfc3339(),
                new_start.to_rfc3339()
            )),
        now,
    )
    .await?;
    notify(
        &mut *tx,
        current.counterparty_of(caller.user_id),
        "Appointment rescheduled",
        &format!(
            "Your appointment has been moved to {}",
            new_start.format("%Y-%m-%d %H:%M UTC")
        ),
        now,
    )
    .await?;

    let appointment = fetch(&mut tx, appointment_id).await?;
    tx.commit().await?;

    tracing::info!(appointment_id, by = caller.user_id, %new_start, "appointment rescheduled");
    Ok(appointment)
}

// ==================== LIFECYCLE ====================

/// Doctor accepts a scheduled appointment
pub async fn confirm(ctx: &ServiceContext, caller: &Caller, appointment_id: i64) -> HealthResult<Appointment> {
    caller.require(Permission::ConfirmAppointment)?;
    transition(ctx, caller, appointment_id, AppointmentStatus::Confirmed, Party::Doctor, None).await
}

/// Doctor closes a confirmed appointment, optionally with notes
pub async fn complete(
    ctx: &ServiceContext,
    caller: &Caller,
    appointment_id: i64,
    notes: Option<String>,
) -> HealthResult<Appointment> {
    caller.require(Permission::CompleteAppointment)?;
    transition(ctx, caller, appointment_id, AppointmentStatus::Completed, Party::Doctor, notes).await
}

/// Doctor records that the patient did not attend
pub async fn mark_no_show(ctx: &ServiceContext, caller: &Caller, appointment_id: i64) -> HealthResult<Appointment> {
    caller.require(Permission::CompleteAppointment)?;
    transition(ctx, caller, appointment_id, AppointmentStatus::NoShow, Party::Doctor, None).await
}

/// Either party cancels
pub async fn cancel(
    ctx: &ServiceContext,
    caller: &Caller,
    appointment_id: i64,
    reason: Option<String>,
) -> HealthResult<Appointment> {
    if caller.is(Role::Patient) {
        caller.require(Permission::CancelOwnAppointment)?;
    }
    transition(ctx, caller, appointment_id, AppointmentStatus::Cancelled, Party::Either, reason).await
}

/// Who may drive a transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Party {
    Doctor,
    Either,
}

impl Party {
    fn allows(&self, appointment: &Appointment, caller: &Caller) -> bool {
        match self {
            Party::Doctor => appointment.doctor_id == caller.user_id,
            Party::Either => appointment.involves(caller.user_id),
        }
    }
}

async fn transition(
    ctx: &ServiceContext,
    caller: &Caller,
    appointment_id: i64,
    next: AppointmentStatus,
    party: Party,
    note: Option<String>,
) -> HealthResult<Appointment> {
    let now = ctx.clock.now();
    let mut tx = ctx.db.begin_write().await?;

    let current = match fetch(&mut tx, appointment_id).await {
        Ok(a) if party.allows(&a, caller) => a,
        Ok(_) | Err(HealthError::NotFound(_)) => {
            return Err(HealthError::NotFound("Appointment not found".to_string()))
        }
        Err(e) => return Err(e),
    };

    ensure_valid(validate_transition(current.status, next))?;

    // Completion notes are kept on the appointment; cancellation reasons go to the trail
    let stored_notes = match next {
        AppointmentStatus::Completed => note.clone().or(current.notes.clone()),
        _ => current.notes.clone(),
    };

    sqlx::query("UPDATE appointments SET status = ?, notes = ?, updated_at = ? WHERE id = ?")
        .bind(next)
        .bind(&stored_notes)
        .bind(now)
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;

    let mut event = AuditEvent::new(format!("appointment_{}", next))
        .by(caller.user_id)
        .on("appointment", appointment_id);
    if let Some(note) = &note {
        event = event.details(note.clone());
    }
    audit::record(&mut *tx, event, now).await?;

    let when = current.appointment_date.format("%Y-%m-%d %H:%M UTC");
    let message = match next {
        AppointmentStatus::Confirmed => format!("Your appointment on {} has been confirmed", when),
        AppointmentStatus::Completed => format!("Your appointment on {} has been completed", when),
        AppointmentStatus::NoShow => format!("Your appointment on {} was marked as missed", when),
        AppointmentStatus::Cancelled => match &note {
            Some(reason) => format!("Your appointment on {} was cancelled: {}", when, reason),
            None => format!("Your appointment on {} was cancelled", when),
        },
        AppointmentStatus::Scheduled => format!("Your appointment on {} was updated", when),
    };
    notify(
        &mut *tx,
        current.counterparty_of(caller.user_id),
        "Appointment update",
        &message,
        now,
    )
    .await?;

    let appointment = fetch(&mut tx, appointment_id).await?;
    tx.commit().await?;

    tracing::info!(
        appointment_id,
        by = caller.user_id,
        from = %current.status,
        to = %next,
        "appointment status changed"
    );
    Ok(appointment)
}

// ==================== QUERIES ====================

/// One appointment visible to the caller
pub async fn get(ctx: &ServiceContext, caller: &Caller, appointment_id: i64) -> HealthResult<Appointment> {
    ensure_can_view_appointments(caller)?;

    let mut conn = ctx.db.pool().acquire().await?;
    match fetch(&mut conn, appointment_id).await {
        Ok(a) if caller.is(Role::Admin) || a.involves(caller.user_id) => Ok(a),
        Ok(_) | Err(HealthError::NotFound(_)) => {
            Err(HealthError::NotFound("Appointment not found".to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Appointments visible to the caller, soonest first
pub async fn list(
    ctx: &ServiceContext,
    caller: &Caller,
    filter: &AppointmentFilter,
    pagination: &PaginationInput,
) -> HealthResult<PaginatedResult<Appointment>> {
    ensure_can_view_appointments(caller)?;
    pagination.validate()?;

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM appointments WHERE 1 = 1");
    push_scope(&mut count, caller, filter);
    let total: i64 = count.build_query_scalar().fetch_one(ctx.db.pool()).await?;
    if total == 0 {
        return Ok(PaginatedResult::empty(pagination));
    }

    let (limit, offset) = pagination.sql_bounds();
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM appointments WHERE 1 = 1",
        APPOINTMENT_COLUMNS
    ));
    push_scope(&mut query, caller, filter);
    query
        .push(" ORDER BY appointment_date, id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let items = query
        .build_query_as::<Appointment>()
        .fetch_all(ctx.db.pool())
        .await?;
    Ok(PaginatedResult::new(items, total as usize, pagination))
}

/// Free 30-minute slots of a doctor's consulting day
pub async fn available_slots(
    ctx: &ServiceContext,
    caller: &Caller,
    doctor_id: i64,
    date: NaiveDate,
) -> HealthResult<Vec<DateTime<Utc>>> {
    if caller.user_id != doctor_id {
        caller.require(Permission::ViewDoctors)?;
    }

    let mut conn = ctx.db.pool().acquire().await?;
    ensure_doctor_bookable(&mut conn, doctor_id).await?;

    let slots = day_slots(date);
    let (Some(first), Some(last)) = (slots.first().copied(), slots.last().copied()) else {
        return Ok(Vec::new());
    };
    let busy: Vec<(DateTime<Utc>, i64)> = sqlx::query_as(
        "SELECT appointment_date, duration_minutes FROM appointments
         WHERE doctor_id = ? AND status != 'cancelled'
           AND appointment_date > ? AND appointment_date < ?",
    )
    .bind(doctor_id)
    .bind(conflict_window_start(first))
    .bind(last + Duration::minutes(SLOT_MINUTES))
    .fetch_all(&mut *conn)
    .await?;

    Ok(free_slots(date, ctx.clock.now(), &busy))
}

/// Distinct patients with at least one appointment with the calling doctor
pub async fn doctor_patients(
    ctx: &ServiceContext,
    caller: &Caller,
    pagination: &PaginationInput,
) -> HealthResult<PaginatedResult<DoctorPatient>> {
    caller.require(Permission::ViewDoctorPatients)?;
    pagination.validate()?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT patient_id) FROM appointments WHERE doctor_id = ?")
        .bind(caller.user_id)
        .fetch_one(ctx.db.pool())
        .await?;
    if total == 0 {
        return Ok(PaginatedResult::empty(pagination));
    }

    let (limit, offset) = pagination.sql_bounds();
    let patients = sqlx::query_as::<_, DoctorPatient>(
        "SELECT u.id, u.first_name, u.last_name, u.email, u.phone,
                COUNT(a.id) AS appointment_count, MAX(a.appointment_date) AS last_appointment
         FROM appointments a JOIN users u ON u.id = a.patient_id
         WHERE a.doctor_id = ?
         GROUP BY u.id, u.first_name, u.last_name, u.email, u.phone
         ORDER BY u.last_name, u.first_name, u.id
         LIMIT ? OFFSET ?",
    )
    .bind(caller.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(ctx.db.pool())
    .await?;

    Ok(PaginatedResult::new(patients, total as usize, pagination))
}

// ==================== HELPERS ====================

fn ensure_can_view_appointments(caller: &Caller) -> HealthResult<()> {
    match caller.role {
        Role::Patient => caller.require(Permission::ViewOwnAppointments),
        Role::Doctor => caller.require(Permission::ViewDoctorAppointments),
        Role::Admin => Ok(()),
        Role::Government => Err(HealthError::Authorization(
            "Government accounts only see aggregate statistics".to_string(),
        )),
    }
}

fn push_scope(query: &mut QueryBuilder<'_, Sqlite>, caller: &Caller, filter: &AppointmentFilter) {
    match caller.role {
        Role::Patient => {
            query.push(" AND patient_id = ").push_bind(caller.user_id);
        }
        Role::Doctor => {
            query.push(" AND doctor_id = ").push_bind(caller.user_id);
        }
        Role::Admin | Role::Government => {}
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status);
    }
    if let Some(from) = filter.from {
        query.push(" AND appointment_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND appointment_date < ").push_bind(to);
    }
}

async fn fetch(conn: &mut SqliteConnection, appointment_id: i64) -> HealthResult<Appointment> {
    sqlx::query_as::<_, Appointment>(&format!(
        "SELECT {} FROM appointments WHERE id = ?",
        APPOINTMENT_COLUMNS
    ))
    .bind(appointment_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| HealthError::NotFound("Appointment not found".to_string()))
}

/// Fetch an appointment the caller is a party to; anything else is not found
async fn fetch_owned(conn: &mut SqliteConnection, caller: &Caller, appointment_id: i64) -> HealthResult<Appointment> {
    match fetch(conn, appointment_id).await {
        Ok(a) if a.involves(caller.user_id) => Ok(a),
        Ok(_) => Err(HealthError::NotFound("Appointment not found".to_string())),
        Err(e) => Err(e),
    }
}

/// Take the write lock on the doctor's row
async fn lock_doctor(conn: &mut SqliteConnection, doctor_id: i64) -> HealthResult<()> {
    let locked = sqlx::query("UPDATE doctors SET updated_at = updated_at WHERE user_id = ?")
        .bind(doctor_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if locked == 0 {
        return Err(HealthError::NotFound("Doctor not found".to_string()));
    }
    Ok(())
}

async fn ensure_doctor_bookable(conn: &mut SqliteConnection, doctor_id: i64) -> HealthResult<()> {
    let doctor: Option<(bool, VerificationStatus)> = sqlx::query_as(
        "SELECT u.is_active, u.verification_status FROM users u JOIN doctors d ON d.user_id = u.id WHERE u.id = ?",
    )
    .bind(doctor_id)
    .fetch_optional(&mut *conn)
    .await?;

    match doctor {
        None => Err(HealthError::NotFound("Doctor not found".to_string())),
        Some((false, _)) => Err(HealthError::BusinessRule("Doctor account is inactive".to_string())),
        Some((true, VerificationStatus::Verified)) => Ok(()),
        Some((true, _)) => Err(HealthError::BusinessRule("Doctor is not verified".to_string())),
    }
}

/// Fail with a conflict when the interval overlaps another live appointment
async fn ensure_no_overlap(
    conn: &mut SqliteConnection,
    doctor_id: i64,
    start: DateTime<Utc>,
    duration: i64,
    exclude: Option<i64>,
) -> HealthResult<()> {
    let candidates: Vec<(i64, DateTime<Utc>, i64)> = sqlx::query_as(
        "SELECT id, appointment_date, duration_minutes FROM appointments
         WHERE doctor_id = ? AND status != 'cancelled'
           AND appointment_date > ? AND appointment_date < ?",
    )
    .bind(doctor_id)
    .bind(conflict_window_start(start))
    .bind(start + Duration::minutes(duration))
    .fetch_all(&mut *conn)
    .await?;

    let clash = candidates
        .into_iter()
        .filter(|(id, _, _)| Some(*id) != exclude)
        .find(|(_, other, other_minutes)| overlaps(start, duration, *other, *other_minutes));

    if let Some((other_id, other_start, _)) = clash {
        tracing::info!(doctor_id, %start, other_id, %other_start, "booking conflict");
        return Err(HealthError::Conflict(
            "Doctor already has an appointment at this time".to_string(),
        ));
    }
    Ok(())
}
