//! Reporting Coordinator
//!
//! Read-only aggregates over appointments, medical records, health metrics
//! and accounts:
//! - System overview and disease surveillance for government accounts
//! - Population health-metric statistics
//! - Monthly and quarterly period reports
//! - Role-dependent dashboard counters
//! - Audit log access
//!
//! Nothing here returns an individual patient's data; every figure is a
//! count or an average.

pub mod stats;

use std::collections::{BTreeMap, HashMap};

use carelink_shared::audit::{self, AuditEvent};
use carelink_shared::{
    AuditLogEntry, Caller, HealthError, HealthResult, PaginatedResult, PaginationInput, Permission,
    Role, ServiceContext,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use records_integrity::{normalize_metric_type, parse_numeric};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

pub use stats::{age_bucket, age_on, percentage_change, AGE_BUCKETS};

pub const OVERVIEW_WINDOW_DAYS: i64 = 30;
pub const DIAGNOSIS_WINDOW_DAYS: i64 = 180;
pub const TOP_DIAGNOSES: i64 = 10;
pub const SURVEILLANCE_WINDOW_DAYS: i64 = 30;
pub const SURVEILLANCE_BASELINE_DAYS: i64 = 90;
pub const SURVEILLANCE_TOP: i64 = 20;
pub const METRIC_HISTORY_DAYS: i64 = 365;
pub const DEFAULT_SERIES_DAYS: i64 = 30;
pub const MAX_SERIES_DAYS: i64 = 365;

// ==================== TYPES ====================

/// A label with the number of rows carrying it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Totals {
    pub patients: i64,
    pub doctors: i64,
    pub appointments: i64,
    pub medical_records: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Overview {
    pub totals: Totals,
    pub new_registrations: i64,
    pub recent_appointments: i64,
    pub status_distribution: Vec<LabelCount>,
    pub top_diagnoses: Vec<LabelCount>,
    pub verified_doctors: i64,
    pub pending_doctors: i64,
    pub generated_at: DateTime<Utc>,
}

/// Diagnosis frequency compared with the preceding baseline window
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiagnosisTrend {
    pub diagnosis: String,
    pub recent_count: i64,
    pub previous_count: i64,
    pub change_percent: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Surveillance {
    pub window_days: i64,
    pub trends: Vec<DiagnosisTrend>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricTypeSummary {
    pub metric_type: String,
    pub count: usize,
    pub numeric_count: usize,
    /// Mean of the values that parse as numbers
    pub average: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricStatistics {
    pub by_type: Vec<MetricTypeSummary>,
    /// Measurements per `YYYY-MM` over the last year, oldest first
    pub monthly: Vec<LabelCount>,
    pub age_distribution: Vec<LabelCount>,
}

/// One numeric measurement on a population chart
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricPoint {
    pub recorded_at: DateTime<Utc>,
    pub metric_type: String,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    #[default]
    Monthly,
    Quarterly,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Monthly => "monthly",
            ReportPeriod::Quarterly => "quarterly",
        }
    }

    /// Start of the period containing `now`, at midnight UTC
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let first_day = match self {
            ReportPeriod::Monthly => stats::month_start(today),
            ReportPeriod::Quarterly => stats::quarter_start(today),
        };
        first_day.and_time(NaiveTime::MIN).and_utc()
    }
}

/// Period-to-date report
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PeriodReport {
    pub period: ReportPeriod,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub new_patients: i64,
    pub new_doctors: i64,
    pub total_appointments: i64,
    pub completed_appointments: i64,
    pub top_diagnoses: Vec<LabelCount>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum DashboardStats {
    Patient {
        total_appointments: i64,
        upcoming_appointments: i64,
        total_records: i64,
    },
    Doctor {
        total_patients: i64,
        total_appointments: i64,
        completed_appointments: i64,
    },
    System {
        total_patients: i64,
        total_doctors: i64,
        total_appointments: i64,
        total_records: i64,
    },
}

// ==================== ANALYTICS ====================

/// System-wide overview for the government dashboard
pub async fn overview(ctx: &ServiceContext, caller: &Caller) -> HealthResult<Overview> {
    caller.require(Permission::ViewAnalytics)?;
    let now = ctx.clock.now();
    let since = now - Duration::days(OVERVIEW_WINDOW_DAYS);
    let mut conn = ctx.db.pool().acquire().await?;

    let totals = totals(&mut conn).await?;

    let new_registrations = scalar(
        &mut conn,
        "SELECT COUNT(*) FROM users WHERE role != 'admin' AND created_at >= ?",
        Some(since),
    )
    .await?;
    let recent_appointments = scalar(
        &mut conn,
        "SELECT COUNT(*) FROM appointments WHERE created_at >= ?",
        Some(since),
    )
    .await?;

    let status_distribution = sqlx::query_as::<_, LabelCount>(
        "SELECT status AS label, COUNT(*) AS count FROM appointments GROUP BY status ORDER BY status",
    )
    .fetch_all(&mut *conn)
    .await?;

    let top_diagnoses = top_diagnoses(
        &mut conn,
        now - Duration::days(DIAGNOSIS_WINDOW_DAYS),
        now,
        TOP_DIAGNOSES,
    )
    .await?;

    let verified_doctors = doctors_with_status(&mut conn, "verified").await?;
    let pending_doctors = doctors_with_status(&mut conn, "pending").await?;

    Ok(Overview {
        totals,
        new_registrations,
        recent_appointments,
        status_distribution,
        top_diagnoses,
        verified_doctors,
        pending_doctors,
        generated_at: now,
    })
}

/// Most frequent recent diagnoses and how they moved against the baseline
pub async fn disease_surveillance(ctx: &ServiceContext, caller: &Caller) -> HealthResult<Surveillance> {
    caller.require(Permission::ViewHealthAlerts)?;
    let now = ctx.clock.now();
    let window_start = now - Duration::days(SURVEILLANCE_WINDOW_DAYS);
    let baseline_start = now - Duration::days(SURVEILLANCE_BASELINE_DAYS);
    let mut conn = ctx.db.pool().acquire().await?;

    let recent = top_diagnoses(&mut conn, window_start, now, SURVEILLANCE_TOP).await?;
    let baseline_end = window_start - Duration::seconds(1);
    let previous: HashMap<String, i64> = top_diagnoses(&mut conn, baseline_start, baseline_end, i64::MAX)
        .await?
        .into_iter()
        .map(|row| (row.label, row.count))
        .collect();

    let trends = recent
        .into_iter()
        .map(|row| {
            let previous_count = previous.get(&row.label).copied().unwrap_or(0);
            DiagnosisTrend {
                change_percent: percentage_change(row.count, previous_count),
                diagnosis: row.label,
                recent_count: row.count,
                previous_count,
            }
        })
        .collect();

    Ok(Surveillance {
        window_days: SURVEILLANCE_WINDOW_DAYS,
        trends,
        generated_at: now,
    })
}

/// Population statistics over patient-reported metrics
pub async fn metric_statistics(ctx: &ServiceContext, caller: &Caller) -> HealthResult<MetricStatistics> {
    caller.require(Permission::ViewAnalytics)?;
    let now = ctx.clock.now();
    let mut conn = ctx.db.pool().acquire().await?;

    let rows: Vec<(String, String)> = sqlx::query_as("SELECT metric_type, value FROM health_metrics")
        .fetch_all(&mut *conn)
        .await?;

    let mut per_type: BTreeMap<String, (usize, stats::Mean)> = BTreeMap::new();
    for (metric_type, value) in rows {
        let entry = per_type.entry(metric_type).or_default();
        entry.0 += 1;
        if let Some(number) = parse_numeric(&value) {
            entry.1.push(number);
        }
    }
    let by_type = per_type
        .into_iter()
        .map(|(metric_type, (count, mean))| MetricTypeSummary {
            metric_type,
            count,
            numeric_count: mean.count(),
            average: mean.value(),
        })
        .collect();

    let monthly = sqlx::query_as::<_, LabelCount>(
        "SELECT substr(recorded_at, 1, 7) AS label, COUNT(*) AS count
         FROM health_metrics WHERE recorded_at >= ?
         GROUP BY label ORDER BY label",
    )
    .bind(now - Duration::days(METRIC_HISTORY_DAYS))
    .fetch_all(&mut *conn)
    .await?;

    let births: Vec<NaiveDate> =
        sqlx::query_scalar("SELECT date_of_birth FROM patients WHERE date_of_birth IS NOT NULL")
            .fetch_all(&mut *conn)
            .await?;
    let age_distribution = age_distribution(&births, now.date_naive());

    Ok(MetricStatistics {
        by_type,
        monthly,
        age_distribution,
    })
}

/// Numeric measurements of the last `days` days, oldest first
///
/// Values that do not parse as numbers (`120/80`, `normal`) are skipped.
pub async fn metric_series(
    ctx: &ServiceContext,
    caller: &Caller,
    metric_type: Option<&str>,
    days: Option<i64>,
) -> HealthResult<Vec<MetricPoint>> {
    caller.require(Permission::ViewAnalytics)?;
    let days = days.unwrap_or(DEFAULT_SERIES_DAYS);
    if !(1..=MAX_SERIES_DAYS).contains(&days) {
        return Err(HealthError::validation(format!(
            "days must be between 1 and {}",
            MAX_SERIES_DAYS
        )));
    }
    let metric_type = metric_type.map(normalize_metric_type).filter(|t| !t.is_empty());
    let since = ctx.clock.now() - Duration::days(days);

    let rows: Vec<(DateTime<Utc>, String, String)> = sqlx::query_as(
        "SELECT recorded_at, metric_type, value FROM health_metrics
         WHERE recorded_at >= ? AND (? IS NULL OR metric_type = ?)
         ORDER BY recorded_at ASC, id ASC",
    )
    .bind(since)
    .bind(&metric_type)
    .bind(&metric_type)
    .fetch_all(ctx.db.pool())
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(recorded_at, metric_type, value)| {
            parse_numeric(&value).map(|value| MetricPoint {
                recorded_at,
                metric_type,
                value,
            })
        })
        .collect())
}

// ==================== REPORTS ====================

/// Period-to-date report; generation is audited
pub async fn generate_report(
    ctx: &ServiceContext,
    caller: &Caller,
    period: ReportPeriod,
) -> HealthResult<PeriodReport> {
    caller.require(Permission::GenerateReports)?;
    let now = ctx.clock.now();
    let start = period.start(now);
    let mut conn = ctx.db.pool().acquire().await?;

    let new_patients = scalar(
        &mut conn,
        "SELECT COUNT(*) FROM users WHERE role = 'patient' AND created_at >= ?",
        Some(start),
    )
    .await?;
    let new_doctors = scalar(
        &mut conn,
        "SELECT COUNT(*) FROM users WHERE role = 'doctor' AND created_at >= ?",
        Some(start),
    )
    .await?;
    let total_appointments = scalar(
        &mut conn,
        "SELECT COUNT(*) FROM appointments WHERE appointment_date >= ?",
        Some(start),
    )
    .await?;
    let completed_appointments = scalar(
        &mut conn,
        "SELECT COUNT(*) FROM appointments WHERE appointment_date >= ? AND status = 'completed'",
        Some(start),
    )
    .await?;
    let top_diagnoses = top_diagnoses(&mut conn, start, now, TOP_DIAGNOSES).await?;

    audit::record(
        &mut *conn,
        AuditEvent::new("report_generated")
            .by(caller.user_id)
            .details(period.as_str()),
        now,
    )
    .await?;
    tracing::info!(user_id = caller.user_id, period = period.as_str(), "report generated");

    Ok(PeriodReport {
        period,
        start,
        end: now,
        new_patients,
        new_doctors,
        total_appointments,
        completed_appointments,
        top_diagnoses,
    })
}

/// Counters for the caller's home screen
pub async fn dashboard_stats(ctx: &ServiceContext, caller: &Caller) -> HealthResult<DashboardStats> {
    let now = ctx.clock.now();
    let mut conn = ctx.db.pool().acquire().await?;

    match caller.role {
        Role::Patient => {
            caller.require(Permission::ViewOwnAppointments)?;
            let (total_appointments, upcoming_appointments): (i64, i64) = sqlx::query_as(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN appointment_date > ? THEN 1 ELSE 0 END), 0)
                 FROM appointments WHERE patient_id = ?",
            )
            .bind(now)
            .bind(caller.user_id)
            .fetch_one(&mut *conn)
            .await?;
            let total_records: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM medical_records WHERE patient_id = ?")
                    .bind(caller.user_id)
                    .fetch_one(&mut *conn)
                    .await?;
            Ok(DashboardStats::Patient {
                total_appointments,
                upcoming_appointments,
                total_records,
            })
        }
        Role::Doctor => {
            caller.require(Permission::ViewDoctorStats)?;
            let (total_patients, total_appointments, completed_appointments): (i64, i64, i64) =
                sqlx::query_as(
                    "SELECT COUNT(DISTINCT patient_id), COUNT(*),
                            COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0)
                     FROM appointments WHERE doctor_id = ?",
                )
                .bind(caller.user_id)
                .fetch_one(&mut *conn)
                .await?;
            Ok(DashboardStats::Doctor {
                total_patients,
                total_appointments,
                completed_appointments,
            })
        }
        Role::Government | Role::Admin => {
            caller.require(Permission::ViewSystemStats)?;
            let totals = totals(&mut conn).await?;
            Ok(DashboardStats::System {
                total_patients: totals.patients,
                total_doctors: totals.doctors,
                total_appointments: totals.appointments,
                total_records: totals.medical_records,
            })
        }
    }
}

/// Page of the audit trail, newest first
pub async fn audit_log(
    ctx: &ServiceContext,
    caller: &Caller,
    pagination: &PaginationInput,
) -> HealthResult<PaginatedResult<AuditLogEntry>> {
    caller.require(Permission::ViewAuditLogs)?;
    audit::page(ctx.db.pool(), pagination).await
}

// ==================== HELPERS ====================

async fn scalar(conn: &mut SqliteConnection, sql: &str, since: Option<DateTime<Utc>>) -> HealthResult<i64> {
    let mut query = sqlx::query_scalar::<_, i64>(sql);
    if let Some(since) = since {
        query = query.bind(since);
    }
    Ok(query.fetch_one(&mut *conn).await?)
}

async fn totals(conn: &mut SqliteConnection) -> HealthResult<Totals> {
    Ok(Totals {
        patients: scalar(conn, "SELECT COUNT(*) FROM patients", None).await?,
        doctors: scalar(conn, "SELECT COUNT(*) FROM doctors", None).await?,
        appointments: scalar(conn, "SELECT COUNT(*) FROM appointments", None).await?,
        medical_records: scalar(conn, "SELECT COUNT(*) FROM medical_records", None).await?,
    })
}

async fn doctors_with_status(conn: &mut SqliteConnection, status: &str) -> HealthResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM doctors d JOIN users u ON u.id = d.user_id WHERE u.verification_status = ?",
    )
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Most frequent non-empty diagnoses recorded between `from` and `to`
///
/// Both bounds are inclusive; stored times are whole seconds.
async fn top_diagnoses(
    conn: &mut SqliteConnection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    limit: i64,
) -> HealthResult<Vec<LabelCount>> {
    let rows = sqlx::query_as::<_, LabelCount>(
        "SELECT diagnosis AS label, COUNT(*) AS count FROM medical_records
         WHERE record_date >= ? AND record_date <= ? AND trim(diagnosis) != ''
         GROUP BY diagnosis ORDER BY count DESC, label ASC LIMIT ?",
    )
    .bind(from)
    .bind(to)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

fn age_distribution(births: &[NaiveDate], today: NaiveDate) -> Vec<LabelCount> {
    let mut counts: BTreeMap<&'static str, i64> = AGE_BUCKETS.iter().map(|b| (*b, 0)).collect();
    for age in births.iter().filter_map(|dob| age_on(*dob, today)) {
        *counts.entry(age_bucket(age)).or_default() += 1;
    }
    AGE_BUCKETS
        .iter()
        .map(|bucket| LabelCount {
            label: bucket.to_string(),
            count: counts.get(bucket).copied().unwrap_or(0),
        })
        .collect()
}

#[cfg(test)]
mod tests;
