use super::*;
use carelink_shared::{Database, FixedClock};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

struct Fixture {
    ctx: ServiceContext,
    patient: Caller,
    doctor: Caller,
    official: Caller,
    admin: Caller,
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 17, 12, 0, 0).unwrap()
}

async fn insert_user(ctx: &ServiceContext, email: &str, role: Role, status: &str, at: DateTime<Utc>) -> i64 {
    sqlx::query(
        "INSERT INTO users (email, password_hash, role, first_name, last_name, is_active, verification_status, created_at, updated_at)
         VALUES (?, 'x', ?, 'First', 'Last', 1, ?, ?, ?)",
    )
    .bind(email)
    .bind(role)
    .bind(status)
    .bind(at)
    .bind(at)
    .execute(ctx.db.pool())
    .await
    .unwrap()
    .last_insert_rowid()
}

async fn insert_patient(ctx: &ServiceContext, email: &str, dob: Option<NaiveDate>, at: DateTime<Utc>) -> i64 {
    let id = insert_user(ctx, email, Role::Patient, "not_required", at).await;
    sqlx::query("INSERT INTO patients (user_id, date_of_birth, updated_at) VALUES (?, ?, ?)")
        .bind(id)
        .bind(dob)
        .bind(at)
        .execute(ctx.db.pool())
        .await
        .unwrap();
    id
}

async fn insert_doctor(ctx: &ServiceContext, email: &str, license: &str, status: &str, at: DateTime<Utc>) -> i64 {
    let id = insert_user(ctx, email, Role::Doctor, status, at).await;
    sqlx::query("INSERT INTO doctors (user_id, license_number, specialization, updated_at) VALUES (?, ?, 'General', ?)")
        .bind(id)
        .bind(license)
        .bind(at)
        .execute(ctx.db.pool())
        .await
        .unwrap();
    id
}

async fn insert_appointment(ctx: &ServiceContext, patient: i64, doctor: i64, at: DateTime<Utc>, status: &str) {
    sqlx::query(
        "INSERT INTO appointments (patient_id, doctor_id, appointment_date, duration_minutes, status, reason, created_at, updated_at)
         VALUES (?, ?, ?, 30, ?, 'Checkup', ?, ?)",
    )
    .bind(patient)
    .bind(doctor)
    .bind(at)
    .bind(status)
    .bind(at)
    .bind(at)
    .execute(ctx.db.pool())
    .await
    .unwrap();
}

async fn insert_record(ctx: &ServiceContext, patient: i64, doctor: i64, diagnosis: &str, at: DateTime<Utc>) {
    sqlx::query(
        "INSERT INTO medical_records (patient_id, doctor_id, diagnosis, record_date, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(patient)
    .bind(doctor)
    .bind(diagnosis)
    .bind(at)
    .bind(at)
    .execute(ctx.db.pool())
    .await
    .unwrap();
}

async fn insert_metric(ctx: &ServiceContext, patient: i64, metric_type: &str, value: &str, at: DateTime<Utc>) {
    sqlx::query("INSERT INTO health_metrics (patient_id, metric_type, value, recorded_at) VALUES (?, ?, ?, ?)")
        .bind(patient)
        .bind(metric_type)
        .bind(value)
        .bind(at)
        .execute(ctx.db.pool())
        .await
        .unwrap();
}

async fn fixture() -> Fixture {
    let db = Database::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    let ctx = ServiceContext::new(db, Arc::new(FixedClock::new(now())));
    let long_ago = now() - Duration::days(400);

    let patient = insert_patient(&ctx, "p1@example.com", NaiveDate::from_ymd_opt(1990, 1, 1), long_ago).await;
    let second = insert_patient(&ctx, "p2@example.com", NaiveDate::from_ymd_opt(1950, 6, 1), now() - Duration::days(3)).await;
    insert_patient(&ctx, "p3@example.com", None, now() - Duration::days(200)).await;

    let doctor = insert_doctor(&ctx, "d1@example.com", "MD000001", "verified", long_ago).await;
    insert_doctor(&ctx, "d2@example.com", "MD000002", "pending", now() - Duration::days(1)).await;

    let official = insert_user(&ctx, "gov@example.com", Role::Government, "verified", long_ago).await;
    let admin = insert_user(&ctx, "admin@example.com", Role::Admin, "not_required", long_ago).await;

    insert_appointment(&ctx, patient, doctor, now() - Duration::days(10), "completed").await;
    insert_appointment(&ctx, second, doctor, now() - Duration::days(2), "cancelled").await;
    insert_appointment(&ctx, patient, doctor, now() + Duration::days(2), "scheduled").await;

    // Flu rising, Asthma new, Hypertension only in the baseline window
    for days in [1, 5, 9] {
        insert_record(&ctx, patient, doctor, "Influenza", now() - Duration::days(days)).await;
    }
    insert_record(&ctx, second, doctor, "Influenza", now() - Duration::days(45)).await;
    insert_record(&ctx, second, doctor, "Asthma", now() - Duration::days(4)).await;
    insert_record(&ctx, patient, doctor, "Hypertension", now() - Duration::days(60)).await;
    insert_record(&ctx, patient, doctor, "  ", now() - Duration::days(2)).await;

    insert_metric(&ctx, patient, "heart_rate", "72", now() - Duration::days(40)).await;
    insert_metric(&ctx, patient, "heart_rate", "80", now() - Duration::days(5)).await;
    insert_metric(&ctx, second, "heart_rate", "77", now() - Duration::days(1)).await;
    insert_metric(&ctx, second, "blood_pressure", "120/80", now() - Duration::days(1)).await;

    Fixture {
        ctx,
        patient: Caller::new(patient, Role::Patient),
        doctor: Caller::new(doctor, Role::Doctor),
        official: Caller::new(official, Role::Government),
        admin: Caller::new(admin, Role::Admin),
    }
}

#[tokio::test]
async fn test_overview() {
    let f = fixture().await;
    let overview = overview(&f.ctx, &f.official).await.unwrap();

    assert_eq!(
        overview.totals,
        Totals {
            patients: 3,
            doctors: 2,
            appointments: 3,
            medical_records: 7,
        }
    );
    // p2 and the pending doctor
    assert_eq!(overview.new_registrations, 2);
    assert_eq!(overview.recent_appointments, 3);
    assert_eq!(overview.verified_doctors, 1);
    assert_eq!(overview.pending_doctors, 1);

    let statuses: Vec<(&str, i64)> = overview
        .status_distribution
        .iter()
        .map(|s| (s.label.as_str(), s.count))
        .collect();
    assert_eq!(statuses, vec![("cancelled", 1), ("completed", 1), ("scheduled", 1)]);

    assert_eq!(overview.top_diagnoses[0].label, "Influenza");
    assert_eq!(overview.top_diagnoses[0].count, 4);
    assert!(overview.top_diagnoses.iter().all(|d| !d.label.trim().is_empty()));
}

#[tokio::test]
async fn test_analytics_require_permission() {
    let f = fixture().await;
    assert!(matches!(
        overview(&f.ctx, &f.patient).await,
        Err(HealthError::Authorization(_))
    ));
    assert!(matches!(
        disease_surveillance(&f.ctx, &f.doctor).await,
        Err(HealthError::Authorization(_))
    ));
    assert!(matches!(
        generate_report(&f.ctx, &f.doctor, ReportPeriod::Monthly).await,
        Err(HealthError::Authorization(_))
    ));
    assert!(matches!(
        audit_log(&f.ctx, &f.patient, &PaginationInput::default()).await,
        Err(HealthError::Authorization(_))
    ));
    // Admin holds every permission
    assert!(overview(&f.ctx, &f.admin).await.is_ok());
}

#[tokio::test]
async fn test_disease_surveillance() {
    let f = fixture().await;
    let report = disease_surveillance(&f.ctx, &f.official).await.unwrap();
    assert_eq!(report.window_days, 30);

    let flu = report.trends.iter().find(|t| t.diagnosis == "Influenza").unwrap();
    assert_eq!((flu.recent_count, flu.previous_count), (3, 1));
    assert_eq!(flu.change_percent, 200.0);

    let asthma = report.trends.iter().find(|t| t.diagnosis == "Asthma").unwrap();
    assert_eq!(asthma.previous_count, 0);
    assert_eq!(asthma.change_percent, 100.0);

    // Only seen in the baseline window
    assert!(report.trends.iter().all(|t| t.diagnosis != "Hypertension"));
}

#[tokio::test]
async fn test_metric_statistics() {
    let f = fixture().await;
    let stats = metric_statistics(&f.ctx, &f.official).await.unwrap();

    let heart = stats.by_type.iter().find(|s| s.metric_type == "heart_rate").unwrap();
    assert_eq!(heart.count, 3);
    assert_eq!(heart.average, Some(76.3));

    let pressure = stats.by_type.iter().find(|s| s.metric_type == "blood_pressure").unwrap();
    assert_eq!(pressure.numeric_count, 0);
    assert_eq!(pressure.average, None);

    let months: Vec<&str> = stats.monthly.iter().map(|m| m.label.as_str()).collect();
    assert_eq!(months, vec!["2025-04", "2025-05"]);

    let ages: Vec<(&str, i64)> = stats
        .age_distribution
        .iter()
        .map(|a| (a.label.as_str(), a.count))
        .collect();
    assert_eq!(
        ages,
        vec![("0-18", 0), ("19-35", 1), ("36-50", 0), ("51-65", 0), ("65+", 1)]
    );
}

#[tokio::test]
async fn test_metric_series() {
    let f = fixture().await;
    let points = metric_series(&f.ctx, &f.official, Some("Heart Rate"), None).await.unwrap();
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![80.0, 77.0]);

    // Non-numeric readings are left out
    let all = metric_series(&f.ctx, &f.official, None, Some(60)).await.unwrap();
    assert_eq!(all.len(), 3);

    assert!(matches!(
        metric_series(&f.ctx, &f.official, None, Some(0)).await,
        Err(HealthError::Validation { .. })
    ));
}

#[tokio::test]
async fn test_generate_report() {
    let f = fixture().await;
    let monthly = generate_report(&f.ctx, &f.official, ReportPeriod::Monthly).await.unwrap();
    assert_eq!(monthly.start, Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
    assert_eq!(monthly.end, now());
    assert_eq!(monthly.new_patients, 1);
    assert_eq!(monthly.new_doctors, 1);
    // Includes the upcoming appointment on the 19th
    assert_eq!(monthly.total_appointments, 3);
    assert_eq!(monthly.completed_appointments, 1);

    let quarterly = generate_report(&f.ctx, &f.official, ReportPeriod::Quarterly).await.unwrap();
    assert_eq!(quarterly.start, Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap());
    assert!(quarterly.top_diagnoses.iter().any(|d| d.label == "Influenza" && d.count == 4));

    let audited: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE action = 'report_generated'")
        .fetch_one(f.ctx.db.pool())
        .await
        .unwrap();
    assert_eq!(audited, 2);
}

#[tokio::test]
async fn test_dashboard_stats_per_role() {
    let f = fixture().await;

    assert_eq!(
        dashboard_stats(&f.ctx, &f.patient).await.unwrap(),
        DashboardStats::Patient {
            total_appointments: 2,
            upcoming_appointments: 1,
            total_records: 5,
        }
    );
    assert_eq!(
        dashboard_stats(&f.ctx, &f.doctor).await.unwrap(),
        DashboardStats::Doctor {
            total_patients: 2,
            total_appointments: 3,
            completed_appointments: 1,
        }
    );

    let system = DashboardStats::System {
        total_patients: 3,
        total_doctors: 2,
        total_appointments: 3,
        total_records: 7,
    };
    assert_eq!(dashboard_stats(&f.ctx, &f.official).await.unwrap(), system);
    assert_eq!(dashboard_stats(&f.ctx, &f.admin).await.unwrap(), system);
}

#[tokio::test]
async fn test_audit_log_page() {
    let f = fixture().await;
    generate_report(&f.ctx, &f.official, ReportPeriod::Quarterly).await.unwrap();

    let page = audit_log(&f.ctx, &f.official, &PaginationInput::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].action, "report_generated");
    assert_eq!(page.items[0].details.as_deref(), Some("quarterly"));
}
