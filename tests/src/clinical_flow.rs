//! Visit Flow Tests
//!
//! Booking through completion to a medical record that references the
//! appointment, and what each role can see afterwards.

#[cfg(test)]
mod tests {
    use crate::harness::Harness;
    use carelink_shared::{HealthError, PaginationInput};
    use chrono::{Duration, TimeZone, Utc};
    use records_integrity::{CreateMetricInput, CreateRecordInput};
    use reporting::DashboardStats;
    use scheduling_integrity::{AppointmentStatus, BookAppointmentInput};

    #[tokio::test]
    async fn test_booking_to_medical_record() {
        let h = Harness::start(Utc.with_ymd_and_hms(2025, 2, 20, 9, 0, 0).unwrap())
            .await
            .unwrap();
        let patient = h.register_patient("pat@example.com").await.unwrap();
        let doctor = h.verified_doctor("doc@example.com", "MD100001").await.unwrap();
        let official = h.verified_official("gov@example.com", "GOV-001").await.unwrap();
        let when = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();

        let booked = scheduling::book(
            &h.ctx,
            &patient,
            BookAppointmentInput {
                doctor_id: doctor.user_id,
                appointment_date: when,
                duration_minutes: None,
                reason: "Persistent cough".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(booked.status, AppointmentStatus::Scheduled);
        assert_eq!(booked.appointment_date, when);

        let confirmed = scheduling::confirm(&h.ctx, &doctor, booked.id).await.unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        h.clock.set(when + Duration::minutes(40));
        let completed = scheduling::complete(&h.ctx, &doctor, booked.id, Some("ok".to_string()))
            .await
            .unwrap();
        assert_eq!(completed.status, AppointmentStatus::Completed);
        assert_eq!(completed.notes.as_deref(), Some("ok"));

        let record = records::add_record(
            &h.ctx,
            &doctor,
            patient.user_id,
            CreateRecordInput {
                appointment_id: Some(booked.id),
                diagnosis: "Acute bronchitis".to_string(),
                treatment: Some("Rest and fluids".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(record.appointment_id, Some(booked.id));

        let page = PaginationInput::default();
        let own = records::list_records(&h.ctx, &patient, patient.user_id, &page).await.unwrap();
        assert_eq!(own.items, vec![record]);

        // Aggregates only for government
        let denied = records::list_records(&h.ctx, &official, patient.user_id, &page).await;
        assert!(matches!(denied, Err(HealthError::Authorization(_))));
        let overview = reporting::overview(&h.ctx, &official).await.unwrap();
        assert_eq!(overview.totals.medical_records, 1);
        assert_eq!(overview.top_diagnoses[0].label, "Acute bronchitis");

        assert_eq!(
            reporting::dashboard_stats(&h.ctx, &patient).await.unwrap(),
            DashboardStats::Patient {
                total_appointments: 1,
                upcoming_appointments: 0,
                total_records: 1,
            }
        );

        // Each step left a note for the other party
        let inbox = carelink_shared::notifications::list_notifications(&h.ctx, &patient, true)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 3);
    }

    #[tokio::test]
    async fn test_metrics_feed_population_statistics() {
        let h = Harness::start(Utc.with_ymd_and_hms(2025, 2, 20, 9, 0, 0).unwrap())
            .await
            .unwrap();
        let patient = h.register_patient("pat@example.com").await.unwrap();
        let official = h.verified_official("gov@example.com", "GOV-001").await.unwrap();

        for value in ["70", "74", "irregular"] {
            records::add_metric(
                &h.ctx,
                &patient,
                CreateMetricInput {
                    metric_type: "Heart Rate".to_string(),
                    value: value.to_string(),
                    unit: Some("bpm".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let stats = reporting::metric_statistics(&h.ctx, &official).await.unwrap();
        let heart = &stats.by_type[0];
        assert_eq!(heart.metric_type, "heart_rate");
        assert_eq!((heart.count, heart.numeric_count), (3, 2));
        assert_eq!(heart.average, Some(72.0));

        // Born 1985-07-14, so 39 on the harness date
        let adults = stats.age_distribution.iter().find(|b| b.label == "36-50").unwrap();
        assert_eq!(adults.count, 1);
    }
}
