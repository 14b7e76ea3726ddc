//! Double-Booking Tests
//!
//! - Identical and overlapping intervals for one doctor conflict
//! - Back-to-back and other-doctor bookings do not
//! - Concurrent bookings of one slot admit exactly one
//! - Concurrent bookings on a multi-connection file database all land
//! - Lifecycle transitions

#[cfg(test)]
mod tests {
    use crate::harness::Harness;
    use carelink_shared::{Caller, HealthError};
    use chrono::{DateTime, TimeZone, Utc};
    use scheduling_integrity::{AppointmentStatus, BookAppointmentInput};
    use std::sync::Arc;

    struct Clinic {
        h: Harness,
        patient: Caller,
        other_patient: Caller,
        doctor: Caller,
        other_doctor: Caller,
    }

    async fn clinic() -> Clinic {
        let h = Harness::start(Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap())
            .await
            .unwrap();
        Clinic {
            patient: h.register_patient("p1@example.com").await.unwrap(),
            other_patient: h.register_patient("p2@example.com").await.unwrap(),
            doctor: h.verified_doctor("d1@example.com", "MD100001").await.unwrap(),
            other_doctor: h.verified_doctor("d2@example.com", "MD100002").await.unwrap(),
            h,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, hour, minute, 0).unwrap()
    }

    fn booking(doctor: &Caller, when: DateTime<Utc>, minutes: Option<i64>) -> BookAppointmentInput {
        BookAppointmentInput {
            doctor_id: doctor.user_id,
            appointment_date: when,
            duration_minutes: minutes,
            reason: "Consultation".to_string(),
        }
    }

    #[tokio::test]
    async fn test_identical_timestamp_conflicts() {
        let c = clinic().await;
        scheduling::book(&c.h.ctx, &c.patient, booking(&c.doctor, at(10, 0), None))
            .await
            .unwrap();

        let second = scheduling::book(&c.h.ctx, &c.other_patient, booking(&c.doctor, at(10, 0), None)).await;
        assert!(matches!(second, Err(HealthError::Conflict(_))));

        // Non-overlapping time with the same doctor
        scheduling::book(&c.h.ctx, &c.other_patient, booking(&c.doctor, at(11, 0), None))
            .await
            .unwrap();
        // Same time with another doctor
        scheduling::book(&c.h.ctx, &c.other_patient, booking(&c.other_doctor, at(10, 0), None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_overlapping_interval_conflicts() {
        let c = clinic().await;
        scheduling::book(&c.h.ctx, &c.patient, booking(&c.doctor, at(9, 0), Some(30)))
            .await
            .unwrap();

        let overlapping = scheduling::book(&c.h.ctx, &c.other_patient, booking(&c.doctor, at(9, 15), Some(30))).await;
        assert!(matches!(overlapping, Err(HealthError::Conflict(_))));

        // Starts exactly when the first one ends
        let adjacent = scheduling::book(&c.h.ctx, &c.other_patient, booking(&c.doctor, at(9, 30), Some(30))).await;
        assert!(adjacent.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_slot_can_be_rebooked() {
        let c = clinic().await;
        let first = scheduling::book(&c.h.ctx, &c.patient, booking(&c.doctor, at(14, 0), None))
            .await
            .unwrap();
        scheduling::cancel(&c.h.ctx, &c.patient, first.id, Some("Travelling".into()))
            .await
            .unwrap();

        let again = scheduling::book(&c.h.ctx, &c.other_patient, booking(&c.doctor, at(14, 0), None)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_bookings_admit_one() {
        let c = clinic().await;
        let (a, b) = tokio::join!(
            scheduling::book(&c.h.ctx, &c.patient, booking(&c.doctor, at(15, 0), None)),
            scheduling::book(&c.h.ctx, &c.other_patient, booking(&c.doctor, at(15, 0), None)),
        );
        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert!([a, b].into_iter().any(|r| matches!(r, Err(HealthError::Conflict(_)))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_bookings_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::on_disk(&dir.path().join("carelink.db"), Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap())
            .await
            .unwrap();

        let mut doctors = Vec::new();
        for i in 0..4 {
            let doctor = h
                .verified_doctor(&format!("doc{}@example.com", i), &format!("MD20000{}", i))
                .await
                .unwrap();
            doctors.push(doctor);
        }
        let mut patients = Vec::new();
        for i in 0..16 {
            patients.push(h.register_patient(&format!("pat{}@example.com", i)).await.unwrap());
        }
        let h = Arc::new(h);

        // Every patient takes a distinct hour; none of these conflict
        let mut tasks = Vec::new();
        for (i, patient) in patients.iter().copied().enumerate() {
            let h = Arc::clone(&h);
            let doctor = doctors[i % 4];
            let when = at(9 + (i / 4) as u32, 0);
            tasks.push(tokio::spawn(async move {
                scheduling::book(&h.ctx, &patient, booking(&doctor, when, None)).await
            }));
        }
        for task in tasks {
            let booked = task.await.unwrap();
            assert!(booked.is_ok(), "{:?}", booked);
        }

        // Everyone races for the same slot with one doctor
        let mut tasks = Vec::new();
        for patient in patients.iter().copied() {
            let h = Arc::clone(&h);
            let doctor = doctors[0];
            tasks.push(tokio::spawn(async move {
                scheduling::book(&h.ctx, &patient, booking(&doctor, at(16, 0), None)).await
            }));
        }
        let mut admitted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(HealthError::Conflict(_)) => {}
                Err(other) => panic!("unexpected booking failure: {:?}", other),
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let c = clinic().await;
        let appointment = scheduling::book(&c.h.ctx, &c.patient, booking(&c.doctor, at(10, 0), None))
            .await
            .unwrap();

        // Completing straight from scheduled is not allowed
        let early = scheduling::complete(&c.h.ctx, &c.doctor, appointment.id, None).await;
        assert!(matches!(early, Err(HealthError::Validation { .. })));

        // Cancel from scheduled
        let cancelled = scheduling::cancel(&c.h.ctx, &c.patient, appointment.id, None).await.unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

        // Cancel from confirmed
        let second = scheduling::book(&c.h.ctx, &c.patient, booking(&c.doctor, at(11, 0), None))
            .await
            .unwrap();
        scheduling::confirm(&c.h.ctx, &c.doctor, second.id).await.unwrap();
        let cancelled = scheduling::cancel(&c.h.ctx, &c.doctor, second.id, Some("Doctor unavailable".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

        // Terminal states stay terminal
        let reconfirm = scheduling::confirm(&c.h.ctx, &c.doctor, second.id).await;
        assert!(matches!(reconfirm, Err(HealthError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_only_parties_touch_an_appointment() {
        let c = clinic().await;
        let appointment = scheduling::book(&c.h.ctx, &c.patient, booking(&c.doctor, at(10, 0), None))
            .await
            .unwrap();

        let stranger = scheduling::cancel(&c.h.ctx, &c.other_patient, appointment.id, None).await;
        assert!(matches!(stranger, Err(HealthError::NotFound(_))));

        let other_doctor = scheduling::confirm(&c.h.ctx, &c.other_doctor, appointment.id).await;
        assert!(matches!(other_doctor, Err(HealthError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_past_time_is_rejected() {
        let c = clinic().await;
        let past = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        let result = scheduling::book(&c.h.ctx, &c.patient, booking(&c.doctor, past, None)).await;
        assert!(matches!(result, Err(HealthError::Validation { .. })));
    }
}
