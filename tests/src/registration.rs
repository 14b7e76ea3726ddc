//! Registration and Verification Tests
//!
//! - Email uniqueness across every role
//! - Doctor and government logins gated on verification
//! - Who may verify whom

#[cfg(test)]
mod tests {
    use crate::harness::{Harness, PASSWORD};
    use carelink_shared::{Caller, HealthError, Role};
    use chrono::{TimeZone, Utc};
    use identity_integrity::VerificationDecision;

    async fn harness() -> Harness {
        Harness::start(Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts_regardless_of_role() {
        let h = harness().await;
        h.register_patient("same@example.com").await.unwrap();

        let as_patient = h.register_patient("same@example.com").await;
        assert!(matches!(as_patient, Err(HealthError::Conflict(_))));

        // Case differences do not make a new address
        let as_doctor = h.register_doctor("SAME@example.com", "MD100001").await;
        assert!(matches!(as_doctor, Err(HealthError::Conflict(_))));

        let as_official = h.register_official("same@example.com", "GOV-001").await;
        assert!(matches!(as_official, Err(HealthError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_duplicate_license_conflicts() {
        let h = harness().await;
        h.register_doctor("a@example.com", "MD100001").await.unwrap();
        let second = h.register_doctor("b@example.com", "md100001").await;
        assert!(matches!(second, Err(HealthError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_pending_doctor_cannot_log_in_until_verified() {
        let h = harness().await;
        let doctor_id = h.register_doctor("doc@example.com", "MD100001").await.unwrap();

        let pending = h.login("doc@example.com", Role::Doctor, "10.0.0.1").await;
        assert!(matches!(pending, Err(HealthError::BusinessRule(_))));

        h.auth
            .verify_doctor(&h.admin(), doctor_id, VerificationDecision::Approve, Some("License checked".into()))
            .await
            .unwrap();
        let session = h.login("doc@example.com", Role::Doctor, "10.0.0.1").await.unwrap();
        assert_eq!(session.user.id, doctor_id);
    }

    #[tokio::test]
    async fn test_rejected_doctor_stays_locked_out() {
        let h = harness().await;
        let official = h.verified_official("gov@example.com", "GOV-001").await.unwrap();
        let doctor_id = h.register_doctor("doc@example.com", "MD100001").await.unwrap();

        // Government accounts review doctors
        h.auth
            .verify_doctor(&official, doctor_id, VerificationDecision::Reject, Some("License expired".into()))
            .await
            .unwrap();
        let result = h.login("doc@example.com", Role::Doctor, "10.0.0.1").await;
        assert!(matches!(result, Err(HealthError::BusinessRule(_))));
    }

    #[tokio::test]
    async fn test_government_verification_is_admin_only() {
        let h = harness().await;
        let official = h.verified_official("gov@example.com", "GOV-001").await.unwrap();
        let pending = h.register_official("new-gov@example.com", "GOV-002").await.unwrap();

        let by_official = h
            .auth
            .verify_government_official(&official, pending, VerificationDecision::Approve, None)
            .await;
        assert!(matches!(by_official, Err(HealthError::Authorization(_))));

        let blocked = h.login("new-gov@example.com", Role::Government, "10.0.0.1").await;
        assert!(matches!(blocked, Err(HealthError::BusinessRule(_))));

        h.auth
            .verify_government_official(&h.admin(), pending, VerificationDecision::Approve, None)
            .await
            .unwrap();
        assert!(h.login("new-gov@example.com", Role::Government, "10.0.0.1").await.is_ok());
    }

    #[tokio::test]
    async fn test_patients_log_in_immediately() {
        let h = harness().await;
        let patient = h.register_patient("pat@example.com").await.unwrap();
        let session = h.login("pat@example.com", Role::Patient, "10.0.0.1").await.unwrap();

        let caller = h.auth.authenticate(&session.tokens.access_token).await.unwrap();
        assert_eq!(caller, Caller::new(patient.user_id, Role::Patient));

        // Right password, wrong role
        let wrong_role = h
            .login_with("pat@example.com", PASSWORD, Role::Doctor, "10.0.0.1")
            .await;
        assert!(matches!(wrong_role, Err(HealthError::Authentication(_))));
    }
}
