//! Access Control Tests
//!
//! - Admin holds every permission
//! - Expired and tampered tokens are rejected
//! - Deactivated accounts lose access immediately
//! - Period-change arithmetic used by surveillance

#[cfg(test)]
mod tests {
    use crate::harness::Harness;
    use carelink_shared::{has_permission, permissions_of, HealthError, Permission, Role};
    use chrono::{Duration, TimeZone, Utc};
    use reporting::percentage_change;

    async fn harness() -> Harness {
        Harness::start(Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_admin_holds_every_permission() {
        for permission in Permission::ALL {
            assert!(has_permission(Role::Admin, permission), "{:?}", permission);
        }
        assert_eq!(permissions_of(Role::Admin).len(), Permission::ALL.len());
        assert!(!has_permission(Role::Government, Permission::ViewPatientRecords));
        assert!(!has_permission(Role::Doctor, Permission::ViewAnalytics));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let h = harness().await;
        h.register_patient("pat@example.com").await.unwrap();
        let session = h.login("pat@example.com", Role::Patient, "10.0.0.1").await.unwrap();
        assert!(h.auth.authenticate(&session.tokens.access_token).await.is_ok());

        h.clock.advance(Duration::hours(24) + Duration::seconds(1));
        let expired = h.auth.authenticate(&session.tokens.access_token).await;
        assert!(matches!(expired, Err(HealthError::Authentication(_))));

        // The refresh token outlives the access token
        let renewed = h.auth.refresh(&session.tokens.refresh_token).await.unwrap();
        assert!(h.auth.authenticate(&renewed.tokens.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_tampered_token_is_rejected() {
        let h = harness().await;
        h.register_patient("pat@example.com").await.unwrap();
        let session = h.login("pat@example.com", Role::Patient, "10.0.0.1").await.unwrap();

        let mut token = session.tokens.access_token.clone();
        let last = token.pop().unwrap();
        token.push(if last == 'A' { 'B' } else { 'A' });
        let tampered = h.auth.authenticate(&token).await;
        assert!(matches!(tampered, Err(HealthError::Authentication(_))));

        // A refresh token is not an access token
        let wrong_kind = h.auth.authenticate(&session.tokens.refresh_token).await;
        assert!(matches!(wrong_kind, Err(HealthError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_deactivation_revokes_access() {
        let h = harness().await;
        let patient = h.register_patient("pat@example.com").await.unwrap();
        let session = h.login("pat@example.com", Role::Patient, "10.0.0.1").await.unwrap();

        h.auth.set_active(&h.admin(), patient.user_id, false).await.unwrap();
        let result = h.auth.authenticate(&session.tokens.access_token).await;
        assert!(matches!(result, Err(HealthError::Authentication(_))));

        let login = h.login("pat@example.com", Role::Patient, "10.0.0.1").await;
        assert!(matches!(login, Err(HealthError::Authentication(_))));
    }

    #[test]
    fn test_percentage_change_edges() {
        assert_eq!(percentage_change(0, 0), 0.0);
        assert_eq!(percentage_change(7, 0), 100.0);
        assert_eq!(percentage_change(0, 4), -100.0);
        assert_eq!(percentage_change(3, 2), 50.0);
    }
}
