//! Login Rate Limiting Tests
//!
//! Five failed logins from one source within fifteen minutes block the
//! sixth attempt, even with correct credentials. The limit also holds when
//! the guesses arrive at the same time.

#[cfg(test)]
mod tests {
    use crate::harness::Harness;
    use carelink_shared::{HealthError, Role};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    const SOURCE: &str = "203.0.113.50";

    async fn harness_with_patient() -> Harness {
        let h = Harness::start(Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap())
            .await
            .unwrap();
        h.register_patient("pat@example.com").await.unwrap();
        h
    }

    async fn fail(h: &Harness, source: &str) -> HealthError {
        h.login_with("pat@example.com", "Wrong#Guess99", Role::Patient, source)
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_sixth_attempt_is_blocked() {
        let h = harness_with_patient().await;
        for _ in 0..5 {
            assert!(matches!(fail(&h, SOURCE).await, HealthError::Authentication(_)));
            h.clock.advance(Duration::minutes(1));
        }

        let blocked = h.login("pat@example.com", Role::Patient, SOURCE).await;
        assert!(matches!(blocked, Err(HealthError::RateLimited(_))));

        // Other clients are unaffected
        assert!(h.login("pat@example.com", Role::Patient, "203.0.113.51").await.is_ok());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let h = harness_with_patient().await;
        for _ in 0..5 {
            fail(&h, SOURCE).await;
        }
        assert!(matches!(fail(&h, SOURCE).await, HealthError::RateLimited(_)));

        h.clock.advance(Duration::minutes(15) + Duration::seconds(1));
        assert!(h.login("pat@example.com", Role::Patient, SOURCE).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_accounts_count_too() {
        let h = harness_with_patient().await;
        for _ in 0..5 {
            let err = h
                .login_with("ghost@example.com", "Wrong#Guess99", Role::Patient, SOURCE)
                .await
                .unwrap_err();
            assert!(matches!(err, HealthError::Authentication(_)));
        }
        assert!(matches!(fail(&h, SOURCE).await, HealthError::RateLimited(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_guesses_cannot_exceed_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::on_disk(&dir.path().join("carelink.db"), Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap())
            .await
            .unwrap();
        h.register_patient("pat@example.com").await.unwrap();
        let h = Arc::new(h);

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let h = Arc::clone(&h);
                tokio::spawn(async move {
                    h.login_with("pat@example.com", "Wrong#Guess99", Role::Patient, "1.2.3.4").await
                })
            })
            .collect();

        let (mut rejected, mut limited) = (0, 0);
        for task in tasks {
            match task.await.unwrap() {
                Err(HealthError::Authentication(_)) => rejected += 1,
                Err(HealthError::RateLimited(_)) => limited += 1,
                other => panic!("unexpected login outcome: {:?}", other.map(|s| s.user.id)),
            }
        }
        assert_eq!(rejected, 5);
        assert_eq!(limited, 7);

        // The correct password is still blocked for this source
        let blocked = h.login("pat@example.com", Role::Patient, "1.2.3.4").await;
        assert!(matches!(blocked, Err(HealthError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_successful_logins_do_not_fill_the_window() {
        let h = harness_with_patient().await;
        for _ in 0..8 {
            assert!(h.login("pat@example.com", Role::Patient, SOURCE).await.is_ok());
        }
        for _ in 0..5 {
            assert!(matches!(fail(&h, SOURCE).await, HealthError::Authentication(_)));
        }
        assert!(matches!(fail(&h, SOURCE).await, HealthError::RateLimited(_)));
    }
}
