//! Password hashing
//!
//! PBKDF2-HMAC-SHA256 with a random per-password salt. Hashes are stored as
//! `pbkdf2-sha256$<iterations>$<salt-hex>$<hash-hex>` so the iteration count
//! can be raised without invalidating existing accounts.

use carelink_shared::{HealthError, HealthResult};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const DEFAULT_ITERATIONS: u32 = 210_000;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

#[derive(Clone, Copy, Debug)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn hash(&self, password: &str) -> HealthResult<String> {
        let mut salt = [0u8; SALT_LEN];
        getrandom::fill(&mut salt)
            .map_err(|e| HealthError::Internal(format!("Failed to generate salt: {}", e)))?;

        let digest = derive(password, &salt, self.iterations);
        Ok(format!(
            "{}${}${}${}",
            SCHEME,
            self.iterations,
            hex::encode(salt),
            hex::encode(digest)
        ))
    }

    /// Check a password against a stored hash in constant time
    ///
    /// Malformed stored hashes never verify.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((iterations, salt, expected)) = parse(stored) else {
            tracing::warn!("stored password hash is malformed");
            return false;
        };
        let actual = derive(password, &salt, iterations);
        actual.ct_eq(expected.as_slice()).into()
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    pbkdf2::pbkdf2_hmac_array::<Sha256, HASH_LEN>(password.as_bytes(), salt, iterations)
}

fn parse(stored: &str) -> Option<(u32, Vec<u8>, Vec<u8>)> {
    let mut parts = stored.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let iterations: u32 = parts.next()?.parse().ok().filter(|i| *i > 0)?;
    let salt = hex::decode(parts.next()?).ok()?;
    let hash = hex::decode(parts.next()?).ok()?;
    if parts.next().is_some() || hash.len() != HASH_LEN {
        return None;
    }
    Some((iterations, salt, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new(1_000);
        let stored = hasher.hash("Sunrise#2024x").unwrap();

        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(hasher.verify("Sunrise#2024x", &stored));
        assert!(!hasher.verify("Sunrise#2024y", &stored));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = PasswordHasher::new(1_000);
        let a = hasher.hash("Sunrise#2024x").unwrap();
        let b = hasher.hash("Sunrise#2024x").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_uses_stored_iterations() {
        let stored = PasswordHasher::new(500).hash("Sunrise#2024x").unwrap();
        assert!(PasswordHasher::new(2_000).verify("Sunrise#2024x", &stored));
    }

    #[test]
    fn test_malformed_hashes_never_verify() {
        let hasher = PasswordHasher::new(1_000);
        assert!(!hasher.verify("x", ""));
        assert!(!hasher.verify("x", "bcrypt$10$abc$def"));
        assert!(!hasher.verify("x", "pbkdf2-sha256$0$00$00"));
        assert!(!hasher.verify("x", "pbkdf2-sha256$10$zz$00"));
    }
}
