//! Signed bearer tokens
//!
//! HS256 JWTs carrying the user id, role and token kind. Expiry is checked
//! against the injected clock rather than the library's wall clock.

use carelink_shared::{Caller, HealthError, Role, SharedClock};
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn caller(&self) -> Result<Caller, TokenError> {
        let user_id = self.sub.parse().map_err(|_| TokenError::Malformed)?;
        Ok(Caller::new(user_id, self.role))
    }
}

/// Token pair returned by login and refresh
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token")]
    Malformed,
    #[error("Token has expired")]
    Expired,
    #[error("Wrong token type")]
    WrongKind,
    #[error("Failed to sign token")]
    Signing,
}

impl From<TokenError> for HealthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing => HealthError::Internal(err.to_string()),
            other => HealthError::Authentication(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: SharedClock,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration, clock: SharedClock) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
            clock,
        }
    }

    pub fn issue(&self, user_id: i64, role: Role, kind: TokenKind) -> Result<String, TokenError> {
        let now = self.clock.now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "token signing failed");
            TokenError::Signing
        })
    }

    pub fn issue_pair(&self, user_id: i64, role: Role) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue(user_id, role, TokenKind::Access)?,
            refresh_token: self.issue(user_id, role, TokenKind::Refresh)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Decode and check a token of the expected kind
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                TokenError::Malformed
            })?
            .claims;

        if claims.kind != expected {
            return Err(TokenError::WrongKind);
        }
        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
