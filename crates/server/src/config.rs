//! Process configuration
//!
//! Every option can be given as a flag or through a `CARELINK_*`
//! environment variable.

use std::net::SocketAddr;

use chrono::Duration;
use clap::Parser;
use identity::{AuthConfig, RateLimitConfig};

pub const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT secret must be at least {} characters", MIN_JWT_SECRET_LENGTH)]
    WeakSecret,
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("bootstrap admin needs both an email and a password")]
    IncompleteAdmin,
}

#[derive(Clone, Debug, Parser)]
#[command(name = "carelink", version, about = "CareLink healthcare appointment and records API")]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "CARELINK_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    #[arg(long, env = "CARELINK_DATABASE_URL", default_value = "sqlite://carelink.db?mode=rwc")]
    pub database_url: String,

    #[arg(long, env = "CARELINK_DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,

    /// HS256 signing secret for access and refresh tokens
    #[arg(long, env = "CARELINK_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "CARELINK_ACCESS_TTL_MINUTES", default_value_t = 24 * 60)]
    pub access_ttl_minutes: i64,

    #[arg(long, env = "CARELINK_REFRESH_TTL_DAYS", default_value_t = 7)]
    pub refresh_ttl_days: i64,

    /// PBKDF2 rounds for new password hashes
    #[arg(long, env = "CARELINK_HASH_ITERATIONS", default_value_t = identity::password::DEFAULT_ITERATIONS)]
    pub hash_iterations: u32,

    /// Failed logins allowed per client within the window
    #[arg(long, env = "CARELINK_LOGIN_MAX_ATTEMPTS", default_value_t = 5)]
    pub login_max_attempts: usize,

    #[arg(long, env = "CARELINK_LOGIN_WINDOW_MINUTES", default_value_t = 15)]
    pub login_window_minutes: i64,

    /// Default tracing filter; `RUST_LOG` takes precedence
    #[arg(long, env = "CARELINK_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Creates the first administrator on startup when set with a password
    #[arg(long, env = "CARELINK_ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long, env = "CARELINK_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    #[arg(long, env = "CARELINK_ADMIN_FIRST_NAME", default_value = "System")]
    pub admin_first_name: String,

    #[arg(long, env = "CARELINK_ADMIN_LAST_NAME", default_value = "Administrator")]
    pub admin_last_name: String,
}

/// Credentials for the initial administrator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::WeakSecret);
        }
        for (value, name) in [
            (self.access_ttl_minutes, "access token TTL"),
            (self.refresh_ttl_days, "refresh token TTL"),
            (self.login_window_minutes, "login window"),
        ] {
            if value <= 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if self.login_max_attempts == 0 {
            return Err(ConfigError::NotPositive("login attempt limit"));
        }
        if self.hash_iterations == 0 {
            return Err(ConfigError::NotPositive("hash iterations"));
        }
        if self.admin_email.is_some() != self.admin_password.is_some() {
            return Err(ConfigError::IncompleteAdmin);
        }
        Ok(())
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            jwt_secret: self.jwt_secret.clone(),
            access_ttl: Duration::minutes(self.access_ttl_minutes),
            refresh_ttl: Duration::days(self.refresh_ttl_days),
            hash_iterations: self.hash_iterations,
            rate_limit: RateLimitConfig {
                max_attempts: self.login_max_attempts,
                window: Duration::minutes(self.login_window_minutes),
            },
        }
    }

    pub fn bootstrap_admin(&self) -> Option<BootstrapAdmin> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some(BootstrapAdmin {
                email: email.clone(),
                password: password.clone(),
                first_name: self.admin_first_name.clone(),
                last_name: self.admin_last_name.clone(),
            }),
            _ => None,
        }
    }
}
