//! CareLink Shared Utilities
//!
//! This crate provides common functionality for all CareLink services:
//! - Role-based access control (the static role-permission matrix)
//! - Audit logging
//! - Common types, errors and pagination
//! - Injectable clock
//! - Database handle and embedded schema
//! - User notifications

pub mod access_control;
pub mod audit;
pub mod clock;
pub mod db;
pub mod notifications;
pub mod types;

// Re-export commonly used items
pub use access_control::*;
pub use audit::{AuditEvent, AuditLogEntry};
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use db::Database;
pub use types::*;

/// Everything a coordinator operation needs to touch the outside world
#[derive(Clone)]
pub struct ServiceContext {
    pub db: Database,
    pub clock: SharedClock,
}

impl ServiceContext {
    pub fn new(db: Database, clock: SharedClock) -> Self {
        Self { db, clock }
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("db", &self.db)
            .field("now", &self.clock.now())
            .finish()
    }
}
