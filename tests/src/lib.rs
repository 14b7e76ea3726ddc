//! CareLink Test Suite
//!
//! Cross-service scenarios run against an in-memory database:
//! - Registration and verification gating
//! - Double-booking prevention and the appointment lifecycle
//! - Login rate limiting
//! - The full visit flow from booking to medical record
//! - Role enforcement, token expiry and aggregate-only government access

pub mod harness;

pub mod access_control;
pub mod clinical_flow;
pub mod rate_limiting;
pub mod registration;
pub mod scheduling_conflicts;
