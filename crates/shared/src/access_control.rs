//! Access control module - enforces role-based authorization
//!
//! The role-permission matrix is a static table. Admins implicitly hold
//! every permission; the other roles hold exactly the set listed here.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{HealthError, HealthResult};

/// The four user classes of the system
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Government,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Patient, Role::Doctor, Role::Government, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Government => "government",
            Role::Admin => "admin",
        }
    }

    /// Permission needed to read one's own profile; government and admin
    /// accounts read theirs unconditionally
    pub fn view_profile_permission(&self) -> Option<Permission> {
        match self {
            Role::Patient => Some(Permission::ViewOwnProfile),
            Role::Doctor => Some(Permission::ViewDoctorProfile),
            Role::Government | Role::Admin => None,
        }
    }

    /// Permission needed to edit one's own profile
    pub fn edit_profile_permission(&self) -> Permission {
        match self {
            Role::Doctor => Permission::EditDoctorProfile,
            Role::Patient | Role::Government | Role::Admin => Permission::EditOwnProfile,
        }
    }

    /// Doctor and government accounts must be approved before they can log in
    pub fn requires_verification(&self) -> bool {
        match self {
            Role::Doctor | Role::Government => true,
            Role::Patient | Role::Admin => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "government" => Ok(Role::Government),
            "admin" => Ok(Role::Admin),
            other => Err(HealthError::validation(format!("Unknown role: {}", other))),
        }
    }
}

/// Permission types for system operations
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    // Patient
    ViewOwnProfile,
    EditOwnProfile,
    BookAppointment,
    ViewOwnAppointments,
    CancelOwnAppointment,
    ViewOwnMedicalRecords,
    AddHealthMetrics,
    ViewDoctors,

    // Doctor
    ViewDoctorProfile,
    EditDoctorProfile,
    ViewDoctorAppointments,
    ConfirmAppointment,
    CompleteAppointment,
    ViewPatientRecords,
    CreateMedicalRecord,
    ViewDoctorPatients,
    ViewDoctorStats,

    // Government
    VerifyDoctors,
    ViewAllDoctors,
    ViewAnalytics,
    GenerateReports,
    ViewHealthAlerts,
    ViewAuditLogs,
    ViewSystemStats,

    // Admin only
    ManageUsers,
}

impl Permission {
    pub const ALL: [Permission; 25] = [
        Permission::ViewOwnProfile,
        Permission::EditOwnProfile,
        Permission::BookAppointment,
        Permission::ViewOwnAppointments,
        Permission::CancelOwnAppointment,
        Permission::ViewOwnMedicalRecords,
        Permission::AddHealthMetrics,
        Permission::ViewDoctors,
        Permission::ViewDoctorProfile,
        Permission::EditDoctorProfile,
        Permission::ViewDoctorAppointments,
        Permission::ConfirmAppointment,
        Permission::CompleteAppointment,
        Permission::ViewPatientRecords,
        Permission::CreateMedicalRecord,
        Permission::ViewDoctorPatients,
        Permission::ViewDoctorStats,
        Permission::VerifyDoctors,
        Permission::ViewAllDoctors,
        Permission::ViewAnalytics,
        Permission::GenerateReports,
        Permission::ViewHealthAlerts,
        Permission::ViewAuditLogs,
        Permission::ViewSystemStats,
        Permission::ManageUsers,
    ];
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const PATIENT_PERMISSIONS: &[Permission] = &[
    Permission::ViewOwnProfile,
    Permission::EditOwnProfile,
    Permission::BookAppointment,
    Permission::ViewOwnAppointments,
    Permission::CancelOwnAppointment,
    Permission::ViewOwnMedicalRecords,
    Permission::AddHealthMetrics,
    Permission::ViewDoctors,
];

const DOCTOR_PERMISSIONS: &[Permission] = &[
    Permission::ViewDoctorProfile,
    Permission::EditDoctorProfile,
    Permission::ViewDoctorAppointments,
    Permission::ConfirmAppointment,
    Permission::CompleteAppointment,
    Permission::ViewPatientRecords,
    Permission::CreateMedicalRecord,
    Permission::ViewDoctorPatients,
    Permission::ViewDoctorStats,
];

const GOVERNMENT_PERMISSIONS: &[Permission] = &[
    Permission::VerifyDoctors,
    Permission::ViewAllDoctors,
    Permission::ViewAnalytics,
    Permission::GenerateReports,
    Permission::ViewHealthAlerts,
    Permission::ViewAuditLogs,
    Permission::ViewSystemStats,
];

/// Check whether a role holds a permission
pub fn has_permission(role: Role, permission: Permission) -> bool {
    match role {
        Role::Patient => PATIENT_PERMISSIONS.contains(&permission),
        Role::Doctor => DOCTOR_PERMISSIONS.contains(&permission),
        Role::Government => GOVERNMENT_PERMISSIONS.contains(&permission),
        Role::Admin => true,
    }
}

/// Full permission set of a role
pub fn permissions_of(role: Role) -> BTreeSet<Permission> {
    match role {
        Role::Patient => PATIENT_PERMISSIONS.iter().copied().collect(),
        Role::Doctor => DOCTOR_PERMISSIONS.iter().copied().collect(),
        Role::Government => GOVERNMENT_PERMISSIONS.iter().copied().collect(),
        Role::Admin => Permission::ALL.iter().copied().collect(),
    }
}

/// The authenticated principal an operation runs as
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Require a permission, failing with an authorization error
    pub fn require(&self, permission: Permission) -> HealthResult<()> {
        if has_permission(self.role, permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = self.user_id,
                role = %self.role,
                permission = %permission,
                "permission denied"
            );
            Err(HealthError::Authorization(format!(
                "Role '{}' lacks permission {}",
                self.role, permission
            )))
        }
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}
