use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserRole;

/// Claims embedded in the JWT access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,    // user UUID
    pub school: String, // school slug
    pub role: UserRole,
    pub exp: usize,
    pub iat: usize,
}

/// Extracted from the validated JWT, available via Axum extractors
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub school: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    /// Super admins act in any school; everyone else only in their own.
    pub fn may_act_in(&self, school: &str) -> bool {
        self.role == UserRole::SuperAdmin || self.school == school
    }
}

/// Proof that the holder administers one school. Resolution operations
/// take this instead of consulting any ambient list of administrators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCapability {
    admin_id: Uuid,
    school: String,
}

impl AdminCapability {
    pub fn new(admin_id: Uuid, school: impl Into<String>) -> Self {
        Self {
            admin_id,
            school: school.into(),
        }
    }

    /// Grants the capability for `school` to an admin of that school or a super admin.
    pub fn for_school(user: &AuthenticatedUser, school: &str) -> Option<Self> {
        match user.role {
            UserRole::SuperAdmin => Some(Self::new(user.user_id, school)),
            UserRole::Admin if user.school == school => Some(Self::new(user.user_id, school)),
            _ => None,
        }
    }

    pub fn admin_id(&self) -> Uuid {
        self.admin_id
    }

    pub fn school(&self) -> &str {
        &self.school
    }

    pub fn covers(&self, school: &str) -> bool {
        self.school == school
    }
}
