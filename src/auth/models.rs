// Data models for authentication and access control

use serde::{Deserialize, Serialize};

use crate::users::UserRole;

/// JWT payload: the subject is the user id, the role is baked in at issue
/// time so the gate can authorize without a store round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: UserRole,
    pub exp: usize,
}

/// The minimum role a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRole {
    /// Admin callers only.
    Admin,
    /// Anonymous callers allowed; a presented token is still verified.
    Guest,
    /// Any authenticated caller.
    All,
}

impl ResourceRole {
    /// Whether an authenticated caller with `role` satisfies this
    /// requirement. Admin callers bypass the gate before this is consulted.
    pub fn allows(&self, role: UserRole) -> bool {
        match self {
            ResourceRole::Admin => role == UserRole::Admin,
            ResourceRole::Guest | ResourceRole::All => true,
        }
    }
}

/// Who may perform a write on the targeted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOwner {
    /// Only the owner of the targeted document (admins excepted).
    Owner,
    /// Anyone who passed the role check.
    Everyone,
}

/// Access requirements for a single route.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    pub role: ResourceRole,
    pub owner: ResourceOwner,
}

/// The verified caller, inserted into request extensions by the gate and
/// read back by handlers through the [`AuthedUser`] extractor.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
    pub role: UserRole,
}
