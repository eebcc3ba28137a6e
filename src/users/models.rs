// Data models for user accounts

use bson::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::common::generate_user_id;

pub const USERS_COLLECTION: &str = "users";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Enabled,
    Blocked,
}

/// Login channels an account has used at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthService {
    Local,
    Google,
    Twitter,
    Facebook,
}

impl AuthService {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthService::Local => "local",
            AuthService::Google => "google",
            AuthService::Twitter => "twitter",
            AuthService::Facebook => "facebook",
        }
    }

    /// Parses the `:service` path segment. `local` is not a social service.
    pub fn from_social_param(value: &str) -> Option<Self> {
        match value {
            "google" => Some(AuthService::Google),
            "twitter" => Some(AuthService::Twitter),
            "facebook" => Some(AuthService::Facebook),
            _ => None,
        }
    }
}

/// Set when the account holds provisional data the user must replace on
/// their next visit, e.g. a placeholder email from a social signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceUpdate {
    #[default]
    None,
    Email,
    Password,
}

/// Identity material from the most recent social login. A relogin through a
/// different service overwrites the slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthServiceProfile {
    pub id: String,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub service: AuthService,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    /// Stored normalized; see `normalize_email`.
    pub email: String,
    /// Bcrypt hash. Absent on social-only accounts.
    pub password: Option<String>,
    pub profile: Option<AuthServiceProfile>,
    #[serde(default)]
    pub auth_services: Vec<AuthService>,
    /// Pending verification or password-reset code. Single-use; cleared on
    /// consumption.
    pub token: Option<String>,
    #[serde(default)]
    pub requested_email_verification: bool,
    #[serde(default)]
    pub email_verified: bool,
    pub last_logged_in_at: DateTime,
    pub status: UserStatus,
    pub role: UserRole,
    #[serde(default)]
    pub force_update: ForceUpdate,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    pub fn new(email: String, password_hash: Option<String>) -> Self {
        let now = DateTime::now();
        Self {
            id: generate_user_id(),
            email,
            password: password_hash,
            profile: None,
            auth_services: Vec::new(),
            token: None,
            requested_email_verification: false,
            email_verified: false,
            last_logged_in_at: now,
            status: UserStatus::Pending,
            role: UserRole::Member,
            force_update: ForceUpdate::None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Projection safe to show to anyone: no email, no credential material,
    /// no verification state.
    pub fn sanitized(&self) -> Value {
        json!({
            "_id": self.id,
            "status": self.status,
            "role": self.role,
            "created_at": rfc3339(&self.created_at),
            "updated_at": rfc3339(&self.updated_at),
        })
    }

    /// Projection for the account holder themselves. Still excludes the
    /// password hash, pending codes, and the social profile tokens.
    pub fn own_view(&self) -> Value {
        json!({
            "_id": self.id,
            "email": self.email,
            "status": self.status,
            "role": self.role,
            "auth_services": self.auth_services,
            "email_verified": self.email_verified,
            "force_update": self.force_update,
            "last_logged_in_at": rfc3339(&self.last_logged_in_at),
            "created_at": rfc3339(&self.created_at),
            "updated_at": rfc3339(&self.updated_at),
        })
    }
}

fn rfc3339(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}

// Request payloads

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LocalLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SocialLoginRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub email: String,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerificationQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub resend: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmVerificationRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub q: Option<String>,
}
