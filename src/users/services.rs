// User lifecycle service - registration, login, password flows, verification

use bcrypt::{hash, verify};
use bson::{doc, Bson, DateTime, Document};
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{
    AuthService, AuthServiceProfile, ForceUpdate, User, UserStatus, USERS_COLLECTION,
};
use crate::auth::TokenService;
use crate::common::{generate_verification_code, normalize_email, safe_email_log, ApiError};
use crate::services::email::{confirm_account_email, forgot_password_email};
use crate::services::{EmailSender, SocialProfile, SocialProviders};
use crate::store::CredentialStore;

const BCRYPT_COST: u32 = 10;

/// Fields a client can never write through the generic update path.
const SKIP_UPDATE_FIELDS: &[&str] = &["_id", "created_at", "updated_at"];

pub const PAGE_SIZE: i64 = 10;

pub struct UserService {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
    mailer: Arc<dyn EmailSender>,
    providers: Arc<SocialProviders>,
    frontend_url: String,
}

fn to_user(doc: Document) -> Result<User, ApiError> {
    bson::from_document(doc)
        .map_err(|e| ApiError::Technical(format!("Failed to decode user document: {}", e)))
}

fn to_document(user: &User) -> Result<Document, ApiError> {
    bson::to_document(user)
        .map_err(|e| ApiError::Technical(format!("Failed to encode user document: {}", e)))
}

fn to_bson<T: serde::Serialize>(value: &T) -> Result<Bson, ApiError> {
    bson::to_bson(value).map_err(|e| ApiError::Technical(format!("Failed to encode value: {}", e)))
}

fn hash_password(plain: &str) -> Result<String, ApiError> {
    hash(plain, BCRYPT_COST)
        .map_err(|e| ApiError::Technical(format!("Failed to hash password: {}", e)))
}

impl UserService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: Arc<TokenService>,
        mailer: Arc<dyn EmailSender>,
        providers: Arc<SocialProviders>,
        frontend_url: String,
    ) -> Self {
        Self {
            store,
            tokens,
            mailer,
            providers,
            frontend_url,
        }
    }

    /// Looks an account up by email, matching both the raw (lowercased)
    /// address and its normalized form so aliases of an existing account
    /// cannot register twice.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let raw = email.trim().to_lowercase();
        let normalized = normalize_email(email);
        let filter = doc! { "$or": [ { "email": &raw }, { "email": &normalized } ] };
        match self.store.find_one(USERS_COLLECTION, filter).await? {
            Some(doc) => Ok(Some(to_user(doc)?)),
            None => Ok(None),
        }
    }

    /// Registers an account through `service` and returns it with a fresh
    /// access token. Locally created accounts start pending and get a
    /// verification email in the background; socially created ones are born
    /// verified because the provider vouched for the address.
    pub async fn create_user(
        &self,
        email: &str,
        password: Option<&str>,
        service: AuthService,
    ) -> Result<(User, String), ApiError> {
        if self.find_by_email(email).await?.is_some() {
            return Err(ApiError::AlreadyExists("user".to_string()));
        }

        let social = service != AuthService::Local;
        let password_hash = password.map(hash_password).transpose()?;
        let mut user = User::new(normalize_email(email), password_hash);
        user.auth_services.push(service);
        if social {
            user.email_verified = true;
            user.requested_email_verification = true;
            user.status = UserStatus::Enabled;
        }

        self.store
            .insert_one(USERS_COLLECTION, to_document(&user)?)
            .await
            .map_err(|e| {
                warn!(error = %e, "User: insert failed");
                ApiError::NotCreated("user".to_string())
            })?;
        info!(user_id = %user.id, email = %safe_email_log(&user.email), "User: created");

        let token = self.tokens.issue(&user.id, user.role)?;

        if !social {
            // Delivery must not block or fail registration.
            let store = Arc::clone(&self.store);
            let mailer = Arc::clone(&self.mailer);
            let frontend_url = self.frontend_url.clone();
            let user_id = user.id.clone();
            let to = user.email.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    Self::issue_verification_email(store, mailer, &frontend_url, &user_id, &to)
                        .await
                {
                    warn!(user_id = %user_id, error = %e, "User: verification email failed");
                }
            });
        }

        Ok((user, token))
    }

    /// Generates a fresh verification code, persists it, and emails it.
    /// Returns the code.
    async fn issue_verification_email(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailSender>,
        frontend_url: &str,
        user_id: &str,
        to: &str,
    ) -> Result<String, ApiError> {
        let code = generate_verification_code();
        let modified = store
            .update_one(
                USERS_COLLECTION,
                doc! { "_id": user_id },
                doc! { "$set": {
                    "token": &code,
                    "requested_email_verification": true,
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;
        if modified == 0 {
            return Err(ApiError::FailedUpdate);
        }

        let (subject, body) = confirm_account_email(frontend_url, &code);
        mailer
            .send(to, &subject, &body)
            .await
            .map_err(|e| ApiError::Technical(format!("Verification email failed: {}", e)))?;
        Ok(code)
    }

    pub async fn login_local(&self, email: &str, password: &str) -> Result<(User, String), ApiError> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;

        // Social-only accounts have no local credential to check against.
        let hashed = user.password.as_deref().ok_or(ApiError::AuthFailed)?;
        let ok = verify(password, hashed)
            .map_err(|e| ApiError::Technical(format!("Failed to verify password: {}", e)))?;
        if !ok {
            return Err(ApiError::AuthFailed);
        }

        self.finish_login(user, AuthService::Local, None).await
    }

    pub async fn login_social(
        &self,
        service: AuthService,
        token: &str,
    ) -> Result<(User, String), ApiError> {
        let provider = self
            .providers
            .get(service)
            .ok_or_else(|| ApiError::NotFound("that auth service".to_string()))?;
        let profile = provider.get_user_profile(token).await.map_err(|e| {
            warn!(service = service.as_str(), error = %e, "User: social profile rejected");
            ApiError::AuthFailed
        })?;

        // Providers that disclose no email get a placeholder address the
        // user is forced to replace.
        let (email, placeholder) = match &profile.email {
            Some(email) => (normalize_email(email), false),
            None => (
                format!("{}@{}.com", profile.id.to_lowercase(), service.as_str()),
                true,
            ),
        };

        let user = match self.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                let (mut created, _) = self.create_user(&email, None, service).await?;
                if placeholder {
                    created.force_update = ForceUpdate::Email;
                }
                created
            }
        };

        self.finish_login(user, service, Some(profile)).await
    }

    /// Shared login tail: blocked check, auth-service union, login stamp,
    /// social profile persistence, fresh access token.
    async fn finish_login(
        &self,
        mut user: User,
        service: AuthService,
        profile: Option<SocialProfile>,
    ) -> Result<(User, String), ApiError> {
        if user.status == UserStatus::Blocked {
            return Err(ApiError::UserBlocked);
        }

        if !user.auth_services.contains(&service) {
            user.auth_services.push(service);
        }
        user.last_logged_in_at = DateTime::now();

        if let Some(profile) = profile {
            // The provider vouched for the address on file.
            user.email_verified = true;
            user.requested_email_verification = true;
            user.status = UserStatus::Enabled;
            if profile.access_token.is_some() || user.profile.is_none() {
                user.profile = Some(AuthServiceProfile {
                    id: profile.id,
                    token: profile.access_token,
                    refresh_token: profile.refresh_token,
                    service,
                });
            }
        }
        user.updated_at = DateTime::now();

        let mut set = doc! {
            "auth_services": to_bson(&user.auth_services)?,
            "last_logged_in_at": user.last_logged_in_at,
            "email_verified": user.email_verified,
            "requested_email_verification": user.requested_email_verification,
            "status": to_bson(&user.status)?,
            "force_update": to_bson(&user.force_update)?,
            "updated_at": user.updated_at,
        };
        if let Some(profile) = &user.profile {
            set.insert("profile", to_bson(profile)?);
        }
        self.store
            .update_one(USERS_COLLECTION, doc! { "_id": &user.id }, doc! { "$set": set })
            .await?;

        info!(user_id = %user.id, service = service.as_str(), "User: logged in");
        let token = self.tokens.issue(&user.id, user.role)?;
        Ok((user, token))
    }

    /// Persists a fresh reset code and emails it. A failed delivery is a
    /// hard error so the caller never waits on an email that was never
    /// sent.
    pub async fn forgot_password(&self, email: &str) -> Result<(String, String), ApiError> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;

        let code = generate_verification_code();
        let modified = self
            .store
            .update_one(
                USERS_COLLECTION,
                doc! { "_id": &user.id },
                doc! { "$set": { "token": &code, "updated_at": DateTime::now() } },
            )
            .await?;
        if modified == 0 {
            return Err(ApiError::FailedUpdate);
        }

        let (subject, body) = forgot_password_email(&self.frontend_url, &code);
        self.mailer
            .send(&user.email, &subject, &body)
            .await
            .map_err(|e| ApiError::Technical(format!("Reset email failed: {}", e)))?;

        info!(user_id = %user.id, "User: password reset requested");
        Ok((user.id, code))
    }

    /// Consumes a reset code. The code is single-use: it is cleared in the
    /// same update that writes the new password.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let doc = self
            .store
            .find_one(USERS_COLLECTION, doc! { "token": token })
            .await?
            .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;
        let user = to_user(doc)?;

        let hashed = hash_password(new_password)?;
        self.store
            .update_one(
                USERS_COLLECTION,
                doc! { "_id": &user.id },
                doc! { "$set": {
                    "password": hashed,
                    "token": Bson::Null,
                    "force_update": to_bson(&ForceUpdate::None)?,
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;

        info!(user_id = %user.id, "User: password reset");
        Ok(())
    }

    /// Rotates the password for a caller who still knows the current one.
    pub async fn change_password(
        &self,
        email: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;

        let hashed = user.password.as_deref().ok_or(ApiError::AuthFailed)?;
        let ok = verify(old_password, hashed)
            .map_err(|e| ApiError::Technical(format!("Failed to verify password: {}", e)))?;
        if !ok {
            return Err(ApiError::AuthFailed);
        }

        self.store
            .update_one(
                USERS_COLLECTION,
                doc! { "_id": &user.id },
                doc! { "$set": {
                    "password": hash_password(new_password)?,
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;

        info!(user_id = %user.id, "User: password changed");
        Ok(())
    }

    /// Sends (or re-sends, with `resend`) the verification email. A repeat
    /// request without the resend flag is rejected.
    pub async fn request_email_verification(
        &self,
        email: &str,
        resend: bool,
    ) -> Result<(User, String), ApiError> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;

        if user.email_verified {
            return Err(ApiError::AlreadyVerified);
        }
        if user.requested_email_verification && !resend {
            return Err(ApiError::DuplicateVerify);
        }

        let code = Self::issue_verification_email(
            Arc::clone(&self.store),
            Arc::clone(&self.mailer),
            &self.frontend_url,
            &user.id,
            &user.email,
        )
        .await?;
        Ok((user, code))
    }

    /// Consumes an emailed verification code: enables the account, marks the
    /// email verified, clears the code, and logs the user in.
    pub async fn verify_by_email_token(&self, token: &str) -> Result<(User, String), ApiError> {
        let doc = self
            .store
            .find_one(USERS_COLLECTION, doc! { "token": token })
            .await?
            .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;
        let mut user = to_user(doc)?;

        if user.email_verified {
            return Err(ApiError::AlreadyVerified);
        }

        self.store
            .update_one(
                USERS_COLLECTION,
                doc! { "_id": &user.id },
                doc! { "$set": {
                    "status": to_bson(&UserStatus::Enabled)?,
                    "email_verified": true,
                    "token": Bson::Null,
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;

        user.status = UserStatus::Enabled;
        user.email_verified = true;
        user.token = None;

        info!(user_id = %user.id, "User: verified");
        let access_token = self.tokens.issue(&user.id, user.role)?;
        Ok((user, access_token))
    }

    /// Generic field update with a permissive merge: protected fields and
    /// fields the document does not already carry are skipped rather than
    /// rejected, and `updated_at` only moves when something was applied.
    pub async fn update_user(&self, id: &str, changes: Document) -> Result<User, ApiError> {
        let existing = self
            .store
            .find_one(USERS_COLLECTION, doc! { "_id": id })
            .await?
            .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;

        let mut set = Document::new();
        for (key, value) in changes {
            if SKIP_UPDATE_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if !existing.contains_key(&key) {
                info!(field = %key, "User: skipping unknown update field");
                continue;
            }
            if key == "password" {
                let plain = value
                    .as_str()
                    .ok_or_else(|| ApiError::InvalidParams("password must be a string".to_string()))?;
                set.insert("password", hash_password(plain)?);
            } else {
                set.insert(key, value);
            }
        }

        if set.is_empty() {
            return to_user(existing);
        }
        set.insert("updated_at", DateTime::now());

        self.store
            .update_one(USERS_COLLECTION, doc! { "_id": id }, doc! { "$set": set })
            .await?;

        let doc = self
            .store
            .find_one(USERS_COLLECTION, doc! { "_id": id })
            .await?
            .ok_or(ApiError::FailedUpdate)?;
        info!(user_id = %id, "User: updated");
        to_user(doc)
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        self.store
            .find_one(USERS_COLLECTION, doc! { "_id": id })
            .await?
            .ok_or_else(|| ApiError::UserNotFound("that user".to_string()))?;
        self.store
            .delete_one(USERS_COLLECTION, doc! { "_id": id })
            .await?;
        info!(user_id = %id, "User: deleted");
        Ok(())
    }

    /// Lookup that never fails the request: store or decode problems are
    /// logged and reported as absence.
    pub async fn get_single_user(&self, id: &str) -> Option<User> {
        match self.store.find_one(USERS_COLLECTION, doc! { "_id": id }).await {
            Ok(Some(doc)) => match to_user(doc) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(user_id = %id, error = %e, "User: decode failed");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(user_id = %id, error = %e, "User: lookup failed");
                None
            }
        }
    }

    /// Paginated listing, newest first, optionally filtered by an email
    /// substring. Failures degrade to an empty page.
    pub async fn get_all_users(&self, page: u64, query: Option<&str>) -> Vec<User> {
        let filter = match query {
            Some(q) if !q.is_empty() => {
                doc! { "email": { "$regex": regex::escape(q), "$options": "i" } }
            }
            _ => doc! {},
        };
        let skip = page.saturating_sub(1) * PAGE_SIZE as u64;

        match self
            .store
            .find_many(
                USERS_COLLECTION,
                filter,
                Some(doc! { "created_at": -1 }),
                Some(skip),
                Some(PAGE_SIZE),
            )
            .await
        {
            Ok(docs) => docs
                .into_iter()
                .filter_map(|doc| bson::from_document(doc).ok())
                .collect(),
            Err(e) => {
                warn!(error = %e, "User: listing failed");
                Vec::new()
            }
        }
    }

    /// Login-start URL for providers whose flow begins on our side.
    pub fn get_social_auth_url(&self, service: AuthService) -> Result<String, ApiError> {
        let provider = self
            .providers
            .get(service)
            .ok_or_else(|| ApiError::NotFound("that auth service".to_string()))?;
        provider
            .auth_url()
            .ok_or_else(|| ApiError::NotFound("an auth URL for that service".to_string()))
    }
}
