// Tests for the user lifecycle service

use async_trait::async_trait;
use bson::doc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::models::{AuthService, ForceUpdate, UserStatus, USERS_COLLECTION};
use super::services::UserService;
use crate::auth::TokenService;
use crate::common::ApiError;
use crate::services::email::EmailError;
use crate::services::{
    EmailSender, IdentityProvider, ProviderError, SocialProfile, SocialProviders,
};
use crate::store::{CredentialStore, MemoryStore};

struct MockMailer {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl MockMailer {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for MockMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), html_body.to_string()));
        Ok(())
    }
}

struct FailingMailer;

#[async_trait]
impl EmailSender for FailingMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), EmailError> {
        Err(EmailError::Send("smtp down".to_string()))
    }
}

struct MockProvider {
    profile: SocialProfile,
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn get_user_profile(&self, token: &str) -> Result<SocialProfile, ProviderError> {
        if token == "bad" {
            return Err(ProviderError::Rejected("bad token".to_string()));
        }
        Ok(self.profile.clone())
    }

    fn auth_url(&self) -> Option<String> {
        Some("https://provider.example/authorize?client_id=abc".to_string())
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    tokens: Arc<TokenService>,
    mailer: Arc<MockMailer>,
    service: UserService,
}

fn fixture_with(providers: SocialProviders, mailer: Arc<dyn EmailSender>) -> (Arc<MemoryStore>, Arc<TokenService>, UserService) {
    let store = Arc::new(MemoryStore::new());
    let tokens = Arc::new(TokenService::new("test-secret".to_string(), 24));
    let service = UserService::new(
        store.clone() as Arc<dyn CredentialStore>,
        tokens.clone(),
        mailer,
        Arc::new(providers),
        "https://app.example.com".to_string(),
    );
    (store, tokens, service)
}

fn fixture() -> Fixture {
    let mailer = Arc::new(MockMailer::new());
    let (store, tokens, service) =
        fixture_with(SocialProviders::new(), mailer.clone() as Arc<dyn EmailSender>);
    Fixture {
        store,
        tokens,
        mailer,
        service,
    }
}

fn social_fixture(profile: SocialProfile, service: AuthService) -> Fixture {
    let mailer = Arc::new(MockMailer::new());
    let mut providers = SocialProviders::new();
    providers.register(service, Arc::new(MockProvider { profile }));
    let (store, tokens, user_service) =
        fixture_with(providers, mailer.clone() as Arc<dyn EmailSender>);
    Fixture {
        store,
        tokens,
        mailer,
        service: user_service,
    }
}

/// Lets the spawned verification-email task run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn create_user_starts_pending_with_a_valid_token() {
    let fx = fixture();
    let (user, token) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    assert_eq!(user.status, UserStatus::Pending);
    assert!(!user.email_verified);
    // the creating service is on record before any login happens
    assert_eq!(user.auth_services, vec![AuthService::Local]);
    let claims = fx.tokens.verify(&token).unwrap();
    assert_eq!(claims.sub, user.id);
}

#[tokio::test]
async fn create_user_sends_verification_email_in_background() {
    let fx = fixture();
    let (user, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();
    settle().await;

    let sent = fx.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "jane@example.com");

    let doc = fx
        .store
        .find_one(USERS_COLLECTION, doc! { "_id": &user.id })
        .await
        .unwrap()
        .unwrap();
    let code = doc.get_str("token").unwrap();
    assert_eq!(code.len(), 6);
    assert!(doc.get_bool("requested_email_verification").unwrap());
    // the emailed body carries the same code
    assert!(sent[0].2.contains(code));
}

#[tokio::test]
async fn create_user_rejects_aliases_of_an_existing_email() {
    let fx = fixture();
    fx.service
        .create_user("john.doe@gmail.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    let err = fx
        .service
        .create_user("JohnDoe+signup@googlemail.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AlreadyExists(_)));
}

#[tokio::test]
async fn create_user_survives_mailer_outage() {
    let (_, tokens, service) = fixture_with(SocialProviders::new(), Arc::new(FailingMailer));
    let (user, token) = service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();
    settle().await;
    assert_eq!(tokens.verify(&token).unwrap().sub, user.id);
}

#[tokio::test]
async fn local_login_happy_path_updates_login_state() {
    let fx = fixture();
    let (created, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    let (user, token) = fx
        .service
        .login_local("jane@example.com", "hunter22")
        .await
        .unwrap();
    assert_eq!(user.id, created.id);
    assert!(user.auth_services.contains(&AuthService::Local));
    assert_eq!(fx.tokens.verify(&token).unwrap().sub, user.id);
}

#[tokio::test]
async fn local_login_rejects_wrong_password_and_unknown_user() {
    let fx = fixture();
    fx.service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    let err = fx
        .service
        .login_local("jane@example.com", "wrong-pass")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AuthFailed));

    let err = fx
        .service
        .login_local("nobody@example.com", "hunter22")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UserNotFound(_)));
}

#[tokio::test]
async fn blocked_user_cannot_log_in_even_with_valid_credentials() {
    let fx = fixture();
    let (user, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();
    fx.store
        .update_one(
            USERS_COLLECTION,
            doc! { "_id": &user.id },
            doc! { "$set": { "status": "blocked" } },
        )
        .await
        .unwrap();

    let err = fx
        .service
        .login_local("jane@example.com", "hunter22")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UserBlocked));
}

#[tokio::test]
async fn social_login_without_email_gets_placeholder_and_forced_update() {
    let fx = social_fixture(
        SocialProfile {
            id: "TW123".to_string(),
            email: None,
            access_token: Some("at".to_string()),
            refresh_token: Some("rt".to_string()),
        },
        AuthService::Twitter,
    );

    let (user, _) = fx
        .service
        .login_social(AuthService::Twitter, "code")
        .await
        .unwrap();
    assert_eq!(user.email, "tw123@twitter.com");
    assert_eq!(user.force_update, ForceUpdate::Email);
    assert!(user.email_verified);
    assert!(user.requested_email_verification);
    assert_eq!(user.status, UserStatus::Enabled);
    assert!(user.auth_services.contains(&AuthService::Twitter));

    let profile = user.profile.unwrap();
    assert_eq!(profile.id, "TW123");
    assert_eq!(profile.token.as_deref(), Some("at"));

    // no verification email for socially created accounts
    settle().await;
    assert!(fx.mailer.sent().is_empty());

    // the verification fields are forced in the stored document too
    let doc = fx
        .store
        .find_one(USERS_COLLECTION, doc! { "_id": &user.id })
        .await
        .unwrap()
        .unwrap();
    assert!(doc.get_bool("email_verified").unwrap());
    assert!(doc.get_bool("requested_email_verification").unwrap());
    assert_eq!(doc.get_str("status").unwrap(), "enabled");
}

#[tokio::test]
async fn social_login_attaches_to_existing_account_by_normalized_email() {
    let fx = social_fixture(
        SocialProfile {
            id: "G123".to_string(),
            email: Some("John.Doe@gmail.com".to_string()),
            access_token: None,
            refresh_token: None,
        },
        AuthService::Google,
    );
    let (created, _) = fx
        .service
        .create_user("johndoe@gmail.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    let (user, _) = fx
        .service
        .login_social(AuthService::Google, "id-token")
        .await
        .unwrap();
    assert_eq!(user.id, created.id);
    assert!(user.auth_services.contains(&AuthService::Google));
    // the provider vouched for the address
    assert!(user.email_verified);
    assert!(user.requested_email_verification);
    assert_eq!(user.status, UserStatus::Enabled);
}

#[tokio::test]
async fn social_login_forces_verification_state_on_an_unverified_account() {
    let fx = social_fixture(
        SocialProfile {
            id: "G123".to_string(),
            email: Some("jane@example.com".to_string()),
            access_token: None,
            refresh_token: None,
        },
        AuthService::Google,
    );
    // seed directly so every verification field starts false
    let seeded = super::models::User::new("jane@example.com".to_string(), None);
    fx.store
        .insert_one(USERS_COLLECTION, bson::to_document(&seeded).unwrap())
        .await
        .unwrap();

    let (user, _) = fx
        .service
        .login_social(AuthService::Google, "id-token")
        .await
        .unwrap();
    assert!(user.email_verified);
    assert!(user.requested_email_verification);
    assert_eq!(user.status, UserStatus::Enabled);

    let doc = fx
        .store
        .find_one(USERS_COLLECTION, doc! { "_id": &seeded.id })
        .await
        .unwrap()
        .unwrap();
    assert!(doc.get_bool("email_verified").unwrap());
    assert!(doc.get_bool("requested_email_verification").unwrap());
    assert_eq!(doc.get_str("status").unwrap(), "enabled");
}

#[tokio::test]
async fn social_login_with_rejected_token_fails_auth() {
    let fx = social_fixture(
        SocialProfile {
            id: "G123".to_string(),
            email: Some("jane@example.com".to_string()),
            access_token: None,
            refresh_token: None,
        },
        AuthService::Google,
    );
    let err = fx
        .service
        .login_social(AuthService::Google, "bad")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AuthFailed));
}

#[tokio::test]
async fn social_login_on_unconfigured_service_is_not_found() {
    let fx = fixture();
    let err = fx
        .service
        .login_social(AuthService::Facebook, "token")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn forgot_then_reset_password_consumes_the_code() {
    let fx = fixture();
    fx.service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    let (_, code) = fx.service.forgot_password("jane@example.com").await.unwrap();
    fx.service.reset_password(&code, "new-password").await.unwrap();

    // old password is gone, new one works
    assert!(matches!(
        fx.service
            .login_local("jane@example.com", "hunter22")
            .await
            .unwrap_err(),
        ApiError::AuthFailed
    ));
    fx.service
        .login_local("jane@example.com", "new-password")
        .await
        .unwrap();

    // the code is single-use
    let err = fx
        .service
        .reset_password(&code, "another-password")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UserNotFound(_)));
}

#[tokio::test]
async fn forgot_password_surfaces_mailer_failure() {
    let (store, _, service) = fixture_with(SocialProviders::new(), Arc::new(FailingMailer));
    // seed without going through create_user so no background email runs
    let user = super::models::User::new("jane@example.com".to_string(), None);
    store
        .insert_one(USERS_COLLECTION, bson::to_document(&user).unwrap())
        .await
        .unwrap();

    let err = service.forgot_password("jane@example.com").await.unwrap_err();
    assert!(matches!(err, ApiError::Technical(_)));
}

#[tokio::test]
async fn change_password_requires_the_current_one() {
    let fx = fixture();
    fx.service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    let err = fx
        .service
        .change_password("jane@example.com", "wrong", "new-password")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AuthFailed));

    fx.service
        .change_password("jane@example.com", "hunter22", "new-password")
        .await
        .unwrap();
    fx.service
        .login_local("jane@example.com", "new-password")
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_verification_request_requires_resend_flag() {
    let fx = fixture();
    let (created, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();
    settle().await;

    let doc = fx
        .store
        .find_one(USERS_COLLECTION, doc! { "_id": &created.id })
        .await
        .unwrap()
        .unwrap();
    let first_code = doc.get_str("token").unwrap().to_string();

    let err = fx
        .service
        .request_email_verification("jane@example.com", false)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::DuplicateVerify));

    let (_, second_code) = fx
        .service
        .request_email_verification("jane@example.com", true)
        .await
        .unwrap();
    assert_eq!(fx.mailer.sent().len(), 2);
    // a resend invalidates the previous code
    assert_ne!(second_code, first_code);
    let err = fx
        .service
        .verify_by_email_token(&first_code)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UserNotFound(_)));
}

#[tokio::test]
async fn email_verification_enables_the_account_once() {
    let fx = fixture();
    let (created, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();
    settle().await;

    let doc = fx
        .store
        .find_one(USERS_COLLECTION, doc! { "_id": &created.id })
        .await
        .unwrap()
        .unwrap();
    let code = doc.get_str("token").unwrap().to_string();

    let (user, token) = fx.service.verify_by_email_token(&code).await.unwrap();
    assert_eq!(user.status, UserStatus::Enabled);
    assert!(user.email_verified);
    assert_eq!(fx.tokens.verify(&token).unwrap().sub, user.id);

    // consumed: the same code no longer resolves, for verification or reset
    let err = fx.service.verify_by_email_token(&code).await.unwrap_err();
    assert!(matches!(err, ApiError::UserNotFound(_)));
    let err = fx
        .service
        .reset_password(&code, "sneaky-password")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UserNotFound(_)));

    // and a verified account cannot request another email
    let err = fx
        .service
        .request_email_verification("jane@example.com", true)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AlreadyVerified));

    // the enabled account logs in normally
    fx.service
        .login_local("jane@example.com", "hunter22")
        .await
        .unwrap();
}

#[tokio::test]
async fn update_user_merges_permissively() {
    let fx = fixture();
    let (created, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    // DateTime has millisecond resolution; make sure the bump is observable
    tokio::time::sleep(Duration::from_millis(5)).await;

    let updated = fx
        .service
        .update_user(
            &created.id,
            doc! {
                "status": "blocked",
                "favourite_colour": "teal",
                "created_at": bson::DateTime::from_millis(0),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, UserStatus::Blocked);
    // unknown and protected fields are skipped, not rejected
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);
}

#[tokio::test]
async fn update_with_nothing_applicable_leaves_updated_at_alone() {
    let fx = fixture();
    let (created, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    let updated = fx
        .service
        .update_user(&created.id, doc! { "favourite_colour": "teal" })
        .await
        .unwrap();
    assert_eq!(updated.updated_at, created.updated_at);

    let updated = fx.service.update_user(&created.id, doc! {}).await.unwrap();
    assert_eq!(updated.updated_at, created.updated_at);
}

#[tokio::test]
async fn update_hashes_password_changes() {
    let fx = fixture();
    let (created, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    fx.service
        .update_user(&created.id, doc! { "password": "rotated-pass" })
        .await
        .unwrap();
    fx.service
        .login_local("jane@example.com", "rotated-pass")
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_user_then_lookups_fail() {
    let fx = fixture();
    let (created, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    fx.service.delete_user(&created.id).await.unwrap();
    assert!(fx.service.get_single_user(&created.id).await.is_none());

    let err = fx.service.delete_user(&created.id).await.unwrap_err();
    assert!(matches!(err, ApiError::UserNotFound(_)));
}

#[tokio::test]
async fn listing_filters_by_email_substring() {
    let fx = fixture();
    fx.service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();
    fx.service
        .create_user("john@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();
    fx.service
        .create_user("kate@other.org", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    let all = fx.service.get_all_users(1, None).await;
    assert_eq!(all.len(), 3);

    let filtered = fx.service.get_all_users(1, Some("EXAMPLE.COM")).await;
    assert_eq!(filtered.len(), 2);

    let empty_page = fx.service.get_all_users(2, None).await;
    assert!(empty_page.is_empty());
}

#[tokio::test]
async fn sanitized_projection_hides_sensitive_fields() {
    let fx = fixture();
    let (user, _) = fx
        .service
        .create_user("jane@example.com", Some("hunter22"), AuthService::Local)
        .await
        .unwrap();

    let sanitized = user.sanitized();
    let object = sanitized.as_object().unwrap();
    assert!(object.contains_key("_id"));
    assert!(object.contains_key("status"));
    assert!(!object.contains_key("email"));
    assert!(!object.contains_key("password"));
    assert!(!object.contains_key("token"));
    assert!(!object.contains_key("last_logged_in_at"));

    let own = user.own_view();
    let object = own.as_object().unwrap();
    assert!(object.contains_key("email"));
    assert!(!object.contains_key("password"));
    assert!(!object.contains_key("token"));
}

#[tokio::test]
async fn social_auth_url_only_for_providers_that_offer_one() {
    let fx = social_fixture(
        SocialProfile {
            id: "TW123".to_string(),
            email: None,
            access_token: None,
            refresh_token: None,
        },
        AuthService::Twitter,
    );

    let url = fx.service.get_social_auth_url(AuthService::Twitter).unwrap();
    assert!(url.contains("client_id"));

    let err = fx
        .service
        .get_social_auth_url(AuthService::Google)
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}
