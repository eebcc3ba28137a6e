// Application state shared across all modules

use std::sync::Arc;

use crate::auth::TokenService;
use crate::store::CredentialStore;
use crate::users::UserService;

/// Application state containing the credential store and services.
/// Constructed once at start-up and immutable afterwards; every component
/// receives its collaborators from here rather than from process-wide
/// singletons.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub token_service: Arc<TokenService>,
    pub user_service: Arc<UserService>,
}
