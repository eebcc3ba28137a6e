// External service integrations - email delivery and social identity providers

pub mod email;
pub mod facebook;
pub mod google;
pub mod twitter;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use email::{EmailSender, SesMailer};
pub use facebook::FacebookService;
pub use google::GoogleService;
pub use twitter::TwitterService;

use crate::users::AuthService;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(String),

    #[error("provider rejected the token: {0}")]
    Rejected(String),

    #[error("provider response malformed: {0}")]
    Malformed(String),
}

/// Identity material a provider vouches for. `email` is absent on providers
/// that do not disclose one (e.g. Twitter).
#[derive(Debug, Clone)]
pub struct SocialProfile {
    pub id: String,
    pub email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// A social login backend. `token` is whatever the client obtained from the
/// provider's flow: an id token for Google, an authorization code for
/// Twitter, an access token for Facebook.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_user_profile(&self, token: &str) -> Result<SocialProfile, ProviderError>;

    /// Browser URL that starts this provider's login flow, for providers
    /// whose flow begins on our side.
    fn auth_url(&self) -> Option<String> {
        None
    }
}

/// Registry of the providers configured at start-up. An unconfigured
/// service simply has no entry.
#[derive(Default)]
pub struct SocialProviders {
    providers: HashMap<AuthService, Arc<dyn IdentityProvider>>,
}

impl SocialProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: AuthService, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(service, provider);
    }

    pub fn get(&self, service: AuthService) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(&service).cloned()
    }
}
