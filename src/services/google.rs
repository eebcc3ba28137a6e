// Google identity provider - verifies id tokens against the tokeninfo endpoint

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{IdentityProvider, ProviderError, SocialProfile};

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

pub struct GoogleService {
    http: reqwest::Client,
}

impl GoogleService {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for GoogleService {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct TokenInfo {
    sub: String,
    email: Option<String>,
}

#[async_trait]
impl IdentityProvider for GoogleService {
    /// `token` is the id token the client obtained from Google Sign-In.
    /// tokeninfo validates signature and expiry on Google's side.
    async fn get_user_profile(&self, token: &str) -> Result<SocialProfile, ProviderError> {
        let response = self
            .http
            .get(TOKENINFO_URL)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        debug!(subject = %info.sub, "Google: token verified");

        Ok(SocialProfile {
            id: info.sub,
            email: info.email,
            access_token: None,
            refresh_token: None,
        })
    }
}
