// Facebook identity provider - Graph API profile lookup

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{IdentityProvider, ProviderError, SocialProfile};

const GRAPH_ME_URL: &str = "https://graph.facebook.com/me";
const DIALOG_URL: &str = "https://www.facebook.com/v16.0/dialog/oauth";

pub struct FacebookService {
    app_id: String,
    callback_url: String,
    http: reqwest::Client,
}

impl FacebookService {
    pub fn new(app_id: String, callback_url: String) -> Self {
        Self {
            app_id,
            callback_url,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct GraphProfile {
    id: String,
    email: Option<String>,
}

#[async_trait]
impl IdentityProvider for FacebookService {
    /// `token` is the user access token from the Facebook login dialog.
    async fn get_user_profile(&self, token: &str) -> Result<SocialProfile, ProviderError> {
        let response = self
            .http
            .get(GRAPH_ME_URL)
            .query(&[("fields", "id,email"), ("access_token", token)])
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "graph api returned {}",
                response.status()
            )));
        }

        let profile: GraphProfile = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        debug!(facebook_id = %profile.id, "Facebook: profile fetched");

        Ok(SocialProfile {
            id: profile.id,
            email: profile.email,
            access_token: Some(token.to_string()),
            refresh_token: None,
        })
    }

    fn auth_url(&self) -> Option<String> {
        Some(format!(
            "{}?client_id={}&redirect_uri={}&scope=email",
            DIALOG_URL,
            urlencoding::encode(&self.app_id),
            urlencoding::encode(&self.callback_url),
        ))
    }
}
