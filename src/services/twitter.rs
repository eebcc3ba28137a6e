// Twitter identity provider - OAuth2 code exchange plus profile lookup
//
// Twitter never discloses an email address, so accounts created through it
// get a placeholder email and a forced email update.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{IdentityProvider, ProviderError, SocialProfile};

const TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
const ME_URL: &str = "https://api.twitter.com/2/users/me";
const AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
const SCOPES: &str = "tweet.read users.read offline.access";

pub struct TwitterService {
    client_id: String,
    client_secret: String,
    callback_url: String,
    http: reqwest::Client,
}

impl TwitterService {
    pub fn new(client_id: String, client_secret: String, callback_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            callback_url,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct MeResponse {
    data: MeData,
}

#[derive(Deserialize)]
struct MeData {
    id: String,
}

#[async_trait]
impl IdentityProvider for TwitterService {
    /// `token` is the authorization code from the callback; it gets
    /// exchanged for an access token before the profile lookup.
    async fn get_user_profile(&self, token: &str) -> Result<SocialProfile, ProviderError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("code", token),
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.callback_url.as_str()),
                ("code_verifier", "challenge"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "token exchange returned {}",
                response.status()
            )));
        }
        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let response = self
            .http
            .get(ME_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "profile lookup returned {}",
                response.status()
            )));
        }
        let me: MeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        debug!(twitter_id = %me.data.id, "Twitter: profile fetched");

        Ok(SocialProfile {
            id: me.data.id,
            email: None,
            access_token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
        })
    }

    fn auth_url(&self) -> Option<String> {
        Some(format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state=state&code_challenge=challenge&code_challenge_method=plain",
            AUTHORIZE_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.callback_url),
            urlencoding::encode(SCOPES),
        ))
    }
}
