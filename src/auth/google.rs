//! Google as an OAuth 2.0 / OpenID Connect provider.

use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use super::oauth::OAuthProvider;
use super::AuthError;
use crate::model::OAuthProfile;

const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Clone)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

impl std::fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

pub struct GoogleProvider {
    credentials: GoogleCredentials,
    http: Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl GoogleProvider {
    /// # Errors
    ///
    /// [`AuthError::Provider`] when the HTTP client cannot be built.
    pub fn new(credentials: GoogleCredentials) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Provider(format!("http client: {e}")))?;
        Ok(Self { credentials, http })
    }

    fn access_token(&self, code: &str) -> Result<String, AuthError> {
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("code", code)
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("client_secret", &self.credentials.client_secret)
            .append_pair("redirect_uri", &self.credentials.callback_url)
            .append_pair("grant_type", "authorization_code")
            .finish();

        let token: TokenResponse = self
            .http
            .post(TOKEN_ENDPOINT)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| {
                error!(error = %e, "Google token exchange failed");
                AuthError::Provider(format!("token exchange: {e}"))
            })?;
        Ok(token.access_token)
    }
}

impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn authorize_url(&self, state: &str) -> String {
        match Url::parse_with_params(
            AUTHORIZE_ENDPOINT,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", self.credentials.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        ) {
            Ok(url) => url.into(),
            Err(e) => {
                error!(error = %e, "Failed to build Google authorize URL");
                AUTHORIZE_ENDPOINT.to_string()
            }
        }
    }

    fn exchange(&self, code: &str) -> Result<OAuthProfile, AuthError> {
        let token = self.access_token(code)?;
        let info: UserInfo = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(token)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| {
                error!(error = %e, "Google userinfo request failed");
                AuthError::Provider(format!("userinfo: {e}"))
            })?;
        debug!(subject = %info.sub, "Google profile fetched");

        let name = info.name.unwrap_or_else(|| info.email.clone());
        Ok(OAuthProfile {
            provider: self.name().to_string(),
            provider_id: info.sub,
            email: info.email,
            name,
            avatar_url: info.picture,
        })
    }
}
