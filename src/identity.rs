//! Identity providers used for sign-in.
//!
//! Google is the production provider (OAuth 2.0 authorization code flow with
//! PKCE). The dev provider signs everyone in as a fixed local user and never
//! leaves the server; it is only wired up when `DEV_MODE=true` and no Google
//! credentials are configured.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::session::{SessionError, User};

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_SCOPES: &str = "openid email profile";

/// Authorization code handed out by the dev provider.
pub const DEV_AUTH_CODE: &str = "dev-login";

/// An external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// URL the browser is sent to in order to sign in.
    fn authorize_url(&self, challenge: &str, state: &str) -> Result<String, SessionError>;

    /// Exchange an authorization code for the signed-in user's identity.
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<User, SessionError>;
}

/// Pick the provider for this configuration.
pub fn provider_for_config(
    config: &Config,
) -> Result<std::sync::Arc<dyn IdentityProvider>, SessionError> {
    if config.google.is_configured() {
        let client_id = config.google.client_id.clone().unwrap_or_default();
        let client_secret = config.google.client_secret.clone().unwrap_or_default();
        return Ok(std::sync::Arc::new(GoogleIdentityProvider::new(
            client_id,
            client_secret,
            config.oauth_redirect_uri(),
        )));
    }
    if config.dev_mode {
        tracing::warn!("Google OAuth not configured; using the dev identity provider");
        return Ok(std::sync::Arc::new(DevIdentityProvider::default()));
    }
    Err(SessionError::Provider(
        "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set (or enable DEV_MODE)".to_string(),
    ))
}

/// Google OAuth 2.0 / OpenID Connect.
pub struct GoogleIdentityProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

impl GoogleIdentityProvider {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            http: reqwest::Client::new(),
        }
    }

    async fn fetch_access_token(&self, code: &str, verifier: &str) -> Result<String, SessionError> {
        let token_body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("code_verifier", verifier)
            .finish();

        let token_response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(token_body)
            .send()
            .await
            .map_err(|e| SessionError::Provider(format!("Failed to exchange code: {}", e)))?;

        if !token_response.status().is_success() {
            let status = token_response.status();
            let error_text = token_response.text().await.unwrap_or_default();
            tracing::error!(
                "Google token exchange failed with status {}: {}",
                status,
                error_text
            );
            return Err(SessionError::Provider(format!(
                "OAuth token exchange failed ({})",
                status
            )));
        }

        let token_data: serde_json::Value = token_response.json().await.map_err(|e| {
            SessionError::Provider(format!("Failed to parse token response: {}", e))
        })?;

        token_data["access_token"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| SessionError::Provider("No access token in response".to_string()))
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self, challenge: &str, state: &str) -> Result<String, SessionError> {
        let mut url = url::Url::parse(GOOGLE_AUTHORIZE_URL)
            .map_err(|e| SessionError::Provider(format!("Failed to parse URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", GOOGLE_SCOPES)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state)
            .append_pair("prompt", "select_account");

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<User, SessionError> {
        let access_token = self.fetch_access_token(code, verifier).await?;

        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| SessionError::Provider(format!("Failed to fetch user info: {}", e)))?;

        if !response.status().is_success() {
            return Err(SessionError::Provider(format!(
                "User info request failed ({})",
                response.status()
            )));
        }

        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| SessionError::Provider(format!("Failed to parse user info: {}", e)))?;

        Ok(User {
            uid: info.sub,
            email: info.email,
            name: info.name,
        })
    }
}

/// Local sign-in for development. Redirects straight back to the callback.
pub struct DevIdentityProvider {
    user: User,
}

impl Default for DevIdentityProvider {
    fn default() -> Self {
        Self {
            user: User {
                uid: "dev-user".to_string(),
                email: Some("dev@localhost".to_string()),
                name: Some("Developer".to_string()),
            },
        }
    }
}

#[async_trait]
impl IdentityProvider for DevIdentityProvider {
    fn name(&self) -> &'static str {
        "dev"
    }

    fn authorize_url(&self, _challenge: &str, state: &str) -> Result<String, SessionError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("code", DEV_AUTH_CODE)
            .append_pair("state", state)
            .finish();
        Ok(format!("/auth/callback?{}", query))
    }

    async fn exchange_code(&self, code: &str, _verifier: &str) -> Result<User, SessionError> {
        if code != DEV_AUTH_CODE {
            return Err(SessionError::Provider("Unknown dev authorization code".to_string()));
        }
        Ok(self.user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_authorize_url_carries_pkce_and_state() {
        let provider = GoogleIdentityProvider::new(
            "client-123".to_string(),
            "secret".to_string(),
            "http://localhost:3000/auth/callback".to_string(),
        );
        let url = provider.authorize_url("challenge-abc", "state-xyz").unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(parsed.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["code_challenge"], "challenge-abc");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], "state-xyz");
        assert_eq!(pairs["redirect_uri"], "http://localhost:3000/auth/callback");
        assert_eq!(pairs["scope"], GOOGLE_SCOPES);
    }

    #[test]
    fn test_dev_provider_redirects_to_local_callback() {
        let provider = DevIdentityProvider::default();
        let url = provider.authorize_url("unused", "abc").unwrap();
        assert_eq!(url, format!("/auth/callback?code={}&state=abc", DEV_AUTH_CODE));
    }

    #[test]
    fn test_dev_provider_rejects_foreign_codes() {
        let provider = DevIdentityProvider::default();
        let user = tokio_test::block_on(provider.exchange_code(DEV_AUTH_CODE, "v")).unwrap();
        assert_eq!(user.uid, "dev-user");
        assert!(tokio_test::block_on(provider.exchange_code("forged", "v")).is_err());
    }

    #[test]
    fn test_provider_selection() {
        let mut config = Config::for_testing();
        assert_eq!(provider_for_config(&config).unwrap().name(), "dev");

        config.google.client_id = Some("id".to_string());
        config.google.client_secret = Some("secret".to_string());
        assert_eq!(provider_for_config(&config).unwrap().name(), "google");

        config.google = Default::default();
        config.dev_mode = false;
        assert!(provider_for_config(&config).is_err());
    }
}
