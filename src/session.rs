//! Session management for signed-in users.
//!
//! - `login()` starts a PKCE authorization with the identity provider and
//!   returns the URL to send the browser to
//! - the OAuth callback completes the pending login and issues a JWT
//! - the JWT travels in the `taskpad_session` cookie (browser) or an
//!   `Authorization: Bearer` header (API clients)
//!
//! Sessions are stateless: `logout()` only clears the cookie.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::AuthConfig;
use crate::identity::IdentityProvider;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "taskpad_session";

/// How long a started login may take before its state is discarded.
const PENDING_LOGIN_TTL: StdDuration = StdDuration::from_secs(10 * 60);

/// The signed-in user's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Opaque, stable user id from the identity provider
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown or expired login state")]
    UnknownState,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Invalid session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject: the user's uid
    sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Issued-at unix seconds
    iat: i64,
    /// Expiration unix seconds
    exp: i64,
}

/// A login that has been started but not yet completed.
#[derive(Debug, Clone)]
struct PendingLogin {
    verifier: String,
    created_at: Instant,
}

/// Issues and verifies sessions and drives the provider login flow.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    jwt_secret: String,
    ttl_days: i64,
    secure_cookie: bool,
    pending: RwLock<HashMap<String, PendingLogin>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, auth: &AuthConfig, secure_cookie: bool) -> Self {
        Self {
            provider,
            jwt_secret: auth.jwt_secret.clone(),
            ttl_days: auth.jwt_ttl_days.max(1),
            secure_cookie,
            pending: RwLock::new(HashMap::new()),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Begin a login. Returns the provider URL the browser should visit.
    pub async fn login(&self) -> Result<String, SessionError> {
        let (verifier, challenge) = generate_pkce();
        let state = generate_state();
        let url = self.provider.authorize_url(&challenge, &state)?;

        let mut pending = self.pending.write().await;
        pending.retain(|_, p| p.created_at.elapsed() < PENDING_LOGIN_TTL);
        pending.insert(
            state,
            PendingLogin {
                verifier,
                created_at: Instant::now(),
            },
        );
        tracing::debug!("Started {} login ({} pending)", self.provider.name(), pending.len());
        Ok(url)
    }

    /// Finish a login from the provider callback. Returns the user and a session token.
    pub async fn complete_login(
        &self,
        code: &str,
        state: &str,
    ) -> Result<(User, String), SessionError> {
        let pending = self
            .pending
            .write()
            .await
            .remove(state)
            .filter(|p| p.created_at.elapsed() < PENDING_LOGIN_TTL)
            .ok_or(SessionError::UnknownState)?;

        let user = self.provider.exchange_code(code, &pending.verifier).await?;
        let (token, _exp) = self.issue_token(&user)?;
        tracing::info!("User {} signed in via {}", user.uid, self.provider.name());
        Ok((user, token))
    }

    /// Issue a session JWT for `user`. Returns the token and its expiry (unix seconds).
    pub fn issue_token(&self, user: &User) -> Result<(String, i64), SessionError> {
        let now = Utc::now();
        let exp = now + Duration::days(self.ttl_days);
        let claims = Claims {
            sub: user.uid.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok((token, claims.exp))
    }

    /// Verify a session JWT and return its user.
    pub fn verify_token(&self, token: &str) -> Result<User, SessionError> {
        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        let claims = token_data.claims;
        Ok(User {
            uid: claims.sub,
            email: claims.email,
            name: claims.name,
        })
    }

    /// The current user for a request, if it carries a valid session.
    pub fn user_from_headers(&self, headers: &HeaderMap) -> Option<User> {
        let token = bearer_token(headers).or_else(|| session_cookie(headers))?;
        match self.verify_token(&token) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::debug!("Ignoring invalid session: {}", e);
                None
            }
        }
    }

    /// `Set-Cookie` value that stores `token`.
    pub fn session_cookie(&self, token: &str) -> String {
        let max_age = self.ttl_days * 24 * 60 * 60;
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            SESSION_COOKIE,
            token,
            max_age,
            if self.secure_cookie { "; Secure" } else { "" }
        )
    }

    /// End the session. Returns the `Set-Cookie` value that clears it.
    pub fn logout(&self, user: Option<&User>) -> String {
        if let Some(user) = user {
            tracing::info!("User {} signed out", user.uid);
        }
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
            SESSION_COOKIE,
            if self.secure_cookie { "; Secure" } else { "" }
        )
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Generate a PKCE verifier and its S256 challenge.
fn generate_pkce() -> (String, String) {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let verifier: String = (0..64)
        .map(|_| {
            let idx = rng.gen_range(0..62);
            let chars: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
            chars[idx] as char
        })
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    (verifier, challenge)
}

/// Generate a random OAuth state value.
fn generate_state() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{DevIdentityProvider, DEV_AUTH_CODE};
    use axum::http::HeaderValue;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(DevIdentityProvider::default()),
            &AuthConfig {
                jwt_secret: "test-secret".to_string(),
                jwt_ttl_days: 30,
            },
            false,
        )
    }

    fn state_from_url(url: &str) -> String {
        let parsed = url::Url::parse(&format!("http://localhost{}", url)).unwrap();
        parsed
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.to_string())
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_round_trip_yields_verifiable_token() {
        let sessions = manager();
        let url = sessions.login().await.unwrap();
        let state = state_from_url(&url);

        let (user, token) = sessions.complete_login(DEV_AUTH_CODE, &state).await.unwrap();
        assert_eq!(user.uid, "dev-user");
        assert_eq!(sessions.verify_token(&token).unwrap(), user);
    }

    #[tokio::test]
    async fn test_login_state_is_single_use() {
        let sessions = manager();
        let state = state_from_url(&sessions.login().await.unwrap());
        sessions.complete_login(DEV_AUTH_CODE, &state).await.unwrap();

        let again = sessions.complete_login(DEV_AUTH_CODE, &state).await;
        assert!(matches!(again, Err(SessionError::UnknownState)));
        let forged = sessions.complete_login(DEV_AUTH_CODE, "made-up").await;
        assert!(matches!(forged, Err(SessionError::UnknownState)));
    }

    #[test]
    fn test_tampered_and_foreign_tokens_are_rejected() {
        let sessions = manager();
        let user = User {
            uid: "u1".to_string(),
            email: None,
            name: None,
        };
        let (token, _) = sessions.issue_token(&user).unwrap();

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(sessions.verify_token(&tampered).is_err());

        let other = SessionManager::new(
            Arc::new(DevIdentityProvider::default()),
            &AuthConfig {
                jwt_secret: "different".to_string(),
                jwt_ttl_days: 30,
            },
            false,
        );
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let sessions = manager();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "u1".to_string(),
            email: None,
            name: None,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(sessions.verify_token(&token).is_err());
    }

    #[test]
    fn test_user_from_cookie_or_bearer_header() {
        let sessions = manager();
        let user = User {
            uid: "u1".to_string(),
            email: Some("u1@example.com".to_string()),
            name: None,
        };
        let (token, _) = sessions.issue_token(&user).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, token)).unwrap(),
        );
        assert_eq!(sessions.user_from_headers(&headers), Some(user.clone()));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert_eq!(sessions.user_from_headers(&headers), Some(user));

        assert_eq!(sessions.user_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_logout_cookie_expires_session() {
        let sessions = manager();
        let cookie = sessions.logout(None);
        assert!(cookie.starts_with(&format!("{}=;", SESSION_COOKIE)));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_pkce_challenge_matches_verifier() {
        let (verifier, challenge) = generate_pkce();
        assert_eq!(verifier.len(), 64);
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        assert_eq!(challenge, expected);
    }
}
