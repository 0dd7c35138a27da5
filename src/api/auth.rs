//! Sign-in, sign-out and request authentication.
//!
//! - `POST /login` sends the browser to the identity provider
//! - `GET /auth/callback` completes the login and sets the session cookie
//! - `POST /logout` clears the cookie and the user's dashboard
//! - `/api/tasks*` requires a valid session (`require_auth`)

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
};

use super::routes::AppState;
use super::types::{MeResponse, OAuthCallbackQuery};
use crate::session::User;

/// The current request's session. `user` is `None` when signed out.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: Option<User>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Session {
            user: state.sessions.user_from_headers(&parts.headers),
        })
    }
}

/// Start a login with the identity provider.
pub async fn login(State(state): State<Arc<AppState>>, session: Session) -> Response {
    if session.user.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    match state.sessions.login().await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => {
            tracing::warn!("Failed to start login: {}", e);
            Redirect::to("/").into_response()
        }
    }
}

/// OAuth redirect target.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        tracing::warn!("Identity provider returned an error: {}", error);
        return Redirect::to("/").into_response();
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return (StatusCode::BAD_REQUEST, "Missing code or state").into_response();
    };

    match state.sessions.complete_login(&code, &oauth_state).await {
        Ok((_user, token)) => (
            [(header::SET_COOKIE, state.sessions.session_cookie(&token))],
            Redirect::to("/"),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Login failed: {}", e);
            Redirect::to("/").into_response()
        }
    }
}

/// Clear the session.
pub async fn logout(State(state): State<Arc<AppState>>, session: Session) -> Response {
    if let Some(user) = &session.user {
        state.dashboards.remove(&user.uid).await;
    }
    let cookie = state.sessions.logout(session.user.as_ref());
    ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
}

/// `GET /api/me` - the signed-in user, or `null`.
pub async fn me(session: Session) -> Json<MeResponse> {
    Json(MeResponse { user: session.user })
}

/// Reject requests without a valid session; otherwise expose the user as an extension.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match state.sessions.user_from_headers(req.headers()) {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => (StatusCode::UNAUTHORIZED, "Missing or invalid session").into_response(),
    }
}
