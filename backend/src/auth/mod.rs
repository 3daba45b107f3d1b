pub mod google;

use std::sync::Arc;

use axum::{
    Json, async_trait,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, TimeZone, Utc};
use cookie::time::Duration as CookieDuration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

pub const SESSION_COOKIE: &str = "session_token";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const OAUTH_CALLBACK_COOKIE: &str = "oauth_callback_url";

/// Lifetime of the state and callback cookies set for the OAuth round trip.
const OAUTH_COOKIE_TTL_SECONDS: i64 = 10 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Profile data copied into a new session token.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProfile {
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// HS256 keys for session tokens, shared with handlers through a request extension.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds: i64::try_from(ttl_seconds).unwrap_or(i64::MAX / 2),
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    pub fn issue(&self, profile: &SessionProfile) -> anyhow::Result<IssuedSession> {
        self.issue_at(profile, Utc::now())
    }

    pub fn issue_at(
        &self,
        profile: &SessionProfile,
        now: DateTime<Utc>,
    ) -> anyhow::Result<IssuedSession> {
        let iat = now.timestamp();
        let exp = iat.saturating_add(self.ttl_seconds);
        let claims = SessionClaims {
            sub: profile.user_id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            picture: profile.picture.clone(),
            iat,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .ok_or_else(|| anyhow::anyhow!("session expiry out of range"))?;

        Ok(IssuedSession { token, expires_at })
    }

    pub fn validate(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| AuthError(anyhow::anyhow!("JWT validation failed: {}", e)))?;

        Ok(token_data.claims)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionClaims> for AuthUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            name: claims.name,
            image: claims.picture,
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug)]
pub struct AuthError(anyhow::Error);

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError(err)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        debug!(reason = %self.0, "auth: request rejected");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response()
    }
}

/// Session token from `Authorization: Bearer`, falling back to the session cookie.
fn session_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    bearer.or_else(|| {
        CookieJar::from_headers(&parts.headers)
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let keys = parts.extensions.get::<Arc<SessionKeys>>().cloned().ok_or_else(|| {
            error!("auth: session keys extension is not installed");
            AuthError(anyhow::anyhow!("session keys unavailable"))
        })?;

        let token = session_token(parts)
            .ok_or_else(|| AuthError(anyhow::anyhow!("Missing session token")))?;

        let claims = keys.validate(&token)?;

        Ok(AuthUser::from(claims))
    }
}

/// Keeps post-sign-in redirects on this site: only relative paths are accepted.
/// The result is stored in a cookie, so characters invalid in a cookie value
/// (`;`, `"`, `,`, whitespace) are rejected too.
pub fn sanitize_callback_url(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.chars().any(|c| {
                    c.is_control() || c.is_whitespace() || matches!(c, '\\' | ';' | '"' | ',')
                }) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

pub fn session_cookie(token: String, ttl_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(ttl_seconds))
        .build()
}

/// Short-lived cookie carrying OAuth round-trip data (`state`, callback URL).
pub fn oauth_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/api/auth")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(OAUTH_COOKIE_TTL_SECONDS))
        .build()
}

/// Cookie with the same name and path as `name`, used to remove it.
pub fn removal_cookie(name: &'static str, path: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path(path).build()
}
