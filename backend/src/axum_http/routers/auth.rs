use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use crates::domain::repositories::user_directory::UserDirectoryRepository;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    auth::{
        AuthUser, OAUTH_CALLBACK_COOKIE, OAUTH_STATE_COOKIE, SESSION_COOKIE,
        google::OAuthProvider, oauth_cookie, removal_cookie, sanitize_callback_url,
        session_cookie,
    },
    axum_http::routers::public_base_url,
    usecases::auth::{AuthUseCase, OAuthCallback},
};

pub const CALLBACK_PATH: &str = "/api/auth/callback/google";
pub const SIGN_IN_PAGE: &str = "/auth/signin";

pub struct AuthRouterState<O, D>
where
    O: OAuthProvider + 'static,
    D: UserDirectoryRepository + Send + Sync + 'static,
{
    pub auth_usecase: AuthUseCase<O, D>,
    pub app_url: Option<String>,
    pub secure_cookies: bool,
}

impl<O, D> AuthRouterState<O, D>
where
    O: OAuthProvider + 'static,
    D: UserDirectoryRepository + Send + Sync + 'static,
{
    fn redirect_uri(&self, headers: &HeaderMap) -> String {
        format!(
            "{}{CALLBACK_PATH}",
            public_base_url(self.app_url.as_deref(), headers)
        )
    }
}

pub fn routes<O, D>(state: Arc<AuthRouterState<O, D>>) -> Router
where
    O: OAuthProvider + 'static,
    D: UserDirectoryRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/signin", get(sign_in::<O, D>))
        .route("/callback/google", get(callback::<O, D>))
        .route("/signout", post(sign_out))
        .route("/session", get(session))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInQuery {
    pub callback_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: SessionUser,
    pub expires: String,
}

pub async fn sign_in<O, D>(
    State(state): State<Arc<AuthRouterState<O, D>>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<SignInQuery>,
) -> Response
where
    O: OAuthProvider + 'static,
    D: UserDirectoryRepository + Send + Sync + 'static,
{
    let callback_url = sanitize_callback_url(query.callback_url.as_deref());
    let redirect_uri = state.redirect_uri(&headers);

    match state.auth_usecase.begin_sign_in(&redirect_uri) {
        Ok(redirect) => {
            let jar = jar
                .add(oauth_cookie(
                    OAUTH_STATE_COOKIE,
                    redirect.state,
                    state.secure_cookies,
                ))
                .add(oauth_cookie(
                    OAUTH_CALLBACK_COOKIE,
                    callback_url,
                    state.secure_cookies,
                ));
            (jar, Redirect::to(&redirect.authorization_url)).into_response()
        }
        Err(err) => {
            warn!(error = ?err, "auth router: sign-in could not start");
            Redirect::to(&format!("{SIGN_IN_PAGE}?error={}", err.code())).into_response()
        }
    }
}

pub async fn callback<O, D>(
    State(state): State<Arc<AuthRouterState<O, D>>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response
where
    O: OAuthProvider + 'static,
    D: UserDirectoryRepository + Send + Sync + 'static,
{
    let expected_state = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value().to_string());
    let callback_url = sanitize_callback_url(
        jar.get(OAUTH_CALLBACK_COOKIE)
            .map(|cookie| cookie.value()),
    );
    let redirect_uri = state.redirect_uri(&headers);

    // The state and callback cookies are single use.
    let jar = jar
        .remove(removal_cookie(OAUTH_STATE_COOKIE, "/api/auth"))
        .remove(removal_cookie(OAUTH_CALLBACK_COOKIE, "/api/auth"));

    let result = state
        .auth_usecase
        .complete_sign_in(
            OAuthCallback {
                code: query.code,
                state: query.state,
                error: query.error,
            },
            expected_state.as_deref(),
            &redirect_uri,
        )
        .await;

    match result {
        Ok(session) => {
            let jar = jar.add(session_cookie(
                session.token,
                state.auth_usecase.session_ttl_seconds(),
                state.secure_cookies,
            ));
            info!(callback_url = %callback_url, "auth router: signed in, redirecting");
            (jar, Redirect::to(&callback_url)).into_response()
        }
        Err(err) => (
            jar,
            Redirect::to(&format!("{SIGN_IN_PAGE}?error={}", err.code())),
        )
            .into_response(),
    }
}

pub async fn sign_out(jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(removal_cookie(SESSION_COOKIE, "/")),
        Json(json!({ "success": true })),
    )
}

pub async fn session(auth: Option<AuthUser>) -> Response {
    match auth {
        Some(user) => Json(SessionResponse {
            expires: user.expires_at.to_rfc3339(),
            user: SessionUser {
                id: user.user_id,
                name: user.name,
                email: user.email,
                image: user.image,
            },
        })
        .into_response(),
        None => Json(json!({})).into_response(),
    }
}
