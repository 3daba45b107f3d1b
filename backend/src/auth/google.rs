//! Google OAuth 2.0 authorization-code flow used for sign-in.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

pub const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const SCOPES: &str = "openid email profile";

/// OpenID Connect userinfo response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String>;

    /// Exchanges an authorization code for an access token.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String>;

    async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile>;
}

pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl GoogleOAuthClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthClient {
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            AUTHORIZATION_ENDPOINT,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String> {
        let resp = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("google token request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "google oauth: token exchange rejected");
            anyhow::bail!("token exchange failed with status {status}");
        }

        let token: TokenResponse = resp
            .json()
            .await
            .context("failed to decode google token response")?;
        debug!("google oauth: code exchanged");
        Ok(token.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile> {
        let resp = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .context("google userinfo request failed")?;

        let status = resp.status();
        if !status.is_success() {
            error!(status = %status, "google oauth: userinfo request rejected");
            anyhow::bail!("userinfo request failed with status {status}");
        }

        resp.json()
            .await
            .context("failed to decode google userinfo response")
    }
}
