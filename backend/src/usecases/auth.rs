use std::sync::Arc;

use chrono::Utc;
use crates::domain::{
    repositories::user_directory::UserDirectoryRepository,
    value_objects::user_directory::DirectoryUser,
};
use rand::{Rng, distributions::Alphanumeric};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::auth::{
    IssuedSession, SessionKeys, SessionProfile,
    google::{GoogleProfile, OAuthProvider},
};

const STATE_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error("provider denied access: {0}")]
    ProviderDenied(String),
    #[error("missing authorization code")]
    MissingCode,
    #[error("oauth state mismatch")]
    InvalidState,
    #[error("token exchange failed")]
    TokenExchange(#[source] anyhow::Error),
    #[error("profile lookup failed")]
    Profile(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthFlowError {
    /// Value of the `error` query parameter on the sign-in page redirect.
    pub fn code(&self) -> &'static str {
        match self {
            AuthFlowError::ProviderDenied(_) => "AccessDenied",
            AuthFlowError::MissingCode => "MissingCode",
            AuthFlowError::InvalidState => "InvalidState",
            AuthFlowError::TokenExchange(_) => "OAuthCallback",
            AuthFlowError::Profile(_) => "OAuthProfile",
            AuthFlowError::Internal(_) => "Configuration",
        }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthFlowError>;

#[derive(Debug, Clone, PartialEq)]
pub struct SignInRedirect {
    pub state: String,
    pub authorization_url: String,
}

/// Query parameters Google appends to the callback URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub struct AuthUseCase<O, D>
where
    O: OAuthProvider + 'static,
    D: UserDirectoryRepository + Send + Sync + 'static,
{
    provider: Arc<O>,
    directory: Arc<D>,
    session_keys: Arc<SessionKeys>,
}

impl<O, D> AuthUseCase<O, D>
where
    O: OAuthProvider + 'static,
    D: UserDirectoryRepository + Send + Sync + 'static,
{
    pub fn new(provider: Arc<O>, directory: Arc<D>, session_keys: Arc<SessionKeys>) -> Self {
        Self {
            provider,
            directory,
            session_keys,
        }
    }

    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_keys.ttl_seconds()
    }

    pub fn begin_sign_in(&self, redirect_uri: &str) -> AuthResult<SignInRedirect> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LENGTH)
            .map(char::from)
            .collect();

        let authorization_url = self.provider.authorization_url(redirect_uri, &state)?;
        info!(redirect_uri, "auth: sign-in started");

        Ok(SignInRedirect {
            state,
            authorization_url,
        })
    }

    /// Validates the callback, signs the user in and returns a session token.
    pub async fn complete_sign_in(
        &self,
        callback: OAuthCallback,
        expected_state: Option<&str>,
        redirect_uri: &str,
    ) -> AuthResult<IssuedSession> {
        if let Some(error) = callback.error {
            warn!(provider_error = %error, "auth: provider returned an error");
            return Err(AuthFlowError::ProviderDenied(error));
        }

        let code = callback.code.ok_or(AuthFlowError::MissingCode)?;

        match (callback.state.as_deref(), expected_state) {
            (Some(returned), Some(expected)) if returned == expected => {}
            _ => {
                warn!("auth: oauth state mismatch");
                return Err(AuthFlowError::InvalidState);
            }
        }

        let access_token = self
            .provider
            .exchange_code(&code, redirect_uri)
            .await
            .map_err(|err| {
                error!(error = ?err, "auth: failed to exchange authorization code");
                AuthFlowError::TokenExchange(err)
            })?;

        let profile = self
            .provider
            .fetch_profile(&access_token)
            .await
            .map_err(|err| {
                error!(error = ?err, "auth: failed to fetch user profile");
                AuthFlowError::Profile(err)
            })?;

        self.record_sign_in(&profile).await;

        let session = self.session_keys.issue(&SessionProfile {
            user_id: profile.sub.clone(),
            email: profile.email,
            name: profile.name,
            picture: profile.picture,
        })?;

        info!(user_id = %profile.sub, "auth: user signed in");
        Ok(session)
    }

    async fn record_sign_in(&self, profile: &GoogleProfile) {
        let user = DirectoryUser {
            id: profile.sub.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            image: profile.picture.clone(),
            last_seen: Utc::now(),
        };

        if let Err(err) = self.directory.record_sign_in(user).await {
            error!(user_id = %profile.sub, error = ?err, "auth: failed to record sign-in");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::google::MockOAuthProvider;
    use crates::domain::repositories::user_directory::MockUserDirectoryRepository;
    use mockall::predicate::eq;

    fn keys() -> Arc<SessionKeys> {
        Arc::new(SessionKeys::new("unit-test-session-secret", 3600))
    }

    fn profile() -> GoogleProfile {
        GoogleProfile {
            sub: "1001".to_string(),
            email: Some("ada@example.com".to_string()),
            name: Some("Ada".to_string()),
            picture: None,
        }
    }

    fn callback(state: &str) -> OAuthCallback {
        OAuthCallback {
            code: Some("auth-code".to_string()),
            state: Some(state.to_string()),
            error: None,
        }
    }

    #[test]
    fn begin_sign_in_generates_random_state() {
        let mut provider = MockOAuthProvider::new();
        provider
            .expect_authorization_url()
            .times(2)
            .returning(|_, state| Ok(format!("https://accounts.example/auth?state={state}")));

        let usecase = AuthUseCase::new(
            Arc::new(provider),
            Arc::new(MockUserDirectoryRepository::new()),
            keys(),
        );

        let first = usecase.begin_sign_in("http://localhost/cb").unwrap();
        let second = usecase.begin_sign_in("http://localhost/cb").unwrap();

        assert_eq!(first.state.len(), STATE_LENGTH);
        assert!(first.authorization_url.ends_with(&first.state));
        assert_ne!(first.state, second.state);
    }

    #[tokio::test]
    async fn complete_sign_in_records_user_and_issues_session() {
        let mut provider = MockOAuthProvider::new();
        provider
            .expect_exchange_code()
            .with(eq("auth-code"), eq("http://localhost/cb"))
            .returning(|_, _| Ok("access-token".to_string()));
        provider
            .expect_fetch_profile()
            .with(eq("access-token"))
            .returning(|_| Ok(profile()));

        let mut directory = MockUserDirectoryRepository::new();
        directory
            .expect_record_sign_in()
            .withf(|user| user.id == "1001" && user.email.as_deref() == Some("ada@example.com"))
            .times(1)
            .returning(|_| Ok(()));

        let keys = keys();
        let usecase = AuthUseCase::new(Arc::new(provider), Arc::new(directory), Arc::clone(&keys));

        let session = usecase
            .complete_sign_in(callback("xyz"), Some("xyz"), "http://localhost/cb")
            .await
            .unwrap();

        let claims = keys.validate(&session.token).unwrap();
        assert_eq!(claims.sub, "1001");
        assert_eq!(claims.name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn directory_failure_does_not_block_sign_in() {
        let mut provider = MockOAuthProvider::new();
        provider
            .expect_exchange_code()
            .returning(|_, _| Ok("access-token".to_string()));
        provider.expect_fetch_profile().returning(|_| Ok(profile()));

        let mut directory = MockUserDirectoryRepository::new();
        directory
            .expect_record_sign_in()
            .returning(|_| Err(anyhow::anyhow!("disk full")));

        let usecase = AuthUseCase::new(Arc::new(provider), Arc::new(directory), keys());

        assert!(
            usecase
                .complete_sign_in(callback("xyz"), Some("xyz"), "http://localhost/cb")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn state_mismatch_is_rejected_before_exchange() {
        let mut provider = MockOAuthProvider::new();
        provider.expect_exchange_code().never();

        let usecase = AuthUseCase::new(
            Arc::new(provider),
            Arc::new(MockUserDirectoryRepository::new()),
            keys(),
        );

        let err = usecase
            .complete_sign_in(callback("forged"), Some("xyz"), "http://localhost/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthFlowError::InvalidState));
        assert_eq!(err.code(), "InvalidState");

        let err = usecase
            .complete_sign_in(callback("xyz"), None, "http://localhost/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthFlowError::InvalidState));
    }

    #[tokio::test]
    async fn provider_error_and_missing_code_are_reported() {
        let usecase = AuthUseCase::new(
            Arc::new(MockOAuthProvider::new()),
            Arc::new(MockUserDirectoryRepository::new()),
            keys(),
        );

        let denied = OAuthCallback {
            error: Some("access_denied".to_string()),
            ..OAuthCallback::default()
        };
        let err = usecase
            .complete_sign_in(denied, Some("xyz"), "http://localhost/cb")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AccessDenied");

        let no_code = OAuthCallback {
            state: Some("xyz".to_string()),
            ..OAuthCallback::default()
        };
        let err = usecase
            .complete_sign_in(no_code, Some("xyz"), "http://localhost/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthFlowError::MissingCode));
    }
}
