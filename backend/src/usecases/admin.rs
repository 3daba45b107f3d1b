use std::sync::Arc;

use crates::domain::{
    repositories::{analytics::AnalyticsRepository, user_directory::UserDirectoryRepository},
    value_objects::{
        analytics::AnalyticsDto,
        user_directory::{DirectoryRole, DirectoryUserDto, UsersListDto},
    },
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::auth::AuthUser;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AdminError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AdminError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type AdminResult<T> = std::result::Result<T, AdminError>;

pub struct AdminUseCase<D, A>
where
    D: UserDirectoryRepository + Send + Sync + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    directory_repo: Arc<D>,
    analytics_repo: Arc<A>,
    admin_email: String,
}

impl<D, A> AdminUseCase<D, A>
where
    D: UserDirectoryRepository + Send + Sync + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    pub fn new(directory_repo: Arc<D>, analytics_repo: Arc<A>, admin_email: String) -> Self {
        Self {
            directory_repo,
            analytics_repo,
            admin_email,
        }
    }

    pub fn is_admin(&self, email: Option<&str>) -> bool {
        email.is_some_and(|email| email.eq_ignore_ascii_case(&self.admin_email))
    }

    pub async fn list_users(&self, auth: &AuthUser) -> AdminResult<UsersListDto> {
        let users = self.directory_repo.list_users().await.map_err(|err| {
            error!(user_id = %auth.user_id, error = ?err, "admin: failed to list users");
            AdminError::Internal(err)
        })?;

        let users: Vec<DirectoryUserDto> = users
            .into_iter()
            .map(|user| {
                let role = if self.is_admin(user.email.as_deref()) {
                    DirectoryRole::Admin
                } else {
                    DirectoryRole::User
                };
                DirectoryUserDto::new(user, role)
            })
            .collect();

        info!(user_id = %auth.user_id, total = users.len(), "admin: users listed");

        Ok(UsersListDto {
            total: users.len(),
            users,
            current_user: auth
                .email
                .clone()
                .or_else(|| auth.name.clone())
                .unwrap_or_else(|| auth.user_id.clone()),
        })
    }

    pub async fn analytics(&self, auth: &AuthUser) -> AdminResult<AnalyticsDto> {
        if !self.is_admin(auth.email.as_deref()) {
            warn!(user_id = %auth.user_id, "admin: analytics requested by non-admin");
            return Err(AdminError::Unauthorized);
        }

        let snapshot = self.analytics_repo.load().await.map_err(|err| {
            error!(error = ?err, "admin: failed to load analytics");
            AdminError::Internal(err)
        })?;

        let total_users = self.directory_repo.count_users().await.map_err(|err| {
            error!(error = ?err, "admin: failed to count users");
            AdminError::Internal(err)
        })?;

        Ok(AnalyticsDto {
            snapshot,
            total_users,
        })
    }
}
