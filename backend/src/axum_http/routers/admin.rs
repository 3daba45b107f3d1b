use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
};
use crates::domain::repositories::{
    analytics::AnalyticsRepository, user_directory::UserDirectoryRepository,
};

use crate::{auth::AuthUser, usecases::admin::AdminUseCase};

pub fn routes<D, A>(admin_usecase: Arc<AdminUseCase<D, A>>) -> Router
where
    D: UserDirectoryRepository + Send + Sync + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/users", get(list_users::<D, A>))
        .route("/analytics", get(analytics::<D, A>))
        .with_state(admin_usecase)
}

pub async fn list_users<D, A>(
    State(admin_usecase): State<Arc<AdminUseCase<D, A>>>,
    auth: AuthUser,
) -> Response
where
    D: UserDirectoryRepository + Send + Sync + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    match admin_usecase.list_users(&auth).await {
        Ok(users) => Json(users).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn analytics<D, A>(
    State(admin_usecase): State<Arc<AdminUseCase<D, A>>>,
    auth: AuthUser,
) -> Response
where
    D: UserDirectoryRepository + Send + Sync + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    match admin_usecase.analytics(&auth).await {
        Ok(analytics) => Json(analytics).into_response(),
        Err(err) => err.into_response(),
    }
}
