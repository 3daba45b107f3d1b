use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use crates::domain::repositories::{
    subscriptions::SubscriptionRepository, users::UserRepository,
};
use tracing::info;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::AppError,
    usecases::subscriptions::{StripeGateway, SubscriptionUseCase},
};

/// Lets the request through only for signed-in users with an active subscription.
pub async fn require_active_subscription<U, S, Stripe>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<U, S, Stripe>>>,
    auth: Option<AuthUser>,
    request: Request,
    next: Next,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    let Some(auth) = auth else {
        return AppError::Unauthorized.into_response();
    };

    let status = subscriptions_usecase
        .check_subscription(auth.email.as_deref())
        .await;

    if !status.has_active_subscription {
        info!(
            user_id = %auth.user_id,
            path = %request.uri().path(),
            "paywall: active subscription required"
        );
        return AppError::PaymentRequired.into_response();
    }

    next.run(request).await
}
