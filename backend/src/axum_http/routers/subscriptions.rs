use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use crates::domain::{
    repositories::{subscriptions::SubscriptionRepository, users::UserRepository},
    value_objects::subscriptions::{CreateCheckoutRequest, CreateCheckoutResponse, SessionIdQuery},
};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    auth::AuthUser,
    axum_http::{
        error_responses::{json_error, json_error_message},
        routers::public_base_url,
    },
    usecases::subscriptions::{StripeGateway, SubscriptionError, SubscriptionUseCase},
};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub struct SubscriptionRouterState<U, S, Stripe>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    pub subscriptions_usecase: Arc<SubscriptionUseCase<U, S, Stripe>>,
    pub app_url: Option<String>,
}

type RouterState<U, S, Stripe> = State<Arc<SubscriptionRouterState<U, S, Stripe>>>;

pub fn routes<U, S, Stripe>(state: Arc<SubscriptionRouterState<U, S, Stripe>>) -> Router
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    Router::new()
        .route("/user/subscription", get(user_subscription::<U, S, Stripe>))
        .route(
            "/create-checkout-session",
            post(create_checkout_session::<U, S, Stripe>),
        )
        .route("/checkout-session", get(checkout_session::<U, S, Stripe>))
        .route("/verify-session", get(verify_session::<U, S, Stripe>))
        .route("/webhook", post(stripe_webhook::<U, S, Stripe>))
        .route("/pricing", get(pricing::<U, S, Stripe>))
        .with_state(state)
}

pub async fn user_subscription<U, S, Stripe>(
    State(state): RouterState<U, S, Stripe>,
    auth: Option<AuthUser>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    let email = auth.and_then(|auth| auth.email);
    Json(
        state
            .subscriptions_usecase
            .check_subscription(email.as_deref())
            .await,
    )
}

pub async fn create_checkout_session<U, S, Stripe>(
    State(state): RouterState<U, S, Stripe>,
    auth: Option<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    let request = payload.map(|Json(request)| request).unwrap_or_else(|rejection| {
        debug!(error = %rejection, "subscriptions router: unreadable checkout body");
        CreateCheckoutRequest::default()
    });
    let base_url = public_base_url(state.app_url.as_deref(), &headers);

    match state
        .subscriptions_usecase
        .create_checkout_session(request, auth.and_then(|auth| auth.email), &base_url)
        .await
    {
        Ok(url) => Json(CreateCheckoutResponse { url }).into_response(),
        Err(err @ SubscriptionError::MissingPriceId) => {
            (err.status_code(), err.to_string()).into_response()
        }
        Err(err) => {
            let details = state.subscriptions_usecase.error_details(&err);
            json_error_message(err.status_code(), err.to_string(), details)
        }
    }
}

pub async fn checkout_session<U, S, Stripe>(
    State(state): RouterState<U, S, Stripe>,
    Query(query): Query<SessionIdQuery>,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    match state
        .subscriptions_usecase
        .checkout_session_summary(query.session_id)
        .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(err @ SubscriptionError::MissingSessionId) => {
            json_error(err.status_code(), err.to_string())
        }
        Err(err) => json_error_message(err.status_code(), err.to_string(), None),
    }
}

pub async fn verify_session<U, S, Stripe>(
    State(state): RouterState<U, S, Stripe>,
    Query(query): Query<SessionIdQuery>,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    match state
        .subscriptions_usecase
        .verify_session(query.session_id)
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(SubscriptionError::MissingSessionId) => {
            (StatusCode::BAD_REQUEST, "Session ID is required").into_response()
        }
        Err(err) => json_error(err.status_code(), err.to_string()),
    }
}

pub async fn stripe_webhook<U, S, Stripe>(
    State(state): RouterState<U, S, Stripe>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state
        .subscriptions_usecase
        .handle_stripe_webhook(&body, signature)
        .await
    {
        Ok(()) => {
            info!("subscriptions router: stripe webhook acknowledged");
            Json(json!({ "received": true })).into_response()
        }
        Err(err) => json_error(err.status_code(), err.to_string()),
    }
}

pub async fn pricing<U, S, Stripe>(
    State(state): RouterState<U, S, Stripe>,
    auth: Option<AuthUser>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    let status = match auth {
        Some(auth) => Some(
            state
                .subscriptions_usecase
                .check_subscription(auth.email.as_deref())
                .await,
        ),
        None => None,
    };

    Json(state.subscriptions_usecase.pricing(status.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::SessionKeys, usecases::subscriptions::MockStripeGateway};
    use axum::{Extension, body::Body, http::Request};
    use crates::{
        domain::repositories::{
            subscriptions::MockSubscriptionRepository, users::MockUserRepository,
        },
        payments::stripe_client::{StripeEvent, StripeEventData},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(stripe: MockStripeGateway, expose_error_details: bool) -> Router {
        let usecase = Arc::new(SubscriptionUseCase::new(
            Arc::new(MockUserRepository::new()),
            Arc::new(MockSubscriptionRepository::new()),
            Arc::new(stripe),
            Some("price_pro".to_string()),
            expose_error_details,
        ));

        routes(Arc::new(SubscriptionRouterState {
            subscriptions_usecase: usecase,
            app_url: Some("https://calc.test".to_string()),
        }))
        .layer(Extension(Arc::new(SessionKeys::new("router-test-secret", 3600))))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str, headers: &[(&str, &str)], body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn checkout_without_price_id_is_plain_text() {
        let mut stripe = MockStripeGateway::new();
        stripe.expect_create_checkout_session().never();

        let response = app(stripe, false)
            .oneshot(post_request(
                "/create-checkout-session",
                &[("content-type", "application/json")],
                r#"{"userEmail":"buyer@example.com"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Price ID is required");
    }

    #[tokio::test]
    async fn checkout_returns_url_built_from_app_url() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_create_checkout_session()
            .withf(|params| {
                params.price_id == "price_pro"
                    && params.success_url
                        == "https://calc.test/success?session_id={CHECKOUT_SESSION_ID}"
                    && params.cancel_url == "https://calc.test/pricing"
            })
            .times(1)
            .returning(|_| Ok("https://checkout.stripe.test/c/pay/cs_1".to_string()));

        let response = app(stripe, false)
            .oneshot(post_request(
                "/create-checkout-session",
                &[("content-type", "application/json")],
                r#"{"priceId":"price_pro"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "url": "https://checkout.stripe.test/c/pay/cs_1" })
        );
    }

    #[tokio::test]
    async fn checkout_failure_uses_message_envelope() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_create_checkout_session()
            .returning(|_| Err(anyhow::anyhow!("No such price: 'price_pro'")));

        let response = app(stripe, true)
            .oneshot(post_request(
                "/create-checkout-session",
                &[("content-type", "application/json")],
                r#"{"priceId":"price_pro"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], json!("No such price: 'price_pro'"));
        assert!(
            body["error"]["details"]
                .as_str()
                .is_some_and(|details| details.contains("No such price"))
        );
    }

    #[tokio::test]
    async fn checkout_failure_hides_details_outside_development() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_create_checkout_session()
            .returning(|_| Err(anyhow::anyhow!("api key expired")));

        let response = app(stripe, false)
            .oneshot(post_request(
                "/create-checkout-session",
                &[("content-type", "application/json")],
                r#"{"priceId":"price_pro"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(
            body_json(response).await,
            json!({ "error": { "message": "api key expired" } })
        );
    }

    #[tokio::test]
    async fn checkout_session_without_id_is_json_error() {
        let mut stripe = MockStripeGateway::new();
        stripe.expect_retrieve_checkout_session().never();

        let response = app(stripe, false)
            .oneshot(get_request("/checkout-session"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Missing session_id parameter" })
        );
    }

    #[tokio::test]
    async fn checkout_session_lookup_failure_uses_message_envelope() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_retrieve_checkout_session()
            .returning(|_, _| Err(anyhow::anyhow!("invalid checkout session id")));

        let response = app(stripe, false)
            .oneshot(get_request("/checkout-session?session_id=..%2Fcustomers"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": { "message": "invalid checkout session id" } })
        );
    }

    #[tokio::test]
    async fn verify_session_without_id_is_plain_text() {
        let mut stripe = MockStripeGateway::new();
        stripe.expect_retrieve_checkout_session().never();

        let response = app(stripe, false)
            .oneshot(get_request("/verify-session?session_id=%20"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Session ID is required");
    }

    #[tokio::test]
    async fn webhook_without_signature_is_rejected() {
        let mut stripe = MockStripeGateway::new();
        stripe.expect_verify_webhook_signature().never();

        let response = app(stripe, false)
            .oneshot(post_request("/webhook", &[], "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Missing stripe-signature header" })
        );
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_rejected() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_verify_webhook_signature()
            .returning(|_, _| Err(anyhow::anyhow!("invalid webhook signature")));

        let response = app(stripe, false)
            .oneshot(post_request(
                "/webhook",
                &[(STRIPE_SIGNATURE_HEADER, "t=1,v1=deadbeef")],
                "{}",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({ "error": "Invalid signature" }));
    }

    #[tokio::test]
    async fn webhook_acknowledges_verified_events() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_verify_webhook_signature()
            .withf(|payload, signature| {
                payload.to_vec() == br#"{"id":"evt_1"}"#.to_vec() && signature == "t=1,v1=ok"
            })
            .times(1)
            .returning(|_, _| {
                Ok(StripeEvent {
                    id: Some("evt_1".to_string()),
                    type_: "customer.created".to_string(),
                    created: None,
                    livemode: Some(false),
                    data: StripeEventData {
                        object: json!({ "id": "cus_1" }),
                    },
                })
            });

        let response = app(stripe, false)
            .oneshot(post_request(
                "/webhook",
                &[(STRIPE_SIGNATURE_HEADER, "t=1,v1=ok")],
                r#"{"id":"evt_1"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "received": true }));
    }

    #[tokio::test]
    async fn pricing_is_public() {
        let response = app(MockStripeGateway::new(), false)
            .oneshot(get_request("/pricing"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(2));
    }
}
