use std::sync::Arc;

use anyhow::{Context, Result as AnyResult, anyhow};
use async_trait::async_trait;
use crates::{
    domain::{
        entities::{subscriptions::UpsertSubscriptionEntity, users::InsertUserEntity},
        repositories::{subscriptions::SubscriptionRepository, users::UserRepository},
        value_objects::{
            enums::subscription_statuses::SubscriptionStatus,
            subscriptions::{
                CheckoutSessionSummary, CreateCheckoutRequest, PricingPlanDto, SubscriptionDto,
                SubscriptionStatusDto, VerifySessionResponse,
            },
        },
    },
    payments::stripe_client::{
        CheckoutSessionParams, Expandable, StripeCheckoutSession, StripeClient, StripeEvent,
        StripeInvoice, StripeSubscription,
    },
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const SUCCESS_PATH: &str = "/success?session_id={CHECKOUT_SESSION_ID}";
pub const CANCEL_PATH: &str = "/pricing";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StripeGateway: Send + Sync {
    async fn create_checkout_session(&self, params: CheckoutSessionParams) -> AnyResult<String>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
        expand_subscription: bool,
    ) -> AnyResult<StripeCheckoutSession>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription>;

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent>;
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn create_checkout_session(&self, params: CheckoutSessionParams) -> AnyResult<String> {
        self.create_checkout_session(params).await
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
        expand_subscription: bool,
    ) -> AnyResult<StripeCheckoutSession> {
        self.retrieve_checkout_session(session_id, expand_subscription)
            .await
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription> {
        self.retrieve_subscription(subscription_id).await
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent> {
        self.verify_webhook_signature(payload, signature)
    }
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Price ID is required")]
    MissingPriceId,
    #[error("Missing session_id parameter")]
    MissingSessionId,
    #[error("Missing stripe-signature header")]
    MissingSignature,
    #[error("Invalid signature")]
    InvalidWebhook,
    #[error("Webhook processing failed")]
    WebhookProcessing(#[source] anyhow::Error),
    #[error("{0}")]
    Stripe(#[source] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::MissingPriceId
            | SubscriptionError::MissingSessionId
            | SubscriptionError::MissingSignature
            | SubscriptionError::InvalidWebhook => StatusCode::BAD_REQUEST,
            SubscriptionError::WebhookProcessing(_) | SubscriptionError::Stripe(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

pub struct SubscriptionUseCase<U, S, Stripe>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    user_repo: Arc<U>,
    subscription_repo: Arc<S>,
    stripe_client: Arc<Stripe>,
    pro_price_id: Option<String>,
    expose_error_details: bool,
}

impl<U, S, Stripe> SubscriptionUseCase<U, S, Stripe>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    pub fn new(
        user_repo: Arc<U>,
        subscription_repo: Arc<S>,
        stripe_client: Arc<Stripe>,
        pro_price_id: Option<String>,
        expose_error_details: bool,
    ) -> Self {
        Self {
            user_repo,
            subscription_repo,
            stripe_client,
            pro_price_id,
            expose_error_details,
        }
    }

    /// Error chain for client responses; only available in development.
    pub fn error_details(&self, err: &SubscriptionError) -> Option<String> {
        self.expose_error_details.then(|| format!("{err:?}"))
    }

    /// Subscription state of the signed-in user. Lookup failures read as "no subscription".
    pub async fn check_subscription(&self, email: Option<&str>) -> SubscriptionStatusDto {
        let Some(email) = email else {
            debug!("subscriptions: anonymous subscription check");
            return SubscriptionStatusDto::none();
        };

        match self.load_subscription(email).await {
            Ok(Some(subscription)) => SubscriptionStatusDto {
                has_active_subscription: SubscriptionStatus::grants_access(&subscription.status),
                subscription: Some(subscription),
            },
            Ok(None) => {
                debug!(email, "subscriptions: no subscription on record");
                SubscriptionStatusDto::none()
            }
            Err(err) => {
                error!(email, db_error = ?err, "subscriptions: failed to check subscription");
                SubscriptionStatusDto::none()
            }
        }
    }

    async fn load_subscription(&self, email: &str) -> AnyResult<Option<SubscriptionDto>> {
        let Some(user) = self.user_repo.find_by_email(email).await? else {
            return Ok(None);
        };

        let subscription = self.subscription_repo.find_by_user_id(user.id).await?;
        Ok(subscription.map(SubscriptionDto::from))
    }

    pub async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
        session_email: Option<String>,
        base_url: &str,
    ) -> UseCaseResult<String> {
        let price_id = request
            .price_id
            .filter(|price_id| !price_id.trim().is_empty())
            .ok_or_else(|| {
                warn!("subscriptions: checkout requested without a price id");
                SubscriptionError::MissingPriceId
            })?;

        let customer_email = request
            .user_email
            .filter(|email| !email.trim().is_empty())
            .or(session_email);

        let base_url = base_url.trim_end_matches('/');
        let params = CheckoutSessionParams {
            price_id: price_id.clone(),
            customer_email: customer_email.clone(),
            success_url: format!("{base_url}{SUCCESS_PATH}"),
            cancel_url: format!("{base_url}{CANCEL_PATH}"),
        };

        info!(
            price_id = %price_id,
            customer_email = ?customer_email,
            "subscriptions: creating checkout session"
        );

        let checkout_url = self
            .stripe_client
            .create_checkout_session(params)
            .await
            .map_err(|err| {
                error!(
                    price_id = %price_id,
                    error = ?err,
                    "subscriptions: stripe checkout session creation failed"
                );
                SubscriptionError::Stripe(err)
            })?;

        info!(
            price_id = %price_id,
            checkout_url = %checkout_url,
            "subscriptions: checkout session created successfully"
        );

        Ok(checkout_url)
    }

    pub async fn checkout_session_summary(
        &self,
        session_id: Option<String>,
    ) -> UseCaseResult<CheckoutSessionSummary> {
        let session_id = non_blank(session_id).ok_or(SubscriptionError::MissingSessionId)?;

        let session = self
            .stripe_client
            .retrieve_checkout_session(&session_id, false)
            .await
            .map_err(|err| {
                error!(%session_id, error = ?err, "subscriptions: failed to retrieve checkout session");
                SubscriptionError::Stripe(err)
            })?;

        Ok(CheckoutSessionSummary {
            id: session.id,
            payment_status: session.payment_status,
            customer: session.customer.map(|customer| customer.id().to_string()),
            subscription: session
                .subscription
                .map(|subscription| subscription.id().to_string()),
            amount_total: session.amount_total,
            currency: session.currency,
            customer_email: session.customer_email,
        })
    }

    /// Confirms a finished checkout from the success page and records the
    /// subscription when the webhook has not done so yet.
    pub async fn verify_session(
        &self,
        session_id: Option<String>,
    ) -> UseCaseResult<VerifySessionResponse> {
        let session_id = non_blank(session_id).ok_or(SubscriptionError::MissingSessionId)?;

        let session = self
            .stripe_client
            .retrieve_checkout_session(&session_id, true)
            .await
            .map_err(|err| {
                error!(%session_id, error = ?err, "subscriptions: failed to retrieve checkout session");
                SubscriptionError::Stripe(err)
            })?;

        let subscription_id = session
            .subscription
            .as_ref()
            .map(|subscription| subscription.id().to_string());

        if session.is_paid() {
            match (session.details_email_first(), subscription_id.as_deref()) {
                (Some(email), Some(subscription_id)) => {
                    if let Err(err) = self
                        .record_checkout(&session, &email, subscription_id)
                        .await
                    {
                        error!(
                            %session_id,
                            %email,
                            db_error = ?err,
                            "subscriptions: failed to record verified checkout"
                        );
                    }
                }
                _ => {
                    warn!(%session_id, "subscriptions: paid session lacks email or subscription");
                }
            }
        } else {
            info!(
                %session_id,
                status = ?session.status,
                payment_status = ?session.payment_status,
                "subscriptions: checkout session not yet paid"
            );
        }

        Ok(VerifySessionResponse {
            status: session.status.clone(),
            payment_status: session.payment_status.clone(),
            customer_email: session
                .customer_details
                .as_ref()
                .and_then(|details| details.email.clone()),
            subscription_id,
        })
    }

    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> UseCaseResult<()> {
        let signature = signature.ok_or_else(|| {
            warn!("subscriptions: stripe webhook without signature header");
            SubscriptionError::MissingSignature
        })?;

        let event = self
            .stripe_client
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                warn!(
                    error = %err,
                    status = SubscriptionError::InvalidWebhook.status_code().as_u16(),
                    "subscriptions: stripe webhook verification failed"
                );
                SubscriptionError::InvalidWebhook
            })?;

        let event_type = event.type_.clone();
        info!(event_type = %event_type, event_id = ?event.id, "subscriptions: stripe webhook verified");

        let outcome = match event_type.as_str() {
            "checkout.session.completed" => self.handle_checkout_completed(&event).await,
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.handle_subscription_changed(&event).await
            }
            "customer.subscription.deleted" => self.handle_subscription_deleted(&event).await,
            "invoice.payment_succeeded" => self.handle_invoice_paid(&event).await,
            "invoice.payment_failed" => self.handle_invoice_failed(&event).await,
            _ => {
                debug!(event_type = %event_type, "subscriptions: unhandled stripe event type");
                Ok(())
            }
        };

        outcome.map_err(|err| {
            error!(
                event_type = %event_type,
                error = ?err,
                "subscriptions: stripe webhook processing failed"
            );
            SubscriptionError::WebhookProcessing(err)
        })
    }

    async fn handle_checkout_completed(&self, event: &StripeEvent) -> AnyResult<()> {
        let session: StripeCheckoutSession = event_object(event)?;

        let Some(email) = session.customer_email_first() else {
            error!(session_id = %session.id, "subscriptions: no email found in checkout session");
            return Ok(());
        };

        let subscription_id = session
            .subscription
            .as_ref()
            .map(Expandable::id)
            .context("checkout session has no subscription")?;

        self.record_checkout(&session, &email, subscription_id)
            .await?;

        info!(%email, "subscriptions: checkout session completed");
        Ok(())
    }

    async fn handle_subscription_changed(&self, event: &StripeEvent) -> AnyResult<()> {
        let subscription: StripeSubscription = event_object(event)?;

        let updated = self
            .subscription_repo
            .update_status_and_period_by_provider_subscription_id(
                &subscription.id,
                subscription.status.clone(),
                subscription.period_end_at(),
            )
            .await?;

        info!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            updated,
            "subscriptions: subscription changed"
        );
        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: &StripeEvent) -> AnyResult<()> {
        let subscription: StripeSubscription = event_object(event)?;

        let updated = self
            .subscription_repo
            .update_status_by_provider_subscription_id(
                &subscription.id,
                SubscriptionStatus::Canceled,
            )
            .await?;

        info!(subscription_id = %subscription.id, updated, "subscriptions: subscription canceled");
        Ok(())
    }

    async fn handle_invoice_paid(&self, event: &StripeEvent) -> AnyResult<()> {
        let invoice: StripeInvoice = event_object(event)?;

        if let Some(subscription_id) = invoice.subscription.as_ref().map(Expandable::id) {
            let subscription = self
                .stripe_client
                .retrieve_subscription(subscription_id)
                .await?;

            self.subscription_repo
                .update_status_and_period_by_provider_subscription_id(
                    &subscription.id,
                    subscription.status.clone(),
                    subscription.period_end_at(),
                )
                .await?;
        }

        info!(invoice_id = ?invoice.id, "subscriptions: invoice payment succeeded");
        Ok(())
    }

    async fn handle_invoice_failed(&self, event: &StripeEvent) -> AnyResult<()> {
        let invoice: StripeInvoice = event_object(event)?;

        if invoice.subscription.is_some() {
            if let Some(customer_id) = invoice.customer.as_ref().map(Expandable::id) {
                self.subscription_repo
                    .update_status_by_customer_id(customer_id, SubscriptionStatus::PastDue)
                    .await?;
            } else {
                warn!(invoice_id = ?invoice.id, "subscriptions: failed invoice has no customer");
            }
        }

        warn!(invoice_id = ?invoice.id, "subscriptions: invoice payment failed");
        Ok(())
    }

    /// Upserts the buyer and the subscription behind a completed checkout.
    async fn record_checkout(
        &self,
        session: &StripeCheckoutSession,
        email: &str,
        subscription_id: &str,
    ) -> AnyResult<()> {
        let user = self
            .user_repo
            .upsert_by_email(InsertUserEntity {
                email: email.to_string(),
                name: session.customer_name(),
            })
            .await?;

        let subscription = self
            .stripe_client
            .retrieve_subscription(subscription_id)
            .await?;

        let stripe_customer_id = session
            .customer
            .as_ref()
            .or(subscription.customer.as_ref())
            .map(|customer| customer.id().to_string())
            .context("checkout session has no customer")?;

        let current_period_end = subscription
            .period_end_at()
            .ok_or_else(|| anyhow!("subscription {} has no period end", subscription.id))?;

        self.subscription_repo
            .upsert_by_provider_subscription_id(UpsertSubscriptionEntity {
                user_id: user.id,
                stripe_customer_id,
                stripe_subscription_id: subscription.id.clone(),
                status: subscription.status.clone(),
                current_period_end,
            })
            .await?;

        info!(
            user_id = %user.id,
            subscription_id = %subscription.id,
            status = %subscription.status,
            "subscriptions: subscription recorded"
        );
        Ok(())
    }

    /// Plan catalogue; `current` marks the caller's plan when signed in.
    pub fn pricing(&self, status: Option<&SubscriptionStatusDto>) -> Vec<PricingPlanDto> {
        let is_pro = status.is_some_and(|status| status.has_active_subscription);

        vec![
            PricingPlanDto {
                name: "Basic",
                price: "Free",
                price_id: None,
                features: vec!["Basic calculations", "Basic functions", "Limited API access"],
                current: status.is_some() && !is_pro,
            },
            PricingPlanDto {
                name: "Pro",
                price: "$6.99",
                price_id: self.pro_price_id.clone(),
                features: vec![
                    "Advanced calculations",
                    "All functions",
                    "Full API access",
                    "Priority support",
                ],
                current: is_pro,
            },
        ]
    }
}

fn event_object<T: DeserializeOwned>(event: &StripeEvent) -> AnyResult<T> {
    serde_json::from_value(event.data.object.clone())
        .with_context(|| format!("invalid {} payload", event.type_))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
