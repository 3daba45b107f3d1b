use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::subscriptions::SubscriptionEntity;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDto {
    pub id: Uuid,
    pub status: String,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub current_period_end: DateTime<Utc>,
}

impl From<SubscriptionEntity> for SubscriptionDto {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            status: value.status,
            stripe_customer_id: value.stripe_customer_id,
            stripe_subscription_id: value.stripe_subscription_id,
            current_period_end: value.current_period_end,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusDto {
    pub has_active_subscription: bool,
    pub subscription: Option<SubscriptionDto>,
}

impl SubscriptionStatusDto {
    pub fn none() -> Self {
        Self {
            has_active_subscription: false,
            subscription: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub price_id: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionIdQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckoutSessionSummary {
    pub id: String,
    pub payment_status: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VerifySessionResponse {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub customer_email: Option<String>,
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PricingPlanDto {
    pub name: &'static str,
    pub price: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_id: Option<String>,
    pub features: Vec<&'static str>,
    pub current: bool,
}
