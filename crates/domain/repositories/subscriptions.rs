use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity};
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

#[automock]
#[async_trait]
pub trait SubscriptionRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// Refreshes status and period end of the row holding this subscription id.
    /// Without one, inserts the row, replacing the user's previous subscription.
    async fn upsert_by_provider_subscription_id(
        &self,
        upsert_subscription_entity: UpsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity>;

    /// Returns the number of rows updated.
    async fn update_status_and_period_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
        status: String,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Result<usize>;

    async fn update_status_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<usize>;

    async fn update_status_by_customer_id(
        &self,
        provider_customer_id: &str,
        status: SubscriptionStatus,
    ) -> Result<usize>;
}
