use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update, upsert::excluded};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity},
        repositories::subscriptions::SubscriptionRepository,
        value_objects::enums::subscription_statuses::SubscriptionStatus,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(subscription)
    }

    async fn upsert_by_provider_subscription_id(
        &self,
        upsert_subscription_entity: UpsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let refreshed = update(subscriptions::table)
                .filter(
                    subscriptions::stripe_subscription_id
                        .eq(&upsert_subscription_entity.stripe_subscription_id),
                )
                .set((
                    subscriptions::status.eq(&upsert_subscription_entity.status),
                    subscriptions::current_period_end
                        .eq(upsert_subscription_entity.current_period_end),
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .returning(SubscriptionEntity::as_returning())
                .get_result::<SubscriptionEntity>(conn)
                .optional()?;

            if let Some(subscription) = refreshed {
                return Ok(subscription);
            }

            // A user holds one row, so a new subscription replaces the old billing ids.
            insert_into(subscriptions::table)
                .values(&upsert_subscription_entity)
                .on_conflict(subscriptions::user_id)
                .do_update()
                .set((
                    subscriptions::stripe_customer_id
                        .eq(excluded(subscriptions::stripe_customer_id)),
                    subscriptions::stripe_subscription_id
                        .eq(excluded(subscriptions::stripe_subscription_id)),
                    subscriptions::status.eq(excluded(subscriptions::status)),
                    subscriptions::current_period_end
                        .eq(excluded(subscriptions::current_period_end)),
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .returning(SubscriptionEntity::as_returning())
                .get_result::<SubscriptionEntity>(conn)
        })?;

        Ok(subscription)
    }

    async fn update_status_and_period_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
        status: String,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let target = subscriptions::table
            .filter(subscriptions::stripe_subscription_id.eq(provider_subscription_id));

        let updated = match current_period_end {
            Some(current_period_end) => update(target)
                .set((
                    subscriptions::status.eq(status),
                    subscriptions::current_period_end.eq(current_period_end),
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)?,
            None => update(target)
                .set((
                    subscriptions::status.eq(status),
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)?,
        };

        Ok(updated)
    }

    async fn update_status_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(subscriptions::table)
            .filter(subscriptions::stripe_subscription_id.eq(provider_subscription_id))
            .set((
                subscriptions::status.eq(status.to_string()),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated)
    }

    async fn update_status_by_customer_id(
        &self,
        provider_customer_id: &str,
        status: SubscriptionStatus,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(subscriptions::table)
            .filter(subscriptions::stripe_customer_id.eq(provider_customer_id))
            .set((
                subscriptions::status.eq(status.to_string()),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated)
    }
}
