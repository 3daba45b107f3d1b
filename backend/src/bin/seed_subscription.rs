//! Seeds a user with an active test subscription so the paywalled routes can
//! be exercised without going through checkout.

use std::sync::Arc;

use anyhow::{Context, Result};
use backend::config::config_loader;
use chrono::{Duration, Utc};
use clap::Parser;
use crates::{
    domain::{
        entities::{subscriptions::UpsertSubscriptionEntity, users::InsertUserEntity},
        repositories::{subscriptions::SubscriptionRepository, users::UserRepository},
        value_objects::enums::subscription_statuses::SubscriptionStatus,
    },
    infra::db::{
        postgres::postgres_connection,
        repositories::{subscriptions::SubscriptionPostgres, users::UserPostgres},
    },
};
use tracing::{error, info, warn};

const TEST_SUBSCRIPTION_ID: &str = "sub_test_123";
const TEST_CUSTOMER_ID: &str = "cus_test_123";
const PERIOD_DAYS: i64 = 30;

#[derive(Debug, Parser)]
#[command(name = "seed_subscription", about = "Give a user an active test subscription")]
struct Args {
    /// Email of the user to seed
    #[arg(long)]
    email: String,

    /// Display name used when the user is created
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("seed_subscription exited with error: {:?}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    crates::observability::init_observability("seed_subscription")?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is invalid")?;
    let db_pool = Arc::new(postgres_connection::establish_connection(&database_url)?);
    info!(stage = %config_loader::get_stage(), "seed: connected to postgres");

    let user_repository = UserPostgres::new(Arc::clone(&db_pool));
    let subscription_repository = SubscriptionPostgres::new(db_pool);

    let user = user_repository
        .upsert_by_email(InsertUserEntity {
            email: args.email.clone(),
            name: args.name,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "seed: user ready");

    let subscription = subscription_repository
        .upsert_by_provider_subscription_id(UpsertSubscriptionEntity {
            user_id: user.id,
            stripe_customer_id: TEST_CUSTOMER_ID.to_string(),
            stripe_subscription_id: TEST_SUBSCRIPTION_ID.to_string(),
            status: SubscriptionStatus::Active.to_string(),
            current_period_end: Utc::now() + Duration::days(PERIOD_DAYS),
        })
        .await?;

    if subscription.user_id != user.id {
        warn!(
            user_id = %user.id,
            owner_id = %subscription.user_id,
            subscription_id = %subscription.stripe_subscription_id,
            "seed: test subscription already belongs to another user, refreshed it in place"
        );
        return Ok(());
    }

    info!(
        user_id = %user.id,
        subscription_id = %subscription.stripe_subscription_id,
        current_period_end = %subscription.current_period_end,
        "seed: active subscription created"
    );

    Ok(())
}
