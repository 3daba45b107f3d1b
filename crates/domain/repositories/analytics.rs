use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use mockall::automock;

use crate::domain::value_objects::{
    analytics::AnalyticsSnapshot, enums::calculation_kinds::CalculationKind,
};

#[automock]
#[async_trait]
pub trait AnalyticsRepository {
    async fn record_calculation(&self, kind: CalculationKind, day: NaiveDate) -> Result<()>;

    async fn load(&self) -> Result<AnalyticsSnapshot>;
}
