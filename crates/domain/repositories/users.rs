use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::users::{InsertUserEntity, UserEntity};

#[automock]
#[async_trait]
pub trait UserRepository {
    /// Returns the user with this email, creating it when absent. An existing
    /// row keeps its name.
    async fn upsert_by_email(&self, insert_user_entity: InsertUserEntity) -> Result<UserEntity>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>>;
}
