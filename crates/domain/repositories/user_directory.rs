use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::user_directory::DirectoryUser;

#[automock]
#[async_trait]
pub trait UserDirectoryRepository {
    /// Inserts the user or refreshes its profile and `last_seen`.
    async fn record_sign_in(&self, user: DirectoryUser) -> Result<()>;

    /// Users ordered by most recently seen.
    async fn list_users(&self) -> Result<Vec<DirectoryUser>>;

    async fn count_users(&self) -> Result<usize>;
}
