use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::json_file;
use crate::domain::{
    repositories::user_directory::UserDirectoryRepository,
    value_objects::user_directory::DirectoryUser,
};

pub const USERS_FILE_NAME: &str = "users.json";

/// Flat-file user directory stored as a JSON array.
pub struct UserDirectoryFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserDirectoryFile {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(USERS_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Vec<DirectoryUser> {
        json_file::read_or_default(&self.path).await
    }
}

#[async_trait]
impl UserDirectoryRepository for UserDirectoryFile {
    async fn record_sign_in(&self, user: DirectoryUser) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut users = self.read_all().await;
        match users.iter_mut().find(|existing| existing.id == user.id) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }

        json_file::write_atomic(&self.path, &users).await
    }

    async fn list_users(&self) -> Result<Vec<DirectoryUser>> {
        let mut users = self.read_all().await;
        users.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(users)
    }

    async fn count_users(&self) -> Result<usize> {
        Ok(self.read_all().await.len())
    }
}
