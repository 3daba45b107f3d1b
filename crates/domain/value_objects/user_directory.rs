use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A signed-in account as kept in the flat-file user directory (`users.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryRole {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUserDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub role: DirectoryRole,
}

impl DirectoryUserDto {
    pub fn new(user: DirectoryUser, role: DirectoryRole) -> Self {
        Self {
            id: user.id,
            name: user.name.unwrap_or_else(|| "Unknown".to_string()),
            email: user.email.unwrap_or_else(|| "No email".to_string()),
            image: user.image,
            last_seen: user.last_seen,
            role,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsersListDto {
    pub users: Vec<DirectoryUserDto>,
    pub total: usize,
    pub current_user: String,
}
