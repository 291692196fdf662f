use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub profile_picture: Option<String>,
    pub is_google_user: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Only OAuth-only accounts may have a password added after the fact.
    pub fn can_bootstrap_password(&self) -> bool {
        self.google_id.is_some() && self.password_hash.is_none()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            profile_picture: self.profile_picture.clone(),
            is_google_user: self.is_google_user,
        }
    }
}

#[derive(Debug)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub google_id: Option<&'a str>,
    pub profile_picture: Option<&'a str>,
}

/// Public view of a user. Never carries password material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub is_google_user: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub storage_key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    pub upload_date: DateTime<Utc>,
    pub file_link: String,
    pub preview_link: Option<String>,
    pub download_count: u64,
}

#[derive(Debug)]
pub struct NewFile<'a> {
    pub user_id: Uuid,
    pub storage_key: &'a str,
    pub name: &'a str,
    pub content_type: &'a str,
    pub size: u64,
    pub file_link: &'a str,
}
