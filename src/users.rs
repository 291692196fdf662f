//! Credential store: user records keyed by id and email.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, google_id, profile_picture, \
                            is_google_user, created_at, updated_at";

pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a user. Accounts created with a Google identity are marked as Google users.
    pub async fn create(&self, new_user: &NewUser<'_>) -> Result<User> {
        if self.find_by_email(new_user.email).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name.to_string(),
            email: new_user.email.to_string(),
            password_hash: new_user.password_hash.map(str::to_string),
            google_id: new_user.google_id.map(str::to_string),
            profile_picture: new_user.profile_picture.map(str::to_string),
            is_google_user: new_user.google_id.is_some(),
            created_at: now,
            updated_at: now,
        };

        if user.password_hash.is_none() && !user.is_google_user {
            return Err(AppError::Validation("Password is required".to_string()));
        }

        let result = self.db.lock().await.execute(
            &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                user.id.to_string(),
                user.name,
                user.email,
                user.password_hash,
                user.google_id,
                user.profile_picture,
                user.is_google_user,
                now.to_rfc3339(),
                now.to_rfc3339()
            ],
        );

        result.map_err(unique_violation)?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.db.lock().await;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"),
                [email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.db.lock().await;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
                [id.to_string()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Bootstrap a password for an OAuth-only account.
    pub async fn set_password(&self, user: &User, password_hash: &str) -> Result<()> {
        if !user.can_bootstrap_password() {
            return Err(AppError::InvalidState(
                "Password can only be set for Google accounts without one".to_string(),
            ));
        }

        let updated = self.db.lock().await.execute(
            "UPDATE users SET password_hash = ?, updated_at = ?
             WHERE id = ? AND password_hash IS NULL",
            params![password_hash, Utc::now().to_rfc3339(), user.id.to_string()],
        )?;

        if updated == 0 {
            return Err(AppError::InvalidState("Password already set".to_string()));
        }
        Ok(())
    }

    /// Attach a Google identity to an existing account, keeping any password it has.
    pub async fn link_google(
        &self,
        user: &User,
        google_id: &str,
        picture: Option<&str>,
    ) -> Result<User> {
        let now = Utc::now();
        self.db
            .lock()
            .await
            .execute(
                "UPDATE users
                 SET google_id = ?, is_google_user = 1,
                     profile_picture = COALESCE(?, profile_picture), updated_at = ?
                 WHERE id = ?",
                params![google_id, picture, now.to_rfc3339(), user.id.to_string()],
            )
            .map_err(unique_violation)?;

        self.find_by_id(user.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }
}

/// Name the unique column a write collided with.
fn unique_violation(err: rusqlite::Error) -> AppError {
    if let rusqlite::Error::SqliteFailure(e, Some(msg)) = &err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            if msg.contains("users.google_id") {
                return AppError::InvalidToken(
                    "Google account is already linked to another user".to_string(),
                );
            }
            if msg.contains("users.email") {
                return AppError::DuplicateEmail;
            }
        }
    }
    err.into()
}

fn parse_uuid(idx: usize, value: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_id(idx: usize, row: &Row<'_>) -> rusqlite::Result<Uuid> {
    parse_uuid(idx, row.get(idx)?)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_id(0, row)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        google_id: row.get(4)?,
        profile_picture: row.get(5)?,
        is_google_user: row.get(6)?,
        created_at: parse_timestamp(7, row.get(7)?)?,
        updated_at: parse_timestamp(8, row.get(8)?)?,
    })
}
