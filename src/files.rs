//! File metadata store.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::models::{FileRecord, NewFile};
use crate::users::{parse_id, parse_timestamp};

const FILE_COLUMNS: &str = "id, user_id, storage_key, name, content_type, size, upload_date, \
                            file_link, preview_link, download_count";

pub struct FileRepository<'a> {
    db: &'a Database,
}

impl<'a> FileRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, new_file: &NewFile<'_>) -> Result<FileRecord> {
        let record = FileRecord {
            id: Uuid::new_v4(),
            user_id: new_file.user_id,
            storage_key: new_file.storage_key.to_string(),
            name: new_file.name.to_string(),
            content_type: new_file.content_type.to_string(),
            size: new_file.size,
            upload_date: Utc::now(),
            file_link: new_file.file_link.to_string(),
            preview_link: None,
            download_count: 0,
        };

        self.db.lock().await.execute(
            &format!("INSERT INTO files ({FILE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                record.id.to_string(),
                record.user_id.to_string(),
                record.storage_key,
                record.name,
                record.content_type,
                record.size as i64,
                record.upload_date.to_rfc3339(),
                record.file_link,
                record.preview_link,
                record.download_count as i64
            ],
        )?;

        Ok(record)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let conn = self.db.lock().await;
        let record = conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?"),
                [id.to_string()],
                row_to_file,
            )
            .optional()?;
        Ok(record)
    }

    /// Files owned by `user_id`, in insertion order.
    pub async fn list_by_owner(&self, user_id: Uuid) -> Result<Vec<FileRecord>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE user_id = ? ORDER BY rowid"
        ))?;
        let files = stmt
            .query_map([user_id.to_string()], row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Change the display name. Returns the updated record, or `None` if the id is unknown.
    pub async fn rename(&self, id: Uuid, name: &str) -> Result<Option<FileRecord>> {
        let updated = self.db.lock().await.execute(
            "UPDATE files SET name = ? WHERE id = ?",
            params![name, id.to_string()],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    pub async fn increment_downloads(&self, id: Uuid) -> Result<()> {
        self.db.lock().await.execute(
            "UPDATE files SET download_count = download_count + 1 WHERE id = ?",
            [id.to_string()],
        )?;
        Ok(())
    }

    /// Returns `true` if a record was deleted.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = self
            .db
            .lock()
            .await
            .execute("DELETE FROM files WHERE id = ?", [id.to_string()])?;
        Ok(deleted > 0)
    }
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: parse_id(0, row)?,
        user_id: parse_id(1, row)?,
        storage_key: row.get(2)?,
        name: row.get(3)?,
        content_type: row.get(4)?,
        size: row.get::<_, i64>(5)? as u64,
        upload_date: parse_timestamp(6, row.get(6)?)?,
        file_link: row.get(7)?,
        preview_link: row.get(8)?,
        download_count: row.get::<_, i64>(9)? as u64,
    })
}
