//! Object storage gateway.
//!
//! Blobs live in an external bucket (S3/R2) or, for development, a local
//! directory. Both sit behind [`ObjectStore`]; [`StorageGateway`] owns key
//! naming and public URLs.

mod local;
mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

pub use local::LocalStore;
pub use s3::{S3Credentials, S3Store};

#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage transport error: {0}")]
    Transport(String),

    #[error("storage provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage configuration error: {0}")]
    Config(String),
}

/// Streamed object content.
pub struct ObjectBody {
    pub stream: BoxStream<'static, std::io::Result<Bytes>>,
    pub content_length: Option<u64>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<ObjectBody, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Publicly reachable URL of `key`.
    fn public_url(&self, key: &str) -> String;
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload `data` under a key namespaced by owner and upload time.
    pub async fn put(
        &self,
        owner_id: Uuid,
        data: Bytes,
        original_name: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let key = object_key(
            owner_id,
            Utc::now().timestamp_millis(),
            Uuid::new_v4(),
            original_name,
        );
        self.store.put(&key, data, content_type).await?;
        tracing::debug!(%key, "object stored");

        Ok(StoredObject {
            url: self.store.public_url(&key),
            key,
        })
    }

    pub async fn get(&self, key: &str) -> Result<ObjectBody, StorageError> {
        self.store.get(key).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.store.delete(key).await
    }
}

/// `{owner}/{millis}-{upload_id}-{name}`, with the name reduced to one safe path segment.
pub fn object_key(owner_id: Uuid, millis: i64, upload_id: Uuid, original_name: &str) -> String {
    let name: String = original_name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let name = name.trim_start_matches('.');
    let name = if name.is_empty() { "file" } else { name };
    format!("{owner_id}/{millis}-{}-{name}", upload_id.simple())
}

/// Percent-encode each `/`-separated segment of `key` for use in a URL path.
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[test]
    fn test_object_key_namespaced_by_owner_and_time() {
        let owner = Uuid::new_v4();
        let upload = Uuid::new_v4();
        let key = object_key(owner, 1_700_000_000_123, upload, "report.pdf");
        assert_eq!(
            key,
            format!("{owner}/1700000000123-{}-report.pdf", upload.simple())
        );
    }

    #[test]
    fn test_object_key_strips_path_segments() {
        let owner = Uuid::new_v4();
        let upload = Uuid::new_v4();
        let prefix = format!("{owner}/1-{}", upload.simple());

        let key = object_key(owner, 1, upload, "../../etc/passwd");
        assert_eq!(key, format!("{prefix}-_.._etc_passwd"));
        assert_eq!(key.matches('/').count(), 1);

        assert_eq!(object_key(owner, 1, upload, ""), format!("{prefix}-file"));
        assert_eq!(
            object_key(owner, 1, upload, "a\nb"),
            format!("{prefix}-a_b")
        );
    }

    #[test]
    fn test_object_key_differs_within_same_millisecond() {
        let owner = Uuid::new_v4();
        let a = object_key(owner, 42, Uuid::new_v4(), "a.txt");
        let b = object_key(owner, 42, Uuid::new_v4(), "a.txt");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_concurrent_same_name_puts_keep_both_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "http://files.local").unwrap();
        let gateway = StorageGateway::new(Arc::new(store));
        let owner = Uuid::new_v4();

        for _ in 0..50 {
            let (first, second) = tokio::join!(
                gateway.put(owner, Bytes::from_static(b"first"), "a.txt", "text/plain"),
                gateway.put(owner, Bytes::from_static(b"second"), "a.txt", "text/plain"),
            );
            let (first, second) = (first.unwrap(), second.unwrap());
            assert_ne!(first.key, second.key);

            let body: Vec<Bytes> = gateway
                .get(&first.key)
                .await
                .unwrap()
                .stream
                .try_collect()
                .await
                .unwrap();
            assert_eq!(body.concat(), b"first");

            let body: Vec<Bytes> = gateway
                .get(&second.key)
                .await
                .unwrap()
                .stream
                .try_collect()
                .await
                .unwrap();
            assert_eq!(body.concat(), b"second");
        }
    }

    #[test]
    fn test_encode_key_keeps_separators() {
        assert_eq!(encode_key("o/1-a b#1?.txt"), "o/1-a%20b%231%3F.txt");
        assert_eq!(encode_key("o/plain.txt"), "o/plain.txt");
    }

    #[tokio::test]
    async fn test_gateway_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "http://files.local").unwrap();
        let gateway = StorageGateway::new(Arc::new(store));
        let owner = Uuid::new_v4();

        let stored = gateway
            .put(owner, Bytes::from_static(b"hello"), "hi.txt", "text/plain")
            .await
            .unwrap();
        assert!(stored.key.starts_with(&owner.to_string()));
        assert_eq!(stored.url, format!("http://files.local/{}", stored.key));

        let body = gateway.get(&stored.key).await.unwrap();
        assert_eq!(body.content_length, Some(5));
        let chunks: Vec<Bytes> = body.stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello");

        gateway.delete(&stored.key).await.unwrap();
        assert!(matches!(
            gateway.get(&stored.key).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
