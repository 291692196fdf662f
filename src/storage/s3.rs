//! S3-compatible backend (Cloudflare R2, AWS S3, MinIO) over path-style URLs
//! with AWS Signature Version 4.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use sha2::{Digest, Sha256};
use url::Url;

use super::{encode_key, ObjectBody, ObjectStore, StorageError};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct S3Store {
    client: reqwest::Client,
    endpoint: Url,
    bucket: String,
    region: String,
    credentials: S3Credentials,
    public_base: String,
}

impl S3Store {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        bucket: impl Into<String>,
        region: impl Into<String>,
        credentials: S3Credentials,
        cdn_base_url: Option<String>,
    ) -> Result<Self, StorageError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| StorageError::Config(format!("invalid endpoint {endpoint}: {e}")))?;
        if endpoint.host_str().is_none() {
            return Err(StorageError::Config("endpoint has no host".to_string()));
        }
        let bucket = bucket.into();
        let public_base = cdn_base_url
            .unwrap_or_else(|| {
                format!("{}/{}", endpoint.as_str().trim_end_matches('/'), bucket)
            })
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            endpoint,
            bucket,
            region: region.into(),
            credentials,
            public_base,
        })
    }

    /// `/{bucket}/{key}` with each segment URI-encoded.
    fn canonical_path(&self, key: &str) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        format!(
            "{base}/{}/{}",
            urlencoding::encode(&self.bucket),
            encode_key(key)
        )
    }

    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        body: Option<(Bytes, &str)>,
    ) -> Result<reqwest::Response, StorageError> {
        let path = self.canonical_path(key);
        let payload: &[u8] = match &body {
            Some((bytes, _)) => bytes,
            None => &[],
        };
        let payload_hash = hex::encode(Sha256::digest(payload));
        let now = Utc::now();
        let host = self.host();

        let request = SignedRequest {
            method: method.as_str(),
            path: &path,
            host: &host,
            payload_hash: &payload_hash,
        };
        let (amz_date, authorization) = request.authorization(&self.credentials, &self.region, now);

        let url = format!("{}://{}{}", self.endpoint.scheme(), host, path);
        let mut builder = self
            .client
            .request(method, url)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", &payload_hash)
            .header(reqwest::header::AUTHORIZATION, authorization);
        if let Some((bytes, content_type)) = body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(bytes);
        }

        builder
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))
    }
}

async fn provider_error(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    StorageError::Provider { status, message }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        let response = self.send(Method::PUT, key, Some((body, content_type))).await?;
        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, StorageError> {
        let response = self.send(Method::GET, key, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed();
        Ok(ObjectBody {
            stream,
            content_length,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self.send(Method::DELETE, key, None).await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(provider_error(response).await);
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, encode_key(key))
    }
}

/// The parts of a request covered by the signature.
struct SignedRequest<'a> {
    method: &'a str,
    path: &'a str,
    host: &'a str,
    payload_hash: &'a str,
}

impl SignedRequest<'_> {
    fn canonical_request(&self, amz_date: &str) -> String {
        format!(
            "{method}\n{path}\n\nhost:{host}\nx-amz-content-sha256:{hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{hash}",
            method = self.method,
            path = self.path,
            host = self.host,
            hash = self.payload_hash,
        )
    }

    /// Returns the `x-amz-date` value and the `Authorization` header.
    fn authorization(
        &self,
        credentials: &S3Credentials,
        region: &str,
        now: DateTime<Utc>,
    ) -> (String, String) {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{region}/{SERVICE}/aws4_request");

        let canonical = self.canonical_request(&amz_date);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let key = signing_key(&credentials.secret_access_key, &date, region, SERVICE);
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            credentials.access_key_id
        );
        (amz_date, authorization)
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}
