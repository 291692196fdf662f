//! Google ID-token verification.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};

pub const TOKENINFO_ENDPOINT: &str = "https://oauth2.googleapis.com/tokeninfo";

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Identity extracted from a verified Google ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `id_token` and return the identity it carries.
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    iss: String,
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// Verifies tokens against Google's public tokeninfo endpoint, which checks the
/// signature and expiry; the audience is checked here against our client id.
pub struct GoogleTokenVerifier {
    client: reqwest::Client,
    client_id: String,
    endpoint: String,
}

impl GoogleTokenVerifier {
    pub fn new(client: reqwest::Client, client_id: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            endpoint: TOKENINFO_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn check_claims(&self, info: TokenInfo) -> Result<GoogleIdentity> {
        if info.aud != self.client_id {
            tracing::warn!(
                expected = %self.client_id,
                actual = %info.aud,
                "Google token audience mismatch"
            );
            return Err(AppError::InvalidToken(
                "Invalid Google token - Client ID mismatch".to_string(),
            ));
        }
        if !GOOGLE_ISSUERS.contains(&info.iss.as_str()) {
            return Err(AppError::InvalidToken("Invalid Google token issuer".to_string()));
        }

        let email = info
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::InvalidToken("Google token has no email".to_string()))?;
        let name = info
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(GoogleIdentity {
            subject: info.sub,
            email,
            name,
            picture: info.picture,
        })
    }
}

#[async_trait]
impl IdentityVerifier for GoogleTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Google tokeninfo request: {e}")))?;

        if response.status().is_client_error() {
            tracing::debug!(status = %response.status(), "Google rejected ID token");
            return Err(AppError::InvalidToken("Invalid Google token".to_string()));
        }
        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Google tokeninfo returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| AppError::InvalidToken(format!("Malformed Google token info: {e}")))?;

        let identity = self.check_claims(info)?;
        tracing::info!(email = %identity.email, "Google token verified");
        Ok(identity)
    }
}
