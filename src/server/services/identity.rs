//! External identity collaborator.
//!
//! The core never validates credentials itself; it hands the bearer token to
//! a pre-configured identity service and gets back a user id or a refusal.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::server::error::ChatError;

#[async_trait]
pub trait Identity: Send + Sync {
    /// `verify(credential) -> userId | Unauthorized`.
    async fn verify(&self, credential: &str) -> Result<String, ChatError>;
}

/// Calls `GET {base}/verify` with the credential as a bearer header.
/// Anything other than a 200 with a user id, including transport failures,
/// is treated as unauthorized (fail closed) and logged.
pub struct HttpIdentity {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpIdentity {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            verify_url: format!("{}/verify", base_url.trim_end_matches('/')),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    user_id: String,
}

#[async_trait]
impl Identity for HttpIdentity {
    async fn verify(&self, credential: &str) -> Result<String, ChatError> {
        let response = self
            .client
            .get(&self.verify_url)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| {
                warn!("Identity service unreachable: {}", e);
                ChatError::Unauthorized
            })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(ChatError::Unauthorized);
        }

        let verified: VerifyResponse = response.json().await.map_err(|e| {
            warn!("Identity service returned malformed body: {}", e);
            ChatError::Unauthorized
        })?;

        Ok(verified.user_id)
    }
}
