//! Client-credentials bearer session.
//!
//! The session is acquired once per run and shared read-only by every
//! request; there is no refresh.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::{EngineError, EngineResult};

/// OAuth token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[allow(dead_code)]
    token_type: String,
}

/// Client-credentials pair for the organization.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
        }
    }
}

/// Bearer session for one organization region.
#[derive(Debug)]
pub struct BearerSession {
    region: String,
    access_token: SecretString,
    expires_at: DateTime<Utc>,
}

impl BearerSession {
    /// Builds a session from an already issued token.
    pub fn from_token(
        region: impl Into<String>,
        access_token: SecretString,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            region: region.into(),
            access_token,
            expires_at,
        }
    }

    /// Performs the client-credentials grant against `https://login.<region>`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Auth`] if the token endpoint rejects the credentials.
    pub async fn acquire(region: &str, credentials: &ClientCredentials) -> EngineResult<Self> {
        let login_url = format!("https://login.{region}");
        Self::acquire_from(&login_url, region, credentials).await
    }

    /// Performs the client-credentials grant against an explicit login base URL.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Auth`] if the token endpoint rejects the credentials.
    #[instrument(skip(credentials), fields(client_id = %credentials.client_id))]
    pub async fn acquire_from(
        login_base_url: &str,
        region: &str,
        credentials: &ClientCredentials,
    ) -> EngineResult<Self> {
        let token_url = format!("{}/oauth/token", login_base_url.trim_end_matches('/'));
        let params = [("grant_type", "client_credentials")];

        let response = reqwest::Client::new()
            .post(&token_url)
            .basic_auth(
                &credentials.client_id,
                Some(credentials.client_secret.expose_secret()),
            )
            .form(&params)
            .send()
            .await
            .map_err(|e| EngineError::Auth(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Auth(format!(
                "Token request failed with status {status}: {body}"
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Auth(format!("Failed to parse token response: {e}")))?;

        let expires_at = Utc::now() + Duration::seconds(token_response.expires_in);
        info!(
            "Login success, token expires at {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(Self {
            region: region.to_string(),
            access_token: SecretString::new(token_response.access_token),
            expires_at,
        })
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Base URL of the platform API for this region.
    #[must_use]
    pub fn api_base_url(&self) -> String {
        format!("https://api.{}", self.region)
    }
}
