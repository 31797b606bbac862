//! Google API access tokens.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::ServiceAccountAuthenticator;

use super::StoreError;

/// Scopes needed by both adapters; one token serves Sheets and Drive.
const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, StoreError>;
}

/// Service-account credentials loaded from a JSON key file. Tokens are
/// cached and refreshed by the authenticator.
pub struct ServiceAccountTokens {
    auth: Authenticator<HttpsConnector<HttpConnector>>,
}

impl std::fmt::Debug for ServiceAccountTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokens").finish_non_exhaustive()
    }
}

impl ServiceAccountTokens {
    pub async fn from_key_file(path: &Path) -> anyhow::Result<Self> {
        let key = yup_oauth2::read_service_account_key(path)
            .await
            .with_context(|| format!("Failed to read service account key {}", path.display()))?;
        let auth = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .context("Failed to build service account authenticator")?;
        Ok(Self { auth })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, StoreError> {
        let token = self
            .auth
            .token(SCOPES)
            .await
            .map_err(|e| StoreError::Auth(e.into()))?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| StoreError::Auth(anyhow::anyhow!("Token response had no access token")))
    }
}

/// Fixed token for adapter tests against a mock server.
#[cfg(test)]
pub(crate) struct StaticToken(pub &'static str);

#[cfg(test)]
#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, StoreError> {
        Ok(self.0.to_string())
    }
}
