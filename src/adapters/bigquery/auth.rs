//! OAuth2 access tokens for the BigQuery REST API

use crate::domain::errors::BigQueryError;
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::Deserialize;

const BIGQUERY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/bigquery"];

/// Hands out bearer tokens for API calls
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, BigQueryError>;
}

/// Tokens minted from a service-account key
pub struct ServiceAccountTokenSource {
    account: CustomServiceAccount,
}

impl ServiceAccountTokenSource {
    /// # Errors
    ///
    /// Returns `BigQueryError::AuthenticationFailed` when the key JSON is not
    /// a usable service-account key
    pub fn from_json(credentials: &str) -> Result<Self, BigQueryError> {
        let account = CustomServiceAccount::from_json(credentials).map_err(|e| {
            BigQueryError::AuthenticationFailed(format!("invalid service-account key: {e}"))
        })?;
        Ok(Self { account })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn token(&self) -> Result<String, BigQueryError> {
        let token = self
            .account
            .token(BIGQUERY_SCOPES)
            .await
            .map_err(|e| BigQueryError::AuthenticationFailed(e.to_string()))?;
        Ok(token.as_str().to_string())
    }
}

/// Fixed token, for emulators and tests
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String, BigQueryError> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize)]
struct KeyProject {
    project_id: Option<String>,
}

/// Project id embedded in a service-account key
///
/// # Errors
///
/// Returns `BigQueryError::AuthenticationFailed` when the key is not JSON or
/// names no project
pub fn project_id(credentials: &str) -> Result<String, BigQueryError> {
    let key: KeyProject = serde_json::from_str(credentials)
        .map_err(|e| BigQueryError::AuthenticationFailed(format!("unreadable key: {e}")))?;
    key.project_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| {
            BigQueryError::AuthenticationFailed("service-account key has no project_id".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_from_key() {
        let key = r#"{"type":"service_account","project_id":"analytics-prod"}"#;
        assert_eq!(project_id(key).unwrap(), "analytics-prod");
    }

    #[test]
    fn test_missing_project_id() {
        assert!(matches!(
            project_id(r#"{"type":"service_account"}"#),
            Err(BigQueryError::AuthenticationFailed(_))
        ));
        assert!(project_id("not json").is_err());
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        assert!(ServiceAccountTokenSource::from_json(r#"{"project_id":"p"}"#).is_err());
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticTokenSource::new("abc");
        assert_eq!(source.token().await.unwrap(), "abc");
    }
}
