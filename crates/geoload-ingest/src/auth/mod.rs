//! Identity collaborator
//!
//! The pipeline never performs an OAuth flow itself; it only asks the
//! identity provider two questions: "is the credential valid and scoped for
//! X?" and "give me a bearer token for an authenticated request". The
//! [`TokenProvider`] trait is that narrow interface, injected once at
//! startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geoload_common::{GeoloadError, Result};

/// A bearer credential with its expiry and granted scope set
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl AccessToken {
    pub fn new(
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            token: token.into(),
            expires_at,
            scopes,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn has_scopes(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|scope| self.scopes.iter().any(|s| s == scope))
    }
}

/// Supplier of bearer credentials for outbound warehouse requests
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a currently valid credential
    async fn access_token(&self) -> Result<AccessToken>;

    /// Whether the held credential is valid and covers the required scopes
    fn is_authorized(&self, required_scopes: &[&str]) -> bool;
}

/// Token provider backed by a pre-issued credential
///
/// Used when the surrounding application has already completed an OAuth
/// flow (or holds a service-account token) and hands the result to the
/// pipeline.
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<AccessToken> {
        if self.token.is_expired() {
            return Err(GeoloadError::Auth(
                "credential has expired; re-authenticate and resubmit".to_string(),
            ));
        }
        Ok(self.token.clone())
    }

    fn is_authorized(&self, required_scopes: &[&str]) -> bool {
        !self.token.is_expired() && self.token.has_scopes(required_scopes)
    }
}
