//! Traits describing the park-and-ride API and shared helper types.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use secrecy::SecretString;

use crate::model::{Occupancy, SiteId, TrackedSite};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to the park-and-ride backend.
pub enum PortError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// The refresh token was rejected; the user has to sign in again.
    #[error("Authentication expired")]
    AuthExpired,
    /// E-mail or password were rejected.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// No refresh token is available to obtain an access token.
    #[error("Not authenticated")]
    NotAuthenticated,
    /// The backend does not know the requested site.
    #[error("Site not found: {0}")]
    SiteNotFound(SiteId),
    /// Internal provider error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortError {
    /// Whether the error can only be resolved by signing in again.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            PortError::AuthExpired | PortError::InvalidCredentials | PortError::NotAuthenticated
        )
    }
}

/// Callback invoked with every refresh token the backend issues.
#[derive(Clone)]
pub struct TokenListener(Arc<dyn Fn(&str) + Send + Sync>);

impl TokenListener {
    /// Wrap a closure as a token listener.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Forward a freshly issued refresh token.
    pub fn notify(&self, refresh_token: &str) {
        (self.0)(refresh_token);
    }
}

impl fmt::Debug for TokenListener {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("TokenListener")
    }
}

#[async_trait]
/// Trait for park-and-ride API clients.
///
/// A single instance is shared by both pollers, so implementations must
/// tolerate concurrent calls and serialise token refresh internally.
pub trait ParkingPort: Send + Sync {
    /// Sign in with account credentials and return the issued refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidCredentials`] when the backend rejects the
    /// credentials, or another [`PortError`] when the request fails.
    async fn authenticate(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SecretString, PortError>;

    /// Exchange the current refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::AuthExpired`] when the refresh token is no longer
    /// accepted.
    async fn refresh_tokens(&self) -> Result<(), PortError>;

    /// Fetch the current occupancy of a site.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails or the site is unknown.
    async fn site(&self, id: &SiteId) -> Result<Occupancy, PortError>;

    /// Fetch the number of subscription slots still available at a site.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails or the site is unknown.
    async fn subscription_available_spots(&self, id: &SiteId) -> Result<i64, PortError>;

    /// List every site offered by the backend.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn list_sites(&self) -> Result<Vec<TrackedSite>, PortError>;
}
