//! Client for the CFL park-and-ride API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use parkride_core::{
    model::{Occupancy, SiteId, TrackedSite},
    ports::{ParkingPort, PortError, TokenListener},
};

/// Production endpoint of the park-and-ride API.
pub const BASE_URL: &str = "https://parkandride.cfl.lu/api";

#[derive(Debug, Serialize)]
struct LoginRequest<'req> {
    email: &'req str,
    password: &'req str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'req> {
    refresh_token: &'req str,
}

/// Token pair from /auth/login and /auth/refresh
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

/// Single entry from /parkings
#[derive(Debug, Deserialize)]
struct SiteEntry {
    id: RawId,
    name: String,
}

/// Site ids come back as numbers on some deployments.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for SiteId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => SiteId(text),
            RawId::Number(number) => SiteId(number.to_string()),
        }
    }
}

/// Response from /parkings/{id}/subscriptions
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionResponse {
    available_spots: i64,
}

#[derive(Default)]
struct Tokens {
    access: Option<SecretString>,
    refresh: Option<SecretString>,
}

/// Park-and-ride client holding the account's token pair.
///
/// Token refresh is serialised behind an async mutex, so the client can be
/// shared by concurrent pollers.
pub struct CflClient {
    client: Client,
    base_url: String,
    tokens: Mutex<Tokens>,
    listener: Option<TokenListener>,
}

impl CflClient {
    /// Create a client, optionally resuming from a stored refresh token.
    ///
    /// The listener receives every refresh token issued afterwards.
    #[must_use]
    pub fn new(
        client: Client,
        refresh_token: Option<SecretString>,
        listener: Option<TokenListener>,
    ) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_owned(),
            tokens: Mutex::new(Tokens {
                access: None,
                refresh: refresh_token,
            }),
            listener,
        }
    }

    /// Point the client at another deployment.
    #[must_use]
    pub fn with_base_url<U: Into<String>>(mut self, base_url: U) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn store_tokens(&self, tokens: &mut Tokens, response: TokenResponse) {
        let rotated = tokens
            .refresh
            .as_ref()
            .is_none_or(|current| current.expose_secret() != response.refresh_token);

        tokens.access = Some(SecretString::from(response.access_token));
        if rotated {
            debug!("refresh token rotated");
            if let Some(listener) = &self.listener {
                listener.notify(&response.refresh_token);
            }
            tokens.refresh = Some(SecretString::from(response.refresh_token));
        }
    }

    async fn refresh_locked(&self, tokens: &mut Tokens) -> Result<(), PortError> {
        let refresh_token = tokens.refresh.clone().ok_or(PortError::NotAuthenticated)?;
        debug!("refreshing access token");

        let response = self
            .client
            .post(self.url("/auth/refresh"))
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            tokens.access = None;
            return Err(PortError::AuthExpired);
        }

        let pair = read_json::<TokenResponse>(response).await?;
        self.store_tokens(tokens, pair);
        Ok(())
    }

    async fn access_token(&self) -> Result<SecretString, PortError> {
        let mut tokens = self.tokens.lock().await;
        if tokens.access.is_none() {
            self.refresh_locked(&mut tokens).await?;
        }
        tokens.access.clone().ok_or(PortError::NotAuthenticated)
    }

    /// Replace a rejected access token unless another caller already did.
    async fn renew_access_token(&self, rejected: &SecretString) -> Result<SecretString, PortError> {
        let mut tokens = self.tokens.lock().await;
        let still_current = tokens
            .access
            .as_ref()
            .is_none_or(|access| access.expose_secret() == rejected.expose_secret());
        if still_current {
            self.refresh_locked(&mut tokens).await?;
        }
        tokens.access.clone().ok_or(PortError::NotAuthenticated)
    }

    /// GET with the bearer token, renewing it once if the API rejects it.
    async fn get_authorized(&self, path: &str) -> Result<Response, PortError> {
        let token = self.access_token().await?;
        let response = self.get(path, &token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path, "access token rejected, renewing");
        let token = self.renew_access_token(&token).await?;
        let response = self.get(path, &token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(PortError::AuthExpired);
        }
        Ok(response)
    }

    fn get(&self, path: &str, token: &SecretString) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .bearer_auth(token.expose_secret())
    }

    async fn fetch_site_json<T: DeserializeOwned>(
        &self,
        id: &SiteId,
        path: &str,
    ) -> Result<T, PortError> {
        let response = self.get_authorized(path).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PortError::SiteNotFound(id.clone()));
        }
        read_json(response).await
    }
}

#[async_trait]
impl ParkingPort for CflClient {
    async fn authenticate(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SecretString, PortError> {
        debug!(email, "signing in");
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                email,
                password: password.expose_secret(),
            })
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(PortError::InvalidCredentials);
        }

        let pair = read_json::<TokenResponse>(response).await?;
        let refresh_token = SecretString::from(pair.refresh_token.clone());
        let mut tokens = self.tokens.lock().await;
        self.store_tokens(&mut tokens, pair);
        Ok(refresh_token)
    }

    async fn refresh_tokens(&self) -> Result<(), PortError> {
        let mut tokens = self.tokens.lock().await;
        self.refresh_locked(&mut tokens).await
    }

    async fn site(&self, id: &SiteId) -> Result<Occupancy, PortError> {
        self.fetch_site_json(id, &format!("/parkings/{id}")).await
    }

    async fn subscription_available_spots(&self, id: &SiteId) -> Result<i64, PortError> {
        let response: SubscriptionResponse = self
            .fetch_site_json(id, &format!("/parkings/{id}/subscriptions"))
            .await?;
        Ok(response.available_spots)
    }

    async fn list_sites(&self) -> Result<Vec<TrackedSite>, PortError> {
        let response = self.get_authorized("/parkings").await?;
        let entries = read_json::<Vec<SiteEntry>>(response).await?;

        Ok(entries
            .into_iter()
            .map(|entry| TrackedSite {
                id: entry.id.into(),
                name: entry.name,
            })
            .collect())
    }
}

// Small helper to decode JSON with status handling.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, PortError> {
    response
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}
