//! Setup, retry and re-authentication of the configured entry.

use std::sync::Arc;
use std::time::Duration;

use parkride_core::{
    AbortReason, ConfigEntry, ConfigFlow, Credentials, EntryStore, FlowResult, FormError,
    ParkRideIntegration, ParkingPort, PollIntervals, SetupError, StoreError, TokenListener,
};
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// Wait before retrying a setup that failed with a transient error.
pub(crate) const SETUP_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Builds an API client, resuming from a refresh token when one is given.
pub(crate) type PortFactory =
    Box<dyn Fn(Option<SecretString>, Option<TokenListener>) -> Arc<dyn ParkingPort> + Send + Sync>;

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("no park-and-ride account configured")]
    NoEntry,

    #[error("credentials expired; configure email and password to sign in again")]
    CredentialsRequired,

    #[error("re-authentication failed: {0}")]
    Reauth(FormError),

    #[error("re-authentication aborted: {0:?}")]
    ReauthAborted(AbortReason),

    #[error("credentials rejected again right after signing in")]
    AuthRejected,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) struct Session {
    store: Arc<EntryStore>,
    connect: PortFactory,
    credentials: Option<Credentials>,
    intervals: PollIntervals,
    status: watch::Sender<Option<String>>,
}

impl Session {
    pub(crate) fn new(
        store: Arc<EntryStore>,
        connect: PortFactory,
        credentials: Option<Credentials>,
        intervals: PollIntervals,
    ) -> Self {
        let (status, _) = watch::channel(None);
        Self {
            store,
            connect,
            credentials,
            intervals,
            status,
        }
    }

    /// Client without tokens, for the config flow.
    pub(crate) fn anonymous_port(&self) -> Arc<dyn ParkingPort> {
        (self.connect)(None, None)
    }

    /// Configured email and password, if any.
    pub(crate) fn credentials(&self) -> Option<Credentials> {
        self.credentials.clone()
    }

    /// Whether expired credentials can be renewed without user input.
    pub(crate) fn can_reauthenticate(&self) -> bool {
        self.credentials.is_some()
    }

    /// Problems met while starting, `None` once running.
    pub(crate) fn status(&self) -> watch::Receiver<Option<String>> {
        self.status.subscribe()
    }

    /// Set up the stored entry.
    ///
    /// A rejected refresh token triggers one sign-in with the configured
    /// credentials. Transient failures are retried every
    /// [`SETUP_RETRY_DELAY`], each attempt reading the entry again so a
    /// token rotated by the failed attempt is used.
    pub(crate) async fn start(&self) -> Result<ParkRideIntegration, SessionError> {
        let mut reauthenticated = false;
        loop {
            let entry = self.store.entry()?.ok_or(SessionError::NoEntry)?;
            let port = (self.connect)(
                Some(SecretString::from(entry.data.refresh_token.clone())),
                Some(self.store.token_listener()),
            );

            match ParkRideIntegration::setup(&entry, port, self.intervals).await {
                Ok(integration) => {
                    self.status.send_replace(None);
                    return Ok(integration);
                }
                Err(SetupError::AuthFailed) if reauthenticated => {
                    return Err(SessionError::AuthRejected);
                }
                Err(SetupError::AuthFailed) => {
                    warn!("stored refresh token rejected, signing in again");
                    self.status.send_replace(Some("Signing in again…".to_owned()));
                    self.reauthenticate(entry).await?;
                    reauthenticated = true;
                }
                Err(SetupError::NotReady(err)) => {
                    warn!(error = %err, "setup not ready, retrying");
                    self.status.send_replace(Some(format!(
                        "API not reachable ({err}), retrying in {}s",
                        SETUP_RETRY_DELAY.as_secs()
                    )));
                    tokio::time::sleep(SETUP_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Unload an integration whose credentials expired, sign in again and
    /// set the entry up anew.
    pub(crate) async fn resume(
        &self,
        integration: ParkRideIntegration,
    ) -> Result<ParkRideIntegration, SessionError> {
        integration.unload().await;
        let entry = self.store.entry()?.ok_or(SessionError::NoEntry)?;
        self.reauthenticate(entry).await?;
        self.start().await
    }

    /// Sign in with the configured credentials, storing the new token.
    async fn reauthenticate(&self, entry: ConfigEntry) -> Result<(), SessionError> {
        let credentials = self
            .credentials
            .clone()
            .ok_or(SessionError::CredentialsRequired)?;

        let mut flow = ConfigFlow::reauth(self.anonymous_port(), Arc::clone(&self.store), entry);
        flow.step_reauth_confirm(true).await;
        match flow.step_user(Some(credentials)).await {
            FlowResult::ReauthSuccessful(_) => {
                info!("signed in again");
                Ok(())
            }
            FlowResult::Abort(reason) => Err(SessionError::ReauthAborted(reason)),
            FlowResult::ShowForm { error, .. } => {
                let error = error.unwrap_or(FormError::Unknown);
                warn!(form_error = error.key(), "re-authentication rejected");
                Err(SessionError::Reauth(error))
            }
            FlowResult::CreateEntry(_) => Err(SessionError::Reauth(FormError::Unknown)),
        }
    }
}
