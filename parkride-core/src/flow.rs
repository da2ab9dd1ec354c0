//! Interactive setup flow: sign in, pick sites, create or update the entry.

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info};

use crate::config::{ConfigEntry, ENTRY_VERSION, EntryData, EntryStore};
use crate::model::{SiteId, TrackedSite};
use crate::ports::{ParkingPort, PortError};

/// Title given to created entries.
pub const ENTRY_TITLE: &str = "CFL P+R";

#[derive(Debug, Clone)]
/// Account credentials entered by the user.
pub struct Credentials {
    /// Account e-mail.
    pub email: String,
    /// Account password.
    pub password: SecretString,
}

impl Credentials {
    /// Construct credentials.
    #[must_use]
    pub fn new<E: Into<String>>(email: E, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Step a form belongs to.
pub enum FlowStep {
    /// E-mail and password.
    User,
    /// Site selection.
    Sites,
    /// Confirmation before signing in again.
    ReauthConfirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Error shown on a form.
pub enum FormError {
    /// The backend rejected the credentials.
    InvalidAuth,
    /// No site was selected.
    NoSites,
    /// Anything else; details are logged.
    Unknown,
}

impl FormError {
    /// Stable key of the error.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            FormError::InvalidAuth => "invalid_auth",
            FormError::NoSites => "no_sites",
            FormError::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FormError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            FormError::InvalidAuth => "Invalid e-mail or password",
            FormError::NoSites => "Select at least one site",
            FormError::Unknown => "Unexpected error, see the log file",
        };
        formatter.write_str(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why a flow ended without creating anything.
pub enum AbortReason {
    /// An entry for this account already exists.
    AlreadyConfigured,
    /// Re-authentication used a different account than the entry.
    UniqueIdMismatch,
}

#[derive(Debug, Clone, PartialEq)]
/// Outcome of a flow step.
pub enum FlowResult {
    /// Ask the user for input.
    ShowForm {
        /// Step the form belongs to.
        step: FlowStep,
        /// Error from the previous submission.
        error: Option<FormError>,
        /// Selectable sites, filled on the sites step.
        options: Vec<TrackedSite>,
    },
    /// A new entry was created and persisted.
    CreateEntry(ConfigEntry),
    /// The existing entry got a fresh refresh token and should be reloaded.
    ReauthSuccessful(ConfigEntry),
    /// The flow ended.
    Abort(AbortReason),
}

impl FlowResult {
    fn form(step: FlowStep, error: Option<FormError>) -> Self {
        FlowResult::ShowForm {
            step,
            error,
            options: Vec::new(),
        }
    }
}

/// Drives the setup flow against a [`ParkingPort`] and an [`EntryStore`].
pub struct ConfigFlow {
    port: Arc<dyn ParkingPort>,
    store: Arc<EntryStore>,
    reauth_entry: Option<ConfigEntry>,
    email: Option<String>,
    refresh_token: Option<SecretString>,
    all_sites: Vec<TrackedSite>,
}

impl ConfigFlow {
    /// Flow creating a new entry.
    #[must_use]
    pub fn new(port: Arc<dyn ParkingPort>, store: Arc<EntryStore>) -> Self {
        Self {
            port,
            store,
            reauth_entry: None,
            email: None,
            refresh_token: None,
            all_sites: Vec::new(),
        }
    }

    /// Flow refreshing the credentials of an existing entry.
    #[must_use]
    pub fn reauth(port: Arc<dyn ParkingPort>, store: Arc<EntryStore>, entry: ConfigEntry) -> Self {
        let mut flow = Self::new(port, store);
        flow.reauth_entry = Some(entry);
        flow
    }

    /// Confirm re-authentication; `false` shows the confirmation form.
    pub async fn step_reauth_confirm(&mut self, confirmed: bool) -> FlowResult {
        if confirmed {
            self.step_user(None).await
        } else {
            FlowResult::form(FlowStep::ReauthConfirm, None)
        }
    }

    /// Sign in. Without input the credentials form is shown.
    pub async fn step_user(&mut self, input: Option<Credentials>) -> FlowResult {
        let Some(credentials) = input else {
            return FlowResult::form(FlowStep::User, None);
        };

        let refresh_token = match self
            .port
            .authenticate(&credentials.email, &credentials.password)
            .await
        {
            Ok(token) => token,
            Err(err) => {
                if err.is_auth_failure() {
                    debug!(error = %err, "credentials rejected");
                } else {
                    error!(error = %err, "unexpected error while signing in");
                }
                return FlowResult::form(FlowStep::User, Some(err.form_error()));
            }
        };

        if let Some(entry) = self.reauth_entry.clone() {
            return self.finish_reauth(entry, &credentials.email, &refresh_token);
        }

        let all_sites = match self.port.list_sites().await {
            Ok(sites) => sites,
            Err(err) => {
                error!(error = %err, "failed to list sites");
                return FlowResult::form(FlowStep::User, Some(FormError::Unknown));
            }
        };
        debug!(count = all_sites.len(), "listed sites");

        self.email = Some(credentials.email);
        self.refresh_token = Some(refresh_token);
        self.all_sites = all_sites;
        self.step_sites(None).await
    }

    /// Pick the sites to track. Without input the selection form is shown.
    pub async fn step_sites(&mut self, selected: Option<&[SiteId]>) -> FlowResult {
        let (Some(email), Some(refresh_token)) = (self.email.clone(), self.refresh_token.clone())
        else {
            return FlowResult::form(FlowStep::User, None);
        };

        let Some(selected) = selected else {
            return FlowResult::ShowForm {
                step: FlowStep::Sites,
                error: None,
                options: self.all_sites.clone(),
            };
        };

        let sites: Vec<TrackedSite> = self
            .all_sites
            .iter()
            .filter(|site| selected.contains(&site.id))
            .cloned()
            .collect();
        if sites.is_empty() {
            return FlowResult::ShowForm {
                step: FlowStep::Sites,
                error: Some(FormError::NoSites),
                options: self.all_sites.clone(),
            };
        }

        match self.store.entry() {
            Ok(Some(existing)) if existing.unique_id == email => {
                return FlowResult::Abort(AbortReason::AlreadyConfigured);
            }
            Ok(_) => {}
            Err(err) => {
                error!(error = %err, "failed to read config entry");
                return FlowResult::form(FlowStep::Sites, Some(FormError::Unknown));
            }
        }

        let entry = ConfigEntry {
            version: ENTRY_VERSION,
            title: ENTRY_TITLE.to_owned(),
            unique_id: email,
            data: EntryData {
                refresh_token: refresh_token.expose_secret().to_owned(),
                sites,
            },
        };
        if let Err(err) = self.store.save(entry.clone()) {
            error!(error = %err, "failed to save config entry");
            return FlowResult::form(FlowStep::Sites, Some(FormError::Unknown));
        }
        info!(sites = entry.data.sites.len(), "created config entry");
        FlowResult::CreateEntry(entry)
    }

    fn finish_reauth(
        &self,
        mut entry: ConfigEntry,
        email: &str,
        refresh_token: &SecretString,
    ) -> FlowResult {
        if entry.unique_id != email {
            return FlowResult::Abort(AbortReason::UniqueIdMismatch);
        }
        entry.data.refresh_token = refresh_token.expose_secret().to_owned();
        if let Err(err) = self.store.save(entry.clone()) {
            error!(error = %err, "failed to update config entry");
            return FlowResult::form(FlowStep::User, Some(FormError::Unknown));
        }
        info!("re-authenticated config entry");
        FlowResult::ReauthSuccessful(entry)
    }
}

impl PortError {
    /// Form error shown when this error aborts a sign-in.
    #[must_use]
    pub fn form_error(&self) -> FormError {
        if self.is_auth_failure() {
            FormError::InvalidAuth
        } else {
            FormError::Unknown
        }
    }
}
