//! Settings loaded from `parkride.toml` and `PARKRIDE_*` environment variables.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use parkride_core::{Credentials, PollIntervals};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum SettingsError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for SettingsError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

#[derive(Deserialize)]
pub(crate) struct Settings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_fast_interval")]
    pub fast_interval_secs: u64,

    #[serde(default = "default_slow_interval")]
    pub slow_interval_secs: u64,

    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_entry_path")]
    pub entry_path: PathBuf,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    pub email: Option<String>,

    password: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("fast_interval_secs", &self.fast_interval_secs)
            .field("slow_interval_secs", &self.slow_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("entry_path", &self.entry_path)
            .field("log_file", &self.log_file)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

fn default_base_url() -> String {
    parkride_provider_cfl::BASE_URL.to_owned()
}
fn default_fast_interval() -> u64 {
    60
}
fn default_slow_interval() -> u64 {
    30 * 60
}
fn default_timeout() -> u64 {
    30
}
fn default_entry_path() -> PathBuf {
    data_dir().join("entry.json")
}
fn default_log_file() -> PathBuf {
    data_dir().join("parkride.log")
}
fn default_log_filter() -> String {
    "parkride_core=info,parkride_provider_cfl=info,parkride_tui=info".into()
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("lu", "parkride", "parkride")
}

fn data_dir() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from("."), |dirs| dirs.data_dir().to_path_buf())
}

/// Resolve the settings file path via XDG / platform conventions.
pub(crate) fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || PathBuf::from("parkride.toml"),
        |dirs| dirs.config_dir().join("parkride.toml"),
    )
}

impl Settings {
    /// Load settings from the settings file, then the environment.
    pub(crate) fn load() -> Result<Self, SettingsError> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(config_path()))
                .merge(Env::prefixed("PARKRIDE_")),
        )
    }

    pub(crate) fn from_figment(figment: Figment) -> Result<Self, SettingsError> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(SettingsError::Validation {
                field: "base_url",
                reason: format!("expected an http(s) URL, got '{}'", self.base_url),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::Validation {
                field: "request_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub(crate) fn intervals(&self) -> PollIntervals {
        PollIntervals {
            fast: Duration::from_secs(self.fast_interval_secs),
            slow: Duration::from_secs(self.slow_interval_secs),
        }
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Account credentials, when both e-mail and password are configured.
    pub(crate) fn credentials(&self) -> Option<Credentials> {
        let email = self.email.clone()?;
        let password = self.password.clone()?;
        Some(Credentials::new(email, SecretString::from(password)))
    }
}
