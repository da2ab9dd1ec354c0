//! Scripted park-and-ride backend shared by the runner tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parkride_core::{
    ConfigEntry, Credentials, ENTRY_TITLE, ENTRY_VERSION, EntryData, EntryStore, Occupancy,
    ParkingPort, PollIntervals, PortError, SiteId, TokenListener, TrackedSite,
};
use secrecy::{ExposeSecret, SecretString};

use crate::session::Session;

pub(crate) const EMAIL: &str = "rider@example.lu";
pub(crate) const PASSWORD: &str = "hunter2";

pub(crate) fn sites() -> Vec<TrackedSite> {
    vec![
        TrackedSite::new("1", "Mersch"),
        TrackedSite::new("2", "Kirchberg"),
    ]
}

pub(crate) fn stored_entry(refresh_token: &str) -> ConfigEntry {
    ConfigEntry {
        version: ENTRY_VERSION,
        title: ENTRY_TITLE.to_owned(),
        unique_id: EMAIL.to_owned(),
        data: EntryData {
            refresh_token: refresh_token.to_owned(),
            sites: sites(),
        },
    }
}

/// Server side state: which refresh token is currently accepted.
#[derive(Default)]
pub(crate) struct Backend {
    valid: Mutex<Option<String>>,
    reject_all: AtomicBool,
    failing_site_calls: AtomicUsize,
    issued: AtomicUsize,
    refreshed_with: Mutex<Vec<String>>,
}

impl Backend {
    pub(crate) fn new(valid: Option<&str>) -> Arc<Self> {
        let backend = Self::default();
        *backend.valid.lock().expect("lock") = valid.map(str::to_owned);
        Arc::new(backend)
    }

    pub(crate) fn reject_all_refreshes(&self) {
        self.reject_all.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_site_calls(&self, count: usize) {
        self.failing_site_calls.store(count, Ordering::SeqCst);
    }

    /// Invalidate every token handed out so far.
    pub(crate) fn revoke(&self) {
        *self.valid.lock().expect("lock") = None;
    }

    pub(crate) fn valid_token(&self) -> Option<String> {
        self.valid.lock().expect("lock").clone()
    }

    /// Refresh tokens presented to `/auth/refresh`, in order.
    pub(crate) fn refreshed_with(&self) -> Vec<String> {
        self.refreshed_with.lock().expect("lock").clone()
    }

    fn issue(&self) -> String {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("token-{serial}");
        *self.valid.lock().expect("lock") = Some(token.clone());
        token
    }
}

/// Client bound to a [`Backend`], holding its own refresh token.
pub(crate) struct FakeClient {
    backend: Arc<Backend>,
    token: Mutex<Option<String>>,
    listener: Option<TokenListener>,
}

impl FakeClient {
    fn accept(&self, token: String) {
        if let Some(listener) = &self.listener {
            listener.notify(&token);
        }
        *self.token.lock().expect("lock") = Some(token);
    }

    fn check_session(&self) -> Result<(), PortError> {
        let token = self.token.lock().expect("lock").clone();
        if token.is_none() || token != self.backend.valid_token() {
            return Err(PortError::AuthExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl ParkingPort for FakeClient {
    async fn authenticate(
        &self,
        _email: &str,
        password: &SecretString,
    ) -> Result<SecretString, PortError> {
        if password.expose_secret() != PASSWORD {
            return Err(PortError::InvalidCredentials);
        }
        let token = self.backend.issue();
        self.accept(token.clone());
        Ok(SecretString::from(token))
    }

    async fn refresh_tokens(&self) -> Result<(), PortError> {
        let current = self
            .token
            .lock()
            .expect("lock")
            .clone()
            .ok_or(PortError::NotAuthenticated)?;
        self.backend
            .refreshed_with
            .lock()
            .expect("lock")
            .push(current.clone());

        if self.backend.reject_all.load(Ordering::SeqCst)
            || self.backend.valid_token().as_deref() != Some(current.as_str())
        {
            return Err(PortError::AuthExpired);
        }
        let token = self.backend.issue();
        self.accept(token);
        Ok(())
    }

    async fn site(&self, id: &SiteId) -> Result<Occupancy, PortError> {
        self.check_session()?;
        let failing = &self.backend.failing_site_calls;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(PortError::Internal("service unavailable".to_owned()));
        }

        Ok(match id.0.as_str() {
            "1" => Occupancy {
                occupied_total_spaces: 30,
                total_spaces: 40,
                occupied_electrical_spaces: 1,
                total_electrical_spaces: 4,
                occupied_pmr_spaces: 0,
                total_pmr_spaces: 2,
            },
            _ => Occupancy::default(),
        })
    }

    async fn subscription_available_spots(&self, id: &SiteId) -> Result<i64, PortError> {
        self.check_session()?;
        Ok(if id.0 == "1" { 2 } else { 0 })
    }

    async fn list_sites(&self) -> Result<Vec<TrackedSite>, PortError> {
        Ok(sites())
    }
}

/// Session over a fresh store in `dir`, creating clients on `backend`.
pub(crate) fn session_for(
    dir: &tempfile::TempDir,
    backend: &Arc<Backend>,
    credentials: Option<Credentials>,
) -> (Session, Arc<EntryStore>) {
    let store = Arc::new(EntryStore::open(dir.path().join("entry.json")).expect("open"));
    let backend = Arc::clone(backend);
    let session = Session::new(
        Arc::clone(&store),
        Box::new(move |refresh_token: Option<SecretString>, listener: Option<TokenListener>| {
            Arc::new(FakeClient {
                backend: Arc::clone(&backend),
                token: Mutex::new(refresh_token.map(|token| token.expose_secret().to_owned())),
                listener,
            }) as Arc<dyn ParkingPort>
        }),
        credentials,
        PollIntervals::default(),
    );
    (session, store)
}
