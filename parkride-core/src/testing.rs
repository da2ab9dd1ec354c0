//! In-memory [`ParkingPort`] used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::model::{Occupancy, SiteId, TrackedSite};
use crate::ports::{ParkingPort, PortError, TokenListener};

pub(crate) const PASSWORD: &str = "hunter2";

pub(crate) fn sites() -> Arc<[TrackedSite]> {
    Arc::from(vec![
        TrackedSite::new("100", "Mersch"),
        TrackedSite::new("200", "Ettelbruck"),
    ])
}

pub(crate) struct FakePort {
    occupancy: Mutex<HashMap<SiteId, Occupancy>>,
    slots: Mutex<HashMap<SiteId, i64>>,
    failing: Mutex<HashSet<SiteId>>,
    expired: AtomicBool,
    listener: Mutex<Option<TokenListener>>,
    issued: AtomicUsize,
    site_calls: AtomicUsize,
}

impl Default for FakePort {
    fn default() -> Self {
        let occupancy = HashMap::from([
            (SiteId::from("100"), Occupancy {
                occupied_total_spaces: 50,
                total_spaces: 100,
                occupied_electrical_spaces: 2,
                total_electrical_spaces: 6,
                occupied_pmr_spaces: 1,
                total_pmr_spaces: 4,
            }),
            (SiteId::from("200"), Occupancy {
                occupied_total_spaces: 10,
                total_spaces: 40,
                ..Occupancy::default()
            }),
        ]);
        let slots = HashMap::from([(SiteId::from("100"), 0), (SiteId::from("200"), 3)]);

        Self {
            occupancy: Mutex::new(occupancy),
            slots: Mutex::new(slots),
            failing: Mutex::new(HashSet::new()),
            expired: AtomicBool::new(false),
            listener: Mutex::new(None),
            issued: AtomicUsize::new(0),
            site_calls: AtomicUsize::new(0),
        }
    }
}

impl FakePort {
    pub(crate) fn set_listener(&self, listener: TokenListener) {
        *self.listener.lock().expect("lock") = Some(listener);
    }

    pub(crate) fn set_occupancy(&self, id: &str, occupancy: Occupancy) {
        self.occupancy
            .lock()
            .expect("lock")
            .insert(SiteId::from(id), occupancy);
    }

    pub(crate) fn fail_site(&self, id: &str) {
        self.failing.lock().expect("lock").insert(SiteId::from(id));
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().expect("lock").clear();
        self.expired.store(false, Ordering::SeqCst);
    }

    pub(crate) fn expire_tokens(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    pub(crate) fn issued_tokens(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub(crate) fn site_calls(&self) -> usize {
        self.site_calls.load(Ordering::SeqCst)
    }

    fn issue_token(&self) -> String {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("refresh-{serial}");
        if let Some(listener) = self.listener.lock().expect("lock").as_ref() {
            listener.notify(&token);
        }
        token
    }

    fn check(&self, id: &SiteId) -> Result<(), PortError> {
        if self.expired.load(Ordering::SeqCst) {
            return Err(PortError::AuthExpired);
        }
        if self.failing.lock().expect("lock").contains(id) {
            return Err(PortError::SiteNotFound(id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl ParkingPort for FakePort {
    async fn authenticate(
        &self,
        _email: &str,
        password: &SecretString,
    ) -> Result<SecretString, PortError> {
        if password.expose_secret() != PASSWORD {
            return Err(PortError::InvalidCredentials);
        }
        self.expired.store(false, Ordering::SeqCst);
        Ok(SecretString::from(self.issue_token()))
    }

    async fn refresh_tokens(&self) -> Result<(), PortError> {
        if self.expired.load(Ordering::SeqCst) {
            return Err(PortError::AuthExpired);
        }
        self.issue_token();
        Ok(())
    }

    async fn site(&self, id: &SiteId) -> Result<Occupancy, PortError> {
        self.site_calls.fetch_add(1, Ordering::SeqCst);
        self.check(id)?;
        self.occupancy
            .lock()
            .expect("lock")
            .get(id)
            .copied()
            .ok_or_else(|| PortError::SiteNotFound(id.clone()))
    }

    async fn subscription_available_spots(&self, id: &SiteId) -> Result<i64, PortError> {
        self.check(id)?;
        self.slots
            .lock()
            .expect("lock")
            .get(id)
            .copied()
            .ok_or_else(|| PortError::SiteNotFound(id.clone()))
    }

    async fn list_sites(&self) -> Result<Vec<TrackedSite>, PortError> {
        let mut all = sites().to_vec();
        all.push(TrackedSite::new("300", "Wasserbillig"));
        Ok(all)
    }
}
