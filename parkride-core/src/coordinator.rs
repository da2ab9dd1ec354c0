//! Polling coordinators that cache API results and notify entity adapters.
//!
//! Each coordinator owns one result slot, published through a
//! [`tokio::sync::watch`] channel. A successful cycle replaces the slot
//! wholesale; a failed cycle keeps the previous data and only flips the
//! success flag, so subscribers see the failure without losing the last
//! good reading.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{
    AvailabilitySnapshot, OccupancyData, SubscriptionAvailability, SubscriptionData, TrackedSite,
};
use crate::ports::{ParkingPort, PortError};

/// Interval of the occupancy poller.
pub const FAST_INTERVAL: Duration = Duration::from_secs(60);
/// Interval of the subscription poller.
pub const SLOW_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[async_trait]
/// What a coordinator fetches on each cycle.
pub trait PollSource: Send + Sync + 'static {
    /// Result published after a successful cycle.
    type Data: Send + Sync + 'static;

    /// Fetch a complete result for all tracked sites.
    ///
    /// # Errors
    ///
    /// Returns the first [`PortError`] raised for any site; the cycle has no
    /// partial result.
    async fn fetch(
        &self,
        port: &dyn ParkingPort,
        sites: &[TrackedSite],
    ) -> Result<Self::Data, PortError>;
}

/// Fetches occupancy for every site and derives availability snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct OccupancySource;

#[async_trait]
impl PollSource for OccupancySource {
    type Data = OccupancyData;

    async fn fetch(
        &self,
        port: &dyn ParkingPort,
        sites: &[TrackedSite],
    ) -> Result<OccupancyData, PortError> {
        let mut availability = HashMap::with_capacity(sites.len());
        for site in sites {
            let occupancy = port.site(&site.id).await?;
            availability.insert(
                site.id.clone(),
                AvailabilitySnapshot::from_occupancy(&occupancy),
            );
        }
        Ok(OccupancyData { availability })
    }
}

/// Fetches remaining subscription slots for every site.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionSource;

#[async_trait]
impl PollSource for SubscriptionSource {
    type Data = SubscriptionData;

    async fn fetch(
        &self,
        port: &dyn ParkingPort,
        sites: &[TrackedSite],
    ) -> Result<SubscriptionData, PortError> {
        let mut slot_available = HashMap::with_capacity(sites.len());
        for site in sites {
            let slots = port.subscription_available_spots(&site.id).await?;
            slot_available.insert(site.id.clone(), SubscriptionAvailability::from_slots(slots));
        }
        Ok(SubscriptionData { slot_available })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Why the last refresh of a coordinator failed.
pub enum UpdateFailure {
    /// The backend no longer accepts our tokens; the user must sign in again.
    AuthExpired,
    /// Any other failure; the next tick tries again.
    Transient(String),
}

impl From<&PortError> for UpdateFailure {
    fn from(err: &PortError) -> Self {
        if err.is_auth_failure() {
            UpdateFailure::AuthExpired
        } else {
            UpdateFailure::Transient(err.to_string())
        }
    }
}

impl fmt::Display for UpdateFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateFailure::AuthExpired => formatter.write_str("authentication expired"),
            UpdateFailure::Transient(reason) => formatter.write_str(reason),
        }
    }
}

/// Published state of a coordinator.
#[derive(Debug)]
pub struct CoordinatorState<T> {
    /// Result of the last successful cycle.
    pub data: Option<Arc<T>>,
    /// Whether the most recent cycle succeeded.
    pub last_update_success: bool,
    /// Cause of the most recent failure, cleared on success.
    pub last_failure: Option<UpdateFailure>,
    /// Time of the last successful cycle.
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> Clone for CoordinatorState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            last_update_success: self.last_update_success,
            last_failure: self.last_failure.clone(),
            last_updated: self.last_updated,
        }
    }
}

impl<T> Default for CoordinatorState<T> {
    fn default() -> Self {
        Self {
            data: None,
            last_update_success: false,
            last_failure: None,
            last_updated: None,
        }
    }
}

/// Polls one [`PollSource`] at a fixed interval and caches the result.
pub struct Coordinator<S: PollSource> {
    name: String,
    source: S,
    port: Arc<dyn ParkingPort>,
    sites: Arc<[TrackedSite]>,
    update_interval: Duration,
    state: watch::Sender<CoordinatorState<S::Data>>,
    refresh_lock: Mutex<()>,
}

/// Coordinator for occupancy, ticking every minute by default.
pub type FastCoordinator = Coordinator<OccupancySource>;
/// Coordinator for subscription slots, ticking every thirty minutes by default.
pub type SlowCoordinator = Coordinator<SubscriptionSource>;

impl<S: PollSource> Coordinator<S> {
    /// Create a coordinator that has not fetched anything yet.
    pub fn new<N: Into<String>>(
        name: N,
        source: S,
        port: Arc<dyn ParkingPort>,
        sites: Arc<[TrackedSite]>,
        update_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(CoordinatorState::default());
        Self {
            name: name.into(),
            source,
            port,
            sites,
            update_interval,
            state,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState<S::Data>> {
        self.state.subscribe()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState<S::Data> {
        self.state.borrow().clone()
    }

    /// Result of the last successful cycle.
    #[must_use]
    pub fn data(&self) -> Option<Arc<S::Data>> {
        self.state.borrow().data.clone()
    }

    /// Whether the most recent cycle succeeded.
    #[must_use]
    pub fn last_update_success(&self) -> bool {
        self.state.borrow().last_update_success
    }

    /// Whether the last failure requires the user to sign in again.
    #[must_use]
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self.state.borrow().last_failure,
            Some(UpdateFailure::AuthExpired)
        )
    }

    /// Run one poll cycle and publish its outcome.
    ///
    /// Cycles never overlap: a call made while another is in flight waits
    /// for it to finish first.
    ///
    /// # Errors
    ///
    /// Returns the [`PortError`] that failed the cycle. The previously
    /// published data is left in place.
    pub async fn refresh(&self) -> Result<(), PortError> {
        let _guard = self.refresh_lock.lock().await;
        debug!(coordinator = %self.name, sites = self.sites.len(), "refreshing");

        match self.source.fetch(self.port.as_ref(), &self.sites).await {
            Ok(data) => {
                let recovered = self.state.borrow().last_failure.is_some();
                if recovered {
                    info!(coordinator = %self.name, "fetching data recovered");
                }
                self.state.send_replace(CoordinatorState {
                    data: Some(Arc::new(data)),
                    last_update_success: true,
                    last_failure: None,
                    last_updated: Some(Utc::now()),
                });
                Ok(())
            }
            Err(err) => {
                let failure = UpdateFailure::from(&err);
                if self.state.borrow().last_update_success {
                    warn!(coordinator = %self.name, error = %err, "error fetching data");
                } else {
                    debug!(coordinator = %self.name, error = %err, "still failing");
                }
                self.state.send_modify(|state| {
                    state.last_update_success = false;
                    state.last_failure = Some(failure);
                });
                Err(err)
            }
        }
    }

    /// Refresh now, outside the regular schedule.
    ///
    /// Failures are recorded in the published state rather than returned.
    pub async fn request_refresh(&self) {
        if let Err(err) = self.refresh().await {
            debug!(coordinator = %self.name, error = %err, "requested refresh failed");
        }
    }

    /// Start the periodic poll loop.
    ///
    /// The first tick is skipped since setup performs the initial refresh.
    /// Ticks are skipped while [`needs_reauth`](Self::needs_reauth) holds;
    /// only [`refresh`](Self::refresh) clears the flag.
    /// A zero interval disables polling and returns `None`.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.update_interval.is_zero() {
            info!(coordinator = %self.name, "polling disabled");
            return None;
        }
        Some(tokio::spawn(poll_loop(Arc::clone(self), cancel)))
    }
}

async fn poll_loop<S: PollSource>(coordinator: Arc<Coordinator<S>>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(coordinator.update_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if coordinator.needs_reauth() {
                    debug!(coordinator = %coordinator.name, "credentials expired, skipping poll");
                    continue;
                }
                coordinator.request_refresh().await;
            }
        }
    }
    debug!(coordinator = %coordinator.name, "poll loop stopped");
}
