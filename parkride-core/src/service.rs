//! Integration runtime: setup, polling, and teardown of one config entry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigEntry;
use crate::coordinator::{
    Coordinator, FAST_INTERVAL, FastCoordinator, OccupancySource, SLOW_INTERVAL, SlowCoordinator,
    SubscriptionSource,
};
use crate::model::TrackedSite;
use crate::platform::EntityRegistry;
use crate::ports::{ParkingPort, PortError};

#[derive(thiserror::Error, Debug)]
/// Errors that prevent an entry from being set up.
pub enum SetupError {
    /// The stored credentials were rejected; the user must sign in again.
    #[error("Credentials expired, re-authentication required")]
    AuthFailed,
    /// The backend could not be reached; setup may be retried later.
    #[error("Not ready: {0}")]
    NotReady(#[source] PortError),
}

impl From<PortError> for SetupError {
    fn from(err: PortError) -> Self {
        if err.is_auth_failure() {
            SetupError::AuthFailed
        } else {
            SetupError::NotReady(err)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Poll cadence of both coordinators.
pub struct PollIntervals {
    /// Occupancy interval.
    pub fast: Duration,
    /// Subscription interval.
    pub slow: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            fast: FAST_INTERVAL,
            slow: SLOW_INTERVAL,
        }
    }
}

/// Objects shared by the platforms of a running entry.
pub struct RuntimeContext {
    /// Sites selected in the entry.
    pub sites: Arc<[TrackedSite]>,
    /// Occupancy coordinator.
    pub fast: Arc<FastCoordinator>,
    /// Subscription coordinator.
    pub slow: Arc<SlowCoordinator>,
}

/// A set-up config entry with its coordinators running.
pub struct ParkRideIntegration {
    context: RuntimeContext,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ParkRideIntegration {
    /// Set up an entry: refresh tokens, fetch initial data, start polling.
    ///
    /// The port should already carry a token listener persisting rotated
    /// refresh tokens, so the token issued here is stored before the first
    /// poll cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::AuthFailed`] when the stored refresh token is
    /// rejected, or [`SetupError::NotReady`] when the initial fetch fails.
    pub async fn setup(
        entry: &ConfigEntry,
        port: Arc<dyn ParkingPort>,
        intervals: PollIntervals,
    ) -> Result<Self, SetupError> {
        if let Err(err) = port.refresh_tokens().await {
            warn!(error = %err, entry = %entry.title, "token refresh failed during setup");
            return Err(err.into());
        }

        let sites: Arc<[TrackedSite]> = Arc::from(entry.data.sites.clone());
        let fast = Arc::new(Coordinator::new(
            format!("{} fast interval coordinator", entry.title),
            OccupancySource,
            Arc::clone(&port),
            Arc::clone(&sites),
            intervals.fast,
        ));
        let slow = Arc::new(Coordinator::new(
            format!("{} slow interval coordinator", entry.title),
            SubscriptionSource,
            Arc::clone(&port),
            Arc::clone(&sites),
            intervals.slow,
        ));

        let (fast_result, slow_result) = tokio::join!(fast.refresh(), slow.refresh());
        fast_result?;
        slow_result?;

        let cancel = CancellationToken::new();
        let tasks = [
            fast.spawn(cancel.child_token()),
            slow.spawn(cancel.child_token()),
        ]
        .into_iter()
        .flatten()
        .collect();

        info!(sites = sites.len(), entry = %entry.title, "integration set up");
        Ok(Self {
            context: RuntimeContext {
                sites,
                fast,
                slow,
            },
            cancel,
            tasks,
        })
    }

    /// Shared runtime objects.
    #[must_use]
    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    /// Create the entities of every platform.
    #[must_use]
    pub fn entities(&self) -> EntityRegistry {
        EntityRegistry::new(&self.context)
    }

    /// Whether a coordinator reported that the credentials expired.
    #[must_use]
    pub fn needs_reauth(&self) -> bool {
        self.context.fast.needs_reauth() || self.context.slow.needs_reauth()
    }

    /// Refresh both coordinators now.
    pub async fn request_refresh(&self) {
        tokio::join!(
            self.context.fast.request_refresh(),
            self.context.slow.request_refresh()
        );
    }

    /// Stop polling and wait for the poll tasks to finish.
    pub async fn unload(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "poll task ended abnormally");
            }
        }
        debug!("integration unloaded");
    }
}
