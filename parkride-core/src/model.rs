//! Domain data structures for tracked sites, occupancy, and availability.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Identifier of a park-and-ride site as used by the API.
pub struct SiteId(pub String);

impl fmt::Display for SiteId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<&str> for SiteId {
    fn from(raw: &str) -> Self {
        SiteId(raw.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A physical site selected for tracking.
pub struct TrackedSite {
    /// Unique identifier.
    pub id: SiteId,
    /// Display name.
    pub name: String,
}

impl TrackedSite {
    /// Construct a tracked site.
    #[must_use]
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: SiteId(id.into()),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Raw occupancy counters reported for one site.
pub struct Occupancy {
    /// Occupied spaces over all categories.
    pub occupied_total_spaces: u32,
    /// Capacity over all categories.
    pub total_spaces: u32,
    /// Occupied spaces with a charging point.
    pub occupied_electrical_spaces: u32,
    /// Spaces with a charging point.
    pub total_electrical_spaces: u32,
    /// Occupied spaces reserved for persons with reduced mobility.
    pub occupied_pmr_spaces: u32,
    /// Spaces reserved for persons with reduced mobility.
    pub total_pmr_spaces: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Availability derived from one occupancy reading.
pub struct AvailabilitySnapshot {
    /// Share of occupied spaces, in percent. `NaN` for a site without capacity.
    pub fill_rate_percent: f64,
    /// Free spaces over all categories.
    pub free_spaces: i64,
    /// Free spaces with a charging point.
    pub free_electric_spaces: i64,
    /// Free spaces reserved for persons with reduced mobility.
    pub free_pmr_spaces: i64,
}

impl AvailabilitySnapshot {
    /// Derive fill rate and free counts from raw counters.
    ///
    /// Counters are not cross-checked: a site reporting more occupied than
    /// total spaces yields negative free counts. A site with zero capacity
    /// yields a `NaN` fill rate instead of failing the poll cycle; the fill
    /// rate sensor then reports an unknown state.
    #[must_use]
    pub fn from_occupancy(occupancy: &Occupancy) -> Self {
        let fill_rate_percent = if occupancy.total_spaces == 0 {
            f64::NAN
        } else {
            f64::from(occupancy.occupied_total_spaces) / f64::from(occupancy.total_spaces) * 100.0
        };

        Self {
            fill_rate_percent,
            free_spaces: free(occupancy.total_spaces, occupancy.occupied_total_spaces),
            free_electric_spaces: free(
                occupancy.total_electrical_spaces,
                occupancy.occupied_electrical_spaces,
            ),
            free_pmr_spaces: free(occupancy.total_pmr_spaces, occupancy.occupied_pmr_spaces),
        }
    }
}

impl From<Occupancy> for AvailabilitySnapshot {
    fn from(occupancy: Occupancy) -> Self {
        Self::from_occupancy(&occupancy)
    }
}

fn free(total: u32, occupied: u32) -> i64 {
    i64::from(total) - i64::from(occupied)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Whether subscription slots are left at a site.
pub struct SubscriptionAvailability {
    /// `true` while at least one slot remains.
    pub available: bool,
}

impl SubscriptionAvailability {
    /// Derive availability from the remaining slot count.
    #[must_use]
    pub fn from_slots(slots_remaining: i64) -> Self {
        Self {
            available: slots_remaining > 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Result of one fast poll cycle, keyed by site.
pub struct OccupancyData {
    /// Availability per site that answered during the cycle.
    pub availability: HashMap<SiteId, AvailabilitySnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Result of one slow poll cycle, keyed by site.
pub struct SubscriptionData {
    /// Subscription availability per site that answered during the cycle.
    pub slot_available: HashMap<SiteId, SubscriptionAvailability>,
}
