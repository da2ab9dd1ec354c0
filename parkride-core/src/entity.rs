//! Entity adapters projecting coordinator results onto display state.
//!
//! Adapters never fetch anything. They hold a receiver on their
//! coordinator and recompute their fields when notified.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

use crate::coordinator::CoordinatorState;
use crate::model::{OccupancyData, SubscriptionData, TrackedSite};

/// Integration domain, used in device identifiers.
pub const DOMAIN: &str = "cflpr";
/// Manufacturer reported for every device.
pub const MANUFACTURER: &str = "CFL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Static description shared by all entities of one kind.
pub struct EntityDescription {
    /// Stable key, part of the unique id.
    pub key: &'static str,
    /// Translation key for the entity name.
    pub translation_key: &'static str,
    /// Unit of the native value.
    pub unit_of_measurement: Option<&'static str>,
}

/// Fill rate of a site, in percent.
pub const FILLING_RATE: EntityDescription = EntityDescription {
    key: "filling_rate",
    translation_key: "filling_rate",
    unit_of_measurement: Some("%"),
};

/// Whether subscription slots are left at a site.
pub const SUBSCRIPTION_AVAILABILITY: EntityDescription = EntityDescription {
    key: "subscription_availability",
    translation_key: "subscription_availability",
    unit_of_measurement: None,
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Device grouping all entities of one site.
pub struct DeviceInfo {
    /// `(domain, site id)` pair identifying the device.
    pub identifiers: (String, String),
    /// Device manufacturer.
    pub manufacturer: String,
    /// Device model, the site name.
    pub model: String,
    /// Device display name.
    pub name: String,
}

impl DeviceInfo {
    /// Device info for a tracked site.
    #[must_use]
    pub fn for_site(site: &TrackedSite) -> Self {
        Self {
            identifiers: (DOMAIN.to_owned(), site.id.0.clone()),
            manufacturer: MANUFACTURER.to_owned(),
            model: site.name.clone(),
            name: format!("{MANUFACTURER} {}", site.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// State shown for an entity.
pub enum EntityState {
    /// The coordinator's last update failed or nothing was fetched yet.
    Unavailable,
    /// The coordinator has no reading for this site.
    Unknown,
    /// Numeric value.
    Number(i64),
    /// Boolean value.
    On(bool),
}

impl fmt::Display for EntityState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Unavailable => formatter.write_str("unavailable"),
            EntityState::Unknown => formatter.write_str("unknown"),
            EntityState::Number(value) => write!(formatter, "{value}"),
            EntityState::On(true) => formatter.write_str("on"),
            EntityState::On(false) => formatter.write_str("off"),
        }
    }
}

/// Fields shared by every coordinator-backed entity.
#[derive(Debug)]
pub struct EntityBase<T> {
    site: TrackedSite,
    description: EntityDescription,
    unique_id: String,
    device_info: DeviceInfo,
    receiver: watch::Receiver<CoordinatorState<T>>,
    available: bool,
}

impl<T> EntityBase<T> {
    fn new(
        receiver: watch::Receiver<CoordinatorState<T>>,
        description: EntityDescription,
        site: TrackedSite,
    ) -> Self {
        Self {
            unique_id: format!("{}_{}", site.id, description.key),
            device_info: DeviceInfo::for_site(&site),
            site,
            description,
            receiver,
            available: false,
        }
    }

    /// Entity description.
    #[must_use]
    pub fn description(&self) -> &EntityDescription {
        &self.description
    }

    /// Unique id, stable across restarts.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Device the entity belongs to.
    #[must_use]
    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }
}

/// An entity that mirrors the data of one coordinator.
pub trait CoordinatorEntity {
    /// Data published by the coordinator.
    type Data;

    /// Shared entity fields.
    fn base(&self) -> &EntityBase<Self::Data>;

    /// Mutable shared entity fields.
    fn base_mut(&mut self) -> &mut EntityBase<Self::Data>;

    /// Recompute entity-specific fields from the latest data.
    fn update_state(&mut self, data: Option<&Self::Data>);

    /// State to display.
    fn state(&self) -> EntityState;

    /// Pull the coordinator's latest state into the entity.
    fn handle_coordinator_update(&mut self) {
        let state = self.base_mut().receiver.borrow_and_update().clone();
        self.base_mut().available = state.last_update_success;
        self.update_state(state.data.as_deref());
    }

    /// Whether the coordinator published something not yet handled.
    fn has_pending_update(&self) -> bool {
        self.base().receiver.has_changed().unwrap_or(false)
    }

    /// Whether the coordinator's last update succeeded.
    fn available(&self) -> bool {
        self.base().available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// Extra attributes of a fill-rate sensor.
pub struct SpaceAttributes {
    /// Free spaces over all categories.
    pub free_spaces: i64,
    /// Free spaces with a charging point.
    pub free_electric_spaces: i64,
    /// Free spaces reserved for persons with reduced mobility.
    pub free_pmr_spaces: i64,
}

/// Numeric sensor reporting the fill rate of a site.
#[derive(Debug)]
pub struct FillRateSensor {
    base: EntityBase<OccupancyData>,
    native_value: Option<i64>,
    extra_state_attributes: Option<SpaceAttributes>,
}

impl FillRateSensor {
    /// Create a sensor bound to the occupancy coordinator.
    #[must_use]
    pub fn new(
        receiver: watch::Receiver<CoordinatorState<OccupancyData>>,
        description: EntityDescription,
        site: TrackedSite,
    ) -> Self {
        let mut sensor = Self {
            base: EntityBase::new(receiver, description, site),
            native_value: None,
            extra_state_attributes: None,
        };
        sensor.handle_coordinator_update();
        sensor
    }

    /// Fill rate truncated to whole percent.
    #[must_use]
    pub fn native_value(&self) -> Option<i64> {
        self.native_value
    }

    /// Free-space counters.
    #[must_use]
    pub fn extra_state_attributes(&self) -> Option<&SpaceAttributes> {
        self.extra_state_attributes.as_ref()
    }
}

impl CoordinatorEntity for FillRateSensor {
    type Data = OccupancyData;

    fn base(&self) -> &EntityBase<OccupancyData> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase<OccupancyData> {
        &mut self.base
    }

    fn update_state(&mut self, data: Option<&OccupancyData>) {
        let snapshot = data.and_then(|data| data.availability.get(&self.base.site.id));

        self.native_value = snapshot
            .map(|snapshot| snapshot.fill_rate_percent)
            .filter(|rate| rate.is_finite())
            .map(truncate_percent);
        self.extra_state_attributes = snapshot.map(|snapshot| SpaceAttributes {
            free_spaces: snapshot.free_spaces,
            free_electric_spaces: snapshot.free_electric_spaces,
            free_pmr_spaces: snapshot.free_pmr_spaces,
        });
    }

    fn state(&self) -> EntityState {
        if !self.available() {
            return EntityState::Unavailable;
        }
        self.native_value
            .map_or(EntityState::Unknown, EntityState::Number)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "the sensor reports whole percent"
)]
fn truncate_percent(rate: f64) -> i64 {
    rate.trunc() as i64
}

/// Binary sensor reporting whether subscription slots are left.
#[derive(Debug)]
pub struct SubscriptionSensor {
    base: EntityBase<SubscriptionData>,
    is_on: Option<bool>,
}

impl SubscriptionSensor {
    /// Create a binary sensor bound to the subscription coordinator.
    #[must_use]
    pub fn new(
        receiver: watch::Receiver<CoordinatorState<SubscriptionData>>,
        description: EntityDescription,
        site: TrackedSite,
    ) -> Self {
        let mut sensor = Self {
            base: EntityBase::new(receiver, description, site),
            is_on: None,
        };
        sensor.handle_coordinator_update();
        sensor
    }

    /// Whether slots are available, `None` when unknown.
    #[must_use]
    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }
}

impl CoordinatorEntity for SubscriptionSensor {
    type Data = SubscriptionData;

    fn base(&self) -> &EntityBase<SubscriptionData> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase<SubscriptionData> {
        &mut self.base
    }

    fn update_state(&mut self, data: Option<&SubscriptionData>) {
        self.is_on = data
            .and_then(|data| data.slot_available.get(&self.base.site.id))
            .map(|slot| slot.available);
    }

    fn state(&self) -> EntityState {
        if !self.available() {
            return EntityState::Unavailable;
        }
        self.is_on.map_or(EntityState::Unknown, EntityState::On)
    }
}
