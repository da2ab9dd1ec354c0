//! Entity platforms and the registry of entities created for an entry.

use std::collections::HashMap;

use crate::entity::{
    CoordinatorEntity, EntityDescription, FILLING_RATE, FillRateSensor, SUBSCRIPTION_AVAILABILITY,
    SubscriptionSensor,
};
use crate::model::SiteId;
use crate::service::RuntimeContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Kinds of entities the integration provides.
pub enum Platform {
    /// Numeric sensors fed by the occupancy coordinator.
    Sensor,
    /// Binary sensors fed by the subscription coordinator.
    BinarySensor,
}

/// Platforms set up for every entry.
pub const PLATFORMS: [Platform; 2] = [Platform::Sensor, Platform::BinarySensor];

impl Platform {
    /// Descriptions of the entities created per site on this platform.
    #[must_use]
    pub fn descriptions(self) -> &'static [EntityDescription] {
        match self {
            Platform::Sensor => &[FILLING_RATE],
            Platform::BinarySensor => &[SUBSCRIPTION_AVAILABILITY],
        }
    }
}

/// Entities created for one entry, one per site and description.
#[derive(Debug)]
pub struct EntityRegistry {
    sensors: Vec<FillRateSensor>,
    binary_sensors: Vec<SubscriptionSensor>,
    by_site: HashMap<SiteId, (Vec<usize>, Vec<usize>)>,
}

impl EntityRegistry {
    /// Create every entity for the sites of a running integration.
    #[must_use]
    pub fn new(context: &RuntimeContext) -> Self {
        let mut registry = Self {
            sensors: Vec::new(),
            binary_sensors: Vec::new(),
            by_site: HashMap::new(),
        };

        for platform in PLATFORMS {
            for site in context.sites.iter() {
                for description in platform.descriptions() {
                    let slots = registry.by_site.entry(site.id.clone()).or_default();
                    match platform {
                        Platform::Sensor => {
                            slots.0.push(registry.sensors.len());
                            registry.sensors.push(FillRateSensor::new(
                                context.fast.subscribe(),
                                *description,
                                site.clone(),
                            ));
                        }
                        Platform::BinarySensor => {
                            slots.1.push(registry.binary_sensors.len());
                            registry.binary_sensors.push(SubscriptionSensor::new(
                                context.slow.subscribe(),
                                *description,
                                site.clone(),
                            ));
                        }
                    }
                }
            }
        }

        registry
    }

    /// All numeric sensors.
    #[must_use]
    pub fn sensors(&self) -> &[FillRateSensor] {
        &self.sensors
    }

    /// All binary sensors.
    #[must_use]
    pub fn binary_sensors(&self) -> &[SubscriptionSensor] {
        &self.binary_sensors
    }

    /// Numeric sensors of one site.
    pub fn sensors_for<'reg>(
        &'reg self,
        site: &SiteId,
    ) -> impl Iterator<Item = &'reg FillRateSensor> + use<'reg> {
        let indices = self.by_site.get(site).map_or(&[][..], |slots| &slots.0[..]);
        indices.iter().filter_map(|&index| self.sensors.get(index))
    }

    /// Binary sensors of one site.
    pub fn binary_sensors_for<'reg>(
        &'reg self,
        site: &SiteId,
    ) -> impl Iterator<Item = &'reg SubscriptionSensor> + use<'reg> {
        let indices = self.by_site.get(site).map_or(&[][..], |slots| &slots.1[..]);
        indices.iter().filter_map(|&index| self.binary_sensors.get(index))
    }

    /// Unique ids of all entities.
    pub fn unique_ids(&self) -> impl Iterator<Item = &str> {
        self.sensors
            .iter()
            .map(|sensor| sensor.base().unique_id())
            .chain(
                self.binary_sensors
                    .iter()
                    .map(|sensor| sensor.base().unique_id()),
            )
    }

    /// Apply pending coordinator updates. Returns whether anything changed.
    pub fn handle_pending_updates(&mut self) -> bool {
        let mut changed = false;
        for sensor in &mut self.sensors {
            if sensor.has_pending_update() {
                sensor.handle_coordinator_update();
                changed = true;
            }
        }
        for sensor in &mut self.binary_sensors {
            if sensor.has_pending_update() {
                sensor.handle_coordinator_update();
                changed = true;
            }
        }
        changed
    }
}
