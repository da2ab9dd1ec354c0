use std::collections::HashSet;

use chrono::{DateTime, Utc};
use parkride_core::{
    CoordinatorEntity, EntityRegistry, EntityState, ParkRideIntegration, SiteId, TrackedSite,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Screen {
    Connecting,
    SiteSelect,
    Dashboard,
}

/// One dashboard line, rendered from the entities of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SiteRow {
    pub name: String,
    pub fill_rate: EntityState,
    pub fill_rate_unit: Option<&'static str>,
    pub free_spaces: Option<i64>,
    pub free_electric_spaces: Option<i64>,
    pub free_pmr_spaces: Option<i64>,
    pub subscription: EntityState,
}

pub(crate) struct App {
    pub screen: Screen,

    pub site_options: Vec<TrackedSite>,
    pub site_list_index: usize,
    pub selected_sites: HashSet<SiteId>,

    pub sites: Vec<TrackedSite>,
    pub entities: Option<EntityRegistry>,
    pub fast_updated: Option<DateTime<Utc>>,
    pub slow_updated: Option<DateTime<Utc>>,
    pub needs_reauth: bool,

    pub is_loading: bool,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
}

impl App {
    pub(crate) fn new() -> Self {
        Self {
            screen: Screen::Connecting,
            site_options: Vec::new(),
            site_list_index: 0,
            selected_sites: HashSet::new(),
            sites: Vec::new(),
            entities: None,
            fast_updated: None,
            slow_updated: None,
            needs_reauth: false,
            is_loading: false,
            status_message: None,
            error_message: None,
        }
    }

    pub(crate) fn show_site_options(&mut self, options: Vec<TrackedSite>) {
        self.site_options = options;
        self.site_list_index = 0;
        self.screen = Screen::SiteSelect;
    }

    pub(crate) fn toggle_current_site(&mut self) {
        let Some(site) = self.site_options.get(self.site_list_index) else {
            return;
        };
        if !self.selected_sites.remove(&site.id) {
            self.selected_sites.insert(site.id.clone());
        }
    }

    /// Selected ids in the order the sites were offered.
    pub(crate) fn selected_site_ids(&self) -> Vec<SiteId> {
        self.site_options
            .iter()
            .filter(|site| self.selected_sites.contains(&site.id))
            .map(|site| site.id.clone())
            .collect()
    }

    pub(crate) fn attach(&mut self, integration: &ParkRideIntegration) {
        self.sites = integration.context().sites.to_vec();
        self.entities = Some(integration.entities());
        self.screen = Screen::Dashboard;
        self.sync(integration);
    }

    /// Pull pending coordinator updates into the entities.
    pub(crate) fn sync(&mut self, integration: &ParkRideIntegration) -> bool {
        let context = integration.context();
        self.fast_updated = context.fast.state().last_updated;
        self.slow_updated = context.slow.state().last_updated;
        self.needs_reauth = integration.needs_reauth();
        self.entities
            .as_mut()
            .is_some_and(EntityRegistry::handle_pending_updates)
    }

    pub(crate) fn rows(&self) -> Vec<SiteRow> {
        let Some(entities) = &self.entities else {
            return Vec::new();
        };

        self.sites
            .iter()
            .map(|site| {
                let sensor = entities.sensors_for(&site.id).next();
                let attributes = sensor.and_then(|sensor| sensor.extra_state_attributes());
                let subscription = entities
                    .binary_sensors_for(&site.id)
                    .next()
                    .map_or(EntityState::Unknown, CoordinatorEntity::state);

                SiteRow {
                    name: sensor.map_or_else(
                        || site.name.clone(),
                        |sensor| sensor.base().device_info().name.clone(),
                    ),
                    fill_rate: sensor.map_or(EntityState::Unknown, CoordinatorEntity::state),
                    fill_rate_unit: sensor
                        .and_then(|sensor| sensor.base().description().unit_of_measurement),
                    free_spaces: attributes.map(|attrs| attrs.free_spaces),
                    free_electric_spaces: attributes.map(|attrs| attrs.free_electric_spaces),
                    free_pmr_spaces: attributes.map(|attrs| attrs.free_pmr_spaces),
                    subscription,
                }
            })
            .collect()
    }
}
