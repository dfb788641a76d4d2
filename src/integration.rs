//! Runtime wiring of one configured entry: client, coordinator, sensors,
//! notify action and the polling task.

use std::sync::Arc;

use tracing::{info, warn};

use crate::client::{ClientSession, SmsToClient};
use crate::coordinator::{
    Coordinator, CoordinatorState, RefreshScheduler, SchedulerHandle, UPDATE_INTERVAL,
    UpdateFailed, WatchPublisher,
};
use crate::notify::{NotifyService, SERVICE_NAME, ServiceRegistry};
use crate::sensor::Sensor;
use crate::store::ConfigEntry;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The startup refresh failed; the host should retry setup later.
    #[error("SMS.to entry is not ready: {0}")]
    NotReady(#[source] UpdateFailed),
}

/// A loaded entry. Dropping it aborts the polling task; prefer [`Integration::unload`].
pub struct Integration {
    entry: ConfigEntry,
    coordinator: Arc<Coordinator>,
    publisher: Arc<WatchPublisher>,
    sensors: Vec<Sensor>,
    registry: Arc<ServiceRegistry>,
    scheduler: SchedulerHandle,
}

impl Integration {
    /// Bring `entry` online. Runs one refresh before anything is exposed.
    pub async fn setup(
        entry: ConfigEntry,
        session: ClientSession,
        registry: Arc<ServiceRegistry>,
    ) -> Result<Self, SetupError> {
        let client = SmsToClient::with_session(session, entry.credentials.clone());
        let publisher = Arc::new(WatchPublisher::new());
        let coordinator = Arc::new(Coordinator::new(client.clone(), publisher.clone()));

        coordinator
            .first_refresh()
            .await
            .map_err(SetupError::NotReady)?;

        let service = Arc::new(NotifyService::new(client));
        if !registry.register(SERVICE_NAME, &entry.entry_id, service) {
            warn!(
                service = SERVICE_NAME,
                entry_id = %entry.entry_id,
                "notify action already provided by another entry; standing by"
            );
        }

        let sensors = Sensor::for_entry(&entry.entry_id, &publisher.subscribe());
        let scheduler = RefreshScheduler::spawn(coordinator.clone(), UPDATE_INTERVAL);
        info!(title = %entry.title, "SMS.to entry loaded");

        Ok(Self {
            entry,
            coordinator,
            publisher,
            sensors,
            registry,
            scheduler,
        })
    }

    pub fn entry(&self) -> &ConfigEntry {
        &self.entry
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn state(&self) -> CoordinatorState {
        self.publisher.current()
    }

    /// Trigger an out-of-schedule refresh.
    pub fn request_refresh(&self) {
        self.scheduler.force_refresh();
    }

    /// Stop polling and withdraw this entry's notify handler. Another loaded
    /// entry takes the action over if one is standing by.
    pub async fn unload(self) {
        self.registry.unregister(SERVICE_NAME, &self.entry.entry_id);
        self.scheduler.shutdown().await;
        info!(title = %self.entry.title, "SMS.to entry unloaded");
    }
}
