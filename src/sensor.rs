//! Read-only account sensors backed by the coordinator's published state.

use tokio::sync::watch;

use crate::coordinator::CoordinatorState;
use crate::domain::AccountSnapshot;

/// Integration domain used in device identifiers and unique ids.
pub const DOMAIN: &str = "smsto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Measurement,
    Total,
}

impl StateClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Measurement => "measurement",
            Self::Total => "total",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Balance,
    TotalMessages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Static metadata of one sensor.
pub struct SensorDescription {
    pub kind: SensorKind,
    pub key: &'static str,
    pub icon: &'static str,
    pub unit_of_measurement: Option<&'static str>,
    pub state_class: StateClass,
}

pub const SENSOR_DESCRIPTIONS: [SensorDescription; 2] = [
    SensorDescription {
        kind: SensorKind::Balance,
        key: "balance",
        icon: "mdi:cash",
        unit_of_measurement: Some("EUR"),
        state_class: StateClass::Measurement,
    },
    SensorDescription {
        kind: SensorKind::TotalMessages,
        key: "total_messages",
        icon: "mdi:message-text-outline",
        unit_of_measurement: None,
        state_class: StateClass::Total,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Device all sensors of the integration are grouped under.
pub struct DeviceInfo {
    pub identifier: (&'static str, &'static str),
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub entry_type: &'static str,
}

pub const DEVICE_INFO: DeviceInfo = DeviceInfo {
    identifier: (DOMAIN, DOMAIN),
    name: "SMS Notifications via SMS.to",
    manufacturer: "SMS.to",
    model: "SMS Notifications via SMS.to",
    entry_type: "service",
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorValue {
    Amount(f64),
    Count(u64),
}

impl SensorDescription {
    fn value_of(&self, snapshot: &AccountSnapshot) -> Option<SensorValue> {
        match self.kind {
            SensorKind::Balance => snapshot.balance.map(SensorValue::Amount),
            SensorKind::TotalMessages => snapshot.total_messages.map(SensorValue::Count),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sensor {
    description: SensorDescription,
    unique_id: String,
    state: watch::Receiver<CoordinatorState>,
}

impl Sensor {
    pub fn new(
        description: SensorDescription,
        entry_id: &str,
        state: watch::Receiver<CoordinatorState>,
    ) -> Self {
        Self {
            description,
            unique_id: format!("{entry_id}_{}", description.key),
            state,
        }
    }

    /// One sensor per entry in [`SENSOR_DESCRIPTIONS`].
    pub fn for_entry(entry_id: &str, state: &watch::Receiver<CoordinatorState>) -> Vec<Self> {
        SENSOR_DESCRIPTIONS
            .iter()
            .map(|description| Self::new(*description, entry_id, state.clone()))
            .collect()
    }

    pub fn description(&self) -> &SensorDescription {
        &self.description
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn device_info(&self) -> DeviceInfo {
        DEVICE_INFO
    }

    /// Latest value; `None` before the first snapshot or when the gateway omitted it.
    pub fn native_value(&self) -> Option<SensorValue> {
        let state = self.state.borrow();
        state
            .snapshot
            .as_ref()
            .and_then(|snapshot| self.description.value_of(snapshot))
    }

    /// `false` while the most recent refresh cycle failed.
    pub fn available(&self) -> bool {
        self.state.borrow().last_update_success
    }

    /// Wait until the coordinator publishes new state.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.state.changed().await
    }
}
