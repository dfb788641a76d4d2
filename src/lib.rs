//! SMS.to notification integration for home-automation hosts.
//!
//! The crate is layered the same way top to bottom: a domain layer of
//! validated types, a transport layer for the gateway's JSON quirks, and a
//! client orchestrating the three HTTP calls. On top sit the account-polling
//! [`coordinator`], the read-only [`sensor`]s, the `notify.smsto` action and
//! the [`setup`] flow that creates persisted [`store`] entries.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use smsto::{ClientSession, ConfigEntry, Credentials, Integration, ServiceRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let entry = ConfigEntry::new(Credentials::parse("your-api-key", "Alerts")?);
//!     let registry = Arc::new(ServiceRegistry::new());
//!     let integration = Integration::setup(entry, ClientSession::new(), registry.clone()).await?;
//!
//!     let call = serde_json::json!({ "message": "Door opened", "target": "+35799999999" });
//!     registry.call(smsto::notify::SERVICE_NAME, &call).await?;
//!
//!     integration.unload().await;
//!     Ok(())
//! }
//! ```
#![forbid(unsafe_code)]

pub mod client;
pub mod coordinator;
pub mod domain;
pub mod integration;
pub mod notify;
pub mod sensor;
pub mod setup;
pub mod store;
mod transport;

pub use client::{ClientSession, SmsToClient, SmsToClientBuilder, SmsToError};
pub use coordinator::{Coordinator, CoordinatorState, UpdateFailed, WatchPublisher};
pub use domain::{
    AccountSnapshot, ApiKey, Credentials, HttpStatus, KnownHttpStatus, Recipient, SendMessage,
    SenderId, ValidationError,
};
pub use integration::{Integration, SetupError};
pub use notify::{ActionError, NotifyOutcome, NotifyService, ServiceRegistry};
pub use sensor::{Sensor, SensorValue};
pub use setup::{FlowResult, ReconfigureFlow, SetupFlow};
pub use store::{ConfigEntry, EntryStore, InMemoryEntryStore, StoreError, TomlEntryStore};
