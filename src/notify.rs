//! The callable "send message" action (`notify.smsto`) and its registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::client::{SmsToClient, SmsToError};
use crate::domain::{Recipient, SendMessage, ValidationError};

/// Full name the action is registered under.
pub const SERVICE_NAME: &str = "notify.smsto";

/// Message text that turns a call into a dry run with no gateway request.
pub const TEST_MESSAGE: &str = "TEST_MESSAGE";

const MESSAGE_FIELD: &str = "message";
const TITLE_FIELD: &str = "title";
const TARGET_FIELD: &str = "target";
const CALLBACK_URL_FIELD: &str = "callback_url";
const PRIORITY_FIELD: &str = "priority";

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid notify call: {0}")]
    Invalid(#[from] ValidationError),

    #[error("failed to send SMS notification: {0}")]
    SendFailed(#[source] SmsToError),

    #[error("service {0} is not registered")]
    UnknownService(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// The sentinel message was received; nothing was sent.
    DryRun,
}

#[derive(Debug, Clone, PartialEq)]
/// Parsed action input.
pub struct NotifyCall {
    pub message: String,
    pub title: Option<String>,
    pub target: Vec<String>,
    pub data: Map<String, Value>,
}

impl NotifyCall {
    /// Parse `{message, title?, target: string | string[], data?}`.
    pub fn from_value(call: &Value) -> Result<Self, ValidationError> {
        let fields = call.as_object().ok_or(ValidationError::InvalidType {
            field: "call",
            expected: "an object",
        })?;

        let message = optional_string(fields, MESSAGE_FIELD)?.ok_or(ValidationError::Empty {
            field: MESSAGE_FIELD,
        })?;
        let title = optional_string(fields, TITLE_FIELD)?;
        let target = parse_target(fields.get(TARGET_FIELD))?;
        let data = parse_data(fields.get(SendMessage::EXTRA_FIELD))?;

        Ok(Self {
            message,
            title,
            target,
            data,
        })
    }

    pub fn is_test_message(&self) -> bool {
        self.message == TEST_MESSAGE
    }

    /// Validate into a gateway request; an empty target list is rejected here.
    pub fn into_request(self) -> Result<SendMessage, ValidationError> {
        let targets = self
            .target
            .into_iter()
            .map(Recipient::new)
            .collect::<Result<Vec<_>, _>>()?;
        let mut request = SendMessage::new(targets, self.message)?.with_extra(self.data);
        if let Some(title) = self.title {
            request = request.with_title(title);
        }
        Ok(request)
    }
}

fn optional_string(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(ValidationError::InvalidType {
            field,
            expected: "a string",
        }),
    }
}

/// A single string becomes a one-element list.
fn parse_target(target: Option<&Value>) -> Result<Vec<String>, ValidationError> {
    let invalid = ValidationError::InvalidType {
        field: TARGET_FIELD,
        expected: "a string or a list of strings",
    };
    match target {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(single)) => Ok(vec![single.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| invalid.clone())
            })
            .collect(),
        Some(_) => Err(invalid),
    }
}

fn parse_data(data: Option<&Value>) -> Result<Map<String, Value>, ValidationError> {
    let fields = match data {
        None | Some(Value::Null) => return Ok(Map::new()),
        Some(Value::Object(fields)) => fields,
        Some(_) => {
            return Err(ValidationError::InvalidType {
                field: SendMessage::EXTRA_FIELD,
                expected: "an object",
            });
        }
    };

    if let Some(callback) = fields.get(CALLBACK_URL_FIELD) {
        let raw = callback.as_str().ok_or(ValidationError::InvalidType {
            field: CALLBACK_URL_FIELD,
            expected: "a URL string",
        })?;
        let is_web_url = Url::parse(raw)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !is_web_url {
            return Err(ValidationError::InvalidUrl {
                field: CALLBACK_URL_FIELD,
                input: raw.to_owned(),
            });
        }
    }
    if fields.get(PRIORITY_FIELD).is_some_and(|it| !it.is_string()) {
        return Err(ValidationError::InvalidType {
            field: PRIORITY_FIELD,
            expected: "a string",
        });
    }

    Ok(fields.clone())
}

#[derive(Debug, Clone)]
/// Handler behind [`SERVICE_NAME`].
pub struct NotifyService {
    client: SmsToClient,
}

impl NotifyService {
    pub fn new(client: SmsToClient) -> Self {
        Self { client }
    }

    /// Handle a raw action call as delivered by the host.
    pub async fn call(&self, data: &Value) -> Result<NotifyOutcome, ActionError> {
        let call = NotifyCall::from_value(data).inspect_err(|err| {
            error!(error = %err, "rejected notify call");
        })?;
        self.handle(call).await
    }

    pub async fn handle(&self, call: NotifyCall) -> Result<NotifyOutcome, ActionError> {
        if call.is_test_message() {
            info!("test message detected; skipping gateway call");
            debug!(title = ?call.title, target = ?call.target, data = ?call.data, "test message details");
            return Ok(NotifyOutcome::DryRun);
        }

        let request = call.into_request().inspect_err(|err| {
            error!(error = %err, "invalid notify call");
        })?;
        self.client.send(request).await.map_err(|err| {
            error!(error = %err, "error sending SMS notification");
            ActionError::SendFailed(err)
        })?;
        info!("SMS notification sent successfully");
        Ok(NotifyOutcome::Sent)
    }
}

#[derive(Debug, Default)]
/// Active actions by name.
///
/// Several entries may provide the same action. Calls go to the earliest
/// provider still registered; when it leaves, the next one takes over.
pub struct ServiceRegistry {
    services: Mutex<HashMap<String, Vec<Provider>>>,
}

#[derive(Debug)]
struct Provider {
    id: String,
    service: Arc<NotifyService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `name` on behalf of `provider_id`.
    ///
    /// Returns `true` when this provider is now the one serving calls. A
    /// provider registering the same name twice keeps its first handler.
    pub fn register(&self, name: &str, provider_id: &str, service: Arc<NotifyService>) -> bool {
        let mut services = self.services.lock().unwrap_or_else(PoisonError::into_inner);
        let providers = services.entry(name.to_owned()).or_default();
        if providers.iter().any(|it| it.id == provider_id) {
            debug!(service = name, provider = provider_id, "service already registered");
            return false;
        }
        providers.push(Provider {
            id: provider_id.to_owned(),
            service,
        });
        let active = providers.len() == 1;
        if active {
            debug!(service = name, provider = provider_id, "service registered");
        } else {
            debug!(service = name, provider = provider_id, "service provider queued");
        }
        active
    }

    /// Withdraw `provider_id`'s handler. The action stays registered while
    /// any other provider remains.
    pub fn unregister(&self, name: &str, provider_id: &str) -> bool {
        let mut services = self.services.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(providers) = services.get_mut(name) else {
            return false;
        };
        let Some(index) = providers.iter().position(|it| it.id == provider_id) else {
            return false;
        };
        providers.remove(index);
        let next = providers.first().map(|it| it.id.clone());
        match next {
            None => {
                services.remove(name);
                debug!(service = name, "service removed");
            }
            Some(next) if index == 0 => {
                info!(service = name, provider = %next, "service handed over");
            }
            Some(_) => {}
        }
        true
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Provider currently serving `name`.
    pub fn active_provider(&self, name: &str) -> Option<String> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|providers| providers.first())
            .map(|it| it.id.clone())
    }

    /// Dispatch a host call to the named action.
    pub async fn call(&self, name: &str, data: &Value) -> Result<NotifyOutcome, ActionError> {
        let service = self
            .services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|providers| providers.first())
            .map(|it| Arc::clone(&it.service))
            .ok_or_else(|| ActionError::UnknownService(name.to_owned()))?;
        service.call(data).await
    }
}
