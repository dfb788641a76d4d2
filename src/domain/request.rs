use serde_json::{Map, Value};

use crate::domain::validation::ValidationError;
use crate::domain::value::Recipient;

/// Body sent by the setup flow to verify a freshly entered configuration.
pub const TEST_MESSAGE_BODY: &str = "Test SMS from Home Assistant integration.";

#[derive(Debug, Clone, PartialEq)]
/// One outbound SMS to one or more recipients.
///
/// `extra` holds provider-specific fields (for example `callback_url` or
/// `priority`) that are merged into the top level of the JSON payload.
pub struct SendMessage {
    body: String,
    title: Option<String>,
    targets: Vec<Recipient>,
    extra: Map<String, Value>,
}

impl SendMessage {
    /// Field name of the extra-fields mapping in the notify action (`data`).
    pub const EXTRA_FIELD: &'static str = "data";

    pub fn new(targets: Vec<Recipient>, body: impl Into<String>) -> Result<Self, ValidationError> {
        if targets.is_empty() {
            return Err(ValidationError::Empty {
                field: Recipient::FIELD,
            });
        }
        Ok(Self {
            body: body.into(),
            title: None,
            targets,
            extra: Map::new(),
        })
    }

    /// Set a title; an empty title is treated as absent.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = (!title.is_empty()).then_some(title);
        self
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    /// Accept extra fields from dynamic input; anything other than an object is rejected.
    pub fn with_extra_value(self, extra: Value) -> Result<Self, ValidationError> {
        match extra {
            Value::Object(map) => Ok(self.with_extra(map)),
            Value::Null => Ok(self),
            _ => Err(ValidationError::InvalidType {
                field: Self::EXTRA_FIELD,
                expected: "an object",
            }),
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn targets(&self) -> &[Recipient] {
        &self.targets
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Text actually delivered: `"{title}\n\n{body}"` when a title is set.
    pub fn composed_text(&self) -> String {
        match self.title.as_deref() {
            Some(title) => format!("{title}\n\n{}", self.body),
            None => self.body.clone(),
        }
    }
}
