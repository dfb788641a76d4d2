//! Setup flow: credential validation, live test send, persistence, reconfiguration.
//!
//! ```text
//! User ──valid──▶ TestMessage ──sent──▶ entry created
//!  ▲  └─invalid─┘      │  ▲
//!  │                   └──┘ invalid_test_number / test_message_failed
//!  └── already_configured aborts
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::client::{ClientSession, SmsToClient};
use crate::domain::{
    ApiKey, Credentials, Recipient, SendMessage, SenderId, TEST_MESSAGE_BODY, ValidationError,
};
use crate::store::{ConfigEntry, EntryStore, StoreError};

/// Form field of the test-message step.
pub const TEST_NUMBER_FIELD: &str = "test_number";

/// Minimum length of the test destination after trimming.
pub const TEST_NUMBER_MIN_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    User,
    TestMessage,
    Reconfigure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowErrorCode {
    InvalidApiKey,
    InvalidSenderId,
    InvalidTestNumber,
    TestMessageFailed,
}

impl FlowErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidApiKey => "invalid_api_key",
            Self::InvalidSenderId => "invalid_sender_id",
            Self::InvalidTestNumber => "invalid_test_number",
            Self::TestMessageFailed => "test_message_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    AlreadyConfigured,
}

impl AbortReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyConfigured => "already_configured",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResult {
    /// Render `step` again (or for the first time). `errors` is keyed by field
    /// name; `defaults` pre-fills the form.
    ShowForm {
        step: FlowStep,
        errors: BTreeMap<&'static str, FlowErrorCode>,
        defaults: BTreeMap<&'static str, String>,
    },
    CreateEntry(ConfigEntry),
    UpdateEntry(ConfigEntry),
    Abort(AbortReason),
}

impl FlowResult {
    fn form(step: FlowStep) -> Self {
        Self::ShowForm {
            step,
            errors: BTreeMap::new(),
            defaults: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Raw credentials as typed by the user.
pub struct CredentialsInput {
    pub api_key: String,
    pub sender_id: String,
}

/// Validate both fields independently so every error is reported at once.
fn validate_credentials(input: &CredentialsInput) -> Result<Credentials, FlowResult> {
    let api_key = ApiKey::checked(input.api_key.as_str());
    let sender_id = SenderId::checked(input.sender_id.as_str());

    match (api_key, sender_id) {
        (Ok(api_key), Ok(sender_id)) => Ok(Credentials::new(api_key, sender_id)),
        (api_key, sender_id) => {
            let mut errors = BTreeMap::new();
            let mut defaults = BTreeMap::new();
            match api_key {
                Ok(key) => {
                    defaults.insert(ApiKey::FIELD, key.expose().to_owned());
                }
                Err(err) => {
                    debug!(error = %err, "validation failed: api key");
                    errors.insert(ApiKey::FIELD, FlowErrorCode::InvalidApiKey);
                }
            }
            match sender_id {
                Ok(sender_id) => {
                    defaults.insert(SenderId::FIELD, sender_id.as_str().to_owned());
                }
                Err(err) => {
                    debug!(error = %err, "validation failed: sender id");
                    errors.insert(SenderId::FIELD, FlowErrorCode::InvalidSenderId);
                }
            }
            Err(FlowResult::ShowForm {
                step: FlowStep::User,
                errors,
                defaults,
            })
        }
    }
}

fn parse_test_number(raw: &str) -> Result<Recipient, ValidationError> {
    let recipient = Recipient::new(raw)?;
    let actual = recipient.raw().chars().count();
    if actual < TEST_NUMBER_MIN_LEN {
        return Err(ValidationError::TooShort {
            field: TEST_NUMBER_FIELD,
            min: TEST_NUMBER_MIN_LEN,
            actual,
        });
    }
    Ok(recipient)
}

/// Initial configuration of a new account.
pub struct SetupFlow {
    store: Arc<dyn EntryStore>,
    session: ClientSession,
    pending: Option<Credentials>,
}

impl SetupFlow {
    pub fn new(store: Arc<dyn EntryStore>, session: ClientSession) -> Self {
        Self {
            store,
            session,
            pending: None,
        }
    }

    /// Credentials that passed validation and await the test send.
    pub fn pending(&self) -> Option<&Credentials> {
        self.pending.as_ref()
    }

    pub fn start(&self) -> FlowResult {
        FlowResult::form(FlowStep::User)
    }

    /// Handle the credentials form.
    pub fn submit_credentials(&mut self, input: &CredentialsInput) -> Result<FlowResult, StoreError> {
        let credentials = match validate_credentials(input) {
            Ok(credentials) => credentials,
            Err(form) => return Ok(form),
        };

        if self
            .store
            .find_by_sender_id(credentials.sender_id())?
            .is_some()
        {
            info!(sender_id = %credentials.sender_id(), "sender id already configured; aborting");
            return Ok(FlowResult::Abort(AbortReason::AlreadyConfigured));
        }

        self.pending = Some(credentials);
        Ok(FlowResult::form(FlowStep::TestMessage))
    }

    /// Handle the test-number form: send one live message, persist on success.
    pub async fn submit_test_number(&mut self, test_number: &str) -> Result<FlowResult, StoreError> {
        let Some(credentials) = self.pending.clone() else {
            debug!("test step reached without validated credentials");
            return Ok(self.start());
        };

        let recipient = match parse_test_number(test_number) {
            Ok(recipient) => recipient,
            Err(err) => {
                debug!(error = %err, "validation failed: test number");
                return Ok(test_step_error(FlowErrorCode::InvalidTestNumber));
            }
        };

        let client = SmsToClient::with_session(self.session.clone(), credentials.clone());
        let sent = match SendMessage::new(vec![recipient.clone()], TEST_MESSAGE_BODY) {
            Ok(request) => client.send(request).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = sent {
            error!(error = %err, "test message failed");
            return Ok(test_step_error(FlowErrorCode::TestMessageFailed));
        }
        debug!(to = recipient.raw(), "test message sent successfully");

        let entry = ConfigEntry::new(credentials);
        match self.store.insert(entry.clone()) {
            Ok(()) => {}
            Err(StoreError::Duplicate(sender_id)) => {
                info!(%sender_id, "sender id configured concurrently; aborting");
                return Ok(FlowResult::Abort(AbortReason::AlreadyConfigured));
            }
            Err(err) => return Err(err),
        }
        self.pending = None;
        info!(title = %entry.title, "SMS.to entry created");
        Ok(FlowResult::CreateEntry(entry))
    }
}

fn test_step_error(code: FlowErrorCode) -> FlowResult {
    FlowResult::ShowForm {
        step: FlowStep::TestMessage,
        errors: BTreeMap::from([(TEST_NUMBER_FIELD, code)]),
        defaults: BTreeMap::new(),
    }
}

/// Edit the credentials of an existing entry.
pub struct ReconfigureFlow {
    store: Arc<dyn EntryStore>,
    entry_id: String,
}

impl ReconfigureFlow {
    pub fn new(store: Arc<dyn EntryStore>, entry_id: impl Into<String>) -> Self {
        Self {
            store,
            entry_id: entry_id.into(),
        }
    }

    /// Form pre-filled with the entry's current values.
    pub fn start(&self) -> Result<FlowResult, StoreError> {
        let entry = self
            .store
            .get(&self.entry_id)?
            .ok_or_else(|| StoreError::NotFound(self.entry_id.clone()))?;
        let defaults = BTreeMap::from([
            (
                ApiKey::FIELD,
                entry.credentials.api_key().expose().to_owned(),
            ),
            (
                SenderId::FIELD,
                entry.credentials.sender_id().as_str().to_owned(),
            ),
        ]);
        Ok(FlowResult::ShowForm {
            step: FlowStep::Reconfigure,
            errors: BTreeMap::new(),
            defaults,
        })
    }

    /// Validate and replace both fields and the title together.
    pub fn submit(&self, input: &CredentialsInput) -> Result<FlowResult, StoreError> {
        let credentials = match validate_credentials(input) {
            Ok(credentials) => credentials,
            Err(FlowResult::ShowForm {
                errors, defaults, ..
            }) => {
                return Ok(FlowResult::ShowForm {
                    step: FlowStep::Reconfigure,
                    errors,
                    defaults,
                });
            }
            Err(other) => return Ok(other),
        };

        let title = ConfigEntry::title_for(credentials.sender_id());
        debug!(sender_id = %credentials.sender_id(), "options updated");
        match self.store.update(&self.entry_id, credentials, title) {
            Ok(entry) => Ok(FlowResult::UpdateEntry(entry)),
            Err(StoreError::Duplicate(_)) => Ok(FlowResult::Abort(AbortReason::AlreadyConfigured)),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::*;
    use crate::store::InMemoryEntryStore;

    fn input(api_key: &str, sender_id: &str) -> CredentialsInput {
        CredentialsInput {
            api_key: api_key.to_owned(),
            sender_id: sender_id.to_owned(),
        }
    }

    fn flow(transport: &FakeTransport) -> (SetupFlow, Arc<InMemoryEntryStore>) {
        let store = Arc::new(InMemoryEntryStore::new());
        (SetupFlow::new(store.clone(), transport.session()), store)
    }

    #[test]
    fn valid_credentials_advance_to_test_step() {
        let transport = FakeTransport::new();
        let (mut flow, _) = flow(&transport);

        let result = flow
            .submit_credentials(&input(" 0123456789 ", "Alerts"))
            .unwrap();
        assert_eq!(result, FlowResult::form(FlowStep::TestMessage));
        assert_eq!(
            flow.pending().map(|it| it.api_key().expose()),
            Some("0123456789")
        );
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn short_api_key_reports_field_error_and_keeps_sender_id() {
        let transport = FakeTransport::new();
        let (mut flow, _) = flow(&transport);

        let result = flow
            .submit_credentials(&input("012345678", "Alerts"))
            .unwrap();
        let FlowResult::ShowForm {
            step,
            errors,
            defaults,
        } = result
        else {
            panic!("expected form, got {result:?}");
        };
        assert_eq!(step, FlowStep::User);
        assert_eq!(
            errors,
            BTreeMap::from([("api_key", FlowErrorCode::InvalidApiKey)])
        );
        assert_eq!(defaults.get("sender_id").map(String::as_str), Some("Alerts"));
        assert!(!defaults.contains_key("api_key"));
        assert!(flow.pending().is_none());
    }

    #[test]
    fn short_sender_id_reports_field_error_and_keeps_api_key() {
        let transport = FakeTransport::new();
        let (mut flow, _) = flow(&transport);

        let result = flow
            .submit_credentials(&input("0123456789", "  Ale  "))
            .unwrap();
        let FlowResult::ShowForm {
            errors, defaults, ..
        } = result
        else {
            panic!("expected form, got {result:?}");
        };
        assert_eq!(errors.get("sender_id"), Some(&FlowErrorCode::InvalidSenderId));
        assert_eq!(errors.get("sender_id").map(|it| it.as_str()), Some("invalid_sender_id"));
        assert_eq!(defaults.get("api_key").map(String::as_str), Some("0123456789"));
    }

    #[test]
    fn both_fields_invalid_report_both_errors() {
        let transport = FakeTransport::new();
        let (mut flow, _) = flow(&transport);

        let result = flow.submit_credentials(&input("", "")).unwrap();
        let FlowResult::ShowForm { errors, .. } = result else {
            panic!("expected form, got {result:?}");
        };
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn duplicate_sender_id_aborts_without_new_entry() {
        let transport = FakeTransport::new();
        let (mut flow, store) = flow(&transport);
        store
            .insert(ConfigEntry::new(
                Credentials::parse("existing-key-1", "Alerts").unwrap(),
            ))
            .unwrap();

        let result = flow
            .submit_credentials(&input("0123456789", "Alerts"))
            .unwrap();
        assert_eq!(result, FlowResult::Abort(AbortReason::AlreadyConfigured));
        assert_eq!(store.entries().unwrap().len(), 1);
        assert_eq!(AbortReason::AlreadyConfigured.as_str(), "already_configured");
    }

    #[tokio::test]
    async fn successful_test_send_persists_entry() {
        let transport = FakeTransport::new();
        transport.reply_status(SEND_URL, 200, "{}");
        let (mut flow, store) = flow(&transport);

        flow.submit_credentials(&input("0123456789", "Alerts"))
            .unwrap();
        let result = flow.submit_test_number(" +40730040302 ").await.unwrap();

        let FlowResult::CreateEntry(entry) = result else {
            panic!("expected entry, got {result:?}");
        };
        assert_eq!(entry.title, "SMS.to (Alerts)");
        assert_eq!(entry.credentials.api_key().expose(), "0123456789");
        assert_eq!(store.entries().unwrap(), vec![entry]);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let body = requests[0].body.clone().unwrap();
        assert_eq!(body["to"], serde_json::json!(["+40730040302"]));
        assert_eq!(body["message"], TEST_MESSAGE_BODY);
        assert_eq!(requests[0].bearer, "0123456789");
    }

    #[tokio::test]
    async fn short_test_number_is_rejected_without_sending() {
        let transport = FakeTransport::new();
        let (mut flow, _) = flow(&transport);
        flow.submit_credentials(&input("0123456789", "Alerts"))
            .unwrap();

        let result = flow.submit_test_number(" 123 ").await.unwrap();
        assert_eq!(result, test_step_error(FlowErrorCode::InvalidTestNumber));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_test_send_stays_on_test_step_and_can_retry() {
        let transport = FakeTransport::new();
        transport.reply_status(SEND_URL, 401, "unauthorized");
        let (mut flow, store) = flow(&transport);
        flow.submit_credentials(&input("0123456789", "Alerts"))
            .unwrap();

        let result = flow.submit_test_number("+40730040302").await.unwrap();
        assert_eq!(result, test_step_error(FlowErrorCode::TestMessageFailed));
        assert!(store.entries().unwrap().is_empty());
        assert!(flow.pending().is_some());

        transport.reply_status(SEND_URL, 200, "{}");
        let result = flow.submit_test_number("+40730040302").await.unwrap();
        assert!(matches!(result, FlowResult::CreateEntry(_)));
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_step_without_credentials_restarts_flow() {
        let transport = FakeTransport::new();
        let (mut flow, _) = flow(&transport);

        let result = flow.submit_test_number("+40730040302").await.unwrap();
        assert_eq!(result, FlowResult::form(FlowStep::User));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn reconfigure_shows_current_values_and_replaces_both_fields() {
        let store = Arc::new(InMemoryEntryStore::new());
        let entry = ConfigEntry::new(Credentials::parse("0123456789", "Alerts").unwrap());
        let id = entry.entry_id.clone();
        store.insert(entry).unwrap();
        let flow = ReconfigureFlow::new(store.clone(), id.clone());

        let FlowResult::ShowForm { defaults, step, .. } = flow.start().unwrap() else {
            panic!("expected form");
        };
        assert_eq!(step, FlowStep::Reconfigure);
        assert_eq!(defaults.get("api_key").map(String::as_str), Some("0123456789"));
        assert_eq!(defaults.get("sender_id").map(String::as_str), Some("Alerts"));

        let result = flow.submit(&input("abcdefghijkl", "Garage")).unwrap();
        let FlowResult::UpdateEntry(updated) = result else {
            panic!("expected update, got {result:?}");
        };
        assert_eq!(updated.title, "SMS.to (Garage)");
        assert_eq!(updated.entry_id, id);
        let stored = store.get(&id).unwrap().unwrap();
        assert_eq!(stored.credentials.api_key().expose(), "abcdefghijkl");
        assert_eq!(stored.credentials.sender_id().as_str(), "Garage");
    }

    #[test]
    fn reconfigure_of_removed_entry_reports_not_found() {
        let store = Arc::new(InMemoryEntryStore::new());
        store
            .insert(ConfigEntry::new(
                Credentials::parse("0123456789", "Alerts").unwrap(),
            ))
            .unwrap();
        let flow = ReconfigureFlow::new(store.clone(), "gone-entry");

        let err = flow.submit(&input("abcdefghijk", "Alerts")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "gone-entry"));
        assert!(matches!(flow.start(), Err(StoreError::NotFound(_))));
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn reconfigure_rejects_invalid_values_and_keeps_entry() {
        let store = Arc::new(InMemoryEntryStore::new());
        let entry = ConfigEntry::new(Credentials::parse("0123456789", "Alerts").unwrap());
        let id = entry.entry_id.clone();
        store.insert(entry.clone()).unwrap();

        let result = ReconfigureFlow::new(store.clone(), id.clone())
            .submit(&input("short", "Garage"))
            .unwrap();
        assert!(matches!(
            result,
            FlowResult::ShowForm {
                step: FlowStep::Reconfigure,
                ..
            }
        ));
        assert_eq!(store.get(&id).unwrap(), Some(entry));
    }
}
