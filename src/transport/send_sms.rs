use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{Recipient, SendMessage, SenderId};

/// Field carrying the composed text in the send payload.
const MESSAGE_FIELD: &str = "message";

/// Build the JSON body for `POST /sms/send`.
///
/// `to` and `sender_id` are owned by the client: extra fields with those keys
/// are dropped, every other extra key overrides the defaults.
pub fn encode_send_sms_json(request: &SendMessage, sender_id: &SenderId) -> Value {
    let mut payload = Map::new();
    payload.insert(
        Recipient::FIELD.to_owned(),
        Value::Array(
            request
                .targets()
                .iter()
                .map(|to| Value::String(to.raw().to_owned()))
                .collect(),
        ),
    );
    payload.insert(
        MESSAGE_FIELD.to_owned(),
        Value::String(request.composed_text()),
    );
    payload.insert(
        SenderId::FIELD.to_owned(),
        Value::String(sender_id.as_str().to_owned()),
    );

    for (key, value) in request.extra() {
        if key == Recipient::FIELD || key == SenderId::FIELD {
            debug!(field = %key, "ignoring extra field owned by the client");
            continue;
        }
        payload.insert(key.clone(), value.clone());
    }

    Value::Object(payload)
}
