//! Transport layer: HTTP and wire-format details (serialization/deserialization).

mod account;
mod send_sms;

pub use account::{
    TransportError, decode_balance_json_response, decode_total_messages_json_response,
};
pub use send_sms::encode_send_sms_json;
