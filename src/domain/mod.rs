//! Domain layer: strong types with validation and invariants (no I/O).

mod request;
mod response;
mod validation;
mod value;

pub use request::{SendMessage, TEST_MESSAGE_BODY};
pub use response::{AccountSnapshot, round_balance};
pub use validation::ValidationError;
pub use value::{ApiKey, Credentials, HttpStatus, KnownHttpStatus, Recipient, SenderId};
