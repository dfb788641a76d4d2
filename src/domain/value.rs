use std::fmt;

use secrecy::{ExposeSecret, Secret};

use crate::domain::validation::ValidationError;

fn trimmed_non_empty(value: String, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(trimmed.to_owned())
}

fn require_min_len(value: &str, field: &'static str, min: usize) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual < min {
        return Err(ValidationError::TooShort { field, min, actual });
    }
    Ok(())
}

#[derive(Clone)]
/// SMS.to API key, sent as a bearer token.
///
/// Invariant: non-empty after trimming. The value is kept in a [`Secret`] and
/// only ever rendered in masked form by `Debug`.
pub struct ApiKey(Secret<String>);

impl ApiKey {
    /// Field name used in forms and persisted configuration (`api_key`).
    pub const FIELD: &'static str = "api_key";

    /// Minimum length accepted by the setup flow.
    pub const MIN_LEN: usize = 10;

    /// Create a validated [`ApiKey`].
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = trimmed_non_empty(value.into(), Self::FIELD)?;
        Ok(Self(Secret::new(value)))
    }

    /// Create an [`ApiKey`] that also satisfies [`ApiKey::MIN_LEN`].
    pub fn checked(value: impl Into<String>) -> Result<Self, ValidationError> {
        let key = Self::new(value)?;
        require_min_len(key.expose(), Self::FIELD, Self::MIN_LEN)?;
        Ok(key)
    }

    /// Borrow the raw key. Only use this to build request headers or persist it.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// First four characters followed by `****`, safe for logs.
    pub fn masked(&self) -> String {
        let prefix: String = self.expose().chars().take(4).collect();
        format!("{prefix}****")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.masked()).finish()
    }
}

impl PartialEq for ApiKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for ApiKey {}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// SMS.to sender id (`sender_id`).
///
/// Invariant: non-empty after trimming. Also the identity key of a configured instance.
pub struct SenderId(String);

impl SenderId {
    /// Field name used by SMS.to and by the setup form (`sender_id`).
    pub const FIELD: &'static str = "sender_id";

    /// Minimum length accepted by the setup flow.
    pub const MIN_LEN: usize = 5;

    /// Create a validated [`SenderId`].
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self(trimmed_non_empty(value.into(), Self::FIELD)?))
    }

    /// Create a [`SenderId`] that also satisfies [`SenderId::MIN_LEN`].
    pub fn checked(value: impl Into<String>) -> Result<Self, ValidationError> {
        let sender_id = Self::new(value)?;
        require_min_len(sender_id.as_str(), Self::FIELD, Self::MIN_LEN)?;
        Ok(sender_id)
    }

    /// Borrow the validated sender id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Destination address as sent to SMS.to (`to`).
///
/// Invariant: non-empty after trimming. No phone-number normalization is done;
/// the gateway accepts whatever format the caller supplies.
pub struct Recipient(String);

impl Recipient {
    /// Field name used by SMS.to (`to`).
    pub const FIELD: &'static str = "to";

    /// Create a validated (non-empty) recipient.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self(trimmed_non_empty(value.into(), Self::FIELD)?))
    }

    /// Raw (trimmed) value as sent to SMS.to.
    pub fn raw(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Validated account credentials of one configured instance.
pub struct Credentials {
    api_key: ApiKey,
    sender_id: SenderId,
}

impl Credentials {
    /// Create credentials from already validated parts.
    pub fn new(api_key: ApiKey, sender_id: SenderId) -> Self {
        Self { api_key, sender_id }
    }

    /// Validate raw strings (non-empty after trimming) into credentials.
    pub fn parse(
        api_key: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            api_key: ApiKey::new(api_key)?,
            sender_id: SenderId::new(sender_id)?,
        })
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    pub fn sender_id(&self) -> &SenderId {
        &self.sender_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// HTTP status code returned by the gateway.
///
/// This value is preserved as-is even when the code has no dedicated reason.
pub struct HttpStatus(u16);

impl HttpStatus {
    /// The only status the gateway uses to signal success.
    pub const OK: Self = Self(200);

    /// Reason reported for statuses without a dedicated entry.
    pub const UNKNOWN_REASON: &'static str = "An unknown error occurred. Please check the logs.";

    /// Construct a status from its integer representation.
    pub fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::OK
    }

    /// Map this code to a known status variant, if one exists.
    pub fn known(self) -> Option<KnownHttpStatus> {
        KnownHttpStatus::from_code(self.0)
    }

    /// Human-readable reason for a failed request.
    pub fn reason(self) -> &'static str {
        self.known()
            .map_or(Self::UNKNOWN_REASON, KnownHttpStatus::reason)
    }

    /// Returns `true` if the key was rejected or lacks permissions.
    pub fn is_auth_error(self) -> bool {
        matches!(
            self.known(),
            Some(KnownHttpStatus::Unauthorized | KnownHttpStatus::Forbidden)
        )
    }

    pub fn is_rate_limited(self) -> bool {
        self.known() == Some(KnownHttpStatus::TooManyRequests)
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
/// HTTP statuses with a dedicated gateway error message.
pub enum KnownHttpStatus {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    TooManyRequests,
    InternalServerError,
}

impl KnownHttpStatus {
    /// Convert a raw status code into a known variant.
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::TooManyRequests,
            500 => Self::InternalServerError,
            _ => return None,
        })
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad request. Please check your payload.",
            Self::Unauthorized => "Unauthorized. Verify your API key.",
            Self::Forbidden => "Forbidden. You may not have permission to send SMS.",
            Self::NotFound => "Resource not found. Check the API endpoint.",
            Self::TooManyRequests => "Rate limit exceeded. Please try again later.",
            Self::InternalServerError => "Internal server error. Try again later.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_newtypes_trim_or_validate() {
        let key = ApiKey::new("  key ").unwrap();
        assert_eq!(key.expose(), "key");
        assert!(ApiKey::new("  ").is_err());

        let sender = SenderId::new(" sender ").unwrap();
        assert_eq!(sender.as_str(), "sender");
        assert!(SenderId::new("").is_err());

        let to = Recipient::new(" +40730040302 ").unwrap();
        assert_eq!(to.raw(), "+40730040302");
        assert!(Recipient::new(" ").is_err());
    }

    #[test]
    fn checked_constructors_enforce_min_len_after_trim() {
        assert!(ApiKey::checked("0123456789").is_ok());
        assert!(matches!(
            ApiKey::checked("  012345678  "),
            Err(ValidationError::TooShort {
                field: ApiKey::FIELD,
                min: 10,
                actual: 9
            })
        ));

        assert!(SenderId::checked("Alert").is_ok());
        assert!(matches!(
            SenderId::checked(" Ale "),
            Err(ValidationError::TooShort {
                field: SenderId::FIELD,
                min: 5,
                actual: 3
            })
        ));
    }

    #[test]
    fn api_key_debug_is_masked() {
        let key = ApiKey::new("abcd-secret-value").unwrap();
        assert_eq!(key.masked(), "abcd****");
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("secret-value"), "{rendered}");
    }

    #[test]
    fn http_status_reasons_follow_table() {
        assert_eq!(
            HttpStatus::new(429).reason(),
            "Rate limit exceeded. Please try again later."
        );
        assert_eq!(
            HttpStatus::new(401).reason(),
            "Unauthorized. Verify your API key."
        );
        assert_eq!(HttpStatus::new(418).reason(), HttpStatus::UNKNOWN_REASON);
        assert_eq!(HttpStatus::new(502).reason(), HttpStatus::UNKNOWN_REASON);
    }

    #[test]
    fn http_status_classifies_known_codes() {
        assert!(HttpStatus::new(401).is_auth_error());
        assert!(HttpStatus::new(403).is_auth_error());
        assert!(!HttpStatus::new(429).is_auth_error());
        assert!(HttpStatus::new(429).is_rate_limited());
        assert!(HttpStatus::OK.is_success());
        assert!(!HttpStatus::new(201).is_success());
        assert_eq!(HttpStatus::new(418).known(), None);
    }
}
