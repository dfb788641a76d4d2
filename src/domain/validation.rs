use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Empty {
        field: &'static str,
    },
    TooShort {
        field: &'static str,
        min: usize,
        actual: usize,
    },
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },
    InvalidUrl {
        field: &'static str,
        input: String,
    },
}

impl ValidationError {
    /// Name of the input field that failed validation.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Empty { field }
            | Self::TooShort { field, .. }
            | Self::InvalidType { field, .. }
            | Self::InvalidUrl { field, .. } => field,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{field} must not be empty"),
            Self::TooShort { field, min, actual } => {
                write!(
                    f,
                    "{field} is too short: {actual} characters (min {min})"
                )
            }
            Self::InvalidType { field, expected } => {
                write!(f, "{field} has an invalid format: expected {expected}")
            }
            Self::InvalidUrl { field, input } => write!(f, "{field} is not a valid URL: {input}"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::ValidationError;

    #[test]
    fn display_messages_are_human_readable() {
        let err = ValidationError::Empty { field: "to" };
        assert_eq!(err.to_string(), "to must not be empty");

        let err = ValidationError::TooShort {
            field: "api_key",
            min: 10,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "api_key is too short: 3 characters (min 10)"
        );

        let err = ValidationError::InvalidType {
            field: "data",
            expected: "an object",
        };
        assert_eq!(
            err.to_string(),
            "data has an invalid format: expected an object"
        );

        let err = ValidationError::InvalidUrl {
            field: "callback_url",
            input: "nope".to_owned(),
        };
        assert_eq!(err.to_string(), "callback_url is not a valid URL: nope");
    }

    #[test]
    fn field_reports_offending_input() {
        let err = ValidationError::TooShort {
            field: "sender_id",
            min: 5,
            actual: 2,
        };
        assert_eq!(err.field(), "sender_id");
    }
}
