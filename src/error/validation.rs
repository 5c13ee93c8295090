use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Duration must not be empty.")]
    DurationEmpty,
    #[error("Invalid duration '{value}'.")]
    InvalidDurationFormat { value: String },
    #[error("Invalid duration '{value}': {source}")]
    InvalidDurationNumber {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Duration overflow.")]
    DurationOverflow,
    #[error("Invalid duration unit '{unit}'.")]
    InvalidDurationUnit { unit: String },
    #[error("Duration must be > 0.")]
    DurationZero,
    #[error("Value must be >= {min}.")]
    ValueTooSmall { min: u64 },
    #[error("Invalid value: {source}")]
    InvalidNumber {
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Request payload is not valid JSON: {source}")]
    InvalidPayload {
        #[source]
        source: serde_json::Error,
    },
    #[error("DNI '{value}' must be exactly 8 digits.")]
    InvalidDni { value: String },
    #[error("{message}")]
    Message { message: String },
}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        ValidationError::Message { message }
    }
}

impl From<&'static str> for ValidationError {
    fn from(message: &'static str) -> Self {
        ValidationError::Message {
            message: message.to_owned(),
        }
    }
}
