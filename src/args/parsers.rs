use std::time::Duration;

use super::types::{PositiveU64, PositiveUsize};
use crate::config::parse_duration_value;
use crate::error::{AppError, AppResult, ValidationError};

pub(super) fn parse_positive_u64(s: &str) -> AppResult<PositiveU64> {
    s.parse::<PositiveU64>().map_err(AppError::from)
}

pub(super) fn parse_positive_usize(s: &str) -> AppResult<PositiveUsize> {
    s.parse::<PositiveUsize>().map_err(AppError::from)
}

pub(super) fn parse_duration_arg(s: &str) -> Result<Duration, ValidationError> {
    parse_duration_value(s)
}

pub(super) fn parse_json_payload(s: &str) -> Result<serde_json::Value, ValidationError> {
    serde_json::from_str(s).map_err(|err| ValidationError::InvalidPayload { source: err })
}
