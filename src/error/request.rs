use std::time::Duration;

use thiserror::Error;

use super::TransportError;
use crate::correlation::CorrelationId;

/// Failure of a single correlated request.
///
/// `Timeout`, `Transport` and `Protocol` are per-request and are never retried
/// by the client. `ReplyChannelClosed` is client-wide: the reply consumer has
/// stopped, so no in-flight or future request can be resolved.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Timed out after {}ms waiting for reply to {id}", timeout.as_millis())]
    Timeout { id: CorrelationId, timeout: Duration },
    #[error("Publish failed: {source}")]
    Transport {
        #[source]
        source: TransportError,
    },
    #[error("Malformed reply: {reason}")]
    Protocol { reason: String },
    #[error("Reply channel closed; the client can no longer receive replies")]
    ReplyChannelClosed,
}

impl RequestError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, RequestError::Transport { .. })
    }

    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, RequestError::Protocol { .. })
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, RequestError::ReplyChannelClosed)
    }
}
