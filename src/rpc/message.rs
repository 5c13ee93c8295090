use serde::de::DeserializeOwned;

use crate::correlation::CorrelationId;
use crate::error::RequestError;
use crate::transport::{Destination, OutboundMessage};

/// An outgoing request. Built once per dispatch and never modified.
#[derive(Debug, Clone)]
pub struct Request {
    id: CorrelationId,
    destination: Destination,
    reply_to: String,
    payload: Vec<u8>,
}

impl Request {
    #[must_use]
    pub const fn new(
        id: CorrelationId,
        destination: Destination,
        reply_to: String,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id,
            destination,
            reply_to,
            payload,
        }
    }

    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    #[must_use]
    pub const fn destination(&self) -> &Destination {
        &self.destination
    }

    #[must_use]
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_outbound(self) -> OutboundMessage {
        OutboundMessage {
            destination: self.destination,
            correlation_id: self.id.to_string(),
            reply_to: self.reply_to,
            payload: self.payload,
        }
    }
}

/// A reply routed back to the caller that sent the matching request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    id: CorrelationId,
    payload: Vec<u8>,
}

impl Reply {
    #[must_use]
    pub const fn new(id: CorrelationId, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Decodes the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Protocol`] when the payload does not decode
    /// into `T`.
    pub fn json<T>(&self) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.payload).map_err(|err| RequestError::Protocol {
            reason: format!("reply {} is not valid JSON for the expected shape: {}", self.id, err),
        })
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
