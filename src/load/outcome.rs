use std::time::Duration;

use tracing::debug;

use crate::error::RequestError;
use crate::rpc::Reply;

const UNKNOWN_ERROR: &str = "unknown error";

/// How a workload judges a reply that did arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyVerdict {
    Accepted,
    /// The service answered with an application-level failure message.
    Rejected(String),
    /// The reply could not be understood.
    Malformed(String),
}

/// Typed reason a request counted as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The workload could not build the payload; nothing was published.
    Encode,
    Timeout,
    Transport,
    Protocol,
    ReplyChannelClosed,
    Rejected(String),
}

impl FailureKind {
    /// Category key used for aggregation. Service messages are normalized so
    /// cosmetic whitespace differences do not split a category.
    #[must_use]
    pub fn category(&self) -> String {
        match self {
            FailureKind::Encode => "encode error".to_owned(),
            FailureKind::Timeout => "timeout".to_owned(),
            FailureKind::Transport => "transport error".to_owned(),
            FailureKind::Protocol => "protocol error".to_owned(),
            FailureKind::ReplyChannelClosed => "reply channel closed".to_owned(),
            FailureKind::Rejected(message) => normalize_failure_message(message),
        }
    }
}

impl From<&RequestError> for FailureKind {
    fn from(error: &RequestError) -> Self {
        match error {
            RequestError::Timeout { .. } => FailureKind::Timeout,
            RequestError::Transport { .. } => FailureKind::Transport,
            RequestError::Protocol { .. } => FailureKind::Protocol,
            RequestError::ReplyChannelClosed => FailureKind::ReplyChannelClosed,
        }
    }
}

/// Terminal state of one request in a load run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Succeeded { latency: Duration },
    Failed(FailureKind),
}

impl RequestOutcome {
    /// Folds the dispatcher result and the workload's verdict into one
    /// outcome.
    #[must_use]
    pub fn from_result<F>(result: Result<Reply, RequestError>, latency: Duration, classify: F) -> Self
    where
        F: FnOnce(&Reply) -> ReplyVerdict,
    {
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                debug!("Request failed: {}", err);
                return RequestOutcome::Failed(FailureKind::from(&err));
            }
        };
        match classify(&reply) {
            ReplyVerdict::Accepted => RequestOutcome::Succeeded { latency },
            ReplyVerdict::Rejected(message) => {
                RequestOutcome::Failed(FailureKind::Rejected(message))
            }
            ReplyVerdict::Malformed(reason) => {
                debug!("Reply {} malformed: {}", reply.id(), reason);
                RequestOutcome::Failed(FailureKind::Protocol)
            }
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Succeeded { .. })
    }
}

/// Trims a failure message and collapses runs of whitespace to one space.
/// Blank messages map to `"unknown error"`.
#[must_use]
pub fn normalize_failure_message(message: &str) -> String {
    let normalized = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        UNKNOWN_ERROR.to_owned()
    } else {
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::error::TransportError;

    #[test]
    fn normalization_collapses_whitespace() -> Result<(), String> {
        let cases = [
            ("  duplicate  ", "duplicate"),
            ("Usuario con\tDNI   12345678\nya existe", "Usuario con DNI 12345678 ya existe"),
            ("", "unknown error"),
            (" \n\t ", "unknown error"),
        ];
        for (input, expected) in cases {
            let actual = normalize_failure_message(input);
            if actual != expected {
                return Err(format!("{:?} -> {:?}, expected {:?}", input, actual, expected));
            }
        }
        Ok(())
    }

    #[test]
    fn typed_errors_map_to_fixed_categories() -> Result<(), String> {
        let id = CorrelationId::generate();
        let cases = [
            (
                RequestError::Timeout {
                    id,
                    timeout: Duration::from_secs(1),
                },
                "timeout",
            ),
            (
                RequestError::Transport {
                    source: TransportError::NotConnected,
                },
                "transport error",
            ),
            (
                RequestError::Protocol {
                    reason: "bad".to_owned(),
                },
                "protocol error",
            ),
            (RequestError::ReplyChannelClosed, "reply channel closed"),
        ];
        for (error, expected) in cases {
            let category = FailureKind::from(&error).category();
            if category != expected {
                return Err(format!("{} -> {}, expected {}", error, category, expected));
            }
        }
        Ok(())
    }

    #[test]
    fn verdicts_drive_outcome() -> Result<(), String> {
        let id = CorrelationId::generate();
        let latency = Duration::from_millis(12);

        let accepted = RequestOutcome::from_result(Ok(Reply::new(id, Vec::new())), latency, |_| {
            ReplyVerdict::Accepted
        });
        if accepted != (RequestOutcome::Succeeded { latency }) {
            return Err(format!("unexpected outcome {:?}", accepted));
        }

        let rejected = RequestOutcome::from_result(Ok(Reply::new(id, Vec::new())), latency, |_| {
            ReplyVerdict::Rejected("duplicate".to_owned())
        });
        if rejected != RequestOutcome::Failed(FailureKind::Rejected("duplicate".to_owned())) {
            return Err(format!("unexpected outcome {:?}", rejected));
        }

        let malformed = RequestOutcome::from_result(Ok(Reply::new(id, Vec::new())), latency, |_| {
            ReplyVerdict::Malformed("empty".to_owned())
        });
        if malformed != RequestOutcome::Failed(FailureKind::Protocol) {
            return Err(format!("unexpected outcome {:?}", malformed));
        }
        Ok(())
    }
}
