use serde::{Deserialize, Serialize};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// Reply body produced by the storage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReply {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amigos_guardados: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl RegistrationReply {
    #[must_use]
    pub fn success(message: String, user_id: u64, amigos_guardados: Vec<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_owned(),
            message,
            user_id: Some(user_id),
            amigos_guardados: Some(amigos_guardados),
            timestamp: None,
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn error(message: String) -> Self {
        Self {
            status: STATUS_ERROR.to_owned(),
            message,
            user_id: None,
            amigos_guardados: None,
            timestamp: None,
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: String) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}
