use thiserror::Error;

use crate::correlation::CorrelationId;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("A waiter is already registered for correlation id {id}.")]
    DuplicateId { id: CorrelationId },
}
