//! Correlation ids and the registry of requests awaiting a reply.
mod id;
mod registry;

#[cfg(test)]
mod tests;

pub use id::CorrelationId;
pub use registry::{CorrelationRegistry, PendingWaiter};
