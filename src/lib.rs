//! Correlated request/reply client over a message bus, with a bounded
//! concurrency load harness.
//!
//! Each request carries a fresh correlation id and names a per-client reply
//! channel. A single demultiplexer task routes replies back to the waiter
//! that registered the id, so any number of requests can share one
//! connection. The `rpcstress` binary drives a user-registration service
//! with it; the library pieces are usable on their own.
mod app;
pub mod args;
pub mod config;
pub mod correlation;
pub mod entry;
pub mod error;
pub mod load;
pub mod metrics;
pub mod registration;
pub mod rpc;
pub mod shutdown;
pub mod shutdown_handlers;
pub(crate) mod system;
pub mod transport;
