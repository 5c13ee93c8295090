//! Bounded-concurrency load runs over a shared [`crate::rpc::RpcClient`].
mod harness;
mod outcome;
mod stats;


pub use harness::{LoadHarness, LoadOptions, Workload, run_load};
pub use outcome::{FailureKind, ReplyVerdict, RequestOutcome, normalize_failure_message};
pub use stats::{LatencySummary, LoadProgress, LoadRunStats, RunEnd};
