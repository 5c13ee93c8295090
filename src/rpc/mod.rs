//! Correlated request/reply over a shared reply channel.
mod demux;
mod dispatcher;
mod message;


pub use demux::DemuxStats;
pub use dispatcher::{MAX_REQUEST_TIMEOUT, RpcClient};
pub use message::{Reply, Request};
