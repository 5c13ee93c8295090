use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::correlation::{CorrelationId, CorrelationRegistry};
use crate::shutdown::ShutdownReceiver;
use crate::transport::InboundMessage;

use super::Reply;

/// Counters kept by the demultiplexer, readable while it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub matched: u64,
    pub unmatched: u64,
    pub missing_metadata: u64,
}

/// Shared view of the reply channel's state.
#[derive(Debug)]
pub(super) struct ReplyChannelHealth {
    healthy: AtomicBool,
    closing: AtomicBool,
    matched: AtomicU64,
    unmatched: AtomicU64,
    missing_metadata: AtomicU64,
}

impl ReplyChannelHealth {
    pub(super) const fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            matched: AtomicU64::new(0),
            unmatched: AtomicU64::new(0),
            missing_metadata: AtomicU64::new(0),
        }
    }

    pub(super) fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub(super) fn begin_close(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn mark_failed(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    pub(super) fn stats(&self) -> DemuxStats {
        DemuxStats {
            matched: self.matched.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            missing_metadata: self.missing_metadata.load(Ordering::Relaxed),
        }
    }
}

/// Spawns the single consumer of the reply channel.
///
/// Each message is routed with one registry lookup and a non-blocking
/// hand-off, so a slow caller never holds up replies for other requests.
/// If the channel ends while the client is not closing, every pending
/// waiter is failed and the client is marked unhealthy.
pub(super) fn spawn_demultiplexer(
    registry: Arc<CorrelationRegistry>,
    mut messages: mpsc::Receiver<InboundMessage>,
    health: Arc<ReplyChannelHealth>,
    mut shutdown_rx: ShutdownReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                maybe_message = messages.recv() => {
                    let Some(message) = maybe_message else {
                        on_channel_end(&registry, &health);
                        break;
                    };
                    route_reply(&registry, &health, message);
                }
            }
        }
    })
}

fn route_reply(registry: &CorrelationRegistry, health: &ReplyChannelHealth, message: InboundMessage) {
    let Some(raw_id) = message.correlation_id else {
        health.missing_metadata.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Dropping reply without correlation id ({} bytes)",
            message.payload.len()
        );
        return;
    };
    let Ok(id) = CorrelationId::from_str(&raw_id) else {
        health.unmatched.fetch_add(1, Ordering::Relaxed);
        warn!("Dropping reply with foreign correlation id '{}'", raw_id);
        return;
    };

    if registry.resolve(&id, Reply::new(id, message.payload)) {
        health.matched.fetch_add(1, Ordering::Relaxed);
        debug!("Resolved {}", id);
    } else {
        health.unmatched.fetch_add(1, Ordering::Relaxed);
        debug!("No waiter for {}; reply dropped", id);
    }
}

fn on_channel_end(registry: &CorrelationRegistry, health: &ReplyChannelHealth) {
    if health.is_closing() {
        debug!("Reply channel closed");
        return;
    }
    health.mark_failed();
    let failed = registry.fail_all();
    error!(
        "Reply channel ended unexpectedly; failed {} pending requests",
        failed
    );
}
