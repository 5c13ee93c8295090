use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::correlation::{CorrelationId, CorrelationRegistry, PendingWaiter};
use crate::error::{RequestError, TransportError};
use crate::shutdown::ShutdownSender;
use crate::shutdown_handlers::shutdown_channel;
use crate::transport::{Destination, Transport};

use super::demux::{DemuxStats, ReplyChannelHealth, spawn_demultiplexer};
use super::{Reply, Request};

/// Longest wait [`RpcClient::send`] honors; larger timeouts are clamped to it.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Client issuing correlated requests over one shared transport and one
/// shared reply channel.
///
/// Cheap to share behind an `Arc`; every call is isolated apart from the
/// transport and the correlation registry.
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    registry: Arc<CorrelationRegistry>,
    destination: Destination,
    reply_to: String,
    health: Arc<ReplyChannelHealth>,
    shutdown_tx: ShutdownSender,
    demux: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("destination", &self.destination)
            .field("reply_to", &self.reply_to)
            .field("pending", &self.registry.pending())
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Subscribes to the transport's reply channel and starts routing
    /// replies. Requests go to `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reply channel cannot be opened.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        destination: Destination,
    ) -> Result<Self, TransportError> {
        let subscription = transport.subscribe().await?;
        let registry = Arc::new(CorrelationRegistry::new());
        let health = Arc::new(ReplyChannelHealth::new());
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let demux = spawn_demultiplexer(
            Arc::clone(&registry),
            subscription.messages,
            Arc::clone(&health),
            shutdown_rx,
        );
        debug!(
            "Client ready: publishing to {}, replies on {}",
            destination, subscription.address
        );

        Ok(Self {
            transport,
            registry,
            destination,
            reply_to: subscription.address,
            health,
            shutdown_tx,
            demux: Mutex::new(Some(demux)),
        })
    }

    /// Publishes `payload` once and waits up to `timeout` for the matching
    /// reply. Never retries. `timeout` is clamped to [`MAX_REQUEST_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// - [`RequestError::Transport`] when the publish fails; nothing is
    ///   awaited in that case.
    /// - [`RequestError::Timeout`] when no matching reply arrives in time.
    /// - [`RequestError::ReplyChannelClosed`] when the reply channel is gone.
    pub async fn send(&self, payload: Vec<u8>, timeout: Duration) -> Result<Reply, RequestError> {
        if !self.health.is_healthy() {
            return Err(RequestError::ReplyChannelClosed);
        }

        let timeout = timeout.min(MAX_REQUEST_TIMEOUT);
        let deadline = Instant::now().checked_add(timeout);
        let waiter = self.register(deadline);
        // The demultiplexer may have failed between the health check and the
        // registration; its fail_all would have missed this waiter.
        if !self.health.is_healthy() {
            return Err(RequestError::ReplyChannelClosed);
        }

        let id = waiter.id();
        let request = Request::new(id, self.destination.clone(), self.reply_to.clone(), payload);
        if let Err(source) = self.transport.publish(request.into_outbound()).await {
            self.registry.remove(&id);
            warn!("Publish of {} failed: {}", id, source);
            return Err(RequestError::Transport { source });
        }
        debug!("Dispatched {}", id);

        waiter.wait().await
    }

    /// Sends `request` as JSON and decodes the JSON reply.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`RpcClient::send`], and
    /// [`RequestError::Protocol`] when the request cannot be encoded or the
    /// reply does not decode into `Resp`.
    pub async fn call<Req, Resp>(&self, request: &Req, timeout: Duration) -> Result<Resp, RequestError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request).map_err(|err| RequestError::Protocol {
            reason: format!("request could not be encoded: {}", err),
        })?;
        let reply = self.send(payload, timeout).await?;
        reply.json()
    }

    fn register(&self, deadline: Option<Instant>) -> PendingWaiter {
        loop {
            match self.registry.register(CorrelationId::generate(), deadline) {
                Ok(waiter) => return waiter,
                Err(err) => warn!("{}; generating a new id", err),
            }
        }
    }

    /// Number of requests still waiting for a reply.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.registry.pending()
    }

    #[must_use]
    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        self.registry.contains(id)
    }

    /// `false` once the reply channel ended unexpectedly.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    #[must_use]
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    #[must_use]
    pub const fn destination(&self) -> &Destination {
        &self.destination
    }

    #[must_use]
    pub fn demux_stats(&self) -> DemuxStats {
        self.health.stats()
    }

    /// Stops routing replies, fails whatever is still pending and closes the
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport fails to close cleanly.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.health.begin_close();
        drop(self.shutdown_tx.send(()));
        let demux = self
            .demux
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = demux
            && let Err(err) = handle.await
        {
            warn!("Reply demultiplexer ended abnormally: {}", err);
        }
        let abandoned = self.registry.fail_all();
        if abandoned > 0 {
            debug!("Closed with {} requests still pending", abandoned);
        }
        self.transport.close().await
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.health.begin_close();
        drop(self.shutdown_tx.send(()));
    }
}
