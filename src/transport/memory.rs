//! In-process bus used for offline runs and tests.
//!
//! Every publish is handed to a [`Responder`] which decides what, if
//! anything, comes back on the reply channel and after how long. Replies are
//! delivered from independent tasks, so they can arrive in any order
//! relative to publish order, exactly like a real broker with a pool of
//! consumers behind it.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::error::TransportError;

use super::{
    InboundMessage, OutboundMessage, REPLY_CHANNEL_CAPACITY, ReplySubscription, Transport,
};

/// Decides the replies produced for one published request.
pub trait Responder: Send + Sync {
    fn respond(&self, request: &OutboundMessage) -> Vec<ScheduledReply>;
}

impl<F> Responder for F
where
    F: Fn(&OutboundMessage) -> Vec<ScheduledReply> + Send + Sync,
{
    fn respond(&self, request: &OutboundMessage) -> Vec<ScheduledReply> {
        self(request)
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledReply {
    pub delay: Duration,
    pub message: InboundMessage,
}

impl ScheduledReply {
    /// Reply to `request` carrying its correlation id.
    #[must_use]
    pub fn to(request: &OutboundMessage, payload: Vec<u8>) -> Self {
        Self {
            delay: Duration::ZERO,
            message: InboundMessage {
                correlation_id: Some(request.correlation_id.clone()),
                payload,
            },
        }
    }

    #[must_use]
    pub const fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.message.correlation_id = correlation_id;
        self
    }
}

/// Replies with the request payload unchanged.
#[must_use]
pub fn echo_responder() -> impl Responder {
    |request: &OutboundMessage| vec![ScheduledReply::to(request, request.payload.clone())]
}

/// Never replies.
#[must_use]
pub fn silent_responder() -> impl Responder {
    |_: &OutboundMessage| Vec::<ScheduledReply>::new()
}

pub struct MemoryTransport {
    responder: Arc<dyn Responder>,
    reply_address: String,
    reply_tx: Mutex<Option<mpsc::Sender<InboundMessage>>>,
    subscribed: AtomicBool,
    fail_publish: AtomicBool,
    closed: AtomicBool,
    published: AtomicU64,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("reply_address", &self.reply_address)
            .field("published", &self.published.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    #[must_use]
    pub fn new<R>(responder: R) -> Self
    where
        R: Responder + 'static,
    {
        Self::with_responder(Arc::new(responder))
    }

    #[must_use]
    pub fn with_responder(responder: Arc<dyn Responder>) -> Self {
        Self {
            responder,
            reply_address: format!("amq.gen-memory-{}", Uuid::new_v4().simple()),
            reply_tx: Mutex::new(None),
            subscribed: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            published: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn reply_address(&self) -> &str {
        &self.reply_address
    }

    /// Makes every following publish fail, as a dropped connection would.
    pub fn set_publish_failure(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }

    /// Number of messages accepted by [`Transport::publish`].
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Delivers `message` on the reply channel as if the bus had routed it.
    ///
    /// Returns `false` when nothing is subscribed or the channel is gone.
    pub async fn inject(&self, message: InboundMessage) -> bool {
        let Some(reply_tx) = self.reply_sender() else {
            return false;
        };
        reply_tx.send(message).await.is_ok()
    }

    /// Stops delivering replies. The subscriber sees its stream end once
    /// replies already in flight have been delivered.
    pub fn sever_reply_channel(&self) {
        let mut reply_tx = self.reply_tx.lock().unwrap_or_else(PoisonError::into_inner);
        drop(reply_tx.take());
    }

    fn reply_sender(&self) -> Option<mpsc::Sender<InboundMessage>> {
        self.reply_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Publish {
                destination: message.destination.to_string(),
                message: "connection reset by peer".to_owned(),
            });
        }
        self.published.fetch_add(1, Ordering::SeqCst);

        let replies = self.responder.respond(&message);
        let Some(reply_tx) = self.reply_sender() else {
            if !replies.is_empty() {
                debug!(
                    "No reply channel for {}; dropping {} replies",
                    message.correlation_id,
                    replies.len()
                );
            }
            return Ok(());
        };

        for reply in replies {
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                if !reply.delay.is_zero() {
                    sleep(reply.delay).await;
                }
                if reply_tx.send(reply.message).await.is_err() {
                    debug!("Reply channel closed before delivery");
                }
            });
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<ReplySubscription, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadySubscribed);
        }
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
        *self.reply_tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(reply_tx);
        Ok(ReplySubscription {
            address: self.reply_address.clone(),
            messages: reply_rx,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.sever_reply_channel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Destination;
    use std::future::Future;

    fn run_async_test<F>(future: F) -> Result<(), String>
    where
        F: Future<Output = Result<(), String>>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| format!("Failed to build runtime: {}", err))?;
        runtime.block_on(future)
    }

    fn outbound(correlation_id: &str, payload: &[u8]) -> OutboundMessage {
        OutboundMessage {
            destination: Destination::new("validation", "check"),
            correlation_id: correlation_id.to_owned(),
            reply_to: "amq.gen-test".to_owned(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn echo_reply_carries_correlation_id() -> Result<(), String> {
        run_async_test(async {
            let transport = MemoryTransport::new(echo_responder());
            let mut subscription = transport.subscribe().await.map_err(|err| err.to_string())?;
            transport
                .publish(outbound("abc", b"ping"))
                .await
                .map_err(|err| err.to_string())?;

            let message = subscription
                .messages
                .recv()
                .await
                .ok_or_else(|| "reply channel closed".to_owned())?;
            if message.correlation_id.as_deref() != Some("abc") || message.payload != b"ping" {
                return Err(format!("unexpected reply: {:?}", message));
            }
            if transport.published() != 1 {
                return Err(format!("expected 1 publish, got {}", transport.published()));
            }
            Ok(())
        })
    }

    #[test]
    fn publish_failure_is_reported() -> Result<(), String> {
        run_async_test(async {
            let transport = MemoryTransport::new(echo_responder());
            transport.set_publish_failure(true);
            match transport.publish(outbound("abc", b"ping")).await {
                Err(TransportError::Publish { .. }) => {}
                other => return Err(format!("expected publish failure, got {:?}", other)),
            }
            if transport.published() != 0 {
                return Err("failed publish must not be counted".to_owned());
            }
            Ok(())
        })
    }

    #[test]
    fn second_subscribe_is_rejected() -> Result<(), String> {
        run_async_test(async {
            let transport = MemoryTransport::new(silent_responder());
            let _subscription = transport.subscribe().await.map_err(|err| err.to_string())?;
            match transport.subscribe().await {
                Err(TransportError::AlreadySubscribed) => Ok(()),
                other => Err(format!("expected AlreadySubscribed, got {:?}", other)),
            }
        })
    }

    #[test]
    fn close_ends_reply_stream_and_rejects_publish() -> Result<(), String> {
        run_async_test(async {
            let transport = MemoryTransport::new(silent_responder());
            let mut subscription = transport.subscribe().await.map_err(|err| err.to_string())?;
            transport.close().await.map_err(|err| err.to_string())?;

            if subscription.messages.recv().await.is_some() {
                return Err("expected reply stream to end".to_owned());
            }
            match transport.publish(outbound("abc", b"ping")).await {
                Err(TransportError::NotConnected) => Ok(()),
                other => Err(format!("expected NotConnected, got {:?}", other)),
            }
        })
    }
}
