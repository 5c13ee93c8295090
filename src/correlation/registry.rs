use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{RegistryError, RequestError};
use crate::rpc::Reply;

use super::CorrelationId;

type Outcome = Result<Reply, RequestError>;

/// Maps each outstanding correlation id to the one-shot slot of the caller
/// waiting for it.
///
/// Every terminal transition (`resolve`, `expire`, `remove`, `fail_all`)
/// removes the entry under the same lock, so whichever runs first owns the
/// waiter and every later call for that id is a no-op returning `false`.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    waiters: Mutex<HashMap<CorrelationId, oneshot::Sender<Outcome>>>,
}

impl CorrelationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `id` that gives up at `deadline`.
    ///
    /// A `None` deadline waits until the reply arrives or the registry fails
    /// the waiter.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] when `id` already has a waiter.
    pub fn register(
        self: &Arc<Self>,
        id: CorrelationId,
        deadline: Option<Instant>,
    ) -> Result<PendingWaiter, RegistryError> {
        let (slot_tx, slot_rx) = oneshot::channel();
        match self.lock().entry(id) {
            Entry::Occupied(_) => return Err(RegistryError::DuplicateId { id }),
            Entry::Vacant(vacant) => {
                vacant.insert(slot_tx);
            }
        }
        Ok(PendingWaiter {
            id,
            created_at: Instant::now(),
            deadline,
            slot: slot_rx,
            registry: Arc::clone(self),
        })
    }

    /// Hands `reply` to the waiter registered for `id`.
    ///
    /// Returns `false` when no waiter is registered (late, duplicate or
    /// foreign reply) or when its caller has already gone away.
    pub fn resolve(&self, id: &CorrelationId, reply: Reply) -> bool {
        let mut waiters = self.lock();
        let Some(slot) = waiters.remove(id) else {
            return false;
        };
        // Sent while holding the lock: once the entry is gone, the value is
        // already in the slot for the waiter to read.
        let delivered = slot.send(Ok(reply)).is_ok();
        drop(waiters);
        if !delivered {
            debug!("Waiter for {} went away before its reply arrived", id);
        }
        delivered
    }

    /// Marks the waiter for `id` as timed out if it is still pending.
    pub fn expire(&self, id: &CorrelationId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Drops the waiter for `id` without resolving it.
    pub fn remove(&self, id: &CorrelationId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Fails every pending waiter with [`RequestError::ReplyChannelClosed`].
    ///
    /// Returns the number of waiters that were failed.
    pub fn fail_all(&self) -> usize {
        let mut waiters = self.lock();
        let count = waiters.len();
        // Same rule as `resolve`: every slot holds its error before the lock
        // is released.
        for (_, slot) in waiters.drain() {
            drop(slot.send(Err(RequestError::ReplyChannelClosed)));
        }
        drop(waiters);
        count
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.lock().contains_key(id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, oneshot::Sender<Outcome>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Caller-side handle for one registered waiter.
///
/// Dropping the handle before it resolves removes the registry entry, so a
/// cancelled request never leaks its id.
#[derive(Debug)]
pub struct PendingWaiter {
    id: CorrelationId,
    created_at: Instant,
    deadline: Option<Instant>,
    slot: oneshot::Receiver<Outcome>,
    registry: Arc<CorrelationRegistry>,
}

impl PendingWaiter {
    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Suspends until the reply arrives or the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Timeout`] when the deadline wins the race
    /// against the reply, or [`RequestError::ReplyChannelClosed`] when the
    /// registry failed the waiter.
    pub async fn wait(mut self) -> Result<Reply, RequestError> {
        let Some(deadline) = self.deadline else {
            return match (&mut self.slot).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RequestError::ReplyChannelClosed),
            };
        };

        match tokio::time::timeout_at(deadline, &mut self.slot).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RequestError::ReplyChannelClosed),
            Err(_) => self.settle_after_deadline(deadline),
        }
    }

    fn settle_after_deadline(&mut self, deadline: Instant) -> Result<Reply, RequestError> {
        let timeout = deadline.saturating_duration_since(self.created_at);
        if self.registry.expire(&self.id) {
            return Err(RequestError::Timeout {
                id: self.id,
                timeout,
            });
        }
        // Lost the race: the resolver removed the entry first and its value
        // is already in the slot.
        match self.slot.try_recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(RequestError::Timeout {
                id: self.id,
                timeout,
            }),
        }
    }
}

impl Drop for PendingWaiter {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
