//! Correlation table from outbound call id to its pending outcome.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::value::RawValue;
use tokio::sync::oneshot;

use crate::error::{Result, RpcError};

/// Terminal outcome of one outbound call.
pub(crate) type Outcome = Result<Box<RawValue>>;

#[derive(Default)]
struct RegistryState {
    pending: HashMap<u64, oneshot::Sender<Outcome>>,
    closed: bool,
}

/// Pending outbound calls keyed by id.
///
/// The lock is only ever held for the table operation itself. Every entry is
/// removed exactly once, by whichever of resolve, cancel or close gets to it
/// first, so at most one outcome is delivered per id.
#[derive(Default)]
pub(crate) struct CallRegistry {
    state: Mutex<RegistryState>,
}

impl CallRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pending call. Fails once the registry has been closed.
    pub(crate) fn register(&self, id: u64) -> Result<oneshot::Receiver<Outcome>> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        if state.closed {
            return Err(RpcError::Closed);
        }
        state.pending.insert(id, tx);
        Ok(rx)
    }

    /// Deliver `outcome` to the call `id`.
    ///
    /// Returns `false` when no such call is pending (already cancelled or
    /// never issued); the outcome is dropped.
    pub(crate) fn resolve(&self, id: u64, outcome: Outcome) -> bool {
        let sender = self.lock().pending.remove(&id);
        match sender {
            Some(tx) => {
                // The caller may have stopped waiting between removal and send.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Forget the call `id` without delivering anything.
    pub(crate) fn cancel(&self, id: u64) -> bool {
        self.lock().pending.remove(&id).is_some()
    }

    /// Fail every pending call with [`RpcError::Closed`] and refuse new ones.
    ///
    /// Returns how many calls were failed.
    pub(crate) fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.closed = true;
            state.pending.drain().collect()
        };
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(RpcError::Closed));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().pending.len()
    }
}

/// Removes its call from the registry when dropped.
///
/// Dropping a call future at any await point (deadline, cancellation,
/// `select!`) therefore deregisters the call.
pub(crate) struct PendingGuard<'a> {
    registry: &'a CallRegistry,
    id: u64,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(registry: &'a CallRegistry, id: u64) -> Self {
        Self { registry, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.cancel(self.id);
    }
}
