//! Per-device critical sections.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex, MutexGuard as SyncMutexGuard},
};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use super::machine::Next;
use crate::{
    device::Device,
    error::{LeaseError, Result},
    store::DeviceStore,
};

/// A name's mutex and the number of tasks holding or waiting on it.
#[derive(Default)]
struct KeySlot {
    lock: Arc<Mutex<()>>,
    users: usize,
}

type KeyLocks = SyncMutex<HashMap<String, KeySlot>>;

/// Serializes transitions on the same device name.
///
/// Each name gets its own async mutex for as long as some task holds or
/// waits on it. Transitions on different names never wait for each other.
pub struct TransitionCoordinator<S> {
    store: S,
    locks: KeyLocks,
}

/// Registered before waiting on the lock and held for the duration of one
/// read-decide-write sequence.
struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    name: &'a str,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock_table(self.locks);
        if let Some(slot) = locks.get_mut(self.name) {
            slot.users -= 1;
            if slot.users == 0 {
                locks.remove(self.name);
            }
        }
    }
}

fn lock_table(locks: &KeyLocks) -> SyncMutexGuard<'_, HashMap<String, KeySlot>> {
    locks.lock().unwrap_or_else(|e| e.into_inner())
}

impl<S: DeviceStore> TransitionCoordinator<S> {
    pub fn new(store: S) -> Self {
        TransitionCoordinator {
            store,
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn acquire<'a>(&'a self, name: &'a str) -> KeyGuard<'a> {
        let lock = {
            let mut locks = lock_table(&self.locks);
            let slot = locks.entry(name.to_owned()).or_default();
            slot.users += 1;
            slot.lock.clone()
        };
        // Counted from here on, so a wait cancelled below still unregisters.
        let mut key = KeyGuard {
            locks: &self.locks,
            name,
            guard: None,
        };
        key.guard = Some(lock.lock_owned().await);
        key
    }

    /// Run `decide` on the current record for `name` and apply its result,
    /// with no other transition on `name` interleaving.
    ///
    /// Nothing is written when `decide` returns an error.
    #[tracing::instrument(skip(self, decide))]
    pub async fn with_exclusive_access<F>(&self, name: &str, decide: F) -> Result<Next>
    where
        F: FnOnce(Option<&Device>) -> Result<Next> + Send,
    {
        let _guard = self.acquire(name).await;
        trace!("acquired");

        let current = self.store.get(name).await?;
        let next = decide(current.as_ref())?;
        match &next {
            Next::Put(device) => self.store.put(device.clone()).await?,
            Next::Remove(_) => {
                if !self.store.delete(name).await? {
                    return Err(LeaseError::NotFound);
                }
            }
        }
        Ok(next)
    }

    /// Number of names with an active or pending critical section.
    pub fn active_keys(&self) -> usize {
        lock_table(&self.locks).len()
    }
}
