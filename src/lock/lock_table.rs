use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};
use tracing::{trace, warn};

use super::error::{LockError, LockResult};
use super::{LockManager, Permission};
use crate::file::PageKey;
use crate::transaction::TransactionId;

/// Default time a transaction may wait for a page lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Holders of one page's lock
#[derive(Debug, Default)]
struct LockEntry {
    shared: AHashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl LockEntry {
    /// Transactions that must let go before `tid` can get `perm`
    fn blockers(&self, tid: TransactionId, perm: Permission) -> Vec<TransactionId> {
        if self.exclusive == Some(tid) {
            return Vec::new();
        }

        match perm {
            Permission::ReadOnly => self.exclusive.into_iter().collect(),
            Permission::ReadWrite => self
                .exclusive
                .into_iter()
                .chain(self.shared.iter().copied().filter(|&holder| holder != tid))
                .collect(),
        }
    }

    fn grant(&mut self, tid: TransactionId, perm: Permission) {
        match perm {
            Permission::ReadOnly => {
                if self.exclusive != Some(tid) {
                    self.shared.insert(tid);
                }
            }
            // Upgrade: the shared lock folds into the exclusive one
            Permission::ReadWrite => {
                self.shared.remove(&tid);
                self.exclusive = Some(tid);
            }
        }
    }

    fn remove(&mut self, tid: TransactionId) {
        self.shared.remove(&tid);
        if self.exclusive == Some(tid) {
            self.exclusive = None;
        }
    }

    fn holds(&self, tid: TransactionId) -> bool {
        self.exclusive == Some(tid) || self.shared.contains(&tid)
    }

    fn is_free(&self) -> bool {
        self.exclusive.is_none() && self.shared.is_empty()
    }
}

#[derive(Debug, Default)]
struct LockState {
    entries: AHashMap<PageKey, LockEntry>,
    held: AHashMap<TransactionId, AHashSet<PageKey>>,
    waits_for: AHashMap<TransactionId, Vec<TransactionId>>,
}

impl LockState {
    /// Whether following waits-for edges out of `tid` leads back to it
    fn closes_cycle(&self, tid: TransactionId) -> bool {
        let mut stack = self.waits_for.get(&tid).cloned().unwrap_or_default();
        let mut seen = AHashSet::new();

        while let Some(next) = stack.pop() {
            if next == tid {
                return true;
            }
            if !seen.insert(next) {
                continue;
            }
            if let Some(edges) = self.waits_for.get(&next) {
                stack.extend(edges.iter().copied());
            }
        }

        false
    }

    fn release(&mut self, tid: TransactionId, key: PageKey) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.remove(tid);
            if entry.is_free() {
                self.entries.remove(&key);
            }
        }
    }
}

/// Blocking shared/exclusive lock table keyed by page.
///
/// A waiting transaction records which transactions it waits for; if that
/// closes a cycle the request fails with `Deadlock` instead of waiting. Any
/// wait longer than the configured timeout fails with `Timeout`.
pub struct PageLockTable {
    state: Mutex<LockState>,
    released: Condvar,
    timeout: Duration,
}

impl PageLockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of pages with at least one lock held on them
    pub fn locked_page_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }
}

impl Default for PageLockTable {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl LockManager for PageLockTable {
    fn acquire(&self, tid: TransactionId, key: PageKey, perm: Permission) -> LockResult<()> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut state = self.state.lock().unwrap();

        loop {
            let blockers = state
                .entries
                .get(&key)
                .map(|entry| entry.blockers(tid, perm))
                .unwrap_or_default();

            if blockers.is_empty() {
                state.waits_for.remove(&tid);
                state.entries.entry(key).or_default().grant(tid, perm);
                state.held.entry(tid).or_default().insert(key);
                trace!(%tid, page = %key, ?perm, "lock granted");
                return Ok(());
            }

            state.waits_for.insert(tid, blockers);
            if state.closes_cycle(tid) {
                state.waits_for.remove(&tid);
                warn!(%tid, page = %key, ?perm, "deadlock detected");
                return Err(LockError::Deadlock { tid, key });
            }

            let now = Instant::now();
            if now >= deadline {
                state.waits_for.remove(&tid);
                warn!(%tid, page = %key, ?perm, "lock wait timed out");
                return Err(LockError::Timeout {
                    tid,
                    key,
                    waited: now - started,
                });
            }

            let (guard, _) = self.released.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }

    fn release(&self, tid: TransactionId, key: PageKey) {
        let mut state = self.state.lock().unwrap();
        state.release(tid, key);
        if let Some(keys) = state.held.get_mut(&tid) {
            keys.remove(&key);
            if keys.is_empty() {
                state.held.remove(&tid);
            }
        }
        drop(state);
        self.released.notify_all();
    }

    fn release_all(&self, tid: TransactionId) {
        let mut state = self.state.lock().unwrap();
        for key in state.held.remove(&tid).unwrap_or_default() {
            state.release(tid, key);
        }
        state.waits_for.remove(&tid);
        for edges in state.waits_for.values_mut() {
            edges.retain(|&waited_on| waited_on != tid);
        }
        drop(state);
        self.released.notify_all();
    }

    fn holds(&self, tid: TransactionId, key: PageKey) -> bool {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(&key)
            .is_some_and(|entry| entry.holds(tid))
    }
}
