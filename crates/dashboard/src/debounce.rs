//! Per-field commit timers.
//!
//! Each field is either idle or holds one pending commit. Arming a field cancels its
//! pending commit before scheduling the new one, so the last keystroke wins; distinct
//! fields never interfere.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug)]
enum FieldState {
    Idle,
    PendingCommit {
        token: CancellationToken,
        generation: u64,
    },
}

#[derive(Debug)]
struct Slots<K> {
    fields: HashMap<K, FieldState>,
    next_generation: u64,
}

pub struct Debouncer<K> {
    delay: Duration,
    slots: Arc<Mutex<Slots<K>>>,
}

impl<K> Clone for Debouncer<K> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slots: Arc::new(Mutex::new(Slots {
                fields: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Schedule `commit` to run after the debounce delay, replacing any commit still
    /// pending for `key`.
    pub fn arm<F>(&self, key: K, commit: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut slots = lock(&self.slots);
            slots.next_generation += 1;
            let generation = slots.next_generation;
            let previous = slots.fields.insert(
                key.clone(),
                FieldState::PendingCommit {
                    token: token.clone(),
                    generation,
                },
            );
            if let Some(FieldState::PendingCommit { token, .. }) = previous {
                trace!(key = ?key, "pending commit superseded");
                token.cancel();
            }
            generation
        };

        let slots = Arc::clone(&self.slots);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            {
                let mut slots = lock(&slots);
                let current = matches!(
                    slots.fields.get(&key),
                    Some(FieldState::PendingCommit { generation: g, .. }) if *g == generation
                );
                if !current {
                    return;
                }
                slots.fields.insert(key.clone(), FieldState::Idle);
            }
            trace!(key = ?key, "commit fired");
            commit.await;
        });
    }

    /// Drop the pending commit for `key`, if any (field blurred or cleared).
    pub fn cancel(&self, key: &K) -> bool {
        let mut slots = lock(&self.slots);
        match slots.fields.insert(key.clone(), FieldState::Idle) {
            Some(FieldState::PendingCommit { token, .. }) => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        matches!(
            lock(&self.slots).fields.get(key),
            Some(FieldState::PendingCommit { .. })
        )
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.slots)
            .fields
            .values()
            .filter(|state| matches!(state, FieldState::PendingCommit { .. }))
            .count()
    }
}

fn lock<K>(slots: &Mutex<Slots<K>>) -> MutexGuard<'_, Slots<K>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}
