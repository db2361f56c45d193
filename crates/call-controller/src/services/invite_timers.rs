//! Precise per-participant invite timers.
//!
//! One one-shot timer per `(room_id, uid)` key. Scheduling replaces any
//! prior timer for the key; cancelling aborts it. The map is the only
//! shared mutable structure in the process and its mutex is held only for
//! insert/remove, never across a timer's action.
//!
//! Timers are in-memory and lost on restart; the periodic sweep task is
//! the durable safety net. A cancel that loses the race against a firing
//! timer is harmless because the timeout transition re-checks the
//! participant status inside its transaction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

type TimerKey = (String, String);

struct TimerEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Map of pending invite timers.
#[derive(Default)]
pub struct InviteTimers {
    timers: Mutex<HashMap<TimerKey, TimerEntry>>,
    next_generation: AtomicU64,
}

impl InviteTimers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the timer for `(room_id, uid)`, running `on_fire`
    /// after `delay`.
    pub fn schedule<F, Fut>(self: &Arc<Self>, room_id: &str, uid: &str, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key: TimerKey = (room_id.to_string(), uid.to_string());
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let timers = Arc::clone(self);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            timers.remove_if_generation(&task_key, generation);
            on_fire().await;
        });

        let mut map = self.timers.lock().expect("timer map poisoned");
        if let Some(previous) = map.insert(key, TimerEntry { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Stop and remove the timer for `(room_id, uid)`, if any.
    pub fn cancel(&self, room_id: &str, uid: &str) {
        let key: TimerKey = (room_id.to_string(), uid.to_string());
        let entry = self.timers.lock().expect("timer map poisoned").remove(&key);
        if let Some(entry) = entry {
            entry.handle.abort();
        }
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.lock().expect("timer map poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the key only if it still belongs to the firing timer; a
    /// rescheduled entry under the same key stays untouched.
    fn remove_if_generation(&self, key: &TimerKey, generation: u64) {
        let mut map = self.timers.lock().expect("timer map poisoned");
        if map.get(key).is_some_and(|e| e.generation == generation) {
            map.remove(key);
        }
    }
}
