//! In-process publish/subscribe bus.
//!
//! Constructed once and handed to whoever needs it; there is no global
//! instance. Subscribers get bounded queues and publishing never blocks: a
//! message for a full or dropped subscriber is discarded and counted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_CAPACITY: usize = 1024;

pub struct Bus<T> {
    topics: Mutex<HashMap<String, Vec<SyncSender<T>>>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T: Clone> Bus<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Vec<SyncSender<T>>>> {
        self.topics.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn subscribe(&self, topic: &str) -> Receiver<T> {
        let (tx, rx) = mpsc::sync_channel(self.capacity);
        self.topics().entry(topic.to_string()).or_default().push(tx);
        rx
    }

    /// Deliver `msg` to every live subscriber of `topic`. Returns how many got it.
    pub fn publish(&self, topic: &str, msg: T) -> usize {
        let mut topics = self.topics();
        let Some(subs) = topics.get_mut(topic) else {
            return 0;
        };
        let mut delivered = 0;
        subs.retain(|tx| match tx.try_send(msg.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    /// Messages dropped because a subscriber queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Default for Bus<T> {
    fn default() -> Self {
        Self::new()
    }
}
