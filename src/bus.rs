//! Non-blocking fan-out to any number of subscribers.
//! Each subscriber gets its own bounded channel. A subscriber that falls behind
//! misses values instead of slowing down the publisher, and subscribers that
//! dropped their receiver are removed on the next publish.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

pub struct Bus<T> {
    subscribers: Arc<Mutex<Vec<Sender<T>>>>,
}

impl<T: Clone> Bus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds a subscriber that can hold up to `capacity` undelivered values.
    pub fn subscribe(&self, capacity: usize) -> Receiver<T> {
        let (tx, rx) = channel::bounded(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Sends a copy of `value` to every subscriber with room for it.
    /// Returns how many subscribers received it.
    pub fn publish(&self, value: &T) -> usize {
        let mut subscribers = self.subscribers.lock();
        let mut delivered = 0;

        subscribers.retain(|tx| match tx.try_send(value.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T: Clone> Default for Bus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}
