//! In-process fan-out of freshly broadcast progress messages.
//!
//! One registry maps a process ID to its live subscriber channels. Channels
//! are bounded; every delivery runs in its own task so a slow subscriber
//! cannot stall the publisher or its peers. The registry mutex is held only
//! for structural changes, never across a send.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use uuid::Uuid;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

struct Subscriber {
    token: u64,
    tx: mpsc::Sender<Vec<u8>>,
}

pub struct MessageBus {
    subscriptions: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_token: AtomicU64,
    capacity: usize,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            capacity,
        }
    }

    /// A fresh process ID from a uniform unique namespace.
    pub fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Register a new subscriber channel for a process ID. The returned token
    /// identifies the channel for [`MessageBus::unsubscribe`].
    pub fn subscribe(&self, process_id: &str) -> (u64, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.subscriptions
            .lock()
            .expect("bus lock")
            .entry(process_id.to_string())
            .or_default()
            .push(Subscriber { token, tx });
        (token, rx)
    }

    /// Remove and close one subscriber channel. Unknown tokens are ignored.
    pub fn unsubscribe(&self, process_id: &str, token: u64) {
        let mut subs = self.subscriptions.lock().expect("bus lock");
        if let Some(channels) = subs.get_mut(process_id) {
            channels.retain(|s| s.token != token);
            if channels.is_empty() {
                subs.remove(process_id);
            }
        }
    }

    /// Deliver a message to every live subscriber of a process ID without
    /// blocking the caller.
    pub fn broadcast(&self, process_id: &str, message: &[u8]) {
        let senders: Vec<mpsc::Sender<Vec<u8>>> = {
            let subs = self.subscriptions.lock().expect("bus lock");
            match subs.get(process_id) {
                Some(channels) => channels.iter().map(|s| s.tx.clone()).collect(),
                None => return,
            }
        };
        for tx in senders {
            let message = message.to_vec();
            tokio::spawn(async move {
                // A dropped receiver just means the subscriber went away.
                let _ = tx.send(message).await;
            });
        }
    }

    /// Close every channel of a process ID and drop its registration.
    pub fn close(&self, process_id: &str) {
        self.subscriptions
            .lock()
            .expect("bus lock")
            .remove(process_id);
    }

    #[cfg(test)]
    fn subscriber_count(&self, process_id: &str) -> usize {
        self.subscriptions
            .lock()
            .expect("bus lock")
            .get(process_id)
            .map_or(0, Vec::len)
    }
}
