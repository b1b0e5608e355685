//! Bounded ring buffer for captured server output
//!
//! Producers (the stdout/stderr capture tasks) never block: once the buffer
//! is full the oldest entry is overwritten. Readers either take a snapshot of
//! what is currently retained or follow the buffer with a [`LogFollower`].

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Default number of retained lines per server
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

struct Ring<T> {
    slots: Vec<Option<T>>,
    /// Next slot to write
    head: usize,
    len: usize,
    /// Entries ever pushed; the newest retained entry has sequence `total - 1`
    total: u64,
    closed: bool,
}

impl<T: Clone> Ring<T> {
    fn oldest_seq(&self) -> u64 {
        self.total - self.len as u64
    }

    fn read_from(&self, seq: u64) -> Vec<T> {
        let capacity = self.slots.len();
        let start = seq.max(self.oldest_seq());
        let skip = (start - self.oldest_seq()) as usize;
        let first = (self.head + capacity - self.len) % capacity;

        (skip..self.len)
            .filter_map(|offset| self.slots[(first + offset) % capacity].clone())
            .collect()
    }
}

pub struct LogBuffer<T> {
    ring: Mutex<Ring<T>>,
    capacity: usize,
    /// Publishes the running total so followers can wait for new entries
    changed: watch::Sender<u64>,
}

impl<T: Clone> LogBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (changed, _) = watch::channel(0);
        Self {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                len: 0,
                total: 0,
                closed: false,
            }),
            capacity,
            changed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        // A poisoned ring still holds valid entries
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry, evicting the oldest when full. Ignored after `close`.
    pub fn push(&self, entry: T) {
        let total = {
            let mut ring = self.lock();
            if ring.closed {
                return;
            }
            let head = ring.head;
            ring.slots[head] = Some(entry);
            ring.head = (head + 1) % self.capacity;
            ring.len = (ring.len + 1).min(self.capacity);
            ring.total += 1;
            ring.total
        };
        self.changed.send_replace(total);
    }

    /// Retained entries, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        let ring = self.lock();
        let oldest = ring.oldest_seq();
        ring.read_from(oldest)
    }

    /// The last `n` retained entries, oldest first
    pub fn tail(&self, n: usize) -> Vec<T> {
        let ring = self.lock();
        let start = ring.total.saturating_sub(n as u64);
        ring.read_from(start)
    }

    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries ever pushed, including evicted ones
    pub fn total_pushed(&self) -> u64 {
        self.lock().total
    }

    /// Stop accepting entries and wake every follower
    pub fn close(&self) {
        let total = {
            let mut ring = self.lock();
            ring.closed = true;
            ring.total
        };
        self.changed.send_replace(total);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Follow this buffer starting with the entries currently retained
    pub fn follow(self: &Arc<Self>) -> LogFollower<T> {
        let cursor = self.lock().oldest_seq();
        LogFollower {
            buffer: Arc::clone(self),
            cursor,
            changed: self.changed.subscribe(),
            missed: 0,
        }
    }

    fn read_since(&self, cursor: u64) -> (Vec<T>, u64, u64, bool) {
        let ring = self.lock();
        let missed = ring.oldest_seq().saturating_sub(cursor);
        (ring.read_from(cursor), ring.total, missed, ring.closed)
    }
}

/// Streaming reader over a [`LogBuffer`]
///
/// A follower that falls behind by more than the buffer capacity silently
/// skips the evicted entries; [`LogFollower::missed`] counts them.
pub struct LogFollower<T> {
    buffer: Arc<LogBuffer<T>>,
    cursor: u64,
    changed: watch::Receiver<u64>,
    missed: u64,
}

impl<T: Clone> LogFollower<T> {
    /// Wait for entries past the cursor. `None` once the buffer is closed
    /// and fully drained.
    pub async fn next_batch(&mut self) -> Option<Vec<T>> {
        loop {
            self.changed.borrow_and_update();
            let (entries, next, missed, closed) = self.buffer.read_since(self.cursor);
            self.cursor = next;
            self.missed += missed;

            if !entries.is_empty() {
                return Some(entries);
            }
            if closed {
                return None;
            }
            if self.changed.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Entries evicted before this follower could read them
    pub fn missed(&self) -> u64 {
        self.missed
    }
}
