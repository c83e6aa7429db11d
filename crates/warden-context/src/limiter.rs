//! Token-bucket rate limiting.
//!
//! Every bucket is refilled by one process-wide daemon thread on a fixed
//! tick. Waiters are served in arrival order.

use std::collections::VecDeque;
use std::sync::{Arc, Once, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::{const_mutex, Condvar, Mutex};
use tracing::{debug, trace};

use crate::LimitError;

/// Interval between two refills of every bucket.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

const TICKS_PER_SECOND: u64 = 1000 / TICK_INTERVAL.as_millis() as u64;

static BUCKETS: Mutex<Vec<Weak<TokenBucket>>> = const_mutex(Vec::new());
static DAEMON: Once = Once::new();

/// A named rate limit, in tokens (usually bytes) per second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limit {
    pub name: String,
    pub rate: u64,
}

impl Limit {
    pub fn new(name: impl Into<String>, rate: u64) -> Self {
        Self {
            name: name.into(),
            rate,
        }
    }

    /// Tokens added per tick. The rate must split evenly across the ticks of
    /// one second.
    pub fn refill_increment(&self) -> Result<u64, LimitError> {
        if self.rate == 0 {
            return Err(LimitError::ZeroRate {
                name: self.name.clone(),
            });
        }
        if self.rate % TICKS_PER_SECOND != 0 {
            return Err(LimitError::ImpreciseRate {
                name: self.name.clone(),
                rate: self.rate,
                tick_ms: TICK_INTERVAL.as_millis() as u64,
            });
        }
        Ok(self.rate / TICKS_PER_SECOND)
    }
}

#[derive(Debug)]
struct BucketState {
    available: u64,
    /// Tickets of blocked takers, oldest first.
    queue: VecDeque<u64>,
    next_ticket: u64,
}

/// A token bucket. `0 <= available <= capacity` always holds.
#[derive(Debug)]
pub struct TokenBucket {
    name: String,
    capacity: u64,
    increment: u64,
    state: Mutex<BucketState>,
    refilled: Condvar,
}

impl TokenBucket {
    /// A full bucket holding one second worth of `limit.rate`.
    pub fn new(limit: &Limit) -> Result<Arc<Self>, LimitError> {
        Self::with_available(limit, limit.rate)
    }

    /// A bucket holding `available` tokens; capacity is one second worth of
    /// `limit.rate`.
    pub fn with_available(limit: &Limit, available: u64) -> Result<Arc<Self>, LimitError> {
        let increment = limit.refill_increment()?;
        let bucket = Arc::new(Self {
            name: limit.name.clone(),
            capacity: limit.rate,
            increment,
            state: Mutex::new(BucketState {
                available: available.min(limit.rate),
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            refilled: Condvar::new(),
        });
        register(&bucket);
        Ok(bucket)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn available(&self) -> u64 {
        self.state.lock().available
    }

    /// Take `count` tokens, blocking until they are available. Requests above
    /// the capacity are served in capacity-sized chunks.
    pub fn take(&self, count: u64) {
        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(self.capacity);
            self.take_chunk(chunk);
            remaining -= chunk;
        }
    }

    fn take_chunk(&self, count: u64) {
        let mut state = self.state.lock();
        if state.queue.is_empty() && state.available >= count {
            state.available -= count;
            return;
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);
        debug!(limit = %self.name, count, available = state.available, "waiting for tokens");

        loop {
            if state.queue.front() == Some(&ticket) && state.available >= count {
                state.queue.pop_front();
                state.available -= count;
                // the next waiter may already be satisfied
                self.refilled.notify_all();
                return;
            }
            self.refilled.wait(&mut state);
        }
    }

    fn refill(&self) {
        let mut state = self.state.lock();
        if state.available < self.capacity {
            state.available = (state.available + self.increment).min(self.capacity);
            trace!(limit = %self.name, available = state.available, "refilled");
        }
        if !state.queue.is_empty() {
            self.refilled.notify_all();
        }
    }
}

fn register(bucket: &Arc<TokenBucket>) {
    BUCKETS.lock().push(Arc::downgrade(bucket));
    DAEMON.call_once(|| {
        let spawned = thread::Builder::new()
            .name("warden-refill".into())
            .spawn(refill_loop);
        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to start the limiter refill daemon");
        }
    });
}

fn refill_loop() {
    loop {
        thread::sleep(TICK_INTERVAL);
        let alive: Vec<Arc<TokenBucket>> = {
            let mut buckets = BUCKETS.lock();
            buckets.retain(|b| b.strong_count() > 0);
            buckets.iter().filter_map(Weak::upgrade).collect()
        };
        for bucket in alive {
            bucket.refill();
        }
    }
}
