//! Subscription Control Channel
//!
//! Bounded multi-producer, single-consumer ring carrying `Subscribe` and
//! `Halt` requests from caller threads to the worker.
//!
//! Sequence protocol:
//! - a producer claims sequence `s` by CAS on `claim` once `s - consumed`
//!   is below capacity, so the slot's previous occupant was already taken
//! - it fills slot `s & mask`, stores `s + 1` into the slot's `published`
//!   marker, then helps advance the shared `published` cursor across every
//!   contiguously published sequence
//! - the consumer reads `[consumed, published)` in sequence order and
//!   releases the whole batch with a single store to `consumed`
//!
//! Markers and cursors use `SeqCst` so a producer that finishes early and a
//! producer that finishes late cannot both miss each other's marker.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::errors::{ClientError, ClientResult};
use crate::journal::{CommitListener, JournalKey, WriterHandle};

/// Ring size used by the client.
pub const DEFAULT_CAPACITY: usize = 64;

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const SPINS_BEFORE_SLEEP: u32 = 64;
const BACKOFF_SLEEP: Duration = Duration::from_millis(1);

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

/// Request to subscribe to a remote journal
#[derive(Clone)]
pub struct Subscription {
    /// Journal as known to the server
    pub remote: JournalKey,
    /// Journal as stored locally
    pub local: JournalKey,
    pub listener: Option<Arc<dyn CommitListener>>,
    /// Caller-supplied writer; when absent one is created from server metadata
    pub writer: Option<WriterHandle>,
}

impl Subscription {
    pub fn new(remote: JournalKey, local: JournalKey) -> Self {
        Self {
            remote,
            local,
            listener: None,
            writer: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn CommitListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_writer(mut self, writer: WriterHandle) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Local storage location, unique among active subscriptions.
    pub fn location(&self) -> &str {
        self.local.derived_location()
    }

    /// Notify the listener, if any, that the subscription failed.
    pub fn notify_error(&self, reason: &str) {
        if let Some(listener) = &self.listener {
            listener.on_error(reason);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("remote", &self.remote)
            .field("local", &self.local)
            .field("listener", &self.listener.is_some())
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

/// Value carried by the control channel
#[derive(Debug, Clone)]
pub enum SubscriptionRequest {
    Subscribe(Subscription),
    Halt,
}

struct Slot {
    /// `seq + 1` once sequence `seq` is readable, else older or 0
    published: AtomicU64,
    value: UnsafeCell<Option<SubscriptionRequest>>,
}

struct Ring {
    slots: Box<[Slot]>,
    mask: u64,
    claim: AtomicU64,
    published: AtomicU64,
    consumed: AtomicU64,
    state: AtomicU8,
    publish_timeout: Duration,
}

// SAFETY: a slot value is written only by the producer that claimed its
// sequence and read only by the consumer after the sequence is published.
// The claim bound keeps producers out of slots the consumer has not
// released yet.
unsafe impl Sync for Ring {}

impl Ring {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, seq: u64) -> &Slot {
        &self.slots[(seq & self.mask) as usize]
    }

    /// Move the shared cursor over every contiguously published sequence.
    fn advance_published(&self) {
        loop {
            let cursor = self.published.load(Ordering::SeqCst);
            if self.slot(cursor).published.load(Ordering::SeqCst) != cursor + 1 {
                return;
            }
            let _ = self.published.compare_exchange(
                cursor,
                cursor + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }
}

/// Control channel constructor
pub struct SubscriptionChannel;

impl SubscriptionChannel {
    /// Channel with `capacity` slots (rounded up to a power of two).
    pub fn with_capacity(capacity: usize) -> (SubscriptionPublisher, SubscriptionConsumer) {
        Self::new(capacity, DEFAULT_PUBLISH_TIMEOUT)
    }

    /// Channel whose producers give up on a full ring after `publish_timeout`.
    pub fn new(
        capacity: usize,
        publish_timeout: Duration,
    ) -> (SubscriptionPublisher, SubscriptionConsumer) {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity)
            .map(|_| Slot {
                published: AtomicU64::new(0),
                value: UnsafeCell::new(None),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let ring = Arc::new(Ring {
            slots,
            mask: capacity as u64 - 1,
            claim: AtomicU64::new(0),
            published: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            state: AtomicU8::new(IDLE),
            publish_timeout,
        });
        (
            SubscriptionPublisher { ring: ring.clone() },
            SubscriptionConsumer { ring },
        )
    }
}

/// Producer half, shared by caller threads
#[derive(Clone)]
pub struct SubscriptionPublisher {
    ring: Arc<Ring>,
}

impl SubscriptionPublisher {
    /// Publish a request in claim order.
    ///
    /// Fails with `NotRunning` once the worker has exited. On a full ring
    /// fails with `NotStarted` if nobody will ever drain it, otherwise backs
    /// off and fails with `ChannelFull` after the publish timeout.
    pub fn publish(&self, request: SubscriptionRequest) -> ClientResult<()> {
        let seq = self.claim()?;
        let slot = self.ring.slot(seq);
        // SAFETY: `seq` is exclusively ours and its previous occupant was
        // consumed (see `claim`), so nobody else touches this cell.
        unsafe {
            *slot.value.get() = Some(request);
        }
        slot.published.store(seq + 1, Ordering::SeqCst);
        self.ring.advance_published();
        Ok(())
    }

    fn claim(&self) -> ClientResult<u64> {
        let ring = &self.ring;
        let capacity = ring.capacity() as u64;
        let mut deadline: Option<Instant> = None;
        let mut spins = 0u32;

        loop {
            let state = ring.state.load(Ordering::SeqCst);
            if state == CLOSED {
                return Err(ClientError::NotRunning);
            }

            // `consumed` first: it never passes `claim`, so the difference
            // cannot underflow.
            let consumed = ring.consumed.load(Ordering::SeqCst);
            let seq = ring.claim.load(Ordering::SeqCst);
            if seq - consumed < capacity {
                if ring
                    .claim
                    .compare_exchange_weak(seq, seq + 1, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    return Ok(seq);
                }
                continue;
            }

            if state == IDLE {
                return Err(ClientError::NotStarted);
            }
            let deadline = *deadline.get_or_insert_with(|| Instant::now() + ring.publish_timeout);
            if Instant::now() >= deadline {
                return Err(ClientError::ChannelFull(ring.capacity()));
            }
            if spins < SPINS_BEFORE_SLEEP {
                spins += 1;
                thread::yield_now();
            } else {
                thread::sleep(BACKOFF_SLEEP);
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Check if the consumer has closed the channel.
    pub fn is_closed(&self) -> bool {
        self.ring.state.load(Ordering::SeqCst) == CLOSED
    }
}

/// Consumer half, owned by the worker thread
pub struct SubscriptionConsumer {
    ring: Arc<Ring>,
}

impl SubscriptionConsumer {
    /// Mark the channel as drained by a live worker. Producers back off on a
    /// full ring from now on instead of failing fast.
    pub fn start(&self) {
        let _ = self
            .ring
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Take every published request, in claim order.
    pub fn drain(&mut self) -> Vec<SubscriptionRequest> {
        let ring = &self.ring;
        ring.advance_published();
        let start = ring.consumed.load(Ordering::SeqCst);
        let end = ring.published.load(Ordering::SeqCst);

        let mut batch = Vec::with_capacity((end - start) as usize);
        for seq in start..end {
            // SAFETY: `seq` is published and not yet released, so only the
            // consumer may access the slot.
            let value = unsafe { (*ring.slot(seq).value.get()).take() };
            if let Some(request) = value {
                batch.push(request);
            }
        }
        if end > start {
            ring.consumed.store(end, Ordering::SeqCst);
        }
        batch
    }

    /// Check for a published, unconsumed `Halt` without consuming anything.
    pub fn has_pending_halt(&self) -> bool {
        let ring = &self.ring;
        ring.advance_published();
        let start = ring.consumed.load(Ordering::SeqCst);
        let end = ring.published.load(Ordering::SeqCst);
        (start..end).any(|seq| {
            // SAFETY: as in `drain`; the value is only borrowed.
            let value = unsafe { &*ring.slot(seq).value.get() };
            matches!(value, Some(SubscriptionRequest::Halt))
        })
    }

    /// Refuse all further publishes.
    pub fn close(&self) {
        self.ring.state.store(CLOSED, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.ring.state.load(Ordering::SeqCst) == CLOSED
    }
}

impl Drop for SubscriptionConsumer {
    fn drop(&mut self) {
        self.close();
    }
}
