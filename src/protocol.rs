//! Core stream protocol contract
//!
//! A stream is a (possibly empty) ordered sequence of item signals followed
//! by exactly one terminal signal, preceded by exactly one start signal. The
//! consumer governs the pace: a producer may only emit as many items as the
//! consumer has requested through the subscription handle it received at
//! start time.
//!
//! The contract every stage must honor:
//! - subscribe-once: a subscriber is handed exactly one subscription per
//!   subscribe call, before any other signal;
//! - request-before-items: items are only delivered against outstanding
//!   credit (see [`crate::credit`]);
//! - terminal-once: after `on_error` or `on_complete`, no further signals;
//! - cancel-idempotent: `cancel` may be called any number of times, from any
//!   thread, concurrently with in-flight signal delivery.
//!
//! All participants are shared, thread-safe objects driven through `&self`.
//! A consumer's reaction to a signal may synchronously trigger another
//! signal before the first call has returned, so implementations keep their
//! state in atomics rather than locks held across callbacks.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::error::StreamError;

/// The handle a producer gives a consumer at start time.
///
/// Owned jointly: the consumer holds it to request and cancel, the producer
/// holds the authority to honor or ignore it after cancellation. Must
/// tolerate use from any thread.
pub trait Subscription: Send + Sync {
    /// Request `n` more items. Credit accumulates across calls; it is never
    /// overwritten. `request(0)` is a caller error and is ignored.
    fn request(&self, n: u64);

    /// Stop the flow. Safe to call any number of times; cancellation does
    /// not produce a terminal signal downstream.
    fn cancel(&self);
}

/// The stream endpoint that receives signals and issues `request`/`cancel`
/// through the handle it receives at start time.
pub trait Subscriber<T>: Send + Sync {
    /// Delivered exactly once, before any other signal.
    fn on_subscribe(&self, subscription: SharedSubscription);

    /// One item of the stream. Never delivered beyond outstanding credit.
    fn on_next(&self, item: T);

    /// Terminal failure signal.
    fn on_error(&self, error: StreamError);

    /// Terminal completion signal.
    fn on_complete(&self);
}

/// The stream endpoint that emits signals to a subscriber.
pub trait Publisher<T>: Send + Sync {
    /// Connect `subscriber` to this stream. Signals for a single
    /// subscription arrive non-concurrently and in protocol order.
    fn subscribe(&self, subscriber: SharedSubscriber<T>);
}

/// A shared, thread-safe subscription handle.
pub type SharedSubscription = Arc<dyn Subscription>;

/// A shared, thread-safe subscriber.
pub type SharedSubscriber<T> = Arc<dyn Subscriber<T>>;

/// A shared, thread-safe publisher.
pub type SharedPublisher<T> = Arc<dyn Publisher<T>>;

/// A subscription whose `request` and `cancel` are both no-ops.
///
/// Handed out by streams that never emit items, so there is nothing to
/// request and nothing that needs tearing down.
pub struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}

lazy_static::lazy_static! {
    static ref NOOP_SUBSCRIPTION: SharedSubscription = Arc::new(NoopSubscription);
}

/// Get the shared no-op subscription instance
pub fn noop_subscription() -> SharedSubscription {
    NOOP_SUBSCRIPTION.clone()
}

enum UpstreamSlot {
    Live(SharedSubscription),
    Cancelled,
}

lazy_static::lazy_static! {
    static ref CANCELLED_SLOT: Arc<UpstreamSlot> = Arc::new(UpstreamSlot::Cancelled);
}

fn same_slot(a: &Option<Arc<UpstreamSlot>>, b: &Option<Arc<UpstreamSlot>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Atomic holder for the one active upstream subscription of an operator.
///
/// The cell is in one of three states: no upstream yet, a live handle, or
/// the cancelled sentinel. Transitions are compare-and-swap based, never a
/// blocking lock, so a callback invoked synchronously from within a
/// `subscribe` call can update the same cell the caller of `subscribe` is
/// still inside. A start signal that races a cancel observes the sentinel
/// and cancels its own handle instead of attaching.
pub struct UpstreamCell {
    slot: ArcSwapOption<UpstreamSlot>,
}

impl UpstreamCell {
    /// An empty cell: no upstream attached yet.
    pub fn new() -> Self {
        UpstreamCell {
            slot: ArcSwapOption::const_empty(),
        }
    }

    /// Attach `incoming` as the current upstream, replacing any previous
    /// live handle. Returns `false` if the cell was already cancelled, in
    /// which case `incoming` is cancelled immediately.
    pub fn replace(&self, incoming: &SharedSubscription) -> bool {
        let next = Some(Arc::new(UpstreamSlot::Live(incoming.clone())));
        let mut current = self.slot.load();
        loop {
            if matches!(current.as_deref(), Some(UpstreamSlot::Cancelled)) {
                incoming.cancel();
                return false;
            }
            let previous = self.slot.compare_and_swap(&*current, next.clone());
            if same_slot(&previous, &current) {
                return true;
            }
            current = previous;
        }
    }

    /// Move the cell to the cancelled sentinel and cancel the displaced
    /// live handle, if any. Idempotent: only the call that performs the
    /// transition returns `true`.
    pub fn cancel(&self) -> bool {
        let previous = self.slot.swap(Some(CANCELLED_SLOT.clone()));
        match previous.as_deref() {
            Some(UpstreamSlot::Cancelled) => false,
            Some(UpstreamSlot::Live(upstream)) => {
                upstream.cancel();
                true
            }
            None => true,
        }
    }

    /// Whether the cell holds the cancelled sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.slot.load().as_deref(), Some(UpstreamSlot::Cancelled))
    }

    /// The currently attached live handle, if any.
    pub fn live(&self) -> Option<SharedSubscription> {
        match self.slot.load().as_deref() {
            Some(UpstreamSlot::Live(upstream)) => Some(upstream.clone()),
            _ => None,
        }
    }
}

impl Default for UpstreamCell {
    fn default() -> Self {
        UpstreamCell::new()
    }
}
