//! Fall back to alternative streams when the primary completes empty
//!
//! Delivers the primary stream's items; if the primary completes having
//! emitted nothing, subscribes to a lazily-iterated sequence of alternative
//! streams, strictly in order, until one emits at least one item, the
//! sequence is exhausted (overall completion), or an alternative or the
//! iteration itself errors (overall error). Errors never trigger switching:
//! a stream that errors reported a real failure and must not be masked.
//!
//! The selection logic runs inside a drain loop guarded by a trampoline
//! counter. Only the caller that lifts the counter from zero executes the
//! loop; work signalled while a turn is running is picked up by that same
//! turn. This keeps a synchronous chain of empty completions flat on the
//! call stack and keeps two threads from racing the selection logic.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::credit;
use crate::error::{StreamError, StreamResult};
use crate::protocol::{
    Publisher, SharedPublisher, SharedSubscriber, SharedSubscription, Subscriber, Subscription,
    UpstreamCell,
};

/// One slot of the alternative sequence.
///
/// The conversions give each candidate outcome a typed surface: a publisher
/// is always usable, an absent slot is the null-alternative breach, and an
/// `Err` is a failure of the iteration itself.
pub trait IntoAlternative<T> {
    fn into_alternative(self) -> StreamResult<SharedPublisher<T>>;
}

impl<T> IntoAlternative<T> for SharedPublisher<T> {
    fn into_alternative(self) -> StreamResult<SharedPublisher<T>> {
        Ok(self)
    }
}

impl<T> IntoAlternative<T> for Option<SharedPublisher<T>> {
    fn into_alternative(self) -> StreamResult<SharedPublisher<T>> {
        self.ok_or(StreamError::NullAlternative)
    }
}

impl<T> IntoAlternative<T> for StreamResult<SharedPublisher<T>> {
    fn into_alternative(self) -> StreamResult<SharedPublisher<T>> {
        self
    }
}

type AlternativeIter<T> = Box<dyn Iterator<Item = StreamResult<SharedPublisher<T>>> + Send>;

/// Publisher form of [`switch_if_empty`], for callers that want to hold the
/// operator before sharing it.
pub struct SwitchIfEmpty<T, A> {
    source: SharedPublisher<T>,
    alternatives: A,
}

impl<T, A> SwitchIfEmpty<T, A> {
    pub fn new(source: SharedPublisher<T>, alternatives: A) -> Self {
        SwitchIfEmpty {
            source,
            alternatives,
        }
    }
}

/// Switch to the next alternative publisher if `source` produces nothing.
///
/// `alternatives` is iterated lazily, once per top-level subscription, and
/// never rewound. Alternatives are attempted strictly in iteration order,
/// never concurrently; an alternative that itself completes empty advances
/// the sequence exactly like the primary did.
pub fn switch_if_empty<T, A>(source: SharedPublisher<T>, alternatives: A) -> SharedPublisher<T>
where
    T: Send + 'static,
    A: IntoIterator + Clone + Send + Sync + 'static,
    A::Item: IntoAlternative<T>,
    A::IntoIter: Send + 'static,
{
    Arc::new(SwitchIfEmpty::new(source, alternatives))
}

impl<T, A> Publisher<T> for SwitchIfEmpty<T, A>
where
    T: Send + 'static,
    A: IntoIterator + Clone + Send + Sync + 'static,
    A::Item: IntoAlternative<T>,
    A::IntoIter: Send + 'static,
{
    fn subscribe(&self, subscriber: SharedSubscriber<T>) {
        let alternatives = self
            .alternatives
            .clone()
            .into_iter()
            .map(IntoAlternative::into_alternative);
        let state = Arc::new(SwitchState {
            downstream: subscriber,
            alternatives: Mutex::new(Box::new(alternatives) as AlternativeIter<T>),
            requested: AtomicU64::new(0),
            upstream: UpstreamCell::new(),
            has_value: AtomicBool::new(false),
            active: AtomicBool::new(false),
            missed: AtomicUsize::new(0),
        });
        // Start goes out first so downstream can request or cancel before
        // any upstream exists.
        state
            .downstream
            .on_subscribe(state.clone() as SharedSubscription);
        SwitchState::drain(&state, Some(self.source.clone()));
    }
}

/// Per-subscription state block shared between the downstream handle and
/// the consumer presented to each upstream attempt.
struct SwitchState<T> {
    downstream: SharedSubscriber<T>,
    /// Pulled only inside the exclusive drain turn; the lock is never
    /// contended and never held across a subscribe call.
    alternatives: Mutex<AlternativeIter<T>>,
    /// Accumulated outstanding credit from downstream, valid before any
    /// upstream is attached and replayed in full to each new upstream.
    requested: AtomicU64,
    upstream: UpstreamCell,
    /// Set when the current upstream delivers its first item; from then on
    /// completion is terminal and the switching logic is out of the path.
    has_value: AtomicBool,
    /// Whether a subscribe attempt to a candidate is outstanding.
    active: AtomicBool,
    /// Trampoline counter: work is pending while non-zero. Terminal exits
    /// leave it non-zero on purpose so the loop can never run again.
    missed: AtomicUsize,
}

impl<T: Send + 'static> SwitchState<T> {
    fn attach(&self, subscription: SharedSubscription) {
        if self.upstream.replace(&subscription) {
            let outstanding = self.requested.load(Ordering::Acquire);
            if outstanding != 0 {
                subscription.request(outstanding);
            }
        }
    }

    fn drain(self: &Arc<Self>, mut source: Option<SharedPublisher<T>>) {
        if self.missed.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        loop {
            if self.upstream.is_cancelled() {
                return;
            }

            if !self.active.load(Ordering::Acquire) {
                let candidate = match source.take() {
                    Some(publisher) => publisher,
                    None => {
                        let pulled = {
                            let mut alternatives = self
                                .alternatives
                                .lock()
                                .unwrap_or_else(|poisoned| poisoned.into_inner());
                            alternatives.next()
                        };
                        match pulled {
                            None => {
                                log::trace!("alternative sequence exhausted; completing");
                                self.downstream.on_complete();
                                return;
                            }
                            Some(Err(error)) => {
                                self.downstream.on_error(error);
                                return;
                            }
                            Some(Ok(publisher)) => publisher,
                        }
                    }
                };
                self.active.store(true, Ordering::Release);
                candidate.subscribe(Arc::new(AttemptConsumer {
                    state: self.clone(),
                }));
            }

            if self.missed.fetch_sub(1, Ordering::AcqRel) == 1 {
                return;
            }
        }
    }
}

impl<T> Subscription for SwitchState<T> {
    fn request(&self, n: u64) {
        if !credit::validate(n) {
            return;
        }
        credit::add(&self.requested, n);
        // Forwarding a request never changes which upstream is active, so
        // this does not go through the trampoline.
        if let Some(upstream) = self.upstream.live() {
            upstream.request(n);
        }
    }

    fn cancel(&self) {
        if self.upstream.cancel() {
            log::trace!("cancelled; no further alternatives will be attempted");
        }
    }
}

/// The operator acting as consumer for one upstream attempt.
struct AttemptConsumer<T> {
    state: Arc<SwitchState<T>>,
}

impl<T: Send + 'static> Subscriber<T> for AttemptConsumer<T> {
    fn on_subscribe(&self, subscription: SharedSubscription) {
        self.state.attach(subscription);
    }

    fn on_next(&self, item: T) {
        if !self.state.has_value.load(Ordering::Relaxed) {
            self.state.has_value.store(true, Ordering::Relaxed);
        }
        self.state.downstream.on_next(item);
    }

    fn on_error(&self, error: StreamError) {
        // Switching never suppresses upstream errors.
        self.state.downstream.on_error(error);
    }

    fn on_complete(&self) {
        if self.state.has_value.load(Ordering::Relaxed) {
            self.state.downstream.on_complete();
        } else {
            self.state.active.store(false, Ordering::Release);
            SwitchState::drain(&self.state, None);
        }
    }
}
