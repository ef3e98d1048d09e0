//! Protocol conformance checking
//!
//! Wraps a publisher with a proxy consumer that checks every signal against
//! the protocol contract and reports breaches through a side-channel sink,
//! for diagnostic and test use. The data path is unchanged: signals are
//! forwarded verbatim, except where forwarding would itself break the
//! protocol (items and terminals arriving after a terminal signal are
//! reported and then suppressed).
//!
//! The validator observes, it does not enforce. A stream that breaks the
//! contract keeps flowing; the sink is how the breach becomes visible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::protocol::{
    Publisher, SharedPublisher, SharedSubscriber, SharedSubscription, Subscriber, Subscription,
};

/// A single protocol breach observed by the validator.
///
/// Immutable once constructed; terminal-related breaches carry the payload
/// that was delivered redundantly, when there is one.
///
/// Safe Rust cannot pass an absent handle, item, or error through the typed
/// trait surface, so [`Violation::NullStartHandle`] and
/// [`Violation::NullError`] are only reachable from bridge layers that
/// police a nullable boundary. [`Violation::NullItem`] is observable through
/// a null probe, see [`ValidatedPublisher::with_null_probe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum Violation {
    /// `on_subscribe` was invoked with an absent subscription handle
    #[error("on_subscribe received a null subscription handle")]
    NullStartHandle,
    /// `on_subscribe` was invoked more than once for the same subscription
    #[error("on_subscribe was called more than once")]
    MultipleStarts,
    /// A signal arrived before `on_subscribe`
    #[error("a signal arrived before on_subscribe")]
    StartNotCalled { cause: Option<StreamError> },
    /// `on_next` was invoked with an absent item
    #[error("on_next received a null item")]
    NullItem,
    /// `on_next` was invoked after a terminal signal
    #[error("on_next was called after a terminal signal")]
    ItemAfterTermination,
    /// A terminal signal was delivered more than once
    #[error("a terminal signal was delivered more than once")]
    MultipleTerminations { cause: Option<StreamError> },
    /// `on_error` was invoked with an absent cause
    #[error("on_error received a null cause")]
    NullError,
}

/// Side-channel callback receiving each detected [`Violation`].
///
/// Invoked synchronously on the thread delivering the offending signal,
/// once per breach. A panicking sink is fatal: the panic propagates to the
/// delivering caller.
pub type ViolationSink = Arc<dyn Fn(Violation) + Send + Sync>;

/// A publisher that checks its source's signals against the protocol.
///
/// Built by [`wrap`]; see the module docs for the forwarding rules.
pub struct ValidatedPublisher<T> {
    source: SharedPublisher<T>,
    on_violation: ViolationSink,
    null_probe: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
}

/// Wrap `source` so every subscription is checked for protocol conformance,
/// reporting breaches through `on_violation`.
pub fn wrap<T, F>(source: SharedPublisher<T>, on_violation: F) -> ValidatedPublisher<T>
where
    F: Fn(Violation) + Send + Sync + 'static,
{
    ValidatedPublisher {
        source,
        on_violation: Arc::new(on_violation),
        null_probe: None,
    }
}

impl<T> ValidatedPublisher<T> {
    /// Teach the validator what an absent item looks like.
    ///
    /// An item for which `probe` returns `true` is reported as
    /// [`Violation::NullItem`] and still forwarded: the validator is
    /// diagnostic-only and must not alter the data path. For `Option`
    /// payloads the probe is `Option::is_none`.
    pub fn with_null_probe<P>(mut self, probe: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.null_probe = Some(Arc::new(probe));
        self
    }

    /// This validator as a shared publisher.
    pub fn shared(self) -> SharedPublisher<T>
    where
        T: 'static,
    {
        Arc::new(self)
    }
}

impl<T: 'static> Publisher<T> for ValidatedPublisher<T> {
    fn subscribe(&self, subscriber: SharedSubscriber<T>) {
        let handle = Arc::new(ProxyHandle {
            upstream: ArcSwapOption::const_empty(),
        });
        self.source.subscribe(Arc::new(ValidatingSubscriber {
            downstream: subscriber,
            on_violation: self.on_violation.clone(),
            null_probe: self.null_probe.clone(),
            handle,
            done: AtomicBool::new(false),
        }));
    }
}

/// The handle the proxy gives downstream, so `request`/`cancel` can be
/// intercepted. Delegates to the recorded upstream handle.
struct ProxyHandle {
    upstream: ArcSwapOption<SharedSubscription>,
}

impl Subscription for ProxyHandle {
    fn request(&self, n: u64) {
        match self.upstream.load_full() {
            // Use before start is a caller precondition breach, not a
            // reported violation: it cannot be distinguished from a correct
            // downstream racing the handle.
            None => log::warn!("request() before on_subscribe; dropping"),
            Some(upstream) => upstream.request(n),
        }
    }

    fn cancel(&self) {
        match self.upstream.load_full() {
            None => log::warn!("cancel() before on_subscribe; dropping"),
            Some(upstream) => upstream.cancel(),
        }
    }
}

struct ValidatingSubscriber<T> {
    downstream: SharedSubscriber<T>,
    on_violation: ViolationSink,
    null_probe: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
    handle: Arc<ProxyHandle>,
    done: AtomicBool,
}

impl<T> ValidatingSubscriber<T> {
    fn report(&self, violation: Violation) {
        log::debug!("protocol violation: {}", violation);
        (self.on_violation)(violation);
    }

    fn started(&self) -> bool {
        self.handle.upstream.load().is_some()
    }
}

impl<T: 'static> Subscriber<T> for ValidatingSubscriber<T> {
    fn on_subscribe(&self, subscription: SharedSubscription) {
        if self.started() {
            // The first handle remains of record.
            self.report(Violation::MultipleStarts);
        } else {
            self.handle.upstream.store(Some(Arc::new(subscription)));
        }
        self.downstream.on_subscribe(self.handle.clone());
    }

    fn on_next(&self, item: T) {
        if let Some(probe) = &self.null_probe {
            if probe(&item) {
                self.report(Violation::NullItem);
            }
        }
        if !self.started() {
            self.report(Violation::StartNotCalled { cause: None });
        }
        if self.done.load(Ordering::Acquire) {
            self.report(Violation::ItemAfterTermination);
        } else {
            self.downstream.on_next(item);
        }
    }

    fn on_error(&self, error: StreamError) {
        if !self.started() {
            self.report(Violation::StartNotCalled {
                cause: Some(error.clone()),
            });
        }
        if self.done.swap(true, Ordering::AcqRel) {
            self.report(Violation::MultipleTerminations {
                cause: Some(error),
            });
        } else {
            self.downstream.on_error(error);
        }
    }

    fn on_complete(&self) {
        if !self.started() {
            self.report(Violation::StartNotCalled { cause: None });
        }
        if self.done.swap(true, Ordering::AcqRel) {
            self.report(Violation::MultipleTerminations { cause: None });
        } else {
            self.downstream.on_complete();
        }
    }
}
