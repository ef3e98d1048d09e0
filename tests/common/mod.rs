#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pullstream::{
    Publisher, SharedPublisher, SharedSubscriber, SharedSubscription, StreamError, Subscriber,
    Subscription,
};

/// Everything a probe observed, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent<T> {
    Start,
    Item(T),
    Error(StreamError),
    Complete,
}

/// A recording subscriber. Optionally requests a fixed amount of credit as
/// soon as it is started, and can be told to cancel from inside a callback
/// to exercise reentrant paths.
pub struct TestProbe<T> {
    events: Mutex<Vec<ProbeEvent<T>>>,
    subscription: Mutex<Option<SharedSubscription>>,
    auto_request: u64,
    cancel_on_start: AtomicBool,
    cancel_after_items: AtomicU64,
}

impl<T> TestProbe<T> {
    pub fn new() -> Arc<Self> {
        Self::requesting(0)
    }

    /// A probe that requests `n` credit the moment it is started. Pass
    /// `u64::MAX` for an unbounded consumer.
    pub fn requesting(n: u64) -> Arc<Self> {
        Arc::new(TestProbe {
            events: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            auto_request: n,
            cancel_on_start: AtomicBool::new(false),
            cancel_after_items: AtomicU64::new(u64::MAX),
        })
    }

    /// Cancel from inside `on_subscribe`, before returning.
    pub fn cancel_on_start(self: &Arc<Self>) -> Arc<Self> {
        self.cancel_on_start.store(true, Ordering::SeqCst);
        self.clone()
    }

    /// Cancel from inside `on_next` once `n` items have been seen.
    pub fn cancel_after_items(self: &Arc<Self>, n: u64) -> Arc<Self> {
        self.cancel_after_items.store(n, Ordering::SeqCst);
        self.clone()
    }

    pub fn events(&self) -> Vec<ProbeEvent<T>>
    where
        T: Clone,
    {
        self.events.lock().unwrap().clone()
    }

    pub fn items(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProbeEvent::Item(item) => Some(item),
                _ => None,
            })
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, ProbeEvent::Complete))
    }

    pub fn errors(&self) -> Vec<StreamError> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                ProbeEvent::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn request(&self, n: u64) {
        let subscription = self.subscription.lock().unwrap().clone();
        subscription
            .expect("probe was never started")
            .request(n);
    }

    pub fn cancel(&self) {
        let subscription = self.subscription.lock().unwrap().clone();
        subscription.expect("probe was never started").cancel();
    }

    /// Spin until the probe has been started, then cancel. For racing a
    /// cancel from another thread against a subscribe in flight.
    pub fn cancel_when_started(&self) {
        loop {
            let subscription = self.subscription.lock().unwrap().clone();
            if let Some(subscription) = subscription {
                subscription.cancel();
                return;
            }
            std::thread::yield_now();
        }
    }

    fn items_seen(&self) -> u64 {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, ProbeEvent::Item(_)))
            .count() as u64
    }
}

impl<T: Send + Sync + 'static> Subscriber<T> for TestProbe<T> {
    fn on_subscribe(&self, subscription: SharedSubscription) {
        self.events.lock().unwrap().push(ProbeEvent::Start);
        *self.subscription.lock().unwrap() = Some(subscription.clone());
        if self.cancel_on_start.load(Ordering::SeqCst) {
            subscription.cancel();
            return;
        }
        if self.auto_request > 0 {
            subscription.request(self.auto_request);
        }
    }

    fn on_next(&self, item: T) {
        self.events.lock().unwrap().push(ProbeEvent::Item(item));
        if self.items_seen() >= self.cancel_after_items.load(Ordering::SeqCst) {
            self.cancel();
        }
    }

    fn on_error(&self, error: StreamError) {
        self.events.lock().unwrap().push(ProbeEvent::Error(error));
    }

    fn on_complete(&self) {
        self.events.lock().unwrap().push(ProbeEvent::Complete);
    }
}

/// Wraps a publisher and counts how many times it was subscribed to.
pub struct CountingPublisher<T> {
    inner: SharedPublisher<T>,
    count: AtomicUsize,
}

impl<T> CountingPublisher<T> {
    pub fn new(inner: SharedPublisher<T>) -> Arc<Self> {
        Arc::new(CountingPublisher {
            inner,
            count: AtomicUsize::new(0),
        })
    }

    pub fn subscriptions(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<T: Send + 'static> Publisher<T> for CountingPublisher<T> {
    fn subscribe(&self, subscriber: SharedSubscriber<T>) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribe(subscriber);
    }
}

/// A subscription that records every request amount and whether it was
/// cancelled, for asserting credit replay and cancel propagation.
pub struct RecordingSubscription {
    pub requests: Mutex<Vec<u64>>,
    pub cancelled: AtomicBool,
}

impl RecordingSubscription {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingSubscription {
            requests: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn requested(&self) -> Vec<u64> {
        self.requests.lock().unwrap().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Subscription for RecordingSubscription {
    fn request(&self, n: u64) {
        self.requests.lock().unwrap().push(n);
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// A publisher that hands out a recording subscription and then goes
/// silent, so tests can inspect what the operator did with the handle.
pub struct SilentPublisher {
    pub handle: Arc<RecordingSubscription>,
}

impl SilentPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(SilentPublisher {
            handle: RecordingSubscription::new(),
        })
    }
}

impl<T: Send + 'static> Publisher<T> for SilentPublisher {
    fn subscribe(&self, subscriber: SharedSubscriber<T>) {
        subscriber.on_subscribe(self.handle.clone());
    }
}
