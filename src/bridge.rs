//! Interop between the credit protocol and `futures` streams
//!
//! Two adapters: [`from_stream`] drives a `futures` stream as a publisher,
//! emitting only against outstanding credit, and [`into_stream`] consumes a
//! publisher as a `futures` stream, managing its credit window from a
//! buffer-and-watermark configuration.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use async_stream::stream;
use futures::stream::BoxStream;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::credit;
use crate::error::{StreamError, StreamResult};
use crate::protocol::{
    Publisher, SharedPublisher, SharedSubscriber, SharedSubscription, Subscriber, Subscription,
};
use crate::terminal;

/// A boxed stream of items and at most one trailing error.
pub type ItemStream<T> = BoxStream<'static, StreamResult<T>>;

/// Credit-window configuration for [`into_stream`].
#[derive(Debug, Clone)]
pub struct StreamBridgeConfig {
    /// Initial credit issued at subscribe time; the upstream can never be
    /// more than this many items ahead of the consumer.
    pub buffer_size: usize,
    /// Consumed-item count at which the window is topped back up.
    pub refill_watermark: usize,
}

impl Default for StreamBridgeConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            refill_watermark: 50,
        }
    }
}

/// Expose a `futures` stream as a publisher honoring the credit protocol.
///
/// The stream is pumped from a spawned tokio task, so this must be called
/// within a runtime. A stream is consumed by driving it, so the returned
/// publisher supports a single subscription; later subscribers receive an
/// immediate error.
pub fn from_stream<S, T>(stream: S) -> SharedPublisher<T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    Arc::new(StreamPublisher {
        stream: Mutex::new(Some(stream.boxed())),
    })
}

struct StreamPublisher<T> {
    stream: Mutex<Option<BoxStream<'static, T>>>,
}

impl<T: Send + 'static> Publisher<T> for StreamPublisher<T> {
    fn subscribe(&self, subscriber: SharedSubscriber<T>) {
        let taken = self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match taken {
            None => terminal::error_now(
                &subscriber,
                StreamError::Custom("stream already consumed by an earlier subscriber".to_string()),
            ),
            Some(stream) => {
                let subscription = Arc::new(PumpSubscription {
                    requested: AtomicU64::new(0),
                    cancelled: AtomicBool::new(false),
                    wake: Notify::new(),
                });
                subscriber.on_subscribe(subscription.clone());
                tokio::spawn(pump(stream, subscriber, subscription));
            }
        }
    }
}

/// Handle for the pump task: credit plus a wakeup for the waiting pump.
struct PumpSubscription {
    requested: AtomicU64,
    cancelled: AtomicBool,
    wake: Notify,
}

impl PumpSubscription {
    /// Claim one credit, if any is outstanding.
    fn try_claim(&self) -> bool {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == credit::UNBOUNDED {
                return true;
            }
            if current == 0 {
                return false;
            }
            match self.requested.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Subscription for PumpSubscription {
    fn request(&self, n: u64) {
        if !credit::validate(n) {
            return;
        }
        credit::add(&self.requested, n);
        self.wake.notify_one();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

async fn pump<T: Send + 'static>(
    mut stream: BoxStream<'static, T>,
    downstream: SharedSubscriber<T>,
    subscription: Arc<PumpSubscription>,
) {
    loop {
        loop {
            if subscription.cancelled.load(Ordering::Acquire) {
                return;
            }
            if subscription.try_claim() {
                break;
            }
            subscription.wake.notified().await;
        }
        match stream.next().await {
            Some(item) => {
                if subscription.cancelled.load(Ordering::Acquire) {
                    return;
                }
                downstream.on_next(item);
            }
            None => {
                downstream.on_complete();
                return;
            }
        }
    }
}

/// Consume `source` as a `futures` stream of `StreamResult<T>`.
///
/// Issues `config.buffer_size` credit up front and re-requests in batches
/// once `config.refill_watermark` items have been consumed, so a
/// well-behaved upstream stays at most one buffer ahead. An upstream error
/// is surfaced as a final `Err` element. Dropping the stream cancels the
/// upstream subscription.
pub fn into_stream<T: Send + 'static>(
    source: SharedPublisher<T>,
    config: StreamBridgeConfig,
) -> ItemStream<T> {
    let buffer_size = config.buffer_size.max(1) as u64;
    let refill_watermark = (config.refill_watermark.max(1) as u64).min(buffer_size);

    let (tx, mut rx) = mpsc::unbounded_channel::<BridgeEvent<T>>();
    let bridge = Arc::new(ChannelBridge {
        tx,
        handle: ArcSwapOption::const_empty(),
        initial: buffer_size,
    });
    source.subscribe(bridge.clone() as SharedSubscriber<T>);

    let guard = CancelOnDrop(bridge.clone());
    let out = stream! {
        // Owned by the generator from construction, so dropping the stream
        // cancels upstream even if it was never polled.
        let _guard = guard;
        let mut consumed = 0u64;
        while let Some(event) = rx.recv().await {
            match event {
                BridgeEvent::Item(item) => {
                    consumed += 1;
                    if consumed >= refill_watermark {
                        if let Some(handle) = bridge.handle.load_full() {
                            handle.request(consumed);
                        }
                        consumed = 0;
                    }
                    yield Ok(item);
                }
                BridgeEvent::Error(error) => {
                    yield Err(error);
                    break;
                }
                BridgeEvent::Complete => break,
            }
        }
    };
    out.boxed()
}

enum BridgeEvent<T> {
    Item(T),
    Error(StreamError),
    Complete,
}

struct ChannelBridge<T> {
    tx: mpsc::UnboundedSender<BridgeEvent<T>>,
    handle: ArcSwapOption<SharedSubscription>,
    initial: u64,
}

impl<T: Send + 'static> Subscriber<T> for ChannelBridge<T> {
    fn on_subscribe(&self, subscription: SharedSubscription) {
        self.handle.store(Some(Arc::new(subscription.clone())));
        subscription.request(self.initial);
    }

    fn on_next(&self, item: T) {
        let _ = self.tx.send(BridgeEvent::Item(item));
    }

    fn on_error(&self, error: StreamError) {
        let _ = self.tx.send(BridgeEvent::Error(error));
    }

    fn on_complete(&self) {
        let _ = self.tx.send(BridgeEvent::Complete);
    }
}

struct CancelOnDrop<T>(Arc<ChannelBridge<T>>);

impl<T> Drop for CancelOnDrop<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.0.handle.load_full() {
            handle.cancel();
        }
    }
}
