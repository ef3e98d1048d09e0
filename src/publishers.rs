//! Publisher constructors
//!
//! Entry points for building protocol-conformant streams from plain values
//! and iterators. These are the sources the operator and validator tests
//! compose over, and the ones user pipelines start from.

use std::iter::Peekable;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::credit;
use crate::error::StreamError;
use crate::protocol::{Publisher, SharedPublisher, SharedSubscriber, Subscription};
use crate::terminal::{self, Terminal};

/// A stream that completes immediately without emitting.
pub fn empty<T: Send + 'static>() -> SharedPublisher<T> {
    Terminal::complete()
}

/// A stream that fails immediately with `cause`.
pub fn error<T: Send + 'static>(cause: StreamError) -> SharedPublisher<T> {
    Terminal::error(cause)
}

/// A stream of exactly one item.
pub fn just<T>(item: T) -> SharedPublisher<T>
where
    T: Clone + Send + Sync + 'static,
{
    from_iter(std::iter::once(item))
}

/// A credit-driven stream over a cloneable iterable.
///
/// Each subscription gets its own iteration. Items are emitted only within
/// outstanding credit; end-of-iteration is detected eagerly so completion,
/// being a terminal signal rather than an item, never waits for credit.
pub fn from_iter<I>(iterable: I) -> SharedPublisher<I::Item>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    Arc::new(IterPublisher { iterable })
}

struct IterPublisher<I> {
    iterable: I,
}

impl<I, T> Publisher<T> for IterPublisher<I>
where
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: SharedSubscriber<T>) {
        let mut iter = self.iterable.clone().into_iter().peekable();
        if iter.peek().is_none() {
            terminal::complete_now(&subscriber);
            return;
        }
        let subscription = Arc::new(IterSubscription {
            downstream: subscriber.clone(),
            iter: Mutex::new(iter),
            requested: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        });
        subscriber.on_subscribe(subscription);
    }
}

struct IterSubscription<T, I: Iterator<Item = T>> {
    downstream: SharedSubscriber<T>,
    iter: Mutex<Peekable<I>>,
    requested: AtomicU64,
    stopped: AtomicBool,
}

impl<T, I> IterSubscription<T, I>
where
    T: Send + 'static,
    I: Iterator<Item = T> + Send + 'static,
{
    /// Emission loop. Entered only by the `request` call that lifted the
    /// credit counter from zero; reentrant requests from `on_next` land in
    /// the counter and are drained by this same turn.
    fn emit(&self) {
        let mut iter = self
            .iter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut emitted = 0u64;
        let mut target = self.requested.load(Ordering::Acquire);
        loop {
            while emitted != target {
                if self.stopped.load(Ordering::Acquire) {
                    return;
                }
                match iter.next() {
                    Some(item) => self.downstream.on_next(item),
                    None => {
                        self.stopped.store(true, Ordering::Release);
                        self.downstream.on_complete();
                        return;
                    }
                }
                if iter.peek().is_none() {
                    self.stopped.store(true, Ordering::Release);
                    self.downstream.on_complete();
                    return;
                }
                emitted += 1;
            }
            target = self.requested.load(Ordering::Acquire);
            if emitted == target {
                target = credit::produced(&self.requested, emitted);
                if target == 0 {
                    return;
                }
                emitted = 0;
            }
        }
    }
}

impl<T, I> Subscription for IterSubscription<T, I>
where
    T: Send + 'static,
    I: Iterator<Item = T> + Send + 'static,
{
    fn request(&self, n: u64) {
        if !credit::validate(n) {
            return;
        }
        if credit::add(&self.requested, n) == 0 {
            self.emit();
        }
    }

    fn cancel(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}
