//! Terminal-only streams
//!
//! A terminal-only stream carries no items: subscribing yields a start
//! signal with a no-op handle followed immediately by exactly one terminal
//! signal. Useful as an identity value in larger compositions, e.g. "run
//! this effect and represent it as a completion signal".

use std::sync::Arc;

use crate::error::StreamError;
use crate::protocol::{noop_subscription, Publisher, SharedSubscriber};

/// A value-less stream that completes or fails immediately on subscribe.
///
/// `Terminal` implements [`Publisher`] for every item type, since no item
/// is ever emitted. It is stateless and safely shared; the completing
/// variant is a single preallocated instance.
pub struct Terminal {
    outcome: Option<StreamError>,
}

lazy_static::lazy_static! {
    static ref TERMINAL_COMPLETE: Arc<Terminal> = Arc::new(Terminal { outcome: None });
}

impl Terminal {
    /// The preallocated immediately-completing instance.
    pub fn complete() -> Arc<Terminal> {
        TERMINAL_COMPLETE.clone()
    }

    /// An immediately-failing instance carrying `error` as its cause.
    pub fn error(error: StreamError) -> Arc<Terminal> {
        Arc::new(Terminal {
            outcome: Some(error),
        })
    }
}

impl<T> Publisher<T> for Terminal {
    fn subscribe(&self, subscriber: SharedSubscriber<T>) {
        match &self.outcome {
            None => complete_now(&subscriber),
            Some(error) => error_now(&subscriber, error.clone()),
        }
    }
}

/// Deliver start-then-complete to `subscriber` without building a stream.
pub fn complete_now<T>(subscriber: &SharedSubscriber<T>) {
    subscriber.on_subscribe(noop_subscription());
    subscriber.on_complete();
}

/// Deliver start-then-error to `subscriber` without building a stream.
pub fn error_now<T>(subscriber: &SharedSubscriber<T>, error: StreamError) {
    subscriber.on_subscribe(noop_subscription());
    subscriber.on_error(error);
}
