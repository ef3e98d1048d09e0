//! pullstream - a pull-based, backpressured stream protocol core
//!
//! Producers emit items to consumers only as fast as the consumers request
//! them, with explicit lifecycle signals for start, items, error,
//! completion, and cancellation. The protocol is thread-agnostic and
//! reentrancy-safe: it behaves the same whether a pipeline resolves fully
//! synchronously on one call stack or is driven from independent threads.

pub mod bridge;
pub mod credit;
pub mod error;
pub mod protocol;
pub mod publishers;
pub mod switch_if_empty;
pub mod terminal;
pub mod validator;

// Re-export the protocol surface at the crate root
pub use error::{StreamError, StreamResult};
pub use protocol::{
    noop_subscription, NoopSubscription, Publisher, SharedPublisher, SharedSubscriber,
    SharedSubscription, Subscriber, Subscription, UpstreamCell,
};

// Re-export the core components
pub use bridge::{from_stream, into_stream, ItemStream, StreamBridgeConfig};
pub use publishers::{empty, error as failed, from_iter, just};
pub use switch_if_empty::{switch_if_empty, IntoAlternative, SwitchIfEmpty};
pub use terminal::Terminal;
pub use validator::{wrap, ValidatedPublisher, Violation, ViolationSink};
