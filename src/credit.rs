//! Credit accounting for backpressured emission
//!
//! Credit is a monotonically-accumulated non-negative counter of how many
//! items a consumer is willing to receive. It is additive across `request`
//! calls and decremented implicitly as items are delivered. `u64::MAX` is
//! the unbounded sentinel: once a counter reaches it, it stays there.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel for "effectively unbounded" credit.
pub const UNBOUNDED: u64 = u64::MAX;

/// Accumulate `n` more credit into `requested`, saturating at
/// [`UNBOUNDED`]. Returns the previous value.
pub fn add(requested: &AtomicU64, n: u64) -> u64 {
    let mut current = requested.load(Ordering::Acquire);
    loop {
        if current == UNBOUNDED {
            return UNBOUNDED;
        }
        let next = current.saturating_add(n);
        match requested.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(previous) => return previous,
            Err(actual) => current = actual,
        }
    }
}

/// Subtract `n` delivered items from `requested`, skipped entirely when the
/// counter is at [`UNBOUNDED`]. Returns the remaining credit.
pub fn produced(requested: &AtomicU64, n: u64) -> u64 {
    let mut current = requested.load(Ordering::Acquire);
    loop {
        if current == UNBOUNDED {
            return UNBOUNDED;
        }
        let next = current.saturating_sub(n);
        match requested.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return next,
            Err(actual) => current = actual,
        }
    }
}

/// Check a request amount before accumulating it.
///
/// Credit is unsigned, so the only invalid amount is zero. A zero request
/// is a breach by the caller: it is logged and ignored rather than
/// terminating the stream.
pub fn validate(n: u64) -> bool {
    if n == 0 {
        log::warn!("request(0) violates the stream protocol; ignoring");
        return false;
    }
    true
}
