//! In-process memoization of expensive asynchronous loads.
//!
//! - [`single_flight`]: [`SingleFlightCache`], at most one factory call per
//!   key for the cache's lifetime.
//! - [`cancel`]: [`CancellationToken`], the per-caller cancellation handle.
//!
//! Keys are compared by `Eq`/`Hash`. There is no eviction, no expiry and no
//! cross-process sharing.

pub mod cancel;
pub mod single_flight;

pub use cancel::{CancellationToken, Cancelled};
pub use single_flight::{CacheError, LoadFuture, SingleFlightCache};
