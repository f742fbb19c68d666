//! Request scheduling for tile fetches.
//!
//! The scheduler sits between a tile source's `load_tile` and the network.
//! It provides:
//!
//! - **De-duplication**: one fetch per coordinate, shared by every caller
//! - **Bounded concurrency**: at most `max_concurrent` fetches at a time
//! - **Priority ordering**: higher priority first, FIFO within a level
//! - **Retry**: transient failures retried with exponential backoff and jitter
//!
//! All scheduling state lives in a single [`SchedulerDaemon`] task; callers
//! reach it through a cloneable [`SchedulerHandle`].

mod daemon;
mod fetch;
mod policy;
mod queue;
mod request;

pub use daemon::{
    SchedulerConfig, SchedulerDaemon, SchedulerHandle, SchedulerStats, DEFAULT_MAX_CONCURRENT,
};
pub use fetch::{fetch_with_retry, FetchReport, TileFetcher};
pub use policy::{
    Priority, RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_JITTER,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_SECS, PRIORITY_PREFETCH, PRIORITY_VISIBLE,
};
pub use request::{ListenerId, RequestId, RequestState, TrackedRequest};
