//! Policy types for tile fetch scheduling.
//!
//! This module defines the policy types that control how fetches handle
//! transient failures and in which order queued fetches are dispatched.
//!
//! # Policy Types
//!
//! - [`RetryPolicy`]: How a fetch handles transient failures
//! - [`Priority`]: Dispatch priority (higher = served sooner)
//!
//! # Example
//!
//! ```
//! use eetile::scheduler::{Priority, RetryPolicy};
//!
//! // Fetch with exponential backoff retries
//! let retry_policy = RetryPolicy::exponential(3);
//! assert_eq!(retry_policy.max_attempts(), 3);
//!
//! // Visible tiles are served before prefetch work
//! assert!(Priority::VISIBLE > Priority::PREFETCH);
//! ```

use std::time::Duration;

use rand::Rng;

// =============================================================================
// Retry Policy Constants
// =============================================================================

/// Default number of attempts per fetch, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default initial delay for exponential backoff (200ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 200;

/// Default maximum delay for exponential backoff (10 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 10;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default jitter fraction added on top of each backoff delay.
pub const DEFAULT_JITTER: f64 = 0.25;

// =============================================================================
// Priority Constants
// =============================================================================

/// Priority value for tiles inside the current view.
pub const PRIORITY_VISIBLE: i32 = 100;

/// Priority value for tiles fetched ahead of need (adjacent zooms).
pub const PRIORITY_PREFETCH: i32 = 0;

/// How a fetch handles transient failures.
///
/// This policy controls automatic retry behavior for fetches that fail due to
/// transient issues (network timeouts, temporary service unavailability, etc.).
#[derive(Clone, Debug, PartialEq, Default)]
pub enum RetryPolicy {
    /// No retries - fail immediately on error.
    #[default]
    None,

    /// Exponential backoff with jitter.
    ///
    /// The base delay is multiplied after each failed attempt, up to a maximum
    /// delay. A random extra of up to `jitter × base` is added so that tiles
    /// failing together do not retry in lockstep. Successive delays strictly
    /// increase when [`RetryPolicy::delays_strictly_increase`] holds.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Initial delay after the first failure.
        initial_delay: Duration,
        /// Maximum delay cap (delay won't exceed this).
        max_delay: Duration,
        /// Multiplier applied to delay after each failure (typically 2.0).
        multiplier: f64,
        /// Fraction of the base delay used as the jitter range (0.0 - 1.0).
        jitter: f64,
    },
}

impl RetryPolicy {
    /// Creates an exponential backoff policy with sensible defaults.
    ///
    /// Uses:
    /// - Initial delay: 200ms ([`DEFAULT_INITIAL_DELAY_MS`])
    /// - Max delay: 10 seconds ([`DEFAULT_MAX_DELAY_SECS`])
    /// - Multiplier: 2.0 ([`DEFAULT_BACKOFF_MULTIPLIER`])
    /// - Jitter: 0.25 ([`DEFAULT_JITTER`])
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum number of attempts (including initial)
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_JITTER,
        }
    }

    /// Calculates the base delay (without jitter) for a given attempt number.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt that just failed (1-based)
    ///
    /// # Returns
    ///
    /// The delay to wait before the next attempt, or `None` if no more
    /// attempts are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                // initial_delay * multiplier^(attempt-1), capped
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = initial_delay.as_millis() as f64 * factor;
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }

    /// Calculates the delay for a given attempt with jitter applied.
    ///
    /// Jitter only ever adds time, and the result never exceeds the policy's
    /// maximum delay.
    pub fn jittered_delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Option<Duration> {
        let base = self.delay_for_attempt(attempt)?;
        match self {
            Self::ExponentialBackoff {
                max_delay, jitter, ..
            } if *jitter > 0.0 && !base.is_zero() => {
                let extra = base.as_secs_f64() * rng.random_range(0.0..*jitter);
                Some((base + Duration::from_secs_f64(extra)).min(*max_delay))
            }
            _ => Some(base),
        }
    }

    /// Returns true if every delay is strictly longer than the one before it,
    /// whatever jitter is drawn.
    ///
    /// This fails when `multiplier <= 1 + jitter`, and also when the
    /// maximum delay cap would flatten the later delays of a long retry
    /// chain. A policy without retries trivially passes.
    pub fn delays_strictly_increase(&self) -> bool {
        let Self::ExponentialBackoff {
            max_attempts,
            max_delay,
            multiplier,
            jitter,
            ..
        } = self
        else {
            return true;
        };
        if *multiplier <= 1.0 + *jitter {
            return false;
        }

        // Longest delay the previous attempt could have produced
        let mut longest: Option<f64> = None;
        for attempt in 1..*max_attempts {
            let Some(base) = self.delay_for_attempt(attempt) else {
                break;
            };
            let base = base.as_secs_f64();
            if longest.is_some_and(|previous| base <= previous) {
                return false;
            }
            longest = Some(base * (1.0 + *jitter));
        }

        longest.map_or(true, |last| last <= max_delay.as_secs_f64())
    }

    /// Returns the maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}

/// Fetch scheduling priority.
///
/// Fetches are queued by priority (higher values dispatch first), then by FIFO
/// order within the same priority level. This ensures that visible tiles
/// resolve before prefetch work under a bounded concurrency cap.
///
/// # Priority Levels
///
/// - [`Priority::VISIBLE`] (100): tiles at the view zoom near the center
/// - [`Priority::PREFETCH`] (0): tiles at adjacent zoom levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Tiles the user is looking at.
    pub const VISIBLE: Priority = Priority(PRIORITY_VISIBLE);

    /// Tiles fetched ahead of need.
    ///
    /// This is the default priority.
    pub const PREFETCH: Priority = Priority(PRIORITY_PREFETCH);

    /// Creates a new priority with the given value.
    ///
    /// Higher values mean higher priority.
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the numeric priority value.
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::PREFETCH
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::VISIBLE => write!(f, "Visible(100)"),
            Self::PREFETCH => write!(f, "Prefetch(0)"),
            Self(v) => write!(f, "Priority({})", v),
        }
    }
}
