//! Priority queue for fetch scheduling.
//!
//! Fetches are ordered by priority (higher values first), then by enqueue
//! order (FIFO within the same priority level). This ensures:
//!
//! 1. Visible tiles preempt prefetch work
//! 2. Fetches at the same priority are dispatched in request order
//!
//! Entries are never updated in place. Raising a request's priority removes
//! its entry and pushes a new one, so each pending request has exactly one
//! entry. The scheduler still skips entries whose request is no longer
//! pending when they are popped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use super::policy::Priority;
use super::request::RequestId;
use crate::coord::TileCoordinate;

// =============================================================================
// Queued Fetch
// =============================================================================

/// A fetch waiting for a free concurrency slot.
#[derive(Debug, Clone)]
pub struct QueuedFetch {
    /// Tile to fetch.
    pub coord: TileCoordinate,

    /// Request this entry was queued for.
    pub request: RequestId,

    /// Dispatch priority (higher = sooner).
    pub priority: Priority,

    /// Sequence number for FIFO ordering within priority level.
    sequence: u64,

    /// When the fetch was enqueued (for wait time logging).
    pub enqueued_at: Instant,
}

impl QueuedFetch {
    /// Returns how long this fetch has been waiting in the queue.
    pub fn wait_time(&self) -> std::time::Duration {
        self.enqueued_at.elapsed()
    }
}

// Ordering for BinaryHeap: higher priority first, then lower sequence (older) first
impl PartialEq for QueuedFetch {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedFetch {}

impl PartialOrd for QueuedFetch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedFetch {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: natural priority order, reversed sequence
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other_ordering => other_ordering,
        }
    }
}

// =============================================================================
// Priority Queue
// =============================================================================

/// Priority queue of fetches waiting for a concurrency slot.
///
/// Fetches are ordered by:
/// 1. Priority (descending)
/// 2. Enqueue order (ascending) - FIFO within same priority
///
/// The queue is not thread-safe; it is owned by the scheduler task.
pub struct PriorityQueue {
    heap: BinaryHeap<QueuedFetch>,
    next_sequence: u64,
}

impl PriorityQueue {
    /// Creates a new empty priority queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Adds a fetch to the queue.
    pub fn push(&mut self, coord: TileCoordinate, request: RequestId, priority: Priority) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedFetch {
            coord,
            request,
            priority,
            sequence,
            enqueued_at: Instant::now(),
        });
    }

    /// Removes and returns the highest-priority fetch.
    ///
    /// Returns `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<QueuedFetch> {
        self.heap.pop()
    }

    /// Returns the number of entries in the queue.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Removes all entries from the queue.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Removes all entries queued for a specific request.
    ///
    /// Returns the number of entries removed.
    pub fn remove_request(&mut self, request: RequestId) -> usize {
        let before = self.heap.len();
        self.heap.retain(|fetch| fetch.request != request);
        before - self.heap.len()
    }

    /// Returns the number of entries at each priority level.
    pub fn priority_counts(&self) -> HashMap<Priority, usize> {
        let mut counts = HashMap::new();
        for fetch in self.heap.iter() {
            *counts.entry(fetch.priority).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.heap.len())
            .field("priority_counts", &self.priority_counts())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
