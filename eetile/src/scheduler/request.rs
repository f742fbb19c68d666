//! Request identity and lifecycle state.

use std::fmt;

use crate::coord::TileCoordinate;

use super::policy::Priority;

/// Identifier of one logical fetch.
///
/// A coordinate that is evicted and requested again gets a new id, so late
/// completions from the old request can be told apart from the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Identifier of one caller attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Lifecycle state of a tracked request.
///
/// ```text
/// Pending ──► InFlight ──► Succeeded
///    │            │   └──► Failed
///    └────────────┴──────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Waiting in the queue for a concurrency slot
    Pending,
    /// Network operation (or backoff between attempts) in progress
    InFlight,
    /// Completed with image data
    Succeeded,
    /// Completed with an error
    Failed,
    /// Last listener detached or source disposed
    Cancelled,
}

impl RequestState {
    /// Returns true for states a request never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns true while a caller may still join this request.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Pending | Self::InFlight)
    }

    fn can_advance_to(&self, next: RequestState) -> bool {
        match (self, next) {
            (Self::Pending, Self::InFlight | Self::Cancelled) => true,
            (Self::InFlight, Self::Succeeded | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::InFlight => "in-flight",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One logical fetch for a coordinate.
#[derive(Debug, Clone)]
pub struct TrackedRequest {
    id: RequestId,
    coord: TileCoordinate,
    priority: Priority,
    state: RequestState,
}

impl TrackedRequest {
    /// Creates a request in the `Pending` state.
    pub fn new(id: RequestId, coord: TileCoordinate, priority: Priority) -> Self {
        Self {
            id,
            coord,
            priority,
            state: RequestState::Pending,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn coord(&self) -> TileCoordinate {
        self.coord
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Raises the priority if `priority` is higher.
    ///
    /// Returns true if the priority changed.
    pub fn raise_priority(&mut self, priority: Priority) -> bool {
        if priority > self.priority {
            self.priority = priority;
            true
        } else {
            false
        }
    }

    /// Moves the request to `next`.
    ///
    /// Returns false, leaving the state untouched, if the transition is not
    /// allowed. Terminal states accept no further transitions.
    pub fn advance(&mut self, next: RequestState) -> bool {
        if self.state.can_advance_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TrackedRequest {
        TrackedRequest::new(RequestId(1), TileCoordinate::new(5, 10, 12), Priority::PREFETCH)
    }

    #[test]
    fn test_new_request_is_pending() {
        let request = request();
        assert_eq!(request.state(), RequestState::Pending);
        assert!(request.state().is_joinable());
        assert!(!request.state().is_terminal());
    }

    #[test]
    fn test_happy_path() {
        let mut request = request();
        assert!(request.advance(RequestState::InFlight));
        assert!(request.advance(RequestState::Succeeded));
        assert!(request.state().is_terminal());
    }

    #[test]
    fn test_pending_cannot_complete_without_dispatch() {
        let mut request = request();
        assert!(!request.advance(RequestState::Succeeded));
        assert!(!request.advance(RequestState::Failed));
        assert_eq!(request.state(), RequestState::Pending);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            RequestState::Succeeded,
            RequestState::Failed,
            RequestState::Cancelled,
        ] {
            let mut request = request();
            request.advance(RequestState::InFlight);
            assert!(request.advance(terminal));

            for next in [
                RequestState::Pending,
                RequestState::InFlight,
                RequestState::Succeeded,
                RequestState::Failed,
                RequestState::Cancelled,
            ] {
                assert!(!request.advance(next), "{} -> {} allowed", terminal, next);
            }
            assert_eq!(request.state(), terminal);
        }
    }

    #[test]
    fn test_cancel_while_pending() {
        let mut request = request();
        assert!(request.advance(RequestState::Cancelled));
        assert!(!request.state().is_joinable());
    }

    #[test]
    fn test_raise_priority_only_increases() {
        let mut request = request();
        assert!(request.raise_priority(Priority::VISIBLE));
        assert!(!request.raise_priority(Priority::PREFETCH));
        assert_eq!(request.priority(), Priority::VISIBLE);
    }

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId(42).to_string(), "req-42");
    }
}
