//! Lifecycle states shared by producers and consumers.

use serde::{Deserialize, Serialize};

/// Status of one side of a stream edge.
///
/// Transitions only move forward: `Created` first, then any mix of `Ready`
/// and `Suspended`, then `EndOfStream`, and finally one of the closed states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamStatus {
    Created,
    Ready,
    Suspended,
    EndOfStream,
    Closed,
    ClosedWithError,
}

impl StreamStatus {
    fn rank(self) -> u8 {
        match self {
            StreamStatus::Created => 0,
            StreamStatus::Ready | StreamStatus::Suspended => 1,
            StreamStatus::EndOfStream => 2,
            StreamStatus::Closed | StreamStatus::ClosedWithError => 3,
        }
    }

    /// Data may still flow across the edge.
    pub fn is_open(self) -> bool {
        self.rank() <= 1
    }

    pub fn is_closed(self) -> bool {
        self.rank() == 3
    }

    /// No data will ever flow again.
    pub fn is_terminal(self) -> bool {
        self.rank() >= 2
    }

    /// Whether `self -> next` respects the forward-only ordering.
    pub fn can_transition_to(self, next: StreamStatus) -> bool {
        if self.is_closed() {
            return false;
        }
        match (self, next) {
            (StreamStatus::Ready, StreamStatus::Suspended)
            | (StreamStatus::Suspended, StreamStatus::Ready) => true,
            _ => next.rank() > self.rank(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StreamStatus::*;

    #[test]
    fn closed_states_are_final() {
        assert!(!Closed.can_transition_to(ClosedWithError));
        assert!(!ClosedWithError.can_transition_to(Ready));
        assert!(EndOfStream.can_transition_to(ClosedWithError));
    }

    #[test]
    fn ready_and_suspended_alternate() {
        assert!(Ready.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Ready));
        assert!(!EndOfStream.can_transition_to(Ready));
        assert!(Created.can_transition_to(Suspended));
    }
}
