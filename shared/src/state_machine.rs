//! Connection State Machine
//!
//! Defines the valid lifecycle transitions of one device connection.

use std::fmt;

/// Lifecycle state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// True while a transport is open or being opened
    pub fn is_active(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Caller asked to open a connection
    ConnectRequested,
    /// Transport opened
    ConnectSucceeded,
    /// Transport could not be opened
    ConnectFailed,
    /// Caller asked to close
    CloseRequested,
    /// Remote closed or the receive path failed
    LinkLost,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(ConnectionState),
    /// Event was accepted but the state was already where it leads
    Unchanged(ConnectionState),
    /// Transition was invalid from current state
    Invalid {
        from: ConnectionState,
        event: LinkEvent,
    },
}

impl TransitionResult {
    pub fn changed(&self) -> bool {
        matches!(self, TransitionResult::Success(_))
    }
}

/// State machine for one connection.
///
/// Every accepted connect request opens a new generation, so work started
/// for an older connection can tell that it has been superseded.
#[derive(Debug, Default)]
pub struct LinkStateMachine {
    current_state: ConnectionState,
    generation: u64,
}

impl LinkStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// Generation of the most recent connect request
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LinkEvent) -> TransitionResult {
        use ConnectionState::*;
        use LinkEvent::*;

        let next = match (self.current_state, event) {
            (Disconnected, ConnectRequested) => {
                self.generation += 1;
                Connecting
            }
            (Connecting, ConnectSucceeded) => Connected,
            (Connecting, ConnectFailed) => Disconnected,
            (Connecting | Connected, CloseRequested) => Disconnected,
            (Connected, LinkLost) => Disconnected,

            // Closing twice is a no-op
            (Disconnected, CloseRequested) => return TransitionResult::Unchanged(Disconnected),

            (from, event) => return TransitionResult::Invalid { from, event },
        };

        self.current_state = next;
        TransitionResult::Success(next)
    }
}
