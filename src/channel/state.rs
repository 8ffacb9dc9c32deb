//! Lifecycle states shared by channels and factories.

use std::fmt;

/// Lifecycle state of a channel or factory.
///
/// ```text
/// Created ─► Opening ─► Opened ─► Closing ─► Closed
///               │          │         │
///               └──────────┴─────────┴─► Faulted
/// ```
///
/// Factories only use `Created`, `Opened` and `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommunicationState {
    Created,
    Opening,
    Opened,
    Closing,
    Closed,
    Faulted,
}

impl CommunicationState {
    /// `Closed` and `Faulted` are final.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Faulted)
    }

    /// States in which inbound messages can still be received.
    #[inline]
    pub fn can_receive(&self) -> bool {
        matches!(self, Self::Opened | Self::Closing)
    }
}

impl fmt::Display for CommunicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Opening => "Opening",
            Self::Opened => "Opened",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(CommunicationState::Closed.is_terminal());
        assert!(CommunicationState::Faulted.is_terminal());
        assert!(!CommunicationState::Closing.is_terminal());
        assert!(CommunicationState::Closing.can_receive());
        assert!(!CommunicationState::Created.can_receive());
        assert_eq!(CommunicationState::Opening.to_string(), "Opening");
    }
}
