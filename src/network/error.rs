// Error taxonomy for session establishment and play
// Every variant maps to an actionable next step shown to the player

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Rendezvous service could not be reached (blocked network, outage)
    #[error("rendezvous broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Remote endpoint identifier is unknown, stale, or refused the connection
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Pasted or relayed exchange payload could not be used
    #[error("invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    /// No open transport within the configured bound
    #[error("negotiation timed out after {secs}s")]
    NegotiationTimeout { secs: u64 },

    /// Microphone access refused; the game continues without voice
    #[error("microphone unavailable: {0}")]
    MediaPermissionDenied(String),

    /// Peer disconnected or the transport failed after opening
    #[error("opponent left: {0}")]
    TransportClosed(String),

    /// The WebRTC primitive failed for a reason outside the categories above
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation attempted on a session that already closed or failed
    #[error("session is no longer active")]
    Closed,
}

impl SessionError {
    /// Short instruction for the player on how to continue
    pub fn next_step(&self) -> &'static str {
        match self {
            SessionError::BrokerUnavailable(_) => "Continue with manual copy/paste exchange",
            SessionError::PeerUnreachable(_) => "Check the game code and try again",
            SessionError::InvalidDescriptor(_) => "Copy the complete text again and re-paste it",
            SessionError::NegotiationTimeout { .. } => "Start a new game and share the new code",
            SessionError::MediaPermissionDenied(_) => "Playing on without voice",
            SessionError::TransportClosed(_) => "Return to the menu",
            SessionError::Transport(_) => "Start a new game",
            SessionError::Closed => "Return to the menu",
        }
    }

    /// Whether the current attempt can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::BrokerUnavailable(_)
                | SessionError::InvalidDescriptor(_)
                | SessionError::MediaPermissionDenied(_)
        )
    }
}
