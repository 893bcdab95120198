// Network client interface for the UI
// Channels to and from the background session thread

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use tokio::sync::mpsc as async_mpsc;

use crate::game::Board;

use super::code::{EndpointId, GameCode};
use super::error::SessionError;
use super::negotiator::NegotiationState;
use super::protocol::{GameMessage, PlayerInfo};
use super::voice::RemoteAudioStream;

/// How this side enters a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    /// Create a game; the code arrives as `NetworkEvent::GameCode`
    Host { name: String },

    /// Join by game code through the broker
    Join { code: String, name: String },

    /// Join by pasting the host's offer text; no broker involved
    JoinManual { name: String, offer: String },
}

impl SessionMode {
    pub fn display_name(&self) -> &str {
        match self {
            SessionMode::Host { name }
            | SessionMode::Join { name, .. }
            | SessionMode::JoinManual { name, .. } => name,
        }
    }
}

/// Commands the UI sends to the network thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCommand {
    /// Place our mark at a board index
    SendMove(usize),

    SendRestart,

    SetMuted(bool),

    /// Operator pasted the peer's offer or answer text
    ApplyRemoteBlob(String),

    /// Leave or cancel; the thread cleans up and exits
    Leave,
}

/// Events the network thread sends to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// Code to read out to the other player (host only)
    GameCode(GameCode),

    EndpointRegistered(EndpointId),

    /// Broker not usable; the manual blobs are the way forward
    BrokerFallback(SessionError),

    /// Latest local descriptor text for copy/paste, refreshed as candidates arrive
    ManualBlob(String),

    StateChanged(NegotiationState),

    /// Opponent introduced itself; fires once per session
    PlayerConnected(PlayerInfo),

    /// A game message received from the opponent
    Message(GameMessage),

    /// Board after any local or remote change
    BoardChanged(Board),

    RemoteAudio(RemoteAudioStream),

    /// Microphone refused; play continues without voice
    VoiceUnavailable(SessionError),

    Error(SessionError),

    /// Opponent left after the channel was open
    Disconnected,
}

/// Handle for the UI to talk to the session thread
pub struct NetworkClient {
    /// Send commands TO the network thread
    tx: async_mpsc::UnboundedSender<NetworkCommand>,

    /// Receive events FROM the network thread
    rx: mpsc::Receiver<NetworkEvent>,

    /// Data channel open
    connected: Arc<AtomicBool>,
}

impl NetworkClient {
    pub fn new(
        tx: async_mpsc::UnboundedSender<NetworkCommand>,
        rx: mpsc::Receiver<NetworkEvent>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self { tx, rx, connected }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn send_move(&self, position: usize) -> Result<(), SessionError> {
        self.command(NetworkCommand::SendMove(position))
    }

    pub fn send_restart(&self) -> Result<(), SessionError> {
        self.command(NetworkCommand::SendRestart)
    }

    /// Local mute only; the opponent is not told
    pub fn set_muted(&self, muted: bool) -> Result<(), SessionError> {
        self.command(NetworkCommand::SetMuted(muted))
    }

    pub fn apply_remote_blob(&self, text: &str) -> Result<(), SessionError> {
        self.command(NetworkCommand::ApplyRemoteBlob(text.to_string()))
    }

    /// Leave the session; calling it again after the thread exited is harmless
    pub fn leave(&self) {
        let _ = self.tx.send(NetworkCommand::Leave);
    }

    /// Try to receive a network event (non-blocking)
    pub fn try_recv_event(&self) -> Option<NetworkEvent> {
        self.rx.try_recv().ok()
    }

    fn command(&self, cmd: NetworkCommand) -> Result<(), SessionError> {
        self.tx.send(cmd).map_err(|_| SessionError::Closed)
    }
}

impl Drop for NetworkClient {
    fn drop(&mut self) {
        self.leave();
    }
}
