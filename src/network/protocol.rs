// heartlink session protocol definition
// Frames exchanged over the WebRTC data channel once it is open

use serde::{Deserialize, Serialize};

use crate::game::{Outcome, Symbol};

/// Player metadata, sent once in each direction right after the channel opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub symbol: Symbol,
}

/// Game messages between peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameMessage {
    /// Handshake message sent on open
    PlayerInfo { name: String, symbol: Symbol },

    /// A mark placed by `player` at board index `position` (0-8)
    Move { position: usize, player: Symbol },

    /// The round ended; sent by whichever side detected it first
    GameOver { winner: Outcome },

    /// Clear the board and start a new round
    Restart,

    /// Any tag this build does not know; ignored on dispatch
    #[serde(other)]
    Unknown,
}

/// Voice stream negotiation, independent of the game messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSignal {
    /// Offer to stream local audio
    Offer { stream_id: String },

    /// Automatic acceptance of an offer; `stream_id` is set when the answerer sends audio back
    Answer {
        offer_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },
}

/// Everything that travels on the data channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "body", rename_all = "snake_case")]
pub enum Frame {
    Game(GameMessage),
    Media(MediaSignal),
}

impl Frame {
    /// Serialize frame to bytes for transmission
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize frame from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<GameMessage> for Frame {
    fn from(msg: GameMessage) -> Self {
        Frame::Game(msg)
    }
}

impl From<MediaSignal> for Frame {
    fn from(signal: MediaSignal) -> Self {
        Frame::Media(signal)
    }
}
