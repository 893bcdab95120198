// Peer-to-peer session layer for heartlink
// Broker rendezvous, offer/answer negotiation over str0m, and the game/voice protocol

pub mod broker;
pub mod client;
pub mod code;
pub mod descriptor;
pub mod error;
pub mod microphone;
pub mod negotiator;
pub mod protocol;
pub mod rendezvous;
pub mod rtc;
pub mod runtime;
pub mod session;
pub mod signaling;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{NetworkClient, NetworkCommand, NetworkEvent, SessionMode};
pub use code::{EndpointId, GameCode};
pub use descriptor::{IceCandidate, SessionDescriptor};
pub use error::SessionError;
pub use negotiator::{NegotiationState, NegotiationTimeouts, Role};
pub use protocol::{GameMessage, PlayerInfo};

use std::io;
use std::sync::mpsc;
use std::sync::{atomic::AtomicBool, Arc};

use crate::config::NetworkConfig;

/// Start a session on a background thread
/// Returns the handle the UI uses to send commands and drain events
pub fn start_network(mode: SessionMode, config: &NetworkConfig) -> io::Result<NetworkClient> {
    let (event_tx, event_rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();

    let connected = Arc::new(AtomicBool::new(false));

    runtime::spawn_network_thread(mode, config.clone(), event_tx, cmd_rx, connected.clone())?;

    Ok(NetworkClient::new(cmd_tx, event_rx, connected))
}
