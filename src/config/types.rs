// heartlink configuration types
// Every section has defaults so a partial file still loads

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::network::NegotiationTimeouts;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub keybindings: KeyBindings,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayerConfig {
    // Name pre-filled in the host/join dialogs
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyBindings {
    // Board controls
    pub restart: String,
    pub mute: String,
    pub quit: String,

    // Manual exchange
    pub copy: String,
    pub paste: String,

    // Menu controls
    pub menu_up: String,
    pub menu_down: String,
    pub menu_select: String,
    pub menu_back: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            restart: "R".to_string(),
            mute: "M".to_string(),
            quit: "Q".to_string(),
            copy: "C".to_string(),
            paste: "V".to_string(),
            menu_up: "Up".to_string(),
            menu_down: "Down".to_string(),
            menu_select: "Enter".to_string(),
            menu_back: "Esc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    // UI refresh rate while waiting for input
    pub target_fps: u64,

    // Mark colors (RGB values 0-255)
    pub x_color: [u8; 3],
    pub o_color: [u8; 3],

    // Cursor and heart accents
    pub accent_color: [u8; 3],
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            x_color: [255, 105, 180], // Pink
            o_color: [220, 20, 60],   // Crimson
            accent_color: [255, 182, 193],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    // Rendezvous server WebSocket URL
    pub signaling_server: String,

    // STUN server for the public candidate; empty disables the query
    pub stun_server: String,

    // How long to wait for the rendezvous server before falling back to manual
    pub broker_connect_timeout_secs: u64,

    // Negotiation bound while descriptors go through the broker
    pub broker_timeout_secs: u64,

    // Negotiation bound for copy/paste exchange
    pub manual_timeout_secs: u64,

    // Open the default microphone once connected; off means receive-only voice
    pub voice_enabled: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            signaling_server: "ws://127.0.0.1:8080/ws".to_string(),
            stun_server: "stun.l.google.com:19302".to_string(),
            broker_connect_timeout_secs: 10,
            broker_timeout_secs: 60,
            manual_timeout_secs: 300, // 5 minutes to copy, send and paste by hand
            voice_enabled: true,
        }
    }
}

impl NetworkConfig {
    pub fn timeouts(&self) -> NegotiationTimeouts {
        NegotiationTimeouts {
            broker: Duration::from_secs(self.broker_timeout_secs),
            manual: Duration::from_secs(self.manual_timeout_secs),
        }
    }

    pub fn broker_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.broker_connect_timeout_secs)
    }
}
