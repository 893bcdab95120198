// heartlink: a two-player tic-tac-toe love note over a direct peer connection
// The binary drives the TUI; the signaling server reuses the rendezvous core

pub mod config;
pub mod debug;
pub mod game;
pub mod game_modes;
pub mod menu;
pub mod network;
pub mod ui;
