pub mod common;
mod network;
pub mod screen;

pub use network::run_session;
