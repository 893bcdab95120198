// Game codes and endpoint identities
// A game code is what players read to each other; endpoint ids are what the broker routes on

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::SessionError;

pub const GAME_CODE_LEN: usize = 6;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Short, human-shareable token correlating a host and a guest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameCode(String);

impl GameCode {
    /// Generate a fresh random code (no collision detection)
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..GAME_CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parse user input, tolerating surrounding whitespace and lowercase
    pub fn parse(input: &str) -> Result<Self, SessionError> {
        let code = input.trim().to_ascii_uppercase();
        if code.len() != GAME_CODE_LEN || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(SessionError::PeerUnreachable(format!(
                "'{}' is not a {}-character game code",
                input.trim(),
                GAME_CODE_LEN
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GameCode {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GameCode::parse(&value)
    }
}

impl From<GameCode> for String {
    fn from(code: GameCode) -> Self {
        code.0
    }
}

/// Broker-routable identifier: `{CODE}-{name}-{unix millis}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn derive(code: &GameCode, display_name: &str) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self::derive_at(code, display_name, millis)
    }

    pub fn derive_at(code: &GameCode, display_name: &str, millis: u128) -> Self {
        let name: String = display_name
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(24)
            .collect();
        let name = if name.is_empty() { "player".to_string() } else { name };
        Self(format!("{}-{}-{}", code, name, millis))
    }

    /// Wrap an identifier received from the broker or typed by the user
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The game code this endpoint was registered under, if it follows the scheme
    pub fn game_code(&self) -> Option<GameCode> {
        let prefix = self.0.split('-').next()?;
        GameCode::parse(prefix).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_shape() {
        for _ in 0..50 {
            let code = GameCode::generate();
            assert_eq!(code.as_str().len(), GAME_CODE_LEN);
            assert!(code
                .as_str()
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_parse_normalizes_input() {
        let code = GameCode::parse("  ab12cd ").unwrap();
        assert_eq!(code.as_str(), "AB12CD");
    }

    #[test]
    fn test_parse_rejects_bad_codes() {
        assert!(GameCode::parse("AB12C").is_err());
        assert!(GameCode::parse("AB12CDE").is_err());
        assert!(GameCode::parse("AB-2CD").is_err());
        assert!(GameCode::parse("").is_err());
    }

    #[test]
    fn test_endpoint_id_scheme() {
        let code = GameCode::parse("AB12CD").unwrap();
        let id = EndpointId::derive_at(&code, "Romeo & Juliet", 1707900000000);
        assert_eq!(id.as_str(), "AB12CD-Romeo___Juliet-1707900000000");
        assert_eq!(id.game_code(), Some(code));
    }

    #[test]
    fn test_endpoint_id_empty_name() {
        let code = GameCode::parse("AB12CD").unwrap();
        let id = EndpointId::derive_at(&code, "   ", 1);
        assert_eq!(id.as_str(), "AB12CD-player-1");
    }
}
