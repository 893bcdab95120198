// Rendezvous wire protocol, shared by the broker client and the signaling server
// JSON text frames over WebSocket, tagged by "type"

use serde::{Deserialize, Serialize};

use super::code::{EndpointId, GameCode};
use super::descriptor::{IceCandidate, SessionDescriptor};

/// Payload relayed between two endpoints; the server never looks inside
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal_type", rename_all = "snake_case")]
pub enum Signal {
    Description(SessionDescriptor),
    Candidate(IceCandidate),
    /// Host turned the connection down (game already has a guest)
    Reject { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    PeerNotFound,
    AlreadyRegistered,
    CodeTaken,
    NotRegistered,
    InvalidMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    Register {
        endpoint_id: EndpointId,
        game_code: GameCode,
        is_host: bool,
    },
    RegisterOk {
        endpoint_id: EndpointId,
    },
    Unregister,
    Lookup {
        game_code: GameCode,
    },
    LookupResult {
        game_code: GameCode,
        host: Option<EndpointId>,
    },
    Connect {
        target: EndpointId,
        from: EndpointId,
        name: String,
    },
    ConnectOk {
        target: EndpointId,
    },
    ConnectRequest {
        from: EndpointId,
        name: String,
    },
    Signal {
        target: EndpointId,
        from: EndpointId,
        signal: Signal,
    },
    PeerLeft {
        endpoint_id: EndpointId,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl SignalingMessage {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        SignalingMessage::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_wire_shape() {
        let msg = SignalingMessage::Register {
            endpoint_id: EndpointId::from_raw("AB12CD-Romeo-1"),
            game_code: GameCode::parse("AB12CD").unwrap(),
            is_host: true,
        };
        let json: serde_json::Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["endpoint_id"], "AB12CD-Romeo-1");
        assert_eq!(json["game_code"], "AB12CD");
        assert_eq!(json["is_host"], true);
    }

    #[test]
    fn test_relayed_description_keeps_its_own_kind_field() {
        let msg = SignalingMessage::Signal {
            target: EndpointId::from_raw("AB12CD-Juliet-2"),
            from: EndpointId::from_raw("AB12CD-Romeo-1"),
            signal: Signal::Description(SessionDescriptor::offer("v=0\r\n")),
        };
        let text = msg.to_text().unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["signal"]["signal_type"], "description");
        assert_eq!(json["signal"]["kind"], "offer");
        assert_eq!(SignalingMessage::from_text(&text).unwrap(), msg);
    }

    #[test]
    fn test_invalid_game_code_rejected_on_decode() {
        let text = r#"{"type":"lookup","game_code":"nope"}"#;
        assert!(SignalingMessage::from_text(text).is_err());
    }
}
