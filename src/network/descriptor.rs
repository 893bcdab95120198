// Session descriptors and the manual copy/paste exchange format
// The text blob is the verbatim JSON of SessionDescriptor

use serde::{Deserialize, Serialize};

use super::error::SessionError;

/// One discovered network path, in SDP attribute syntax
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Offer,
    Answer,
}

/// Connection-negotiation payload plus the candidates known when it was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub kind: DescriptorKind,
    pub sdp: String,
    #[serde(default)]
    pub candidates: Vec<IceCandidate>,
}

impl SessionDescriptor {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptorKind::Offer,
            sdp: sdp.into(),
            candidates: Vec::new(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptorKind::Answer,
            sdp: sdp.into(),
            candidates: Vec::new(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<IceCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Serialize to the copyable text blob
    pub fn to_manual_text(&self) -> String {
        // Plain structs of strings; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a pasted blob, rejecting anything that cannot be negotiated
    pub fn from_manual_text(text: &str) -> Result<Self, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::InvalidDescriptor("nothing was pasted".into()));
        }

        let descriptor: SessionDescriptor = serde_json::from_str(text)
            .map_err(|e| SessionError::InvalidDescriptor(format!("not a connection blob: {}", e)))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Structural checks shared by pasted and relayed descriptors
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.sdp.trim().is_empty() {
            return Err(SessionError::InvalidDescriptor("session description is empty".into()));
        }
        if !self.sdp.trim_start().starts_with("v=") {
            return Err(SessionError::InvalidDescriptor(
                "session description does not start with a version line".into(),
            ));
        }
        if let Some(bad) = self.candidates.iter().find(|c| c.candidate.trim().is_empty()) {
            return Err(SessionError::InvalidDescriptor(format!(
                "empty candidate entry ({:?})",
                bad
            )));
        }
        Ok(())
    }
}
