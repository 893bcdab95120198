// In-memory transport and helpers for exercising the sans-I/O core in tests

use super::descriptor::IceCandidate;
use super::error::SessionError;
use super::negotiator::PeerTransport;

/// Transport double: accepts only SDP it could have produced itself
#[derive(Debug, Default)]
pub struct FakeTransport {
    pub name: String,
    pub offers_created: usize,
    pub remote_sdp: Option<String>,
    pub remote_candidates: Vec<IceCandidate>,
    pub sent: Vec<Vec<u8>>,
    pub close_calls: usize,
}

impl FakeTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Remote description in place and at least one remote path known
    pub fn has_path(&self) -> bool {
        self.remote_sdp.is_some() && !self.remote_candidates.is_empty()
    }

    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }
}

impl PeerTransport for FakeTransport {
    fn create_offer(&mut self) -> Result<String, SessionError> {
        self.offers_created += 1;
        Ok(format!("v=0\r\no=fake-offer {} {}\r\n", self.name, self.offers_created))
    }

    fn accept_offer(&mut self, sdp: &str) -> Result<String, SessionError> {
        if !sdp.contains("fake-offer") {
            return Err(SessionError::Transport("unparseable offer".into()));
        }
        self.remote_sdp = Some(sdp.to_string());
        Ok(format!("v=0\r\no=fake-answer {}\r\n", self.name))
    }

    fn accept_answer(&mut self, sdp: &str) -> Result<(), SessionError> {
        if !sdp.contains("fake-answer") {
            return Err(SessionError::Transport("unparseable answer".into()));
        }
        self.remote_sdp = Some(sdp.to_string());
        Ok(())
    }

    fn add_remote_candidate(&mut self, candidate: &IceCandidate) -> Result<(), SessionError> {
        if !candidate.candidate.starts_with("candidate:") {
            return Err(SessionError::Transport("bad candidate".into()));
        }
        self.remote_candidates.push(candidate.clone());
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        self.sent.push(payload.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.close_calls += 1;
    }
}
