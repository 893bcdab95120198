// Voice stream negotiation and local mute
// Offers go out on open, incoming offers are answered automatically,
// and muting only flips the local tracks.

use std::collections::HashSet;

use tracing::{debug, info};

use super::error::SessionError;
use super::protocol::MediaSignal;

/// One outgoing audio track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub id: String,
    pub enabled: bool,
    pub stopped: bool,
}

/// Captured local audio handed out by a microphone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAudio {
    pub stream_id: String,
    pub tracks: Vec<AudioTrack>,
}

impl LocalAudio {
    pub fn single_track(stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        Self {
            tracks: vec![AudioTrack {
                id: format!("{}-audio", stream_id),
                enabled: true,
                stopped: false,
            }],
            stream_id,
        }
    }
}

/// Audio arriving from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAudioStream {
    pub stream_id: String,
}

/// Source of local audio; refusing access must not abort the session
pub trait Microphone: Send {
    fn acquire(&mut self) -> Result<LocalAudio, SessionError>;

    /// Gate capture while keeping the device open
    fn set_enabled(&mut self, _enabled: bool) {}

    /// Close the device; called at most once per session
    fn release(&mut self) {}
}

/// Stand-in when voice is switched off or no input device exists
#[derive(Debug, Default)]
pub struct NoMicrophone;

impl Microphone for NoMicrophone {
    fn acquire(&mut self) -> Result<LocalAudio, SessionError> {
        Err(SessionError::MediaPermissionDenied(
            "no audio capture device available".into(),
        ))
    }
}

/// What a media signal produced
#[derive(Debug, Default, PartialEq, Eq)]
pub struct VoiceUpdate {
    pub reply: Option<MediaSignal>,
    pub remote: Option<RemoteAudioStream>,
}

#[derive(Debug, Default)]
pub struct VoiceLink {
    local: Option<LocalAudio>,
    muted: bool,
    offered: bool,
    released: bool,
    remote_streams: HashSet<String>,
}

impl VoiceLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the microphone and produce the offer to send on open
    pub fn start(&mut self, mic: &mut dyn Microphone) -> Result<MediaSignal, SessionError> {
        if self.released {
            return Err(SessionError::Closed);
        }
        if self.local.is_none() {
            let audio = mic.acquire()?;
            info!("Microphone acquired: stream {}", audio.stream_id);
            self.local = Some(audio);
            self.apply_mute();
        }
        self.offered = true;
        let stream_id = self
            .local
            .as_ref()
            .map(|a| a.stream_id.clone())
            .unwrap_or_default();
        Ok(MediaSignal::Offer { stream_id })
    }

    /// React to a media signal from the peer; offers are always accepted
    pub fn handle_signal(&mut self, signal: MediaSignal) -> VoiceUpdate {
        if self.released {
            return VoiceUpdate::default();
        }
        match signal {
            MediaSignal::Offer { stream_id } => {
                debug!("Auto-answering voice offer {}", stream_id);
                let reply = MediaSignal::Answer {
                    offer_id: stream_id.clone(),
                    stream_id: self.local.as_ref().map(|a| a.stream_id.clone()),
                };
                VoiceUpdate {
                    reply: Some(reply),
                    remote: self.track_remote(stream_id),
                }
            }
            MediaSignal::Answer { offer_id, stream_id } => {
                debug!("Voice offer {} answered", offer_id);
                VoiceUpdate {
                    reply: None,
                    remote: stream_id.and_then(|id| self.track_remote(id)),
                }
            }
        }
    }

    fn track_remote(&mut self, stream_id: String) -> Option<RemoteAudioStream> {
        if stream_id.is_empty() || !self.remote_streams.insert(stream_id.clone()) {
            return None;
        }
        Some(RemoteAudioStream { stream_id })
    }

    /// Local-only mute; nothing is signalled to the peer
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.apply_mute();
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn has_local_audio(&self) -> bool {
        self.local.is_some()
    }

    pub fn has_offered(&self) -> bool {
        self.offered
    }

    pub fn local_audio(&self) -> Option<&LocalAudio> {
        self.local.as_ref()
    }

    fn apply_mute(&mut self) {
        let enabled = !self.muted;
        if let Some(audio) = self.local.as_mut() {
            for track in &mut audio.tracks {
                track.enabled = enabled;
            }
        }
    }

    /// Stop local tracks and give the device back; returns true the first time only
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        if let Some(audio) = self.local.as_mut() {
            for track in &mut audio.tracks {
                track.enabled = false;
                track.stopped = true;
            }
            info!("Microphone released");
        }
        true
    }
}
