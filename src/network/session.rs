// Peer session: one negotiator, one signal relay, one board, one voice link
// Owned by whoever composes the game; there is no global registry of sessions.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::game::{Board, Symbol};

use super::client::NetworkEvent;
use super::code::EndpointId;
use super::descriptor::{IceCandidate, SessionDescriptor};
use super::error::SessionError;
use super::negotiator::{
    ExchangeStrategy, NegotiationState, NegotiationTimeouts, Negotiator, NegotiatorOutput,
    PeerTransport, Role,
};
use super::protocol::{Frame, GameMessage, MediaSignal, PlayerInfo};
use super::signaling::Signal;
use super::voice::{Microphone, VoiceLink};

/// Outbound path for descriptions and candidates while negotiating
pub trait SignalRelay: Send {
    /// Point the relay at the peer once it is known
    fn attach(&mut self, _peer: EndpointId) {}

    fn relay(&mut self, signal: Signal) -> Result<(), SessionError>;

    /// Give up the broker registration; called once per session
    fn release(&mut self);
}

/// Relay for the copy/paste path: the operator carries the blobs
#[derive(Debug, Default)]
pub struct ManualRelay;

impl SignalRelay for ManualRelay {
    fn relay(&mut self, _signal: Signal) -> Result<(), SessionError> {
        Ok(())
    }

    fn release(&mut self) {}
}

pub struct Session<T: PeerTransport> {
    local: PlayerInfo,
    negotiator: Negotiator<T>,
    relay: Box<dyn SignalRelay>,
    relay_released: bool,
    peer: Option<EndpointId>,
    microphone: Box<dyn Microphone>,
    voice: VoiceLink,
    board: Board,
    remote: Option<PlayerInfo>,
    info_sent: bool,
    game_over_sent: bool,
    finished: bool,
    events: VecDeque<NetworkEvent>,
}

impl<T: PeerTransport> Session<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: Role,
        display_name: &str,
        transport: T,
        relay: Box<dyn SignalRelay>,
        microphone: Box<dyn Microphone>,
        strategy: ExchangeStrategy,
        timeouts: NegotiationTimeouts,
        now: Instant,
    ) -> Self {
        let symbol = match role {
            Role::Host => Symbol::X,
            Role::Guest => Symbol::O,
        };
        Self {
            local: PlayerInfo {
                name: display_name.to_string(),
                symbol,
            },
            negotiator: Negotiator::new(transport, role, strategy, timeouts, now),
            relay,
            relay_released: false,
            peer: None,
            microphone,
            voice: VoiceLink::new(),
            board: Board::new(),
            remote: None,
            info_sent: false,
            game_over_sent: false,
            finished: false,
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.negotiator.state()
    }

    pub fn role(&self) -> Role {
        self.negotiator.role()
    }

    pub fn local_player(&self) -> &PlayerInfo {
        &self.local
    }

    pub fn remote_player(&self) -> Option<&PlayerInfo> {
        self.remote.as_ref()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn voice(&self) -> &VoiceLink {
        &self.voice
    }

    pub fn negotiator(&self) -> &Negotiator<T> {
        &self.negotiator
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.negotiator.transport_mut()
    }

    pub fn has_peer(&self) -> bool {
        self.peer.is_some()
    }

    pub fn peer(&self) -> Option<&EndpointId> {
        self.peer.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Host: produce the offer right away so the manual blob is ready
    pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.role() == Role::Host && self.state() == NegotiationState::New {
            let result = self.negotiator.create_offer(now).map(|_| ());
            self.pump();
            return result;
        }
        Ok(())
    }

    /// Broker path: the peer endpoint is known; replay what it has missed
    ///
    /// The negotiation bound starts over here, so time spent waiting for a
    /// guest to show up does not count against the exchange.
    pub fn attach_peer(&mut self, peer: EndpointId, now: Instant) {
        if self.finished {
            return;
        }
        info!("Peer attached: {}", peer);
        self.relay.attach(peer.clone());
        self.peer = Some(peer);
        self.negotiator.restart_deadline(now);
        if let Some(descriptor) = self.negotiator.local_descriptor() {
            if let Err(e) = self.relay.relay(Signal::Description(descriptor)) {
                warn!("Failed to relay local description: {}", e);
            }
        }
    }

    /// Broker stopped working mid-negotiation; continue with copy/paste
    pub fn fall_back_to_manual(&mut self, now: Instant) {
        self.negotiator.fall_back_to_manual(now);
        self.release_relay();
        self.relay = Box::new(ManualRelay);
        if let Some(blob) = self.negotiator.local_blob() {
            self.events.push_back(NetworkEvent::ManualBlob(blob));
        }
    }

    /// Operator pasted the peer's blob
    pub fn apply_remote_text(&mut self, text: &str, now: Instant) -> Result<(), SessionError> {
        let descriptor = SessionDescriptor::from_manual_text(text)?;
        self.apply_remote_descriptor(descriptor, now)
    }

    pub fn apply_remote_descriptor(
        &mut self,
        descriptor: SessionDescriptor,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.finished {
            return Err(SessionError::Closed);
        }
        let result = self.negotiator.apply_remote(descriptor, now).map(|_| ());
        self.pump();
        result
    }

    /// A payload relayed by the broker from the peer
    pub fn handle_signal(&mut self, signal: Signal, now: Instant) {
        if self.finished {
            return;
        }
        match signal {
            Signal::Description(descriptor) => {
                if let Err(e) = self.apply_remote_descriptor(descriptor, now) {
                    warn!("Relayed description rejected: {}", e);
                    if !e.is_recoverable() || self.state().is_terminal() {
                        return;
                    }
                    self.events.push_back(NetworkEvent::Error(e));
                }
            }
            Signal::Candidate(candidate) => {
                self.negotiator.add_remote_candidate(candidate);
                self.pump();
            }
            Signal::Reject { reason } => {
                self.negotiator.fail(SessionError::PeerUnreachable(reason));
                self.pump();
            }
        }
    }

    pub fn add_local_candidate(&mut self, candidate: IceCandidate) {
        self.negotiator.add_local_candidate(candidate);
        self.pump();
    }

    pub fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        self.negotiator.add_remote_candidate(candidate);
        self.pump();
    }

    pub fn on_transport_open(&mut self) {
        self.negotiator.on_transport_open();
        self.pump();
    }

    pub fn on_transport_closed(&mut self, reason: &str) {
        let was_open = self.state() == NegotiationState::Open;
        self.negotiator.on_transport_closed(reason);
        self.pump();
        if was_open {
            self.events.push_back(NetworkEvent::Disconnected);
        }
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        if self.finished {
            return None;
        }
        self.negotiator.poll_timeout()
    }

    pub fn handle_timeout(&mut self, now: Instant) {
        if self.finished {
            return;
        }
        self.negotiator.handle_timeout(now);
        self.pump();
    }

    /// One frame from the data channel
    pub fn handle_data(&mut self, bytes: &[u8]) {
        if self.finished {
            return;
        }
        let frame = match Frame::from_bytes(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Discarding malformed frame ({} bytes): {}", bytes.len(), e);
                return;
            }
        };
        match frame {
            Frame::Game(msg) => self.dispatch(msg),
            Frame::Media(signal) => self.handle_media(signal),
        }
    }

    fn dispatch(&mut self, msg: GameMessage) {
        match &msg {
            GameMessage::PlayerInfo { name, symbol } => {
                if self.remote.is_some() {
                    debug!("Ignoring repeated player info from {}", name);
                    return;
                }
                let info = PlayerInfo {
                    name: name.clone(),
                    symbol: *symbol,
                };
                info!("Opponent is {} playing {}", info.name, info.symbol);
                self.remote = Some(info.clone());
                self.events.push_back(NetworkEvent::PlayerConnected(info));
            }
            GameMessage::Move { position, player } => {
                // The mover evaluates first and announces; we only converge
                self.board.apply(*position, *player);
                self.events.push_back(NetworkEvent::Message(msg.clone()));
                self.events.push_back(NetworkEvent::BoardChanged(self.board.clone()));
            }
            GameMessage::GameOver { winner } => {
                self.board.conclude(*winner);
                self.game_over_sent = true;
                self.events.push_back(NetworkEvent::Message(msg.clone()));
                self.events.push_back(NetworkEvent::BoardChanged(self.board.clone()));
            }
            GameMessage::Restart => {
                self.board.reset();
                self.game_over_sent = false;
                self.events.push_back(NetworkEvent::Message(msg.clone()));
                self.events.push_back(NetworkEvent::BoardChanged(self.board.clone()));
            }
            GameMessage::Unknown => debug!("Ignoring message with unknown tag"),
        }
    }

    fn handle_media(&mut self, signal: MediaSignal) {
        let update = self.voice.handle_signal(signal);
        if let Some(reply) = update.reply {
            if let Err(e) = self.send_frame(Frame::Media(reply)) {
                warn!("Failed to answer voice offer: {}", e);
            }
        }
        if let Some(remote) = update.remote {
            self.events.push_back(NetworkEvent::RemoteAudio(remote));
        }
    }

    /// Place a mark locally, then tell the peer
    pub fn send_move(&mut self, position: usize) -> Result<(), SessionError> {
        self.ensure_open()?;
        let symbol = self.local.symbol;
        let before = self.board.outcome;
        let outcome = self.board.apply(position, symbol);
        self.events.push_back(NetworkEvent::BoardChanged(self.board.clone()));
        self.send_frame(Frame::Game(GameMessage::Move {
            position,
            player: symbol,
        }))?;
        if before.is_none() {
            if let Some(outcome) = outcome {
                self.announce_game_over(outcome);
            }
        }
        Ok(())
    }

    pub fn send_restart(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.board.reset();
        self.game_over_sent = false;
        self.events.push_back(NetworkEvent::BoardChanged(self.board.clone()));
        self.send_frame(Frame::Game(GameMessage::Restart))
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.voice.set_muted(muted);
        self.microphone.set_enabled(!muted);
    }

    /// Leave or cancel at any point; repeated calls do nothing
    pub fn leave(&mut self) {
        if self.finished {
            return;
        }
        info!("Leaving session");
        self.negotiator.close();
        self.pump();
        self.finish();
    }

    pub fn poll_event(&mut self) -> Option<NetworkEvent> {
        self.events.pop_front()
    }

    fn announce_game_over(&mut self, winner: crate::game::Outcome) {
        if self.game_over_sent {
            return;
        }
        self.game_over_sent = true;
        if let Err(e) = self.send_frame(Frame::Game(GameMessage::GameOver { winner })) {
            warn!("Failed to send game over: {}", e);
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.finished || self.state() != NegotiationState::Open {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    fn send_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        let bytes = frame
            .to_bytes()
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        self.negotiator.send(&bytes)
    }

    fn on_open(&mut self) {
        if !self.info_sent {
            self.info_sent = true;
            let info = GameMessage::PlayerInfo {
                name: self.local.name.clone(),
                symbol: self.local.symbol,
            };
            if let Err(e) = self.send_frame(Frame::Game(info)) {
                warn!("Failed to send player info: {}", e);
            }
        }

        match self.voice.start(self.microphone.as_mut()) {
            Ok(offer) => {
                self.microphone.set_enabled(!self.voice.is_muted());
                if let Err(e) = self.send_frame(Frame::Media(offer)) {
                    warn!("Failed to send voice offer: {}", e);
                }
            }
            Err(e) => {
                info!("Continuing without voice: {}", e);
                self.events.push_back(NetworkEvent::VoiceUnavailable(e));
            }
        }
    }

    /// Drain negotiator outputs into relay traffic and UI events
    fn pump(&mut self) {
        while let Some(output) = self.negotiator.poll_output() {
            match output {
                NegotiatorOutput::StateChanged(state) => {
                    self.events.push_back(NetworkEvent::StateChanged(state));
                    match state {
                        NegotiationState::Open => self.on_open(),
                        s if s.is_terminal() => self.finish(),
                        _ => {}
                    }
                }
                NegotiatorOutput::LocalDescription(descriptor) => {
                    self.events
                        .push_back(NetworkEvent::ManualBlob(descriptor.to_manual_text()));
                    if let Err(e) = self.relay.relay(Signal::Description(descriptor)) {
                        warn!("Failed to relay local description: {}", e);
                    }
                }
                NegotiatorOutput::LocalCandidate(candidate) => {
                    if let Some(blob) = self.negotiator.local_blob() {
                        self.events.push_back(NetworkEvent::ManualBlob(blob));
                    }
                    if let Err(e) = self.relay.relay(Signal::Candidate(candidate)) {
                        warn!("Failed to relay local candidate: {}", e);
                    }
                }
                NegotiatorOutput::Failed(err) => {
                    self.events.push_back(NetworkEvent::Error(err));
                }
            }
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.voice.release() {
            self.microphone.release();
        }
        self.release_relay();
    }

    fn release_relay(&mut self) {
        if !self.relay_released {
            self.relay_released = true;
            self.relay.release();
        }
    }
}
