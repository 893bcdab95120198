// Connection negotiator: offer/answer/ICE state machine
// Sans-I/O in the same spirit as str0m: callers feed inputs with an explicit `now`
// and drain outputs with poll_output(), so timeouts are testable with a fake clock.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::descriptor::{DescriptorKind, IceCandidate, SessionDescriptor};
use super::error::SessionError;

/// The real-time transport primitive the negotiator drives
///
/// Implemented over str0m in `network::rtc` and by an in-memory fake in tests.
pub trait PeerTransport {
    /// Create the local offer (host side) and return its SDP
    fn create_offer(&mut self) -> Result<String, SessionError>;

    /// Apply a remote offer and return the local answer SDP (guest side)
    fn accept_offer(&mut self, sdp: &str) -> Result<String, SessionError>;

    /// Apply the remote answer to the pending offer (host side)
    fn accept_answer(&mut self, sdp: &str) -> Result<(), SessionError>;

    fn add_remote_candidate(&mut self, candidate: &IceCandidate) -> Result<(), SessionError>;

    /// Write one application frame on the data channel
    fn send(&mut self, payload: &[u8]) -> Result<(), SessionError>;

    /// Release the underlying connection; called at most once
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the game code and the offer, plays X
    Host,
    /// Joins with the game code, answers, plays O
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStrategy {
    /// Descriptions and candidates relayed by the rendezvous broker
    Broker,
    /// Operator copies and pastes text blobs
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    OfferCreated,
    AwaitingRemote,
    AnswerCreated,
    Negotiating,
    Open,
    Closed,
    Failed,
}

impl NegotiationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationState::Closed | NegotiationState::Failed)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NegotiationState::New => "new",
            NegotiationState::OfferCreated => "offer created",
            NegotiationState::AwaitingRemote => "awaiting remote",
            NegotiationState::AnswerCreated => "answer created",
            NegotiationState::Negotiating => "negotiating",
            NegotiationState::Open => "open",
            NegotiationState::Closed => "closed",
            NegotiationState::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Negotiation time bounds per exchange strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationTimeouts {
    pub broker: Duration,
    pub manual: Duration,
}

impl NegotiationTimeouts {
    pub fn for_strategy(&self, strategy: ExchangeStrategy) -> Duration {
        match strategy {
            ExchangeStrategy::Broker => self.broker,
            ExchangeStrategy::Manual => self.manual,
        }
    }
}

impl Default for NegotiationTimeouts {
    fn default() -> Self {
        Self {
            broker: Duration::from_secs(60),
            manual: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NegotiatorOutput {
    StateChanged(NegotiationState),
    /// Local offer or answer, carrying every local candidate known so far
    LocalDescription(SessionDescriptor),
    /// A local candidate discovered after the description was produced
    LocalCandidate(IceCandidate),
    /// Terminal failure of this attempt
    Failed(SessionError),
}

pub struct Negotiator<T: PeerTransport> {
    transport: T,
    role: Role,
    strategy: ExchangeStrategy,
    state: NegotiationState,
    timeouts: NegotiationTimeouts,
    deadline: Option<Instant>,
    local_description: Option<SessionDescriptor>,
    local_candidates: Vec<IceCandidate>,
    remote_description_applied: bool,
    /// Remote candidates that arrived before the remote description
    pending_remote: Vec<IceCandidate>,
    applied_remote: HashSet<IceCandidate>,
    transport_released: bool,
    outputs: VecDeque<NegotiatorOutput>,
}

impl<T: PeerTransport> Negotiator<T> {
    pub fn new(
        transport: T,
        role: Role,
        strategy: ExchangeStrategy,
        timeouts: NegotiationTimeouts,
        now: Instant,
    ) -> Self {
        let deadline = Some(now + timeouts.for_strategy(strategy));
        debug!("Negotiator created: role={:?} strategy={:?}", role, strategy);
        Self {
            transport,
            role,
            strategy,
            state: NegotiationState::New,
            timeouts,
            deadline,
            local_description: None,
            local_candidates: Vec::new(),
            remote_description_applied: false,
            pending_remote: Vec::new(),
            applied_remote: HashSet::new(),
            transport_released: false,
            outputs: VecDeque::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn strategy(&self) -> ExchangeStrategy {
        self.strategy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn pending_remote_count(&self) -> usize {
        self.pending_remote.len()
    }

    pub fn applied_remote_count(&self) -> usize {
        self.applied_remote.len()
    }

    pub fn local_candidates(&self) -> &[IceCandidate] {
        &self.local_candidates
    }

    /// Local description with every candidate gathered so far
    pub fn local_descriptor(&self) -> Option<SessionDescriptor> {
        self.local_description
            .clone()
            .map(|d| d.with_candidates(self.local_candidates.clone()))
    }

    /// Copyable text for the manual exchange path
    pub fn local_blob(&self) -> Option<String> {
        self.local_descriptor().map(|d| d.to_manual_text())
    }

    /// Switch to copy/paste exchange; the bound restarts from `now`
    pub fn fall_back_to_manual(&mut self, now: Instant) {
        if self.state.is_terminal() || self.state == NegotiationState::Open {
            return;
        }
        if self.strategy != ExchangeStrategy::Manual {
            info!("Falling back to manual descriptor exchange");
            self.strategy = ExchangeStrategy::Manual;
            self.deadline = Some(now + self.timeouts.manual);
        }
    }

    /// Give the current step a fresh bound; every forward step calls this
    pub fn restart_deadline(&mut self, now: Instant) {
        if self.state.is_terminal() || self.state == NegotiationState::Open {
            return;
        }
        self.deadline = Some(now + self.timeouts.for_strategy(self.strategy));
    }

    /// Host: generate the local offer
    pub fn create_offer(&mut self, now: Instant) -> Result<SessionDescriptor, SessionError> {
        self.ensure_active()?;
        if self.role != Role::Host || self.state != NegotiationState::New {
            return Err(SessionError::Transport(format!(
                "cannot create an offer as {:?} in state {}",
                self.role, self.state
            )));
        }

        let sdp = match self.transport.create_offer() {
            Ok(sdp) => sdp,
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        };

        self.set_state(NegotiationState::OfferCreated);
        let descriptor = self.publish_local(SessionDescriptor::offer(sdp));
        self.set_state(NegotiationState::AwaitingRemote);
        self.restart_deadline(now);
        Ok(descriptor)
    }

    /// Apply a pasted or relayed remote descriptor
    ///
    /// Returns the local answer when this call produced one (guest side).
    /// Structural problems and wrong-kind descriptors return `InvalidDescriptor`
    /// without touching the state so the operator can re-paste; a description
    /// the transport itself rejects fails the attempt.
    pub fn apply_remote(
        &mut self,
        descriptor: SessionDescriptor,
        now: Instant,
    ) -> Result<Option<SessionDescriptor>, SessionError> {
        self.ensure_active()?;
        descriptor.validate()?;

        let expected = match self.role {
            Role::Host => DescriptorKind::Answer,
            Role::Guest => DescriptorKind::Offer,
        };
        if descriptor.kind != expected {
            return Err(SessionError::InvalidDescriptor(format!(
                "expected an {:?} but got an {:?}",
                expected, descriptor.kind
            )));
        }

        if self.remote_description_applied {
            // Same description pasted again with more candidates
            debug!("Remote description already applied, treating blob as candidate update");
            for candidate in descriptor.candidates {
                self.add_remote_candidate(candidate);
            }
            return Ok(None);
        }

        let answer = match self.role {
            Role::Guest => Some(self.accept_offer(&descriptor.sdp, now)?),
            Role::Host => {
                self.accept_answer(&descriptor.sdp, now)?;
                None
            }
        };

        for candidate in descriptor.candidates {
            self.add_remote_candidate(candidate);
        }

        Ok(answer)
    }

    fn accept_offer(&mut self, sdp: &str, now: Instant) -> Result<SessionDescriptor, SessionError> {
        if self.state != NegotiationState::New {
            return Err(SessionError::InvalidDescriptor(format!(
                "offer arrived in state {}",
                self.state
            )));
        }

        let answer_sdp = match self.transport.accept_offer(sdp) {
            Ok(answer) => answer,
            Err(e) => {
                let err = as_descriptor_error(e);
                self.fail(err.clone());
                return Err(err);
            }
        };

        info!("Remote offer applied, answer created");
        self.set_state(NegotiationState::AnswerCreated);
        let descriptor = self.publish_local(SessionDescriptor::answer(answer_sdp));

        self.remote_description_applied = true;
        self.flush_pending_remote();
        self.set_state(NegotiationState::Negotiating);
        self.restart_deadline(now);
        Ok(descriptor)
    }

    fn accept_answer(&mut self, sdp: &str, now: Instant) -> Result<(), SessionError> {
        if self.state != NegotiationState::AwaitingRemote {
            return Err(SessionError::InvalidDescriptor(format!(
                "answer arrived in state {}",
                self.state
            )));
        }

        if let Err(e) = self.transport.accept_answer(sdp) {
            let err = as_descriptor_error(e);
            self.fail(err.clone());
            return Err(err);
        }

        info!("Remote answer applied");
        self.remote_description_applied = true;
        self.flush_pending_remote();
        self.set_state(NegotiationState::Negotiating);
        self.restart_deadline(now);
        Ok(())
    }

    /// Keep the bare description; hand out a copy carrying every local candidate
    fn publish_local(&mut self, description: SessionDescriptor) -> SessionDescriptor {
        let descriptor = description
            .clone()
            .with_candidates(self.local_candidates.clone());
        self.local_description = Some(description);
        self.outputs
            .push_back(NegotiatorOutput::LocalDescription(descriptor.clone()));
        descriptor
    }

    /// Record a locally discovered candidate and stream it to the peer
    pub fn add_local_candidate(&mut self, candidate: IceCandidate) {
        if self.state.is_terminal() || self.local_candidates.contains(&candidate) {
            return;
        }
        debug!("Local candidate: {}", candidate.candidate);
        self.local_candidates.push(candidate.clone());
        if self.local_description.is_some() {
            self.outputs.push_back(NegotiatorOutput::LocalCandidate(candidate));
        }
    }

    /// Apply a remote candidate, buffering it until the remote description is in
    pub fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.state.is_terminal() {
            return;
        }
        if !self.remote_description_applied {
            if !self.pending_remote.contains(&candidate) {
                debug!("Buffering early remote candidate: {}", candidate.candidate);
                self.pending_remote.push(candidate);
            }
            return;
        }
        self.apply_remote_candidate(candidate);
    }

    fn flush_pending_remote(&mut self) {
        let pending = std::mem::take(&mut self.pending_remote);
        if !pending.is_empty() {
            debug!("Applying {} buffered remote candidates", pending.len());
        }
        for candidate in pending {
            self.apply_remote_candidate(candidate);
        }
    }

    fn apply_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.applied_remote.contains(&candidate) {
            return;
        }
        match self.transport.add_remote_candidate(&candidate) {
            Ok(()) => {
                self.applied_remote.insert(candidate);
            }
            Err(e) => {
                // One unusable path does not sink the attempt
                warn!("Ignoring remote candidate {}: {}", candidate.candidate, e);
            }
        }
    }

    /// The transport reports its data channel as ready
    pub fn on_transport_open(&mut self) {
        match self.state {
            NegotiationState::Negotiating => {
                info!("Transport open");
                self.deadline = None;
                self.set_state(NegotiationState::Open);
            }
            NegotiationState::Open => {}
            state => warn!("Transport reported open in state {}, ignoring", state),
        }
    }

    /// The transport went away underneath us
    pub fn on_transport_closed(&mut self, reason: &str) {
        match self.state {
            NegotiationState::Open => {
                info!("Transport closed: {}", reason);
                self.release();
                self.set_state(NegotiationState::Closed);
            }
            state if state.is_terminal() => {}
            _ => self.fail(SessionError::TransportClosed(reason.to_string())),
        }
    }

    /// Next instant at which handle_timeout() must be called
    pub fn poll_timeout(&self) -> Option<Instant> {
        if self.state.is_terminal() {
            return None;
        }
        self.deadline
    }

    pub fn handle_timeout(&mut self, now: Instant) {
        if self.state.is_terminal() {
            return;
        }
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                let secs = self.timeouts.for_strategy(self.strategy).as_secs();
                warn!("Negotiation timed out after {}s in state {}", secs, self.state);
                self.fail(SessionError::NegotiationTimeout { secs });
            }
        }
    }

    /// Explicit leave or cancel; safe to call repeatedly
    pub fn close(&mut self) {
        self.release();
        if !self.state.is_terminal() {
            self.set_state(NegotiationState::Closed);
        }
    }

    pub fn fail(&mut self, err: SessionError) {
        if self.state.is_terminal() {
            return;
        }
        self.release();
        self.set_state(NegotiationState::Failed);
        self.outputs.push_back(NegotiatorOutput::Failed(err));
    }

    pub fn poll_output(&mut self) -> Option<NegotiatorOutput> {
        self.outputs.pop_front()
    }

    /// Write a frame if the transport is open
    pub fn send(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        if self.state != NegotiationState::Open {
            return Err(SessionError::Closed);
        }
        self.transport.send(payload)
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn release(&mut self) {
        self.deadline = None;
        self.pending_remote.clear();
        if !self.transport_released {
            self.transport_released = true;
            self.transport.close();
        }
    }

    fn set_state(&mut self, state: NegotiationState) {
        if self.state == state {
            return;
        }
        debug!("Negotiation state: {} -> {}", self.state, state);
        self.state = state;
        self.outputs.push_back(NegotiatorOutput::StateChanged(state));
    }
}

fn as_descriptor_error(err: SessionError) -> SessionError {
    match err {
        SessionError::Transport(msg) => SessionError::InvalidDescriptor(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::FakeTransport;

    fn host(now: Instant) -> Negotiator<FakeTransport> {
        Negotiator::new(
            FakeTransport::new("host"),
            Role::Host,
            ExchangeStrategy::Manual,
            NegotiationTimeouts::default(),
            now,
        )
    }

    fn guest(now: Instant) -> Negotiator<FakeTransport> {
        Negotiator::new(
            FakeTransport::new("guest"),
            Role::Guest,
            ExchangeStrategy::Manual,
            NegotiationTimeouts::default(),
            now,
        )
    }

    fn states(n: &mut Negotiator<FakeTransport>) -> Vec<NegotiationState> {
        let mut out = Vec::new();
        while let Some(o) = n.poll_output() {
            if let NegotiatorOutput::StateChanged(s) = o {
                out.push(s);
            }
        }
        out
    }

    /// Drive both sides to open the way the fake network would
    fn open_if_ready(a: &mut Negotiator<FakeTransport>, b: &mut Negotiator<FakeTransport>, now: Instant) {
        if a.transport().has_path() && b.transport().has_path() {
            a.on_transport_open();
            b.on_transport_open();
        }
    }

    #[test]
    fn test_host_and_guest_reach_open() {
        let now = Instant::now();
        let mut h = host(now);
        let mut g = guest(now);

        let offer = h.create_offer(now).unwrap();
        let answer = g.apply_remote(offer, now).unwrap().expect("guest answers");
        h.apply_remote(answer, now).unwrap();

        // No candidates yet: no path, no open
        open_if_ready(&mut h, &mut g, now);
        assert_eq!(h.state(), NegotiationState::Negotiating);
        assert_eq!(g.state(), NegotiationState::Negotiating);

        g.add_remote_candidate(IceCandidate::new("candidate:host-1"));
        h.add_remote_candidate(IceCandidate::new("candidate:guest-1"));
        open_if_ready(&mut h, &mut g, now);

        assert_eq!(
            states(&mut h),
            vec![
                NegotiationState::OfferCreated,
                NegotiationState::AwaitingRemote,
                NegotiationState::Negotiating,
                NegotiationState::Open,
            ]
        );
        assert_eq!(
            states(&mut g),
            vec![
                NegotiationState::AnswerCreated,
                NegotiationState::Negotiating,
                NegotiationState::Open,
            ]
        );
        assert_eq!(h.poll_timeout(), None);
    }

    #[test]
    fn test_early_candidates_are_buffered_then_applied() {
        let now = Instant::now();
        let mut h = host(now);
        let mut g = guest(now);
        let offer = h.create_offer(now).unwrap();

        // Candidates overtake the offer
        let early = vec![
            IceCandidate::new("candidate:a"),
            IceCandidate::new("candidate:b"),
            IceCandidate::new("candidate:c"),
        ];
        for c in &early {
            g.add_remote_candidate(c.clone());
        }
        assert_eq!(g.pending_remote_count(), 3);
        assert!(g.transport().remote_candidates.is_empty());

        g.apply_remote(offer, now).unwrap();
        assert_eq!(g.pending_remote_count(), 0);
        assert_eq!(g.transport().remote_candidates, early);

        // Late candidates after the description go straight through
        g.add_remote_candidate(IceCandidate::new("candidate:d"));
        assert_eq!(g.transport().remote_candidates.len(), 4);
    }

    #[test]
    fn test_late_candidate_after_open_still_applied() {
        let now = Instant::now();
        let mut h = host(now);
        let mut g = guest(now);
        let offer = h.create_offer(now).unwrap();
        let answer = g.apply_remote(offer, now).unwrap().unwrap();
        h.apply_remote(answer, now).unwrap();
        h.add_remote_candidate(IceCandidate::new("candidate:g1"));
        g.add_remote_candidate(IceCandidate::new("candidate:h1"));
        open_if_ready(&mut h, &mut g, now);
        assert_eq!(h.state(), NegotiationState::Open);

        h.add_remote_candidate(IceCandidate::new("candidate:g2"));
        assert_eq!(h.applied_remote_count(), 2);
    }

    #[test]
    fn test_duplicate_remote_candidates_applied_once() {
        let now = Instant::now();
        let mut g = guest(now);
        let offer = {
            let mut h = host(now);
            h.create_offer(now).unwrap()
        };
        g.add_remote_candidate(IceCandidate::new("candidate:x"));
        g.add_remote_candidate(IceCandidate::new("candidate:x"));
        g.apply_remote(offer.clone(), now).unwrap();
        g.add_remote_candidate(IceCandidate::new("candidate:x"));
        assert_eq!(g.transport().remote_candidates.len(), 1);
    }

    #[test]
    fn test_wrong_kind_is_rejected_without_state_change() {
        let now = Instant::now();
        let mut g = guest(now);
        let answer = SessionDescriptor::answer("v=0\r\no=fake-answer\r\n");
        let err = g.apply_remote(answer, now).unwrap_err();
        assert!(matches!(err, SessionError::InvalidDescriptor(_)));
        assert_eq!(g.state(), NegotiationState::New);
    }

    #[test]
    fn test_transport_rejecting_description_fails_attempt() {
        let now = Instant::now();
        let mut g = guest(now);
        let bogus = SessionDescriptor::offer("v=0\r\no=something-else\r\n");
        let err = g.apply_remote(bogus, now).unwrap_err();
        assert!(matches!(err, SessionError::InvalidDescriptor(_)));
        assert_eq!(g.state(), NegotiationState::Failed);
        assert_eq!(g.transport().close_calls, 1);
    }

    #[test]
    fn test_reapplied_blob_only_adds_new_candidates() {
        let now = Instant::now();
        let mut h = host(now);
        let mut g = guest(now);
        h.add_local_candidate(IceCandidate::new("candidate:h1"));
        let offer = h.create_offer(now).unwrap();
        assert_eq!(offer.candidates.len(), 1);
        g.apply_remote(offer, now).unwrap();

        h.add_local_candidate(IceCandidate::new("candidate:h2"));
        let updated = h.local_descriptor().unwrap();
        assert_eq!(updated.candidates.len(), 2);

        assert_eq!(g.apply_remote(updated, now).unwrap(), None);
        assert_eq!(g.transport().remote_candidates.len(), 2);
        assert_eq!(g.state(), NegotiationState::Negotiating);
    }

    #[test]
    fn test_local_candidates_stream_after_description() {
        let now = Instant::now();
        let mut h = host(now);
        h.add_local_candidate(IceCandidate::new("candidate:before"));
        h.create_offer(now).unwrap();
        while h.poll_output().is_some() {}

        h.add_local_candidate(IceCandidate::new("candidate:after"));
        assert_eq!(
            h.poll_output(),
            Some(NegotiatorOutput::LocalCandidate(IceCandidate::new("candidate:after")))
        );
    }

    #[test]
    fn test_timeout_fails_and_goes_quiet() {
        let start = Instant::now();
        let mut h = host(start);
        h.create_offer(start).unwrap();
        while h.poll_output().is_some() {}

        let deadline = h.poll_timeout().expect("deadline armed");
        assert_eq!(deadline, start + Duration::from_secs(300));

        h.handle_timeout(deadline - Duration::from_millis(1));
        assert_eq!(h.state(), NegotiationState::AwaitingRemote);

        h.handle_timeout(deadline);
        assert_eq!(h.state(), NegotiationState::Failed);
        assert_eq!(h.poll_output(), Some(NegotiatorOutput::StateChanged(NegotiationState::Failed)));
        assert_eq!(
            h.poll_output(),
            Some(NegotiatorOutput::Failed(SessionError::NegotiationTimeout { secs: 300 }))
        );

        // Nothing left armed, nothing fires later
        assert_eq!(h.poll_timeout(), None);
        h.handle_timeout(deadline + Duration::from_secs(3600));
        h.add_remote_candidate(IceCandidate::new("candidate:late"));
        assert_eq!(h.poll_output(), None);
        assert_eq!(h.transport().close_calls, 1);
    }

    #[test]
    fn test_broker_strategy_uses_shorter_bound() {
        let now = Instant::now();
        let mut g = Negotiator::new(
            FakeTransport::new("guest"),
            Role::Guest,
            ExchangeStrategy::Broker,
            NegotiationTimeouts::default(),
            now,
        );
        assert_eq!(g.poll_timeout(), Some(now + Duration::from_secs(60)));

        let later = now + Duration::from_secs(30);
        g.fall_back_to_manual(later);
        assert_eq!(g.strategy(), ExchangeStrategy::Manual);
        assert_eq!(g.poll_timeout(), Some(later + Duration::from_secs(300)));
    }

    #[test]
    fn test_each_step_restarts_the_bound() {
        let start = Instant::now();
        let mut h = host(start);
        let mut g = guest(start);
        assert_eq!(h.poll_timeout(), Some(start + Duration::from_secs(300)));

        let offered = start + Duration::from_secs(200);
        let offer = h.create_offer(offered).unwrap();
        assert_eq!(h.poll_timeout(), Some(offered + Duration::from_secs(300)));

        // Past the creation-time bound but within the step's own
        let answered = start + Duration::from_secs(400);
        h.handle_timeout(answered);
        assert_eq!(h.state(), NegotiationState::AwaitingRemote);

        let answer = g.apply_remote(offer, answered).unwrap().unwrap();
        assert_eq!(g.poll_timeout(), Some(answered + Duration::from_secs(300)));
        h.apply_remote(answer, answered).unwrap();
        assert_eq!(h.poll_timeout(), Some(answered + Duration::from_secs(300)));

        h.close();
        h.restart_deadline(answered);
        assert_eq!(h.poll_timeout(), None);
    }

    #[test]
    fn test_local_description_is_built_from_transport_sdp() {
        let now = Instant::now();
        let mut h = host(now);
        h.add_local_candidate(IceCandidate::new("candidate:h1"));
        let offer = h.create_offer(now).unwrap();
        assert_eq!(offer.kind, DescriptorKind::Offer);
        assert!(!offer.sdp.is_empty());
        assert_eq!(offer.candidates, vec![IceCandidate::new("candidate:h1")]);
        assert_eq!(h.local_descriptor(), Some(offer.clone()));

        let mut g = guest(now);
        let answer = g.apply_remote(offer, now).unwrap().unwrap();
        assert_eq!(answer.kind, DescriptorKind::Answer);
        assert!(!answer.sdp.is_empty());
        assert_eq!(g.local_descriptor(), Some(answer));
    }

    #[test]
    fn test_close_is_idempotent() {
        let now = Instant::now();
        let mut h = host(now);
        h.create_offer(now).unwrap();
        h.add_remote_candidate(IceCandidate::new("candidate:early"));
        h.close();
        h.close();
        assert_eq!(h.state(), NegotiationState::Closed);
        assert_eq!(h.transport().close_calls, 1);
        assert_eq!(h.pending_remote_count(), 0);
        assert!(matches!(
            h.apply_remote(SessionDescriptor::answer("v=0\r\n"), now),
            Err(SessionError::Closed)
        ));
    }

    #[test]
    fn test_transport_loss_before_open_fails() {
        let now = Instant::now();
        let mut h = host(now);
        h.create_offer(now).unwrap();
        h.on_transport_closed("peer vanished");
        assert_eq!(h.state(), NegotiationState::Failed);
    }
}
