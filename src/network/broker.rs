// Session broker client
// Registers this endpoint under a game code, finds the host, and relays
// descriptors and candidates until the peer-to-peer channel is up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::code::{EndpointId, GameCode};
use super::error::SessionError;
use super::session::SignalRelay;
use super::signaling::{ErrorCode, Signal, SignalingMessage};

/// What the broker tells us while a session is being set up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A guest wants to join the game we host
    ConnectionRequest { from: EndpointId, name: String },
    Signal { from: EndpointId, signal: Signal },
    PeerLeft { endpoint_id: EndpointId },
}

pub struct BrokerClient {
    outgoing: mpsc::UnboundedSender<SignalingMessage>,
    incoming: mpsc::UnboundedReceiver<SignalingMessage>,
    backlog: VecDeque<SignalingMessage>,
    endpoint: Option<EndpointId>,
    game_code: Option<GameCode>,
    registered: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl BrokerClient {
    /// Open a WebSocket to the rendezvous server
    pub async fn connect_ws(url: &str, request_timeout: Duration) -> Result<Self, SessionError> {
        info!("Connecting to signaling server: {}", url);
        let (ws, _) = tokio::time::timeout(request_timeout, connect_async(url))
            .await
            .map_err(|_| SessionError::BrokerUnavailable(format!("{} did not answer", url)))?
            .map_err(|e| SessionError::BrokerUnavailable(e.to_string()))?;
        info!("Connected to signaling server");

        let (mut ws_sink, mut ws_stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<SignalingMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match msg.to_text() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode signaling message: {}", e);
                        continue;
                    }
                };
                if ws_sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = ws_stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match SignalingMessage::from_text(&text) {
                        Ok(msg) => {
                            if in_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring malformed signaling frame: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Signaling connection error: {}", e);
                        break;
                    }
                }
            }
            debug!("Signaling reader finished");
        });

        Ok(Self::from_channels(out_tx, in_rx, request_timeout))
    }

    /// Build a client over an already established message pipe
    pub fn from_channels(
        outgoing: mpsc::UnboundedSender<SignalingMessage>,
        incoming: mpsc::UnboundedReceiver<SignalingMessage>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            outgoing,
            incoming,
            backlog: VecDeque::new(),
            endpoint: None,
            game_code: None,
            registered: Arc::new(AtomicBool::new(false)),
            request_timeout,
        }
    }

    pub fn endpoint(&self) -> Option<&EndpointId> {
        self.endpoint.as_ref()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Register under `game_code` and return the endpoint id the broker knows us by
    ///
    /// Registering again under the same code hands back the existing id without
    /// another round trip.
    pub async fn register(
        &mut self,
        game_code: &GameCode,
        display_name: &str,
        is_host: bool,
    ) -> Result<EndpointId, SessionError> {
        if self.is_registered() && self.game_code.as_ref() == Some(game_code) {
            if let Some(endpoint) = &self.endpoint {
                debug!("Already registered for {} as {}", game_code, endpoint);
                return Ok(endpoint.clone());
            }
        }
        let endpoint_id = EndpointId::derive(game_code, display_name);
        self.send(SignalingMessage::Register {
            endpoint_id: endpoint_id.clone(),
            game_code: game_code.clone(),
            is_host,
        })?;
        let reply = self
            .await_reply(|msg| matches!(msg, SignalingMessage::RegisterOk { .. }))
            .await?;
        match reply {
            SignalingMessage::RegisterOk { .. } => {
                info!("Registered as {}", endpoint_id);
                self.endpoint = Some(endpoint_id.clone());
                self.game_code = Some(game_code.clone());
                self.registered.store(true, Ordering::SeqCst);
                Ok(endpoint_id)
            }
            SignalingMessage::Error { code, message } => Err(match code {
                ErrorCode::CodeTaken | ErrorCode::AlreadyRegistered => {
                    SessionError::PeerUnreachable(message)
                }
                _ => SessionError::BrokerUnavailable(message),
            }),
            other => Err(unexpected(&other)),
        }
    }

    /// Find the host registered for `game_code`
    pub async fn lookup_host(&mut self, game_code: &GameCode) -> Result<Option<EndpointId>, SessionError> {
        self.send(SignalingMessage::Lookup {
            game_code: game_code.clone(),
        })?;
        let wanted = game_code.clone();
        let reply = self
            .await_reply(move |msg| {
                matches!(msg, SignalingMessage::LookupResult { game_code, .. } if *game_code == wanted)
            })
            .await?;
        match reply {
            SignalingMessage::LookupResult { host, .. } => Ok(host),
            SignalingMessage::Error { message, .. } => Err(SessionError::BrokerUnavailable(message)),
            other => Err(unexpected(&other)),
        }
    }

    /// Ask the broker to introduce us to `target`
    pub async fn connect(&mut self, target: &EndpointId, display_name: &str) -> Result<(), SessionError> {
        let from = self
            .endpoint
            .clone()
            .ok_or_else(|| SessionError::BrokerUnavailable("not registered".into()))?;
        self.send(SignalingMessage::Connect {
            target: target.clone(),
            from,
            name: display_name.to_string(),
        })?;
        let wanted = target.clone();
        let reply = self
            .await_reply(move |msg| {
                matches!(msg, SignalingMessage::ConnectOk { target } if *target == wanted)
            })
            .await?;
        match reply {
            SignalingMessage::ConnectOk { .. } => {
                info!("Broker introduced us to {}", target);
                Ok(())
            }
            SignalingMessage::Error { message, .. } => Err(SessionError::PeerUnreachable(message)),
            other => Err(unexpected(&other)),
        }
    }

    /// Turn a guest away without touching our own session
    pub fn reject(&self, target: &EndpointId, reason: &str) -> Result<(), SessionError> {
        let from = self
            .endpoint
            .clone()
            .ok_or_else(|| SessionError::BrokerUnavailable("not registered".into()))?;
        self.send(SignalingMessage::Signal {
            target: target.clone(),
            from,
            signal: Signal::Reject {
                reason: reason.to_string(),
            },
        })
    }

    /// Next broker event; None once the broker connection is gone
    pub async fn next_event(&mut self) -> Option<BrokerEvent> {
        loop {
            let msg = match self.backlog.pop_front() {
                Some(msg) => msg,
                None => self.incoming.recv().await?,
            };
            match msg {
                SignalingMessage::ConnectRequest { from, name } => {
                    return Some(BrokerEvent::ConnectionRequest { from, name })
                }
                SignalingMessage::Signal { from, signal, .. } => {
                    return Some(BrokerEvent::Signal { from, signal })
                }
                SignalingMessage::PeerLeft { endpoint_id } => {
                    return Some(BrokerEvent::PeerLeft { endpoint_id })
                }
                SignalingMessage::Error { code, message } => {
                    warn!("Broker error {:?}: {}", code, message)
                }
                other => debug!("Ignoring broker message: {:?}", other),
            }
        }
    }

    /// Relay bound to this registration, for the session to push signals through
    pub fn relay_handle(&self, target: Option<EndpointId>) -> BrokerRelay {
        BrokerRelay {
            outgoing: self.outgoing.clone(),
            from: self.endpoint.clone(),
            target,
            registered: self.registered.clone(),
        }
    }

    /// Unregister; safe to call any number of times
    pub fn teardown(&mut self) {
        unregister(&self.outgoing, &self.registered);
    }

    fn send(&self, msg: SignalingMessage) -> Result<(), SessionError> {
        self.outgoing
            .send(msg)
            .map_err(|_| SessionError::BrokerUnavailable("signaling connection closed".into()))
    }

    /// Wait for the reply `is_reply` accepts, or for an error frame
    ///
    /// Anything else arriving meanwhile is kept for next_event().
    async fn await_reply<F>(&mut self, is_reply: F) -> Result<SignalingMessage, SessionError>
    where
        F: Fn(&SignalingMessage) -> bool,
    {
        let deadline = tokio::time::Instant::now() + self.request_timeout;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.incoming.recv())
                .await
                .map_err(|_| SessionError::BrokerUnavailable("no reply from signaling server".into()))?
                .ok_or_else(|| SessionError::BrokerUnavailable("signaling connection closed".into()))?;
            if is_reply(&msg) || matches!(msg, SignalingMessage::Error { .. }) {
                return Ok(msg);
            }
            self.backlog.push_back(msg);
        }
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn unregister(outgoing: &mpsc::UnboundedSender<SignalingMessage>, registered: &AtomicBool) {
    if registered.swap(false, Ordering::SeqCst) {
        info!("Releasing broker registration");
        let _ = outgoing.send(SignalingMessage::Unregister);
    }
}

fn unexpected(msg: &SignalingMessage) -> SessionError {
    SessionError::BrokerUnavailable(format!("unexpected reply: {:?}", msg))
}

/// Session-side handle for relaying through the broker
pub struct BrokerRelay {
    outgoing: mpsc::UnboundedSender<SignalingMessage>,
    from: Option<EndpointId>,
    target: Option<EndpointId>,
    registered: Arc<AtomicBool>,
}

impl SignalRelay for BrokerRelay {
    fn attach(&mut self, peer: EndpointId) {
        self.target = Some(peer);
    }

    fn relay(&mut self, signal: Signal) -> Result<(), SessionError> {
        // Host publishes before any guest shows up; attach() replays later
        let (Some(target), Some(from)) = (self.target.clone(), self.from.clone()) else {
            return Ok(());
        };
        if !self.registered.load(Ordering::SeqCst) {
            return Err(SessionError::BrokerUnavailable("registration released".into()));
        }
        self.outgoing
            .send(SignalingMessage::Signal { target, from, signal })
            .map_err(|_| SessionError::BrokerUnavailable("signaling connection closed".into()))
    }

    fn release(&mut self) {
        unregister(&self.outgoing, &self.registered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::descriptor::{IceCandidate, SessionDescriptor};
    use crate::network::rendezvous::Rendezvous;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn code() -> GameCode {
        GameCode::parse("AB12CD").unwrap()
    }

    async fn client(rv: &Rendezvous) -> BrokerClient {
        let (tx, rx) = rv.attach().await;
        BrokerClient::from_channels(tx, rx, TIMEOUT)
    }

    async fn registered_pair(rv: &Rendezvous) -> (BrokerClient, EndpointId, BrokerClient, EndpointId) {
        let mut host = client(rv).await;
        let mut guest = client(rv).await;
        let host_id = host.register(&code(), "Romeo", true).await.unwrap();
        let guest_id = guest.register(&code(), "Juliet", false).await.unwrap();
        (host, host_id, guest, guest_id)
    }

    #[tokio::test]
    async fn test_register_twice_is_harmless() {
        let rv = Rendezvous::new();
        let mut host = client(&rv).await;
        let first = host.register(&code(), "Romeo", true).await.unwrap();
        let second = host.register(&code(), "Romeo", true).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(host.endpoint(), Some(&first));
        assert!(host.is_registered());
        assert_eq!(rv.endpoint_count().await, 1);
    }

    #[tokio::test]
    async fn test_repeat_register_sends_nothing() {
        let (tx, mut server_rx) = mpsc::unbounded_channel();
        let (server_tx, rx) = mpsc::unbounded_channel();
        let mut host = BrokerClient::from_channels(tx, rx, TIMEOUT);

        server_tx
            .send(SignalingMessage::RegisterOk {
                endpoint_id: EndpointId::from_raw("placeholder"),
            })
            .unwrap();
        let id = host.register(&code(), "Romeo", true).await.unwrap();
        assert!(id.as_str().starts_with("AB12CD-Romeo-"));
        assert!(matches!(server_rx.try_recv(), Ok(SignalingMessage::Register { .. })));

        // No reply is queued, so a second round trip would time out
        assert_eq!(host.register(&code(), "Romeo", true).await.unwrap(), id);
        assert!(server_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_guest_finds_host_and_connects() {
        let rv = Rendezvous::new();
        let (mut host, host_id, mut guest, guest_id) = registered_pair(&rv).await;

        assert_eq!(guest.lookup_host(&code()).await.unwrap(), Some(host_id.clone()));
        guest.connect(&host_id, "Juliet").await.unwrap();

        assert_eq!(
            host.next_event().await,
            Some(BrokerEvent::ConnectionRequest {
                from: guest_id,
                name: "Juliet".into()
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_code_and_stale_endpoint() {
        let rv = Rendezvous::new();
        let mut guest = client(&rv).await;
        guest.register(&code(), "Juliet", false).await.unwrap();

        let other = GameCode::parse("ZZ99ZZ").unwrap();
        assert_eq!(guest.lookup_host(&other).await.unwrap(), None);

        let err = guest
            .connect(&EndpointId::from_raw("ZZ99ZZ-Gone-5"), "Juliet")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::PeerUnreachable(_)));
    }

    #[tokio::test]
    async fn test_relay_reaches_peer_in_order() {
        let rv = Rendezvous::new();
        let (host, host_id, mut guest, guest_id) = registered_pair(&rv).await;

        let mut relay = host.relay_handle(None);
        // Nothing to send to yet
        relay.relay(Signal::Candidate(IceCandidate::new("candidate:dropped"))).unwrap();
        relay.attach(guest_id);
        relay
            .relay(Signal::Description(SessionDescriptor::offer("v=0\r\n")))
            .unwrap();
        relay
            .relay(Signal::Candidate(IceCandidate::new("candidate:1")))
            .unwrap();

        match guest.next_event().await {
            Some(BrokerEvent::Signal { from, signal }) => {
                assert_eq!(from, host_id);
                assert!(matches!(signal, Signal::Description(_)));
            }
            other => panic!("expected description, got {:?}", other),
        }
        assert_eq!(
            guest.next_event().await,
            Some(BrokerEvent::Signal {
                from: host_id,
                signal: Signal::Candidate(IceCandidate::new("candidate:1"))
            })
        );
    }

    #[tokio::test]
    async fn test_release_unregisters_once() {
        let rv = Rendezvous::new();
        let (mut host, _host_id, _guest, _guest_id) = registered_pair(&rv).await;
        let mut relay = host.relay_handle(None);

        relay.release();
        relay.release();
        host.teardown();
        assert!(!host.is_registered());

        // Same pipe, so the unregister is processed before this lookup
        assert_eq!(host.lookup_host(&code()).await.unwrap(), None);
        assert_eq!(rv.endpoint_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_guest_sees_reject_signal() {
        let rv = Rendezvous::new();
        let (mut host, host_id, mut guest, guest_id) = registered_pair(&rv).await;
        guest.connect(&host_id, "Juliet").await.unwrap();
        host.next_event().await;

        host.reject(&guest_id, "game is full").unwrap();
        assert_eq!(
            guest.next_event().await,
            Some(BrokerEvent::Signal {
                from: host_id,
                signal: Signal::Reject {
                    reason: "game is full".into()
                }
            })
        );
    }

    #[tokio::test]
    async fn test_dropped_host_reported_to_guest() {
        let rv = Rendezvous::new();
        let (host, host_id, mut guest, _guest_id) = registered_pair(&rv).await;
        guest.connect(&host_id, "Juliet").await.unwrap();
        drop(host);
        assert_eq!(
            guest.next_event().await,
            Some(BrokerEvent::PeerLeft {
                endpoint_id: host_id
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_broker_unavailable() {
        // Nothing listens on the discard port
        let err = BrokerClient::connect_ws("ws://127.0.0.1:9", Duration::from_millis(500))
            .await
            .err()
            .expect("connection refused");
        assert!(matches!(err, SessionError::BrokerUnavailable(_)));
    }
}
