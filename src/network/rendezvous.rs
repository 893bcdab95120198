// Rendezvous registry: endpoint registration, host lookup by game code, and relay
// Transport-agnostic; the signaling server feeds it WebSocket frames and tests
// attach in-memory connections.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use super::code::{EndpointId, GameCode};
use super::signaling::{ErrorCode, SignalingMessage};

pub type ConnectionId = u64;

struct Endpoint {
    conn: ConnectionId,
    game_code: GameCode,
    is_host: bool,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<SignalingMessage>>,
    endpoints: HashMap<EndpointId, Endpoint>,
    /// Which endpoint each connection registered, if any
    owners: HashMap<ConnectionId, EndpointId>,
    hosts: HashMap<GameCode, EndpointId>,
    /// Endpoints told about each other by a connect
    links: HashMap<EndpointId, HashSet<EndpointId>>,
}

impl Registry {
    fn send(&self, conn: ConnectionId, msg: SignalingMessage) {
        if let Some(tx) = self.connections.get(&conn) {
            if tx.send(msg).is_err() {
                debug!("Connection {} already gone", conn);
            }
        }
    }

    fn send_to(&self, endpoint: &EndpointId, msg: SignalingMessage) -> bool {
        match self.endpoints.get(endpoint) {
            Some(ep) => {
                self.send(ep.conn, msg);
                true
            }
            None => false,
        }
    }

    /// Drop an endpoint and tell everyone it was linked with
    fn remove_endpoint(&mut self, endpoint: &EndpointId) {
        let Some(ep) = self.endpoints.remove(endpoint) else {
            return;
        };
        self.owners.remove(&ep.conn);
        if ep.is_host && self.hosts.get(&ep.game_code) == Some(endpoint) {
            self.hosts.remove(&ep.game_code);
        }
        let linked = self.links.remove(endpoint).unwrap_or_default();
        for other in linked {
            if let Some(set) = self.links.get_mut(&other) {
                set.remove(endpoint);
            }
            self.send_to(
                &other,
                SignalingMessage::PeerLeft {
                    endpoint_id: endpoint.clone(),
                },
            );
        }
        info!("Endpoint {} left", endpoint);
    }

    fn link(&mut self, a: &EndpointId, b: &EndpointId) {
        self.links.entry(a.clone()).or_default().insert(b.clone());
        self.links.entry(b.clone()).or_default().insert(a.clone());
    }
}

/// Shared registry handle; cheap to clone
#[derive(Clone, Default)]
pub struct Rendezvous {
    registry: Arc<RwLock<Registry>>,
    next_conn: Arc<AtomicU64>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport connection; replies to it go out through `tx`
    pub async fn open_connection(&self, tx: mpsc::UnboundedSender<SignalingMessage>) -> ConnectionId {
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        self.registry.write().await.connections.insert(conn, tx);
        debug!("Connection {} opened", conn);
        conn
    }

    /// Transport went away: implicit unregister
    pub async fn close_connection(&self, conn: ConnectionId) {
        let mut reg = self.registry.write().await;
        if let Some(endpoint) = reg.owners.get(&conn).cloned() {
            reg.remove_endpoint(&endpoint);
        }
        reg.connections.remove(&conn);
        debug!("Connection {} closed", conn);
    }

    pub async fn endpoint_count(&self) -> usize {
        self.registry.read().await.endpoints.len()
    }

    pub async fn handle(&self, conn: ConnectionId, msg: SignalingMessage) {
        let mut reg = self.registry.write().await;
        match msg {
            SignalingMessage::Register {
                endpoint_id,
                game_code,
                is_host,
            } => {
                if reg.owners.get(&conn) == Some(&endpoint_id) {
                    reg.send(conn, SignalingMessage::RegisterOk { endpoint_id });
                    return;
                }
                if reg.endpoints.contains_key(&endpoint_id) || reg.owners.contains_key(&conn) {
                    reg.send(
                        conn,
                        SignalingMessage::error(
                            ErrorCode::AlreadyRegistered,
                            format!("{} is already registered", endpoint_id),
                        ),
                    );
                    return;
                }
                if is_host && reg.hosts.contains_key(&game_code) {
                    reg.send(
                        conn,
                        SignalingMessage::error(
                            ErrorCode::CodeTaken,
                            format!("game {} already has a host", game_code),
                        ),
                    );
                    return;
                }

                info!(
                    "Registered {} for game {} ({})",
                    endpoint_id,
                    game_code,
                    if is_host { "host" } else { "guest" }
                );
                if is_host {
                    reg.hosts.insert(game_code.clone(), endpoint_id.clone());
                }
                reg.owners.insert(conn, endpoint_id.clone());
                reg.endpoints.insert(
                    endpoint_id.clone(),
                    Endpoint {
                        conn,
                        game_code,
                        is_host,
                    },
                );
                reg.send(conn, SignalingMessage::RegisterOk { endpoint_id });
            }

            SignalingMessage::Unregister => {
                if let Some(endpoint) = reg.owners.get(&conn).cloned() {
                    reg.remove_endpoint(&endpoint);
                }
            }

            SignalingMessage::Lookup { game_code } => {
                let host = reg.hosts.get(&game_code).cloned();
                debug!("Lookup {} -> {:?}", game_code, host);
                reg.send(conn, SignalingMessage::LookupResult { game_code, host });
            }

            SignalingMessage::Connect { target, name, .. } => {
                let Some(from) = reg.owners.get(&conn).cloned() else {
                    reg.send(conn, not_registered());
                    return;
                };
                let request = SignalingMessage::ConnectRequest {
                    from: from.clone(),
                    name,
                };
                if reg.send_to(&target, request) {
                    info!("Connect {} -> {}", from, target);
                    reg.link(&from, &target);
                    reg.send(conn, SignalingMessage::ConnectOk { target });
                } else {
                    reg.send(
                        conn,
                        SignalingMessage::error(
                            ErrorCode::PeerNotFound,
                            format!("{} is not registered", target),
                        ),
                    );
                }
            }

            SignalingMessage::Signal { target, signal, .. } => {
                let Some(from) = reg.owners.get(&conn).cloned() else {
                    reg.send(conn, not_registered());
                    return;
                };
                let relayed = SignalingMessage::Signal {
                    target: target.clone(),
                    from,
                    signal,
                };
                if !reg.send_to(&target, relayed) {
                    warn!("Signal target {} not found", target);
                    reg.send(conn, SignalingMessage::PeerLeft { endpoint_id: target });
                }
            }

            other => {
                warn!("Client sent a server-only message: {:?}", other);
                reg.send(
                    conn,
                    SignalingMessage::error(ErrorCode::InvalidMessage, "unexpected message type"),
                );
            }
        }
    }

    /// In-memory connection for tests and embedded use
    ///
    /// Returns the client's outgoing sender and incoming receiver, the same shape
    /// `BrokerClient::from_channels` takes.
    pub async fn attach(
        &self,
    ) -> (
        mpsc::UnboundedSender<SignalingMessage>,
        mpsc::UnboundedReceiver<SignalingMessage>,
    ) {
        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, mut from_client) = mpsc::unbounded_channel::<SignalingMessage>();
        let conn = self.open_connection(to_client).await;
        let rendezvous = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = from_client.recv().await {
                rendezvous.handle(conn, msg).await;
            }
            rendezvous.close_connection(conn).await;
        });
        (to_server, from_server)
    }
}

fn not_registered() -> SignalingMessage {
    SignalingMessage::error(ErrorCode::NotRegistered, "register before connecting")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::descriptor::IceCandidate;
    use crate::network::signaling::Signal;

    fn code() -> GameCode {
        GameCode::parse("AB12CD").unwrap()
    }

    async fn connection(
        rv: &Rendezvous,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<SignalingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (rv.open_connection(tx).await, rx)
    }

    async fn register(rv: &Rendezvous, conn: ConnectionId, id: &str, is_host: bool) {
        rv.handle(
            conn,
            SignalingMessage::Register {
                endpoint_id: EndpointId::from_raw(id),
                game_code: code(),
                is_host,
            },
        )
        .await;
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let rv = Rendezvous::new();
        let (conn, mut rx) = connection(&rv).await;
        register(&rv, conn, "AB12CD-Romeo-1", true).await;
        register(&rv, conn, "AB12CD-Romeo-1", true).await;
        for _ in 0..2 {
            assert!(matches!(rx.recv().await, Some(SignalingMessage::RegisterOk { .. })));
        }
        assert_eq!(rv.endpoint_count().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_finds_host_by_code() {
        let rv = Rendezvous::new();
        let (host, _host_rx) = connection(&rv).await;
        let (guest, mut guest_rx) = connection(&rv).await;
        register(&rv, host, "AB12CD-Romeo-1", true).await;
        rv.handle(guest, SignalingMessage::Lookup { game_code: code() }).await;
        assert_eq!(
            guest_rx.recv().await,
            Some(SignalingMessage::LookupResult {
                game_code: code(),
                host: Some(EndpointId::from_raw("AB12CD-Romeo-1"))
            })
        );
    }

    #[tokio::test]
    async fn test_second_host_for_code_is_refused() {
        let rv = Rendezvous::new();
        let (a, _a_rx) = connection(&rv).await;
        let (b, mut b_rx) = connection(&rv).await;
        register(&rv, a, "AB12CD-Romeo-1", true).await;
        register(&rv, b, "AB12CD-Tybalt-2", true).await;
        assert!(matches!(
            b_rx.recv().await,
            Some(SignalingMessage::Error {
                code: ErrorCode::CodeTaken,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_connect_unknown_target_reports_not_found() {
        let rv = Rendezvous::new();
        let (guest, mut rx) = connection(&rv).await;
        register(&rv, guest, "AB12CD-Juliet-2", false).await;
        rx.recv().await;
        rv.handle(
            guest,
            SignalingMessage::Connect {
                target: EndpointId::from_raw("ZZZZZZ-Nobody-0"),
                from: EndpointId::from_raw("AB12CD-Juliet-2"),
                name: "Juliet".into(),
            },
        )
        .await;
        assert!(matches!(
            rx.recv().await,
            Some(SignalingMessage::Error {
                code: ErrorCode::PeerNotFound,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_signal_relay_uses_registered_sender() {
        let rv = Rendezvous::new();
        let (host, mut host_rx) = connection(&rv).await;
        let (guest, mut guest_rx) = connection(&rv).await;
        register(&rv, host, "AB12CD-Romeo-1", true).await;
        register(&rv, guest, "AB12CD-Juliet-2", false).await;
        host_rx.recv().await;
        guest_rx.recv().await;

        // Claimed sender is ignored in favour of the connection's registration
        rv.handle(
            guest,
            SignalingMessage::Signal {
                target: EndpointId::from_raw("AB12CD-Romeo-1"),
                from: EndpointId::from_raw("spoofed"),
                signal: Signal::Candidate(IceCandidate::new("candidate:1")),
            },
        )
        .await;
        match host_rx.recv().await {
            Some(SignalingMessage::Signal { from, .. }) => {
                assert_eq!(from, EndpointId::from_raw("AB12CD-Juliet-2"))
            }
            other => panic!("expected relayed signal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_notifies_linked_peer() {
        let rv = Rendezvous::new();
        let (host, mut host_rx) = connection(&rv).await;
        let (guest, mut guest_rx) = connection(&rv).await;
        register(&rv, host, "AB12CD-Romeo-1", true).await;
        register(&rv, guest, "AB12CD-Juliet-2", false).await;
        host_rx.recv().await;
        guest_rx.recv().await;

        rv.handle(
            guest,
            SignalingMessage::Connect {
                target: EndpointId::from_raw("AB12CD-Romeo-1"),
                from: EndpointId::from_raw("AB12CD-Juliet-2"),
                name: "Juliet".into(),
            },
        )
        .await;
        assert!(matches!(host_rx.recv().await, Some(SignalingMessage::ConnectRequest { .. })));
        assert!(matches!(guest_rx.recv().await, Some(SignalingMessage::ConnectOk { .. })));

        rv.close_connection(host).await;
        assert_eq!(
            guest_rx.recv().await,
            Some(SignalingMessage::PeerLeft {
                endpoint_id: EndpointId::from_raw("AB12CD-Romeo-1")
            })
        );
        // Code is free again
        rv.handle(guest, SignalingMessage::Lookup { game_code: code() }).await;
        assert!(matches!(
            guest_rx.recv().await,
            Some(SignalingMessage::LookupResult { host: None, .. })
        ));
    }
}
