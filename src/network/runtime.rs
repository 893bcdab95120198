// Session network thread
// A current-thread tokio runtime multiplexing the ICE socket, the broker
// connection, UI commands and the negotiation/str0m deadlines in one select loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::sync::mpsc as async_mpsc;
use tracing::{debug, error, info, warn};

use str0m::{Event, IceConnectionState, Output};

use crate::config::NetworkConfig;

use super::broker::{BrokerClient, BrokerEvent};
use super::client::{NetworkCommand, NetworkEvent, SessionMode};
use super::code::{EndpointId, GameCode};
use super::error::SessionError;
use super::microphone;
use super::negotiator::{ExchangeStrategy, NegotiationState, Role};
use super::rtc::{self, RtcTransport};
use super::session::{ManualRelay, Session, SignalRelay};

type RtcSession = Session<RtcTransport>;

/// Run one session on a background thread until it closes or fails
pub fn spawn_network_thread(
    mode: SessionMode,
    config: NetworkConfig,
    event_tx: mpsc::Sender<NetworkEvent>,
    cmd_rx: async_mpsc::UnboundedReceiver<NetworkCommand>,
    connected: Arc<AtomicBool>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("heartlink-net".to_string())
        .spawn(move || {
            info!("Network thread started");
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create tokio runtime: {}", e);
                    let _ = event_tx.send(NetworkEvent::Error(SessionError::Transport(e.to_string())));
                    return;
                }
            };

            let result = rt.block_on(run_session(
                mode,
                config,
                event_tx.clone(),
                cmd_rx,
                connected.clone(),
            ));
            if let Err(e) = result {
                error!("Network session error: {:#}", e);
                let _ = event_tx.send(NetworkEvent::Error(SessionError::Transport(e.to_string())));
            }
            connected.store(false, Ordering::Relaxed);
            info!("Network thread ending");
        })?;
    Ok(())
}

async fn run_session(
    mode: SessionMode,
    config: NetworkConfig,
    events: mpsc::Sender<NetworkEvent>,
    mut commands: async_mpsc::UnboundedReceiver<NetworkCommand>,
    connected: Arc<AtomicBool>,
) -> Result<()> {
    let name = mode.display_name().to_string();
    let (role, code) = match &mode {
        SessionMode::Host { .. } => (Role::Host, Some(GameCode::generate())),
        SessionMode::Join { code, .. } => match GameCode::parse(code) {
            Ok(code) => (Role::Guest, Some(code)),
            Err(e) => {
                let _ = events.send(NetworkEvent::Error(e));
                return Ok(());
            }
        },
        SessionMode::JoinManual { .. } => (Role::Guest, None),
    };
    if let (Role::Host, Some(code)) = (role, &code) {
        info!("Hosting game {}", code);
        let _ = events.send(NetworkEvent::GameCode(code.clone()));
    }

    let (std_socket, transport, local_candidates) = rtc::gather(Some(config.stun_server.as_str())).await?;
    std_socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(std_socket)?;

    let mut broker: Option<BrokerClient> = None;
    let mut relay: Box<dyn SignalRelay> = Box::new(ManualRelay);
    let mut host_endpoint: Option<EndpointId> = None;
    if let Some(code) = &code {
        match setup_broker(&config, code, &name, role).await {
            Ok((client, endpoint, peer)) => {
                let _ = events.send(NetworkEvent::EndpointRegistered(endpoint));
                relay = Box::new(client.relay_handle(peer.clone()));
                host_endpoint = peer;
                broker = Some(client);
            }
            Err(e @ SessionError::BrokerUnavailable(_)) => {
                warn!("Broker unavailable, switching to manual exchange: {}", e);
                let _ = events.send(NetworkEvent::BrokerFallback(e));
            }
            Err(e) => {
                let _ = events.send(NetworkEvent::Error(e));
                return Ok(());
            }
        }
    }

    let strategy = if broker.is_some() {
        ExchangeStrategy::Broker
    } else {
        ExchangeStrategy::Manual
    };
    let now = Instant::now();
    let mut session = Session::new(
        role,
        &name,
        transport,
        relay,
        microphone::default_microphone(config.voice_enabled),
        strategy,
        config.timeouts(),
        now,
    );
    if let Some(host) = host_endpoint {
        session.attach_peer(host, now);
    }
    for candidate in local_candidates {
        session.add_local_candidate(candidate);
    }
    if let Err(e) = session.start(now) {
        debug!("Session start failed: {}", e);
    }
    if let SessionMode::JoinManual { offer, .. } = &mode {
        apply_blob(&mut session, offer, &events);
    }

    let mut buf = vec![0u8; 2000];
    loop {
        let rtc_deadline = drive_rtc(&mut session, &socket);
        if !forward_events(&mut session, &events, &connected) {
            session.leave();
        }
        if session.is_finished() {
            forward_events(&mut session, &events, &connected);
            break;
        }

        let wake = [rtc_deadline, session.poll_timeout()]
            .into_iter()
            .flatten()
            .min()
            .map(tokio::time::Instant::from_std);

        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, source)) => {
                    if let Err(e) = session
                        .transport_mut()
                        .handle_receive(Instant::now(), source, &buf[..n])
                    {
                        warn!("Dropping datagram from {}: {}", source, e);
                    }
                }
                // ICMP unreachable surfaces here on some platforms; ICE copes
                Err(e) => debug!("UDP receive error: {}", e),
            },
            event = next_broker_event(&mut broker) => {
                handle_broker_event(&mut session, &mut broker, event, &events);
            }
            cmd = commands.recv() => match cmd {
                Some(cmd) => handle_command(&mut session, cmd, &events),
                None => session.leave(),
            },
            _ = sleep_until_deadline(wake) => {
                let now = Instant::now();
                session.handle_timeout(now);
                if let Err(e) = session.transport_mut().handle_timeout(now) {
                    warn!("str0m timeout handling failed: {}", e);
                }
            }
        }
    }

    if let Some(mut client) = broker.take() {
        client.teardown();
    }
    connected.store(false, Ordering::Relaxed);
    info!("Session ended in state {}", session.state());
    Ok(())
}

/// Connect, register, and for guests find and contact the host
async fn setup_broker(
    config: &NetworkConfig,
    code: &GameCode,
    name: &str,
    role: Role,
) -> Result<(BrokerClient, EndpointId, Option<EndpointId>), SessionError> {
    let mut client =
        BrokerClient::connect_ws(&config.signaling_server, config.broker_connect_timeout()).await?;
    let endpoint = client.register(code, name, role == Role::Host).await?;

    let peer = match role {
        Role::Host => None,
        Role::Guest => {
            let host = client
                .lookup_host(code)
                .await?
                .ok_or_else(|| SessionError::PeerUnreachable(format!("no game with code {}", code)))?;
            client.connect(&host, name).await?;
            Some(host)
        }
    };
    Ok((client, endpoint, peer))
}

async fn next_broker_event(broker: &mut Option<BrokerClient>) -> Option<BrokerEvent> {
    match broker {
        Some(client) => client.next_event().await,
        None => std::future::pending().await,
    }
}

/// With nothing armed the loop waits on socket, broker or UI input alone
async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn handle_broker_event(
    session: &mut RtcSession,
    broker: &mut Option<BrokerClient>,
    event: Option<BrokerEvent>,
    events: &mpsc::Sender<NetworkEvent>,
) {
    let now = Instant::now();
    let Some(event) = event else {
        warn!("Lost connection to the signaling server");
        *broker = None;
        let state = session.state();
        if state != NegotiationState::Open && !state.is_terminal() {
            session.fall_back_to_manual(now);
            let _ = events.send(NetworkEvent::BrokerFallback(SessionError::BrokerUnavailable(
                "connection lost".into(),
            )));
        }
        return;
    };

    match event {
        BrokerEvent::ConnectionRequest { from, name } => {
            if session.role() != Role::Host {
                debug!("Ignoring connection request from {} as guest", from);
            } else if session.has_peer() {
                info!("Turning away {} ({}): game already has a guest", from, name);
                if let Some(client) = broker.as_ref() {
                    if let Err(e) = client.reject(&from, "game is full") {
                        warn!("Failed to reject {}: {}", from, e);
                    }
                }
            } else {
                info!("{} wants to join as {}", name, from);
                session.attach_peer(from, now);
            }
        }
        BrokerEvent::Signal { from, signal } => {
            if session.peer() != Some(&from) {
                debug!("Ignoring signal from unrelated endpoint {}", from);
                return;
            }
            session.handle_signal(signal, now);
        }
        BrokerEvent::PeerLeft { endpoint_id } => {
            // After open the data channel no longer depends on the broker
            if session.peer() == Some(&endpoint_id) && session.state() != NegotiationState::Open {
                session.on_transport_closed("peer left before connecting");
            }
        }
    }
}

fn handle_command(session: &mut RtcSession, cmd: NetworkCommand, events: &mpsc::Sender<NetworkEvent>) {
    let result = match cmd {
        NetworkCommand::SendMove(position) => session.send_move(position),
        NetworkCommand::SendRestart => session.send_restart(),
        NetworkCommand::SetMuted(muted) => {
            session.set_muted(muted);
            Ok(())
        }
        NetworkCommand::ApplyRemoteBlob(text) => {
            apply_blob(session, &text, events);
            Ok(())
        }
        NetworkCommand::Leave => {
            session.leave();
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!("Command failed: {}", e);
        let _ = events.send(NetworkEvent::Error(e));
    }
}

/// Apply pasted text; a terminal failure is reported by the session itself
fn apply_blob(session: &mut RtcSession, text: &str, events: &mpsc::Sender<NetworkEvent>) {
    if let Err(e) = session.apply_remote_text(text, Instant::now()) {
        if !session.state().is_terminal() {
            warn!("Pasted text rejected: {}", e);
            let _ = events.send(NetworkEvent::Error(e));
        }
    }
}

/// Drain str0m outputs; returns str0m's next deadline
fn drive_rtc(session: &mut RtcSession, socket: &UdpSocket) -> Option<Instant> {
    loop {
        if !session.transport_mut().is_alive() {
            return None;
        }
        let output = match session.transport_mut().poll_output() {
            Ok(output) => output,
            Err(e) => {
                warn!("str0m failed: {}", e);
                session.on_transport_closed(&e.to_string());
                return None;
            }
        };
        match output {
            Output::Transmit(transmit) => {
                if let Err(e) = socket.try_send_to(&transmit.contents, transmit.destination) {
                    debug!("UDP send to {} failed: {}", transmit.destination, e);
                }
            }
            Output::Timeout(deadline) => return Some(deadline),
            Output::Event(event) => handle_rtc_event(session, event),
        }
    }
}

fn handle_rtc_event(session: &mut RtcSession, event: Event) {
    match event {
        Event::Connected => info!("WebRTC connection established (ICE + DTLS)"),
        Event::IceConnectionStateChange(state) => {
            debug!("ICE state: {:?}", state);
            if matches!(state, IceConnectionState::Disconnected) {
                session.on_transport_closed("ICE connection lost");
            }
        }
        Event::ChannelOpen(cid, label) => {
            info!("Data channel opened: {}", label);
            session.transport_mut().set_channel(cid);
            session.on_transport_open();
        }
        Event::ChannelData(data) => session.handle_data(&data.data),
        Event::ChannelClose(_) => session.on_transport_closed("data channel closed"),
        _ => {}
    }
}

/// Push session events to the UI; false once the UI has gone away
fn forward_events(
    session: &mut RtcSession,
    events: &mpsc::Sender<NetworkEvent>,
    connected: &AtomicBool,
) -> bool {
    let mut ui_alive = true;
    while let Some(event) = session.poll_event() {
        if let NetworkEvent::StateChanged(state) = &event {
            connected.store(*state == NegotiationState::Open, Ordering::Relaxed);
        }
        if events.send(event).is_err() {
            ui_alive = false;
        }
    }
    ui_alive
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_deadline_never_wakes_the_loop() {
        let waited = tokio::time::timeout(Duration::from_millis(50), sleep_until_deadline(None)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_armed_deadline_wakes_the_loop() {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(5);
        let waited = tokio::time::timeout(
            Duration::from_secs(5),
            sleep_until_deadline(Some(deadline)),
        )
        .await;
        assert!(waited.is_ok());
    }
}
