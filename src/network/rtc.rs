// str0m-backed peer transport and local candidate gathering
// The Rtc instance does no I/O itself; the runtime feeds it datagrams and timeouts.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};

use str0m::change::{SdpAnswer, SdpOffer, SdpPendingOffer};
use str0m::channel::{ChannelConfig, ChannelId, Reliability};
use str0m::net::{Protocol, Receive};
use str0m::{Candidate, Input, Output, Rtc};

use super::descriptor::IceCandidate;
use super::error::SessionError;
use super::negotiator::PeerTransport;

/// Label of the single game data channel
pub const GAME_CHANNEL: &str = "game";

pub struct RtcTransport {
    rtc: Rtc,
    local_addr: SocketAddr,
    channel: Option<ChannelId>,
    pending_offer: Option<SdpPendingOffer>,
}

impl RtcTransport {
    pub fn new(local_addr: SocketAddr) -> Self {
        let rtc = Rtc::builder()
            .set_rtp_mode(false) // Data channel only
            .build();
        Self {
            rtc,
            local_addr,
            channel: None,
            pending_offer: None,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register a gathered candidate with str0m and return it in exchange form
    pub fn add_local_candidate(&mut self, candidate: Candidate) -> Option<IceCandidate> {
        let text = candidate.to_sdp_string();
        self.rtc
            .add_local_candidate(candidate)
            .map(|_| IceCandidate::new(text))
    }

    pub fn poll_output(&mut self) -> Result<Output, SessionError> {
        self.rtc
            .poll_output()
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    pub fn handle_receive(
        &mut self,
        now: Instant,
        source: SocketAddr,
        datagram: &[u8],
    ) -> Result<(), SessionError> {
        let receive = Receive {
            proto: Protocol::Udp,
            source,
            destination: self.local_addr,
            contents: datagram
                .try_into()
                .map_err(|e| SessionError::Transport(format!("bad datagram: {:?}", e)))?,
        };
        self.rtc
            .handle_input(Input::Receive(now, receive))
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), SessionError> {
        self.rtc
            .handle_input(Input::Timeout(now))
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    /// Guest learns the channel id from ChannelOpen
    pub fn set_channel(&mut self, channel: ChannelId) {
        self.channel = Some(channel);
    }

    pub fn is_alive(&self) -> bool {
        self.rtc.is_alive()
    }
}

fn transport_err(e: impl std::fmt::Display) -> SessionError {
    SessionError::Transport(e.to_string())
}

impl PeerTransport for RtcTransport {
    fn create_offer(&mut self) -> Result<String, SessionError> {
        let mut change = self.rtc.sdp_api();
        let channel = change.add_channel_with_config(ChannelConfig {
            label: GAME_CHANNEL.to_string(),
            ordered: true,
            reliability: Reliability::Reliable,
            negotiated: None,
            protocol: String::new(),
        });
        let (offer, pending) = change
            .apply()
            .ok_or_else(|| SessionError::Transport("no changes to offer".into()))?;
        debug!("Created data channel {:?}", channel);
        self.channel = Some(channel);
        self.pending_offer = Some(pending);
        Ok(offer.to_sdp_string())
    }

    fn accept_offer(&mut self, sdp: &str) -> Result<String, SessionError> {
        let offer = SdpOffer::from_sdp_string(sdp).map_err(transport_err)?;
        let answer = self
            .rtc
            .sdp_api()
            .accept_offer(offer)
            .map_err(transport_err)?;
        Ok(answer.to_sdp_string())
    }

    fn accept_answer(&mut self, sdp: &str) -> Result<(), SessionError> {
        let pending = self
            .pending_offer
            .take()
            .ok_or_else(|| SessionError::Transport("no offer awaiting an answer".into()))?;
        let answer = SdpAnswer::from_sdp_string(sdp).map_err(transport_err)?;
        self.rtc
            .sdp_api()
            .accept_answer(pending, answer)
            .map_err(transport_err)
    }

    fn add_remote_candidate(&mut self, candidate: &IceCandidate) -> Result<(), SessionError> {
        let parsed = Candidate::from_sdp_string(&candidate.candidate).map_err(transport_err)?;
        self.rtc.add_remote_candidate(parsed);
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let cid = self
            .channel
            .ok_or_else(|| SessionError::Transport("data channel not open".into()))?;
        let mut channel = self
            .rtc
            .channel(cid)
            .ok_or_else(|| SessionError::TransportClosed("data channel gone".into()))?;
        channel.write(false, payload).map_err(transport_err)?;
        Ok(())
    }

    fn close(&mut self) {
        info!("Closing peer connection");
        self.channel = None;
        self.pending_offer = None;
        self.rtc.disconnect();
    }
}

/// Rank an interface address for LAN connectivity (lower is better)
///
/// With both a 10.x VPN and a 192.168.x home network present, the VPN wins so
/// STUN sees the path the traffic will actually take.
fn interface_score(ip: Ipv4Addr, has_vpn: bool, has_home_network: bool) -> u8 {
    let octets = ip.octets();
    if octets[0] == 10 {
        return if has_home_network { 0 } else { 2 };
    }
    if octets[0] == 192 && octets[1] == 168 {
        return if has_vpn { 1 } else { 0 };
    }
    if octets[0] == 172 && (16..=31).contains(&octets[1]) {
        return 1;
    }
    3
}

/// Pick the best non-loopback IPv4 interface
pub fn select_interface(interfaces: &[(String, IpAddr)]) -> Option<IpAddr> {
    let mut candidates: Vec<(&str, Ipv4Addr)> = interfaces
        .iter()
        .filter_map(|(name, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some((name.as_str(), *v4)),
            _ => None,
        })
        .collect();

    let has_vpn = candidates.iter().any(|(_, ip)| ip.octets()[0] == 10);
    let has_home_network = candidates
        .iter()
        .any(|(_, ip)| ip.octets()[0] == 192 && ip.octets()[1] == 168);

    candidates.sort_by_key(|(_, ip)| interface_score(*ip, has_vpn, has_home_network));
    candidates.first().map(|(name, ip)| {
        debug!("Selected interface {} ({})", name, ip);
        IpAddr::V4(*ip)
    })
}

/// Local address to bind the ICE socket to
pub fn discover_local_ip() -> Result<IpAddr> {
    let interfaces: Vec<(String, IpAddr)> = if_addrs::get_if_addrs()
        .map_err(|e| anyhow!("Failed to get network interfaces: {}", e))?
        .into_iter()
        .map(|iface| {
            let ip = iface.addr.ip();
            (iface.name, ip)
        })
        .collect();
    debug!("Found {} interfaces", interfaces.len());
    select_interface(&interfaces).ok_or_else(|| anyhow!("No suitable network interfaces found"))
}

/// Ask a STUN server for our public mapping
///
/// Must run on the ICE socket itself; a different socket gets a different NAT port.
pub async fn query_stun_server(socket: &UdpSocket, stun_server: &str) -> Result<SocketAddr> {
    let stun_addr = tokio::net::lookup_host(stun_server)
        .await?
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| anyhow!("Failed to resolve STUN server {} to IPv4", stun_server))?;
    debug!("STUN server resolved to {}", stun_addr);

    let socket = socket.try_clone()?;
    let client = stunclient::StunClient::new(stun_addr);
    let public_addr = tokio::task::spawn_blocking(move || {
        socket.set_read_timeout(Some(Duration::from_secs(5)))?;
        let result = client
            .query_external_address(&socket)
            .map_err(|e| anyhow!("STUN query failed: {}", e));
        socket.set_read_timeout(None)?;
        result
    })
    .await??;

    info!("Public address from STUN: {}", public_addr);
    Ok(public_addr)
}

/// Bind the ICE socket and gather host plus server-reflexive candidates
pub async fn gather(stun_server: Option<&str>) -> Result<(UdpSocket, RtcTransport, Vec<IceCandidate>)> {
    let local_ip = discover_local_ip().unwrap_or_else(|e| {
        warn!("{}; falling back to loopback", e);
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    });

    // Bound to the concrete address so str0m can match received packets
    let socket = UdpSocket::bind(SocketAddr::new(local_ip, 0))?;
    let host_addr = socket.local_addr()?;
    info!("Bound UDP socket: {}", host_addr);

    let mut transport = RtcTransport::new(host_addr);
    let mut candidates = Vec::new();

    let host = Candidate::host(host_addr, "udp").map_err(|e| anyhow!("host candidate: {}", e))?;
    candidates.extend(transport.add_local_candidate(host));

    if let Some(server) = stun_server.filter(|s| !s.is_empty()) {
        match query_stun_server(&socket, server).await {
            Ok(public_addr) => match Candidate::server_reflexive(public_addr, host_addr, "udp") {
                Ok(srflx) => candidates.extend(transport.add_local_candidate(srflx)),
                Err(e) => warn!("Failed to create server reflexive candidate: {}", e),
            },
            // Host candidate alone still works on a LAN
            Err(e) => warn!("STUN unavailable, using host candidate only: {}", e),
        }
    }

    Ok((socket, transport, candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Symbol;
    use crate::network::client::NetworkEvent;
    use crate::network::negotiator::{ExchangeStrategy, NegotiationState, NegotiationTimeouts, Role};
    use crate::network::protocol::PlayerInfo;
    use crate::network::session::{ManualRelay, Session};
    use crate::network::voice::NoMicrophone;
    use str0m::Event;

    fn iface(name: &str, ip: &str) -> (String, IpAddr) {
        (name.to_string(), ip.parse().unwrap())
    }

    #[test]
    fn test_home_network_preferred_without_vpn() {
        let picked = select_interface(&[
            iface("docker0", "172.17.0.1"),
            iface("wlan0", "192.168.1.20"),
            iface("lo", "127.0.0.1"),
        ]);
        assert_eq!(picked, Some("192.168.1.20".parse().unwrap()));
    }

    #[test]
    fn test_vpn_preferred_when_both_present() {
        let picked = select_interface(&[
            iface("wlan0", "192.168.1.20"),
            iface("utun3", "10.8.0.2"),
        ]);
        assert_eq!(picked, Some("10.8.0.2".parse().unwrap()));
    }

    #[test]
    fn test_loopback_and_ipv6_never_selected() {
        let picked = select_interface(&[iface("lo", "127.0.0.1"), iface("eth0", "fe80::1")]);
        assert_eq!(picked, None);
    }

    #[test]
    fn test_offer_carries_data_channel() {
        let addr: SocketAddr = "192.168.1.20:50000".parse().unwrap();
        let mut host = RtcTransport::new(addr);
        let host_candidate = host
            .add_local_candidate(Candidate::host(addr, "udp").unwrap())
            .expect("candidate accepted");
        assert!(host_candidate.candidate.starts_with("candidate:"));

        let offer = host.create_offer().unwrap();
        assert!(offer.starts_with("v=0"));
        assert!(offer.contains("webrtc-datachannel"));

        let mut guest = RtcTransport::new("192.168.1.21:50001".parse().unwrap());
        let answer = guest.accept_offer(&offer).unwrap();
        host.accept_answer(&answer).unwrap();
        guest.add_remote_candidate(&host_candidate).unwrap();
    }

    #[test]
    fn test_answer_without_offer_is_rejected() {
        let mut host = RtcTransport::new("192.168.1.20:50000".parse().unwrap());
        assert!(matches!(
            host.accept_answer("v=0\r\n"),
            Err(SessionError::Transport(_))
        ));
        assert!(host.send(b"{}").is_err());
    }

    /// A session over a real str0m transport with a simulated clock
    struct Peer {
        session: Session<RtcTransport>,
        clock: Instant,
        events: Vec<NetworkEvent>,
    }

    impl Peer {
        fn new(role: Role, name: &str, addr: SocketAddr) -> Self {
            let mut transport = RtcTransport::new(addr);
            let candidate = transport
                .add_local_candidate(Candidate::host(addr, "udp").unwrap())
                .expect("host candidate accepted");
            let mut session = Session::new(
                role,
                name,
                transport,
                Box::new(ManualRelay),
                Box::new(NoMicrophone),
                ExchangeStrategy::Manual,
                NegotiationTimeouts::default(),
                Instant::now(),
            );
            session.add_local_candidate(candidate);
            Self {
                session,
                clock: Instant::now(),
                events: Vec::new(),
            }
        }

        fn addr(&self) -> SocketAddr {
            self.session.negotiator().transport().local_addr()
        }

        fn collect(&mut self) {
            while let Some(event) = self.session.poll_event() {
                self.events.push(event);
            }
        }

        fn last_blob(&mut self) -> String {
            self.collect();
            self.events
                .iter()
                .rev()
                .find_map(|e| match e {
                    NetworkEvent::ManualBlob(b) => Some(b.clone()),
                    _ => None,
                })
                .expect("a manual blob was published")
        }

        fn players(&self) -> Vec<PlayerInfo> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    NetworkEvent::PlayerConnected(info) => Some(info.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    /// Run the side that is behind until str0m asks to be woken again
    fn progress(a: &mut Peer, b: &mut Peer) {
        let (from, to) = if a.clock <= b.clock { (a, b) } else { (b, a) };
        let to_addr = to.addr();
        from.session.transport_mut().handle_timeout(from.clock).unwrap();
        loop {
            match from.session.transport_mut().poll_output().unwrap() {
                Output::Transmit(transmit) => {
                    if transmit.destination == to_addr {
                        to.session
                            .transport_mut()
                            .handle_receive(from.clock, transmit.source, &transmit.contents)
                            .unwrap();
                    }
                }
                Output::Timeout(at) => {
                    let tick = from.clock + Duration::from_millis(10);
                    from.clock = if at <= from.clock { tick } else { tick.min(at) };
                    break;
                }
                Output::Event(Event::ChannelOpen(cid, _)) => {
                    from.session.transport_mut().set_channel(cid);
                    from.session.on_transport_open();
                }
                Output::Event(Event::ChannelData(data)) => from.session.handle_data(&data.data),
                Output::Event(_) => {}
            }
        }
        from.collect();
        to.collect();
    }

    #[test]
    fn test_manual_exchange_opens_str0m_channel() {
        let mut host = Peer::new(Role::Host, "Romeo", "127.0.0.1:40001".parse().unwrap());
        let mut guest = Peer::new(Role::Guest, "Juliet", "127.0.0.1:40002".parse().unwrap());
        let start = host.clock.max(guest.clock);
        host.clock = start;
        guest.clock = start;

        host.session.start(start).unwrap();
        let offer = host.last_blob();
        guest.session.apply_remote_text(&offer, start).unwrap();
        let answer = guest.last_blob();
        host.session.apply_remote_text(&answer, start).unwrap();
        assert_eq!(host.session.state(), NegotiationState::Negotiating);
        assert_eq!(guest.session.state(), NegotiationState::Negotiating);

        let give_up = start + Duration::from_secs(30);
        while host.players().is_empty() || guest.players().is_empty() {
            assert!(
                host.clock < give_up && guest.clock < give_up,
                "data channel never carried player info"
            );
            progress(&mut host, &mut guest);
        }

        // Keep the link running to catch a repeated announcement
        let settle = host.clock.max(guest.clock) + Duration::from_secs(1);
        while host.clock < settle || guest.clock < settle {
            progress(&mut host, &mut guest);
        }

        assert_eq!(host.session.state(), NegotiationState::Open);
        assert_eq!(guest.session.state(), NegotiationState::Open);
        assert_eq!(
            host.players(),
            vec![PlayerInfo {
                name: "Juliet".into(),
                symbol: Symbol::O
            }]
        );
        assert_eq!(
            guest.players(),
            vec![PlayerInfo {
                name: "Romeo".into(),
                symbol: Symbol::X
            }]
        );

        // A move crosses the real channel too
        host.session.send_move(4).unwrap();
        let deadline = host.clock.max(guest.clock) + Duration::from_secs(1);
        while guest.session.board().cells[4].is_none() {
            assert!(host.clock < deadline && guest.clock < deadline, "move never arrived");
            progress(&mut host, &mut guest);
        }
        assert_eq!(guest.session.board().cells[4], Some(Symbol::X));
    }
}
