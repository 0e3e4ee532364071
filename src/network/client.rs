use std::error::Error;
use std::time::Duration;

use futures::StreamExt;
use libp2p::gossipsub;
use libp2p::identify;
use libp2p::kad;
use libp2p::mdns;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{Config as SwarmConfig, DialError, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm, identity};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval};

use crate::common::{ChatError, NetworkCommand, NetworkEvent};
use crate::config::AppConfig;
use crate::store::DistributedStore;

use super::behavior::{ChatBehavior, ChatBehaviorEvent, build_behavior};
use super::discovery::{DialOutcome, DialRequest, DiscoveryBridge, DiscoverySource};
use super::peers::short_id;
use super::room::RoomChannel;
use super::transport::build_transport;

const RETRY_TICK: Duration = Duration::from_millis(250);

/// Owns the swarm. All gossip, DHT and discovery traffic is handled on
/// this task; the rest of the app talks to it through
/// [`NetworkHandle`](super::NetworkHandle).
pub struct P2PClient {
    swarm: Swarm<ChatBehavior>,
    local_peer_id: PeerId,
    event_sender: mpsc::UnboundedSender<NetworkEvent>,
    command_receiver: mpsc::Receiver<NetworkCommand>,
    bootstrap_peers: Vec<(PeerId, Multiaddr)>,
    rooms: RoomChannel,
    discovery: DiscoveryBridge,
    store: DistributedStore,
}

impl P2PClient {
    /// Builds the swarm, starts listening and initialises the store.
    /// Any failure here is fatal for the process.
    pub fn new(
        config: &AppConfig,
        nick: Option<String>,
        bootstrap_peers: Vec<(PeerId, Multiaddr)>,
        event_sender: mpsc::UnboundedSender<NetworkEvent>,
        command_receiver: mpsc::Receiver<NetworkCommand>,
    ) -> Result<Self, Box<dyn Error>> {
        let local_key = identity::Keypair::generate_ed25519();
        let local_peer_id = PeerId::from(local_key.public());
        log::info!("Local PeerID: {local_peer_id:?}");

        let transport = build_transport(&local_key, config.dial_timeout())?;
        let behavior = build_behavior(&local_key, local_peer_id, config.enable_mdns)?;

        let mut swarm = Swarm::new(
            transport,
            behavior,
            local_peer_id,
            SwarmConfig::with_tokio_executor().with_idle_connection_timeout(Duration::from_secs(60)),
        );

        swarm.listen_on(config.listen_addr.parse()?)?;

        let store = DistributedStore::init(config.validator.build())?;
        let nick = nick.unwrap_or_else(|| default_nick(&local_peer_id));

        Ok(Self {
            swarm,
            local_peer_id,
            event_sender,
            command_receiver,
            bootstrap_peers,
            rooms: RoomChannel::new(local_peer_id, nick),
            discovery: DiscoveryBridge::new(config.retry_policy()),
            store,
        })
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn nick(&self) -> &str {
        self.rooms.nick()
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.bootstrap();
        log::info!("Network event loop started");

        let mut retry_tick = interval(RETRY_TICK);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                _ = retry_tick.tick() => {
                    for request in self.discovery.due_retries(Instant::now()) {
                        self.dial(request);
                    }
                }
            }
        }
        log::info!("Network event loop stopped");
    }

    fn bootstrap(&mut self) {
        if self.bootstrap_peers.is_empty() {
            log::warn!("No bootstrap peers configured; relying on mDNS discovery");
            return;
        }
        for (peer_id, addr) in self.bootstrap_peers.clone() {
            log::info!("Adding bootstrap peer {peer_id} at {addr}");
            self.swarm
                .behaviour_mut()
                .kad
                .add_address(&peer_id, addr.clone());
            if let Some(request) = self
                .discovery
                .on_peer_found(peer_id, vec![addr], DiscoverySource::Bootstrap)
            {
                self.dial(request);
            }
        }
        if let Err(err) = self.swarm.behaviour_mut().kad.bootstrap() {
            log::warn!("Failed to trigger Kademlia bootstrap: {err}");
        }
    }

    fn dial(&mut self, request: DialRequest) {
        let DialRequest {
            peer_id,
            addresses,
            attempt,
        } = request;
        log::debug!("Dialing {peer_id} (attempt {attempt}, {} addrs)", addresses.len());
        let opts = DialOpts::peer_id(peer_id)
            .addresses(addresses)
            .condition(PeerCondition::DisconnectedAndNotDialing)
            .build();
        match self.swarm.dial(opts) {
            Ok(()) => {}
            Err(DialError::DialPeerConditionFalse(_)) => {}
            Err(err) => {
                log::warn!("Failed to dial {peer_id}: {err}");
                self.on_dial_failed(peer_id);
            }
        }
    }

    fn on_dial_failed(&mut self, peer_id: PeerId) {
        match self.discovery.on_dial_failed(&peer_id, Instant::now()) {
            DialOutcome::RetryAt(at) => {
                log::debug!(
                    "Retrying {peer_id} in {:?}",
                    at.saturating_duration_since(Instant::now())
                );
            }
            DialOutcome::GaveUp { attempts } => {
                log::warn!("Dropped peer {peer_id} after {attempts} failed dials");
            }
            DialOutcome::Untracked => {}
        }
    }

    fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::JoinRoom { name, reply } => {
                let gossipsub = &mut self.swarm.behaviour_mut().gossipsub;
                let _ = reply.send(self.rooms.join(gossipsub, &name));
            }
            NetworkCommand::Publish { room, text, reply } => {
                let gossipsub = &mut self.swarm.behaviour_mut().gossipsub;
                let result = self.rooms.publish(gossipsub, &room, &text);
                if let Err(err) = &result {
                    log::warn!("Publish error: {err}");
                }
                let _ = reply.send(result);
            }
            NetworkCommand::PublishOpinion { room, record, reply } => {
                let gossipsub = &mut self.swarm.behaviour_mut().gossipsub;
                let result = self.rooms.publish_opinion(gossipsub, &room, &record);
                if let Err(err) = &result {
                    log::warn!("Publish opinion error: {err}");
                }
                let _ = reply.send(result);
            }
            NetworkCommand::ConnectToPeer { address, reply } => {
                let _ = reply.send(self.connect(address));
            }
            NetworkCommand::PutRecord { key, value, reply } => {
                let kad = &mut self.swarm.behaviour_mut().kad;
                self.store.put(kad, key, value, reply);
            }
            NetworkCommand::GetRecord { key, reply } => {
                let kad = &mut self.swarm.behaviour_mut().kad;
                self.store.get(kad, key, reply);
            }
        }
    }

    fn connect(&mut self, address: Multiaddr) -> Result<(), ChatError> {
        log::info!("Attempting to connect to peer at {address}");
        match address.iter().last() {
            Some(Protocol::P2p(peer_id)) => {
                self.swarm
                    .behaviour_mut()
                    .kad
                    .add_address(&peer_id, address.clone());
                if let Some(request) =
                    self.discovery
                        .on_peer_found(peer_id, vec![address], DiscoverySource::Manual)
                {
                    self.dial(request);
                }
                Ok(())
            }
            _ => self
                .swarm
                .dial(address)
                .map_err(|err| ChatError::Transport(format!("dial failed: {err}"))),
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<ChatBehaviorEvent>) {
        match event {
            SwarmEvent::Behaviour(ChatBehaviorEvent::Gossipsub(event)) => {
                self.handle_gossipsub_event(event);
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Kad(event)) => {
                self.handle_kad_event(event);
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Mdns(mdns::Event::Discovered(list))) => {
                for (peer_id, addr) in list {
                    self.swarm
                        .behaviour_mut()
                        .kad
                        .add_address(&peer_id, addr.clone());
                    if let Some(request) =
                        self.discovery
                            .on_peer_found(peer_id, vec![addr], DiscoverySource::Mdns)
                    {
                        self.dial(request);
                    }
                }
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Mdns(mdns::Event::Expired(list))) => {
                for (peer_id, _) in list {
                    log::debug!("mDNS record expired for {peer_id}");
                }
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Identify(event)) => {
                self.handle_identify_event(event);
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                let full_addr = address.with(Protocol::P2p(self.local_peer_id));
                log::info!("Listening on {full_addr}");
                self.emit(NetworkEvent::Listening(full_addr));
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                if self.discovery.on_connected(peer_id) {
                    log::info!("Connected to {}", short_id(&peer_id));
                    self.emit(NetworkEvent::PeerConnected(peer_id));
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    self.discovery.on_disconnected(&peer_id);
                    log::info!("Disconnected from {}", short_id(&peer_id));
                    self.emit(NetworkEvent::PeerDisconnected(peer_id));
                }
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                log::warn!("Outgoing connection error to {peer_id}: {error}");
                if !self.swarm.is_connected(&peer_id) {
                    self.on_dial_failed(peer_id);
                }
            }
            _ => {}
        }
    }

    fn handle_gossipsub_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message { message, .. } => {
                match self.rooms.receive(message.source, &message.topic, &message.data) {
                    Ok(Some((room, message))) => {
                        self.emit(NetworkEvent::MessageReceived { room, message });
                    }
                    Ok(None) => {}
                    Err(err) => log::warn!("Dropping gossip message: {err}"),
                }
            }
            gossipsub::Event::Subscribed { peer_id, topic } => {
                if let Some(room) = self.rooms.room_for(&topic).map(str::to_string) {
                    self.emit(NetworkEvent::PeerJoinedRoom { peer_id, room });
                }
            }
            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                if let Some(room) = self.rooms.room_for(&topic).map(str::to_string) {
                    self.emit(NetworkEvent::PeerLeftRoom { peer_id, room });
                }
            }
            _ => {}
        }
    }

    fn handle_kad_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::OutboundQueryProgressed {
                id, result, step, ..
            } => match result {
                kad::QueryResult::Bootstrap(res) => match res {
                    Ok(kad::BootstrapOk { num_remaining, .. }) => {
                        log::info!("Kademlia bootstrap ok, remaining peers: {num_remaining}");
                    }
                    Err(err) => {
                        log::warn!("Kademlia bootstrap error: {err:?}");
                    }
                },
                other => {
                    let kad = &mut self.swarm.behaviour_mut().kad;
                    self.store.on_query_progressed(kad, id, other, step);
                }
            },
            kad::Event::InboundRequest {
                request:
                    kad::InboundRequest::PutRecord {
                        source,
                        record: Some(record),
                        ..
                    },
            } => {
                log::debug!("Replication request from {source}");
                let kad = &mut self.swarm.behaviour_mut().kad;
                self.store.on_inbound_put(kad, record);
            }
            kad::Event::RoutingUpdated {
                peer, addresses, ..
            } => {
                log::debug!("Kademlia routing table updated for {peer} (addresses: {addresses:?})");
                if peer == self.local_peer_id {
                    return;
                }
                if let Some(request) =
                    self.discovery
                        .on_peer_found(peer, addresses.into_vec(), DiscoverySource::Dht)
                {
                    self.dial(request);
                }
            }
            kad::Event::RoutablePeer { peer, address }
            | kad::Event::PendingRoutablePeer { peer, address } => {
                if let Some(request) =
                    self.discovery
                        .on_peer_found(peer, vec![address], DiscoverySource::Dht)
                {
                    self.dial(request);
                }
            }
            _ => {}
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        if let identify::Event::Received { peer_id, info, .. } = event {
            log::debug!(
                "Identify info from {peer_id}: protocols={:?}",
                info.protocols
            );
            for addr in info.listen_addrs {
                self.swarm.behaviour_mut().kad.add_address(&peer_id, addr);
            }
        }
    }

    /// Never waits: the swarm must keep being polled while the dispatch
    /// loop is busy.
    fn emit(&self, event: NetworkEvent) {
        if let Err(err) = self.event_sender.send(event) {
            log::warn!("Dispatch loop is gone, dropping event: {err}");
        }
    }
}

/// `$USER-<short id>`, or just the short id when `USER` is unset.
pub fn default_nick(peer_id: &PeerId) -> String {
    let short = short_id(peer_id);
    match std::env::var("USER") {
        Ok(user) if !user.is_empty() => format!("{user}-{short}"),
        _ => short,
    }
}
