use std::collections::hash_map::DefaultHasher;
use std::error::Error;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use libp2p::gossipsub;
use libp2p::identify;
use libp2p::kad::{self, Mode as KadMode, store::MemoryStore};
use libp2p::mdns;
use libp2p::swarm::NetworkBehaviour;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::{PeerId, StreamProtocol, identity};

const KAD_PROTOCOL: StreamProtocol = StreamProtocol::new("/stock-opinions/kad/1.0.0");
const IDENTIFY_PROTOCOL: &str = "/stock-opinions/1.0.0";

#[derive(NetworkBehaviour)]
pub struct ChatBehavior {
    pub gossipsub: gossipsub::Behaviour,
    pub kad: kad::Behaviour<MemoryStore>,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub identify: identify::Behaviour,
}

/// Kademlia in server mode. Inbound records are only stored after
/// validation (see `DistributedStore::on_inbound_put`).
pub fn build_kad(local_peer_id: PeerId) -> kad::Behaviour<MemoryStore> {
    let mut kad_config = kad::Config::new(KAD_PROTOCOL);
    kad_config.set_record_filtering(kad::StoreInserts::FilterBoth);
    let store = MemoryStore::new(local_peer_id);
    let mut kad = kad::Behaviour::with_config(local_peer_id, store, kad_config);
    kad.set_mode(Some(KadMode::Server));
    kad
}

pub fn build_behavior(
    local_key: &identity::Keypair,
    local_peer_id: PeerId,
    enable_mdns: bool,
) -> Result<ChatBehavior, Box<dyn Error>> {
    // Envelopes carry a send timestamp, so identical lines still hash apart.
    let message_id_fn = |message: &gossipsub::Message| {
        let mut hasher = DefaultHasher::new();
        message.source.hash(&mut hasher);
        message.data.hash(&mut hasher);
        gossipsub::MessageId::from(hex::encode(hasher.finish().to_be_bytes()))
    };

    let gossipsub_config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(Duration::from_secs(10))
        .validation_mode(gossipsub::ValidationMode::Strict)
        .message_id_fn(message_id_fn)
        .build()?;

    let gossipsub = gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(local_key.clone()),
        gossipsub_config,
    )?;

    let kad = build_kad(local_peer_id);

    let mdns = if enable_mdns {
        Some(mdns::tokio::Behaviour::new(mdns::Config::default(), local_peer_id)?)
    } else {
        log::info!("mDNS discovery disabled");
        None
    };

    let identify_config =
        identify::Config::new(IDENTIFY_PROTOCOL.into(), local_key.public());
    let identify = identify::Behaviour::new(identify_config);

    Ok(ChatBehavior {
        gossipsub,
        kad,
        mdns: Toggle::from(mdns),
        identify,
    })
}
