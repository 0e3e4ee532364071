use std::collections::HashMap;

use chrono::Utc;
use libp2p::PeerId;
use libp2p::gossipsub::{self, IdentTopic, TopicHash};

use crate::common::{ChatError, ChatMessage};
use crate::opinion::OpinionRecord;

const TOPIC_PREFIX: &str = "chat-room:";

/// The slice of a gossip transport the room channel needs.
pub trait BroadcastTransport {
    fn subscribe(&mut self, topic: &IdentTopic) -> Result<(), ChatError>;

    /// Whether any connected peer is subscribed to `topic`.
    fn has_route(&self, topic: &IdentTopic) -> bool;

    fn publish(&mut self, topic: &IdentTopic, data: Vec<u8>) -> Result<(), ChatError>;
}

impl BroadcastTransport for gossipsub::Behaviour {
    fn subscribe(&mut self, topic: &IdentTopic) -> Result<(), ChatError> {
        gossipsub::Behaviour::subscribe(self, topic)
            .map(|_| ())
            .map_err(|err| ChatError::Transport(format!("subscribe {topic}: {err:?}")))
    }

    fn has_route(&self, topic: &IdentTopic) -> bool {
        let hash = topic.hash();
        self.all_peers()
            .any(|(_, topics)| topics.iter().any(|t| **t == hash))
    }

    fn publish(&mut self, topic: &IdentTopic, data: Vec<u8>) -> Result<(), ChatError> {
        gossipsub::Behaviour::publish(self, topic.clone(), data)
            .map(|_| ())
            .map_err(|err| ChatError::Transport(format!("publish to {topic}: {err:?}")))
    }
}

/// Handle to a joined room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomHandle {
    pub name: String,
    pub nick: String,
    pub local_peer_id: PeerId,
    topic: String,
}

impl RoomHandle {
    pub fn new(name: &str, nick: &str, local_peer_id: PeerId) -> Self {
        Self {
            name: name.to_string(),
            nick: nick.to_string(),
            local_peer_id,
            topic: format!("{TOPIC_PREFIX}{name}"),
        }
    }

    pub fn topic(&self) -> IdentTopic {
        IdentTopic::new(self.topic.clone())
    }
}

/// Named broadcast scopes over the gossip transport.
pub struct RoomChannel {
    local_peer_id: PeerId,
    nick: String,
    joined: HashMap<TopicHash, String>,
}

impl RoomChannel {
    pub fn new(local_peer_id: PeerId, nick: String) -> Self {
        Self {
            local_peer_id,
            nick,
            joined: HashMap::new(),
        }
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Subscribes to the room topic. Joining twice returns the same handle.
    pub fn join<T: BroadcastTransport>(&mut self, transport: &mut T, name: &str) -> Result<RoomHandle, ChatError> {
        let handle = RoomHandle::new(name, &self.nick, self.local_peer_id);
        let topic = handle.topic();
        if !self.joined.contains_key(&topic.hash()) {
            transport.subscribe(&topic)?;
            self.joined.insert(topic.hash(), name.to_string());
            log::info!("Joined room {name} ({})", handle.topic);
        }
        Ok(handle)
    }

    /// Publishes a plain text line. An empty line never reaches the transport.
    pub fn publish<T: BroadcastTransport>(&self, transport: &mut T, room: &RoomHandle, text: &str) -> Result<(), ChatError> {
        if text.is_empty() {
            log::debug!("Ignoring empty publish to {}", room.name);
            return Ok(());
        }
        let message = ChatMessage::text(
            self.local_peer_id.to_string(),
            self.nick.clone(),
            text.to_string(),
            Utc::now().timestamp_millis(),
        );
        self.send(transport, room, &message)
    }

    pub fn publish_opinion<T: BroadcastTransport>(
        &self,
        transport: &mut T,
        room: &RoomHandle,
        record: &OpinionRecord,
    ) -> Result<(), ChatError> {
        let message = ChatMessage::opinion(
            self.local_peer_id.to_string(),
            self.nick.clone(),
            record.to_payload()?,
            Utc::now().timestamp_millis(),
        );
        self.send(transport, room, &message)
    }

    fn send<T: BroadcastTransport>(&self, transport: &mut T, room: &RoomHandle, message: &ChatMessage) -> Result<(), ChatError> {
        let topic = room.topic();
        if !transport.has_route(&topic) {
            return Err(ChatError::NotConnected(room.name.clone()));
        }
        let bytes = serde_json::to_vec(message).map_err(|err| ChatError::Transport(err.to_string()))?;
        transport.publish(&topic, bytes)
    }

    /// Decodes an inbound delivery.
    ///
    /// `Ok(None)` for traffic that is not ours to show: unknown topics and
    /// our own messages. The sender id is always the verified `source`.
    pub fn receive(
        &self,
        source: Option<PeerId>,
        topic: &TopicHash,
        data: &[u8],
    ) -> Result<Option<(String, ChatMessage)>, ChatError> {
        let Some(room) = self.joined.get(topic) else {
            log::warn!("Dropping message for unjoined topic {topic}");
            return Ok(None);
        };
        let Some(source) = source else {
            return Err(ChatError::Transport("message without verified source".into()));
        };
        if source == self.local_peer_id {
            return Ok(None);
        }
        let mut message: ChatMessage =
            serde_json::from_slice(data).map_err(|err| ChatError::MalformedPayload(format!("envelope: {err}")))?;
        let verified = source.to_string();
        if message.sender_id != verified {
            log::warn!(
                "Envelope claims sender {} but was signed by {verified}",
                message.sender_id
            );
            message.sender_id = verified;
        }
        Ok(Some((room.clone(), message)))
    }

    pub fn room_for(&self, topic: &TopicHash) -> Option<&str> {
        self.joined.get(topic).map(String::as_str)
    }
}
