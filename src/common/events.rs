use libp2p::{Multiaddr, PeerId};

use super::types::ChatMessage;

/// Sự kiện từ tầng mạng gửi lên dispatch loop.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    MessageReceived { room: String, message: ChatMessage },
    PeerConnected(PeerId),
    /// The last connection to the peer closed.
    PeerDisconnected(PeerId),
    PeerJoinedRoom { peer_id: PeerId, room: String },
    PeerLeftRoom { peer_id: PeerId, room: String },
    Listening(Multiaddr),
}
