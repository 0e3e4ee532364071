use libp2p::Multiaddr;
use tokio::sync::oneshot;

use crate::network::RoomHandle;
use crate::opinion::OpinionRecord;

use super::ChatError;

pub type Reply<T> = oneshot::Sender<Result<T, ChatError>>;

/// Lệnh gửi xuống tầng mạng. Every command carries its own reply channel.
#[derive(Debug)]
pub enum NetworkCommand {
    JoinRoom {
        name: String,
        reply: Reply<RoomHandle>,
    },
    Publish {
        room: RoomHandle,
        text: String,
        reply: Reply<()>,
    },
    PublishOpinion {
        room: RoomHandle,
        record: OpinionRecord,
        reply: Reply<()>,
    },
    /// Dial a peer manually by address
    /// - address: Multiaddr của peer (ví dụ: /ip4/192.168.1.1/tcp/9000/p2p/12D3KooW...)
    ConnectToPeer {
        address: Multiaddr,
        reply: Reply<()>,
    },
    PutRecord {
        key: String,
        value: Vec<u8>,
        reply: Reply<()>,
    },
    /// `Ok(None)` means no record exists for the key.
    GetRecord {
        key: String,
        reply: Reply<Option<Vec<u8>>>,
    },
}
