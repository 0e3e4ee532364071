use libp2p::Multiaddr;
use tokio::sync::{mpsc, oneshot};

use crate::common::{ChatError, NetworkCommand, Reply};
use crate::opinion::OpinionRecord;

use super::room::RoomHandle;

/// Cloneable front end of the network task.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    commands: mpsc::Sender<NetworkCommand>,
}

impl NetworkHandle {
    pub fn new(commands: mpsc::Sender<NetworkCommand>) -> Self {
        Self { commands }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> NetworkCommand) -> Result<T, ChatError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| ChatError::NetworkUnavailable)?;
        rx.await.map_err(|_| ChatError::NetworkUnavailable)?
    }

    pub async fn join_room(&self, name: &str) -> Result<RoomHandle, ChatError> {
        let name = name.to_string();
        self.request(|reply| NetworkCommand::JoinRoom { name, reply }).await
    }

    pub async fn publish(&self, room: &RoomHandle, text: String) -> Result<(), ChatError> {
        let room = room.clone();
        self.request(|reply| NetworkCommand::Publish { room, text, reply })
            .await
    }

    pub async fn publish_opinion(&self, room: &RoomHandle, record: OpinionRecord) -> Result<(), ChatError> {
        let room = room.clone();
        self.request(|reply| NetworkCommand::PublishOpinion { room, record, reply })
            .await
    }

    pub async fn connect(&self, address: Multiaddr) -> Result<(), ChatError> {
        self.request(|reply| NetworkCommand::ConnectToPeer { address, reply })
            .await
    }

    pub async fn put_record(&self, key: String, value: Vec<u8>) -> Result<(), ChatError> {
        self.request(|reply| NetworkCommand::PutRecord { key, value, reply })
            .await
    }

    pub async fn get_record(&self, key: String) -> Result<Option<Vec<u8>>, ChatError> {
        self.request(|reply| NetworkCommand::GetRecord { key, reply })
            .await
    }
}
