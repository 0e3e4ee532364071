pub mod behavior;
pub mod client;
pub mod discovery;
pub mod handle;
pub mod peers;
pub mod room;
pub mod transport;

pub use client::P2PClient;
pub use handle::NetworkHandle;
pub use peers::{PeerDirectory, short_id};
pub use room::RoomHandle;
