pub mod commands;
pub mod error;
pub mod events;
pub mod types;

pub use commands::{NetworkCommand, Reply};
pub use error::ChatError;
pub use events::NetworkEvent;
pub use types::{ChatMessage, MessageBody};
