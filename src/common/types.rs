use serde::{Deserialize, Serialize};

/// Envelope gửi qua gossipsub cho mỗi tin nhắn trong phòng.
///
/// When `is_opinion` is set, `payload` holds a serialized
/// [`OpinionRecord`](crate::opinion::OpinionRecord).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "senderID")]
    pub sender_id: String,
    #[serde(rename = "senderNick")]
    pub sender_nick: String,
    pub payload: String,
    #[serde(rename = "isOpinion")]
    pub is_opinion: bool,
    /// Unix milliseconds at send time.
    #[serde(rename = "sentAt", default)]
    pub sent_at: i64,
}

/// The two fixed shapes a room message can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Opinion(String),
}

impl ChatMessage {
    pub fn text(sender_id: String, sender_nick: String, payload: String, sent_at: i64) -> Self {
        Self {
            sender_id,
            sender_nick,
            payload,
            is_opinion: false,
            sent_at,
        }
    }

    pub fn opinion(sender_id: String, sender_nick: String, payload: String, sent_at: i64) -> Self {
        Self {
            is_opinion: true,
            ..Self::text(sender_id, sender_nick, payload, sent_at)
        }
    }

    /// Splits the envelope into the sender's nick and its classified body.
    pub fn into_body(self) -> (String, MessageBody) {
        let body = if self.is_opinion {
            MessageBody::Opinion(self.payload)
        } else {
            MessageBody::Text(self.payload)
        };
        (self.sender_nick, body)
    }
}
