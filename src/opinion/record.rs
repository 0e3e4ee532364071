use serde::{Deserialize, Deserializer, Serialize};

use crate::common::ChatError;

pub const SCORE_MIN: i64 = -10;
pub const SCORE_MAX: i64 = 10;
/// Largest revision accepted from the wire (2^53 - 1, exact in any JSON reader).
pub const REVISION_MAX: u64 = (1 << 53) - 1;

const KEY_PREFIX: &str = "/opinions";

/// One participant's stance on one stock.
///
/// Field order is the serialized order. The legacy share-file shape
/// (`Stock`, `Numeric`, `Opinion`, `User`) is accepted when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpinionRecord {
    #[serde(default, alias = "User")]
    pub author: String,
    #[serde(alias = "Stock")]
    pub stock: String,
    #[serde(alias = "Numeric", deserialize_with = "deserialize_score")]
    pub score: i64,
    #[serde(default, alias = "Opinion")]
    pub text: String,
    /// Lamport counter used to order competing store replicas.
    #[serde(default)]
    pub revision: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScoreRepr {
    Int(i64),
    Text(String),
}

fn deserialize_score<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match ScoreRepr::deserialize(deserializer)? {
        ScoreRepr::Int(score) => Ok(score),
        ScoreRepr::Text(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|err| serde::de::Error::custom(format!("score `{raw}`: {err}"))),
    }
}

impl OpinionRecord {
    pub fn new(author: impl Into<String>, stock: impl Into<String>, score: i64, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            stock: stock.into(),
            score,
            text: text.into(),
            revision: 0,
        }
    }

    /// Parses and checks a serialized record.
    pub fn from_payload(payload: &str) -> Result<Self, ChatError> {
        let mut record: OpinionRecord = serde_json::from_str(payload)?;
        record.stock = record.stock.trim().to_string();
        record.check()?;
        Ok(record)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChatError> {
        let payload = std::str::from_utf8(bytes)
            .map_err(|err| ChatError::MalformedPayload(err.to_string()))?;
        Self::from_payload(payload)
    }

    pub fn to_payload(&self) -> Result<String, ChatError> {
        serde_json::to_string(self).map_err(|err| ChatError::MalformedPayload(err.to_string()))
    }

    pub fn check(&self) -> Result<(), ChatError> {
        if self.stock.trim().is_empty() {
            return Err(ChatError::MalformedPayload("stock is empty".into()));
        }
        if !(SCORE_MIN..=SCORE_MAX).contains(&self.score) {
            return Err(ChatError::MalformedPayload(format!(
                "score {} outside {SCORE_MIN}..={SCORE_MAX}",
                self.score
            )));
        }
        if self.revision > REVISION_MAX {
            return Err(ChatError::MalformedPayload(format!(
                "revision {} above {REVISION_MAX}",
                self.revision
            )));
        }
        Ok(())
    }

    /// Distributed store key for this record within `room`.
    pub fn store_key(&self, room: &str) -> String {
        store_key(room, &self.stock)
    }
}

pub fn store_key(room: &str, stock: &str) -> String {
    format!("{KEY_PREFIX}/{room}/{}", stock.trim())
}

/// Stock named by a `/opinions/<room>/<stock>` key.
pub fn stock_from_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(KEY_PREFIX)?.strip_prefix('/')?;
    let (_room, stock) = rest.rsplit_once('/')?;
    (!stock.is_empty()).then_some(stock)
}
