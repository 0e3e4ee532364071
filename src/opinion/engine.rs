use std::collections::HashMap;

use crate::common::{ChatError, ChatMessage, MessageBody};

use super::record::OpinionRecord;

/// What a processed room message turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Chat { nick: String, text: String },
    Opinion { record: OpinionRecord, change: Change },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// First opinion seen for this (author, stock) pair.
    Recorded,
    /// An existing entry was overwritten in place.
    Updated,
}

/// Latest-wins table of opinions keyed by (author, stock).
///
/// Entries keep their insertion position across updates, so
/// [`list_opinions`](Self::list_opinions) is stable.
#[derive(Debug, Default)]
pub struct ReconciliationEngine {
    entries: Vec<OpinionRecord>,
    index: HashMap<(String, String), usize>,
    clock: u64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(&mut self, message: ChatMessage) -> Result<Reconciled, ChatError> {
        let (nick, body) = message.into_body();
        match body {
            MessageBody::Text(text) => Ok(Reconciled::Chat { nick, text }),
            MessageBody::Opinion(payload) => {
                let mut candidate = OpinionRecord::from_payload(&payload)?;
                // Embedded author is never trusted.
                candidate.author = nick;
                let change = self.apply(candidate.clone());
                Ok(Reconciled::Opinion {
                    record: candidate,
                    change,
                })
            }
        }
    }

    fn apply(&mut self, record: OpinionRecord) -> Change {
        self.observe(record.revision);
        let key = (record.author.clone(), record.stock.clone());
        match self.index.get(&key) {
            Some(&slot) => {
                let entry = &mut self.entries[slot];
                entry.score = record.score;
                entry.text = record.text;
                entry.revision = record.revision;
                Change::Updated
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(record);
                Change::Recorded
            }
        }
    }

    /// Arithmetic mean of all current scores, 0 for an empty table.
    pub fn average_score(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let total: i64 = self.entries.iter().map(|entry| entry.score).sum();
        total as f64 / self.entries.len() as f64
    }

    pub fn list_opinions(&self) -> &[OpinionRecord] {
        &self.entries
    }

    pub fn get(&self, author: &str, stock: &str) -> Option<&OpinionRecord> {
        self.index
            .get(&(author.to_string(), stock.to_string()))
            .map(|&slot| &self.entries[slot])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advances the Lamport clock for a locally published opinion.
    pub fn next_revision(&mut self) -> u64 {
        self.clock = self.clock.saturating_add(1);
        self.clock
    }

    fn observe(&mut self, revision: u64) {
        self.clock = self.clock.max(revision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn opinion_from(nick: &str, payload: &str) -> ChatMessage {
        ChatMessage::opinion(format!("id-{nick}"), nick.to_string(), payload.to_string(), 0)
    }

    fn opinion_msg(nick: &str, stock: &str, score: i64, text: &str) -> ChatMessage {
        let payload = OpinionRecord::new("ignored", stock, score, text)
            .to_payload()
            .unwrap();
        opinion_from(nick, &payload)
    }

    #[test]
    fn plain_text_is_forwarded_without_mutation() {
        let mut engine = ReconciliationEngine::new();
        let msg = ChatMessage::text("id".into(), "bob".into(), "hello {there".into(), 0);
        let out = engine.on_message(msg).unwrap();
        assert_eq!(
            out,
            Reconciled::Chat {
                nick: "bob".into(),
                text: "hello {there".into()
            }
        );
        assert!(engine.is_empty());
    }

    #[test]
    fn oversized_revision_does_not_poison_the_clock() {
        let mut engine = ReconciliationEngine::new();
        let payload = format!(r#"{{"stock":"ACME","score":1,"revision":{}}}"#, u64::MAX);
        assert!(matches!(
            engine.on_message(opinion_from("mallory", &payload)),
            Err(ChatError::MalformedPayload(_))
        ));
        assert!(engine.is_empty());
        assert_eq!(engine.next_revision(), 1);

        let payload = format!(r#"{{"stock":"ACME","score":1,"revision":{}}}"#, crate::opinion::REVISION_MAX);
        engine.on_message(opinion_from("alice", &payload)).unwrap();
        assert_eq!(engine.next_revision(), crate::opinion::REVISION_MAX + 1);

        engine.clock = u64::MAX;
        assert_eq!(engine.next_revision(), u64::MAX);
    }

    #[test]
    fn author_comes_from_sender_nick() {
        let mut engine = ReconciliationEngine::new();
        let payload = r#"{"author":"mallory","stock":"ACME","score":4,"text":"meh"}"#;
        engine.on_message(opinion_from("alice", payload)).unwrap();

        let entry = &engine.list_opinions()[0];
        assert_eq!(entry.author, "alice");
        assert_eq!(entry.stock, "ACME");
        assert_eq!(entry.score, 4);
        assert_eq!(entry.text, "meh");
        assert!(engine.get("mallory", "ACME").is_none());
    }

    #[test]
    fn repeat_opinion_updates_in_place() {
        let mut engine = ReconciliationEngine::new();
        engine.on_message(opinion_msg("alice", "ACME", 2, "first")).unwrap();
        engine.on_message(opinion_msg("bob", "ACME", 5, "bob")).unwrap();
        let out = engine.on_message(opinion_msg("alice", "ACME", 9, "second")).unwrap();

        assert!(matches!(out, Reconciled::Opinion { change: Change::Updated, .. }));
        assert_eq!(engine.len(), 2);
        let first = &engine.list_opinions()[0];
        assert_eq!((first.author.as_str(), first.score, first.text.as_str()), ("alice", 9, "second"));
        assert_eq!(engine.list_opinions()[1].author, "bob");
    }

    #[test]
    fn average_uses_float_division() {
        let mut engine = ReconciliationEngine::new();
        assert_eq!(engine.average_score(), 0.0);

        engine.on_message(opinion_msg("a", "ACME", 3, "")).unwrap();
        engine.on_message(opinion_msg("b", "ACME", 5, "")).unwrap();
        assert_eq!(engine.average_score(), 4.0);

        engine.on_message(opinion_msg("c", "ACME", 0, "")).unwrap();
        assert!((engine.average_score() - 8.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_scores_average_correctly() {
        let mut engine = ReconciliationEngine::new();
        engine.on_message(opinion_msg("a", "ACME", -3, "")).unwrap();
        engine.on_message(opinion_msg("b", "ACME", 2, "")).unwrap();
        assert_eq!(engine.average_score(), -0.5);
    }

    #[test]
    fn malformed_payload_is_reported_and_table_untouched() {
        let mut engine = ReconciliationEngine::new();
        engine.on_message(opinion_msg("alice", "ACME", 1, "ok")).unwrap();

        let err = engine.on_message(opinion_from("alice", "not json at all")).unwrap_err();
        assert!(matches!(err, ChatError::MalformedPayload(_)));
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.list_opinions()[0].score, 1);

        engine.on_message(opinion_msg("alice", "ACME", 6, "later")).unwrap();
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.list_opinions()[0].score, 6);
    }

    #[test]
    fn clock_tracks_highest_observed_revision() {
        let mut engine = ReconciliationEngine::new();
        let payload = r#"{"stock":"ACME","score":1,"revision":41}"#;
        engine.on_message(opinion_from("alice", payload)).unwrap();
        assert_eq!(engine.next_revision(), 42);
        assert_eq!(engine.next_revision(), 43);
    }

    proptest! {
        #[test]
        fn same_pair_converges_to_last_message(
            updates in prop::collection::vec((-10i64..=10, "[a-z ]{0,12}"), 1..20)
        ) {
            let mut engine = ReconciliationEngine::new();
            for (score, text) in &updates {
                engine.on_message(opinion_msg("alice", "ACME", *score, text)).unwrap();
            }
            let (score, text) = updates.last().unwrap();
            prop_assert_eq!(engine.len(), 1);
            let entry = engine.get("alice", "ACME").unwrap();
            prop_assert_eq!(entry.score, *score);
            prop_assert_eq!(&entry.text, text);
        }

        #[test]
        fn table_size_matches_distinct_pairs(
            updates in prop::collection::vec((0usize..4, 0usize..4, -10i64..=10), 0..40)
        ) {
            let authors = ["alice", "bob", "carol", "dave"];
            let stocks = ["ACME", "TSLA", "AAPL", "MSFT"];
            let mut engine = ReconciliationEngine::new();
            let mut pairs = std::collections::HashSet::new();
            for (a, s, score) in &updates {
                engine.on_message(opinion_msg(authors[*a], stocks[*s], *score, "")).unwrap();
                pairs.insert((*a, *s));
            }
            prop_assert_eq!(engine.len(), pairs.len());
        }
    }
}
