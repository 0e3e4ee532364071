use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use libp2p::kad::store::{MemoryStore, RecordStore};
use libp2p::kad::{self, GetRecordOk, ProgressStep, QueryId, QueryResult, Quorum, Record, RecordKey};
use tokio::sync::oneshot;

use crate::common::ChatError;

use super::validator::RecordValidator;

pub type PutReply = oneshot::Sender<Result<(), ChatError>>;
pub type GetReply = oneshot::Sender<Result<Option<Vec<u8>>, ChatError>>;

static STORE_INIT: InitGuard = InitGuard::new();

/// One-shot latch guarding store initialisation.
pub struct InitGuard {
    taken: AtomicBool,
}

impl InitGuard {
    pub const fn new() -> Self {
        Self {
            taken: AtomicBool::new(false),
        }
    }

    pub fn acquire(&self) -> Result<(), ChatError> {
        self.taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ChatError::InitializationConflict)
    }
}

struct PendingGet {
    key: String,
    candidates: Vec<Vec<u8>>,
    remote_seen: bool,
    reply: GetReply,
}

/// Put/get over the Kademlia DHT, with every value passing through a
/// [`RecordValidator`]. Reads and writes use quorum 1.
pub struct DistributedStore {
    validator: Box<dyn RecordValidator>,
    pending_puts: HashMap<QueryId, PutReply>,
    pending_gets: HashMap<QueryId, PendingGet>,
}

impl DistributedStore {
    /// Creates the process-wide store. A second call fails.
    pub fn init(validator: Box<dyn RecordValidator>) -> Result<Self, ChatError> {
        STORE_INIT.acquire()?;
        Ok(Self::with_validator(validator))
    }

    fn with_validator(validator: Box<dyn RecordValidator>) -> Self {
        Self {
            validator,
            pending_puts: HashMap::new(),
            pending_gets: HashMap::new(),
        }
    }

    pub fn put(
        &mut self,
        kad: &mut kad::Behaviour<MemoryStore>,
        key: String,
        value: Vec<u8>,
        reply: PutReply,
    ) {
        if let Err(err) = self.validator.validate(&key, &value) {
            log::warn!("Refusing to store {key}: {err}");
            let _ = reply.send(Err(err));
            return;
        }

        let record = Record::new(RecordKey::new(&key), value);
        match kad.put_record(record, Quorum::One) {
            Ok(query_id) => {
                log::debug!("PutRecord {key} started ({query_id:?})");
                self.pending_puts.insert(query_id, reply);
            }
            Err(err) => {
                let _ = reply.send(Err(ChatError::Transport(format!("local store: {err:?}"))));
            }
        }
    }

    pub fn get(&mut self, kad: &mut kad::Behaviour<MemoryStore>, key: String, reply: GetReply) {
        // A local replica is reported by kad as a FoundRecord with no peer.
        let query_id = kad.get_record(RecordKey::new(&key));
        log::debug!("GetRecord {key} started ({query_id:?})");
        self.pending_gets.insert(
            query_id,
            PendingGet {
                key,
                candidates: Vec::new(),
                remote_seen: false,
                reply,
            },
        );
    }

    /// Feeds a Kademlia query result back into the pending request.
    pub fn on_query_progressed(
        &mut self,
        kad: &mut kad::Behaviour<MemoryStore>,
        id: QueryId,
        result: QueryResult,
        step: ProgressStep,
    ) {
        match result {
            QueryResult::PutRecord(res) => {
                if let Some(reply) = self.pending_puts.remove(&id) {
                    let outcome = res
                        .map(|_| ())
                        .map_err(|err| ChatError::Transport(format!("put failed: {err:?}")));
                    let _ = reply.send(outcome);
                }
            }
            QueryResult::GetRecord(Ok(GetRecordOk::FoundRecord(peer_record))) => {
                let Some(pending) = self.pending_gets.get_mut(&id) else {
                    return;
                };
                match peer_record.peer {
                    None => pending.candidates.push(peer_record.record.value),
                    // Quorum 1: the first remote answer is enough.
                    Some(peer) if !pending.remote_seen => {
                        log::debug!("Record for {} found at {peer}", pending.key);
                        pending.remote_seen = true;
                        pending.candidates.push(peer_record.record.value);
                        if let Some(mut query) = kad.query_mut(&id) {
                            query.finish();
                        }
                    }
                    Some(_) => {}
                }
                if step.last {
                    self.complete_get(id, None);
                }
            }
            QueryResult::GetRecord(Ok(GetRecordOk::FinishedWithNoAdditionalRecord { .. })) => {
                self.complete_get(id, None);
            }
            QueryResult::GetRecord(Err(err)) => {
                let failure = match err {
                    kad::GetRecordError::NotFound { .. } => None,
                    other => Some(format!("{other:?}")),
                };
                self.complete_get(id, failure);
            }
            _ => {}
        }
    }

    fn complete_get(&mut self, id: QueryId, failure: Option<String>) {
        let Some(pending) = self.pending_gets.remove(&id) else {
            return;
        };
        let outcome = match (resolve(self.validator.as_ref(), &pending.key, pending.candidates), failure) {
            (Ok(None), Some(reason)) => Err(ChatError::Transport(format!("get failed: {reason}"))),
            (outcome, _) => outcome,
        };
        let _ = pending.reply.send(outcome);
    }

    /// Validates a record another peer asked us to hold and keeps the
    /// winner against any local replica.
    pub fn on_inbound_put(&mut self, kad: &mut kad::Behaviour<MemoryStore>, record: Record) {
        let key = String::from_utf8_lossy(record.key.as_ref()).into_owned();
        let existing = kad.store_mut().get(&record.key).map(|r| r.value.clone());

        let Some(winner) = merge_inbound(self.validator.as_ref(), &key, existing, record.value.clone()) else {
            return;
        };
        let stored = Record {
            value: winner,
            ..record
        };
        if let Err(err) = kad.store_mut().put(stored) {
            log::warn!("Failed to store replicated record {key}: {err:?}");
        }
    }
}

/// Picks the winning value among `candidates` for `key`.
///
/// `Ok(None)` means nothing was found; candidates that all fail
/// validation are reported as a rejection.
pub fn resolve(
    validator: &dyn RecordValidator,
    key: &str,
    candidates: Vec<Vec<u8>>,
) -> Result<Option<Vec<u8>>, ChatError> {
    if candidates.is_empty() {
        return Ok(None);
    }
    let mut last_rejection = None;
    let mut valid = Vec::with_capacity(candidates.len());
    for value in candidates {
        match validator.validate(key, &value) {
            Ok(()) => valid.push(value),
            Err(err) => last_rejection = Some(err),
        }
    }
    if valid.is_empty() {
        return Err(last_rejection.unwrap_or_else(|| ChatError::rejected(key, "no valid candidates")));
    }
    let idx = validator.select(key, &valid)?;
    Ok(valid.into_iter().nth(idx))
}

/// Value to keep after an inbound replica arrives, or `None` to leave the
/// local store untouched.
pub fn merge_inbound(
    validator: &dyn RecordValidator,
    key: &str,
    existing: Option<Vec<u8>>,
    incoming: Vec<u8>,
) -> Option<Vec<u8>> {
    if let Err(err) = validator.validate(key, &incoming) {
        log::warn!("Dropping replicated record: {err}");
        return None;
    }
    let Some(existing) = existing else {
        return Some(incoming);
    };
    if existing == incoming {
        return None;
    }
    let candidates = vec![existing, incoming];
    match validator.select(key, &candidates) {
        Ok(1) => candidates.into_iter().nth(1),
        Ok(_) => None,
        Err(err) => {
            log::warn!("Select failed for {key}: {err}");
            None
        }
    }
}
