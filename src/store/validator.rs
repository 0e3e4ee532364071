use std::cmp::{Ordering, Reverse};

use crate::common::ChatError;
use crate::opinion::OpinionRecord;
use crate::opinion::record::stock_from_key;

/// Policy consulted by the distributed store on every write and read.
///
/// Implementations must be pure and must not block.
pub trait RecordValidator: Send + Sync {
    fn validate(&self, key: &str, value: &[u8]) -> Result<(), ChatError>;

    /// Index of the winning candidate among several values for `key`.
    fn select(&self, key: &str, candidates: &[Vec<u8>]) -> Result<usize, ChatError>;
}

/// Accepts everything and keeps the first candidate.
///
/// Placeholder only: replicas that see candidates in different orders
/// will not converge.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllValidator;

impl RecordValidator for AcceptAllValidator {
    fn validate(&self, key: &str, value: &[u8]) -> Result<(), ChatError> {
        log::debug!("Validate {key}: {} bytes", value.len());
        Ok(())
    }

    fn select(&self, key: &str, candidates: &[Vec<u8>]) -> Result<usize, ChatError> {
        if candidates.is_empty() {
            return Err(ChatError::rejected(key, "no candidates"));
        }
        Ok(0)
    }
}

/// Accepts well-formed opinion records filed under their own stock and
/// orders candidates by revision, then author, then raw bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpinionValidator;

impl OpinionValidator {
    fn parse(key: &str, value: &[u8]) -> Result<OpinionRecord, ChatError> {
        let record = OpinionRecord::from_bytes(value)
            .map_err(|err| ChatError::rejected(key, err.to_string()))?;
        match stock_from_key(key) {
            Some(stock) if stock == record.stock => Ok(record),
            Some(stock) => Err(ChatError::rejected(
                key,
                format!("record is for `{}`, key is for `{stock}`", record.stock),
            )),
            None => Err(ChatError::rejected(key, "not an opinion key")),
        }
    }
}

impl RecordValidator for OpinionValidator {
    fn validate(&self, key: &str, value: &[u8]) -> Result<(), ChatError> {
        Self::parse(key, value).map(|_| ())
    }

    fn select(&self, key: &str, candidates: &[Vec<u8>]) -> Result<usize, ChatError> {
        let mut best: Option<(usize, OpinionRecord)> = None;
        for (idx, raw) in candidates.iter().enumerate() {
            let Ok(record) = Self::parse(key, raw) else {
                continue;
            };
            let wins = match &best {
                None => true,
                Some((best_idx, best_record)) => {
                    rank(&record, raw, best_record, &candidates[*best_idx]) == Ordering::Greater
                }
            };
            if wins {
                best = Some((idx, record));
            }
        }
        best.map(|(idx, _)| idx)
            .ok_or_else(|| ChatError::rejected(key, "no valid candidates"))
    }
}

fn rank(a: &OpinionRecord, a_raw: &[u8], b: &OpinionRecord, b_raw: &[u8]) -> Ordering {
    (a.revision, Reverse(&a.author), Reverse(a_raw)).cmp(&(b.revision, Reverse(&b.author), Reverse(b_raw)))
}
