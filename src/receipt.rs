use dashmap::DashMap;
use hourglass_rs::SafeTimeProvider;
use uuid::Uuid;

use crate::errors::{LedgerError, Result};
use crate::types::TransactionId;

/// collision-checked generator of receipt ids
///
/// Ids look like `RCP-20260831-142501337-a1b2c3`: a sortable timestamp plus
/// a random suffix, checked against every id issued or registered so far.
/// Running out of retries signals a clock or RNG fault, not bad luck.
#[derive(Debug)]
pub struct ReceiptIdGenerator {
    prefix: String,
    max_attempts: u32,
    issued: DashMap<TransactionId, ()>,
}

impl ReceiptIdGenerator {
    pub fn new(prefix: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            prefix: prefix.into(),
            max_attempts,
            issued: DashMap::new(),
        }
    }

    /// reserve an id seen in persisted state so it can never be re-issued
    pub fn register(&self, id: TransactionId) -> bool {
        self.issued.insert(id, ()).is_none()
    }

    /// generate the next unique receipt id
    pub fn next(&self, time_provider: &SafeTimeProvider) -> Result<TransactionId> {
        for _ in 0..self.max_attempts {
            let stamp = time_provider.now().format("%Y%m%d-%H%M%S%3f");
            let entropy = Uuid::new_v4().simple().to_string();
            let candidate = format!("{}-{}-{}", self.prefix, stamp, &entropy[..6]);

            if self.try_issue(candidate.clone()) {
                return Ok(candidate);
            }
        }

        Err(LedgerError::IdGenerationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// claim a candidate; false means it was already taken
    fn try_issue(&self, candidate: TransactionId) -> bool {
        self.issued.insert(candidate, ()).is_none()
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}
