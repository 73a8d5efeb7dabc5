use crate::error::VaultError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Host request allowance for one collection run. Every attempt, retries included, costs one.
#[derive(Debug)]
pub struct RequestBudget {
    limit: u64,
    used: AtomicU64,
}

impl RequestBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    pub fn spend(&self) -> Result<(), VaultError> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .map(|_| ())
            .map_err(|_| VaultError::BudgetExhausted)
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used())
    }
}
