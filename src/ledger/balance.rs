use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Balance aggregate: spendable and reserved funds of one user.
///
/// Invariants:
/// - Neither field ever becomes negative (unsigned, checked subtraction)
/// - Only `release` moves value from pending to available
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    pub user_id: String,

    /// Funds the user may withdraw or spend now
    pub available: u64,

    /// Funds reserved for the user but not yet released
    pub pending: u64,
}

impl Balance {
    /// Zeroed balance for `user_id`
    pub fn new(user_id: &str) -> Self {
        Balance {
            user_id: user_id.to_string(),
            available: 0,
            pending: 0,
        }
    }

    pub fn credit_available(&mut self, amount: u64) -> Result<u64> {
        self.available = self
            .available
            .checked_add(amount)
            .ok_or(Error::InvalidAmount(amount))?;
        Ok(self.available)
    }

    pub fn credit_pending(&mut self, amount: u64) -> Result<u64> {
        self.pending = self
            .pending
            .checked_add(amount)
            .ok_or(Error::InvalidAmount(amount))?;
        Ok(self.pending)
    }

    /// Move `amount` from pending to available.
    ///
    /// Fails with `InsufficientPending` and leaves the balance untouched when
    /// `pending < amount`.
    pub fn release(&mut self, amount: u64) -> Result<()> {
        if self.pending < amount {
            return Err(Error::InsufficientPending {
                user: self.user_id.clone(),
                pending: self.pending,
                requested: amount,
            });
        }
        let available = self
            .available
            .checked_add(amount)
            .ok_or(Error::InvalidAmount(amount))?;
        self.pending -= amount;
        self.available = available;
        Ok(())
    }

    pub fn total(&self) -> u64 {
        self.available.saturating_add(self.pending)
    }
}
