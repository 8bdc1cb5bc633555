//! BalanceLedger: the only writer of balances and the transaction journal.
//!
//! Every operation holds the ledger lock across validate → append → commit, so two
//! concurrent mutations of the same balance can never interleave into a lost update.
//! Events are published after the lock is released.

use crate::error::{Error, Result};
use crate::events::{publish_best_effort, DomainEvent, EventBus};
use crate::ledger::apply::{commit, prepare};
use crate::ledger::{Balance, LedgerState, Transaction, TransactionType};
use crate::replay::replay_to_tip;
use crate::storage::Storage;
use std::sync::{Arc, Mutex, MutexGuard};

/// Reference of the one unspent-budget refund a campaign closure writes.
pub const CLOSURE_REFUND: &str = "closure";

struct Inner<S> {
    state: LedgerState,
    storage: S,
    /// Journal position of the next appended entry
    next_tx_id: u64,
}

/// Outcome of one committed ledger entry.
#[derive(Debug, Clone)]
struct Applied {
    tx: Transaction,
    before: Balance,
    after: Balance,
}

pub struct BalanceLedger<S: Storage> {
    inner: Mutex<Inner<S>>,
    bus: Arc<dyn EventBus>,
}

impl<S: Storage> BalanceLedger<S> {
    /// Restore the ledger from `storage` (snapshot plus journal tail) and attach `bus`.
    pub fn open(storage: S, bus: Arc<dyn EventBus>) -> Result<Self> {
        let (state, next_tx_id) = replay_to_tip(&storage)?;
        tracing::info!(
            balances = state.balances.len(),
            transactions = next_tx_id,
            "ledger opened"
        );
        Ok(BalanceLedger {
            inner: Mutex::new(Inner {
                state,
                storage,
                next_tx_id,
            }),
            bus,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<S>>> {
        self.inner
            .lock()
            .map_err(|_| Error::StorageError("ledger lock poisoned".to_string()))
    }

    /// Run one atomic ledger unit. `build` inspects the current state under the lock
    /// and returns the entry to append, or `None` to write nothing.
    fn execute_with<F>(&self, build: F) -> Result<Option<Applied>>
    where
        F: FnOnce(&LedgerState) -> Result<Option<Transaction>>,
    {
        let applied = {
            let mut inner = self.lock()?;
            let Some(tx) = build(&inner.state)? else {
                return Ok(None);
            };
            let before = inner.state.balance(&tx.user_id);
            let prepared = prepare(&inner.state, &tx)?;
            inner.storage.append_tx(&tx)?;
            let after = prepared.clone().unwrap_or_else(|| before.clone());
            commit(&mut inner.state, tx.clone(), prepared);
            inner.next_tx_id += 1;
            Applied { tx, before, after }
        };

        tracing::info!(
            tx_id = %applied.tx.id,
            user = %applied.tx.user_id,
            campaign = ?applied.tx.campaign_id,
            tx_type = %applied.tx.tx_type,
            amount = applied.tx.amount,
            available = applied.after.available,
            pending = applied.after.pending,
            "ledger entry committed"
        );
        self.publish(&applied);
        Ok(Some(applied))
    }

    fn execute(&self, tx: Transaction) -> Result<Applied> {
        self.execute_with(|_| Ok(Some(tx)))?
            .ok_or_else(|| Error::StorageError("ledger entry was not written".to_string()))
    }

    fn publish(&self, applied: &Applied) {
        let tx = &applied.tx;
        let event = match tx.tx_type {
            TransactionType::Deposit | TransactionType::Refund => DomainEvent::BalanceChanged {
                user_id: tx.user_id.clone(),
                campaign_id: tx.campaign_id.clone(),
                tx_id: tx.id.clone(),
                old_available: applied.before.available,
                new_available: applied.after.available,
                old_pending: applied.before.pending,
                new_pending: applied.after.pending,
            },
            TransactionType::Reservation => DomainEvent::FundsReserved {
                user_id: tx.user_id.clone(),
                campaign_id: tx.campaign_id.clone().unwrap_or_default(),
                tx_id: tx.id.clone(),
                amount: tx.amount,
                pending: applied.after.pending,
            },
            TransactionType::Payout => DomainEvent::FundsReleased {
                user_id: tx.user_id.clone(),
                campaign_id: tx.campaign_id.clone().unwrap_or_default(),
                tx_id: tx.id.clone(),
                amount: tx.amount,
                available: applied.after.available,
                pending: applied.after.pending,
            },
            TransactionType::Funding => DomainEvent::FundingRecorded {
                user_id: tx.user_id.clone(),
                campaign_id: tx.campaign_id.clone().unwrap_or_default(),
                tx_id: tx.id.clone(),
                amount: tx.amount,
            },
        };
        publish_best_effort(self.bus.as_ref(), event);
    }

    /// Credit `amount` to the user's available balance (DEPOSIT).
    pub fn add_funds(
        &self,
        user_id: &str,
        amount: u64,
        campaign_id: Option<&str>,
        description: &str,
    ) -> Result<Transaction> {
        let tx = Transaction::new(
            user_id,
            campaign_id,
            amount,
            TransactionType::Deposit,
            description,
        );
        Ok(self.execute(tx)?.tx)
    }

    /// Credit `amount` to the user's pending balance (RESERVATION).
    ///
    /// The reserved value comes from the campaign's externally escrowed budget; no
    /// other balance is debited.
    pub fn reserve_funds(
        &self,
        user_id: &str,
        amount: u64,
        campaign_id: &str,
        description: &str,
    ) -> Result<Transaction> {
        let tx = Transaction::new(
            user_id,
            Some(campaign_id),
            amount,
            TransactionType::Reservation,
            description,
        );
        Ok(self.execute(tx)?.tx)
    }

    /// Reserve unless a reservation with `reference` already exists in the campaign.
    ///
    /// Returns `Ok(None)` for the duplicate case without writing anything.
    pub fn reserve_funds_once(
        &self,
        user_id: &str,
        amount: u64,
        campaign_id: &str,
        reference: &str,
        description: &str,
    ) -> Result<Option<Transaction>> {
        if amount == 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let applied = self.execute_with(|state| {
            if let Some(existing) =
                state.find_entry(campaign_id, TransactionType::Reservation, reference)
            {
                tracing::debug!(
                    campaign = campaign_id,
                    reference,
                    tx_id = %existing.id,
                    "reservation already recorded"
                );
                return Ok(None);
            }
            Ok(Some(
                Transaction::new(
                    user_id,
                    Some(campaign_id),
                    amount,
                    TransactionType::Reservation,
                    description,
                )
                .with_reference(reference),
            ))
        })?;
        Ok(applied.map(|a| a.tx))
    }

    /// Move `amount` from pending to available (PAYOUT).
    ///
    /// Fails with `NotFound` when the user has no balance and with `InsufficientPending`
    /// when pending is short. Callers own idempotency.
    pub fn release_pending(
        &self,
        user_id: &str,
        amount: u64,
        campaign_id: &str,
        description: &str,
    ) -> Result<Transaction> {
        let tx = Transaction::new(
            user_id,
            Some(campaign_id),
            amount,
            TransactionType::Payout,
            description,
        );
        Ok(self.execute(tx)?.tx)
    }

    /// Release whatever the user still has reserved-but-unpaid in the campaign.
    ///
    /// The remainder is computed from the journal under the same lock as the release,
    /// so a second call after success writes nothing.
    pub fn release_outstanding(
        &self,
        user_id: &str,
        campaign_id: &str,
        description: &str,
    ) -> Result<Option<Transaction>> {
        let applied = self.execute_with(|state| {
            let remainder = state.outstanding_for(user_id, campaign_id);
            if remainder == 0 {
                return Ok(None);
            }
            Ok(Some(Transaction::new(
                user_id,
                Some(campaign_id),
                remainder,
                TransactionType::Payout,
                description,
            )))
        })?;
        Ok(applied.map(|a| a.tx))
    }

    /// Pay out up to `amount` for `reference`, at most once per campaign.
    ///
    /// The payout is capped at what the user still has reserved-but-unpaid in the
    /// campaign, so pending funds of other campaigns are never drawn on. Returns
    /// `Ok(None)` when `reference` was already paid or nothing is outstanding.
    pub fn release_once(
        &self,
        user_id: &str,
        amount: u64,
        campaign_id: &str,
        reference: &str,
        description: &str,
    ) -> Result<Option<Transaction>> {
        if amount == 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let applied = self.execute_with(|state| {
            if state
                .find_entry(campaign_id, TransactionType::Payout, reference)
                .is_some()
            {
                tracing::debug!(campaign = campaign_id, reference, "payout already recorded");
                return Ok(None);
            }
            let payable = amount.min(state.outstanding_for(user_id, campaign_id));
            if payable == 0 {
                tracing::info!(
                    campaign = campaign_id,
                    user = user_id,
                    reference,
                    "nothing outstanding, payout skipped"
                );
                return Ok(None);
            }
            Ok(Some(
                Transaction::new(
                    user_id,
                    Some(campaign_id),
                    payable,
                    TransactionType::Payout,
                    description,
                )
                .with_reference(reference),
            ))
        })?;
        Ok(applied.map(|a| a.tx))
    }

    /// Credit unspent budget back to the creator's available balance (REFUND).
    pub fn refund_to_creator(
        &self,
        user_id: &str,
        amount: u64,
        campaign_id: &str,
        description: &str,
    ) -> Result<Transaction> {
        let tx = Transaction::new(
            user_id,
            Some(campaign_id),
            amount,
            TransactionType::Refund,
            description,
        );
        Ok(self.execute(tx)?.tx)
    }

    /// Refund once per campaign. The REFUND carrying the [`CLOSURE_REFUND`] reference is
    /// the closure marker; when it exists this is a no-op returning `Ok(None)`. Manual
    /// refunds from [`refund_to_creator`](Self::refund_to_creator) do not count.
    pub fn refund_campaign_remainder(
        &self,
        user_id: &str,
        amount: u64,
        campaign_id: &str,
        description: &str,
    ) -> Result<Option<Transaction>> {
        if amount == 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let applied = self.execute_with(|state| {
            if state
                .find_entry(campaign_id, TransactionType::Refund, CLOSURE_REFUND)
                .is_some()
            {
                tracing::info!(campaign = campaign_id, "campaign already refunded");
                return Ok(None);
            }
            Ok(Some(
                Transaction::new(
                    user_id,
                    Some(campaign_id),
                    amount,
                    TransactionType::Refund,
                    description,
                )
                .with_reference(CLOSURE_REFUND),
            ))
        })?;
        Ok(applied.map(|a| a.tx))
    }

    /// Journal a campaign funding (FUNDING); balances are untouched. One per campaign.
    pub fn record_funding(
        &self,
        user_id: &str,
        amount: u64,
        campaign_id: &str,
        description: &str,
    ) -> Result<Option<Transaction>> {
        if amount == 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let applied = self.execute_with(|state| {
            if state.has_entry(campaign_id, TransactionType::Funding) {
                return Ok(None);
            }
            Ok(Some(Transaction::new(
                user_id,
                Some(campaign_id),
                amount,
                TransactionType::Funding,
                description,
            )))
        })?;
        Ok(applied.map(|a| a.tx))
    }

    /// Current balance; a zeroed balance for unknown users.
    pub fn get_balance(&self, user_id: &str) -> Result<Balance> {
        Ok(self.lock()?.state.balance(user_id))
    }

    pub fn transactions_for(
        &self,
        user_id: &str,
        campaign_id: Option<&str>,
    ) -> Result<Vec<Transaction>> {
        Ok(self.lock()?.state.history(user_id, campaign_id))
    }

    /// Per user: reservations minus payouts in the campaign, positive remainders only.
    pub fn outstanding_reservations(&self, campaign_id: &str) -> Result<Vec<(String, u64)>> {
        Ok(self.lock()?.state.outstanding_reservations(campaign_id))
    }

    /// True once the closure refund for `campaign_id` has been written.
    pub fn has_refund(&self, campaign_id: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .state
            .find_entry(campaign_id, TransactionType::Refund, CLOSURE_REFUND)
            .is_some())
    }

    /// Persist a snapshot covering every committed entry.
    pub fn checkpoint(&self) -> Result<()> {
        let mut inner = self.lock()?;
        let Inner {
            state,
            storage,
            next_tx_id,
        } = &mut *inner;
        storage.persist_state(state, *next_tx_id)?;
        tracing::debug!(next_tx_id = *next_tx_id, "ledger snapshot persisted");
        Ok(())
    }

    /// Copy of the full ledger state (for reports and tests).
    pub fn snapshot(&self) -> Result<LedgerState> {
        Ok(self.lock()?.state.clone())
    }
}
