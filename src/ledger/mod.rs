pub mod apply;
pub mod balance;
pub mod book;
pub mod transaction;

pub use apply::{apply, prepare};
pub use balance::Balance;
pub use book::{BalanceLedger, CLOSURE_REFUND};
pub use transaction::{Transaction, TransactionType};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ledger state: all balances plus the full transaction journal.
///
/// State is fully reconstructible by replaying the journal from genesis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerState {
    pub balances: HashMap<String, Balance>,

    /// Journal in append order
    pub transactions: Vec<Transaction>,
}

impl LedgerState {
    pub fn new() -> Self {
        LedgerState::default()
    }

    /// Balance for `user_id`, zeroed when the user has none yet.
    pub fn balance(&self, user_id: &str) -> Balance {
        self.balances
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Balance::new(user_id))
    }

    pub fn has_balance(&self, user_id: &str) -> bool {
        self.balances.contains_key(user_id)
    }

    /// Transactions for a user, optionally narrowed to one campaign, oldest first.
    pub fn history(&self, user_id: &str, campaign_id: Option<&str>) -> Vec<Transaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .filter(|tx| campaign_id.map_or(true, |c| tx.is_for_campaign(c)))
            .cloned()
            .collect()
    }

    /// Sum of `tx_type` amounts for one user within one campaign.
    pub fn sum_for(&self, user_id: &str, campaign_id: &str, tx_type: TransactionType) -> u64 {
        self.transactions
            .iter()
            .filter(|tx| {
                tx.tx_type == tx_type && tx.user_id == user_id && tx.is_for_campaign(campaign_id)
            })
            .fold(0u64, |acc, tx| acc.saturating_add(tx.amount))
    }

    /// Reserved minus already paid out, for one user within one campaign.
    pub fn outstanding_for(&self, user_id: &str, campaign_id: &str) -> u64 {
        let reserved = self.sum_for(user_id, campaign_id, TransactionType::Reservation);
        let paid = self.sum_for(user_id, campaign_id, TransactionType::Payout);
        reserved.saturating_sub(paid)
    }

    /// Every user with a positive reserved-minus-paid remainder in `campaign_id`,
    /// ordered by user id.
    pub fn outstanding_reservations(&self, campaign_id: &str) -> Vec<(String, u64)> {
        let mut reserved: BTreeMap<&str, u64> = BTreeMap::new();
        let mut paid: HashMap<&str, u64> = HashMap::new();
        for tx in self.transactions.iter().filter(|tx| tx.is_for_campaign(campaign_id)) {
            match tx.tx_type {
                TransactionType::Reservation => {
                    let entry = reserved.entry(tx.user_id.as_str()).or_default();
                    *entry = entry.saturating_add(tx.amount);
                }
                TransactionType::Payout => {
                    let entry = paid.entry(tx.user_id.as_str()).or_default();
                    *entry = entry.saturating_add(tx.amount);
                }
                _ => {}
            }
        }
        reserved
            .into_iter()
            .map(|(user, r)| {
                let p = paid.get(user).copied().unwrap_or(0);
                (user.to_string(), r.saturating_sub(p))
            })
            .filter(|(_, remainder)| *remainder > 0)
            .collect()
    }

    /// True if a `tx_type` entry exists for the campaign.
    pub fn has_entry(&self, campaign_id: &str, tx_type: TransactionType) -> bool {
        self.transactions
            .iter()
            .any(|tx| tx.tx_type == tx_type && tx.is_for_campaign(campaign_id))
    }

    /// The `tx_type` entry carrying `reference` in `campaign_id`, if any.
    pub fn find_entry(
        &self,
        campaign_id: &str,
        tx_type: TransactionType,
        reference: &str,
    ) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| {
            tx.tx_type == tx_type
                && tx.is_for_campaign(campaign_id)
                && tx.reference.as_deref() == Some(reference)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(user: &str, campaign: &str, amount: u64, tx_type: TransactionType) -> Transaction {
        Transaction::new(user, Some(campaign), amount, tx_type, "test")
    }

    #[test]
    fn test_state_creation() {
        let state = LedgerState::new();
        assert!(state.balances.is_empty());
        assert!(state.transactions.is_empty());
        assert_eq!(state.balance("alice").available, 0);
        assert!(!state.has_balance("alice"));
    }

    #[test]
    fn test_outstanding_reservations() {
        let mut state = LedgerState::new();
        state.transactions.push(tx("bob", "c1", 300, TransactionType::Reservation));
        state.transactions.push(tx("alice", "c1", 100, TransactionType::Reservation));
        state.transactions.push(tx("alice", "c1", 50, TransactionType::Reservation));
        state.transactions.push(tx("alice", "c1", 40, TransactionType::Payout));
        state.transactions.push(tx("carol", "c1", 70, TransactionType::Reservation));
        state.transactions.push(tx("carol", "c1", 70, TransactionType::Payout));
        state.transactions.push(tx("alice", "c2", 999, TransactionType::Reservation));

        let outstanding = state.outstanding_reservations("c1");
        assert_eq!(
            outstanding,
            vec![("alice".to_string(), 110), ("bob".to_string(), 300)]
        );
        assert_eq!(state.outstanding_for("alice", "c2"), 999);
        assert_eq!(state.outstanding_for("carol", "c1"), 0);
    }

    #[test]
    fn test_history_filters() {
        let mut state = LedgerState::new();
        state.transactions.push(tx("alice", "c1", 1, TransactionType::Reservation));
        state.transactions.push(tx("alice", "c2", 2, TransactionType::Reservation));
        state.transactions.push(tx("bob", "c1", 3, TransactionType::Reservation));

        assert_eq!(state.history("alice", None).len(), 2);
        let c1 = state.history("alice", Some("c1"));
        assert_eq!(c1.len(), 1);
        assert_eq!(c1[0].amount, 1);
    }

    #[test]
    fn test_find_entry_and_has_entry() {
        let mut state = LedgerState::new();
        state
            .transactions
            .push(tx("alice", "c1", 10, TransactionType::Reservation).with_reference("clip:7"));
        let reservation = TransactionType::Reservation;
        assert!(state.find_entry("c1", reservation, "clip:7").is_some());
        assert!(state.find_entry("c1", reservation, "clip:8").is_none());
        assert!(state.find_entry("c2", reservation, "clip:7").is_none());
        assert!(state.find_entry("c1", TransactionType::Payout, "clip:7").is_none());
        assert!(state.has_entry("c1", TransactionType::Reservation));
        assert!(!state.has_entry("c1", TransactionType::Refund));
    }
}
