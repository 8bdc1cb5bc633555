use crate::error::{Error, Result};
use crate::ledger::{Balance, LedgerState, Transaction, TransactionType};

/// Validate `tx` against `state` and compute the balance it produces.
///
/// Pure: `state` is not touched. Returns `None` for journal-only entries (FUNDING).
pub fn prepare(state: &LedgerState, tx: &Transaction) -> Result<Option<Balance>> {
    if tx.amount == 0 {
        return Err(Error::InvalidAmount(tx.amount));
    }

    match tx.tx_type {
        TransactionType::Deposit | TransactionType::Refund => {
            let mut balance = state.balance(&tx.user_id);
            balance.credit_available(tx.amount)?;
            Ok(Some(balance))
        }
        TransactionType::Reservation => {
            let mut balance = state.balance(&tx.user_id);
            balance.credit_pending(tx.amount)?;
            Ok(Some(balance))
        }
        TransactionType::Payout => {
            let mut balance = state
                .balances
                .get(&tx.user_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Balance for {}", tx.user_id)))?;
            balance.release(tx.amount)?;
            Ok(Some(balance))
        }
        TransactionType::Funding => Ok(None),
    }
}

/// Install a prepared balance and append `tx` to the journal.
pub fn commit(state: &mut LedgerState, tx: Transaction, balance: Option<Balance>) {
    if let Some(balance) = balance {
        state.balances.insert(balance.user_id.clone(), balance);
    }
    state.transactions.push(tx);
}

/// Prepare and commit in one step. Used for replay, where nothing sits between the two.
pub fn apply(state: &mut LedgerState, tx: &Transaction) -> Result<()> {
    let balance = prepare(state, tx)?;
    commit(state, tx.clone(), balance);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(user: &str, amount: u64, tx_type: TransactionType) -> Transaction {
        Transaction::new(user, Some("c1"), amount, tx_type, "test")
    }

    #[test]
    fn test_apply_deposit() {
        let mut state = LedgerState::new();
        apply(&mut state, &tx("alice", 1000, TransactionType::Deposit)).unwrap();
        assert_eq!(state.balance("alice").available, 1000);
        assert_eq!(state.transactions.len(), 1);
    }

    #[test]
    fn test_apply_reservation_then_payout() {
        let mut state = LedgerState::new();
        apply(&mut state, &tx("alice", 100, TransactionType::Reservation)).unwrap();
        apply(&mut state, &tx("alice", 60, TransactionType::Payout)).unwrap();

        let balance = state.balance("alice");
        assert_eq!(balance.pending, 40);
        assert_eq!(balance.available, 60);
        assert_eq!(state.transactions.len(), 2);
    }

    #[test]
    fn test_payout_without_balance() {
        let mut state = LedgerState::new();
        let result = apply(&mut state, &tx("ghost", 1, TransactionType::Payout));
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(state.transactions.is_empty());
        assert!(!state.has_balance("ghost"));
    }

    #[test]
    fn test_payout_insufficient_leaves_state() {
        let mut state = LedgerState::new();
        apply(&mut state, &tx("alice", 10, TransactionType::Reservation)).unwrap();
        let before = state.clone();
        let result = apply(&mut state, &tx("alice", 11, TransactionType::Payout));
        assert!(matches!(result, Err(Error::InsufficientPending { .. })));
        assert_eq!(state, before);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut state = LedgerState::new();
        for tx_type in [
            TransactionType::Deposit,
            TransactionType::Reservation,
            TransactionType::Payout,
            TransactionType::Refund,
            TransactionType::Funding,
        ] {
            let result = apply(&mut state, &tx("alice", 0, tx_type));
            assert_eq!(result, Err(Error::InvalidAmount(0)));
        }
        assert!(state.transactions.is_empty());
    }

    #[test]
    fn test_funding_is_journal_only() {
        let mut state = LedgerState::new();
        apply(&mut state, &tx("creator", 500, TransactionType::Funding)).unwrap();
        assert!(!state.has_balance("creator"));
        assert_eq!(state.transactions.len(), 1);
    }
}
