//! Replay service: rebuild ledger state from storage.

use crate::error::Result;
use crate::ledger::{apply, LedgerState, Transaction};
use crate::storage::Storage;

/// Replay the journal from storage to the current tip.
///
/// - With a snapshot: load it, then replay entries from its `next_tx_id`.
/// - Without one: replay from genesis (position 0).
///
/// Returns the state and the journal position of the next entry.
pub fn replay_to_tip<S: Storage>(storage: &S) -> Result<(LedgerState, u64)> {
    let (state, next_tx_id) = storage
        .load_state()?
        .unwrap_or_else(|| (LedgerState::new(), 0));
    let tail = storage.load_txs_from(next_tx_id)?;
    let replayed = tail.len() as u64;
    let state = replay_txs(state, &tail)?;
    if replayed > 0 {
        tracing::debug!(from = next_tx_id, replayed, "replayed journal tail");
    }
    Ok((state, next_tx_id + replayed))
}

/// Apply `txs` in order on top of `state`.
pub fn replay_txs(mut state: LedgerState, txs: &[Transaction]) -> Result<LedgerState> {
    for tx in txs {
        apply(&mut state, tx)?;
    }
    Ok(state)
}
