pub mod kv;
pub mod memory;

pub use kv::FileStorage;
pub use memory::{MemoryLeaderboardStore, MemoryStorage};

use crate::error::Result;
use crate::leaderboard::{LeaderboardEntry, LeaderboardPhase};
use crate::ledger::{LedgerState, Transaction};

/// Storage abstraction for the ledger journal and state snapshots.
///
/// Implementations must preserve:
/// - Append-only semantics for the journal (an appended entry is durable before `Ok`)
/// - Atomic snapshot writes (crash-safe)
/// - Deterministic replay from the journal
pub trait Storage {
    /// Append a transaction to the journal
    fn append_tx(&mut self, tx: &Transaction) -> Result<()>;

    /// Load the latest snapshot with the number of journal entries it covers
    ///
    /// Returns `None` if no snapshot exists (genesis state).
    fn load_state(&self) -> Result<Option<(LedgerState, u64)>>;

    /// Persist a snapshot covering the first `next_tx_id` journal entries
    fn persist_state(&mut self, state: &LedgerState, next_tx_id: u64) -> Result<()>;

    /// Load journal entries starting at position `from_tx_id` (inclusive, 0-based)
    fn load_txs_from(&self, from_tx_id: u64) -> Result<Vec<Transaction>>;
}

/// Persistence for leaderboard entries and per-campaign phase.
///
/// Entries are unique on `submission_id`; `upsert` replaces in place so stored order
/// stays the order of first insertion.
pub trait LeaderboardStore: Send + Sync {
    fn upsert(&self, entry: LeaderboardEntry) -> Result<()>;

    /// Entries of one campaign in stored order
    fn entries(&self, campaign_id: &str) -> Result<Vec<LeaderboardEntry>>;

    fn phase(&self, campaign_id: &str) -> Result<LeaderboardPhase>;

    fn set_phase(&self, campaign_id: &str, phase: LeaderboardPhase) -> Result<()>;
}
