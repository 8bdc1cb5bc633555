//! In-memory backends for the ledger journal and the leaderboard tables.

use crate::error::{Error, Result};
use crate::leaderboard::{LeaderboardEntry, LeaderboardPhase};
use crate::ledger::{LedgerState, Transaction};
use crate::storage::{LeaderboardStore, Storage};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    log: Vec<Transaction>,
    snapshot: Option<(LedgerState, u64)>,
    fail_appends: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Make every subsequent append fail (simulates a storage outage).
    pub fn set_fail_appends(&mut self, fail: bool) {
        self.fail_appends = fail;
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }
}

impl Storage for MemoryStorage {
    fn append_tx(&mut self, tx: &Transaction) -> Result<()> {
        if self.fail_appends {
            return Err(Error::StorageError("journal unavailable".to_string()));
        }
        self.log.push(tx.clone());
        Ok(())
    }

    fn load_state(&self) -> Result<Option<(LedgerState, u64)>> {
        Ok(self.snapshot.clone())
    }

    fn persist_state(&mut self, state: &LedgerState, next_tx_id: u64) -> Result<()> {
        self.snapshot = Some((state.clone(), next_tx_id));
        Ok(())
    }

    fn load_txs_from(&self, from_tx_id: u64) -> Result<Vec<Transaction>> {
        Ok(self
            .log
            .iter()
            .skip(from_tx_id as usize)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct LeaderboardTables {
    entries: Vec<LeaderboardEntry>,
    phases: HashMap<String, LeaderboardPhase>,
}

#[derive(Debug, Default)]
pub struct MemoryLeaderboardStore {
    tables: RwLock<LeaderboardTables>,
}

impl MemoryLeaderboardStore {
    pub fn new() -> Self {
        MemoryLeaderboardStore::default()
    }
}

fn poisoned() -> Error {
    Error::StorageError("leaderboard tables poisoned".to_string())
}

impl LeaderboardStore for MemoryLeaderboardStore {
    fn upsert(&self, entry: LeaderboardEntry) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        match tables
            .entries
            .iter_mut()
            .find(|e| e.submission_id == entry.submission_id)
        {
            Some(existing) => *existing = entry,
            None => tables.entries.push(entry),
        }
        Ok(())
    }

    fn entries(&self, campaign_id: &str) -> Result<Vec<LeaderboardEntry>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .entries
            .iter()
            .filter(|e| e.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    fn phase(&self, campaign_id: &str) -> Result<LeaderboardPhase> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .phases
            .get(campaign_id)
            .copied()
            .unwrap_or(LeaderboardPhase::Open))
    }

    fn set_phase(&self, campaign_id: &str, phase: LeaderboardPhase) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.phases.insert(campaign_id.to_string(), phase);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionType;

    fn entry(submission: &str, score: f64) -> LeaderboardEntry {
        LeaderboardEntry {
            campaign_id: "c1".to_string(),
            submission_id: submission.to_string(),
            editor_id: format!("editor-{}", submission),
            views: 0,
            likes: 0,
            engagement: 0.0,
            score,
            rank: 0,
        }
    }

    #[test]
    fn test_memory_storage_fail_appends() {
        let mut storage = MemoryStorage::new();
        let tx = Transaction::new("alice", None, 1, TransactionType::Deposit, "x");
        storage.append_tx(&tx).unwrap();
        storage.set_fail_appends(true);
        assert!(storage.append_tx(&tx).is_err());
        assert_eq!(storage.log_len(), 1);
        assert_eq!(storage.load_txs_from(1).unwrap().len(), 0);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let store = MemoryLeaderboardStore::new();
        store.upsert(entry("a", 1.0)).unwrap();
        store.upsert(entry("b", 2.0)).unwrap();
        store.upsert(entry("a", 5.0)).unwrap();

        let entries = store.entries("c1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].submission_id, "a");
        assert_eq!(entries[0].score, 5.0);
        assert!(store.entries("c2").unwrap().is_empty());
    }

    #[test]
    fn test_phase_defaults_open() {
        let store = MemoryLeaderboardStore::new();
        assert_eq!(store.phase("c1").unwrap(), LeaderboardPhase::Open);
        store.set_phase("c1", LeaderboardPhase::Finalized).unwrap();
        assert_eq!(store.phase("c1").unwrap(), LeaderboardPhase::Finalized);
    }
}
