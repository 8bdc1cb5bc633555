pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod ingress;
pub mod leaderboard;
pub mod ledger;
pub mod logger;
pub mod payout;
pub mod prize;
pub mod replay;
pub mod saga;
pub mod storage;

use sha2::{Digest, Sha256};

/// Get current Unix timestamp (0 if the clock is before the epoch)
pub fn current_timestamp() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Calculate SHA256 digest
pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}
