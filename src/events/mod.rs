//! Domain events emitted by the ledger, leaderboard, prize and closure components.
//!
//! Every event travels inside an [`Envelope`] whose `event_id` is a deterministic
//! fingerprint of the payload, so consumers can drop redeliveries.

pub mod bus;

pub use bus::{publish_best_effort, EventBus, InMemoryEventBus};

use crate::sha256_digest;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    BalanceChanged {
        user_id: String,
        campaign_id: Option<String>,
        tx_id: String,
        old_available: u64,
        new_available: u64,
        old_pending: u64,
        new_pending: u64,
    },
    FundsReserved {
        user_id: String,
        campaign_id: String,
        tx_id: String,
        amount: u64,
        pending: u64,
    },
    FundsReleased {
        user_id: String,
        campaign_id: String,
        tx_id: String,
        amount: u64,
        available: u64,
        pending: u64,
    },
    FundingRecorded {
        user_id: String,
        campaign_id: String,
        tx_id: String,
        amount: u64,
    },
    LeaderboardFinalized {
        campaign_id: String,
        entries: usize,
    },
    PrizeDistributed {
        campaign_id: String,
        editor_id: String,
        position: u32,
        amount: u64,
        label: String,
    },
    CampaignClosed {
        campaign_id: String,
        released: u64,
        refunded: u64,
    },
}

impl DomainEvent {
    pub fn routing_key(&self) -> &'static str {
        match self {
            DomainEvent::BalanceChanged { .. } => "balance.changed",
            DomainEvent::FundsReserved { .. } => "funds.reserved",
            DomainEvent::FundsReleased { .. } => "funds.released",
            DomainEvent::FundingRecorded { .. } => "funding.recorded",
            DomainEvent::LeaderboardFinalized { .. } => "leaderboard.finalized",
            DomainEvent::PrizeDistributed { .. } => "prize.distributed",
            DomainEvent::CampaignClosed { .. } => "campaign.closed",
        }
    }
}

/// SHA256 of the canonical bincode encoding of `event`, lowercase hex.
pub fn event_fingerprint(event: &DomainEvent) -> String {
    let bytes = bincode::serialize(event).unwrap_or_default();
    hex::encode(sha256_digest(&bytes))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: String,
    pub routing_key: String,
    pub occurred_at: i64,
    pub event: DomainEvent,
}

impl Envelope {
    pub fn new(event: DomainEvent) -> Self {
        Envelope {
            event_id: event_fingerprint(&event),
            routing_key: event.routing_key().to_string(),
            occurred_at: crate::current_timestamp(),
            event,
        }
    }

    /// JSON body as handed to the transport.
    pub fn to_json(&self) -> crate::error::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            crate::error::Error::TransportFailure(format!("Failed to encode event: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(released: u64) -> DomainEvent {
        DomainEvent::CampaignClosed {
            campaign_id: "c1".to_string(),
            released,
            refunded: 0,
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = event_fingerprint(&closed(10));
        assert_eq!(a, event_fingerprint(&closed(10)));
        assert_eq!(a.len(), 64);
        assert_ne!(a, event_fingerprint(&closed(11)));
    }

    #[test]
    fn test_envelope_routing_key() {
        let env = Envelope::new(closed(1));
        assert_eq!(env.routing_key, "campaign.closed");
        assert_eq!(env.event_id, event_fingerprint(&closed(1)));
        assert!(!env.to_json().unwrap().is_empty());
    }
}
