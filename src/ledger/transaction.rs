use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Credit to available (top-up, manual funding)
    Deposit,
    /// Credit to pending ahead of settlement
    Reservation,
    /// Pending → available
    Payout,
    /// Unspent campaign budget returned to the creator
    Refund,
    /// Journal-only record of a campaign being funded
    Funding,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Reservation => "RESERVATION",
            TransactionType::Payout => "PAYOUT",
            TransactionType::Refund => "REFUND",
            TransactionType::Funding => "FUNDING",
        };
        f.write_str(s)
    }
}

/// Immutable ledger entry. Entries are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub campaign_id: Option<String>,
    pub amount: u64,
    pub tx_type: TransactionType,
    pub description: String,
    /// Idempotency reference within the campaign, e.g. `clip:42` or `prize:1`.
    #[serde(default)]
    pub reference: Option<String>,
    pub created_at: i64,
}

impl Transaction {
    pub fn new(
        user_id: &str,
        campaign_id: Option<&str>,
        amount: u64,
        tx_type: TransactionType,
        description: &str,
    ) -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            campaign_id: campaign_id.map(str::to_string),
            amount,
            tx_type,
            description: description.to_string(),
            reference: None,
            created_at: crate::current_timestamp(),
        }
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn is_for_campaign(&self, campaign_id: &str) -> bool {
        self.campaign_id.as_deref() == Some(campaign_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_new() {
        let tx = Transaction::new("alice", Some("c1"), 100, TransactionType::Reservation, "clip");
        assert_eq!(tx.user_id, "alice");
        assert!(tx.is_for_campaign("c1"));
        assert!(!tx.is_for_campaign("c2"));
        assert!(tx.reference.is_none());
        assert!(Uuid::parse_str(&tx.id).is_ok());
    }

    #[test]
    fn test_with_reference() {
        let tx = Transaction::new("bob", None, 5, TransactionType::Deposit, "top-up")
            .with_reference("manual:1");
        assert_eq!(tx.reference.as_deref(), Some("manual:1"));
        assert!(!tx.is_for_campaign("c1"));
    }

    #[test]
    fn test_type_display_and_serde() {
        assert_eq!(TransactionType::Payout.to_string(), "PAYOUT");
        let json = serde_json::to_string(&TransactionType::Reservation).unwrap();
        assert_eq!(json, "\"RESERVATION\"");
    }
}
