//! Campaign closure saga.
//!
//! Runs when a campaign ends: finalize the leaderboard and reserve prizes, release every
//! outstanding reservation, refund unspent budget to the creator, then audit. Each step is
//! idempotent against the ledger, so a redelivered `campaign.ended` re-runs the saga
//! without moving money twice.

use crate::collaborators::{record_audit, AuditSink, CampaignDataSource, CampaignSnapshot};
use crate::error::{Error, Result};
use crate::events::{publish_best_effort, DomainEvent, EventBus};
use crate::leaderboard::LeaderboardEngine;
use crate::ledger::BalanceLedger;
use crate::prize::{PrizeAward, PrizeDistributor};
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorRelease {
    pub editor_id: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureOutcome {
    pub prizes: Vec<PrizeAward>,
    pub releases: Vec<EditorRelease>,
    /// Editors whose release failed; their reservations stay outstanding.
    pub failed_releases: Vec<String>,
    pub refunded: u64,
}

impl ClosureOutcome {
    pub fn released(&self) -> u64 {
        self.releases.iter().map(|r| r.amount).sum()
    }
}

pub struct CampaignClosureSaga<S: Storage> {
    ledger: Arc<BalanceLedger<S>>,
    leaderboard: Arc<LeaderboardEngine>,
    prizes: Arc<PrizeDistributor<S>>,
    campaigns: Arc<dyn CampaignDataSource>,
    audit: Arc<dyn AuditSink>,
    bus: Arc<dyn EventBus>,
}

impl<S: Storage> CampaignClosureSaga<S> {
    pub fn new(
        ledger: Arc<BalanceLedger<S>>,
        leaderboard: Arc<LeaderboardEngine>,
        prizes: Arc<PrizeDistributor<S>>,
        campaigns: Arc<dyn CampaignDataSource>,
        audit: Arc<dyn AuditSink>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        CampaignClosureSaga {
            ledger,
            leaderboard,
            prizes,
            campaigns,
            audit,
            bus,
        }
    }

    /// Fetch the campaign and close it.
    pub fn close_campaign(&self, campaign_id: &str) -> Result<ClosureOutcome> {
        let campaign = self.campaigns.get_campaign(campaign_id).map_err(|e| {
            tracing::error!(
                campaign = campaign_id,
                error = %e,
                "campaign lookup failed, closure aborted"
            );
            e
        })?;
        self.handle_campaign_ended(campaign_id, &campaign)
    }

    pub fn handle_campaign_ended(
        &self,
        campaign_id: &str,
        campaign: &CampaignSnapshot,
    ) -> Result<ClosureOutcome> {
        tracing::info!(campaign = campaign_id, "closing campaign");
        let mut outcome = ClosureOutcome::default();

        if campaign.enable_leaderboard {
            outcome.prizes = self
                .settle_leaderboard(campaign_id)
                .map_err(step_failed(campaign_id, "leaderboard"))?;
        }

        self.release_all(campaign_id, &mut outcome).map_err(step_failed(campaign_id, "release"))?;

        outcome.refunded = self
            .refund_creator(campaign_id, campaign)
            .map_err(step_failed(campaign_id, "refund"))?;

        record_audit(
            self.audit.as_ref(),
            &campaign.created_by,
            "campaign.closed",
            json!({
                "campaign_id": campaign_id,
                "prizes": outcome.prizes.len(),
                "released": outcome.released(),
                "failed_releases": outcome.failed_releases,
                "refunded": outcome.refunded,
            }),
        );
        if outcome.released() > 0 || outcome.refunded > 0 {
            publish_best_effort(
                self.bus.as_ref(),
                DomainEvent::CampaignClosed {
                    campaign_id: campaign_id.to_string(),
                    released: outcome.released(),
                    refunded: outcome.refunded,
                },
            );
        } else {
            tracing::debug!(campaign = campaign_id, "no money moved, closure not announced");
        }

        tracing::info!(
            campaign = campaign_id,
            released = outcome.released(),
            failed = outcome.failed_releases.len(),
            refunded = outcome.refunded,
            "campaign closed"
        );
        Ok(outcome)
    }

    fn settle_leaderboard(&self, campaign_id: &str) -> Result<Vec<PrizeAward>> {
        self.leaderboard.finalize_leaderboard(campaign_id)?;
        self.prizes.distribute_prizes(campaign_id)
    }

    fn release_all(&self, campaign_id: &str, outcome: &mut ClosureOutcome) -> Result<()> {
        let outstanding = self.ledger.outstanding_reservations(campaign_id)?;
        for (editor_id, remainder) in outstanding {
            match self
                .ledger
                .release_outstanding(&editor_id, campaign_id, "Campaign closure release")
            {
                Ok(Some(tx)) => outcome.releases.push(EditorRelease {
                    editor_id,
                    amount: tx.amount,
                }),
                Ok(None) => {
                    tracing::debug!(
                        campaign = campaign_id,
                        editor = %editor_id,
                        remainder,
                        "already released"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        campaign = campaign_id,
                        editor = %editor_id,
                        remainder,
                        error = %e,
                        "release failed"
                    );
                    outcome.failed_releases.push(editor_id);
                }
            }
        }
        Ok(())
    }

    fn refund_creator(&self, campaign_id: &str, campaign: &CampaignSnapshot) -> Result<u64> {
        let unspent = campaign.unspent_budget();
        if !campaign.is_funded || unspent == 0 {
            tracing::debug!(
                campaign = campaign_id,
                funded = campaign.is_funded,
                unspent,
                "no refund due"
            );
            return Ok(0);
        }
        let refunded = self.ledger.refund_campaign_remainder(
            &campaign.created_by,
            unspent,
            campaign_id,
            "Unspent campaign budget",
        )?;
        Ok(refunded.map(|tx| tx.amount).unwrap_or(0))
    }
}

fn step_failed<'a>(campaign_id: &'a str, step: &'static str) -> impl FnOnce(Error) -> Error + 'a {
    move |e| {
        tracing::error!(campaign = campaign_id, step, error = %e, "closure step failed");
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        Clip, PaymentType, PrizeConfigProvider, PrizeSlot, StaticCampaignData,
    };
    use crate::events::InMemoryEventBus;
    use crate::storage::{MemoryLeaderboardStore, MemoryStorage};
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAudit(Mutex<Vec<(String, String)>>);

    impl AuditSink for RecordingAudit {
        fn record(&self, user_id: &str, action: &str, _: &serde_json::Value) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push((user_id.to_string(), action.to_string()));
            Ok(())
        }
    }

    struct Harness {
        saga: CampaignClosureSaga<MemoryStorage>,
        ledger: Arc<BalanceLedger<MemoryStorage>>,
        leaderboard: Arc<LeaderboardEngine>,
        data: Arc<StaticCampaignData>,
        audit: Arc<RecordingAudit>,
        bus: Arc<InMemoryEventBus>,
    }

    struct UnavailablePrizes;

    impl PrizeConfigProvider for UnavailablePrizes {
        fn prize_slots(&self, _campaign_id: &str) -> Result<Vec<PrizeSlot>> {
            Err(Error::UpstreamUnavailable("prize service down".to_string()))
        }
    }

    fn harness() -> Harness {
        let data = Arc::new(StaticCampaignData::new());
        harness_with_prizes(data.clone(), data)
    }

    fn harness_with_prizes(
        data: Arc<StaticCampaignData>,
        prize_config: Arc<dyn PrizeConfigProvider>,
    ) -> Harness {
        let bus = Arc::new(InMemoryEventBus::connected());
        let audit = Arc::new(RecordingAudit::default());
        let ledger = Arc::new(BalanceLedger::open(MemoryStorage::new(), bus.clone()).unwrap());
        let leaderboard = Arc::new(LeaderboardEngine::new(
            Arc::new(MemoryLeaderboardStore::new()),
            data.clone(),
            bus.clone(),
        ));
        let prizes = Arc::new(PrizeDistributor::new(
            ledger.clone(),
            leaderboard.clone(),
            prize_config,
            bus.clone(),
        ));
        let saga = CampaignClosureSaga::new(
            ledger.clone(),
            leaderboard.clone(),
            prizes,
            data.clone(),
            audit.clone(),
            bus.clone(),
        );
        Harness {
            saga,
            ledger,
            leaderboard,
            data,
            audit,
            bus,
        }
    }

    fn campaign(leaderboard: bool) -> CampaignSnapshot {
        CampaignSnapshot {
            created_by: "creator".to_string(),
            title: "Summer".to_string(),
            total_budget: 1000,
            spent_budget: 400,
            is_funded: true,
            enable_leaderboard: leaderboard,
            payment_type: PaymentType::Fixed,
            base_pay: Decimal::from(100),
            reward_per_view: Decimal::ZERO,
            limit_per_clip: None,
            leaderboard_metric: Default::default(),
        }
    }

    #[test]
    fn test_release_and_refund() {
        let h = harness();
        h.ledger.reserve_funds("ed1", 600, "c1", "clip").unwrap();

        let outcome = h.saga.handle_campaign_ended("c1", &campaign(false)).unwrap();
        assert_eq!(outcome.released(), 600);
        assert_eq!(outcome.refunded, 600);
        assert!(outcome.failed_releases.is_empty());

        let editor = h.ledger.get_balance("ed1").unwrap();
        assert_eq!((editor.available, editor.pending), (600, 0));
        assert_eq!(h.ledger.get_balance("creator").unwrap().available, 600);
        assert_eq!(
            h.audit.0.lock().unwrap().as_slice(),
            [("creator".to_string(), "campaign.closed".to_string())]
        );
        assert_eq!(h.bus.published_with_key("campaign.closed").len(), 1);
    }

    #[test]
    fn test_rerun_moves_nothing() {
        let h = harness();
        h.ledger.reserve_funds("ed1", 600, "c1", "clip").unwrap();
        h.saga.handle_campaign_ended("c1", &campaign(false)).unwrap();

        let again = h.saga.handle_campaign_ended("c1", &campaign(false)).unwrap();
        assert_eq!(again.released(), 0);
        assert_eq!(again.refunded, 0);
        assert_eq!(h.ledger.get_balance("ed1").unwrap().available, 600);
        assert_eq!(h.ledger.get_balance("creator").unwrap().available, 600);
        assert_eq!(h.bus.published_with_key("campaign.closed").len(), 1);
    }

    #[test]
    fn test_failed_release_still_refunds() {
        let h = harness();
        h.ledger.reserve_funds("ed1", 100, "c1", "clip").unwrap();
        // Pending drained elsewhere, so the c1 remainder can no longer be released
        h.ledger.release_pending("ed1", 100, "c2", "other payout").unwrap();

        let outcome = h.saga.handle_campaign_ended("c1", &campaign(false)).unwrap();
        assert_eq!(outcome.failed_releases, vec!["ed1".to_string()]);
        assert_eq!(outcome.released(), 0);
        assert_eq!(outcome.refunded, 600);
        assert_eq!(h.ledger.get_balance("creator").unwrap().available, 600);
        assert_eq!(
            h.ledger.outstanding_reservations("c1").unwrap(),
            vec![("ed1".to_string(), 100)]
        );
        assert_eq!(h.audit.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_prize_lookup_failure_aborts_closure() {
        let data = Arc::new(StaticCampaignData::new());
        let h = harness_with_prizes(data, Arc::new(UnavailablePrizes));
        h.ledger.reserve_funds("ed1", 600, "c1", "clip").unwrap();

        let result = h.saga.handle_campaign_ended("c1", &campaign(true));
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
        // Nothing after the failed step ran
        assert_eq!(h.ledger.get_balance("ed1").unwrap().pending, 600);
        assert!(!h.ledger.has_refund("c1").unwrap());
        assert!(h.audit.0.lock().unwrap().is_empty());
        assert!(h.bus.published_with_key("campaign.closed").is_empty());
    }

    #[test]
    fn test_unfunded_or_spent_campaign_not_refunded() {
        let h = harness();
        let mut unfunded = campaign(false);
        unfunded.is_funded = false;
        assert_eq!(h.saga.handle_campaign_ended("c1", &unfunded).unwrap().refunded, 0);

        let mut spent = campaign(false);
        spent.spent_budget = 1500;
        assert_eq!(h.saga.handle_campaign_ended("c2", &spent).unwrap().refunded, 0);
        assert!(!h.ledger.has_refund("c2").unwrap());
    }

    #[test]
    fn test_leaderboard_prizes_released() {
        let h = harness();
        h.data.set_clips(
            "c1",
            vec![Clip {
                id: "k1".to_string(),
                user_id: "ed1".to_string(),
                views: 10,
                likes: 0,
                engagement: 0.0,
            }],
        );
        h.data.set_prizes(
            "c1",
            vec![PrizeSlot {
                position: 1,
                reward: 250,
                label: "Gold".to_string(),
            }],
        );
        h.leaderboard
            .calculate_leaderboard("c1", Default::default())
            .unwrap();

        let outcome = h.saga.handle_campaign_ended("c1", &campaign(true)).unwrap();
        assert_eq!(outcome.prizes.len(), 1);
        assert_eq!(outcome.released(), 250);
        assert_eq!(h.ledger.get_balance("ed1").unwrap().available, 250);
    }

    #[test]
    fn test_close_campaign_unknown() {
        let h = harness();
        assert!(matches!(h.saga.close_campaign("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_close_campaign_fetches_snapshot() {
        let h = harness();
        h.data.set_campaign("c1", campaign(false));
        let outcome = h.saga.close_campaign("c1").unwrap();
        assert_eq!(outcome.refunded, 600);
    }
}
