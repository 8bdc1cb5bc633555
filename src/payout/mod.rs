//! Payout engine: clip payments, campaign payment batches and payout processing.

pub mod calculation;

pub use calculation::{calculate_clip_payment, platform_fee, round_to_units};

use crate::collaborators::{
    fetch_approved_clips, CampaignDataSource, CampaignSnapshot, Clip, ClipDataProvider,
};
use crate::error::Result;
use crate::ledger::{BalanceLedger, Transaction};
use crate::storage::Storage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Computed payment for one clip. Never persisted; it drives ledger releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorPayment {
    pub editor_id: String,
    pub clip_id: String,
    pub views: u64,
    pub gross_amount: u64,
    pub platform_fee: u64,
    pub net_amount: u64,
}

impl EditorPayment {
    pub fn for_clip(clip: &Clip, campaign: &CampaignSnapshot, fee_percent: Decimal) -> Self {
        let gross_amount = calculate_clip_payment(
            clip.views,
            campaign.payment_type,
            campaign.base_pay,
            campaign.reward_per_view,
            campaign.limit_per_clip,
        );
        let fee = platform_fee(gross_amount, fee_percent);
        EditorPayment {
            editor_id: clip.user_id.clone(),
            clip_id: clip.id.clone(),
            views: clip.views,
            gross_amount,
            platform_fee: fee,
            net_amount: gross_amount - fee,
        }
    }
}

/// Result of a payout batch: how many releases went through, and which.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReport {
    pub succeeded: usize,
    pub payouts: Vec<EditorPayment>,
}

pub struct PayoutCalculator<S: Storage> {
    ledger: Arc<BalanceLedger<S>>,
    campaigns: Arc<dyn CampaignDataSource>,
    clips: Arc<dyn ClipDataProvider>,
    fee_percent: Decimal,
}

impl<S: Storage> PayoutCalculator<S> {
    pub fn new(
        ledger: Arc<BalanceLedger<S>>,
        campaigns: Arc<dyn CampaignDataSource>,
        clips: Arc<dyn ClipDataProvider>,
        fee_percent: Decimal,
    ) -> Self {
        PayoutCalculator {
            ledger,
            campaigns,
            clips,
            fee_percent,
        }
    }

    /// One payment per approved clip. Read-only.
    pub fn calculate_campaign_payments(&self, campaign_id: &str) -> Result<Vec<EditorPayment>> {
        let campaign = self.campaigns.get_campaign(campaign_id)?;
        let clips = fetch_approved_clips(self.clips.as_ref(), campaign_id);
        let payments: Vec<EditorPayment> = clips
            .iter()
            .map(|clip| EditorPayment::for_clip(clip, &campaign, self.fee_percent))
            .collect();
        tracing::debug!(
            campaign = campaign_id,
            clips = payments.len(),
            gross = payments.iter().map(|p| p.gross_amount).sum::<u64>(),
            "campaign payments calculated"
        );
        Ok(payments)
    }

    /// Release each clip's net payment from what its editor has reserved in the campaign.
    ///
    /// Each clip is paid at most once (keyed `clip:<id>`), and never beyond the editor's
    /// outstanding reservations in `campaign_id`. Per-editor failures are logged and skipped.
    pub fn process_payouts(&self, campaign_id: &str) -> Result<PayoutReport> {
        let payments = self.calculate_campaign_payments(campaign_id)?;
        let mut report = PayoutReport::default();

        for mut payment in payments {
            if payment.net_amount == 0 {
                tracing::debug!(
                    campaign = campaign_id,
                    clip = %payment.clip_id,
                    "nothing to pay for clip"
                );
                continue;
            }
            let description = format!("Payout for clip {}", payment.clip_id);
            match self.ledger.release_once(
                &payment.editor_id,
                payment.net_amount,
                campaign_id,
                &clip_reference(&payment.clip_id),
                &description,
            ) {
                Ok(Some(tx)) => {
                    payment.net_amount = tx.amount;
                    report.succeeded += 1;
                    report.payouts.push(payment);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        campaign = campaign_id,
                        editor = %payment.editor_id,
                        clip = %payment.clip_id,
                        amount = payment.net_amount,
                        error = %e,
                        "payout release failed"
                    );
                }
            }
        }

        tracing::info!(
            campaign = campaign_id,
            succeeded = report.succeeded,
            "payouts processed"
        );
        Ok(report)
    }

    /// Reserve the net payment for a newly approved clip, once per clip.
    ///
    /// Returns `Ok(None)` when the clip was already reserved or pays nothing.
    pub fn reserve_clip_payment(
        &self,
        campaign_id: &str,
        clip: &Clip,
    ) -> Result<Option<Transaction>> {
        let campaign = self.campaigns.get_campaign(campaign_id)?;
        let payment = EditorPayment::for_clip(clip, &campaign, self.fee_percent);
        if payment.net_amount == 0 {
            tracing::info!(campaign = campaign_id, clip = %clip.id, "approved clip pays nothing");
            return Ok(None);
        }
        self.ledger.reserve_funds_once(
            &payment.editor_id,
            payment.net_amount,
            campaign_id,
            &clip_reference(&clip.id),
            &format!("Reservation for clip {}", clip.id),
        )
    }
}

fn clip_reference(clip_id: &str) -> String {
    format!("clip:{}", clip_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{PaymentType, StaticCampaignData};
    use crate::events::InMemoryEventBus;
    use crate::ledger::TransactionType;
    use crate::storage::MemoryStorage;
    use rust_decimal_macros::dec;

    fn campaign() -> CampaignSnapshot {
        CampaignSnapshot {
            created_by: "creator".to_string(),
            title: "Launch".to_string(),
            total_budget: 10_000,
            spent_budget: 0,
            is_funded: true,
            enable_leaderboard: false,
            payment_type: PaymentType::Hybrid,
            base_pay: dec!(100),
            reward_per_view: dec!(2),
            limit_per_clip: None,
            leaderboard_metric: Default::default(),
        }
    }

    fn clip(id: &str, user: &str, views: u64) -> Clip {
        Clip {
            id: id.to_string(),
            user_id: user.to_string(),
            views,
            likes: 0,
            engagement: 0.0,
        }
    }

    fn setup() -> (PayoutCalculator<MemoryStorage>, Arc<BalanceLedger<MemoryStorage>>) {
        let data = Arc::new(StaticCampaignData::new());
        data.set_campaign("c1", campaign());
        data.set_clips("c1", vec![clip("k1", "ed1", 10), clip("k2", "ed2", 50)]);
        let bus = Arc::new(InMemoryEventBus::connected());
        let ledger = Arc::new(BalanceLedger::open(MemoryStorage::new(), bus).unwrap());
        let calc = PayoutCalculator::new(ledger.clone(), data.clone(), data, dec!(10));
        (calc, ledger)
    }

    #[test]
    fn test_calculate_campaign_payments() {
        let (calc, _ledger) = setup();
        let payments = calc.calculate_campaign_payments("c1").unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(
            payments[0],
            EditorPayment {
                editor_id: "ed1".to_string(),
                clip_id: "k1".to_string(),
                views: 10,
                gross_amount: 120,
                platform_fee: 12,
                net_amount: 108,
            }
        );
        assert_eq!(payments[1].gross_amount, 200);
        assert_eq!(payments[1].net_amount, 180);
    }

    #[test]
    fn test_unknown_campaign() {
        let (calc, _ledger) = setup();
        assert!(calc.calculate_campaign_payments("nope").is_err());
    }

    #[test]
    fn test_process_payouts_isolates_failures() {
        let (calc, ledger) = setup();
        // Only ed1 has anything reserved
        calc.reserve_clip_payment("c1", &clip("k1", "ed1", 10)).unwrap();

        let report = calc.process_payouts("c1").unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.payouts[0].editor_id, "ed1");
        assert_eq!(ledger.get_balance("ed1").unwrap().available, 108);
        assert_eq!(ledger.get_balance("ed2").unwrap().total(), 0);

        // Second run: clip already paid, nothing released
        let again = calc.process_payouts("c1").unwrap();
        assert_eq!(again.succeeded, 0);
        assert_eq!(ledger.get_balance("ed1").unwrap().available, 108);
    }

    #[test]
    fn test_process_payouts_never_draws_other_campaigns() {
        let (calc, ledger) = setup();
        calc.reserve_clip_payment("c1", &clip("k1", "ed1", 10)).unwrap();
        ledger.reserve_funds("ed1", 500, "c2", "clip elsewhere").unwrap();

        assert_eq!(calc.process_payouts("c1").unwrap().succeeded, 1);
        assert_eq!(calc.process_payouts("c1").unwrap().succeeded, 0);

        let paid: u64 = ledger
            .transactions_for("ed1", Some("c1"))
            .unwrap()
            .iter()
            .filter(|tx| tx.tx_type == TransactionType::Payout)
            .map(|tx| tx.amount)
            .sum();
        assert_eq!(paid, 108);
        let balance = ledger.get_balance("ed1").unwrap();
        assert_eq!((balance.available, balance.pending), (108, 500));
        assert_eq!(
            ledger.outstanding_reservations("c2").unwrap(),
            vec![("ed1".to_string(), 500)]
        );
    }

    #[test]
    fn test_reserve_clip_payment_once() {
        let (calc, ledger) = setup();
        let k2 = clip("k2", "ed2", 50);
        assert!(calc.reserve_clip_payment("c1", &k2).unwrap().is_some());
        assert!(calc.reserve_clip_payment("c1", &k2).unwrap().is_none());
        assert_eq!(ledger.get_balance("ed2").unwrap().pending, 180);
    }
}
