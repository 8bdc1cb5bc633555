//! Prize distribution over a finalized leaderboard.

use crate::collaborators::{PrizeConfigProvider, PrizeSlot};
use crate::error::Result;
use crate::events::{publish_best_effort, DomainEvent, EventBus};
use crate::leaderboard::{LeaderboardEngine, LeaderboardEntry};
use crate::ledger::BalanceLedger;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeAward {
    pub position: u32,
    pub editor_id: String,
    pub amount: u64,
    pub label: String,
}

pub struct PrizeDistributor<S: Storage> {
    ledger: Arc<BalanceLedger<S>>,
    leaderboard: Arc<LeaderboardEngine>,
    prizes: Arc<dyn PrizeConfigProvider>,
    bus: Arc<dyn EventBus>,
}

impl<S: Storage> PrizeDistributor<S> {
    pub fn new(
        ledger: Arc<BalanceLedger<S>>,
        leaderboard: Arc<LeaderboardEngine>,
        prizes: Arc<dyn PrizeConfigProvider>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        PrizeDistributor {
            ledger,
            leaderboard,
            prizes,
            bus,
        }
    }

    /// Reserve each configured prize for the first editor holding that rank.
    ///
    /// Prizes are keyed `prize:<position>` in the ledger, so a repeated call returns the
    /// same awards without reserving twice. A slot with no matching rank (ties leave
    /// gaps) or a failed reservation is logged and skipped.
    pub fn distribute_prizes(&self, campaign_id: &str) -> Result<Vec<PrizeAward>> {
        let mut slots = self.prizes.prize_slots(campaign_id)?;
        slots.sort_by_key(|s| s.position);
        let entries = self.leaderboard.entries_by_rank(campaign_id)?;

        let mut awards = Vec::new();
        for slot in &slots {
            let Some(winner) = winner_for(&entries, slot.position) else {
                tracing::warn!(
                    campaign = campaign_id,
                    position = slot.position,
                    "no leaderboard entry holds this position, prize skipped"
                );
                continue;
            };
            if slot.reward == 0 {
                tracing::debug!(
                    campaign = campaign_id,
                    position = slot.position,
                    "zero prize skipped"
                );
                continue;
            }

            match self.reserve(campaign_id, slot, winner) {
                Ok(award) => awards.push(award),
                Err(e) => {
                    tracing::warn!(
                        campaign = campaign_id,
                        position = slot.position,
                        editor = %winner.editor_id,
                        error = %e,
                        "prize reservation failed"
                    );
                }
            }
        }

        tracing::info!(
            campaign = campaign_id,
            awarded = awards.len(),
            slots = slots.len(),
            "prizes distributed"
        );
        Ok(awards)
    }

    fn reserve(
        &self,
        campaign_id: &str,
        slot: &PrizeSlot,
        winner: &LeaderboardEntry,
    ) -> Result<PrizeAward> {
        let reference = format!("prize:{}", slot.position);
        let description = if slot.label.is_empty() {
            format!("Prize for position {}", slot.position)
        } else {
            format!("Prize for position {} ({})", slot.position, slot.label)
        };
        let created = self.ledger.reserve_funds_once(
            &winner.editor_id,
            slot.reward,
            campaign_id,
            &reference,
            &description,
        )?;

        let award = PrizeAward {
            position: slot.position,
            editor_id: winner.editor_id.clone(),
            amount: slot.reward,
            label: slot.label.clone(),
        };
        if created.is_some() {
            publish_best_effort(
                self.bus.as_ref(),
                DomainEvent::PrizeDistributed {
                    campaign_id: campaign_id.to_string(),
                    editor_id: award.editor_id.clone(),
                    position: award.position,
                    amount: award.amount,
                    label: award.label.clone(),
                },
            );
        }
        Ok(award)
    }
}

/// First entry (in rank order, stable) whose rank equals `position`.
fn winner_for(entries: &[LeaderboardEntry], position: u32) -> Option<&LeaderboardEntry> {
    entries.iter().find(|e| e.rank == position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Clip, StaticCampaignData};
    use crate::events::InMemoryEventBus;
    use crate::leaderboard::LeaderboardMetric;
    use crate::storage::{MemoryLeaderboardStore, MemoryStorage};

    struct Fixture {
        distributor: PrizeDistributor<MemoryStorage>,
        ledger: Arc<BalanceLedger<MemoryStorage>>,
        leaderboard: Arc<LeaderboardEngine>,
        data: Arc<StaticCampaignData>,
        bus: Arc<InMemoryEventBus>,
    }

    fn fixture() -> Fixture {
        let data = Arc::new(StaticCampaignData::new());
        let bus = Arc::new(InMemoryEventBus::connected());
        let ledger = Arc::new(BalanceLedger::open(MemoryStorage::new(), bus.clone()).unwrap());
        let leaderboard = Arc::new(LeaderboardEngine::new(
            Arc::new(MemoryLeaderboardStore::new()),
            data.clone(),
            bus.clone(),
        ));
        let distributor =
            PrizeDistributor::new(ledger.clone(), leaderboard.clone(), data.clone(), bus.clone());
        Fixture {
            distributor,
            ledger,
            leaderboard,
            data,
            bus,
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

    fn slot(position: u32, reward: u64) -> PrizeSlot {
        PrizeSlot {
            position,
            reward,
            label: format!("#{}", position),
        }
    }

    #[test]
    fn test_distribute_to_ranked_editors() {
        let f = fixture();
        f.data.set_clips("c1", vec![clip("k1", "ann", 10), clip("k2", "bo", 50)]);
        f.data.set_prizes("c1", vec![slot(2, 100), slot(1, 300)]);
        f.leaderboard.calculate_leaderboard("c1", LeaderboardMetric::Views).unwrap();
        f.leaderboard.finalize_leaderboard("c1").unwrap();

        let awards = f.distributor.distribute_prizes("c1").unwrap();
        assert_eq!(awards.len(), 2);
        assert_eq!((awards[0].position, awards[0].editor_id.as_str()), (1, "bo"));
        assert_eq!((awards[1].position, awards[1].editor_id.as_str()), (2, "ann"));
        assert_eq!(f.ledger.get_balance("bo").unwrap().pending, 300);
        assert_eq!(f.ledger.get_balance("ann").unwrap().pending, 100);
        assert_eq!(f.bus.published_with_key("prize.distributed").len(), 2);
    }

    #[test]
    fn test_tie_leaves_position_unawarded() {
        let f = fixture();
        f.data.set_clips(
            "c1",
            vec![clip("k1", "ann", 30), clip("k2", "bo", 30), clip("k3", "cy", 5)],
        );
        f.data.set_prizes("c1", vec![slot(1, 300), slot(2, 200), slot(3, 100)]);
        f.leaderboard.calculate_leaderboard("c1", LeaderboardMetric::Views).unwrap();
        f.leaderboard.finalize_leaderboard("c1").unwrap();

        let awards = f.distributor.distribute_prizes("c1").unwrap();
        let positions: Vec<u32> = awards.iter().map(|a| a.position).collect();
        assert_eq!(positions, vec![1, 3]);
        assert_eq!(awards[0].editor_id, "ann");
        assert_eq!(f.ledger.get_balance("bo").unwrap().pending, 0);
    }

    #[test]
    fn test_repeat_does_not_double_reserve() {
        let f = fixture();
        f.data.set_clips("c1", vec![clip("k1", "ann", 10)]);
        f.data.set_prizes("c1", vec![slot(1, 300)]);
        f.leaderboard.calculate_leaderboard("c1", LeaderboardMetric::Views).unwrap();
        f.leaderboard.finalize_leaderboard("c1").unwrap();

        assert_eq!(f.distributor.distribute_prizes("c1").unwrap().len(), 1);
        let again = f.distributor.distribute_prizes("c1").unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(f.ledger.get_balance("ann").unwrap().pending, 300);
        assert_eq!(f.bus.published_with_key("prize.distributed").len(), 1);
    }

    #[test]
    fn test_no_entries_no_awards() {
        let f = fixture();
        f.data.set_prizes("c1", vec![slot(1, 300)]);
        assert!(f.distributor.distribute_prizes("c1").unwrap().is_empty());
    }
}
