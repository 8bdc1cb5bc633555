//! Leaderboard engine: scores approved clips per campaign and finalizes rankings.
//!
//! A campaign's leaderboard is `Open` while clips come in and becomes `Finalized` at
//! closure. Once finalized, recalculation is skipped and ranks are frozen.

pub mod ranking;

pub use ranking::{assign_competition_ranks, assign_positions, sort_by_score};

use crate::collaborators::{fetch_approved_clips, Clip, ClipDataProvider};
use crate::error::Result;
use crate::events::{publish_best_effort, DomainEvent, EventBus};
use crate::storage::LeaderboardStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaderboardMetric {
    #[default]
    Views,
    Likes,
    Engagement,
}

impl LeaderboardMetric {
    pub fn score(&self, clip: &Clip) -> f64 {
        match self {
            LeaderboardMetric::Views => clip.views as f64,
            LeaderboardMetric::Likes => clip.likes as f64,
            LeaderboardMetric::Engagement => clip.engagement,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaderboardPhase {
    #[default]
    Open,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub campaign_id: String,
    pub submission_id: String,
    pub editor_id: String,
    pub views: u64,
    pub likes: u64,
    pub engagement: f64,
    pub score: f64,
    pub rank: u32,
}

impl LeaderboardEntry {
    pub fn for_clip(campaign_id: &str, clip: &Clip, metric: LeaderboardMetric) -> Self {
        LeaderboardEntry {
            campaign_id: campaign_id.to_string(),
            submission_id: clip.id.clone(),
            editor_id: clip.user_id.clone(),
            views: clip.views,
            likes: clip.likes,
            engagement: clip.engagement,
            score: metric.score(clip),
            rank: 0,
        }
    }
}

pub struct LeaderboardEngine {
    store: Arc<dyn LeaderboardStore>,
    clips: Arc<dyn ClipDataProvider>,
    bus: Arc<dyn EventBus>,
}

impl LeaderboardEngine {
    pub fn new(
        store: Arc<dyn LeaderboardStore>,
        clips: Arc<dyn ClipDataProvider>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        LeaderboardEngine { store, clips, bus }
    }

    /// Score every approved clip and store one entry per submission, ranked by
    /// sorted position. A finalized campaign is left untouched.
    pub fn calculate_leaderboard(
        &self,
        campaign_id: &str,
        metric: LeaderboardMetric,
    ) -> Result<Vec<LeaderboardEntry>> {
        if self.store.phase(campaign_id)? == LeaderboardPhase::Finalized {
            tracing::info!(campaign = campaign_id, "leaderboard finalized, skipping recalculation");
            return self.entries_by_rank(campaign_id);
        }

        let clips = fetch_approved_clips(self.clips.as_ref(), campaign_id);
        let mut entries: Vec<LeaderboardEntry> = clips
            .iter()
            .map(|clip| LeaderboardEntry::for_clip(campaign_id, clip, metric))
            .collect();
        sort_by_score(&mut entries);
        assign_positions(&mut entries);

        for entry in &entries {
            self.store.upsert(entry.clone())?;
        }
        tracing::debug!(
            campaign = campaign_id,
            ?metric,
            entries = entries.len(),
            "leaderboard calculated"
        );
        Ok(entries)
    }

    /// Assign competition ranks to the stored entries and freeze the leaderboard.
    ///
    /// Calling it again on a finalized campaign returns the frozen ranking.
    pub fn finalize_leaderboard(&self, campaign_id: &str) -> Result<Vec<LeaderboardEntry>> {
        if self.store.phase(campaign_id)? == LeaderboardPhase::Finalized {
            tracing::debug!(campaign = campaign_id, "leaderboard already finalized");
            return self.entries_by_rank(campaign_id);
        }

        let mut entries = self.store.entries(campaign_id)?;
        sort_by_score(&mut entries);
        assign_competition_ranks(&mut entries);
        for entry in &entries {
            self.store.upsert(entry.clone())?;
        }
        self.store.set_phase(campaign_id, LeaderboardPhase::Finalized)?;

        tracing::info!(campaign = campaign_id, entries = entries.len(), "leaderboard finalized");
        publish_best_effort(
            self.bus.as_ref(),
            DomainEvent::LeaderboardFinalized {
                campaign_id: campaign_id.to_string(),
                entries: entries.len(),
            },
        );
        Ok(entries)
    }

    /// Stored entries ordered by rank; equal ranks keep stored order.
    pub fn entries_by_rank(&self, campaign_id: &str) -> Result<Vec<LeaderboardEntry>> {
        let mut entries = self.store.entries(campaign_id)?;
        entries.sort_by_key(|e| e.rank);
        Ok(entries)
    }

    pub fn phase(&self, campaign_id: &str) -> Result<LeaderboardPhase> {
        self.store.phase(campaign_id)
    }
}
