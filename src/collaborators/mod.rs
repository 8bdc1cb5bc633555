//! External collaborators: campaign data, approved clips, prize configuration and audit.
//!
//! The campaign and clip services live outside this crate. These traits are the seams;
//! the submodules provide the in-process implementations (read cache, fallback,
//! timeout guard, static fixtures).

pub mod audit;
pub mod cache;
pub mod fixture;
pub mod timeout;

pub use audit::{record_audit, AuditSink, TracingAuditSink};
pub use cache::{CampaignReadCache, FallbackCampaignSource};
pub use fixture::{CampaignFixture, StaticCampaignData};
pub use timeout::{TimeoutCampaignSource, TimeoutClipProvider, UpstreamCaller};

use crate::error::Result;
use crate::leaderboard::LeaderboardMetric;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Fixed,
    PayPerView,
    Hybrid,
    /// Any payment type this crate does not know; pays nothing.
    #[serde(other)]
    Unknown,
}

/// Campaign configuration as served by the campaign service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub created_by: String,
    pub title: String,
    pub total_budget: u64,
    #[serde(default)]
    pub spent_budget: u64,
    #[serde(default)]
    pub is_funded: bool,
    #[serde(default)]
    pub enable_leaderboard: bool,
    pub payment_type: PaymentType,
    #[serde(default)]
    pub base_pay: Decimal,
    #[serde(default)]
    pub reward_per_view: Decimal,
    #[serde(default)]
    pub limit_per_clip: Option<u64>,
    #[serde(default)]
    pub leaderboard_metric: LeaderboardMetric,
}

impl CampaignSnapshot {
    /// Budget not yet spent, or 0 when overspent.
    pub fn unspent_budget(&self) -> u64 {
        self.total_budget.saturating_sub(self.spent_budget)
    }
}

/// An approved clip with its performance counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub engagement: f64,
}

/// One configured prize: `position` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeSlot {
    pub position: u32,
    pub reward: u64,
    #[serde(default)]
    pub label: String,
}

pub trait CampaignDataSource: Send + Sync {
    /// Fails with `NotFound` for unknown campaigns and `UpstreamUnavailable` when the
    /// source cannot answer.
    fn get_campaign(&self, campaign_id: &str) -> Result<CampaignSnapshot>;
}

pub trait ClipDataProvider: Send + Sync {
    fn approved_clips(&self, campaign_id: &str) -> Result<Vec<Clip>>;
}

pub trait PrizeConfigProvider: Send + Sync {
    fn prize_slots(&self, campaign_id: &str) -> Result<Vec<PrizeSlot>>;
}

/// Approved clips, or an empty list when the provider fails.
pub fn fetch_approved_clips(provider: &dyn ClipDataProvider, campaign_id: &str) -> Vec<Clip> {
    match provider.approved_clips(campaign_id) {
        Ok(clips) => clips,
        Err(e) => {
            tracing::warn!(
                campaign = campaign_id,
                error = %e,
                "clip provider failed, using no clips"
            );
            Vec::new()
        }
    }
}
