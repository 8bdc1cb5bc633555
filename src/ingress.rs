//! Inbound event handling.
//!
//! Decodes transport deliveries by routing key, dispatches them to the payout, ledger and
//! closure components, and settles each delivery exactly once: ack on success, nack with
//! requeue on a handler failure, nack without requeue for payloads that can never succeed.

use crate::collaborators::{CampaignDataSource, CampaignReadCache, CampaignSnapshot, Clip};
use crate::error::{Error, Result};
use crate::leaderboard::LeaderboardEngine;
use crate::ledger::BalanceLedger;
use crate::payout::PayoutCalculator;
use crate::saga::CampaignClosureSaga;
use crate::storage::Storage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const CLIP_APPROVED: &str = "clip.approved";
pub const CAMPAIGN_FUNDED: &str = "campaign.funded";
pub const CAMPAIGN_UPDATED: &str = "campaign.updated";
pub const CAMPAIGN_ENDED: &str = "campaign.ended";

/// Routing keys this service subscribes to.
pub fn routing_keys() -> [&'static str; 4] {
    [CLIP_APPROVED, CAMPAIGN_FUNDED, CAMPAIGN_UPDATED, CAMPAIGN_ENDED]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipApproved {
    pub campaign_id: String,
    pub clip: Clip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignFunded {
    pub campaign_id: String,
    pub created_by: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignUpdated {
    pub campaign_id: String,
    pub campaign: CampaignSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignEnded {
    pub campaign_id: String,
    /// Snapshot carried by the event; fetched from the campaign source when absent.
    #[serde(default)]
    pub campaign: Option<CampaignSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEvent {
    ClipApproved(ClipApproved),
    CampaignFunded(CampaignFunded),
    CampaignUpdated(CampaignUpdated),
    CampaignEnded(CampaignEnded),
}

fn parse<T: DeserializeOwned>(routing_key: &str, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .map_err(|e| Error::InvalidEvent(format!("{} payload: {}", routing_key, e)))
}

impl IncomingEvent {
    pub fn decode(routing_key: &str, payload: &[u8]) -> Result<Self> {
        match routing_key {
            CLIP_APPROVED => Ok(IncomingEvent::ClipApproved(parse(routing_key, payload)?)),
            CAMPAIGN_FUNDED => Ok(IncomingEvent::CampaignFunded(parse(routing_key, payload)?)),
            CAMPAIGN_UPDATED => Ok(IncomingEvent::CampaignUpdated(parse(routing_key, payload)?)),
            CAMPAIGN_ENDED => Ok(IncomingEvent::CampaignEnded(parse(routing_key, payload)?)),
            other => Err(Error::InvalidEvent(format!("unknown routing key {}", other))),
        }
    }

    pub fn campaign_id(&self) -> &str {
        match self {
            IncomingEvent::ClipApproved(e) => &e.campaign_id,
            IncomingEvent::CampaignFunded(e) => &e.campaign_id,
            IncomingEvent::CampaignUpdated(e) => &e.campaign_id,
            IncomingEvent::CampaignEnded(e) => &e.campaign_id,
        }
    }
}

/// A transport delivery awaiting settlement. Consumed by exactly one settle call.
pub trait Delivery {
    fn ack(self);
    fn nack(self, requeue: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Nacked { requeue: bool },
}

/// Delivery with no broker behind it (CLI replays, local tools); settlement is logged.
#[derive(Debug, Clone)]
pub struct LocalDelivery {
    pub tag: String,
}

impl LocalDelivery {
    pub fn new(tag: impl Into<String>) -> Self {
        LocalDelivery { tag: tag.into() }
    }
}

impl Delivery for LocalDelivery {
    fn ack(self) {
        tracing::debug!(delivery = %self.tag, "ack");
    }

    fn nack(self, requeue: bool) {
        tracing::debug!(delivery = %self.tag, requeue, "nack");
    }
}

pub struct EventIngress<S: Storage> {
    ledger: Arc<BalanceLedger<S>>,
    payouts: Arc<PayoutCalculator<S>>,
    leaderboard: Arc<LeaderboardEngine>,
    saga: Arc<CampaignClosureSaga<S>>,
    campaigns: Arc<dyn CampaignDataSource>,
    cache: Arc<CampaignReadCache>,
}

impl<S: Storage> EventIngress<S> {
    pub fn new(
        ledger: Arc<BalanceLedger<S>>,
        payouts: Arc<PayoutCalculator<S>>,
        leaderboard: Arc<LeaderboardEngine>,
        saga: Arc<CampaignClosureSaga<S>>,
        campaigns: Arc<dyn CampaignDataSource>,
        cache: Arc<CampaignReadCache>,
    ) -> Self {
        EventIngress {
            ledger,
            payouts,
            leaderboard,
            saga,
            campaigns,
            cache,
        }
    }

    /// Decode, dispatch and settle one delivery.
    pub fn handle<D: Delivery>(
        &self,
        routing_key: &str,
        payload: &[u8],
        delivery: D,
    ) -> DeliveryOutcome {
        let event = match IncomingEvent::decode(routing_key, payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(routing_key, error = %e, "undecodable delivery dropped");
                delivery.nack(false);
                return DeliveryOutcome::Nacked { requeue: false };
            }
        };

        match self.dispatch(&event) {
            Ok(()) => {
                delivery.ack();
                DeliveryOutcome::Acked
            }
            Err(e) => {
                tracing::error!(
                    routing_key,
                    campaign = event.campaign_id(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "event handler failed, requeueing"
                );
                delivery.nack(true);
                DeliveryOutcome::Nacked { requeue: true }
            }
        }
    }

    pub fn dispatch(&self, event: &IncomingEvent) -> Result<()> {
        match event {
            IncomingEvent::ClipApproved(e) => self.on_clip_approved(e),
            IncomingEvent::CampaignFunded(e) => self.on_campaign_funded(e),
            IncomingEvent::CampaignUpdated(e) => {
                self.cache.upsert(&e.campaign_id, e.campaign.clone())?;
                tracing::debug!(campaign = %e.campaign_id, "campaign cache updated");
                Ok(())
            }
            IncomingEvent::CampaignEnded(e) => {
                match &e.campaign {
                    Some(snapshot) => self.saga.handle_campaign_ended(&e.campaign_id, snapshot)?,
                    None => self.saga.close_campaign(&e.campaign_id)?,
                };
                Ok(())
            }
        }
    }

    fn on_clip_approved(&self, event: &ClipApproved) -> Result<()> {
        let reserved = self
            .payouts
            .reserve_clip_payment(&event.campaign_id, &event.clip)?;
        if reserved.is_none() {
            tracing::info!(
                campaign = %event.campaign_id,
                clip = %event.clip.id,
                "clip approval already handled"
            );
        }

        let campaign = self.campaigns.get_campaign(&event.campaign_id)?;
        if campaign.enable_leaderboard {
            self.leaderboard
                .calculate_leaderboard(&event.campaign_id, campaign.leaderboard_metric)?;
        }
        Ok(())
    }

    fn on_campaign_funded(&self, event: &CampaignFunded) -> Result<()> {
        let recorded = self.ledger.record_funding(
            &event.created_by,
            event.amount,
            &event.campaign_id,
            "Campaign funded",
        )?;
        if recorded.is_none() {
            tracing::info!(campaign = %event.campaign_id, "funding already recorded");
        }
        if !self.cache.mark_funded(&event.campaign_id)? {
            tracing::debug!(campaign = %event.campaign_id, "funded campaign not cached yet");
        }
        Ok(())
    }
}
