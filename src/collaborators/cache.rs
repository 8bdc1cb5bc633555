use super::{CampaignDataSource, CampaignSnapshot};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Local read model of campaigns, kept in sync by campaign events.
#[derive(Debug, Default)]
pub struct CampaignReadCache {
    campaigns: RwLock<HashMap<String, CampaignSnapshot>>,
}

impl CampaignReadCache {
    pub fn new() -> Self {
        CampaignReadCache::default()
    }

    pub fn upsert(&self, campaign_id: &str, snapshot: CampaignSnapshot) -> Result<()> {
        self.campaigns
            .write()
            .map_err(|_| Error::StorageError("campaign cache poisoned".to_string()))?
            .insert(campaign_id.to_string(), snapshot);
        Ok(())
    }

    /// Flag a cached campaign as funded. Returns false when the campaign is not cached.
    pub fn mark_funded(&self, campaign_id: &str) -> Result<bool> {
        let mut campaigns = self
            .campaigns
            .write()
            .map_err(|_| Error::StorageError("campaign cache poisoned".to_string()))?;
        match campaigns.get_mut(campaign_id) {
            Some(snapshot) => {
                snapshot.is_funded = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.campaigns.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CampaignDataSource for CampaignReadCache {
    fn get_campaign(&self, campaign_id: &str) -> Result<CampaignSnapshot> {
        self.campaigns
            .read()
            .map_err(|_| Error::StorageError("campaign cache poisoned".to_string()))?
            .get(campaign_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Campaign {} not in cache", campaign_id)))
    }
}

/// Ask `primary` first; fall back to `cache` only when the primary is unavailable.
///
/// A `NotFound` from the primary is authoritative and is not retried against the cache.
pub struct FallbackCampaignSource {
    primary: Arc<dyn CampaignDataSource>,
    cache: Arc<CampaignReadCache>,
}

impl FallbackCampaignSource {
    pub fn new(primary: Arc<dyn CampaignDataSource>, cache: Arc<CampaignReadCache>) -> Self {
        FallbackCampaignSource { primary, cache }
    }
}

impl CampaignDataSource for FallbackCampaignSource {
    fn get_campaign(&self, campaign_id: &str) -> Result<CampaignSnapshot> {
        match self.primary.get_campaign(campaign_id) {
            Ok(snapshot) => {
                if let Err(e) = self.cache.upsert(campaign_id, snapshot.clone()) {
                    tracing::warn!(campaign = campaign_id, error = %e, "cache refresh failed");
                }
                Ok(snapshot)
            }
            Err(Error::UpstreamUnavailable(reason)) => {
                tracing::warn!(
                    campaign = campaign_id,
                    reason = %reason,
                    "campaign service unavailable, reading cache"
                );
                self.cache.get_campaign(campaign_id).map_err(|_| {
                    Error::UpstreamUnavailable(format!(
                        "{} (and campaign {} not cached)",
                        reason, campaign_id
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }
}
