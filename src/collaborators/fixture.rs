//! Static campaign data: serves campaigns, clips and prize slots from memory.
//!
//! Backs the CLI (campaign fixtures loaded from JSON files) and tests.

use super::{
    CampaignDataSource, CampaignSnapshot, Clip, ClipDataProvider, PrizeConfigProvider, PrizeSlot,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

/// One campaign with its approved clips and prize configuration, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignFixture {
    pub campaign_id: String,
    pub campaign: CampaignSnapshot,
    #[serde(default)]
    pub clips: Vec<Clip>,
    #[serde(default)]
    pub prizes: Vec<PrizeSlot>,
}

impl CampaignFixture {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidEvent(format!("Failed to parse campaign fixture: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::NotFound(format!("Campaign fixture {}: {}", path.display(), e))
        })?;
        CampaignFixture::from_json(&json)
    }
}

#[derive(Debug, Default)]
struct Tables {
    campaigns: HashMap<String, CampaignSnapshot>,
    clips: HashMap<String, Vec<Clip>>,
    prizes: HashMap<String, Vec<PrizeSlot>>,
}

#[derive(Debug, Default)]
pub struct StaticCampaignData {
    tables: RwLock<Tables>,
}

fn poisoned() -> Error {
    Error::UpstreamUnavailable("static campaign data poisoned".to_string())
}

impl StaticCampaignData {
    pub fn new() -> Self {
        StaticCampaignData::default()
    }

    pub fn from_fixture(fixture: CampaignFixture) -> Self {
        let data = StaticCampaignData::new();
        if let Ok(mut tables) = data.tables.write() {
            tables
                .campaigns
                .insert(fixture.campaign_id.clone(), fixture.campaign);
            tables
                .clips
                .insert(fixture.campaign_id.clone(), fixture.clips);
            tables.prizes.insert(fixture.campaign_id, fixture.prizes);
        }
        data
    }

    pub fn set_campaign(&self, campaign_id: &str, snapshot: CampaignSnapshot) {
        if let Ok(mut tables) = self.tables.write() {
            tables.campaigns.insert(campaign_id.to_string(), snapshot);
        }
    }

    pub fn set_clips(&self, campaign_id: &str, clips: Vec<Clip>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.clips.insert(campaign_id.to_string(), clips);
        }
    }

    pub fn set_prizes(&self, campaign_id: &str, prizes: Vec<PrizeSlot>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.prizes.insert(campaign_id.to_string(), prizes);
        }
    }
}

impl CampaignDataSource for StaticCampaignData {
    fn get_campaign(&self, campaign_id: &str) -> Result<CampaignSnapshot> {
        self.tables
            .read()
            .map_err(|_| poisoned())?
            .campaigns
            .get(campaign_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Campaign {}", campaign_id)))
    }
}

impl ClipDataProvider for StaticCampaignData {
    fn approved_clips(&self, campaign_id: &str) -> Result<Vec<Clip>> {
        Ok(self
            .tables
            .read()
            .map_err(|_| poisoned())?
            .clips
            .get(campaign_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl PrizeConfigProvider for StaticCampaignData {
    fn prize_slots(&self, campaign_id: &str) -> Result<Vec<PrizeSlot>> {
        Ok(self
            .tables
            .read()
            .map_err(|_| poisoned())?
            .prizes
            .get(campaign_id)
            .cloned()
            .unwrap_or_default())
    }
}
