use crate::models::PaymentTerms;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskKey {
    pub campaign_id: u64,
    pub task_index: u32,
}

impl TaskKey {
    pub fn new(campaign_id: u64, task_index: u32) -> Self {
        Self {
            campaign_id,
            task_index,
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.campaign_id, self.task_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordInvite {
    pub invite_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramInvite {
    pub invite_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

/// Off-chain configuration attached to one task of an on-chain campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    pub campaign_id: u64,
    pub task_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentTerms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<DiscordInvite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramInvite>,
    pub updated_at: DateTime<Utc>,
}

impl TaskMetadata {
    /// Same content, ignoring when it was written.
    pub fn same_content(&self, input: &TaskMetadataInput) -> bool {
        self.payment == input.payment
            && self.discord == input.discord
            && self.telegram == input.telegram
    }
}

/// Body of a task metadata upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadataInput {
    #[serde(default)]
    pub payment: Option<PaymentTerms>,
    #[serde(default)]
    pub discord: Option<DiscordInvite>,
    #[serde(default)]
    pub telegram: Option<TelegramInvite>,
}
