use crate::models::TaskKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one participant's completion of one task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationKey {
    pub campaign_id: u64,
    pub task_index: u32,
    /// Always lowercase.
    pub user_address: String,
}

impl VerificationKey {
    pub fn new(task: TaskKey, user_address: &str) -> Self {
        Self {
            campaign_id: task.campaign_id,
            task_index: task.task_index,
            user_address: user_address.trim().to_lowercase(),
        }
    }
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.campaign_id, self.task_index, self.user_address
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub campaign_id: u64,
    pub task_index: u32,
    pub user_address: String,
    pub transaction_hash: String,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    /// Verification attempts made for this triple, successful one included.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}
