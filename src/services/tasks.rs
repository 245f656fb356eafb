use crate::error::{AirdropError, Result};
use crate::models::{TaskKey, TaskMetadata, TaskMetadataInput};
use crate::services::KeyValueStore;
use chrono::Utc;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Task configuration keyed by (campaign, task), read-through cached in memory.
pub struct TaskMetadataStore {
    store: Arc<dyn KeyValueStore>,
    memory: Cache<TaskKey, Arc<TaskMetadata>>,
}

impl TaskMetadataStore {
    pub fn new(store: Arc<dyn KeyValueStore>, cache_ttl: Duration) -> Self {
        let memory = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(cache_ttl)
            .build();

        Self { store, memory }
    }

    fn storage_key(key: TaskKey) -> String {
        format!("task:{}", key)
    }

    pub async fn get(&self, key: TaskKey) -> Result<Option<Arc<TaskMetadata>>> {
        if let Some(cached) = self.memory.get(&key).await {
            tracing::debug!(task = %key, "Task metadata cache hit");
            return Ok(Some(cached));
        }

        let Some(metadata) = self
            .store
            .get_json::<TaskMetadata>(&Self::storage_key(key))
            .await?
        else {
            return Ok(None);
        };

        let metadata = Arc::new(metadata);
        self.memory.insert(key, metadata.clone()).await;
        Ok(Some(metadata))
    }

    pub async fn require(&self, key: TaskKey) -> Result<Arc<TaskMetadata>> {
        self.get(key).await?.ok_or(AirdropError::TaskNotFound {
            campaign_id: key.campaign_id,
            task_index: key.task_index,
        })
    }

    /// Writes the task configuration. Re-submitting identical content is a
    /// no-op that returns the stored record unchanged.
    ///
    /// Payment terms are fixed once attached: an update may change the
    /// invites but must carry the same terms.
    pub async fn upsert(&self, key: TaskKey, input: TaskMetadataInput) -> Result<Arc<TaskMetadata>> {
        if let Some(payment) = &input.payment {
            payment.validate()?;
        }

        // Read past the memory tier, another instance may have written since.
        let existing = self
            .store
            .get_json::<TaskMetadata>(&Self::storage_key(key))
            .await?;

        if let Some(existing) = existing {
            if existing.payment.is_some() && existing.payment != input.payment {
                tracing::warn!(task = %key, "Rejected change to attached payment terms");
                return Err(AirdropError::PaymentTermsImmutable {
                    campaign_id: key.campaign_id,
                    task_index: key.task_index,
                });
            }
            if existing.same_content(&input) {
                tracing::debug!(task = %key, "Task metadata unchanged");
                return Ok(Arc::new(existing));
            }
        }

        let metadata = TaskMetadata {
            campaign_id: key.campaign_id,
            task_index: key.task_index,
            payment: input.payment,
            discord: input.discord,
            telegram: input.telegram,
            updated_at: Utc::now(),
        };

        self.store
            .set_json(&Self::storage_key(key), &metadata)
            .await?;
        self.memory.invalidate(&key).await;

        tracing::info!(
            task = %key,
            payable = metadata.payment.is_some(),
            "Task metadata stored"
        );

        Ok(Arc::new(metadata))
    }
}
