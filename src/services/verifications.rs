use crate::error::{AirdropError, Result};
use crate::models::{VerificationKey, VerificationRecord};
use crate::services::KeyValueStore;
use chrono::Utc;
use ethers::types::H256;
use moka::future::Cache;
use std::sync::Arc;

/// Lowercase `0x`-prefixed hex, the canonical form stored and compared everywhere.
pub fn format_tx_hash(hash: &H256) -> String {
    format!("0x{}", hex::encode(hash.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub record: VerificationRecord,
    /// `false` when the triple had already been verified earlier.
    pub newly_verified: bool,
}

/// Verification results per (campaign, task, user) plus the transaction-hash
/// claims that keep one payment from completing two verifications.
///
/// Storage layout:
/// - `verification:{triple}` verified record, written once with set-if-absent
/// - `attempt:{triple}` latest unverified attempt
/// - `txclaim:{hash}` the triple that owns a verified transaction
pub struct VerificationCache {
    store: Arc<dyn KeyValueStore>,
    verified: Cache<VerificationKey, Arc<VerificationRecord>>,
}

impl VerificationCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        // Verified records never change, so entries only leave by capacity.
        let verified = Cache::builder().max_capacity(100_000).build();
        Self { store, verified }
    }

    fn verified_key(key: &VerificationKey) -> String {
        format!("verification:{}", key)
    }

    fn attempt_key(key: &VerificationKey) -> String {
        format!("attempt:{}", key)
    }

    fn claim_key(tx_hash: &str) -> String {
        format!("txclaim:{}", tx_hash)
    }

    pub async fn get_verified(&self, key: &VerificationKey) -> Result<Option<Arc<VerificationRecord>>> {
        if let Some(record) = self.verified.get(key).await {
            return Ok(Some(record));
        }

        let Some(record) = self
            .store
            .get_json::<VerificationRecord>(&Self::verified_key(key))
            .await?
        else {
            return Ok(None);
        };

        let record = Arc::new(record);
        self.verified.insert(key.clone(), record.clone()).await;
        Ok(Some(record))
    }

    /// Verified record if any, otherwise the latest unverified attempt.
    pub async fn get(&self, key: &VerificationKey) -> Result<Option<VerificationRecord>> {
        if let Some(record) = self.get_verified(key).await? {
            return Ok(Some(record.as_ref().clone()));
        }
        self.store
            .get_json::<VerificationRecord>(&Self::attempt_key(key))
            .await
    }

    /// The triple (`campaign:task:user`) a transaction has been credited to.
    pub async fn owner_of(&self, tx_hash: &H256) -> Result<Option<String>> {
        self.store
            .get(&Self::claim_key(&format_tx_hash(tx_hash)))
            .await
    }

    /// Fails fast when the transaction is already credited to another triple.
    pub async fn ensure_unclaimed(&self, key: &VerificationKey, tx_hash: &H256) -> Result<()> {
        match self.owner_of(tx_hash).await? {
            Some(owner) if owner != key.to_string() => {
                Err(AirdropError::TransactionAlreadyUsed(format_tx_hash(tx_hash)))
            }
            _ => Ok(()),
        }
    }

    /// Marks the triple verified by `tx_hash`.
    ///
    /// Already verified triples are returned unchanged. A transaction credited
    /// to a different triple fails with [`AirdropError::TransactionAlreadyUsed`].
    pub async fn record_verification(
        &self,
        key: &VerificationKey,
        tx_hash: &H256,
    ) -> Result<RecordOutcome> {
        if let Some(existing) = self.get_verified(key).await? {
            tracing::debug!(triple = %key, "Already verified, keeping stored record");
            return Ok(RecordOutcome {
                record: existing.as_ref().clone(),
                newly_verified: false,
            });
        }

        let hash = format_tx_hash(tx_hash);
        let owner = key.to_string();
        self.claim(&hash, &owner).await?;

        let previous_attempts = self
            .store
            .get_json::<VerificationRecord>(&Self::attempt_key(key))
            .await?
            .map_or(0, |attempt| attempt.attempts);

        let now = Utc::now();
        let record = VerificationRecord {
            campaign_id: key.campaign_id,
            task_index: key.task_index,
            user_address: key.user_address.clone(),
            transaction_hash: hash.clone(),
            verified: true,
            verified_at: Some(now),
            attempts: previous_attempts + 1,
            last_error: None,
            updated_at: now,
        };

        let written = match self
            .store
            .set_json_if_absent(&Self::verified_key(key), &record)
            .await
        {
            Ok(written) => written,
            Err(e) => {
                // No record points at the hash, so give it back.
                if let Err(release) = self
                    .store
                    .delete_if_equals(&Self::claim_key(&hash), &owner)
                    .await
                {
                    tracing::error!(tx_hash = %hash, error = %release, "Failed to release transaction claim");
                }
                return Err(e);
            }
        };

        if !written {
            // A concurrent request verified this triple first.
            let winner = self
                .store
                .get_json::<VerificationRecord>(&Self::verified_key(key))
                .await?
                .ok_or_else(|| {
                    AirdropError::InternalError(format!("verification record for {} vanished", key))
                })?;

            if winner.transaction_hash != hash {
                self.store
                    .delete_if_equals(&Self::claim_key(&hash), &owner)
                    .await?;
            }

            let winner = Arc::new(winner);
            self.verified.insert(key.clone(), winner.clone()).await;
            return Ok(RecordOutcome {
                record: winner.as_ref().clone(),
                newly_verified: false,
            });
        }

        let record = Arc::new(record);
        self.verified.insert(key.clone(), record.clone()).await;

        tracing::info!(triple = %key, tx_hash = %hash, "Verification recorded");

        Ok(RecordOutcome {
            record: record.as_ref().clone(),
            newly_verified: true,
        })
    }

    async fn claim(&self, hash: &str, owner: &str) -> Result<()> {
        let claim_key = Self::claim_key(hash);

        for _ in 0..2 {
            if self.store.set_if_absent(&claim_key, owner).await? {
                return Ok(());
            }
            match self.store.get(&claim_key).await? {
                // Left behind by an earlier request for the same triple.
                Some(current) if current == owner => return Ok(()),
                Some(current) => {
                    tracing::warn!(tx_hash = %hash, owner = %current, "Transaction replay rejected");
                    return Err(AirdropError::TransactionAlreadyUsed(hash.to_string()));
                }
                // Released between our two calls; try again.
                None => continue,
            }
        }

        Err(AirdropError::TransactionAlreadyUsed(hash.to_string()))
    }

    /// Stores a failed attempt. Verified triples are left untouched.
    pub async fn record_attempt(
        &self,
        key: &VerificationKey,
        tx_hash: &H256,
        error: &str,
    ) -> Result<VerificationRecord> {
        if let Some(existing) = self.get_verified(key).await? {
            return Ok(existing.as_ref().clone());
        }

        let attempt_key = Self::attempt_key(key);
        let previous_attempts = self
            .store
            .get_json::<VerificationRecord>(&attempt_key)
            .await?
            .map_or(0, |attempt| attempt.attempts);

        let record = VerificationRecord {
            campaign_id: key.campaign_id,
            task_index: key.task_index,
            user_address: key.user_address.clone(),
            transaction_hash: format_tx_hash(tx_hash),
            verified: false,
            verified_at: None,
            attempts: previous_attempts + 1,
            last_error: Some(error.to_string()),
            updated_at: Utc::now(),
        };

        self.store.set_json(&attempt_key, &record).await?;
        Ok(record)
    }
}
